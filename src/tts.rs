use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::CountdownCue;
use crate::domain::{Lang, Workout, detect_lang, normalize_text, tts_key};
use crate::error::PreloadError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::speech::SpeechClient;
use crate::store::{AudioRecord, Collection, Store, now_millis};

/// Derive every phrase spoken during playback: exercise names, instruction
/// texts, and the countdown cues whose duration threshold the exercise
/// meets. Thresholds are checked independently, so a 65-second exercise
/// pulls in all four tiers. Phrases are normalized and de-duplicated,
/// keeping first-seen order.
pub fn collect_phrases(
    workouts: &HashMap<String, Workout>,
    cues: &[CountdownCue],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut phrases = Vec::new();
    let mut duplicates_skipped = 0usize;
    let mut push = |text: String, duplicates: &mut usize| {
        if text.is_empty() {
            return;
        }
        if seen.insert(text.clone()) {
            phrases.push(text);
        } else {
            *duplicates += 1;
        }
    };

    for workout in workouts.values() {
        for exercise in &workout.exercises {
            if let Some(name) = &exercise.name {
                push(normalize_text(name), &mut duplicates_skipped);
            }
            if let Some(istruzioni) = &exercise.istruzioni {
                push(normalize_text(istruzioni), &mut duplicates_skipped);
            }

            let duration = exercise.duration_secs();
            for cue in cues {
                if duration >= cue.min_duration {
                    push(normalize_text(&cue.text), &mut duplicates_skipped);
                }
            }
        }
    }

    if duplicates_skipped > 0 {
        debug!(duplicates_skipped, "skipped duplicate phrases");
    }
    phrases
}

/// Cache synthesized audio for every phrase. Misses are fetched in batches
/// of `batch_size` overlapping requests, with a `batch_delay` pause between
/// batches to respect endpoint rate limits. A failed synthesis is logged
/// and still counted; only storage errors abort.
pub fn preload_tts<S: SpeechClient>(
    store: &Store,
    speech: &S,
    phrases: &[String],
    batch_size: usize,
    batch_delay: Duration,
    sink: &dyn ProgressSink,
) -> Result<usize, PreloadError> {
    let total = phrases.len();
    info!(total, "preloading synthesized audio");
    let batch_size = batch_size.max(1);
    let mut loaded = 0;

    let batches: Vec<&[String]> = phrases.chunks(batch_size).collect();
    let batch_count = batches.len();
    for (index, batch) in batches.into_iter().enumerate() {
        // Resolve cache hits up front; only misses go to the network.
        let mut misses: Vec<(&str, Lang, String)> = Vec::new();
        for text in batch {
            let lang = detect_lang(text);
            let key = tts_key(lang, text);
            if store.blob(Collection::Audio, &key).is_some() {
                loaded += 1;
                sink.event(ProgressEvent::Audio { loaded, total });
            } else {
                misses.push((text.as_str(), lang, key));
            }
        }

        // Overlap the whole batch, then persist on this thread once every
        // request has settled.
        let fetched: Vec<Result<Vec<u8>, PreloadError>> = thread::scope(|scope| {
            let handles: Vec<_> = misses
                .iter()
                .map(|(text, lang, _)| {
                    let text = *text;
                    let lang = *lang;
                    scope.spawn(move || speech.synthesize(text, lang))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(PreloadError::SpeechHttp(
                            "synthesis worker panicked".to_string(),
                        ))
                    })
                })
                .collect()
        });

        for ((text, lang, key), result) in misses.into_iter().zip(fetched) {
            match result {
                Ok(bytes) => {
                    let record = AudioRecord {
                        key: key.clone(),
                        text: Some(text.to_string()),
                        lang: Some(lang),
                        name: None,
                        url: None,
                        timestamp: now_millis(),
                    };
                    store.put_with_blob(Collection::Audio, &key, &record, &bytes)?;
                }
                Err(err) => {
                    warn!(text, error = %err, "failed to cache synthesized audio, continuing");
                }
            }
            loaded += 1;
            sink.event(ProgressEvent::Audio { loaded, total });
        }

        if index + 1 < batch_count {
            thread::sleep(batch_delay);
        }
    }

    info!(loaded, "synthesized audio preload finished");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::config::PreloadConfig;
    use crate::domain::Exercise;
    use crate::progress::NullSink;

    fn workout(exercises: Vec<Exercise>) -> Workout {
        Workout { exercises }
    }

    fn exercise(name: &str, istruzioni: Option<&str>, duration: u32) -> Exercise {
        Exercise {
            name: Some(name.to_string()),
            istruzioni: istruzioni.map(str::to_string),
            duration: Some(duration),
            image_url: None,
        }
    }

    fn cues() -> Vec<CountdownCue> {
        PreloadConfig::default().countdown_cues
    }

    #[test]
    fn collects_names_instructions_and_cues() {
        let mut workouts = HashMap::new();
        workouts.insert(
            "Lunedì".to_string(),
            workout(vec![exercise("Squat", Some("Schiena dritta"), 65)]),
        );

        let phrases = collect_phrases(&workouts, &cues());
        assert!(phrases.contains(&"Squat".to_string()));
        assert!(phrases.contains(&"Schiena dritta".to_string()));
        // 65 seconds meets every threshold, non-exclusively.
        for cue in [
            "Mancano 60 secondi",
            "Mancano 30 secondi",
            "Mancano 10 secondi",
            "5",
            "4",
            "3",
            "2",
            "1",
        ] {
            assert!(phrases.contains(&cue.to_string()), "missing cue {cue}");
        }
    }

    #[test]
    fn short_exercise_gets_only_low_tiers() {
        let mut workouts = HashMap::new();
        workouts.insert(
            "A".to_string(),
            workout(vec![exercise("Jumping jacks", None, 20)]),
        );

        let phrases = collect_phrases(&workouts, &cues());
        assert!(phrases.contains(&"Mancano 10 secondi".to_string()));
        assert!(phrases.contains(&"5".to_string()));
        assert!(!phrases.contains(&"Mancano 30 secondi".to_string()));
        assert!(!phrases.contains(&"Mancano 60 secondi".to_string()));
    }

    #[test]
    fn whitespace_variants_collapse_to_one_phrase() {
        let mut workouts = HashMap::new();
        workouts.insert(
            "A".to_string(),
            workout(vec![
                exercise(" Squat   time \n", None, 0),
                exercise("Squat time", None, 0),
            ]),
        );

        let phrases = collect_phrases(&workouts, &cues());
        let squats = phrases.iter().filter(|p| p.contains("Squat")).count();
        assert_eq!(squats, 1);
        assert!(phrases.contains(&"Squat time".to_string()));
    }

    struct CountingSpeech {
        calls: Mutex<Vec<(String, Lang)>>,
        fail_on: Option<&'static str>,
    }

    impl CountingSpeech {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    impl SpeechClient for CountingSpeech {
        fn synthesize(&self, text: &str, lang: Lang) -> Result<Vec<u8>, PreloadError> {
            self.calls.lock().unwrap().push((text.to_string(), lang));
            if self.fail_on.is_some_and(|bad| text.contains(bad)) {
                return Err(PreloadError::SpeechStatus {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(b"mp3".to_vec())
        }
    }

    struct RecordingSink(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for RecordingSink {
        fn event(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
        (temp, Store::open_at(root).unwrap())
    }

    #[test]
    fn fetches_each_phrase_once_with_detected_language() {
        let (_temp, store) = temp_store();
        let phrases = vec!["Mancano 10 secondi".to_string(), "Push ups".to_string()];

        let speech = CountingSpeech::new(None);
        preload_tts(
            &store,
            &speech,
            &phrases,
            10,
            Duration::from_millis(0),
            &NullSink,
        )
        .unwrap();

        let calls = speech.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&("Mancano 10 secondi".to_string(), Lang::Italian)));
        assert!(calls.contains(&("Push ups".to_string(), Lang::English)));
        drop(calls);

        assert!(
            store
                .blob(Collection::Audio, &tts_key(Lang::Italian, "Mancano 10 secondi"))
                .is_some()
        );

        // Second run resolves everything from the cache.
        let speech = CountingSpeech::new(None);
        let loaded = preload_tts(
            &store,
            &speech,
            &phrases,
            10,
            Duration::from_millis(0),
            &NullSink,
        )
        .unwrap();
        assert_eq!(loaded, 2);
        assert!(speech.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn per_phrase_failure_still_reaches_total() {
        let (_temp, store) = temp_store();
        let phrases: Vec<String> = (0..23).map(|i| format!("phrase {i}")).collect();

        let speech = CountingSpeech::new(Some("phrase 7"));
        let sink = RecordingSink(Mutex::new(Vec::new()));
        let loaded = preload_tts(
            &store,
            &speech,
            &phrases,
            10,
            Duration::from_millis(0),
            &sink,
        )
        .unwrap();

        assert_eq!(loaded, 23);
        let events = sink.0.lock().unwrap();
        assert_eq!(events.last().unwrap().counts(), (23, 23));
        assert!(
            store
                .blob(Collection::Audio, &tts_key(Lang::English, "phrase 7"))
                .is_none()
        );
    }
}
