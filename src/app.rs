use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::clips::preload_fixed_clips;
use crate::config::PreloadConfig;
use crate::domain::{UserProfile, clip_key, detect_lang, normalize_text, tts_key};
use crate::error::PreloadError;
use crate::images::preload_images;
use crate::media::MediaClient;
use crate::nutrition::preload_nutrition;
use crate::progress::ProgressSink;
use crate::speech::SpeechClient;
use crate::store::{
    Collection, META_CACHED_USER, META_LAST_UPDATE, META_PRELOAD_COMPLETE, MetadataEntry, Store,
    WORKOUT_RECORD_ID, WorkoutRecord, now_millis,
};
use crate::tts::{collect_phrases, preload_tts};
use crate::update::{UpdateCheck, needs_update};

/// Per-run switches layered on top of the config. All off by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreloadOptions {
    pub skip_images: bool,
    pub skip_audio: bool,
    pub skip_fixed_clips: bool,
    pub skip_nutrition: bool,
    /// Run even when the cache is fresh for this user.
    pub force_update: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PreloadStats {
    pub images: usize,
    pub audio: usize,
    pub fixed_clips: usize,
    pub duration_secs: f64,
}

/// How a preload attempt ended.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PreloadOutcome {
    /// Another preload was already in flight on this instance.
    Skipped,
    /// The cache was fresh for this user, nothing fetched.
    Cached,
    Completed(PreloadStats),
}

/// Counts reported by `cache_status`, one per collection that holds
/// payloads, plus the metadata summary.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub cached_user: Option<String>,
    pub last_update: Option<i64>,
    pub preload_complete: bool,
    pub images: usize,
    pub audio: usize,
    pub nutrition: usize,
}

/// Orchestrates the whole preload: decides whether a run is needed, drives
/// the four fetchers in order, and records completion metadata last so an
/// interrupted run is resumed on the next attempt.
pub struct Preloader<S, M> {
    store: Store,
    speech: S,
    media: M,
    config: PreloadConfig,
    running: AtomicBool,
}

/// Clears the running flag when a preload unwinds, so a failed run never
/// wedges the instance.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: SpeechClient, M: MediaClient> Preloader<S, M> {
    pub fn new(store: Store, speech: S, media: M, config: PreloadConfig) -> Self {
        Self {
            store,
            speech,
            media,
            config,
            running: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Evaluate whether `email` needs a preload, without running one.
    pub fn check(&self, email: &str) -> Result<UpdateCheck, PreloadError> {
        needs_update(&self.store, email, self.config.staleness_hours)
    }

    /// Run the full preload for one user. Re-entrant calls on the same
    /// instance are skipped rather than queued; per-resource failures are
    /// logged and the run keeps going.
    pub fn preload_all(
        &self,
        profile: &UserProfile,
        options: PreloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<PreloadOutcome, PreloadError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("preload already in progress, skipping");
            return Ok(PreloadOutcome::Skipped);
        }
        let _guard = RunGuard(&self.running);

        self.store.ensure_layout()?;

        if !options.force_update {
            let check = self.check(&profile.email)?;
            if !check.needs_update {
                info!(email = %profile.email, "cache is fresh, nothing to do");
                return Ok(PreloadOutcome::Cached);
            }
            info!(reason = ?check.reason, "preload needed");
        } else {
            info!("forced preload, skipping freshness check");
        }

        let started = Instant::now();

        // Mark the run as in flight before touching any collection, so a
        // crash mid-run is detected as an incomplete preload.
        self.put_meta(META_PRELOAD_COMPLETE, serde_json::json!(false))?;

        let record = WorkoutRecord {
            id: WORKOUT_RECORD_ID.to_string(),
            email: profile.email.clone(),
            data: serde_json::to_value(profile)
                .map_err(|err| PreloadError::Storage(err.to_string()))?,
            timestamp: now_millis(),
        };
        self.store
            .put(Collection::WorkoutData, WORKOUT_RECORD_ID, &record)?;

        let mut stats = PreloadStats {
            images: 0,
            audio: 0,
            fixed_clips: 0,
            duration_secs: 0.0,
        };

        if options.skip_images {
            info!("skipping images");
        } else {
            let urls = self.collect_image_urls(profile);
            stats.images = preload_images(&self.store, &self.media, &urls, sink)?;
        }

        if options.skip_audio {
            info!("skipping audio");
        } else {
            let phrases = collect_phrases(&profile.all_workouts_data, &self.config.countdown_cues);
            stats.audio = preload_tts(
                &self.store,
                &self.speech,
                &phrases,
                self.config.tts_batch_size,
                Duration::from_millis(self.config.batch_delay_ms),
                sink,
            )?;

            if options.skip_fixed_clips {
                info!("skipping fixed clips");
            } else {
                stats.fixed_clips = preload_fixed_clips(
                    &self.store,
                    &self.media,
                    &self.config.fixed_clips,
                    sink,
                )?;
            }
        }

        if !options.skip_nutrition && profile.nutrition_pdf_url.is_some() {
            preload_nutrition(
                &self.store,
                &self.media,
                profile.nutrition_pdf_url.as_deref(),
                &profile.email,
                sink,
            )?;
        }

        // Completion metadata is written last; anything earlier failing
        // leaves the run marked incomplete and resumable.
        self.put_meta(META_LAST_UPDATE, serde_json::json!(now_millis()))?;
        self.put_meta(META_CACHED_USER, serde_json::json!(profile.email))?;
        self.put_meta(META_PRELOAD_COMPLETE, serde_json::json!(true))?;

        stats.duration_secs = started.elapsed().as_secs_f64();
        info!(
            images = stats.images,
            audio = stats.audio,
            fixed_clips = stats.fixed_clips,
            duration_secs = stats.duration_secs,
            "preload complete"
        );
        Ok(PreloadOutcome::Completed(stats))
    }

    /// Application chrome first, then each exercise image, de-duplicated in
    /// first-seen order.
    fn collect_image_urls(&self, profile: &UserProfile) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let chrome = self.config.chrome_images.iter().cloned();
        let exercise_images = profile
            .all_workouts_data
            .values()
            .flat_map(|workout| &workout.exercises)
            .filter_map(|exercise| exercise.image_url.clone());
        for url in chrome.chain(exercise_images) {
            if !url.is_empty() && seen.insert(url.clone()) {
                urls.push(url);
            }
        }
        urls
    }

    fn put_meta(&self, key: &str, value: serde_json::Value) -> Result<(), PreloadError> {
        self.store
            .put(Collection::Metadata, key, &MetadataEntry::new(key, value))
    }

    /// Path to a cached image's payload.
    pub fn cached_image(&self, url: &str) -> Option<Utf8PathBuf> {
        self.store.blob(Collection::Images, url)
    }

    /// Path to a cached audio payload: synthesized speech looked up by
    /// normalized text, fixed clips by `beppe_{name}`.
    pub fn cached_audio(&self, text: &str) -> Option<Utf8PathBuf> {
        let normalized = normalize_text(text);
        let key = tts_key(detect_lang(&normalized), &normalized);
        self.store
            .blob(Collection::Audio, &key)
            .or_else(|| self.store.blob(Collection::Audio, &clip_key(text)))
    }

    /// Path to the cached nutrition document for `email`.
    pub fn cached_nutrition(&self, email: &str) -> Option<Utf8PathBuf> {
        self.store.blob(Collection::Nutrition, email)
    }

    /// Drop every collection; the next preload starts from scratch.
    pub fn clear_cache(&self) -> Result<(), PreloadError> {
        info!("clearing offline cache");
        self.store.clear_all()
    }

    pub fn cache_status(&self) -> Result<CacheStatus, PreloadError> {
        let cached_user: Option<MetadataEntry> =
            self.store.get(Collection::Metadata, META_CACHED_USER)?;
        let last_update: Option<MetadataEntry> =
            self.store.get(Collection::Metadata, META_LAST_UPDATE)?;
        let complete: Option<MetadataEntry> =
            self.store.get(Collection::Metadata, META_PRELOAD_COMPLETE)?;

        Ok(CacheStatus {
            cached_user: cached_user
                .and_then(|entry| entry.value.as_str().map(str::to_string)),
            last_update: last_update.and_then(|entry| entry.value.as_i64()),
            preload_complete: complete
                .and_then(|entry| entry.value.as_bool())
                .unwrap_or(false),
            images: self
                .store
                .get_all::<serde_json::Value>(Collection::Images)?
                .len(),
            audio: self
                .store
                .get_all::<serde_json::Value>(Collection::Audio)?
                .len(),
            nutrition: self
                .store
                .get_all::<serde_json::Value>(Collection::Nutrition)?
                .len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::domain::{Exercise, Workout};
    use crate::progress::NullSink;

    struct StubSpeech;

    impl SpeechClient for StubSpeech {
        fn synthesize(&self, _text: &str, _lang: crate::domain::Lang) -> Result<Vec<u8>, PreloadError> {
            Ok(b"mp3".to_vec())
        }
    }

    struct StubMedia;

    impl MediaClient for StubMedia {
        fn download(&self, _url: &str) -> Result<Vec<u8>, PreloadError> {
            Ok(b"bytes".to_vec())
        }
    }

    fn profile() -> UserProfile {
        let mut workouts = HashMap::new();
        workouts.insert(
            "Lunedì".to_string(),
            Workout {
                exercises: vec![Exercise {
                    name: Some("Squat".to_string()),
                    istruzioni: None,
                    duration: Some(40),
                    image_url: Some("https://img/squat.jpg".to_string()),
                }],
            },
        );
        UserProfile {
            email: "a@b.it".to_string(),
            workouts: vec!["Lunedì".to_string()],
            all_workouts_data: workouts,
            nutrition_pdf_url: None,
        }
    }

    fn preloader() -> (tempfile::TempDir, Preloader<StubSpeech, StubMedia>) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
        let store = Store::open_at(root).unwrap();
        let mut config = PreloadConfig::default();
        config.batch_delay_ms = 0;
        (temp, Preloader::new(store, StubSpeech, StubMedia, config))
    }

    #[test]
    fn chrome_images_come_before_exercise_images() {
        let (_temp, preloader) = preloader();
        let urls = preloader.collect_image_urls(&profile());
        assert_eq!(urls.len(), 6);
        assert!(urls[0].contains("lh3.googleusercontent.com"));
        assert_eq!(urls.last().map(String::as_str), Some("https://img/squat.jpg"));
    }

    #[test]
    fn duplicate_image_urls_collapse() {
        let (_temp, preloader) = preloader();
        let mut profile = profile();
        let workout = Workout {
            exercises: vec![Exercise {
                name: Some("Front squat".to_string()),
                istruzioni: None,
                duration: None,
                image_url: Some("https://img/squat.jpg".to_string()),
            }],
        };
        profile
            .all_workouts_data
            .insert("Martedì".to_string(), workout);

        let urls = preloader.collect_image_urls(&profile);
        let squats = urls.iter().filter(|u| u.ends_with("squat.jpg")).count();
        assert_eq!(squats, 1);
    }

    #[test]
    fn second_run_is_cached() {
        let (_temp, preloader) = preloader();
        let profile = profile();

        let outcome = preloader
            .preload_all(&profile, PreloadOptions::default(), &NullSink)
            .unwrap();
        assert!(matches!(outcome, PreloadOutcome::Completed(_)));

        let outcome = preloader
            .preload_all(&profile, PreloadOptions::default(), &NullSink)
            .unwrap();
        assert!(matches!(outcome, PreloadOutcome::Cached));
    }

    #[test]
    fn force_runs_even_when_fresh() {
        let (_temp, preloader) = preloader();
        let profile = profile();
        preloader
            .preload_all(&profile, PreloadOptions::default(), &NullSink)
            .unwrap();

        let options = PreloadOptions {
            force_update: true,
            ..Default::default()
        };
        let outcome = preloader.preload_all(&profile, options, &NullSink).unwrap();
        assert!(matches!(outcome, PreloadOutcome::Completed(_)));
    }

    #[test]
    fn status_reflects_a_completed_run() {
        let (_temp, preloader) = preloader();
        preloader
            .preload_all(&profile(), PreloadOptions::default(), &NullSink)
            .unwrap();

        let status = preloader.cache_status().unwrap();
        assert_eq!(status.cached_user.as_deref(), Some("a@b.it"));
        assert!(status.preload_complete);
        assert_eq!(status.images, 6);
        assert!(status.audio > 0);
        assert_eq!(status.nutrition, 0);

        preloader.clear_cache().unwrap();
        let status = preloader.cache_status().unwrap();
        assert_eq!(status.cached_user, None);
        assert_eq!(status.images, 0);
    }

    #[test]
    fn cached_audio_resolves_both_kinds() {
        let (_temp, preloader) = preloader();
        preloader
            .preload_all(&profile(), PreloadOptions::default(), &NullSink)
            .unwrap();

        assert!(preloader.cached_audio("Squat").is_some());
        assert!(preloader.cached_audio("  Squat  ").is_some());
        assert!(preloader.cached_audio("Pronti").is_some());
        assert!(preloader.cached_audio("never spoken").is_none());
    }
}
