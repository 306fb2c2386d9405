use tracing::{debug, info, warn};

use crate::config::FixedClip;
use crate::domain::clip_key;
use crate::error::PreloadError;
use crate::media::MediaClient;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::{AudioRecord, Collection, Store, now_millis};

/// Cache the fixed roster of pre-recorded voice clips, one at a time.
/// Failures are logged and counted; only storage errors abort.
pub fn preload_fixed_clips<M: MediaClient>(
    store: &Store,
    media: &M,
    roster: &[FixedClip],
    sink: &dyn ProgressSink,
) -> Result<usize, PreloadError> {
    let total = roster.len();
    info!(total, "preloading fixed voice clips");
    let mut loaded = 0;

    for clip in roster {
        let key = clip_key(&clip.name);
        if store.blob(Collection::Audio, &key).is_some() {
            debug!(name = %clip.name, "clip already cached");
        } else {
            match media.download(&clip.url) {
                Ok(bytes) => {
                    let record = AudioRecord {
                        key: key.clone(),
                        text: None,
                        lang: None,
                        name: Some(clip.name.clone()),
                        url: Some(clip.url.clone()),
                        timestamp: now_millis(),
                    };
                    store.put_with_blob(Collection::Audio, &key, &record, &bytes)?;
                }
                Err(err) => {
                    warn!(name = %clip.name, error = %err, "failed to cache clip, continuing");
                }
            }
        }
        loaded += 1;
        sink.event(ProgressEvent::FixedClip { loaded, total });
    }

    info!(loaded, "fixed clip preload finished");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::config::PreloadConfig;
    use crate::progress::NullSink;

    struct CountingMedia(Mutex<usize>);

    impl MediaClient for CountingMedia {
        fn download(&self, _url: &str) -> Result<Vec<u8>, PreloadError> {
            *self.0.lock().unwrap() += 1;
            Ok(b"mp3".to_vec())
        }
    }

    #[test]
    fn roster_is_cached_under_disjoint_keys() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("store")).unwrap();
        let store = Store::open_at(root).unwrap();
        let roster = PreloadConfig::default().fixed_clips;

        let media = CountingMedia(Mutex::new(0));
        let loaded = preload_fixed_clips(&store, &media, &roster, &NullSink).unwrap();
        assert_eq!(loaded, roster.len());
        assert_eq!(*media.0.lock().unwrap(), roster.len());
        assert!(store.blob(Collection::Audio, "beppe_Start").is_some());

        // Re-run hits the cache for every clip.
        let media = CountingMedia(Mutex::new(0));
        preload_fixed_clips(&store, &media, &roster, &NullSink).unwrap();
        assert_eq!(*media.0.lock().unwrap(), 0);
    }
}
