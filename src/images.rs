use tracing::{debug, info, warn};

use crate::error::PreloadError;
use crate::media::MediaClient;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::{Collection, ImageRecord, Store, now_millis};

/// Cache every image in `urls` (already de-duplicated by the caller).
/// A failed download is logged and still counted, so `loaded` always
/// reaches `urls.len()`; only storage errors abort.
pub fn preload_images<M: MediaClient>(
    store: &Store,
    media: &M,
    urls: &[String],
    sink: &dyn ProgressSink,
) -> Result<usize, PreloadError> {
    let total = urls.len();
    info!(total, "preloading images");
    let mut loaded = 0;

    for url in urls {
        if store.blob(Collection::Images, url).is_some() {
            debug!(url = %url, "image already cached");
        } else {
            match media.download(url) {
                Ok(bytes) => {
                    let record = ImageRecord {
                        url: url.clone(),
                        timestamp: now_millis(),
                    };
                    store.put_with_blob(Collection::Images, url, &record, &bytes)?;
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "failed to cache image, continuing");
                }
            }
        }
        loaded += 1;
        sink.event(ProgressEvent::Image { loaded, total });
    }

    info!(loaded, "image preload finished");
    Ok(loaded)
}
