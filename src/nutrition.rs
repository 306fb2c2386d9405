use tracing::{info, warn};

use crate::error::PreloadError;
use crate::media::MediaClient;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::{Collection, NutritionRecord, Store, now_millis};

/// Cache the user's nutrition document, keyed by their email. Callers skip
/// the invocation when no document is assigned; if invoked anyway, it
/// still reports a completed 1/1 stage. A failed download is logged and
/// counted like any other per-resource failure.
pub fn preload_nutrition<M: MediaClient>(
    store: &Store,
    media: &M,
    url: Option<&str>,
    email: &str,
    sink: &dyn ProgressSink,
) -> Result<(), PreloadError> {
    let Some(url) = url else {
        info!("no nutrition plan assigned");
        sink.event(ProgressEvent::Nutrition { loaded: 1, total: 1 });
        return Ok(());
    };

    info!("preloading nutrition document");
    match media.download(url) {
        Ok(bytes) => {
            let record = NutritionRecord {
                email: email.to_string(),
                url: url.to_string(),
                timestamp: now_millis(),
            };
            store.put_with_blob(Collection::Nutrition, email, &record, &bytes)?;
        }
        Err(err) => {
            warn!(url, error = %err, "failed to cache nutrition document, continuing");
        }
    }
    sink.event(ProgressEvent::Nutrition { loaded: 1, total: 1 });
    Ok(())
}
