use serde::Serialize;
use tracing::info;

use crate::error::PreloadError;
use crate::store::{
    Collection, META_CACHED_USER, META_LAST_UPDATE, META_PRELOAD_COMPLETE, MetadataEntry, Store,
    now_millis,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    UserChanged,
    IncompletePreload,
    StaleCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    pub needs_update: bool,
    pub reason: Option<UpdateReason>,
}

impl UpdateCheck {
    fn update(reason: UpdateReason) -> Self {
        Self {
            needs_update: true,
            reason: Some(reason),
        }
    }

    fn fresh() -> Self {
        Self {
            needs_update: false,
            reason: None,
        }
    }
}

/// Decide whether a preload must run for `email`. Priority order matters:
/// a changed user always wins, an interrupted run for the same user is
/// resumed before freshness is even considered, and only then does the
/// staleness window apply.
pub fn needs_update(
    store: &Store,
    email: &str,
    staleness_hours: u64,
) -> Result<UpdateCheck, PreloadError> {
    let cached_user: Option<MetadataEntry> = store.get(Collection::Metadata, META_CACHED_USER)?;
    let same_user = cached_user
        .as_ref()
        .and_then(|entry| entry.value.as_str())
        .is_some_and(|user| user == email);
    if !same_user {
        info!("different user, full reload needed");
        // The previous user's completion flag must not be mistaken for
        // this user's.
        store.put(
            Collection::Metadata,
            META_PRELOAD_COMPLETE,
            &MetadataEntry::new(META_PRELOAD_COMPLETE, serde_json::json!(false)),
        )?;
        return Ok(UpdateCheck::update(UpdateReason::UserChanged));
    }

    let complete: Option<MetadataEntry> = store.get(Collection::Metadata, META_PRELOAD_COMPLETE)?;
    let completed = complete
        .as_ref()
        .and_then(|entry| entry.value.as_bool())
        .is_some_and(|value| value);
    if !completed {
        info!("previous preload was interrupted, resuming");
        return Ok(UpdateCheck::update(UpdateReason::IncompletePreload));
    }

    let last_update: Option<MetadataEntry> = store.get(Collection::Metadata, META_LAST_UPDATE)?;
    if let Some(last) = last_update.as_ref().and_then(|entry| entry.value.as_i64()) {
        let elapsed_ms = now_millis().saturating_sub(last);
        let window_ms = staleness_hours as i64 * 3_600_000;
        if elapsed_ms < window_ms {
            let hours = elapsed_ms as f64 / 3_600_000.0;
            info!(hours, "cache is fresh");
            return Ok(UpdateCheck::fresh());
        }
        info!(staleness_hours, "cache older than the freshness window");
    }

    Ok(UpdateCheck::update(UpdateReason::StaleCache))
}
