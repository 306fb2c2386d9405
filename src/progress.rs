use serde::Serialize;

/// One progress event per resource completion. Each variant carries its own
/// counters so a reporter can handle the kinds exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Image { loaded: usize, total: usize },
    Audio { loaded: usize, total: usize },
    #[serde(rename = "beppe")]
    FixedClip { loaded: usize, total: usize },
    Nutrition { loaded: usize, total: usize },
}

impl ProgressEvent {
    /// Stable wire tag, matching the serialized `type` field.
    pub fn tag(&self) -> &'static str {
        match self {
            ProgressEvent::Image { .. } => "image",
            ProgressEvent::Audio { .. } => "audio",
            ProgressEvent::FixedClip { .. } => "beppe",
            ProgressEvent::Nutrition { .. } => "nutrition",
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        match *self {
            ProgressEvent::Image { loaded, total }
            | ProgressEvent::Audio { loaded, total }
            | ProgressEvent::FixedClip { loaded, total }
            | ProgressEvent::Nutrition { loaded, total } => (loaded, total),
        }
    }

    /// Completion percentage, clamped to 0 when the total is 0.
    pub fn percentage(&self) -> f64 {
        let (loaded, total) = self.counts();
        if total == 0 {
            0.0
        } else {
            loaded as f64 / total as f64 * 100.0
        }
    }
}

/// Consumer of progress events; fire-and-forget from the fetchers' side.
/// Sinks must be shareable because the synthesis fetcher reports from a
/// batched loop.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Sink that drops every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_clamps_zero_total() {
        let event = ProgressEvent::Image {
            loaded: 3,
            total: 0,
        };
        assert_eq!(event.percentage(), 0.0);

        let event = ProgressEvent::Audio {
            loaded: 5,
            total: 10,
        };
        assert_eq!(event.percentage(), 50.0);
    }

    #[test]
    fn wire_tags_are_stable() {
        let event = ProgressEvent::FixedClip {
            loaded: 1,
            total: 2,
        };
        assert_eq!(event.tag(), "beppe");
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["type"], "beppe");
        assert_eq!(json["loaded"], 1);
        assert_eq!(json["total"], 2);
    }
}
