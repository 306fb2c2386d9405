use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::PreloadError;

/// Preload policy plus the data tables the fetchers consume. Everything has
/// an embedded default; an optional `viltrum-offline.json` in the working
/// directory (or an explicit path) overrides individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreloadConfig {
    /// Cached data older than this many hours is eligible for refresh.
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: u64,
    /// How many speech-synthesis requests overlap within one batch.
    #[serde(default = "default_tts_batch_size")]
    pub tts_batch_size: usize,
    /// Pause between synthesis batches, to respect endpoint rate limits.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_speech_endpoint")]
    pub speech_endpoint: String,
    #[serde(default = "default_countdown_cues")]
    pub countdown_cues: Vec<CountdownCue>,
    #[serde(default = "default_fixed_clips")]
    pub fixed_clips: Vec<FixedClip>,
    /// Application-chrome images preloaded for every user (logo plus the
    /// special workout screens), independent of the exercise images.
    #[serde(default = "default_chrome_images")]
    pub chrome_images: Vec<String>,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            staleness_hours: default_staleness_hours(),
            tts_batch_size: default_tts_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            speech_endpoint: default_speech_endpoint(),
            countdown_cues: default_countdown_cues(),
            fixed_clips: default_fixed_clips(),
            chrome_images: default_chrome_images(),
        }
    }
}

/// A spoken countdown cue and the minimum exercise duration (seconds) that
/// makes it worth caching. Thresholds are checked independently, so a long
/// exercise pulls in every applicable tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownCue {
    pub text: String,
    pub min_duration: u32,
}

/// One pre-recorded voice clip: a stable logical name and its remote URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedClip {
    pub name: String,
    pub url: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolve the preload config. An explicit path must exist; the default
    /// path is optional and falls back to the embedded defaults.
    pub fn resolve(path: Option<&str>) -> Result<PreloadConfig, PreloadError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("viltrum-offline.json"),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(PreloadConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PreloadError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| PreloadError::ConfigParse(err.to_string()))
    }
}

fn default_staleness_hours() -> u64 {
    24
}

fn default_tts_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    200
}

fn default_speech_endpoint() -> String {
    "https://google-tts-server.onrender.com/speak".to_string()
}

fn default_countdown_cues() -> Vec<CountdownCue> {
    let cue = |text: &str, min_duration: u32| CountdownCue {
        text: text.to_string(),
        min_duration,
    };
    vec![
        cue("Mancano 60 secondi", 60),
        cue("Mancano 30 secondi", 30),
        cue("Mancano 10 secondi", 10),
        cue("5", 5),
        cue("4", 5),
        cue("3", 5),
        cue("2", 5),
        cue("1", 5),
    ]
}

fn default_fixed_clips() -> Vec<FixedClip> {
    const CLIPS_BASE: &str = "https://github.com/tommyv-spec/workout-audio/raw/refs/heads/main/docs";
    let clip = |name: &str, file: &str| FixedClip {
        name: name.to_string(),
        url: format!("{CLIPS_BASE}/{file}"),
    };
    vec![
        clip("Pronti", "Pronti.MP3"),
        clip("Start", "Start.MP3"),
        clip("Stop", "Stop.MP3"),
        clip("60sec", "Mancano%2060%20secondi.MP3"),
        clip("30sec", "Mancano%2030%20secondi.MP3"),
        clip("10sec", "Mancano%2010%20secondi.MP3"),
        clip("5-4-3-2-1", "5-4-3-2-1.MP3"),
        clip("Pausa", "Pausa.MP3"),
        clip("Riposo", "Riposo.MP3"),
        clip("Cambio", "Cambio.MP3"),
        clip("Prossimo", "Prossimo%20esercizio.MP3"),
    ]
}

fn default_chrome_images() -> Vec<String> {
    // Served through lh3.googleusercontent.com to avoid CORS on the
    // drive.google.com thumbnail endpoint.
    [
        "1va6OkGp9yAHDJBfeDM3npwqlJJoLUh5C", // logo
        "1Ee4DY-EGnTI9YPrIB0wj6v8pX7KW8Hpt", // warmup
        "1FS2HKfaJ6MIfpyzJirU6dWQ7K-5kbC9j", // are you ready
        "1bibXbdrcXdh3vgNHp2Teby3ClS3VqZmb", // rest
        "1Vs1-VgiJi8rTbssSj-2ThcyDraRoTE2g", // good job
    ]
    .iter()
    .map(|id| format!("https://lh3.googleusercontent.com/d/{id}"))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_table() {
        let config = PreloadConfig::default();
        assert_eq!(config.staleness_hours, 24);
        assert_eq!(config.tts_batch_size, 10);
        assert_eq!(config.batch_delay_ms, 200);
        assert_eq!(config.countdown_cues.len(), 8);
        assert_eq!(config.fixed_clips.len(), 11);
        assert_eq!(config.chrome_images.len(), 5);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: PreloadConfig = serde_json::from_str(r#"{"staleness_hours": 6}"#).unwrap();
        assert_eq!(config.staleness_hours, 6);
        assert_eq!(config.tts_batch_size, 10);
        assert_eq!(config.fixed_clips.len(), 11);
    }

    #[test]
    fn missing_default_config_resolves_to_defaults() {
        let resolved = ConfigLoader::resolve(None).unwrap();
        assert_eq!(resolved.staleness_hours, 24);
    }
}
