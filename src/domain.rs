use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Everything the preloader needs to know about the logged-in user:
/// which workouts they own, the exercises inside them, and the optional
/// nutrition plan assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    #[serde(default)]
    pub workouts: Vec<String>,
    #[serde(default)]
    pub all_workouts_data: HashMap<String, Workout>,
    #[serde(default)]
    pub nutrition_pdf_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workout {
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

/// One exercise inside a workout. Field names follow the upstream sheet
/// export, which mixes English and Italian (`istruzioni`, `durata`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub istruzioni: Option<String>,
    #[serde(default, alias = "durata")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Exercise {
    pub fn duration_secs(&self) -> u32 {
        self.duration.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lang {
    #[serde(rename = "it-IT")]
    Italian,
    #[serde(rename = "en-US")]
    English,
}

impl Lang {
    pub fn code(&self) -> &'static str {
        match self {
            Lang::Italian => "it-IT",
            Lang::English => "en-US",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Collapse internal whitespace runs to a single space and strip
/// leading/trailing whitespace. Two phrases differing only in whitespace
/// must map to the same cache key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

static ITALIAN_INDICATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[àèéìòù]|mancano|secondi|esercizio|istruz|riposo|pausa")
        .expect("italian indicator pattern is valid")
});

/// Heuristic language classification: accented Italian vowels or a fixed
/// set of Italian keyword substrings mean Italian, anything else defaults
/// to English.
pub fn detect_lang(text: &str) -> Lang {
    if ITALIAN_INDICATORS.is_match(text) {
        Lang::Italian
    } else {
        Lang::English
    }
}

/// Cache key for a synthesized phrase. The `tts_` prefix keeps synthesized
/// entries disjoint from fixed clips in the shared audio collection.
pub fn tts_key(lang: Lang, normalized_text: &str) -> String {
    format!("tts_{}_{}", lang.code(), normalized_text)
}

/// Cache key for a pre-recorded clip, keyed by its logical name.
pub fn clip_key(name: &str) -> String {
    format!("beppe_{name}")
}
