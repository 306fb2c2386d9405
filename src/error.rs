use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PreloadError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read user profile at {0}")]
    ProfileRead(PathBuf),

    #[error("failed to parse user profile: {0}")]
    ProfileParse(String),

    #[error("speech synthesis request failed: {0}")]
    SpeechHttp(String),

    #[error("speech synthesis returned status {status}: {message}")]
    SpeechStatus { status: u16, message: String },

    #[error("media request failed: {0}")]
    MediaHttp(String),

    #[error("media request returned status {status}: {message}")]
    MediaStatus { status: u16, message: String },

    #[error("resource not cached: {0}")]
    NotCached(String),
}
