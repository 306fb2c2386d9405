pub mod app;
pub mod clips;
pub mod config;
pub mod domain;
pub mod error;
pub mod images;
pub mod media;
pub mod nutrition;
pub mod output;
pub mod progress;
pub mod speech;
pub mod store;
pub mod tts;
pub mod update;
