// src/error.rs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read WAV file: {0}")]
    Wav(#[from] hound::Error),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sample file not found: {0}")]
    SampleNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
