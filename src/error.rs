//! Error types for image discovery and download.

use std::io;
use thiserror::Error;

/// Errors that can occur while resolving, probing or downloading.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Input is neither a digit-only article nor a catalog URL.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An existence probe failed for a reason other than "not found".
    #[error("Probe failed for {url}: {reason}")]
    ProbeFailed { url: String, reason: String },

    /// A single download attempt failed.
    #[error("Image download failed: {0}")]
    DownloadFailed(String),

    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// HTTP request error.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),
}
