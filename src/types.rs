//! Data structures shared by the locator and the fetcher.

use crate::error::FetchError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Numeric product identifier (article).
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Validates that `raw` is a non-empty run of ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FetchError::InvalidInput(format!(
                "'{}' is not a numeric article",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 4 digits, used as the `vol` partition on the basket host.
    pub fn vol_prefix(&self) -> &str {
        self.prefix(4)
    }

    /// First 6 digits, used as the `part` partition on the basket host.
    pub fn part_prefix(&self) -> &str {
        self.prefix(6)
    }

    // Digits are ASCII, so byte slicing is safe.
    fn prefix(&self, len: usize) -> &str {
        &self.0[..self.0.len().min(len)]
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numbered basket server, rendered as two zero-padded digits.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct ShardId(pub u8);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// A discovered image: its remote URL and 1-based remote index.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub index: u32,
}

/// Result of scanning the candidate shards for a product.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardScan {
    /// Shard that hosts the product, `None` when nothing was found.
    pub shard: Option<ShardId>,
    /// Contiguous images starting at index 1.
    pub images: Vec<ImageRef>,
}

impl ShardScan {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Per-image outcome of the download stage.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Saved {
        path: PathBuf,
        bytes: u64,
        attempts: u32,
    },
    Skipped {
        attempts: u32,
        error: String,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub image: ImageRef,
    pub outcome: DownloadOutcome,
}

impl DownloadResult {
    pub fn is_saved(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Saved { .. })
    }
}

/// Configuration for locating and downloading images.
///
/// # Example
///
/// ```
/// use wbimg::FetchConfig;
///
/// let config = FetchConfig {
///     max_shard: 20,
///     output_dir: "downloads".into(),
///     ..FetchConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Basket domain, each shard is served from `basket-<SS>.<host>`.
    pub host: String,
    /// URL scheme of the basket hosts.
    pub scheme: String,
    /// Image file extension, both remote and local.
    pub extension: String,
    /// Maximum number of image indices probed on a shard.
    pub max_images: u32,
    /// Highest shard probed (scanning goes downwards).
    pub max_shard: u8,
    /// Lowest shard probed.
    pub min_shard: u8,
    /// Number of download workers.
    pub max_concurrent_downloads: usize,
    /// Attempts per image before it is skipped.
    pub download_attempts: u32,
    /// Fixed delay between download attempts.
    pub retry_delay: Duration,
    /// Connect and read timeout for every request.
    pub request_timeout: Duration,
    /// Attempts per probe when the probe fails with a transient error.
    pub probe_attempts: u32,
    /// Fixed delay between probe attempts.
    pub probe_retry_delay: Duration,
    /// Root directory, images land in `<output_dir>/<article>/`.
    pub output_dir: PathBuf,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            host: "wbbasket.ru".to_string(),
            scheme: "https".to_string(),
            extension: "webp".to_string(),
            max_images: 50,
            max_shard: 16,
            min_shard: 1,
            max_concurrent_downloads: 3,
            download_attempts: 3,
            retry_delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            probe_attempts: 2,
            probe_retry_delay: Duration::from_secs(1),
            output_dir: PathBuf::from("images"),
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), FetchError> {
        let invalid = |msg: String| Err(FetchError::InvalidConfig(msg));

        if self.host.is_empty() {
            return invalid("host must not be empty".to_string());
        }
        if self.min_shard == 0 || self.max_shard > 99 || self.min_shard > self.max_shard {
            return invalid(format!(
                "shard range {}..={} must lie within 1..=99",
                self.min_shard, self.max_shard
            ));
        }
        if self.max_images == 0 {
            return invalid("max_images must be at least 1".to_string());
        }
        if self.max_concurrent_downloads == 0 {
            return invalid("max_concurrent_downloads must be at least 1".to_string());
        }
        if self.download_attempts == 0 || self.probe_attempts == 0 {
            return invalid("attempt counts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Candidate shards, highest first.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> {
        (self.min_shard..=self.max_shard).rev().map(ShardId)
    }

    /// Local file name for an image index.
    pub fn file_name(&self, index: u32) -> String {
        format!("{}.{}", index, self.extension)
    }
}

/// Overall outcome of a run, used for the process exit status.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every discovered image was saved.
    Complete,
    /// Some images were saved, some skipped.
    Partial,
    /// No shard hosts any image for the product.
    NothingFound,
    /// Images were discovered but none could be downloaded.
    AllSkipped,
}

/// Summary of a full resolve/locate/fetch run.
#[derive(Serialize, Debug, Clone)]
pub struct RunSummary {
    pub product: ProductId,
    pub shard: Option<ShardId>,
    pub directory: Option<PathBuf>,
    pub discovered: usize,
    pub saved: usize,
    pub skipped: usize,
    pub results: Vec<DownloadResult>,
}

impl RunSummary {
    pub fn status(&self) -> RunStatus {
        if self.discovered == 0 {
            RunStatus::NothingFound
        } else if self.saved == 0 {
            RunStatus::AllSkipped
        } else if self.skipped > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Complete
        }
    }
}
