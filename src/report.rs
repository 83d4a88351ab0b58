//! Progress reporting for the locate and fetch stages.
//!
//! Components never print directly. They emit [`FetchEvent`]s through an
//! injected [`Reporter`], which lets the binary log and draw progress while
//! tests collect events with [`MemoryReporter`].

use crate::types::{ProductId, ShardId};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Observable steps of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    Resolved {
        product: ProductId,
    },
    ShardProbed {
        shard: ShardId,
        hits: usize,
    },
    /// A probe kept failing with a transient error and was treated as a gap.
    ProbeFailed {
        shard: ShardId,
        index: u32,
        url: String,
        error: String,
    },
    ShardSelected {
        shard: ShardId,
        images: usize,
    },
    NothingFound {
        product: ProductId,
    },
    DownloadStarted {
        index: u32,
        url: String,
    },
    DownloadRetrying {
        index: u32,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    DownloadSaved {
        index: u32,
        path: PathBuf,
        bytes: u64,
    },
    DownloadSkipped {
        index: u32,
        url: String,
        attempts: u32,
        error: String,
    },
    Finished {
        directory: PathBuf,
        saved: usize,
        skipped: usize,
    },
}

/// Sink for [`FetchEvent`]s. Shared across download workers.
pub trait Reporter: Send + Sync {
    fn report(&self, event: &FetchEvent);
}

/// Emits every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: &FetchEvent) {
        match event {
            FetchEvent::Resolved { product } => info!(%product, "Resolved article"),
            FetchEvent::ShardProbed { shard, hits } => {
                debug!(%shard, hits, "Probed basket shard")
            }
            FetchEvent::ProbeFailed {
                shard,
                index,
                url,
                error,
            } => warn!(
                %shard,
                index,
                %url,
                %error,
                "Probe failed with a network error, treating as missing"
            ),
            FetchEvent::ShardSelected { shard, images } => {
                info!(%shard, images, "Found images on basket shard")
            }
            FetchEvent::NothingFound { product } => {
                warn!(%product, "No basket shard hosts images for this article")
            }
            FetchEvent::DownloadStarted { index, url } => debug!(index, %url, "Downloading image"),
            FetchEvent::DownloadRetrying {
                index,
                attempt,
                max_attempts,
                error,
            } => warn!(
                index,
                attempt,
                max_attempts,
                %error,
                "Image download failed, retrying"
            ),
            FetchEvent::DownloadSaved { index, path, bytes } => {
                debug!(index, path = %path.display(), bytes, "Saved image")
            }
            FetchEvent::DownloadSkipped {
                index,
                url,
                attempts,
                error,
            } => warn!(
                index,
                %url,
                attempts,
                %error,
                "Skipping image after exhausting attempts"
            ),
            FetchEvent::Finished {
                directory,
                saved,
                skipped,
            } => info!(
                directory = %directory.display(),
                saved,
                skipped,
                "All images processed"
            ),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<FetchEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events reported so far.
    pub fn events(&self) -> Vec<FetchEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: &FetchEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Draws an indicatif progress bar over the download stage and forwards
/// every event to [`TracingReporter`].
pub struct ProgressReporter {
    pb: indicatif::ProgressBar,
    inner: TracingReporter,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let pb = indicatif::ProgressBar::new(0);
        pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                .progress_chars("█▓▒░ "),
        );
        Self {
            pb,
            inner: TracingReporter,
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ProgressReporter {
    fn report(&self, event: &FetchEvent) {
        self.inner.report(event);

        match event {
            FetchEvent::ShardSelected { shard, images } => {
                self.pb.set_length(*images as u64);
                self.pb.set_message(format!("| 📦 basket-{}", shard));
            }
            FetchEvent::DownloadStarted { index, .. } => {
                self.pb.set_message(format!("| ⬇️  Downloading: {}", index));
            }
            FetchEvent::DownloadSaved { .. } | FetchEvent::DownloadSkipped { .. } => {
                self.pb.inc(1);
            }
            FetchEvent::Finished { skipped, .. } => {
                if *skipped == 0 {
                    self.pb.finish_with_message("✅ All images downloaded!");
                } else {
                    self.pb
                        .finish_with_message(format!("⚠️  Done, {} image(s) skipped", skipped));
                }
            }
            _ => {}
        }
    }
}
