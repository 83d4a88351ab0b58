//! wbimg - Wildberries product image downloader
//!
//! This library resolves a product article, finds the basket shard that
//! serves its images and downloads every image to local storage.
//!
//! # Features
//!
//! - **Flexible Input**: Accepts a bare article or any catalog link
//! - **Shard Discovery**: Probes basket shards top-down with `HEAD` requests
//! - **Parallel Downloads**: Fixed pool of download workers
//! - **Automatic Retry**: Bounded retries with a fixed delay, failures are skipped
//! - **Pluggable Reporting**: Progress is emitted as events to a [`Reporter`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wbimg::{run, FetchConfig, TracingReporter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig::default();
//! let summary = run("7654321", &config, Arc::new(TracingReporter)).await?;
//! println!("{:?}", summary.status());
//! # Ok(())
//! # }
//! ```

mod error;
mod fetch;
mod locate;
mod orchestrator;
mod probe;
mod report;
mod resolve;
mod retry;
mod types;

pub use error::FetchError;
pub use fetch::{download_image, fetch_images, FetchReport};
pub use locate::{image_url, locate_images};
pub use orchestrator::{build_client, run, run_with_client};
pub use probe::{HttpProbe, ImageProbe};
pub use report::{FetchEvent, MemoryReporter, ProgressReporter, Reporter, TracingReporter};
pub use resolve::resolve_product_id;
pub use retry::{with_retry, Exhausted, RetryPolicy};
pub use types::{
    DownloadOutcome, DownloadResult, FetchConfig, ImageRef, ProductId, RunStatus, RunSummary,
    ShardId, ShardScan,
};
