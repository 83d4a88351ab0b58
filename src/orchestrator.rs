//! Main orchestration logic: resolve, locate, fetch.

use crate::error::FetchError;
use crate::fetch::fetch_images;
use crate::locate::locate_images;
use crate::probe::HttpProbe;
use crate::report::{FetchEvent, Reporter};
use crate::resolve::resolve_product_id;
use crate::types::{FetchConfig, RunSummary};
use std::sync::Arc;

/// Builds the HTTP client shared by probing and downloading.
///
/// `request_timeout` bounds both connecting and each read from the socket.
pub fn build_client(config: &FetchConfig) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.request_timeout)
        .read_timeout(config.request_timeout)
        .user_agent(concat!("wbimg/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Downloads every image of the product named by `input`.
///
/// This is the main entry point. It performs the following steps:
///
/// 1. Resolves the article from a raw number or a catalog link
/// 2. Probes basket shards top-down for the one hosting the images
/// 3. Downloads the discovered images with a bounded worker pool
///
/// # Arguments
///
/// * `input` - Article number or catalog URL
/// * `config` - Fetch configuration
/// * `reporter` - Receives progress events
///
/// # Returns
///
/// A [`RunSummary`] on completion, even when nothing was found or every
/// download was skipped. Errors are reserved for invalid input or
/// configuration and for failing to create the target directory.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wbimg::{run, FetchConfig, TracingReporter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = FetchConfig::default();
/// let summary = run("https://www.wildberries.ru/catalog/7654321/detail.aspx", &config, Arc::new(TracingReporter)).await?;
/// println!("saved {} of {} images", summary.saved, summary.discovered);
/// # Ok(())
/// # }
/// ```
pub async fn run(
    input: &str,
    config: &FetchConfig,
    reporter: Arc<dyn Reporter>,
) -> Result<RunSummary, FetchError> {
    let client = build_client(config)?;
    run_with_client(input, config, &client, reporter).await
}

/// Same as [`run`], with a caller-provided HTTP client.
pub async fn run_with_client(
    input: &str,
    config: &FetchConfig,
    client: &reqwest::Client,
    reporter: Arc<dyn Reporter>,
) -> Result<RunSummary, FetchError> {
    config.validate()?;
    let product = resolve_product_id(input)?;
    reporter.report(&FetchEvent::Resolved {
        product: product.clone(),
    });

    let probe = HttpProbe::new(client.clone());
    let scan = locate_images(&probe, &product, config, reporter.as_ref()).await;

    if scan.is_empty() {
        return Ok(RunSummary {
            product,
            shard: None,
            directory: None,
            discovered: 0,
            saved: 0,
            skipped: 0,
            results: Vec::new(),
        });
    }

    let report = fetch_images(client, &product, &scan.images, config, reporter).await?;

    Ok(RunSummary {
        product,
        shard: scan.shard,
        discovered: scan.images.len(),
        saved: report.saved(),
        skipped: report.skipped(),
        directory: Some(report.directory),
        results: report.results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;

    #[tokio::test]
    async fn invalid_input_fails_before_any_request() {
        let reporter = Arc::new(MemoryReporter::new());
        let client = reqwest::Client::new();

        let result = run_with_client(
            "not a product",
            &FetchConfig::default(),
            &client,
            reporter.clone(),
        )
        .await;

        assert!(matches!(result, Err(FetchError::InvalidInput(_))));
        assert!(reporter.events().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = FetchConfig {
            max_concurrent_downloads: 0,
            ..FetchConfig::default()
        };

        let result = run("1234567", &config, Arc::new(MemoryReporter::new())).await;

        assert!(matches!(result, Err(FetchError::InvalidConfig(_))));
    }

    #[test]
    fn client_builds_with_default_config() {
        assert!(build_client(&FetchConfig::default()).is_ok());
    }
}
