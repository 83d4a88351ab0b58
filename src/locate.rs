//! Basket shard discovery.
//!
//! Images for an article live on exactly one basket shard. Shards are
//! scanned from the highest number down; on each shard, indices are probed
//! from 1 until the first gap. The first shard with at least one image wins
//! and the scan stops there.

use crate::probe::ImageProbe;
use crate::report::{FetchEvent, Reporter};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{FetchConfig, ImageRef, ProductId, ShardId, ShardScan};

/// Builds the big-image URL for an article on a shard.
///
/// # Example
///
/// ```
/// use wbimg::{image_url, FetchConfig, ProductId, ShardId};
///
/// let id = ProductId::parse("1234567").unwrap();
/// assert_eq!(
///     image_url(&FetchConfig::default(), &id, ShardId(3), 1),
///     "https://basket-03.wbbasket.ru/vol1234/part123456/1234567/images/big/1.webp"
/// );
/// ```
pub fn image_url(config: &FetchConfig, product: &ProductId, shard: ShardId, index: u32) -> String {
    format!(
        "{}://basket-{}.{}/vol{}/part{}/{}/images/big/{}.{}",
        config.scheme,
        shard,
        config.host,
        product.vol_prefix(),
        product.part_prefix(),
        product,
        index,
        config.extension
    )
}

/// Finds the shard hosting `product` and lists its images.
///
/// Probing is strictly sequential. An empty [`ShardScan`] is returned when
/// no shard has any image; that is not an error.
pub async fn locate_images(
    probe: &dyn ImageProbe,
    product: &ProductId,
    config: &FetchConfig,
    reporter: &dyn Reporter,
) -> ShardScan {
    for shard in config.shards() {
        let images = scan_shard(probe, product, shard, config, reporter).await;
        reporter.report(&FetchEvent::ShardProbed {
            shard,
            hits: images.len(),
        });

        if !images.is_empty() {
            reporter.report(&FetchEvent::ShardSelected {
                shard,
                images: images.len(),
            });
            return ShardScan {
                shard: Some(shard),
                images,
            };
        }
    }

    reporter.report(&FetchEvent::NothingFound {
        product: product.clone(),
    });
    ShardScan::default()
}

/// Probes indices `1..=max_images` on one shard, stopping at the first gap.
async fn scan_shard(
    probe: &dyn ImageProbe,
    product: &ProductId,
    shard: ShardId,
    config: &FetchConfig,
    reporter: &dyn Reporter,
) -> Vec<ImageRef> {
    let policy = RetryPolicy::new(config.probe_attempts, config.probe_retry_delay);
    let mut images = Vec::new();

    for index in 1..=config.max_images {
        let url = image_url(config, product, shard, index);

        let exists = with_retry(&policy, |_| probe.exists(&url), |_, _| {}).await;
        match exists {
            Ok((true, _)) => images.push(ImageRef { url, index }),
            Ok((false, _)) => break,
            Err(exhausted) => {
                reporter.report(&FetchEvent::ProbeFailed {
                    shard,
                    index,
                    url,
                    error: exhausted.error.to_string(),
                });
                break;
            }
        }
    }

    images
}
