//! Image download stage.

use crate::error::FetchError;
use crate::report::{FetchEvent, Reporter};
use crate::retry::{with_retry, RetryPolicy};
use crate::types::{DownloadOutcome, DownloadResult, FetchConfig, ImageRef, ProductId};
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Outcome of downloading every discovered image of one article.
#[derive(Serialize, Debug, Clone)]
pub struct FetchReport {
    /// Directory the images were written to.
    pub directory: PathBuf,
    /// One entry per image, ordered by image index.
    pub results: Vec<DownloadResult>,
}

impl FetchReport {
    pub fn saved(&self) -> usize {
        self.results.iter().filter(|r| r.is_saved()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results.len() - self.saved()
    }
}

/// Downloads `images` into `<output_dir>/<product>/` with a fixed pool of
/// `max_concurrent_downloads` workers.
///
/// Individual failures are retried per `download_attempts` and then recorded
/// as skipped; they never fail the call. Only failing to create the target
/// directory is an error.
pub async fn fetch_images(
    client: &reqwest::Client,
    product: &ProductId,
    images: &[ImageRef],
    config: &FetchConfig,
    reporter: Arc<dyn Reporter>,
) -> Result<FetchReport, FetchError> {
    let directory = config.output_dir.join(product.as_str());
    tokio::fs::create_dir_all(&directory).await?;

    let queue = Arc::new(Mutex::new(images.iter().cloned().collect::<VecDeque<_>>()));
    let job = Arc::new(DownloadJob {
        client: client.clone(),
        directory: directory.clone(),
        config: config.clone(),
        policy: RetryPolicy::new(config.download_attempts, config.retry_delay),
        reporter: Arc::clone(&reporter),
    });

    let workers = config.max_concurrent_downloads.min(images.len());
    let mut pool = JoinSet::new();
    for worker in 0..workers {
        let queue = Arc::clone(&queue);
        let job = Arc::clone(&job);

        pool.spawn(async move {
            let mut results = Vec::new();
            while let Some(image) = next_image(&queue) {
                debug!(worker, index = image.index, "Picked up image");
                results.push(job.run(image).await);
            }
            results
        });
    }

    // Wait for every worker before reporting.
    let mut results = Vec::with_capacity(images.len());
    let mut worker_failure = None;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(batch) => results.extend(batch),
            Err(e) => {
                error!("Download worker failed: {}", e);
                worker_failure.get_or_insert_with(|| e.to_string());
            }
        }
    }

    // Images held by a failed worker have no result yet.
    if let Some(failure) = worker_failure {
        let recorded: HashSet<u32> = results.iter().map(|r| r.image.index).collect();
        for image in images.iter().filter(|i| !recorded.contains(&i.index)) {
            let error = format!("download worker failed: {}", failure);
            reporter.report(&FetchEvent::DownloadSkipped {
                index: image.index,
                url: image.url.clone(),
                attempts: 0,
                error: error.clone(),
            });
            results.push(DownloadResult {
                image: image.clone(),
                outcome: DownloadOutcome::Skipped { attempts: 0, error },
            });
        }
    }
    results.sort_by_key(|r| r.image.index);

    let report = FetchReport { directory, results };
    reporter.report(&FetchEvent::Finished {
        directory: report.directory.clone(),
        saved: report.saved(),
        skipped: report.skipped(),
    });
    Ok(report)
}

fn next_image(queue: &Mutex<VecDeque<ImageRef>>) -> Option<ImageRef> {
    match queue.lock() {
        Ok(mut queue) => queue.pop_front(),
        Err(poisoned) => poisoned.into_inner().pop_front(),
    }
}

/// Everything a worker needs to download one image.
struct DownloadJob {
    client: reqwest::Client,
    directory: PathBuf,
    config: FetchConfig,
    policy: RetryPolicy,
    reporter: Arc<dyn Reporter>,
}

impl DownloadJob {
    async fn run(&self, image: ImageRef) -> DownloadResult {
        let path = self.directory.join(self.config.file_name(image.index));
        self.reporter.report(&FetchEvent::DownloadStarted {
            index: image.index,
            url: image.url.clone(),
        });

        let result = with_retry(
            &self.policy,
            |_| download_image(&self.client, &image.url, &path),
            |attempt, e| {
                self.reporter.report(&FetchEvent::DownloadRetrying {
                    index: image.index,
                    attempt,
                    max_attempts: self.config.download_attempts,
                    error: e.to_string(),
                })
            },
        )
        .await;

        let outcome = match result {
            Ok((bytes, attempts)) => {
                self.reporter.report(&FetchEvent::DownloadSaved {
                    index: image.index,
                    path: path.clone(),
                    bytes,
                });
                DownloadOutcome::Saved {
                    path,
                    bytes,
                    attempts,
                }
            }
            Err(exhausted) => {
                let error = exhausted.error.to_string();
                self.reporter.report(&FetchEvent::DownloadSkipped {
                    index: image.index,
                    url: image.url.clone(),
                    attempts: exhausted.attempts,
                    error: error.clone(),
                });
                DownloadOutcome::Skipped {
                    attempts: exhausted.attempts,
                    error,
                }
            }
        };

        DownloadResult { image, outcome }
    }
}

/// Downloads a single image to `path`, returning the number of bytes written.
///
/// The body is streamed into `<path>.part`, which is renamed to `path` only
/// once the download is complete. A failed attempt leaves nothing behind.
pub async fn download_image(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<u64, FetchError> {
    let part_path = partial_path(path);

    let result = match stream_to_file(client, url, &part_path).await {
        Ok(bytes) => tokio::fs::rename(&part_path, path)
            .await
            .map(|_| bytes)
            .map_err(FetchError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        let _ = tokio::fs::remove_file(&part_path).await;
    }
    result
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(
    client: &reqwest::Client,
    url: &str,
    path: &Path,
) -> Result<u64, FetchError> {
    let response = client.get(url).send().await?.error_for_status()?;
    let content_length = response.content_length();

    let mut file = BufWriter::new(tokio::fs::File::create(path).await?);
    let mut byte_stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(piece) = byte_stream.next().await {
        let chunk = piece?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if let Some(expected) = content_length {
        if written != expected {
            return Err(FetchError::DownloadFailed(format!(
                "size mismatch for {}: expected {} bytes, got {} bytes",
                url, expected, written
            )));
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(output: &TempDir) -> FetchConfig {
        FetchConfig {
            output_dir: output.path().to_path_buf(),
            retry_delay: Duration::ZERO,
            ..FetchConfig::default()
        }
    }

    fn product() -> ProductId {
        ProductId::parse("7654321").unwrap()
    }

    fn image(server: &MockServer, index: u32) -> ImageRef {
        ImageRef {
            url: format!("{}/images/big/{}.webp", server.uri(), index),
            index,
        }
    }

    async fn serve_image(server: &MockServer, index: u32, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(format!("/images/big/{}.webp", index)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    fn leftover_partials(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "part"))
            .collect()
    }

    #[tokio::test]
    async fn saves_every_image_by_index() {
        let server = MockServer::start().await;
        for index in 1..=3 {
            serve_image(&server, index, format!("image-{}", index).as_bytes()).await;
        }
        let output = TempDir::new().unwrap();
        let images: Vec<_> = (1..=3).map(|i| image(&server, i)).collect();

        let report = fetch_images(
            &reqwest::Client::new(),
            &product(),
            &images,
            &config(&output),
            Arc::new(MemoryReporter::new()),
        )
        .await
        .unwrap();

        let directory = output.path().join("7654321");
        assert_eq!(report.directory, directory);
        assert_eq!(report.saved(), 3);
        assert_eq!(report.skipped(), 0);
        for index in 1..=3 {
            let content = std::fs::read(directory.join(format!("{}.webp", index))).unwrap();
            assert_eq!(content, format!("image-{}", index).into_bytes());
        }
        assert_eq!(
            report.results.iter().map(|r| r.image.index).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(leftover_partials(&directory).is_empty());
    }

    #[tokio::test]
    async fn two_failures_then_success_is_saved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/big/1.webp"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        serve_image(&server, 1, b"third time lucky").await;

        let output = TempDir::new().unwrap();
        let reporter = Arc::new(MemoryReporter::new());

        let report = fetch_images(
            &reqwest::Client::new(),
            &product(),
            &[image(&server, 1)],
            &config(&output),
            reporter.clone(),
        )
        .await
        .unwrap();

        let path = output.path().join("7654321").join("1.webp");
        assert_eq!(
            report.results[0].outcome,
            DownloadOutcome::Saved {
                path: path.clone(),
                bytes: 16,
                attempts: 3
            }
        );
        assert_eq!(std::fs::read(path).unwrap(), b"third time lucky");

        let retries: Vec<u32> = reporter
            .events()
            .iter()
            .filter_map(|e| match e {
                FetchEvent::DownloadRetrying { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn exhausted_image_is_skipped_without_failing_the_batch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/images/big/1.webp"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;
        serve_image(&server, 2, b"fine").await;

        let output = TempDir::new().unwrap();
        let reporter = Arc::new(MemoryReporter::new());

        let report = fetch_images(
            &reqwest::Client::new(),
            &product(),
            &[image(&server, 1), image(&server, 2)],
            &config(&output),
            reporter.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.saved(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(matches!(
            report.results[0].outcome,
            DownloadOutcome::Skipped { attempts: 3, .. }
        ));

        let directory = output.path().join("7654321");
        assert!(!directory.join("1.webp").exists());
        assert!(directory.join("2.webp").exists());
        assert!(leftover_partials(&directory).is_empty());

        assert!(reporter.events().iter().any(|e| matches!(
            e,
            FetchEvent::DownloadSkipped {
                index: 1,
                attempts: 3,
                ..
            }
        )));
        assert_eq!(
            reporter.events().last(),
            Some(&FetchEvent::Finished {
                directory,
                saved: 1,
                skipped: 1
            })
        );
    }

    /// Tracks how many downloads are between start and finish.
    #[derive(Default)]
    struct InFlightReporter {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Reporter for InFlightReporter {
        fn report(&self, event: &FetchEvent) {
            match event {
                FetchEvent::DownloadStarted { .. } => {
                    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                    self.peak.fetch_max(now, Ordering::SeqCst);
                }
                FetchEvent::DownloadSaved { .. } | FetchEvent::DownloadSkipped { .. } => {
                    self.current.fetch_sub(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn at_most_three_downloads_run_at_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_millis(150)),
            )
            .mount(&server)
            .await;

        let output = TempDir::new().unwrap();
        let images: Vec<_> = (1..=7).map(|i| image(&server, i)).collect();
        let reporter = Arc::new(InFlightReporter::default());
        let started = Instant::now();

        let report = fetch_images(
            &reqwest::Client::new(),
            &product(),
            &images,
            &config(&output),
            reporter.clone(),
        )
        .await
        .unwrap();

        assert_eq!(report.saved(), 7);
        assert_eq!(reporter.peak.load(Ordering::SeqCst), 3);
        assert_eq!(reporter.current.load(Ordering::SeqCst), 0);
        // Seven images through three workers need three rounds.
        assert!(started.elapsed() >= Duration::from_millis(450));
    }

    /// Panics the worker that picks up `index`.
    struct PanicOn {
        index: u32,
    }

    impl Reporter for PanicOn {
        fn report(&self, event: &FetchEvent) {
            if let FetchEvent::DownloadStarted { index, .. } = event {
                if *index == self.index {
                    panic!("reporter failure on image {}", index);
                }
            }
        }
    }

    #[tokio::test]
    async fn images_lost_with_a_failed_worker_are_skipped() {
        let server = MockServer::start().await;
        for index in 1..=3 {
            serve_image(&server, index, b"ok").await;
        }
        let output = TempDir::new().unwrap();
        let images: Vec<_> = (1..=3).map(|i| image(&server, i)).collect();

        let report = fetch_images(
            &reqwest::Client::new(),
            &product(),
            &images,
            &config(&output),
            Arc::new(PanicOn { index: 2 }),
        )
        .await
        .unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.saved() + report.skipped(), images.len());
        assert!(report.results[0].is_saved());
        assert!(matches!(
            &report.results[1].outcome,
            DownloadOutcome::Skipped { attempts: 0, error } if error.contains("worker failed")
        ));
        assert!(report.results[2].is_saved());
    }

    #[tokio::test]
    async fn existing_directory_is_reused() {
        let output = TempDir::new().unwrap();
        let directory = output.path().join("7654321");
        std::fs::create_dir_all(&directory).unwrap();
        std::fs::write(directory.join("keep.txt"), b"old").unwrap();

        let report = fetch_images(
            &reqwest::Client::new(),
            &product(),
            &[],
            &config(&output),
            Arc::new(MemoryReporter::new()),
        )
        .await
        .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(std::fs::read(directory.join("keep.txt")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn failed_rename_removes_partial_file() {
        let server = MockServer::start().await;
        serve_image(&server, 1, b"body").await;
        let output = TempDir::new().unwrap();
        // A non-empty directory in the way makes the final rename fail.
        let target = output.path().join("1.webp");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        let result = download_image(
            &reqwest::Client::new(),
            &format!("{}/images/big/1.webp", server.uri()),
            &target,
        )
        .await;

        assert!(matches!(result, Err(FetchError::IoError(_))));
        assert!(!partial_path(&target).exists());
        assert!(target.join("occupied").is_dir());
    }

    #[tokio::test]
    async fn download_image_reports_http_errors() {
        let server = MockServer::start().await;
        let output = TempDir::new().unwrap();
        let target = output.path().join("1.webp");

        let result = download_image(
            &reqwest::Client::new(),
            &format!("{}/images/big/1.webp", server.uri()),
            &target,
        )
        .await;

        assert!(matches!(result, Err(FetchError::ReqwestError(_))));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }
}
