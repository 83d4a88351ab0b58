//! Existence checks against basket image URLs.

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

/// Answers whether an image exists at a URL without fetching its body.
///
/// `Ok(false)` means the image is missing. `Err` means the check itself
/// failed (connection error, server overload) and says nothing about the
/// image.
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn exists(&self, url: &str) -> Result<bool, FetchError>;
}

/// Probes with HTTP `HEAD` requests.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageProbe for HttpProbe {
    async fn exists(&self, url: &str) -> Result<bool, FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| FetchError::ProbeFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        debug!(%url, %status, "HEAD");

        if status.is_success() {
            Ok(true)
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(FetchError::ProbeFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            })
        } else {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn probe_status(status: u16) -> Result<bool, FetchError> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/images/big/1.webp"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let url = format!("{}/images/big/1.webp", server.uri());
        HttpProbe::new(reqwest::Client::new()).exists(&url).await
    }

    #[tokio::test]
    async fn ok_means_exists() {
        assert!(probe_status(200).await.unwrap());
    }

    #[tokio::test]
    async fn not_found_means_missing() {
        assert!(!probe_status(404).await.unwrap());
        assert!(!probe_status(403).await.unwrap());
    }

    #[tokio::test]
    async fn server_errors_are_probe_failures() {
        for status in [500, 503, 429] {
            assert!(
                matches!(
                    probe_status(status).await,
                    Err(FetchError::ProbeFailed { .. })
                ),
                "HTTP {} should fail the probe",
                status
            );
        }
    }

    #[tokio::test]
    async fn connection_errors_are_probe_failures() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{}/images/big/1.webp", port);

        let result = HttpProbe::new(reqwest::Client::new()).exists(&url).await;
        assert!(matches!(result, Err(FetchError::ProbeFailed { .. })));
    }
}
