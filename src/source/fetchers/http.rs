//! HTTP plumbing shared by the fetcher variants

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use tracing::{debug, warn};

use crate::error::FetchError;

const USER_AGENT: &str = concat!("version-tracker/", env!("CARGO_PKG_VERSION"));

/// Pooled HTTP client. Cloning shares the connection pool.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// GET `url` and return the body as text.
    ///
    /// The whole exchange (connect, headers, body) is bounded by `timeout`.
    pub async fn get_text(
        &self,
        url: &str,
        accept: Option<&str>,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let exchange = async {
            let response = request.send().await?;
            let response = check_status(response, url)?;
            Ok::<_, FetchError>(response.text().await?)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Request to {} exceeded {:?}", url, timeout);
                Err(FetchError::Timeout)
            }
        }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new()
    }
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response, FetchError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return Err(FetchError::NotFound(url.to_string()));
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(FetchError::RateLimited {
            retry_after_secs: retry_after_secs(response.headers()),
        });
    }

    if !status.is_success() {
        warn!("{} returned status {}", url, status);
        return Err(FetchError::NetworkFailure(format!(
            "Unexpected status: {}",
            status
        )));
    }

    Ok(response)
}

/// `Retry-After` in delta-seconds form
fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
