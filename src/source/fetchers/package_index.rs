//! Package index lookups: Homebrew casks and GitHub releases

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::inventory::ApplicationIdentity;
use crate::source::fetcher::{Fetcher, mismatched};
use crate::source::fetchers::http::HttpSource;
use crate::source::strategy::{PackageIndex, SourceStrategy, StrategyKind};

/// Default base URL for the Homebrew formulae API
pub(crate) const DEFAULT_HOMEBREW_URL: &str = "https://formulae.brew.sh";

/// Default base URL for GitHub API
pub(crate) const DEFAULT_GITHUB_URL: &str = "https://api.github.com";

/// Response from `/api/cask/<token>.json`
#[derive(Debug, Deserialize)]
struct Cask {
    version: String,
}

/// Response from `/repos/<owner>/<repo>/releases/latest`
#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

pub struct PackageIndexFetcher {
    http: HttpSource,
    homebrew_url: String,
    github_url: String,
}

impl PackageIndexFetcher {
    /// Creates a fetcher with custom base URLs
    pub fn new(http: HttpSource, homebrew_url: &str, github_url: &str) -> Self {
        Self {
            http,
            homebrew_url: homebrew_url.trim_end_matches('/').to_string(),
            github_url: github_url.trim_end_matches('/').to_string(),
        }
    }

    async fn homebrew(&self, token: &str, timeout: Duration) -> Result<String, FetchError> {
        let url = format!("{}/api/cask/{}.json", self.homebrew_url, token);
        let body = self
            .http
            .get_text(&url, Some("application/json"), timeout)
            .await?;

        let cask: Cask = serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse Homebrew cask response: {}", e);
            FetchError::ParseFailure(e.to_string())
        })?;

        cask_version(&cask.version)
    }

    async fn github(&self, repo: &str, timeout: Duration) -> Result<String, FetchError> {
        let url = format!("{}/repos/{}/releases/latest", self.github_url, repo);
        let body = self
            .http
            .get_text(&url, Some("application/vnd.github+json"), timeout)
            .await?;

        let release: Release = serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse GitHub release response: {}", e);
            FetchError::ParseFailure(e.to_string())
        })?;

        Ok(release.tag_name)
    }
}

impl Default for PackageIndexFetcher {
    fn default() -> Self {
        Self::new(HttpSource::new(), DEFAULT_HOMEBREW_URL, DEFAULT_GITHUB_URL)
    }
}

#[async_trait::async_trait]
impl Fetcher for PackageIndexFetcher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PackageIndex
    }

    async fn fetch(
        &self,
        app: &ApplicationIdentity,
        strategy: &SourceStrategy,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let SourceStrategy::PackageIndex { index, name } = strategy else {
            return Err(mismatched(self.kind(), strategy));
        };

        debug!("Querying {:?} for {} ({})", index, name, app.key());

        match index {
            PackageIndex::Homebrew => self.homebrew(name, timeout).await,
            PackageIndex::GitHub => self.github(name, timeout).await,
        }
    }
}

/// Casks publish "version,build"; keep the build as an annotation.
/// `latest` means the cask does not track versions at all.
fn cask_version(version: &str) -> Result<String, FetchError> {
    let version = version.trim();
    if version.is_empty() || version == "latest" {
        return Err(FetchError::ParseFailure(format!(
            "cask does not publish a version: {:?}",
            version
        )));
    }

    match version.split_once(',') {
        Some((short, build)) if !build.is_empty() => Ok(format!("{} ({})", short, build)),
        Some((short, _)) => Ok(short.to_string()),
        None => Ok(version.to_string()),
    }
}
