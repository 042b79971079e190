//! Structured update feeds: Sparkle appcasts and JSON documents

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::inventory::ApplicationIdentity;
use crate::source::fetcher::{Fetcher, mismatched};
use crate::source::fetchers::http::HttpSource;
use crate::source::strategy::{SourceStrategy, StrategyKind};
use crate::version::{Comparison, VersionIdentity};

/// `sparkle:shortVersionString` in attribute or element form
static SHORT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"sparkle:shortVersionString\s*=\s*"([^"]+)"|<sparkle:shortVersionString>\s*([^<]+?)\s*</sparkle:shortVersionString>"#,
    )
    .expect("valid regex")
});

/// `sparkle:version` (build number) in attribute or element form
static BUNDLE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"sparkle:version\s*=\s*"([^"]+)"|<sparkle:version>\s*([^<]+?)\s*</sparkle:version>"#,
    )
    .expect("valid regex")
});

pub struct FeedFetcher {
    http: HttpSource,
}

impl FeedFetcher {
    pub fn new(http: HttpSource) -> Self {
        Self { http }
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new(HttpSource::new())
    }
}

#[async_trait::async_trait]
impl Fetcher for FeedFetcher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Feed
    }

    async fn fetch(
        &self,
        app: &ApplicationIdentity,
        strategy: &SourceStrategy,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let SourceStrategy::Feed { url, json_pointer } = strategy else {
            return Err(mismatched(self.kind(), strategy));
        };

        debug!("Fetching feed {} for {}", url, app.key());

        match json_pointer {
            Some(pointer) => {
                let body = self
                    .http
                    .get_text(url, Some("application/json"), timeout)
                    .await?;
                version_at_pointer(&body, pointer)
            }
            None => {
                let body = self.http.get_text(url, None, timeout).await?;
                highest_appcast_version(&body).ok_or_else(|| {
                    warn!("No version found in appcast {}", url);
                    FetchError::ParseFailure(format!("no version in appcast {}", url))
                })
            }
        }
    }
}

fn version_at_pointer(body: &str, pointer: &str) -> Result<String, FetchError> {
    let document: serde_json::Value =
        serde_json::from_str(body).map_err(|e| FetchError::ParseFailure(e.to_string()))?;

    match document.pointer(pointer) {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(FetchError::ParseFailure(format!(
            "no version at JSON pointer {}",
            pointer
        ))),
    }
}

/// Highest version advertised by an appcast.
///
/// Items are not guaranteed to be newest-first, so every item is considered.
/// The marketing version (`shortVersionString`) is preferred; feeds that only
/// carry `sparkle:version` fall back to it.
fn highest_appcast_version(body: &str) -> Option<String> {
    let pick = |regex: &Regex| {
        let candidates: Vec<&str> = regex
            .captures_iter(body)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .collect();
        highest(&candidates)
    };

    pick(&SHORT_VERSION).or_else(|| pick(&BUNDLE_VERSION))
}

fn highest(candidates: &[&str]) -> Option<String> {
    let mut best: Option<VersionIdentity> = None;
    for candidate in candidates {
        let identity = VersionIdentity::parse(candidate);
        let replace = match &best {
            None => true,
            Some(current) => identity.compare_to(current) == Comparison::Greater,
        };
        if replace {
            best = Some(identity);
        }
    }
    best.map(|identity| identity.raw().to_string())
}
