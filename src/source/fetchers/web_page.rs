//! Version scraped out of an HTML page

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::inventory::ApplicationIdentity;
use crate::source::fetcher::{Fetcher, mismatched};
use crate::source::fetchers::http::HttpSource;
use crate::source::strategy::{SourceStrategy, StrategyKind};

static TABLE_CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").expect("valid regex"));

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

pub struct WebPageFetcher {
    http: HttpSource,
    /// Compiled user patterns, keyed by their source text
    patterns: Mutex<HashMap<String, Regex>>,
}

impl WebPageFetcher {
    pub fn new(http: HttpSource) -> Self {
        Self {
            http,
            patterns: Mutex::new(HashMap::new()),
        }
    }

    fn compiled(&self, pattern: &str) -> Result<Regex, FetchError> {
        let mut patterns = self
            .patterns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(regex) = patterns.get(pattern) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(pattern).map_err(|e| FetchError::ParseFailure(e.to_string()))?;
        patterns.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl Default for WebPageFetcher {
    fn default() -> Self {
        Self::new(HttpSource::new())
    }
}

#[async_trait::async_trait]
impl Fetcher for WebPageFetcher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WebPage
    }

    async fn fetch(
        &self,
        app: &ApplicationIdentity,
        strategy: &SourceStrategy,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let SourceStrategy::WebPage {
            url,
            pattern,
            label,
        } = strategy
        else {
            return Err(mismatched(self.kind(), strategy));
        };

        debug!("Scraping {} for {}", url, app.key());
        let body = self.http.get_text(url, Some("text/html"), timeout).await?;

        let found = match (pattern, label) {
            (Some(pattern), _) => capture(&body, &self.compiled(pattern)?),
            (None, Some(label)) => cell_after_label(&body, label),
            (None, None) => {
                return Err(FetchError::ParseFailure(
                    "web page strategy has neither pattern nor label".to_string(),
                ));
            }
        };

        match found {
            Some(version) if !version.is_empty() => Ok(version),
            _ => {
                warn!("No version found on {}", url);
                Err(FetchError::ParseFailure(format!("no version on {}", url)))
            }
        }
    }
}

/// First capture group of `pattern`, with markup stripped
fn capture(body: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| cell_text(m.as_str()))
}

/// Text of the table cell that follows the cell reading exactly `label`
fn cell_after_label(body: &str, label: &str) -> Option<String> {
    let cells: Vec<String> = TABLE_CELL
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| cell_text(m.as_str()))
        .collect();

    cells
        .windows(2)
        .find(|pair| pair[0] == label.trim())
        .map(|pair| pair[1].clone())
}

fn cell_text(html: &str) -> String {
    let text = TAG.replace_all(html, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
