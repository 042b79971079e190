//! Fetcher implementations, one per strategy kind

pub mod feed;
pub mod http;
pub mod package_index;
pub mod web_page;

use std::collections::HashMap;
use std::sync::Arc;

pub use feed::FeedFetcher;
pub use http::HttpSource;
pub use package_index::PackageIndexFetcher;
pub use web_page::WebPageFetcher;

use crate::source::fetcher::Fetcher;
use crate::source::strategy::StrategyKind;

/// Production fetchers sharing one connection pool
pub fn default_fetchers() -> HashMap<StrategyKind, Arc<dyn Fetcher>> {
    let http = HttpSource::new();

    let fetchers: Vec<Arc<dyn Fetcher>> = vec![
        Arc::new(FeedFetcher::new(http.clone())),
        Arc::new(PackageIndexFetcher::new(
            http.clone(),
            package_index::DEFAULT_HOMEBREW_URL,
            package_index::DEFAULT_GITHUB_URL,
        )),
        Arc::new(WebPageFetcher::new(http)),
    ];

    fetchers.into_iter().map(|f| (f.kind(), f)).collect()
}
