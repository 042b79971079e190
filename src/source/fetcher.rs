//! Fetcher trait for querying one kind of remote source

use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::error::FetchError;
use crate::inventory::ApplicationIdentity;
use crate::source::strategy::{SourceStrategy, StrategyKind};

/// Capability: given an application and a strategy of this fetcher's kind,
/// produce the raw latest version string or a typed failure.
///
/// Implementations hold nothing but a pooled client, never block past
/// `timeout`, and report every failure through the returned `Result`.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Kind of strategy this fetcher handles
    fn kind(&self) -> StrategyKind;

    /// Query the remote source described by `strategy`
    ///
    /// # Returns
    /// * `Ok(String)` - Raw latest version text as published
    /// * `Err(FetchError)` - Why no version could be obtained
    async fn fetch(
        &self,
        app: &ApplicationIdentity,
        strategy: &SourceStrategy,
        timeout: Duration,
    ) -> Result<String, FetchError>;
}

/// Error for a strategy routed to a fetcher of another kind
pub(crate) fn mismatched(expected: StrategyKind, strategy: &SourceStrategy) -> FetchError {
    FetchError::ParseFailure(format!(
        "{} fetcher cannot handle {} strategy",
        expected.as_str(),
        strategy.kind().as_str()
    ))
}
