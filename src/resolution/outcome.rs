//! Per-application result of a resolution run

use serde::Serialize;

use crate::error::FetchError;
use crate::source::StrategyKind;
use crate::version::VersionIdentity;

/// Why no latest version could be determined
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The registry has no strategy for the application
    NoStrategy,
    /// A strategy was selected but no fetcher handles its kind
    NoFetcher { kind: StrategyKind },
    /// Every strategy failed; carries the last failure
    Fetch { error: FetchError },
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnresolvedReason::NoStrategy => write!(f, "no source configured"),
            UnresolvedReason::NoFetcher { kind } => {
                write!(f, "no fetcher for {} sources", kind.as_str())
            }
            UnresolvedReason::Fetch { error } => write!(f, "{}", error),
        }
    }
}

/// Produced once per application per run, never mutated afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Resolved {
        latest: VersionIdentity,
        /// Kind of source that answered
        source: StrategyKind,
    },
    Unresolved(UnresolvedReason),
    /// Batch deadline expired before the application finished
    TimedOut,
}

impl ResolutionOutcome {
    pub fn resolved(latest: &str, source: StrategyKind) -> Self {
        ResolutionOutcome::Resolved {
            latest: VersionIdentity::parse(latest),
            source,
        }
    }

    pub fn latest(&self) -> Option<&VersionIdentity> {
        match self {
            ResolutionOutcome::Resolved { latest, .. } => Some(latest),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionOutcome::Resolved { .. })
    }
}
