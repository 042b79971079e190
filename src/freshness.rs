//! Installed version vs. resolved latest version

use serde::Serialize;

use crate::resolution::ResolutionOutcome;
use crate::version::{Comparison, VersionIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessVerdict {
    UpToDate,
    Outdated,
    /// Latest version unknown, or not comparable with the installed one
    Unknown,
    /// Same version, but the two sides report different build annotations
    EqualDifferentBuild,
}

impl FreshnessVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessVerdict::UpToDate => "up to date",
            FreshnessVerdict::Outdated => "outdated",
            FreshnessVerdict::Unknown => "unknown",
            FreshnessVerdict::EqualDifferentBuild => "same version, different build",
        }
    }
}

/// Verdict plus how installed relates to latest, when both were known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub verdict: FreshnessVerdict,
    /// Installed compared to latest
    pub relation: Option<Comparison>,
}

impl Assessment {
    /// Installed is ahead of the discovered "latest". Still up to date.
    pub fn installed_newer(&self) -> bool {
        self.relation == Some(Comparison::Greater)
    }
}

/// Verdict for an installed raw version against a resolution outcome. Pure.
pub fn evaluate(installed_raw: &str, outcome: &ResolutionOutcome) -> FreshnessVerdict {
    assess(&VersionIdentity::parse(installed_raw), outcome).verdict
}

pub fn assess(installed: &VersionIdentity, outcome: &ResolutionOutcome) -> Assessment {
    let Some(latest) = outcome.latest() else {
        return Assessment {
            verdict: FreshnessVerdict::Unknown,
            relation: None,
        };
    };

    let relation = installed.compare_to(latest);
    let verdict = match relation {
        Comparison::Less => FreshnessVerdict::Outdated,
        Comparison::Equal if builds_differ(installed, latest) => {
            FreshnessVerdict::EqualDifferentBuild
        }
        Comparison::Equal | Comparison::Greater => FreshnessVerdict::UpToDate,
        Comparison::Incomparable => FreshnessVerdict::Unknown,
    };

    Assessment {
        verdict,
        relation: Some(relation),
    }
}

fn builds_differ(installed: &VersionIdentity, latest: &VersionIdentity) -> bool {
    match (installed.build(), latest.build()) {
        (Some(a), Some(b)) => !a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}
