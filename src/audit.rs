//! One audit run: inventory in, freshness report out

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::error::InventoryError;
use crate::freshness::{FreshnessVerdict, assess};
use crate::inventory::{ApplicationIdentity, InstalledApp, Inventory};
use crate::resolution::{ResolutionOutcome, Resolver};
use crate::version::{Comparison, VersionIdentity};

/// Result for one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppReport {
    pub installed: VersionIdentity,
    pub outcome: ResolutionOutcome,
    pub verdict: FreshnessVerdict,
    /// Installed compared to latest, when a latest version was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<Comparison>,
}

impl AppReport {
    pub fn installed_newer(&self) -> bool {
        self.relation == Some(Comparison::Greater)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerdictCounts {
    pub up_to_date: usize,
    pub outdated: usize,
    pub unknown: usize,
    pub equal_different_build: usize,
}

/// Per-application results in inventory order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreshnessReport {
    entries: IndexMap<ApplicationIdentity, AppReport>,
}

impl FreshnessReport {
    pub fn get(&self, app: &ApplicationIdentity) -> Option<&AppReport> {
        self.entries.get(app)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ApplicationIdentity, &AppReport)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applications with a newer release available
    pub fn outdated(&self) -> impl Iterator<Item = (&ApplicationIdentity, &AppReport)> {
        self.entries
            .iter()
            .filter(|(_, report)| report.verdict == FreshnessVerdict::Outdated)
    }

    /// Applications whose installed version is ahead of the latest release found
    pub fn installed_newer(&self) -> impl Iterator<Item = (&ApplicationIdentity, &AppReport)> {
        self.entries
            .iter()
            .filter(|(_, report)| report.installed_newer())
    }

    pub fn counts(&self) -> VerdictCounts {
        let mut counts = VerdictCounts::default();
        for report in self.entries.values() {
            match report.verdict {
                FreshnessVerdict::UpToDate => counts.up_to_date += 1,
                FreshnessVerdict::Outdated => counts.outdated += 1,
                FreshnessVerdict::Unknown => counts.unknown += 1,
                FreshnessVerdict::EqualDifferentBuild => counts.equal_different_build += 1,
            }
        }
        counts
    }
}

#[derive(Serialize)]
struct ReportRow<'a> {
    #[serde(flatten)]
    app: &'a ApplicationIdentity,
    #[serde(flatten)]
    report: &'a AppReport,
}

/// Serialized as a list: identities are structs and cannot key a JSON object
impl Serialize for FreshnessReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            self.entries
                .iter()
                .map(|(app, report)| ReportRow { app, report }),
        )
    }
}

pub struct Auditor {
    resolver: Resolver,
    ignored: HashSet<String>,
    name_mappings: HashMap<String, String>,
}

impl Auditor {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            ignored: HashSet::new(),
            name_mappings: HashMap::new(),
        }
    }

    /// Skip applications reporting one of these display names
    pub fn with_ignored(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.ignored = names.into_iter().collect();
        self
    }

    /// Replace reported display names
    pub fn with_name_mappings(mut self, mappings: HashMap<String, String>) -> Self {
        self.name_mappings = mappings;
        self
    }

    pub async fn audit(&self, inventory: &dyn Inventory) -> Result<FreshnessReport, InventoryError> {
        let apps = inventory.enumerate()?;
        Ok(self.audit_apps(apps).await)
    }

    pub async fn audit_apps(&self, apps: Vec<InstalledApp>) -> FreshnessReport {
        let mut installed: IndexMap<ApplicationIdentity, String> = IndexMap::new();
        for app in apps {
            if self.ignored.contains(app.identity.name()) {
                info!("Ignoring {} ({})", app.identity.name(), app.identity.key());
                continue;
            }
            let identity = match self.name_mappings.get(app.identity.name()) {
                Some(name) => app.identity.renamed(name.as_str()),
                None => app.identity,
            };
            installed.entry(identity).or_insert(app.installed);
        }

        let batch: Vec<ApplicationIdentity> = installed.keys().cloned().collect();
        let mut outcomes = self.resolver.resolve(&batch).await;

        let entries = installed
            .into_iter()
            .map(|(app, installed_raw)| {
                let outcome = outcomes
                    .swap_remove(&app)
                    .unwrap_or(ResolutionOutcome::TimedOut);
                let report = self.report(&app, &installed_raw, outcome);
                (app, report)
            })
            .collect();

        let report = FreshnessReport { entries };
        let counts = report.counts();
        info!(
            "Audited {} applications: {} outdated, {} up to date, {} unknown",
            report.len(),
            counts.outdated,
            counts.up_to_date + counts.equal_different_build,
            counts.unknown
        );
        report
    }

    fn report(
        &self,
        app: &ApplicationIdentity,
        installed_raw: &str,
        outcome: ResolutionOutcome,
    ) -> AppReport {
        let installed = VersionIdentity::parse(installed_raw);
        let assessment = assess(&installed, &outcome);

        if assessment.relation == Some(Comparison::Incomparable) {
            if let Some(latest) = outcome.latest() {
                warn!(
                    "Cannot compare installed {:?} with latest {:?} for {} ({}); check its source entry",
                    installed.raw(),
                    latest.raw(),
                    app.name(),
                    app.key()
                );
            }
        }

        AppReport {
            installed,
            outcome,
            verdict: assessment.verdict,
            relation: assessment.relation,
        }
    }
}
