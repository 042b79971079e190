//! Data-driven table mapping application identifiers to lookup strategies
//!
//! Entries are keyed by an identifier pattern. A pattern without `*` matches
//! one identifier exactly; `*` matches any run of characters
//! (`com.microsoft.*`, `*`). For an application, strategies are collected in
//! this order:
//!
//! 1. the exact entry for its lookup key (aliased identifier), then for its
//!    original identifier
//! 2. every matching wildcard entry, most specific (most literal characters)
//!    first, table order breaking ties
//!
//! Duplicates are dropped, so a generic fallback listed under `*` is tried
//! once, after everything more specific.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::inventory::ApplicationIdentity;
use crate::source::strategy::{ID_PLACEHOLDER, SourceStrategy};

/// One row of the registry table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub pattern: String,
    #[serde(default)]
    pub strategies: Vec<SourceStrategy>,
}

impl SourceEntry {
    pub fn new(pattern: impl Into<String>, strategies: Vec<SourceStrategy>) -> Self {
        Self {
            pattern: pattern.into(),
            strategies,
        }
    }
}

struct WildcardEntry {
    matcher: Regex,
    specificity: usize,
    strategies: Vec<SourceStrategy>,
}

pub struct SourceRegistry {
    exact: HashMap<String, Vec<SourceStrategy>>,
    wildcards: Vec<WildcardEntry>,
    aliases: HashMap<String, String>,
}

impl SourceRegistry {
    /// Build the registry, validating every entry up front
    pub fn new(
        entries: Vec<SourceEntry>,
        aliases: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut exact: HashMap<String, Vec<SourceStrategy>> = HashMap::new();
        let mut wildcards = Vec::new();

        for entry in entries {
            let pattern = entry.pattern.trim().to_string();
            if pattern.is_empty() {
                return Err(ConfigError::invalid_value(
                    "sources.pattern",
                    "pattern must not be empty",
                ));
            }

            for strategy in &entry.strategies {
                validate_strategy(&pattern, strategy)?;
            }

            if pattern.contains('*') {
                wildcards.push(WildcardEntry {
                    matcher: wildcard_regex(&pattern)?,
                    specificity: pattern.chars().filter(|c| *c != '*').count(),
                    strategies: entry.strategies,
                });
            } else {
                // Repeated exact entries append in table order
                exact.entry(pattern).or_default().extend(entry.strategies);
            }
        }

        // Stable sort keeps table order among equally specific patterns
        wildcards.sort_by(|a, b| b.specificity.cmp(&a.specificity));

        Ok(Self {
            exact,
            wildcards,
            aliases,
        })
    }

    /// Identifier used for matching and `{id}` expansion
    pub fn lookup_key<'a>(&'a self, app: &'a ApplicationIdentity) -> &'a str {
        self.aliases
            .get(app.key())
            .map(String::as_str)
            .unwrap_or(app.key())
    }

    /// Ordered candidate strategies for an application. Pure.
    pub fn strategies_for(&self, app: &ApplicationIdentity) -> Vec<SourceStrategy> {
        let lookup_key = self.lookup_key(app);
        let mut candidates: Vec<&SourceStrategy> = Vec::new();

        if let Some(strategies) = self.exact.get(lookup_key) {
            candidates.extend(strategies);
        }
        if lookup_key != app.key() {
            if let Some(strategies) = self.exact.get(app.key()) {
                candidates.extend(strategies);
            }
        }
        for wildcard in &self.wildcards {
            if wildcard.matcher.is_match(lookup_key) {
                candidates.extend(&wildcard.strategies);
            }
        }

        let mut expanded: Vec<SourceStrategy> = Vec::with_capacity(candidates.len());
        for strategy in candidates {
            let strategy = strategy.expand(lookup_key);
            if !expanded.contains(&strategy) {
                expanded.push(strategy);
            }
        }

        debug!(
            "{} candidate strategies for {} (lookup key {})",
            expanded.len(),
            app.key(),
            lookup_key
        );
        expanded
    }
}

fn wildcard_regex(pattern: &str) -> Result<Regex, ConfigError> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body)).map_err(|e| ConfigError::InvalidPattern {
        source_pattern: pattern.to_string(),
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

fn validate_strategy(source_pattern: &str, strategy: &SourceStrategy) -> Result<(), ConfigError> {
    match strategy {
        SourceStrategy::Feed { url, json_pointer } => {
            validate_url(source_pattern, url)?;
            if let Some(pointer) = json_pointer {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(ConfigError::InvalidPattern {
                        source_pattern: source_pattern.to_string(),
                        pattern: pointer.clone(),
                        message: "JSON pointer must start with '/'".to_string(),
                    });
                }
            }
        }
        SourceStrategy::PackageIndex { name, .. } => {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "sources.strategies.name",
                    format!("empty package name for source '{}'", source_pattern),
                ));
            }
        }
        SourceStrategy::WebPage {
            url,
            pattern,
            label,
        } => {
            validate_url(source_pattern, url)?;
            match (pattern, label) {
                (Some(pattern), None) => {
                    let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                        source_pattern: source_pattern.to_string(),
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?;
                    if regex.captures_len() < 2 {
                        return Err(ConfigError::InvalidPattern {
                            source_pattern: source_pattern.to_string(),
                            pattern: pattern.clone(),
                            message: "pattern needs a capture group for the version".to_string(),
                        });
                    }
                }
                (None, Some(label)) if !label.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::invalid_value(
                        "sources.strategies",
                        format!(
                            "web_page source '{}' needs exactly one of `pattern` or `label`",
                            source_pattern
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn validate_url(source_pattern: &str, url: &str) -> Result<(), ConfigError> {
    let sample = url.replace(ID_PLACEHOLDER, "com.example.app");
    let invalid = |message: String| ConfigError::InvalidUrl {
        source_pattern: source_pattern.to_string(),
        url: url.to_string(),
        message,
    };

    let parsed = reqwest::Url::parse(&sample).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}
