//! Latest-version lookup strategies
//!
//! A strategy is plain data describing where an application's latest release
//! is published. The fetcher registered for the strategy's [`StrategyKind`]
//! knows how to query it.

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the application's lookup key in URLs and names
pub const ID_PLACEHOLDER: &str = "{id}";

/// Kind of remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Structured update feed (Sparkle appcast, JSON document)
    Feed,
    /// Package index API (Homebrew casks, GitHub releases)
    PackageIndex,
    /// Version scraped out of a web page
    WebPage,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Feed => "feed",
            StrategyKind::PackageIndex => "package_index",
            StrategyKind::WebPage => "web_page",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed" => Ok(StrategyKind::Feed),
            "package_index" => Ok(StrategyKind::PackageIndex),
            "web_page" => Ok(StrategyKind::WebPage),
            _ => Err(()),
        }
    }
}

/// Package index queried by a [`SourceStrategy::PackageIndex`] strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageIndex {
    /// Homebrew cask API, `name` is the cask token
    Homebrew,
    /// GitHub latest release, `name` is "owner/repo"
    #[serde(rename = "github")]
    GitHub,
}

impl PackageIndex {
    /// Host used for per-host rate limiting
    pub fn host(&self) -> &'static str {
        match self {
            PackageIndex::Homebrew => "formulae.brew.sh",
            PackageIndex::GitHub => "api.github.com",
        }
    }
}

/// One way of discovering an application's latest version
///
/// Deserialized from registry table entries:
///
/// ```toml
/// strategies = [
///   { kind = "feed", url = "https://iterm2.com/appcasts/final_modern.xml" },
///   { kind = "package_index", index = "homebrew", name = "iterm2" },
///   { kind = "web_page", url = "https://macupdater.net/app_updates/appinfo/{id}/index.html", label = "Version String:" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceStrategy {
    Feed {
        url: String,
        /// JSON pointer to the version field; without it the feed is read as
        /// a Sparkle appcast
        #[serde(default, skip_serializing_if = "Option::is_none")]
        json_pointer: Option<String>,
    },
    PackageIndex { index: PackageIndex, name: String },
    WebPage {
        url: String,
        /// Regex whose first capture group is the version
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
        /// Table label whose neighbouring cell holds the version
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl SourceStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            SourceStrategy::Feed { .. } => StrategyKind::Feed,
            SourceStrategy::PackageIndex { .. } => StrategyKind::PackageIndex,
            SourceStrategy::WebPage { .. } => StrategyKind::WebPage,
        }
    }

    /// Host the strategy talks to, for rate limiting
    pub fn host(&self) -> String {
        match self {
            SourceStrategy::Feed { url, .. } | SourceStrategy::WebPage { url, .. } => {
                reqwest::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| url.clone())
            }
            SourceStrategy::PackageIndex { index, .. } => index.host().to_string(),
        }
    }

    /// Copy with `{id}` replaced by the application's lookup key
    pub fn expand(&self, lookup_key: &str) -> Self {
        let fill = |s: &str| s.replace(ID_PLACEHOLDER, lookup_key);
        match self {
            SourceStrategy::Feed { url, json_pointer } => SourceStrategy::Feed {
                url: fill(url),
                json_pointer: json_pointer.clone(),
            },
            SourceStrategy::PackageIndex { index, name } => SourceStrategy::PackageIndex {
                index: *index,
                name: fill(name),
            },
            SourceStrategy::WebPage {
                url,
                pattern,
                label,
            } => SourceStrategy::WebPage {
                url: fill(url),
                pattern: pattern.clone(),
                label: label.clone(),
            },
        }
    }
}
