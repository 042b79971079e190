use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::ConfigError;
use crate::resolution::ResolutionSettings;
use crate::source::{SourceEntry, SourceRegistry, SourceStrategy};

const APP_DIR: &str = "version-tracker";

// =============================================================================
// Scheduler defaults
// =============================================================================

/// Number of workers resolving applications concurrently
pub const DEFAULT_WORKERS: usize = 8;

/// Requests allowed per host within one rate window
pub const DEFAULT_PER_HOST_LIMIT: usize = 4;

/// Rate window in milliseconds (1 second)
pub const DEFAULT_RATE_WINDOW_MS: u64 = 1_000;

/// Timeout for one fetch in milliseconds (10 seconds)
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Deadline for a whole batch in milliseconds (2 minutes)
pub const DEFAULT_BATCH_DEADLINE_MS: u64 = 120_000;

/// Retries of a rate-limited strategy before moving on
pub const DEFAULT_RATE_LIMIT_RETRIES: u32 = 2;

/// Retries of a strategy after a timeout or network failure
pub const DEFAULT_NETWORK_RETRIES: u32 = 1;

/// First backoff step in milliseconds, doubled on every retry
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

// =============================================================================
// Cache defaults
// =============================================================================

/// Time-to-live of a cached resolution in milliseconds (6 hours)
pub const DEFAULT_CACHE_TTL_MS: i64 = 6 * 60 * 60 * 1000;

/// Maximum number of cached resolutions
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 2_000;

/// App-info page listing the current release of an application by bundle id
pub const MACUPDATER_URL: &str = "https://macupdater.net/app_updates/appinfo/{id}/index.html";

/// Table label preceding the version on the app-info page
pub const MACUPDATER_LABEL: &str = "Version String:";

/// Audit configuration, read from `config.toml`
///
/// ```toml
/// [resolution]
/// workers = 8
///
/// [ignored_apps]
/// apps = ["Safari"]
///
/// [app_name_mappings]
/// "iTerm2" = "iTerm"
///
/// [identifier_mappings]
/// "com.microsoft.VSCodeInsiders" = "com.microsoft.VSCode"
///
/// [[sources]]
/// pattern = "com.googlecode.iterm2"
/// strategies = [{ kind = "feed", url = "https://iterm2.com/appcasts/final_modern.xml" }]
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub resolution: ResolutionConfig,
    pub cache: CacheConfig,
    pub ignored_apps: IgnoredApps,
    /// Display name overrides, keyed by the reported name
    pub app_name_mappings: HashMap<String, String>,
    /// Identifier aliases used when looking up sources
    pub identifier_mappings: HashMap<String, String>,
    /// Registry entries, consulted before the built-in table
    pub sources: Vec<SourceEntry>,
    /// Append the built-in table (MacUpdater fallback for every application)
    pub builtin_sources: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolution: ResolutionConfig::default(),
            cache: CacheConfig::default(),
            ignored_apps: IgnoredApps::default(),
            app_name_mappings: HashMap::new(),
            identifier_mappings: HashMap::new(),
            sources: Vec::new(),
            builtin_sources: true,
        }
    }
}

/// Scheduler tunables as written in the file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolutionConfig {
    pub workers: usize,
    pub per_host_limit: usize,
    pub rate_window_ms: u64,
    pub fetch_timeout_ms: u64,
    pub batch_deadline_ms: u64,
    pub rate_limit_retries: u32,
    pub network_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            per_host_limit: DEFAULT_PER_HOST_LIMIT,
            rate_window_ms: DEFAULT_RATE_WINDOW_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            batch_deadline_ms: DEFAULT_BATCH_DEADLINE_MS,
            rate_limit_retries: DEFAULT_RATE_LIMIT_RETRIES,
            network_retries: DEFAULT_NETWORK_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
        }
    }
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Time-to-live in milliseconds
    pub ttl_ms: i64,
    pub max_entries: usize,
    /// Keep the cache in SQLite across runs instead of in memory
    pub persistent: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            persistent: true,
        }
    }
}

/// Applications left out of the audit, by display name
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct IgnoredApps {
    pub apps: Vec<String>,
}

/// Everything the audit needs, checked before any fetch begins
pub struct ValidatedConfig {
    pub settings: ResolutionSettings,
    pub registry: SourceRegistry,
    pub cache: CacheConfig,
}

impl Config {
    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Config from `path`, else from the default location if a file exists
    /// there, else built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = config_path();
        if default_path.is_file() {
            return Self::load(&default_path);
        }

        debug!("No config file at {:?}, using defaults", default_path);
        Ok(Self::default())
    }

    fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    /// Registry entries in lookup order: configured ones, then built-ins
    pub fn source_entries(&self) -> Vec<SourceEntry> {
        let mut entries = self.sources.clone();
        if self.builtin_sources {
            entries.extend(default_sources());
        }
        entries
    }

    pub fn resolution_settings(&self) -> Result<ResolutionSettings, ConfigError> {
        let r = &self.resolution;

        let positive = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::invalid_value(field, "must be greater than zero"))
            } else {
                Ok(value)
            }
        };

        Ok(ResolutionSettings {
            workers: positive("resolution.workers", r.workers as u64)? as usize,
            per_host_limit: positive("resolution.per_host_limit", r.per_host_limit as u64)? as usize,
            rate_window: Duration::from_millis(positive(
                "resolution.rate_window_ms",
                r.rate_window_ms,
            )?),
            fetch_timeout: Duration::from_millis(positive(
                "resolution.fetch_timeout_ms",
                r.fetch_timeout_ms,
            )?),
            batch_deadline: Duration::from_millis(positive(
                "resolution.batch_deadline_ms",
                r.batch_deadline_ms,
            )?),
            rate_limit_retries: r.rate_limit_retries,
            network_retries: r.network_retries,
            backoff_base: Duration::from_millis(r.backoff_base_ms),
        })
    }

    /// Check every value and build the runtime pieces
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let settings = self.resolution_settings()?;

        if self.cache.enabled {
            if self.cache.ttl_ms <= 0 {
                return Err(ConfigError::invalid_value(
                    "cache.ttl_ms",
                    "must be greater than zero",
                ));
            }
            if self.cache.max_entries == 0 {
                return Err(ConfigError::invalid_value(
                    "cache.max_entries",
                    "must be greater than zero",
                ));
            }
        }

        let registry =
            SourceRegistry::new(self.source_entries(), self.identifier_mappings.clone())?;

        Ok(ValidatedConfig {
            settings,
            registry,
            cache: self.cache.clone(),
        })
    }
}

/// Built-in registry table: every application falls back to its MacUpdater
/// app-info page
pub fn default_sources() -> Vec<SourceEntry> {
    vec![SourceEntry::new(
        "*",
        vec![SourceStrategy::WebPage {
            url: MACUPDATER_URL.to_string(),
            pattern: None,
            label: Some(MACUPDATER_LABEL.to_string()),
        }],
    )]
}

/// Returns the path to the data directory for version-tracker.
/// Uses $XDG_DATA_HOME/version-tracker if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/version-tracker,
/// or ./version-tracker if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the cache database file.
pub fn db_path() -> PathBuf {
    data_dir().join("resolutions.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("version-tracker.log")
}

/// Returns the default config file location,
/// $XDG_CONFIG_HOME/version-tracker/config.toml or ~/.config/version-tracker/config.toml.
pub fn config_path() -> PathBuf {
    config_dir_with_env(std::env::var("XDG_CONFIG_HOME").ok(), dirs::home_dir())
        .join("config.toml")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_DIR)
}

fn config_dir_with_env(xdg_config_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let config_dir = xdg_config_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    config_dir.join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::ApplicationIdentity;
    use crate::source::{PackageIndex, StrategyKind};
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn config_from_partial_file_uses_defaults_for_missing_fields() {
        let config = Config::from_toml(
            r#"
            [resolution]
            workers = 2

            [ignored_apps]
            apps = ["Safari", "Xcode"]
            "#,
        )
        .unwrap();

        assert_eq!(config.resolution.workers, 2);
        assert_eq!(
            config.resolution.fetch_timeout_ms,
            DEFAULT_FETCH_TIMEOUT_MS
        );
        assert_eq!(config.ignored_apps.apps, vec!["Safari", "Xcode"]);
        assert_eq!(config.cache, CacheConfig::default());
        assert!(config.builtin_sources);
    }

    #[test]
    fn config_from_full_file_parses_all_sections() {
        let config = Config::from_toml(
            r#"
            builtin_sources = false

            [cache]
            enabled = true
            ttl_ms = 1000
            max_entries = 10
            persistent = false

            [app_name_mappings]
            "iTerm2" = "iTerm"

            [identifier_mappings]
            "com.microsoft.VSCodeInsiders" = "com.microsoft.VSCode"

            [[sources]]
            pattern = "com.googlecode.iterm2"
            strategies = [
              { kind = "feed", url = "https://iterm2.com/appcasts/final_modern.xml" },
              { kind = "package_index", index = "homebrew", name = "iterm2" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.cache,
            CacheConfig {
                enabled: true,
                ttl_ms: 1000,
                max_entries: 10,
                persistent: false,
            }
        );
        assert_eq!(config.app_name_mappings["iTerm2"], "iTerm");
        assert_eq!(
            config.identifier_mappings["com.microsoft.VSCodeInsiders"],
            "com.microsoft.VSCode"
        );
        assert_eq!(config.sources.len(), 1);
        assert_eq!(
            config.sources[0].strategies[1],
            SourceStrategy::PackageIndex {
                index: PackageIndex::Homebrew,
                name: "iterm2".to_string()
            }
        );
        assert_eq!(config.source_entries().len(), 1);
    }

    #[test]
    fn default_config_validates_with_macupdater_fallback() {
        let validated = Config::default().validate().unwrap();

        assert_eq!(validated.settings, ResolutionSettings::default());
        let strategies = validated
            .registry
            .strategies_for(&ApplicationIdentity::new("com.googlecode.iterm2", "iTerm"));
        assert_eq!(
            strategies,
            vec![SourceStrategy::WebPage {
                url: "https://macupdater.net/app_updates/appinfo/com.googlecode.iterm2/index.html"
                    .to_string(),
                pattern: None,
                label: Some(MACUPDATER_LABEL.to_string()),
            }]
        );
    }

    #[test]
    fn configured_sources_come_before_builtin_fallback() {
        let config = Config::from_toml(
            r#"
            [[sources]]
            pattern = "com.googlecode.iterm2"
            strategies = [{ kind = "package_index", index = "homebrew", name = "iterm2" }]
            "#,
        )
        .unwrap();

        let validated = config.validate().unwrap();
        let kinds: Vec<StrategyKind> = validated
            .registry
            .strategies_for(&ApplicationIdentity::new("com.googlecode.iterm2", "iTerm"))
            .iter()
            .map(SourceStrategy::kind)
            .collect();

        assert_eq!(kinds, vec![StrategyKind::PackageIndex, StrategyKind::WebPage]);
    }

    #[rstest]
    #[case("[resolution]\nworkers = 0", "resolution.workers")]
    #[case("[resolution]\nper_host_limit = 0", "resolution.per_host_limit")]
    #[case("[resolution]\nfetch_timeout_ms = 0", "resolution.fetch_timeout_ms")]
    #[case("[resolution]\nbatch_deadline_ms = 0", "resolution.batch_deadline_ms")]
    #[case("[resolution]\nrate_window_ms = 0", "resolution.rate_window_ms")]
    #[case("[cache]\nttl_ms = 0", "cache.ttl_ms")]
    #[case("[cache]\nmax_entries = 0", "cache.max_entries")]
    fn validate_rejects_zero_values(#[case] toml: &str, #[case] expected_field: &str) {
        let config = Config::from_toml(toml).unwrap();

        match config.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected_field),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("expected validation error"),
        }
    }

    #[test]
    fn validate_allows_zero_cache_values_when_disabled() {
        let config = Config::from_toml("[cache]\nenabled = false\nttl_ms = 0").unwrap();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_invalid_source_pattern() {
        let config = Config::from_toml(
            r#"
            [[sources]]
            pattern = "com.example.app"
            strategies = [{ kind = "web_page", url = "https://example.com", pattern = "Version (" }]
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn load_reports_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[resolution\nworkers = ").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn load_reports_missing_file() {
        let temp_dir = TempDir::new().unwrap();

        assert!(matches!(
            Config::load(&temp_dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn load_or_default_reads_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[resolution]\nworkers = 3").unwrap();

        let config = Config::load_or_default(Some(&path)).unwrap();

        assert_eq!(config.resolution.workers, 3);
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/version-tracker"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(
            path,
            PathBuf::from("/home/user/.local/share/version-tracker")
        );
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./version-tracker"));
    }

    #[test]
    fn config_dir_with_env_falls_back_to_home_config() {
        let path = config_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.config/version-tracker"));
    }
}
