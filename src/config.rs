//! Configuration types for Tapedeck

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::hosts::{parse_host_list, validate_host, HostFilter};
use crate::mode::TapeMode;
use crate::rule::{ComposedMatchRule, MatchRule};
use crate::{Result, TapedeckError};

/// Default directory tapes are stored in
pub const DEFAULT_TAPE_ROOT: &str = "tests/tapes";

/// Configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "tapedeck.toml";

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_ENV: &str = "TAPEDECK_CONFIG";

/// Environment overrides, applied after the configuration file
pub const TAPE_ROOT_ENV: &str = "TAPEDECK_TAPE_ROOT";
/// Overrides `default_mode`
pub const DEFAULT_MODE_ENV: &str = "TAPEDECK_DEFAULT_MODE";
/// Overrides `default_match_rules` (comma-separated)
pub const MATCH_RULES_ENV: &str = "TAPEDECK_MATCH_RULES";
/// Overrides `ignore_hosts` (comma-separated)
pub const IGNORE_HOSTS_ENV: &str = "TAPEDECK_IGNORE_HOSTS";
/// Overrides `ignore_localhost`
pub const IGNORE_LOCALHOST_ENV: &str = "TAPEDECK_IGNORE_LOCALHOST";

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory for storing/loading tapes
    pub tape_root: PathBuf,
    /// Mode applied when insert does not name one
    pub default_mode: TapeMode,
    /// Match rules applied when insert does not name any
    pub default_match_rules: Vec<MatchRule>,
    /// Hosts whose traffic is never intercepted
    #[serde(deserialize_with = "deserialize_hosts")]
    pub ignore_hosts: Vec<String>,
    /// Also exempt every localhost alias
    pub ignore_localhost: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tape_root: PathBuf::from(DEFAULT_TAPE_ROOT),
            default_mode: TapeMode::ReadWrite,
            default_match_rules: ComposedMatchRule::default().rules().to_vec(),
            ignore_hosts: Vec::new(),
            ignore_localhost: false,
        }
    }
}

/// Hosts may be written as `"a,b"` or `["a", "b"]`
#[derive(Deserialize)]
#[serde(untagged)]
enum HostList {
    Csv(String),
    List(Vec<String>),
}

fn deserialize_hosts<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match HostList::deserialize(deserializer)? {
        HostList::Csv(list) => parse_host_list(&list).map_err(serde::de::Error::custom),
        HostList::List(hosts) => Ok(hosts.into_iter().map(|h| h.trim().to_string()).collect()),
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or validated
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TapedeckError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML configuration
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or names unknown values
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TapedeckError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Locate configuration the way a test run expects it
    ///
    /// Reads `$TAPEDECK_CONFIG` or `./tapedeck.toml` if present, otherwise
    /// starts from defaults, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns error if a configuration source is present but invalid
    pub fn discover() -> Result<Self> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let local = PathBuf::from(CONFIG_FILE_NAME);

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if local.exists() => Self::from_file(&local)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `TAPEDECK_*` overrides from `lookup`
    ///
    /// # Errors
    ///
    /// Returns error if an override holds an unrecognized value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(TAPE_ROOT_ENV) {
            self.tape_root = PathBuf::from(root);
        }

        if let Some(mode) = lookup(DEFAULT_MODE_ENV) {
            self.default_mode = mode.parse()?;
        }

        if let Some(rules) = lookup(MATCH_RULES_ENV) {
            self.default_match_rules = ComposedMatchRule::parse_list(&rules)?.rules().to_vec();
        }

        if let Some(hosts) = lookup(IGNORE_HOSTS_ENV) {
            self.ignore_hosts = parse_host_list(&hosts)?;
        }

        if let Some(flag) = lookup(IGNORE_LOCALHOST_ENV) {
            self.ignore_localhost = parse_bool(IGNORE_LOCALHOST_ENV, &flag)?;
        }

        self.validate()
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.tape_root.as_os_str().is_empty() {
            return Err(TapedeckError::Config(
                "tape_root cannot be empty".to_string(),
            ));
        }

        if self.default_match_rules.is_empty() {
            return Err(TapedeckError::Config(
                "default_match_rules must name at least one rule".to_string(),
            ));
        }

        for host in &self.ignore_hosts {
            validate_host(host)?;
        }

        Ok(())
    }

    /// Default match rules as a composed rule
    ///
    /// # Errors
    ///
    /// Returns error if no default rules are configured
    pub fn match_rules(&self) -> Result<ComposedMatchRule> {
        ComposedMatchRule::new(self.default_match_rules.iter().copied())
    }

    /// Host exemption filter
    #[must_use]
    pub fn host_filter(&self) -> HostFilter {
        HostFilter::new(&self.ignore_hosts, self.ignore_localhost)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(TapedeckError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}
