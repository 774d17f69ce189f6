//! Hosts exempt from tape interception

use std::collections::HashSet;
use std::net::IpAddr;

use crate::{Result, TapedeckError};

/// Canonical names for the local machine
pub const LOCALHOST_ALIASES: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Decides which request hosts bypass the tape entirely
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    hosts: HashSet<String>,
    ignore_localhost: bool,
}

impl HostFilter {
    /// Create a filter from an ignore list
    pub fn new<I, S>(hosts: I, ignore_localhost: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| normalize(host.as_ref()))
                .collect(),
            ignore_localhost,
        }
    }

    /// Whether requests to `host` are forwarded untouched
    #[must_use]
    pub fn is_ignored(&self, host: &str) -> bool {
        let host = normalize(host);
        if self.hosts.contains(&host) {
            return true;
        }
        self.ignore_localhost && is_localhost(&host)
    }

    /// Explicitly ignored hosts
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Whether all localhost aliases are ignored
    #[must_use]
    pub fn ignores_localhost(&self) -> bool {
        self.ignore_localhost
    }
}

fn normalize(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase()
}

fn is_localhost(host: &str) -> bool {
    LOCALHOST_ALIASES.contains(&host)
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// Parse a comma-separated ignore list such as `"localhost, api.internal"`
///
/// # Errors
///
/// Returns a configuration error for empty entries or entries that are not
/// bare host names
pub fn parse_host_list(list: &str) -> Result<Vec<String>> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }

    list.split(',')
        .map(|entry| {
            let host = entry.trim();
            validate_host(host)?;
            Ok(host.to_string())
        })
        .collect()
}

/// Check that an ignore-list entry is a bare host
///
/// # Errors
///
/// Returns a configuration error if the entry is empty or malformed
pub fn validate_host(host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(TapedeckError::Config(
            "Ignored host list contains an empty entry".to_string(),
        ));
    }

    if host.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(TapedeckError::Config(format!(
            "Ignored host '{host}' must be a bare host name"
        )));
    }

    Ok(())
}
