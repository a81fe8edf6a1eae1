use blueprint_core::DownloadPolicy;
use http::Uri;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which remote URLs may be downloaded.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum DownloadMode {
    /// No remote downloads; only `file://` URLs load (default)
    #[default]
    Disabled,
    /// Only hosts matching one of `hosts`
    AllowList,
    /// Any host
    Any,
}

fn default_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

/// Remote download rules as written in configuration.
///
/// ```yaml
/// mode: AllowList
/// hosts:
///   - blueprints.example.com
///   - "*.cdn.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DownloadsConfig {
    #[serde(default)]
    pub mode: DownloadMode,
    /// Host patterns for `AllowList`. `*.example.com` matches any subdomain
    /// of `example.com`, but not `example.com` itself.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// URL schemes remote downloads may use
    #[serde(default = "default_schemes")]
    pub schemes: Vec<String>,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            mode: DownloadMode::default(),
            hosts: Vec::new(),
            schemes: default_schemes(),
        }
    }
}

impl DownloadsConfig {
    pub fn into_rules(self) -> Result<DownloadRules, ConfigError> {
        DownloadRules::new(self)
    }
}

/// Compiled [`DownloadsConfig`], usable as the cache's download policy.
#[derive(Debug, Clone)]
pub struct DownloadRules {
    mode: DownloadMode,
    hosts: RegexSet,
    schemes: Vec<String>,
}

impl DownloadRules {
    pub fn new(config: DownloadsConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .hosts
            .iter()
            .map(|host| host_regex(host))
            .collect::<Result<Vec<_>, _>>()?;
        let hosts = RegexSet::new(&patterns).map_err(|error| ConfigError::InvalidRegex {
            pattern: patterns.join("|"),
            error,
        })?;
        let schemes = config
            .schemes
            .iter()
            .map(|scheme| scheme.to_ascii_lowercase())
            .collect();
        Ok(Self {
            mode: config.mode,
            hosts,
            schemes,
        })
    }

    pub fn mode(&self) -> DownloadMode {
        self.mode
    }
}

impl DownloadPolicy for DownloadRules {
    fn can_download(&self, url: &str) -> bool {
        if self.mode == DownloadMode::Disabled {
            return false;
        }
        let Ok(uri) = url.parse::<Uri>() else {
            return false;
        };
        let scheme_allowed = uri.scheme_str().is_some_and(|scheme| {
            self.schemes
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
        });
        if !scheme_allowed {
            return false;
        }
        match self.mode {
            DownloadMode::Disabled => false,
            DownloadMode::Any => true,
            DownloadMode::AllowList => uri
                .host()
                .is_some_and(|host| self.hosts.is_match(&host.to_ascii_lowercase())),
        }
    }
}

/// Anchored, case-insensitive regex for one host pattern.
fn host_regex(pattern: &str) -> Result<String, ConfigError> {
    let invalid = |reason| ConfigError::InvalidHostPattern {
        pattern: pattern.to_string(),
        reason,
    };
    let (wildcard, domain) = match pattern.strip_prefix("*.") {
        Some(domain) => (true, domain),
        None => (false, pattern),
    };
    if domain.is_empty() {
        return Err(invalid("empty host"));
    }
    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(invalid(
            "only letters, digits, '-' and '.' are allowed, with an optional leading '*.'",
        ));
    }
    if domain.starts_with('.') || domain.ends_with('.') || domain.contains("..") {
        return Err(invalid("empty label"));
    }

    let domain = regex::escape(&domain.to_ascii_lowercase());
    Ok(if wildcard {
        format!(r"^(?:[a-z0-9-]+\.)+{domain}$")
    } else {
        format!("^{domain}$")
    })
}
