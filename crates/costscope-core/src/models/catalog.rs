//! Typed tool catalog.
//!
//! Built once from [`AppConfig`](crate::config::AppConfig) by
//! [`AppConfig::catalog`](crate::config::AppConfig::catalog) and shared
//! read-only (`Arc<Catalog>`) by every detector and scanner.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::platform::HostOs;

/// Exact process names per OS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessNames {
    #[serde(default)]
    pub macos: Vec<String>,
    #[serde(default)]
    pub windows: Vec<String>,
    #[serde(default)]
    pub linux: Vec<String>,
}

impl ProcessNames {
    /// Names for `os`. Linux falls back to the macOS list when it has none
    /// of its own, since most CLI binaries share the Unix name.
    pub fn for_os(&self, os: HostOs) -> &[String] {
        match os {
            HostOs::Macos => &self.macos,
            HostOs::Windows => &self.windows,
            HostOs::Linux if self.linux.is_empty() => &self.macos,
            HostOs::Linux => &self.linux,
        }
    }
}

/// How one catalog entry is recognised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRule {
    /// Tier 1: exact, case-insensitive process names
    pub process_names: ProcessNames,
    /// Tier 2: executable-path substrings (stored lowercase)
    pub exe_path_patterns: Vec<String>,
    /// Tier 3: command-line substrings (stored lowercase)
    pub cmdline_patterns: Vec<String>,
    /// Shell-history command patterns (word-boundary matched)
    pub command_patterns: Vec<String>,
}

/// A desktop app or CLI tool.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub category: String,
    /// USD per hour of active use
    pub cost_per_hour: f64,
    /// App cannot self-report usage without an editor plugin
    pub requires_plugin: bool,
    pub rule: MatchRule,
}

/// A tracked AI web domain, optionally with a path prefix
/// (`github.com/copilot`).
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEntry {
    pub domain: String,
    pub name: String,
    pub category: String,
    pub cost_per_hour: f64,
}

impl DomainEntry {
    /// Host part of the domain (before any `/`)
    pub fn host(&self) -> &str {
        self.domain
            .split_once('/')
            .map_or(self.domain.as_str(), |(host, _)| host)
    }

    /// Path prefix including the leading `/`, if the entry carries one
    pub fn path_prefix(&self) -> Option<&str> {
        self.domain.find('/').map(|idx| &self.domain[idx..])
    }
}

/// API endpoint prefix the browser extension intercepts to read token usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInterceptPattern {
    pub url_prefix: String,
    pub tool: String,
}

/// Immutable registry of every known tool, app and domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub apps: Vec<CatalogEntry>,
    pub cli_tools: Vec<CatalogEntry>,
    pub domains: Vec<DomainEntry>,
    pub api_intercept_patterns: Vec<ApiInterceptPattern>,
}

impl Catalog {
    /// Exact (case-insensitive) lookup of a domain as reported by the
    /// browser extension.
    pub fn domain(&self, domain: &str) -> Option<&DomainEntry> {
        self.domains
            .iter()
            .find(|d| d.domain.eq_ignore_ascii_case(domain))
    }

    /// Lowercased process names of every desktop app on `os`, used by the
    /// CLI detector when no PID registry is available.
    pub fn desktop_process_names(&self, os: HostOs) -> HashSet<String> {
        self.apps
            .iter()
            .flat_map(|app| app.rule.process_names.for_os(os))
            .map(|name| name.to_lowercase())
            .collect()
    }
}
