//! Application configuration.
//!
//! Scan intervals, ingestion server settings, token tracking toggles and the
//! raw tool catalog lists. Loaded by `costscope-app` through the `config`
//! crate (built-in YAML, user YAML, `COSTSCOPE_*` environment variables).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;
use crate::models::catalog::{
    ApiInterceptPattern, Catalog, CatalogEntry, DomainEntry, MatchRule, ProcessNames,
};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scan intervals
    #[serde(default)]
    pub scan: ScanConfig,
    /// Ingestion server
    #[serde(default)]
    pub web: WebConfig,
    /// Checkpoint directory (platform default when unset)
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Host name recorded with stored usage events (OS host name when unset)
    #[serde(default)]
    pub host_name: Option<String>,
    /// Token usage tracking
    #[serde(default)]
    pub token_tracking: TokenTrackingConfig,

    #[serde(default)]
    pub ai_apps: Vec<ToolDefinition>,
    #[serde(default)]
    pub ai_cli_tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub ai_domains: Vec<DomainDefinition>,
    #[serde(default)]
    pub api_intercept_patterns: Vec<ApiInterceptPattern>,

    /// User additions appended to the built-in lists
    #[serde(default)]
    pub extra_ai_apps: Vec<ToolDefinition>,
    #[serde(default)]
    pub extra_ai_cli_tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub extra_ai_domains: Vec<DomainDefinition>,
    #[serde(default)]
    pub extra_api_intercept_patterns: Vec<ApiInterceptPattern>,
}

// ============================================================
// Scan intervals
// ============================================================

/// How often each detector and scanner runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Desktop/CLI/WSL detection cycle
    #[serde(default = "default_detector_interval")]
    pub detector_interval_secs: u64,
    #[serde(default = "default_browser_interval")]
    pub browser_interval_secs: u64,
    #[serde(default = "default_shell_interval")]
    pub shell_interval_secs: u64,
    #[serde(default = "default_token_interval")]
    pub token_interval_secs: u64,
    /// Enumerate WSL distributions (Windows only)
    #[serde(default = "default_true")]
    pub wsl_enabled: bool,
}

fn default_detector_interval() -> u64 {
    15
}

fn default_browser_interval() -> u64 {
    60
}

fn default_shell_interval() -> u64 {
    3600
}

fn default_token_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            detector_interval_secs: default_detector_interval(),
            browser_interval_secs: default_browser_interval(),
            shell_interval_secs: default_shell_interval(),
            token_interval_secs: default_token_interval(),
            wsl_enabled: true,
        }
    }
}

// ============================================================
// Ingestion server
// ============================================================

/// Local HTTP ingestion server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// First port tried; the next few are used when it is taken
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum events per POST body
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// POST requests allowed per client IP per window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,
}

fn default_web_port() -> u16 {
    8080
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_max_batch_size() -> usize {
    100
}

fn default_rate_limit_requests() -> u32 {
    60
}

fn default_rate_limit_window() -> u64 {
    60
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_web_port(),
            bind: default_bind(),
            max_batch_size: default_max_batch_size(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window(),
        }
    }
}

impl WebConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

// ============================================================
// Token tracking
// ============================================================

/// Token usage scanning and prompt capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTrackingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Store the user prompt text with each event
    #[serde(default = "default_true")]
    pub capture_prompt_text: bool,
    /// Store the model response text with each event
    #[serde(default = "default_true")]
    pub capture_response_text: bool,
    /// Stored events older than this are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Prompt database path (platform data dir when unset)
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default)]
    pub sources: TokenSources,
}

fn default_retention_days() -> u32 {
    90
}

impl Default for TokenTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_prompt_text: true,
            capture_response_text: true,
            retention_days: default_retention_days(),
            storage_path: None,
            sources: TokenSources::default(),
        }
    }
}

/// Per-source toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSources {
    /// `~/.claude/projects/**/*.jsonl` transcripts
    #[serde(default = "default_true")]
    pub claude_code: bool,
    /// `~/.codex` SQLite usage log
    #[serde(default = "default_true")]
    pub codex: bool,
    /// API intercepts posted by the browser extension
    #[serde(default = "default_true")]
    pub browser_extension: bool,
}

impl Default for TokenSources {
    fn default() -> Self {
        Self {
            claude_code: true,
            codex: true,
            browser_extension: true,
        }
    }
}

// ============================================================
// Raw catalog definitions
// ============================================================

/// Desktop app or CLI tool as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub cost_per_hour: f64,
    #[serde(default)]
    pub requires_plugin: bool,
    #[serde(default)]
    pub process_names: ProcessNames,
    #[serde(default)]
    pub exe_path_patterns: Vec<String>,
    #[serde(default)]
    pub cmdline_patterns: Vec<String>,
    #[serde(default)]
    pub command_patterns: Vec<String>,
}

/// Web domain as written in the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainDefinition {
    pub domain: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub cost_per_hour: f64,
}

fn default_category() -> String {
    "unknown".to_string()
}

impl AppConfig {
    /// Defaults with an empty catalog
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Append the `extra_*` lists to the built-in lists. Idempotent: the
    /// extras are drained.
    pub fn merge_extras(&mut self) {
        self.ai_apps.append(&mut self.extra_ai_apps);
        self.ai_cli_tools.append(&mut self.extra_ai_cli_tools);
        self.ai_domains.append(&mut self.extra_ai_domains);
        self.api_intercept_patterns
            .append(&mut self.extra_api_intercept_patterns);
    }

    /// Validate the raw lists and build the typed catalog.
    pub fn catalog(&self) -> Result<Catalog, CoreError> {
        let apps = convert_tools("ai_apps", &self.ai_apps)?;
        let cli_tools = convert_tools("ai_cli_tools", &self.ai_cli_tools)?;

        let mut seen = HashSet::new();
        let mut domains = Vec::with_capacity(self.ai_domains.len());
        for def in &self.ai_domains {
            let domain = def.domain.trim().to_lowercase();
            if domain.is_empty() {
                return Err(validation("ai_domains", "domain must not be empty"));
            }
            if !seen.insert(domain.clone()) {
                return Err(validation(
                    "ai_domains",
                    &format!("duplicate domain '{domain}'"),
                ));
            }
            check_rate("ai_domains", &domain, def.cost_per_hour)?;
            domains.push(DomainEntry {
                name: def.name.clone().unwrap_or_else(|| domain.clone()),
                domain,
                category: def.category.clone(),
                cost_per_hour: def.cost_per_hour,
            });
        }

        Ok(Catalog {
            apps,
            cli_tools,
            domains,
            api_intercept_patterns: self.api_intercept_patterns.clone(),
        })
    }

    pub fn detector_interval(&self) -> Duration {
        Duration::from_secs(self.scan.detector_interval_secs.max(1))
    }

    pub fn browser_interval(&self) -> Duration {
        Duration::from_secs(self.scan.browser_interval_secs.max(1))
    }

    pub fn shell_interval(&self) -> Duration {
        Duration::from_secs(self.scan.shell_interval_secs.max(1))
    }

    pub fn token_interval(&self) -> Duration {
        Duration::from_secs(self.scan.token_interval_secs.max(1))
    }
}

fn convert_tools(field: &str, defs: &[ToolDefinition]) -> Result<Vec<CatalogEntry>, CoreError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(defs.len());

    for def in defs {
        let name = def.name.trim();
        if name.is_empty() {
            return Err(validation(field, "name must not be empty"));
        }
        if !seen.insert(name.to_string()) {
            return Err(validation(field, &format!("duplicate name '{name}'")));
        }
        check_rate(field, name, def.cost_per_hour)?;

        entries.push(CatalogEntry {
            name: name.to_string(),
            category: def.category.clone(),
            cost_per_hour: def.cost_per_hour,
            requires_plugin: def.requires_plugin,
            rule: MatchRule {
                process_names: def.process_names.clone(),
                exe_path_patterns: lowercase_non_empty(&def.exe_path_patterns),
                cmdline_patterns: lowercase_non_empty(&def.cmdline_patterns),
                command_patterns: def
                    .command_patterns
                    .iter()
                    .filter(|p| !p.trim().is_empty())
                    .cloned()
                    .collect(),
            },
        });
    }

    Ok(entries)
}

fn lowercase_non_empty(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

fn check_rate(field: &str, name: &str, rate: f64) -> Result<(), CoreError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(validation(
            field,
            &format!("'{name}' has invalid cost_per_hour {rate}"),
        ))
    }
}

fn validation(field: &str, message: &str) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}
