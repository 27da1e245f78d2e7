//! Configuration loading and platform directories.
//!
//! Hierarchy, lowest priority first: built-in catalog YAML, the user's
//! `config.yaml`, then `COSTSCOPE_*` environment variables (`__` separates
//! sections, e.g. `COSTSCOPE_WEB__PORT=9000`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use costscope_core::config::AppConfig;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Built-in catalog and defaults
pub const BUILTIN_CONFIG: &str = include_str!("../assets/ai_config.yaml");

/// Environment variable prefix
pub const ENV_PREFIX: &str = "COSTSCOPE";

/// Load the effective configuration.
pub fn load_config(user_file: Option<&Path>) -> Result<AppConfig> {
    load_layers(BUILTIN_CONFIG, user_file, ENV_PREFIX)
}

/// Layered load with explicit inputs. A missing user file is skipped; an
/// unparseable one is an error.
pub fn load_layers(builtin: &str, user_file: Option<&Path>, env_prefix: &str) -> Result<AppConfig> {
    let mut builder = Config::builder().add_source(File::from_str(builtin, FileFormat::Yaml));

    if let Some(path) = user_file {
        builder = builder.add_source(
            File::from(path.to_path_buf())
                .format(FileFormat::Yaml)
                .required(false),
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let mut config: AppConfig = builder
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")?;
    config.merge_extras();
    Ok(config)
}

/// Resolved filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// User `config.yaml`
    pub config_file: PathBuf,
    /// Scanner checkpoints
    pub state_dir: PathBuf,
    /// Default prompt database
    pub prompt_db: PathBuf,
}

impl AppPaths {
    /// Platform defaults, overridden by the config's `state_dir` and
    /// `token_tracking.storage_path`.
    ///
    /// - Linux: `~/.config/costscope`, `~/.local/state/costscope`
    /// - macOS: `~/Library/Application Support/io.costscope.costscope`
    /// - Windows: `%APPDATA%\costscope\costscope`
    pub fn resolve(config: &AppConfig) -> Self {
        let dirs = ProjectDirs::from("io", "costscope", "costscope");
        let fallback = PathBuf::from(".costscope");

        let config_dir = dirs
            .as_ref()
            .map_or_else(|| fallback.clone(), |d| d.config_dir().to_path_buf());
        let default_state = dirs.as_ref().map_or_else(
            || fallback.join("state"),
            |d| {
                d.state_dir()
                    .map_or_else(|| d.data_local_dir().join("state"), Path::to_path_buf)
            },
        );
        let data_dir = dirs
            .as_ref()
            .map_or_else(|| fallback.clone(), |d| d.data_dir().to_path_buf());

        Self {
            config_file: config_dir.join("config.yaml"),
            state_dir: config.state_dir.clone().unwrap_or(default_state),
            prompt_db: config
                .token_tracking
                .storage_path
                .clone()
                .unwrap_or_else(|| data_dir.join("prompts.db")),
        }
    }

    /// Default user config file, before any config is loaded.
    pub fn default_config_file() -> PathBuf {
        ProjectDirs::from("io", "costscope", "costscope").map_or_else(
            || PathBuf::from(".costscope").join("config.yaml"),
            |d| d.config_dir().join("config.yaml"),
        )
    }
}
