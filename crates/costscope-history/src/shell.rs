//! Shell history scanner.
//!
//! Counts AI CLI invocations in zsh, bash and PowerShell history files.
//! Files are read incrementally from a per-path byte offset that survives
//! restarts (`<state_dir>/shell_history/offsets.json`).

use costscope_core::error::CoreError;
use costscope_core::metrics::{cli_labels, Counter};
use costscope_core::models::catalog::CatalogEntry;
use costscope_core::models::platform::HostOs;
use costscope_core::ports::metrics::MetricSink;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::checkpoint::CheckpointStore;
use crate::incremental::read_delta;

/// Byte offset per absolute history path
pub type ShellOffsets = BTreeMap<String, u64>;

/// History file dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// `: <epoch>:<elapsed>;<command>` extended format, or bare lines
    Zsh,
    Bash,
    PowerShell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFile {
    pub path: PathBuf,
    pub shell: ShellKind,
}

/// Well-known history locations for `os`.
pub fn default_history_files(os: HostOs) -> Vec<HistoryFile> {
    let Some(dirs) = directories::BaseDirs::new() else {
        return Vec::new();
    };
    match os {
        HostOs::Windows => vec![HistoryFile {
            path: dirs
                .config_dir()
                .join("Microsoft")
                .join("Windows")
                .join("PowerShell")
                .join("PSReadLine")
                .join("ConsoleHost_history.txt"),
            shell: ShellKind::PowerShell,
        }],
        HostOs::Macos | HostOs::Linux => vec![
            HistoryFile {
                path: dirs.home_dir().join(".zsh_history"),
                shell: ShellKind::Zsh,
            },
            HistoryFile {
                path: dirs.home_dir().join(".bash_history"),
                shell: ShellKind::Bash,
            },
        ],
    }
}

/// Commands contained in a chunk of history text.
pub fn parse_commands(text: &str, shell: ShellKind) -> Vec<&str> {
    text.lines()
        .filter_map(|line| {
            let command = match shell {
                ShellKind::Zsh if line.starts_with(": ") => match line.split_once(';') {
                    Some((_, command)) => command,
                    None => line,
                },
                _ => line,
            };
            let command = command.trim();
            (!command.is_empty()).then_some(command)
        })
        .collect()
}

/// Word-boundary matcher over every tool's `command_patterns`.
#[derive(Debug, Clone)]
pub struct CommandMatcher {
    patterns: Vec<(Regex, usize)>,
}

impl CommandMatcher {
    pub fn new(tools: &[CatalogEntry]) -> Result<Self, CoreError> {
        let mut patterns = Vec::new();
        for (index, tool) in tools.iter().enumerate() {
            for pattern in &tool.rule.command_patterns {
                let re = Regex::new(&format!(r"(?:^|;|\||\s){}(?:\s|$)", regex::escape(pattern)))
                    .map_err(|e| CoreError::Config(format!("command pattern {pattern:?}: {e}")))?;
                patterns.push((re, index));
            }
        }
        Ok(Self { patterns })
    }

    /// Index of the first tool whose pattern matches, in catalog order
    pub fn classify(&self, command: &str) -> Option<usize> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(command))
            .map(|(_, index)| *index)
    }
}

/// Incremental shell history scanner.
pub struct ShellHistoryScanner {
    tools: Vec<CatalogEntry>,
    matcher: CommandMatcher,
    files: Vec<HistoryFile>,
    sink: Arc<dyn MetricSink>,
    offsets: ShellOffsets,
    checkpoint: CheckpointStore<ShellOffsets>,
}

impl ShellHistoryScanner {
    pub fn new(
        tools: Vec<CatalogEntry>,
        files: Vec<HistoryFile>,
        state_dir: &Path,
        sink: Arc<dyn MetricSink>,
    ) -> Result<Self, CoreError> {
        let matcher = CommandMatcher::new(&tools)?;
        let checkpoint = CheckpointStore::new(state_dir.join("shell_history").join("offsets.json"));
        let offsets = checkpoint.load();
        Ok(Self {
            tools,
            matcher,
            files,
            sink,
            offsets,
            checkpoint,
        })
    }

    /// Read every history file's new lines and count matched commands.
    /// Returns the number of commands attributed to a tool.
    pub fn scan(&mut self) -> usize {
        let mut counts: BTreeMap<usize, u64> = BTreeMap::new();

        for file in &self.files {
            if !file.path.exists() {
                continue;
            }
            let key = file.path.to_string_lossy().to_string();
            let offset = self.offsets.get(&key).copied().unwrap_or(0);

            let delta = match read_delta(&file.path, offset) {
                Ok(Some(delta)) => delta,
                Ok(None) => continue,
                Err(CoreError::Io(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    warn!("permission denied reading {}", file.path.display());
                    continue;
                }
                Err(e) => {
                    warn!("cannot read {}: {e}", file.path.display());
                    continue;
                }
            };
            if delta.truncated {
                debug!("{} truncated, rescanning from start", file.path.display());
            }
            self.offsets.insert(key, delta.next_offset);

            for command in parse_commands(&delta.text, file.shell) {
                if let Some(index) = self.matcher.classify(command) {
                    *counts.entry(index).or_default() += 1;
                }
            }
        }

        let mut total = 0;
        for (index, count) in counts {
            let tool = &self.tools[index];
            self.sink
                .add(Counter::CliCommandCount, count as f64, &cli_labels(tool));
            debug!("shell history: {count} new commands for {}", tool.name);
            total += count as usize;
        }

        if let Err(e) = self.checkpoint.save(&self.offsets) {
            warn!("failed to save shell history offsets: {e}");
        }
        total
    }
}
