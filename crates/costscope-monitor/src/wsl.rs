//! WSL detector (Windows only).
//!
//! Lists running distributions with `wsl.exe --list --running --quiet`, then
//! runs `ps aux` inside each one and matches commands against the CLI
//! catalog's Linux process names. WSL PIDs live in their own namespace, so
//! the desktop PID registry does not apply here.

use costscope_core::error::CoreError;
use costscope_core::metrics::cli_running_labels;
use costscope_core::models::catalog::CatalogEntry;
use costscope_core::models::platform::HostOs;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::matcher::CMDLINE_TOKEN_LIMIT;
use crate::running::{RunningSet, Snapshot};

const WSL_PROGRAM: &str = "wsl.exe";

/// Hard deadline for each `wsl.exe` call
pub const WSL_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// `ps aux` columns before COMMAND
const PS_COMMAND_COLUMN: usize = 10;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Detector for AI CLI tools running inside WSL distributions.
pub struct WslDetector {
    tools: Vec<CatalogEntry>,
    enabled: bool,
    timeout: Duration,
    running: RunningSet,
    /// (tool index, distro) pairs seen in the previous cycle
    previous: BTreeSet<(usize, String)>,
}

impl WslDetector {
    /// `enabled` is forced off on non-Windows hosts.
    pub fn new(tools: Vec<CatalogEntry>, enabled: bool) -> Self {
        Self {
            tools,
            enabled: enabled && HostOs::current() == HostOs::Windows,
            timeout: WSL_CALL_TIMEOUT,
            running: RunningSet::new(),
            previous: BTreeSet::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Handle to the WSL snapshot, merged into the CLI running gauge
    pub fn running_set(&self) -> RunningSet {
        self.running.clone()
    }

    /// Run one cycle. A missing `wsl.exe` disables the detector for the
    /// rest of the run; any other failure only skips this cycle.
    pub async fn scan(&mut self) {
        if !self.enabled {
            return;
        }

        let distros = match self.run(&["--list", "--running", "--quiet"]).await {
            Ok(Some(stdout)) => parse_distro_list(&stdout),
            Ok(None) => Vec::new(),
            Err(CoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("wsl.exe not found, WSL detection disabled");
                self.enabled = false;
                return;
            }
            Err(e) => {
                debug!("WSL distro listing failed: {e}");
                return;
            }
        };

        let mut current = BTreeSet::new();
        for distro in distros {
            match self.run(&["-d", &distro, "-e", "ps", "aux"]).await {
                Ok(Some(stdout)) => {
                    let text = decode_output(&stdout);
                    for index in match_ps_output(&text, &self.tools) {
                        current.insert((index, distro.clone()));
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("WSL ps failed for {distro}: {e}"),
            }
        }

        self.apply(current);
    }

    fn apply(&mut self, current: BTreeSet<(usize, String)>) {
        for (index, distro) in current.difference(&self.previous) {
            info!("AI tool detected in WSL/{distro}: {}", self.tools[*index].name);
        }
        for (index, distro) in self.previous.difference(&current) {
            info!("AI tool stopped in WSL/{distro}: {}", self.tools[*index].name);
        }

        let snapshot: Snapshot = current
            .iter()
            .map(|(index, distro)| {
                let tool = &self.tools[*index];
                (
                    format!("{}:wsl:{distro}", tool.name),
                    cli_running_labels(tool, Some(distro)),
                )
            })
            .collect();
        self.running.replace(snapshot);
        self.previous = current;
    }

    /// Run `wsl.exe` with a deadline. `Ok(None)` for a non-zero exit.
    async fn run(&self, args: &[&str]) -> Result<Option<Vec<u8>>, CoreError> {
        let mut command = Command::new(WSL_PROGRAM);
        command.args(args).kill_on_drop(true);
        #[cfg(windows)]
        command.creation_flags(CREATE_NO_WINDOW);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| CoreError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })??;

        if output.status.success() {
            Ok(Some(output.stdout))
        } else {
            Ok(None)
        }
    }
}

/// `wsl.exe` writes UTF-16LE when its output is not a console; `ps`
/// output from inside the distro is UTF-8.
pub fn decode_output(bytes: &[u8]) -> String {
    let looks_utf16 = bytes.len() >= 2
        && bytes.len() % 2 == 0
        && bytes.iter().skip(1).step_by(2).any(|b| *b == 0);
    if looks_utf16 {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Distribution names from `wsl.exe --list --running --quiet`.
pub fn parse_distro_list(bytes: &[u8]) -> Vec<String> {
    decode_output(bytes)
        .lines()
        .map(|line| line.trim_matches(|c: char| c.is_whitespace() || c == '\0' || c == '\u{feff}'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Indexes of CLI tools whose Linux process name appears in the leading
/// command tokens of a `ps aux` listing. The header line and lines with
/// fewer than 11 columns are skipped.
pub fn match_ps_output(stdout: &str, tools: &[CatalogEntry]) -> BTreeSet<usize> {
    let mut matched = BTreeSet::new();

    for line in stdout.lines().skip(1) {
        let columns: Vec<&str> = line.split_whitespace().collect();
        if columns.len() <= PS_COMMAND_COLUMN {
            continue;
        }
        let command = columns[PS_COMMAND_COLUMN..]
            .iter()
            .take(CMDLINE_TOKEN_LIMIT)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        for (index, tool) in tools.iter().enumerate() {
            if matched.contains(&index) {
                continue;
            }
            let hit = tool
                .rule
                .process_names
                .for_os(HostOs::Linux)
                .iter()
                .any(|name| !name.is_empty() && command.contains(name.as_str()));
            if hit {
                matched.insert(index);
            }
        }
    }

    matched
}
