//! Tiered process matcher.
//!
//! Tiers are tried in order and the first tier with a hit wins:
//!
//! 1. exact process name (case-insensitive, OS-specific list)
//! 2. executable-path substring, skipping the OS system-library tree
//! 3. command-line substring over the first [`CMDLINE_TOKEN_LIMIT`] tokens
//!
//! Within a tier the earliest declared catalog entry wins. The index holds
//! no mutable state; [`MatchIndex::classify`] is a pure function of the
//! process and the catalog.

use costscope_core::models::catalog::CatalogEntry;
use costscope_core::models::platform::HostOs;
use costscope_core::models::process::ProcessInfo;
use std::collections::HashMap;

/// Number of leading argv tokens inspected by the command-line tier.
pub const CMDLINE_TOKEN_LIMIT: usize = 3;

/// Tier that produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ProcessName,
    ExePath,
    Cmdline,
}

/// Position of the matched entry in the catalog list, plus the tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    pub tier: MatchTier,
}

/// Lookup tables built once per catalog list.
#[derive(Debug, Clone)]
pub struct MatchIndex {
    by_name: HashMap<String, usize>,
    exe_patterns: Vec<(String, usize)>,
    cmdline_patterns: Vec<(String, usize)>,
    protected_prefix: Option<&'static str>,
}

impl MatchIndex {
    pub fn new(entries: &[CatalogEntry], os: HostOs) -> Self {
        let mut by_name = HashMap::new();
        let mut exe_patterns = Vec::new();
        let mut cmdline_patterns = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            for name in entry.rule.process_names.for_os(os) {
                // first declaration keeps the name
                by_name.entry(name.to_lowercase()).or_insert(index);
            }
            for pattern in &entry.rule.exe_path_patterns {
                exe_patterns.push((pattern.to_lowercase(), index));
            }
            for pattern in &entry.rule.cmdline_patterns {
                cmdline_patterns.push((pattern.to_lowercase(), index));
            }
        }

        Self {
            by_name,
            exe_patterns,
            cmdline_patterns,
            protected_prefix: os.protected_path_prefix(),
        }
    }

    /// Classify one process. `None` when no tier matches.
    pub fn classify(&self, process: &ProcessInfo) -> Option<Match> {
        if let Some(&index) = self.by_name.get(&process.name.to_lowercase()) {
            return Some(Match {
                index,
                tier: MatchTier::ProcessName,
            });
        }

        if let Some(index) = self.match_exe(process.exe.as_deref()) {
            return Some(Match {
                index,
                tier: MatchTier::ExePath,
            });
        }

        self.match_cmdline(&process.cmdline).map(|index| Match {
            index,
            tier: MatchTier::Cmdline,
        })
    }

    /// True when the lowercased name is in the tier-1 table
    pub fn has_name(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_lowercase())
    }

    fn match_exe(&self, exe: Option<&str>) -> Option<usize> {
        if self.exe_patterns.is_empty() {
            return None;
        }
        let exe = exe?.to_lowercase();
        if exe.is_empty() {
            return None;
        }
        if let Some(prefix) = self.protected_prefix {
            if exe.starts_with(prefix) {
                return None;
            }
        }
        self.exe_patterns
            .iter()
            .find(|(pattern, _)| exe.contains(pattern.as_str()))
            .map(|(_, index)| *index)
    }

    fn match_cmdline(&self, cmdline: &[String]) -> Option<usize> {
        if self.cmdline_patterns.is_empty() || cmdline.is_empty() {
            return None;
        }
        let head = cmdline
            .iter()
            .take(CMDLINE_TOKEN_LIMIT)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        self.cmdline_patterns
            .iter()
            .find(|(pattern, _)| head.contains(pattern.as_str()))
            .map(|(_, index)| *index)
    }
}
