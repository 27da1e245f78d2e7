//! Cross-detector dedup registry.
//!
//! The desktop detector claims PIDs first in every cycle and hands the
//! registry to the CLI detector, which skips those PIDs before running its
//! own tiers. A fresh registry is produced each cycle and read-only after
//! it is handed over.

use std::collections::HashSet;

/// PIDs claimed by the desktop detector in the current cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupRegistry {
    claimed: HashSet<u32>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, pid: u32) -> bool {
        self.claimed.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    pub fn pids(&self) -> &HashSet<u32> {
        &self.claimed
    }
}

impl FromIterator<u32> for DedupRegistry {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            claimed: iter.into_iter().collect(),
        }
    }
}

/// How the CLI detector avoids counting desktop processes.
#[derive(Debug, Clone, Copy)]
pub enum Dedup<'a> {
    /// PIDs claimed by the desktop detector this cycle
    Pids(&'a DedupRegistry),
    /// No desktop detector is wired in: refuse processes whose name
    /// matches any desktop app name, case-insensitively
    Names,
}
