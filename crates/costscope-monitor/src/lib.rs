//! # costscope-monitor
//!
//! Process-based AI usage detection.
//! A tiered matcher classifies processes against the catalog; the desktop,
//! CLI and WSL detectors turn matches into duration, cost and running-state
//! metrics. Platform adapters (sysinfo, foreground window APIs) implement
//! the core ports.

pub mod cli;
pub mod coordinator;
pub mod dedup;
pub mod desktop;
pub mod foreground;
pub mod matcher;
pub mod process;
pub mod running;
pub mod state;
pub mod wsl;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "linux")]
pub mod linux;
