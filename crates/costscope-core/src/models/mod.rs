//! costscope domain models.
//!
//! Plain data structures shared by the detectors, scanners and the
//! ingestion server. Types that cross a process boundary (config files,
//! HTTP bodies, checkpoint documents) implement `serde`.

pub mod catalog;
pub mod platform;
pub mod process;
pub mod usage;
