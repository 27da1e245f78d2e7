//! # costscope-history
//!
//! Scanners over data that other programs leave on disk: browser history
//! databases, shell history files and AI CLI token usage logs. Every
//! scanner reads incrementally from a cursor and treats an unavailable
//! source as "no data this cycle".

pub mod browser;
pub mod checkpoint;
pub mod incremental;
pub mod shell;
pub mod source;
pub mod tokens;
pub mod usage;
