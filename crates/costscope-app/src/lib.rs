//! # costscope-app
//!
//! Agent assembly: layered configuration, dependency wiring, the polling
//! scheduler and shutdown handling. `main.rs` is a thin CLI over this crate.

pub mod agent;
pub mod lifecycle;
pub mod scheduler;
pub mod settings;
