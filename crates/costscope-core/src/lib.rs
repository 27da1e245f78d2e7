//! # costscope-core
//!
//! Domain models, port traits, configuration, metric instruments and the
//! token cost estimator shared by every costscope crate.
//!
//! ## Layout
//!
//! - [`models`]: catalog, process, usage and platform types
//! - [`ports`]: traits implemented by adapter crates
//! - [`error`]: [`CoreError`](error::CoreError)
//! - [`config`]: [`AppConfig`](config::AppConfig) and catalog validation
//! - [`metrics`]: instrument names, label sets, in-memory sink
//! - [`pricing`]: per-model token rates

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod pricing;
