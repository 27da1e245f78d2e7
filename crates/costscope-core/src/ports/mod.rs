//! Port interfaces (traits).
//!
//! Adapter crates implement these and `costscope-app` wires them together
//! as `Arc<dyn T>`. Async ports use `async_trait` for object safety; ports
//! called from blocking scanner threads are plain synchronous traits.

pub mod clock;
pub mod metrics;
pub mod process;
pub mod storage;
