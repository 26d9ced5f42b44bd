//! Harness of the ringkv replicated key-value ring.
//!
//! Runs a whole ring of [ringkv_core] nodes in one process, on an in-memory
//! transport, and drives it with clients and scripted scenarios.
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod processor;
pub mod scenario;
pub mod util;
