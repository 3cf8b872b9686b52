//! Server-side components of the Health ID service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`pool`] - Worker pool that runs block and page requests against the
//!   engine.
//! - [`service`] - HTTP routes, error mapping and request lifecycle.
//! - [`telemetry`] - `tracing-subscriber` initialization.

pub mod config;
pub mod pool;
pub mod service;
pub mod telemetry;
