//! HTTP service implementation and request lifecycle.
//!
//! ## Structure
//!
//! - [`config`] - Concrete engine types served by this binary.
//! - [`error`] - [`error::ApiError`] and its HTTP mapping.
//! - [`handler`] - Routes and the [`handler::HidService`] state.

pub mod config;
pub mod error;
pub mod handler;
