//! Worker tasks and the pool that dispatches to them.

pub mod manager;
pub mod request;
pub mod worker;
