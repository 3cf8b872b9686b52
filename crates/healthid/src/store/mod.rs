//! Replicated storage abstraction behind the allocation engine.
//!
//! - [`Store`] is the backend contract: conditional inserts, point reads,
//!   deletes, token-ordered scans and a compare-and-set cursor record.
//! - [`ReservationStore`] wraps a backend with bounded timeouts and the
//!   fire-and-forget / synchronous write modes callers choose between.
//! - [`MemoryStore`] is an in-process backend with fault injection.

mod interface;
mod memory;
mod reservation;
mod token;

pub use interface::*;
pub use memory::*;
pub use reservation::*;
pub use token::*;
