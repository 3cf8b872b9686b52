mod allocator;
mod record;

pub use allocator::*;
pub use record::*;
