mod registry;
mod validate;

pub use registry::*;
pub use validate::*;
