mod config;
mod issue;

pub use config::*;
pub use issue::*;
