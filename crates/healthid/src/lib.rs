#![doc = include_str!("../README.md")]

mod block;
mod checksum;
mod directory;
mod engine;
mod error;
mod pool;
mod series;
mod store;
mod time;

pub use crate::block::*;
pub use crate::checksum::*;
pub use crate::directory::*;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::series::*;
pub use crate::store::*;
pub use crate::time::*;
