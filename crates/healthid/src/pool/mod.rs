mod cursor;
mod entry;
#[cfg(test)]
mod tests;

pub use cursor::*;
pub use entry::*;
