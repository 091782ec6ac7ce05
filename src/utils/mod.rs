mod file;
pub mod validation;

pub use file::*;
