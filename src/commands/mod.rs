mod search;
mod status;
mod types;

pub use search::*;
pub use status::*;
pub use types::*;
