mod ai;
mod ai_config;

pub use ai::*;
pub use ai_config::*;

#[cfg(test)]
pub(crate) use ai::test_support;
