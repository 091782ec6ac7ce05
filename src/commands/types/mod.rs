//! 命令类型模块
//!
//! - `search`: 搜索表单与结果
//! - `common`: 状态等通用类型

mod common;
mod search;

pub use common::StatusResponse;
pub use search::{SearchForm, SearchResponse};
