//! 通用命令类型

use serde::Serialize;

use crate::services::TableStats;

/// 服务状态响应
///
/// 表加载完成前只有 `status`，失败时带 `error`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub stats: Option<TableStats>,
    pub error: Option<String>,
}
