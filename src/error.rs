//! 统一错误类型定义
//!
//! 使用 `thiserror` 简化错误类型定义，
//! 提供 `AppError` 枚举和 `AppResult` 类型别名。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// 应用级统一错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 编码失败（文本为空、图片无法解码、模型推理出错）
    #[error("编码失败: {0}")]
    Encoding(String),

    /// 没有可用的查询向量
    #[error("查询为空: 请提供文本或图片")]
    EmptyQuery,

    /// 降维维度超出投影的拟合维度
    #[error("降维维度无效: 请求 {requested}，可用 1..={available}")]
    InvalidProjectionDimension { requested: usize, available: usize },

    /// 返回数量必须为正
    #[error("k 必须大于 0")]
    InvalidK,

    /// 向量维度不一致
    #[error("向量维度不一致: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 验证错误（输入参数不合法）
    #[error("验证失败: {0}")]
    Validation(String),

    /// 向量表加载错误
    #[error("向量表错误: {0}")]
    Table(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件操作错误
    #[error("文件操作错误: {0}")]
    Io(#[from] std::io::Error),

    /// 服务尚未就绪或初始化失败
    #[error("服务不可用: {0}")]
    Unavailable(String),

    /// 内部错误
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// 序列化时使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Encoding(_) => "encoding",
            AppError::EmptyQuery => "empty_query",
            AppError::InvalidProjectionDimension { .. } => "invalid_projection_dimension",
            AppError::InvalidK => "invalid_k",
            AppError::DimensionMismatch { .. } => "dimension_mismatch",
            AppError::Validation(_) => "validation",
            AppError::Table(_) => "table",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Unavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    /// 调用方输入导致的错误返回 400，其余为服务端问题
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Encoding(_)
            | AppError::EmptyQuery
            | AppError::InvalidProjectionDimension { .. }
            | AppError::InvalidK
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DimensionMismatch { .. }
            | AppError::Table(_)
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ========== From 实现：String 和 &str ==========

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Internal(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Internal(s.to_string())
    }
}

// ========== Serialize 实现：HTTP 层返回 {kind, message} ==========

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("AppError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "Request rejected");
        }
        (status, Json(self)).into_response()
    }
}

/// 应用级 Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

// ========== 扩展 trait：为 Result 添加上下文方法 ==========

/// 为 Result 类型添加错误上下文转换方法
pub trait ResultExt<T> {
    /// 将错误转换为验证错误
    fn validation_err(self, msg: &str) -> AppResult<T>;

    /// 将错误转换为配置错误
    fn config_err(self, msg: &str) -> AppResult<T>;

    /// 将错误转换为编码错误
    fn encoding_err(self, msg: &str) -> AppResult<T>;

    /// 将错误转换为向量表错误
    fn table_err(self, msg: &str) -> AppResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn validation_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Validation(format!("{}: {}", msg, e)))
    }

    fn config_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Config(format!("{}: {}", msg, e)))
    }

    fn encoding_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Encoding(format!("{}: {}", msg, e)))
    }

    fn table_err(self, msg: &str) -> AppResult<T> {
        self.map_err(|e| AppError::Table(format!("{}: {}", msg, e)))
    }
}
