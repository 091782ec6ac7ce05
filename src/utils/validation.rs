//! 通用验证函数
//!
//! 请求层的字段解析集中在这里，避免在各个 handler 里重复

use crate::error::{AppError, AppResult, ResultExt};
use crate::services::QueryMode;

/// 解析查询模式
pub fn parse_query_mode(raw: &str) -> AppResult<QueryMode> {
    match raw.trim().to_lowercase().as_str() {
        "text" => Ok(QueryMode::Text),
        "image" => Ok(QueryMode::Image),
        "hybrid" => Ok(QueryMode::Hybrid),
        other => Err(AppError::Validation(format!("未知的查询模式: {}", other))),
    }
}

/// 解析布尔开关（表单复选框会发送 "on"）
pub fn parse_bool_flag(raw: &str, field_name: &str) -> AppResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" | "" => Ok(false),
        other => Err(AppError::Validation(format!(
            "{} 不是布尔值: {}",
            field_name, other
        ))),
    }
}

/// 解析文本权重
///
/// 不做 [0, 1] 截断，超出范围按线性外推处理；只拒绝非有限值
pub fn parse_text_weight(raw: &str) -> AppResult<f32> {
    let weight: f32 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("text_weight 不是数字: {}", raw)))?;
    if !weight.is_finite() {
        return Err(AppError::Validation(format!("text_weight 必须为有限值: {}", raw)));
    }
    Ok(weight)
}

/// 解析返回数量，k <= 0 直接返回 InvalidK
pub fn parse_k(raw: &str) -> AppResult<usize> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("top_k 不是整数: {}", raw)))?;
    if value <= 0 {
        return Err(AppError::InvalidK);
    }
    usize::try_from(value).map_err(|_| AppError::Validation(format!("top_k 过大: {}", raw)))
}

/// 解析降维维度，是否超出投影维度由排序阶段判断
pub fn parse_reduced_dims(raw: &str) -> AppResult<usize> {
    raw.trim()
        .parse::<usize>()
        .validation_err("num_components 不是非负整数")
}
