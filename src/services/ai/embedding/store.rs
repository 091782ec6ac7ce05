//! 向量表存储：加载、校验与投影初始化

use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::Deserialize;

use super::projection::ReducedProjection;
use super::{COLUMN_EMBEDDING, COLUMN_FILE_NAME};
use crate::error::{AppError, AppResult, ResultExt};
use crate::services::VectorConfig;
use crate::utils::get_extension;

/// 预计算向量表文件中的一行
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRow {
    pub file_name: String,
    pub embedding: Vec<f32>,
}

/// 表中一行，同时保存降维后的坐标
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub image_path: String,
    pub embedding: Vec<f32>,
    /// 全部 M 个投影分量，排序时按请求截断
    pub reduced: Vec<f32>,
}

/// 投影拟合参数
#[derive(Debug, Clone, Copy)]
pub struct ProjectionParams {
    pub components: usize,
    pub iterations: usize,
    pub tolerance: f32,
}

impl From<&VectorConfig> for ProjectionParams {
    fn from(config: &VectorConfig) -> Self {
        Self {
            components: config.projection_components,
            iterations: config.projection_iterations,
            tolerance: config.projection_tolerance,
        }
    }
}

/// 只读的图片向量表
///
/// 行顺序在构造时确定，也是排序时同分的先后顺序
#[derive(Debug)]
pub struct EmbeddingTable {
    records: Vec<ImageRecord>,
    dimension: usize,
    projection: ReducedProjection,
}

impl EmbeddingTable {
    /// 校验所有行，拟合投影，并用同一投影预先计算每行的降维坐标
    pub fn from_rows(rows: Vec<EmbeddingRow>, params: ProjectionParams) -> AppResult<Self> {
        let dimension = validate_rows(&rows)?;

        let mut flat = Vec::with_capacity(rows.len() * dimension);
        for row in &rows {
            flat.extend_from_slice(&row.embedding);
        }
        let matrix = Array2::from_shape_vec((rows.len(), dimension), flat)
            .table_err("构建向量矩阵失败")?;

        let projection =
            ReducedProjection::fit(&matrix, params.components, params.iterations, params.tolerance);
        let reduced = projection.project_rows(&matrix)?;

        let records = rows
            .into_iter()
            .zip(reduced.outer_iter())
            .map(|(row, reduced_row)| ImageRecord {
                image_path: row.file_name,
                embedding: row.embedding,
                reduced: reduced_row.to_vec(),
            })
            .collect();

        tracing::info!(
            dimension,
            projection_components = projection.components(),
            explained_variance_ratio = projection.explained_variance_ratio(),
            "Embedding table ready"
        );

        Ok(Self {
            records,
            dimension,
            projection,
        })
    }

    /// 读取 `.json`（记录数组）或 `.jsonl` / `.ndjson` 向量表文件
    pub fn load(path: &Path, params: ProjectionParams) -> AppResult<Self> {
        let rows = read_rows(path)?;
        tracing::info!(path = %path.display(), rows = rows.len(), "Embedding table loaded");
        Self::from_rows(rows, params)
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 向量维度 D，空表为 0
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn projection(&self) -> &ReducedProjection {
        &self.projection
    }
}

fn read_rows(path: &Path) -> AppResult<Vec<EmbeddingRow>> {
    let raw = fs::read_to_string(path)
        .table_err(&format!("读取向量表失败 {}", path.display()))?;

    match get_extension(&path.to_string_lossy()).as_deref() {
        Some("json") => parse_json_rows(&raw),
        Some("jsonl") | Some("ndjson") => parse_jsonl_rows(&raw),
        other => Err(AppError::Table(format!(
            "不支持的向量表格式: {}",
            other.unwrap_or("<none>")
        ))),
    }
}

fn parse_json_rows(raw: &str) -> AppResult<Vec<EmbeddingRow>> {
    serde_json::from_str(raw).table_err("解析向量表失败")
}

fn parse_jsonl_rows(raw: &str) -> AppResult<Vec<EmbeddingRow>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).table_err(&format!("解析向量表第 {} 行失败", idx + 1))
        })
        .collect()
}

fn validate_rows(rows: &[EmbeddingRow]) -> AppResult<usize> {
    let Some(first) = rows.first() else {
        return Ok(0);
    };
    let dimension = first.embedding.len();
    if dimension == 0 {
        return Err(AppError::Table(format!("{} 为空: 第 1 行", COLUMN_EMBEDDING)));
    }

    for (idx, row) in rows.iter().enumerate() {
        if row.file_name.trim().is_empty() {
            return Err(AppError::Table(format!(
                "{} 为空: 第 {} 行",
                COLUMN_FILE_NAME,
                idx + 1
            )));
        }
        if row.embedding.len() != dimension {
            return Err(AppError::Table(format!(
                "{} 维度不一致: 第 {} 行为 {}，期望 {}",
                COLUMN_EMBEDDING,
                idx + 1,
                row.embedding.len(),
                dimension
            )));
        }
        if row.embedding.iter().any(|x| !x.is_finite()) {
            return Err(AppError::Table(format!(
                "{} 含有非有限值: 第 {} 行",
                COLUMN_EMBEDDING,
                idx + 1
            )));
        }
    }

    Ok(dimension)
}
