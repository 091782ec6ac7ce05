//! 向量编码、向量表存储与向量运算
//!
//! 拆分为四个子模块：
//! - `model`: Encoder trait 与 fastembed CLIP 实现
//! - `store`: 向量表加载与校验
//! - `projection`: 在整张表上拟合的 PCA 投影
//! - `vector`: 归一化 / 余弦相似度

mod model;
mod projection;
mod store;
pub mod vector;

pub use model::{Encoder, FastEmbedEncoder};
pub use projection::ReducedProjection;
pub use store::{EmbeddingRow, EmbeddingTable, ImageRecord, ProjectionParams};

// 向量表文件的字段名
pub(crate) const COLUMN_FILE_NAME: &str = "file_name";
pub(crate) const COLUMN_EMBEDDING: &str = "embedding";
