//! Encoder：把文本和图片编码到同一个 CLIP 向量空间

use std::path::PathBuf;

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, TextEmbedding,
    TextInitOptions,
};
use tokio::sync::Mutex;

use super::vector::{l2_norm, normalize};
use crate::error::{AppError, AppResult, ResultExt};
use crate::services::VectorConfig;

/// 把原始文本或图片字节映射到向量表所在的空间
///
/// 返回 L2 归一化后的向量。调用是阻塞计算，需放在 `spawn_blocking` 中执行
pub trait Encoder: Send + Sync {
    fn encode_text(&self, text: &str) -> AppResult<Vec<f32>>;

    fn encode_image(&self, image_bytes: &[u8]) -> AppResult<Vec<f32>>;

    /// 输出维度
    fn dimension(&self) -> usize;
}

/// fastembed（ONNX runtime）加载的 CLIP 文本 + 视觉模型
pub struct FastEmbedEncoder {
    clip_text: Mutex<TextEmbedding>,
    image: Mutex<ImageEmbedding>,
    dimension: usize,
}

impl FastEmbedEncoder {
    pub fn new(config: &VectorConfig) -> AppResult<Self> {
        let clip_text_model: EmbeddingModel = config
            .clip_text_embedding_model
            .parse::<EmbeddingModel>()
            .config_err("未知的文本模型")?;
        let image_model: ImageEmbeddingModel = config
            .image_embedding_model
            .parse::<ImageEmbeddingModel>()
            .config_err("未知的图片模型")?;

        let mut text_options = TextInitOptions::new(clip_text_model);
        let mut image_options = ImageInitOptions::new(image_model);
        if !config.model_cache_dir.trim().is_empty() {
            let cache_dir = PathBuf::from(&config.model_cache_dir);
            text_options = text_options.with_cache_dir(cache_dir.clone());
            image_options = image_options.with_cache_dir(cache_dir);
        }

        let clip_text = TextEmbedding::try_new(text_options).config_err("加载文本模型失败")?;
        let image = ImageEmbedding::try_new(image_options).config_err("加载图片模型失败")?;

        tracing::info!(
            text_model = %config.clip_text_embedding_model,
            image_model = %config.image_embedding_model,
            "CLIP encoder loaded"
        );

        Ok(Self {
            clip_text: Mutex::new(clip_text),
            image: Mutex::new(image),
            dimension: config.vector_size as usize,
        })
    }
}

impl Encoder for FastEmbedEncoder {
    fn encode_text(&self, text: &str) -> AppResult<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Encoding("查询文本为空".to_string()));
        }

        let vectors = {
            let mut model = self.clip_text.blocking_lock();
            model.embed(vec![text], None)
        }
        .encoding_err("文本编码失败")?;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Encoding("文本编码未返回向量".to_string()))?;
        finish_embedding(vector, self.dimension)
    }

    fn encode_image(&self, image_bytes: &[u8]) -> AppResult<Vec<f32>> {
        ensure_decodable(image_bytes)?;

        let vectors = {
            let mut model = self.image.blocking_lock();
            model.embed_bytes(&[image_bytes], None)
        }
        .encoding_err("图片编码失败")?;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Encoding("图片编码未返回向量".to_string()))?;
        finish_embedding(vector, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 在送入模型前拒绝无法解码的图片
fn ensure_decodable(image_bytes: &[u8]) -> AppResult<()> {
    if image_bytes.is_empty() {
        return Err(AppError::Encoding("上传图片为空".to_string()));
    }
    let format = image::guess_format(image_bytes).encoding_err("不支持的图片格式")?;
    image::load_from_memory_with_format(image_bytes, format)
        .encoding_err("图片无法解码")?;
    Ok(())
}

/// 校验模型输出维度并做 L2 归一化
fn finish_embedding(vector: Vec<f32>, expected_dimension: usize) -> AppResult<Vec<f32>> {
    if vector.len() != expected_dimension {
        return Err(AppError::DimensionMismatch {
            expected: expected_dimension,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|x| !x.is_finite()) || l2_norm(&vector) < f32::MIN_POSITIVE {
        return Err(AppError::Encoding(
            "模型输出了退化向量".to_string(),
        ));
    }
    Ok(normalize(vector))
}
