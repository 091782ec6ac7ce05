//! 服务配置
//!
//! 配置文件为 JSON，所有字段都有默认值；相对路径按配置文件所在目录解析。
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppResult, ResultExt};
use crate::services::QueryMode;
use crate::utils::resolve_file_path;

/// HTTP 监听配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 前端静态文件目录，不存在时不挂载
    pub static_dir: String,
    /// 上传图片的最大字节数
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: "static".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub table_path: String,
    pub image_dir: String,
    /// fastembed 模型缓存目录，留空使用 fastembed 默认值
    pub model_cache_dir: String,
    pub clip_text_embedding_model: String,
    pub image_embedding_model: String,
    pub vector_size: u64,
    pub projection_components: usize,
    pub projection_iterations: usize,
    pub projection_tolerance: f32,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            table_path: "image_embeddings.json".to_string(),
            image_dir: "coco_images_resized".to_string(),
            model_cache_dir: String::new(),
            clip_text_embedding_model: "Qdrant/clip-ViT-B-32-text".to_string(),
            image_embedding_model: "Qdrant/clip-ViT-B-32-vision".to_string(),
            vector_size: 512,
            projection_components: 50,
            projection_iterations: 200,
            projection_tolerance: 1e-6,
        }
    }
}

impl VectorConfig {
    fn apply_defaults(&mut self, base_dir: &Path) {
        self.table_path = resolve_file_path(base_dir, &self.table_path);
        self.image_dir = resolve_file_path(base_dir, &self.image_dir);
        if !self.model_cache_dir.trim().is_empty() {
            self.model_cache_dir = resolve_file_path(base_dir, &self.model_cache_dir);
        }
    }
}

/// 请求字段缺省时使用的默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryDefaults {
    pub mode: QueryMode,
    pub text_weight: f32,
    pub use_reduced_space: bool,
    pub reduced_dims: usize,
    pub k: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            mode: QueryMode::Image,
            text_weight: 0.8,
            use_reduced_space: false,
            reduced_dims: 10,
            k: 5,
        }
    }
}

/// 配置数据结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfigData {
    pub server: ServerConfig,
    pub vector: VectorConfig,
    pub query: QueryDefaults,
}

impl SearchConfigData {
    fn apply_defaults(&mut self, base_dir: &Path) {
        self.vector.apply_defaults(base_dir);
        if !self.server.static_dir.trim().is_empty() {
            self.server.static_dir = resolve_file_path(base_dir, &self.server.static_dir);
        }
    }
}

/// 配置服务
pub struct ConfigService {
    config_path: Option<PathBuf>,
    base_dir: PathBuf,
}

impl ConfigService {
    /// 创建新的配置服务实例
    ///
    /// 未指定配置文件时，相对路径按 `base_dir` 解析
    pub fn new(config_path: Option<PathBuf>, base_dir: PathBuf) -> Self {
        let base_dir = config_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or(base_dir);

        Self {
            config_path,
            base_dir,
        }
    }

    fn default_config(&self) -> SearchConfigData {
        let mut config = SearchConfigData::default();
        config.apply_defaults(&self.base_dir);
        config
    }

    /// 加载配置（如果文件不存在则返回默认配置）
    pub fn load(&self) -> AppResult<SearchConfigData> {
        let Some(path) = self.config_path.as_deref() else {
            return Ok(self.default_config());
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(self.default_config());
        }

        let raw = fs::read(path).config_err("读取配置文件失败")?;
        let mut config: SearchConfigData =
            serde_json::from_slice(&raw).config_err("解析配置文件失败")?;
        config.apply_defaults(&self.base_dir);
        Ok(config)
    }
}
