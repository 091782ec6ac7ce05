mod embedding;
mod search;
mod types;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{AppError, AppResult};
use crate::services::VectorConfig;

pub use embedding::*;
pub use search::{combine_query, rank, SearchService};
pub use types::*;

#[derive(Clone)]
pub struct AiServices {
    pub table: Arc<EmbeddingTable>,
    pub search: Arc<SearchService>,
}

impl AiServices {
    /// 加载向量表、拟合投影并加载 CLIP 模型
    ///
    /// 阻塞调用，需在 `spawn_blocking` 中或 runtime 之外执行
    pub fn new(config: &VectorConfig) -> AppResult<Self> {
        let table_path = Path::new(&config.table_path);
        let table = Arc::new(EmbeddingTable::load(table_path, ProjectionParams::from(config))?);
        let encoder: Arc<dyn Encoder> = Arc::new(FastEmbedEncoder::new(config)?);
        Self::from_parts(table, encoder)
    }

    pub fn from_parts(table: Arc<EmbeddingTable>, encoder: Arc<dyn Encoder>) -> AppResult<Self> {
        let search = Arc::new(SearchService::new(encoder, table.clone())?);
        Ok(Self { table, search })
    }
}

#[derive(Clone)]
enum AiServicesStatus {
    Pending,
    Ready(Arc<AiServices>),
    Error(String),
}

/// AI 服务的启动状态，与请求处理函数共享
#[derive(Clone)]
pub struct AiServicesHandle {
    sender: watch::Sender<AiServicesStatus>,
}

impl AiServicesHandle {
    pub fn new_pending() -> Self {
        let (sender, _receiver) = watch::channel(AiServicesStatus::Pending);
        Self { sender }
    }

    pub fn new_ready(services: Arc<AiServices>) -> Self {
        let handle = Self::new_pending();
        handle.set_ready(services);
        handle
    }

    pub fn set_ready(&self, services: Arc<AiServices>) {
        self.sender.send_replace(AiServicesStatus::Ready(services));
    }

    pub fn set_error(&self, error: String) {
        self.sender.send_replace(AiServicesStatus::Error(error));
    }

    pub fn status_label(&self) -> &'static str {
        match &*self.sender.borrow() {
            AiServicesStatus::Pending => "pending",
            AiServicesStatus::Ready(_) => "ready",
            AiServicesStatus::Error(_) => "error",
        }
    }

    /// 不等待，加载完成时返回服务
    pub fn try_ready(&self) -> Option<Arc<AiServices>> {
        match &*self.sender.borrow() {
            AiServicesStatus::Ready(services) => Some(services.clone()),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<String> {
        match &*self.sender.borrow() {
            AiServicesStatus::Error(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub async fn wait_ready(&self) -> AppResult<Arc<AiServices>> {
        let mut receiver = self.sender.subscribe();
        loop {
            let status = receiver.borrow_and_update().clone();
            match status {
                AiServicesStatus::Ready(services) => return Ok(services),
                AiServicesStatus::Error(err) => return Err(AppError::Unavailable(err)),
                AiServicesStatus::Pending => receiver.changed().await.map_err(|_| {
                    AppError::Unavailable("AI 服务初始化通道已关闭".to_string())
                })?,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::embedding::vector::normalize;
    use super::{AiServices, EmbeddingRow, EmbeddingTable, Encoder, ProjectionParams};
    use crate::error::{AppError, AppResult};

    /// 返回预设向量的测试编码器
    pub struct StubEncoder {
        dimension: usize,
        texts: HashMap<String, Vec<f32>>,
        images: HashMap<Vec<u8>, Vec<f32>>,
        pub text_calls: AtomicUsize,
        pub image_calls: AtomicUsize,
    }

    impl StubEncoder {
        pub fn new(dimension: usize) -> Self {
            Self {
                dimension,
                texts: HashMap::new(),
                images: HashMap::new(),
                text_calls: AtomicUsize::new(0),
                image_calls: AtomicUsize::new(0),
            }
        }

        pub fn with_text(mut self, text: &str, vector: &[f32]) -> Self {
            self.texts.insert(text.to_string(), normalize(vector.to_vec()));
            self
        }

        pub fn with_image(mut self, bytes: &[u8], vector: &[f32]) -> Self {
            self.images.insert(bytes.to_vec(), normalize(vector.to_vec()));
            self
        }
    }

    impl Encoder for StubEncoder {
        fn encode_text(&self, text: &str) -> AppResult<Vec<f32>> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            self.texts
                .get(text)
                .cloned()
                .ok_or_else(|| AppError::Encoding(format!("unknown text: {}", text)))
        }

        fn encode_image(&self, image_bytes: &[u8]) -> AppResult<Vec<f32>> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            self.images
                .get(image_bytes)
                .cloned()
                .ok_or_else(|| AppError::Encoding("image could not be decoded".to_string()))
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    pub fn table_from<const D: usize>(rows: &[(&str, [f32; D])]) -> EmbeddingTable {
        let rows = rows
            .iter()
            .map(|(name, embedding)| EmbeddingRow {
                file_name: name.to_string(),
                embedding: embedding.to_vec(),
            })
            .collect();
        EmbeddingTable::from_rows(
            rows,
            ProjectionParams {
                components: 8,
                iterations: 300,
                tolerance: 1e-7,
            },
        )
        .unwrap()
    }

    /// 三行二维数据（`A`、`B`、`C`），编码器只认识 `"red"` 和 `b"blue"`
    pub fn abc_services() -> Arc<AiServices> {
        let table = Arc::new(table_from(&[
            ("A", [1.0, 0.0]),
            ("B", [0.0, 1.0]),
            ("C", [0.707, 0.707]),
        ]));
        let encoder = Arc::new(
            StubEncoder::new(2)
                .with_text("red", &[1.0, 0.0])
                .with_image(b"blue", &[0.0, 1.0]),
        );
        Arc::new(AiServices::from_parts(table, encoder).unwrap())
    }
}
