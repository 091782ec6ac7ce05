use serde::{Deserialize, Serialize};

/// 检索使用哪些输入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Text,
    #[default]
    Image,
    Hybrid,
}

impl QueryMode {
    pub fn uses_text(self) -> bool {
        matches!(self, QueryMode::Text | QueryMode::Hybrid)
    }

    pub fn uses_image(self) -> bool {
        matches!(self, QueryMode::Image | QueryMode::Hybrid)
    }

    pub fn label(self) -> &'static str {
        match self {
            QueryMode::Text => "text",
            QueryMode::Image => "image",
            QueryMode::Hybrid => "hybrid",
        }
    }
}

/// 请求层交给检索流程的一次查询
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
    pub mode: QueryMode,
    pub text_weight: f32,
    pub use_reduced_space: bool,
    pub reduced_dims: usize,
    pub k: usize,
}

#[cfg(test)]
impl QueryRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            mode: QueryMode::Text,
            ..Self::default()
        }
    }

    pub fn image(image: Vec<u8>) -> Self {
        Self {
            image: Some(image),
            mode: QueryMode::Image,
            ..Self::default()
        }
    }

    pub fn hybrid(text: impl Into<String>, image: Vec<u8>, text_weight: f32) -> Self {
        Self {
            text: Some(text.into()),
            image: Some(image),
            mode: QueryMode::Hybrid,
            text_weight,
            ..Self::default()
        }
    }
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            text: None,
            image: None,
            mode: QueryMode::Image,
            text_weight: 0.8,
            use_reduced_space: false,
            reduced_dims: 10,
            k: 5,
        }
    }
}

/// 从 `QueryRequest` 中取出的排序参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOptions {
    pub k: usize,
    pub use_reduced_space: bool,
    pub reduced_dims: usize,
}

impl From<&QueryRequest> for RankOptions {
    fn from(request: &QueryRequest) -> Self {
        Self {
            k: request.k,
            use_reduced_space: request.use_reduced_space,
            reduced_dims: request.reduced_dims,
        }
    }
}

/// 一条检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub image_path: String,
    pub similarity: f32,
}

/// 状态接口返回的向量表信息
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub rows: usize,
    pub dimension: usize,
    pub projection_components: usize,
    pub explained_variance_ratio: f32,
}
