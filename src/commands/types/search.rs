//! 搜索请求与响应类型

use serde::Serialize;

use crate::error::AppResult;
use crate::services::{QueryDefaults, QueryRequest, SearchHit};
use crate::utils::validation::{
    parse_bool_flag, parse_k, parse_query_mode, parse_reduced_dims, parse_text_weight,
};

/// `POST /search` 表单字段的原始值
///
/// 所有字段可选；空白的标量字段按缺省处理，空文件按没有上传处理
#[derive(Debug, Default)]
pub struct SearchForm {
    pub text_query: Option<String>,
    pub image_query: Option<Vec<u8>>,
    pub query_type: Option<String>,
    pub text_weight: Option<String>,
    pub use_pca: Option<String>,
    pub num_components: Option<String>,
    pub top_k: Option<String>,
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

impl SearchForm {
    /// 记录一个文本字段，未知字段忽略
    pub fn set_text_field(&mut self, name: &str, value: String) {
        let slot = match name {
            "text_query" => &mut self.text_query,
            "query_type" => &mut self.query_type,
            "text_weight" => &mut self.text_weight,
            "use_pca" => &mut self.use_pca,
            "num_components" => &mut self.num_components,
            "top_k" => &mut self.top_k,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn set_image(&mut self, bytes: Vec<u8>) {
        self.image_query = (!bytes.is_empty()).then_some(bytes);
    }

    /// 按配置默认值补全并解析为查询请求
    pub fn into_request(self, defaults: &QueryDefaults) -> AppResult<QueryRequest> {
        let mode = present(self.query_type.as_deref())
            .map(parse_query_mode)
            .transpose()?
            .unwrap_or(defaults.mode);
        let text_weight = present(self.text_weight.as_deref())
            .map(parse_text_weight)
            .transpose()?
            .unwrap_or(defaults.text_weight);
        let use_reduced_space = present(self.use_pca.as_deref())
            .map(|raw| parse_bool_flag(raw, "use_pca"))
            .transpose()?
            .unwrap_or(defaults.use_reduced_space);
        let reduced_dims = present(self.num_components.as_deref())
            .map(parse_reduced_dims)
            .transpose()?
            .unwrap_or(defaults.reduced_dims);
        let k = present(self.top_k.as_deref())
            .map(parse_k)
            .transpose()?
            .unwrap_or(defaults.k);

        let text = self
            .text_query
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        Ok(QueryRequest {
            text,
            image: self.image_query,
            mode,
            text_weight,
            use_reduced_space,
            reduced_dims,
            k,
        })
    }
}

/// 搜索响应
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}
