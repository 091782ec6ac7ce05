// 搜索命令模块
//
// 接收 multipart 表单，等待 AI 服务就绪后在阻塞线程池里执行检索

use axum::extract::{Multipart, State};
use axum::Json;
use uuid::Uuid;

use super::{SearchForm, SearchResponse};
use crate::{AppError, AppResult, AppState};

/// 读取表单字段，`image_query` 按文件读取，其余按文本读取
async fn read_search_form(mut multipart: Multipart) -> AppResult<SearchForm> {
    let mut form = SearchForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("解析表单失败: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "image_query" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("读取上传图片失败: {}", e)))?;
            form.set_image(bytes.to_vec());
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("读取字段 {} 失败: {}", name, e)))?;
            form.set_text_field(&name, value);
        }
    }
    Ok(form)
}

/// 文本 / 图片 / 混合检索
pub async fn search_images(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<SearchResponse>> {
    let request_id = Uuid::new_v4();
    let form = read_search_form(multipart).await?;
    let request = form.into_request(&state.config.query)?;
    let services = state.ai.wait_ready().await?;

    let span = tracing::info_span!(
        "search",
        %request_id,
        mode = request.mode.label(),
        k = request.k,
        use_reduced_space = request.use_reduced_space,
    );
    let results = tokio::task::spawn_blocking(move || {
        let _guard = span.enter();
        services.search.search(&request)
    })
    .await
    .map_err(|e| AppError::Internal(format!("搜索任务异常退出: {}", e)))??;

    tracing::info!(%request_id, hits = results.len(), "Search served");
    Ok(Json(SearchResponse { results }))
}
