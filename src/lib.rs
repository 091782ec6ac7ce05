mod app_state;
mod commands;
pub mod error;
pub mod services;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use services::{AiServices, AiServicesHandle, QueryRequest, SearchConfigData, SearchHit, VectorConfig};

pub use app_state::AppState;
pub use error::{AppError, AppResult};

/// 组装 HTTP 路由
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let image_dir = state.config.vector.image_dir.clone();
    let static_dir = server.static_dir.clone();
    let max_upload_bytes = server.max_upload_bytes;

    let mut router: Router<AppState> = Router::new()
        .route("/search", post(commands::search_images))
        .route("/api/status", get(commands::get_status))
        .nest_service("/images", ServeDir::new(image_dir));

    if !static_dir.is_empty() && Path::new(&static_dir).is_dir() {
        router = router.fallback_service(ServeDir::new(static_dir));
    }

    router
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 在后台加载嵌入表和模型，完成后更新 handle 状态
pub fn spawn_ai_services(handle: AiServicesHandle, config: VectorConfig) {
    tokio::spawn(async move {
        let table_path = config.table_path.clone();
        match tokio::task::spawn_blocking(move || AiServices::new(&config)).await {
            Ok(Ok(services)) => {
                tracing::info!(
                    table = %table_path,
                    rows = services.table.len(),
                    dimension = services.table.dimension(),
                    "AI services ready"
                );
                handle.set_ready(Arc::new(services));
            }
            Ok(Err(err)) => {
                tracing::error!(table = %table_path, error = %err, "Failed to initialize AI services");
                handle.set_error(err.to_string());
            }
            Err(err) => {
                tracing::error!(error = %err, "AI services init task panicked");
                handle.set_error(format!("AI 服务初始化任务异常退出: {}", err));
            }
        }
    });
}

/// 启动 HTTP 服务，Ctrl-C 时优雅退出
pub async fn run(config: SearchConfigData) -> AppResult<()> {
    let config = Arc::new(config);
    let ai = AiServicesHandle::new_pending();
    spawn_ai_services(ai.clone(), config.vector.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = build_router(AppState {
        ai,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}

/// 进程内执行一次检索（阻塞）
pub fn query_once(config: &SearchConfigData, request: &QueryRequest) -> AppResult<Vec<SearchHit>> {
    let services = AiServices::new(&config.vector)?;
    services.search.search(request)
}
