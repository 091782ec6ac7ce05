use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use clipsearch_lib::services::{
    ConfigService, QueryDefaults, QueryMode, QueryRequest, SearchConfigData,
};
use clipsearch_lib::utils::default_data_dir;
use clipsearch_lib::utils::validation::parse_query_mode;
use clipsearch_lib::{AppError, AppResult};

#[derive(Parser, Debug)]
#[command(name = "clipsearch", about = "Text / image / hybrid search over CLIP embeddings")]
struct Cli {
    /// Path to config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Embedding table (.json / .jsonl)
        #[arg(long)]
        table: Option<String>,
    },

    /// Run a single search in-process and print the results as JSON.
    Query {
        #[arg(long)]
        text: Option<String>,
        /// Image file to search with
        #[arg(long)]
        image: Option<PathBuf>,
        /// text | image | hybrid; inferred from the inputs when omitted
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        weight: Option<f32>,
        /// Search in the first N projected dimensions
        #[arg(long)]
        reduced_dims: Option<usize>,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        table: Option<String>,
    },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = ConfigService::new(cli.config, default_data_dir()).load()?;

    match cli.command {
        Commands::Serve { host, port, table } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(table) = table {
                config.vector.table_path = table;
            }
            clipsearch_lib::run(config).await
        }
        Commands::Query {
            text,
            image,
            mode,
            weight,
            reduced_dims,
            top_k,
            table,
        } => {
            if let Some(table) = table {
                config.vector.table_path = table;
            }
            let image = image.map(std::fs::read).transpose()?;
            let request = query_request(
                &config.query,
                text,
                image,
                mode.as_deref(),
                weight,
                reduced_dims,
                top_k,
            )?;
            cmd_query(config, request).await
        }
    }
}

/// 未给出的参数取配置默认值；给了 `--reduced-dims` 即在降维空间检索
fn query_request(
    defaults: &QueryDefaults,
    text: Option<String>,
    image: Option<Vec<u8>>,
    mode: Option<&str>,
    weight: Option<f32>,
    reduced_dims: Option<usize>,
    top_k: Option<usize>,
) -> AppResult<QueryRequest> {
    let mode = match mode {
        Some(raw) => parse_query_mode(raw)?,
        None => infer_mode(text.is_some(), image.is_some(), defaults.mode),
    };
    Ok(QueryRequest {
        text,
        image,
        mode,
        text_weight: weight.unwrap_or(defaults.text_weight),
        use_reduced_space: reduced_dims.is_some(),
        reduced_dims: reduced_dims.unwrap_or(defaults.reduced_dims),
        k: top_k.unwrap_or(defaults.k),
    })
}

fn infer_mode(has_text: bool, has_image: bool, fallback: QueryMode) -> QueryMode {
    match (has_text, has_image) {
        (true, true) => QueryMode::Hybrid,
        (true, false) => QueryMode::Text,
        (false, true) => QueryMode::Image,
        (false, false) => fallback,
    }
}

async fn cmd_query(config: SearchConfigData, request: QueryRequest) -> AppResult<()> {
    let results =
        tokio::task::spawn_blocking(move || clipsearch_lib::query_once(&config, &request))
            .await
            .map_err(|e| AppError::Internal(format!("查询任务异常退出: {}", e)))??;

    let output = serde_json::json!({ "results": results });
    let pretty = serde_json::to_string_pretty(&output)
        .map_err(|e| AppError::Internal(format!("序列化结果失败: {}", e)))?;
    println!("{}", pretty);
    Ok(())
}
