use std::sync::Arc;

use logscribe_mcp::config::{Config, ServerMode, LOGS_DIR_ENV};
use logscribe_mcp::error::{LogQueryError, Result};
use logscribe_mcp::http::serve_http;
use logscribe_mcp::mcp::run_stdio;
use logscribe_mcp::scanner::LogDirectory;
use logscribe_mcp::search::LogQueryEngine;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the JSON-RPC stream
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let cli_dir = std::env::args().nth(1);
    let env_dir = std::env::var(LOGS_DIR_ENV).ok();
    let log_dir = config.resolve_log_dir(cli_dir.as_deref(), env_dir.as_deref())?;

    info!(log_dir = %log_dir.display(), mode = ?config.server.mode, "starting log server");
    info!("tools: list_files, read_file, search_logs, filter_by_level, search_all_logs, log_summary");

    let dir = LogDirectory::new(log_dir, &config.logs.file_pattern)?;
    let engine = Arc::new(LogQueryEngine::new(dir, config.search.clone()));

    match config.server.mode {
        ServerMode::Stdio => run_stdio(engine).await?,
        ServerMode::Http => serve_http(engine, &config.server).await?,
        ServerMode::Both => {
            let server = config.server.clone();
            let http_engine = engine.clone();
            let http_task = tokio::spawn(async move { serve_http(http_engine, &server).await });
            let stdio_task = tokio::spawn(run_stdio(engine));
            join(http_task).await?;
            join(stdio_task).await?;
        }
    }

    Ok(())
}

async fn join(task: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    task.await
        .map_err(|e| LogQueryError::Config(format!("server task failed: {e}")))?
}
