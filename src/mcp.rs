use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use crate::error::{LogQueryError, Result};
use crate::search::LogQueryEngine;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "log-server";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError { code, message }),
        }
    }
}

pub async fn run_stdio(engine: Arc<LogQueryEngine>) -> Result<()> {
    info!("serving tools over stdio");
    serve_lines(engine, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Newline-delimited JSON-RPC loop over any reader/writer pair.
pub async fn serve_lines<R, W>(engine: Arc<LogQueryEngine>, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(req) => process_request(engine.clone(), req).await,
            Err(e) => Some(RpcResponse::err(Value::Null, -32700, format!("parse error: {e}"))),
        };
        if let Some(resp) = resp {
            write_response(&mut output, &resp).await?;
        }
    }
    debug!("input closed");
    Ok(())
}

/// Handle one request. Notifications (no id) get no response.
pub async fn process_request(engine: Arc<LogQueryEngine>, req: RpcRequest) -> Option<RpcResponse> {
    let is_notification = req.id.is_null();
    let resp = match req.method.as_str() {
        "initialize" => RpcResponse::ok(req.id, initialize_result()),
        "notifications/initialized" | "notifications/cancelled" => return None,
        "ping" => RpcResponse::ok(req.id, json!({})),
        "tools/list" => RpcResponse::ok(req.id, json!({ "tools": tool_definitions() })),
        "tools/call" => handle_tool_call(&engine, req.id, req.params).await,
        _ if is_notification => return None,
        _ => RpcResponse::err(req.id, -32601, format!("method not found: {}", req.method)),
    };
    Some(resp)
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    filename: String,
    #[serde(default)]
    lines: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    filename: String,
    pattern: String,
    #[serde(default)]
    lines: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchAllArgs {
    pattern: String,
    #[serde(default)]
    max_results: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct LevelArgs {
    filename: String,
    #[serde(default = "default_level")]
    level: String,
}

#[derive(Debug, Deserialize)]
struct SummaryArgs {
    filename: String,
}

fn default_level() -> String {
    "ERROR".to_string()
}

/// Negative counts mean "nothing requested".
fn count(value: Option<i64>, default: usize) -> usize {
    value.map_or(default, |n| usize::try_from(n).unwrap_or(0))
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| LogQueryError::InvalidRequest(format!("invalid arguments for {tool}: {e}")))
}

async fn call_tool(engine: &LogQueryEngine, name: &str, args: Value) -> Result<String> {
    let defaults = engine.config();
    match name {
        "list_files" => engine.list_files().await,
        "read_file" => {
            let a: FileArgs = parse_args(name, args)?;
            engine
                .read_file(&a.filename, count(a.lines, defaults.default_tail_lines))
                .await
        }
        "search_logs" => {
            let a: SearchArgs = parse_args(name, args)?;
            engine
                .search_logs(&a.filename, &a.pattern, count(a.lines, defaults.default_search_lines))
                .await
        }
        "search_all_logs" => {
            let a: SearchAllArgs = parse_args(name, args)?;
            engine
                .search_all_logs(&a.pattern, count(a.max_results, defaults.default_max_results))
                .await
        }
        "filter_by_level" => {
            let a: LevelArgs = parse_args(name, args)?;
            engine.filter_by_level(&a.filename, &a.level).await
        }
        "log_summary" => {
            let a: SummaryArgs = parse_args(name, args)?;
            engine.log_summary(&a.filename).await
        }
        other => Err(LogQueryError::InvalidRequest(format!("unknown tool: {other}"))),
    }
}

async fn handle_tool_call(engine: &LogQueryEngine, id: Value, params: Value) -> RpcResponse {
    let params: ToolCallParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return RpcResponse::err(id, -32602, format!("invalid params: {e}")),
    };

    match call_tool(engine, &params.name, params.arguments).await {
        Ok(text) => RpcResponse::ok(id, tool_result(text, false)),
        Err(LogQueryError::InvalidRequest(msg)) => RpcResponse::err(id, -32602, msg),
        Err(e) => {
            error!("tool {} failed: {}", params.name, e);
            RpcResponse::ok(id, tool_result(e.to_string(), true))
        }
    }
}

fn tool_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, resp: &RpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp)
        .map_err(|e| LogQueryError::InvalidRequest(format!("unserializable response: {e}")))?;
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "list_files",
            "description": "List all .log files in the log directory with size and modification time.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": "read_file",
            "description": "Read the last N lines of a log file, numbered.",
            "inputSchema": {
                "type": "object",
                "required": ["filename"],
                "properties": {
                    "filename": { "type": "string" },
                    "lines": { "type": "integer", "default": 10 }
                }
            }
        }),
        json!({
            "name": "search_logs",
            "description": "Case-insensitive regex search in one log file; keeps the most recent matches.",
            "inputSchema": {
                "type": "object",
                "required": ["filename", "pattern"],
                "properties": {
                    "filename": { "type": "string" },
                    "pattern": { "type": "string" },
                    "lines": { "type": "integer", "default": 20 }
                }
            }
        }),
        json!({
            "name": "filter_by_level",
            "description": "Show lines tagged [LEVEL] (ERROR, WARN, INFO, DEBUG, CRITICAL).",
            "inputSchema": {
                "type": "object",
                "required": ["filename"],
                "properties": {
                    "filename": { "type": "string" },
                    "level": { "type": "string", "default": "ERROR" }
                }
            }
        }),
        json!({
            "name": "search_all_logs",
            "description": "Case-insensitive regex search across every log file; keeps the most recent matches.",
            "inputSchema": {
                "type": "object",
                "required": ["pattern"],
                "properties": {
                    "pattern": { "type": "string" },
                    "max_results": { "type": "integer", "default": 50 }
                }
            }
        }),
        json!({
            "name": "log_summary",
            "description": "Count lines per level and rank the top 5 services of a log file.",
            "inputSchema": {
                "type": "object",
                "required": ["filename"],
                "properties": {
                    "filename": { "type": "string" }
                }
            }
        }),
    ]
}
