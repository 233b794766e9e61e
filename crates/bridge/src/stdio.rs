//! stdio transport
//!
//! Newline-delimited JSON-RPC 2.0 on stdin/stdout. Logs go to stderr so
//! stdout only ever carries protocol frames.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::prompts::PromptCatalog;
use crate::tools::{Services, ToolRegistry};
use crate::{Error, Result};

const PROTOCOL_VERSION: &str = "2025-06-18";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Clone)]
pub struct StdioServer {
    registry: Arc<ToolRegistry>,
    services: Services,
    prompts: Arc<PromptCatalog>,
}

impl StdioServer {
    pub fn new(registry: Arc<ToolRegistry>, services: Services, prompts: Arc<PromptCatalog>) -> Self {
        Self {
            registry,
            services,
            prompts,
        }
    }

    /// Serve on the process's stdin and stdout until stdin closes.
    pub async fn run(&self) -> Result<()> {
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Read requests until `reader` is exhausted. Each request runs on its
    /// own task; replies are written in completion order and all in-flight
    /// requests are answered before this returns.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (replies, mut outbox) = mpsc::unbounded_channel::<Value>();
        info!("stdio server ready, waiting for messages...");

        let read = async move {
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }

                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.trim(),
                    Err(e) => {
                        warn!("Received a line that is not UTF-8: {}", e);
                        let _ = replies.send(error_response(Value::Null, PARSE_ERROR, &format!("parse error: {}", e)));
                        continue;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                debug!("Received message: {}", line);

                match serde_json::from_str::<Value>(line) {
                    Ok(message) => {
                        let server = self.clone();
                        let replies = replies.clone();
                        tokio::spawn(async move {
                            if let Some(response) = server.handle_message(message).await {
                                let _ = replies.send(response);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to parse JSON: {}", e);
                        let _ = replies.send(error_response(Value::Null, PARSE_ERROR, &format!("parse error: {}", e)));
                    }
                }
            }
            info!("stdin closed, shutting down");
            Ok::<(), Error>(())
        };

        let write = async {
            while let Some(response) = outbox.recv().await {
                let mut frame = serde_json::to_vec(&response)?;
                frame.push(b'\n');
                writer.write_all(&frame).await?;
                writer.flush().await?;
            }
            Ok::<(), Error>(())
        };

        let (read, write) = tokio::join!(read, write);
        read.and(write)
    }

    /// Handle one JSON-RPC message. Notifications (no `id`) get no reply.
    pub async fn handle_message(&self, message: Value) -> Option<Value> {
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let Some(id) = message.get("id").cloned() else {
            debug!("Notification {}", method);
            return None;
        };

        let outcome = match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "prompts": {}
                },
                "serverInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.descriptors() })),
            "tools/call" => self.call_tool(params).await,
            "prompts/list" => Ok(json!({ "prompts": self.prompts.list() })),
            "prompts/get" => self.get_prompt(params),
            other => {
                return Some(error_response(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("method not found: {}", other),
                ))
            }
        };

        Some(match outcome {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(e) => {
                let code = match e {
                    Error::NotFound(_) | Error::Validation(_) => INVALID_PARAMS,
                    _ => INTERNAL_ERROR,
                };
                error_response(id, code, &e.to_string())
            }
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("tools/call requires a tool name".into()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let result = self.registry.invoke(&self.services, name, arguments).await?;
        let mut body = json!({
            "content": [{ "type": "text", "text": result.text() }],
            "isError": !result.success,
        });
        if let Some(metadata) = result.metadata {
            body["_meta"] = metadata;
        }
        Ok(body)
    }

    fn get_prompt(&self, params: Value) -> Result<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("prompts/get requires a prompt name".into()))?;
        let arguments: HashMap<String, String> = match params.get("arguments") {
            Some(Value::Null) | None => HashMap::new(),
            Some(args) => serde_json::from_value(args.clone())
                .map_err(|e| Error::Validation(format!("prompt arguments must be strings: {}", e)))?,
        };
        Ok(serde_json::to_value(self.prompts.get(name, &arguments)?)?)
    }
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
