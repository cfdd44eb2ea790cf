use mailscope_domain::QueryFilter;
use mailscope_error::{EngineError, ErrorResponse};
use mailscope_query::{EmailRequest, Format, MailService, SearchInput};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use super::tools;
use super::types::*;

const FILTER_KEYS: [&str; 6] = ["sender", "subject", "start_date", "end_date", "text", "flags"];

pub struct McpServer {
    service: MailService,
}

impl McpServer {
    pub fn new(service: MailService) -> Self {
        Self { service }
    }

    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();

        debug!("MCP server started, waiting for requests on stdin");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let msg: RpcMessage = match serde_json::from_str(line) {
                Ok(m) => m,
                Err(e) => {
                    let resp =
                        RpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {e}"));
                    write_response(&mut stdout, &resp).await?;
                    continue;
                }
            };

            if msg.is_notification() {
                if msg.method.as_deref() == Some("notifications/initialized") {
                    debug!("client initialized");
                }
                continue;
            }

            let id = msg.id.clone().unwrap_or(Value::Null);
            let resp = if !msg.is_valid_jsonrpc() {
                RpcResponse::err(id, INVALID_REQUEST, "invalid jsonrpc version (expected \"2.0\")")
            } else {
                match msg.method.as_deref().unwrap_or("") {
                    "" => RpcResponse::err(id, INVALID_REQUEST, "missing method"),
                    "initialize" => handle_initialize(id),
                    "tools/list" => RpcResponse::ok(id, json!({ "tools": tools::available_tools() })),
                    "tools/call" => self.handle_tools_call(id, msg.params).await,
                    "ping" => RpcResponse::ok(id, json!({})),
                    method => RpcResponse::err(
                        id,
                        METHOD_NOT_FOUND,
                        format!("unknown method: {method}"),
                    ),
                }
            };

            write_response(&mut stdout, &resp).await?;
        }

        debug!("stdin closed, MCP server shutting down");
        Ok(())
    }

    async fn handle_tools_call(&self, id: Value, params: Option<Value>) -> RpcResponse {
        let params: CallToolParams = match params.and_then(|v| serde_json::from_value(v).ok()) {
            Some(p) => p,
            None => return RpcResponse::err(id, INVALID_PARAMS, "missing or invalid params"),
        };

        let args = params.arguments.unwrap_or(json!({}));
        let result = self.dispatch_tool(&params.name, &args).await;
        if let Err(ref e) = result {
            info!(tool = %params.name, error = %e, "tool failed");
        }

        match serde_json::to_value(ToolResult::from(result)) {
            Ok(val) => RpcResponse::ok(id, val),
            Err(e) => RpcResponse::err(id, INTERNAL_ERROR, format!("serialization error: {e}")),
        }
    }

    async fn dispatch_tool(&self, name: &str, args: &Value) -> Result<String, String> {
        let fmt = Format::parse(args.get("format").and_then(|v| v.as_str()));
        let req = build_request(name, args)?;
        let resp = self.service.execute(req).await.map_err(fmt_err)?;
        Ok(resp.render(fmt))
    }
}

fn handle_initialize(id: Value) -> RpcResponse {
    RpcResponse::ok(
        id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "mailscope",
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

/// Turns tool arguments into a typed request. Argument errors are rendered
/// like engine validation errors.
fn build_request(name: &str, args: &Value) -> Result<EmailRequest, String> {
    let req = match name {
        "get_recent_emails" => EmailRequest::Recent {
            max_results: get_max_results(args, 10)?,
        },
        "get_unread_emails" => EmailRequest::Unread {
            max_results: get_max_results(args, 20)?,
        },
        "search_emails" => EmailRequest::Search {
            query: parse_search_input(args)?,
            max_results: get_max_results(args, 50)?,
        },
        "get_emails_from_sender" => EmailRequest::FromSender {
            address: get_str(args, "sender")?.to_string(),
            max_results: get_max_results(args, 20)?,
        },
        "get_emails_with_subject" => EmailRequest::WithSubject {
            keywords: get_str_or_array(args, "keywords")?
                .ok_or_else(|| missing("keywords"))?,
            max_results: get_max_results(args, 20)?,
        },
        "get_emails_by_date_range" => EmailRequest::DateRange {
            start: get_str(args, "start_date")?.to_string(),
            end: get_opt_str(args, "end_date")?,
            max_results: get_max_results(args, 50)?,
        },
        "read_email_content" => EmailRequest::ReadContent {
            id: get_str(args, "message_id")?.to_string(),
        },
        "get_email_statistics" => EmailRequest::Statistics,
        "get_labels" => EmailRequest::Labels,
        "check_setup" => EmailRequest::CheckSetup,
        other => return Err(format!("unknown tool: {other}")),
    };
    Ok(req)
}

fn parse_search_input(args: &Value) -> Result<SearchInput, String> {
    let has_filter = FILTER_KEYS.iter().any(|k| !args.get(*k).map_or(true, Value::is_null));
    match get_opt_str(args, "query")? {
        Some(_) if has_filter => Err(invalid(
            "query",
            "pass either 'query' or filter fields, not both",
        )),
        Some(q) => Ok(SearchInput::Raw(q)),
        None => Ok(SearchInput::Filter(QueryFilter {
            sender: get_opt_str(args, "sender")?,
            subject_keywords: get_str_or_array(args, "subject")?.unwrap_or_default(),
            start_date: get_opt_str(args, "start_date")?,
            end_date: get_opt_str(args, "end_date")?,
            free_text: get_opt_str(args, "text")?,
            flags: get_str_or_array(args, "flags")?
                .unwrap_or_default()
                .into_iter()
                .collect(),
            all_mail: false,
        })),
    }
}

fn fmt_err(e: EngineError) -> String {
    ErrorResponse::from(&e).to_compact()
}

fn invalid(field: &'static str, msg: impl Into<String>) -> String {
    fmt_err(EngineError::validation(field, msg))
}

fn missing(key: &'static str) -> String {
    invalid(key, format!("missing '{key}' parameter"))
}

fn get_str<'a>(args: &'a Value, key: &'static str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing(key))
}

fn get_opt_str(args: &Value, key: &'static str) -> Result<Option<String>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(key, "expected a string")),
    }
}

fn get_str_or_array(args: &Value, key: &'static str) -> Result<Option<Vec<String>>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Array(arr)) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| invalid(key, format!("'{key}[{i}]' is not a string")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(invalid(key, "expected a string or an array of strings")),
    }
}

fn get_max_results(args: &Value, default: usize) -> Result<usize, String> {
    match args.get("max_results") {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| invalid("max_results", "expected a non-negative integer")),
    }
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    resp: &RpcResponse,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string(resp)?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
