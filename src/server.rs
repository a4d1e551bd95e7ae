use crate::gate::with_run_budget;
use crate::grid::GridFetcher;
use crate::tools::*;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

// Minimal JSON-RPC 2.0 types
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Id {
    Str(String),
    Num(i64),
    Null,
}

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn rpc_error(id: Option<Id>, code: i64, message: &str, data: Option<Value>) -> Response {
    Response { jsonrpc: "2.0".into(), result: None, error: Some(RpcError { code, message: message.into(), data }), id }
}

fn rpc_ok(id: Option<Id>, result: Value) -> Response {
    Response { jsonrpc: "2.0".into(), result: Some(result), error: None, id }
}

fn to_result<T: Serialize>(id: Option<Id>, out: T) -> Response {
    match serde_json::to_value(out) {
        Ok(v) => rpc_ok(id, v),
        Err(e) => rpc_error(id, -32603, &format!("Serialization error: {}", e), None),
    }
}

/// Serves tool calls against one long-lived GRID client.
///
/// A missing or invalid configuration does not stop the server; it is
/// reported on every call that needs GRID.
pub struct Server {
    fetcher: Result<GridFetcher, String>,
    run_budget: Option<u32>,
}

impl Server {
    pub fn new(fetcher: Result<GridFetcher, String>) -> Self {
        let run_budget = fetcher.as_ref().ok().and_then(|f| f.client().config().run_budget);
        Self { fetcher, run_budget }
    }

    /// Handle one raw request line and return the serialized response.
    pub async fn handle_line(&self, line: &str) -> String {
        let resp = match serde_json::from_str::<Request>(line) {
            Ok(req) => {
                debug!("Received method={}", req.method);
                self.dispatch(req).await
            }
            Err(e) => rpc_error(None, -32700, &format!("Parse error: {}", e), None),
        };
        serde_json::to_string(&resp).unwrap_or_else(|e| {
            format!(r#"{{"jsonrpc":"2.0","error":{{"code":-32603,"message":"{}"}},"id":null}}"#, e)
        })
    }

    async fn dispatch(&self, req: Request) -> Response {
        if req.jsonrpc != "2.0" {
            return rpc_error(req.id, -32600, "Invalid Request: jsonrpc must be \"2.0\"", None);
        }
        match req.method.as_str() {
            "initialize" => handle_initialize(req.id),
            "tools/list" => rpc_ok(req.id, serde_json::json!({ "tools": tool_descriptors() })),
            "tools/call" => self.handle_tools_call(req.id, req.params).await,
            "ping" => handle_ping(req.id, req.params),
            other => rpc_error(req.id, -32601, &format!("Method not found: {}", other), None),
        }
    }

    async fn handle_tools_call(&self, id: Option<Id>, params: Value) -> Response {
        let parsed: Result<ToolCallParams, _> = serde_json::from_value(params);
        let Ok(call) = parsed else {
            return rpc_error(id, -32602, "Invalid params", None);
        };
        match call.name.as_str() {
            "ping" => return handle_ping(id, call.arguments),
            "run_query" | "get_series" | "get_player_stats" | "get_team_stats" | "list_games"
            | "get_game_timeline" | "list_series_window" | "grid_health" => {}
            _ => return rpc_error(id, -32601, &format!("Tool not found: {}", call.name), None),
        }
        let fetcher = match &self.fetcher {
            Ok(f) => f,
            Err(e) => return rpc_error(id, -32603, e, None),
        };
        if call.name == "grid_health" {
            return to_result(id, ItemOutput { item: Some(fetcher.client().gate().health()), error: None });
        }

        match self.run_budget {
            Some(limit) => with_run_budget(limit, call_grid_tool(fetcher, id, call)).await,
            None => call_grid_tool(fetcher, id, call).await,
        }
    }
}

async fn call_grid_tool(fetcher: &GridFetcher, id: Option<Id>, call: ToolCallParams) -> Response {
    let args = call.arguments;
    match call.name.as_str() {
        "run_query" => {
            let input: RunQueryInput = match parse_args(args) { Ok(v) => v, Err(e) => return rpc_error(id, -32602, &e, None) };
            let vars = input.variables.unwrap_or_else(|| serde_json::json!({}));
            let out: ItemOutput<Value> = fetcher.client().run_query(&input.query, &vars).await.map(Some).into();
            to_result(id, out)
        }
        "get_series" => {
            let input: GetSeriesInput = match parse_args(args) { Ok(v) => v, Err(e) => return rpc_error(id, -32602, &e, None) };
            let out: ItemOutput<_> = fetcher.fetch_series(&input.id).await.into();
            to_result(id, out)
        }
        "get_player_stats" => {
            let input: GetPlayerStatsInput = match parse_args(args) { Ok(v) => v, Err(e) => return rpc_error(id, -32602, &e, None) };
            let out: ItemOutput<_> = fetcher.fetch_player_stats(&input.player_id, input.tournament_ids.as_deref()).await.into();
            to_result(id, out)
        }
        "get_team_stats" => {
            let input: GetTeamStatsInput = match parse_args(args) { Ok(v) => v, Err(e) => return rpc_error(id, -32602, &e, None) };
            let out: ItemOutput<_> = fetcher.fetch_team_stats(&input.team_id, input.tournament_ids.as_deref()).await.into();
            to_result(id, out)
        }
        "list_games" => {
            let input: ListGamesInput = match parse_args(args) { Ok(v) => v, Err(e) => return rpc_error(id, -32602, &e, None) };
            let out: ListOutput<_> = fetcher.fetch_games(&input.series_id).await.into();
            to_result(id, out)
        }
        "get_game_timeline" => {
            let input: GetGameTimelineInput = match parse_args(args) { Ok(v) => v, Err(e) => return rpc_error(id, -32602, &e, None) };
            let out: ItemOutput<Value> = fetcher.fetch_game_timeline(&input.game_id).await.map(Some).into();
            to_result(id, out)
        }
        "list_series_window" => {
            let input: ListSeriesWindowInput = match parse_args(args) { Ok(v) => v, Err(e) => return rpc_error(id, -32602, &e, None) };
            let first = input.first.unwrap_or(DEFAULT_WINDOW_PAGE);
            let out: ListOutput<_> = fetcher.fetch_series_window(&input.gte, &input.lte, first).await.into();
            to_result(id, out)
        }
        other => rpc_error(id, -32601, &format!("Tool not found: {}", other), None),
    }
}

/// Read newline-delimited requests from stdin until EOF, answering each on
/// stdout. Gate state lives as long as the process.
pub async fn run_stdio_server(server: Server) -> anyhow::Result<()> {
    info!("Starting grid-gate stdio server; protocol={}", PROTOCOL_VERSION);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let payload = server.handle_line(&line).await;
        out.write_all(payload.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    debug!("stdin closed; shutting down");
    Ok(())
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| {
        warn!("rejecting tool arguments: {}", e);
        format!("Invalid params: {}", e)
    })
}

fn handle_initialize(id: Option<Id>) -> Response {
    rpc_ok(
        id,
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": "grid-gate",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": { "tools": {} }
        }),
    )
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn handle_ping(id: Option<Id>, params: Value) -> Response {
    let input: PingInput = match serde_json::from_value(params) {
        Ok(v) => v,
        Err(_) => PingInput { message: None },
    };
    let message = input.message.unwrap_or_else(|| "pong".to_string());
    to_result(id, PingOutput { message })
}
