use crate::error::GridError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Page size for `list_series_window` when the caller gives none.
pub const DEFAULT_WINDOW_PAGE: u32 = 50;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDescriptor {
    ToolDescriptor {
        name: name.into(),
        description: description.into(),
        input_schema,
    }
}

fn id_schema(field: &str, with_tournaments: bool) -> Value {
    let mut props = serde_json::json!({ field: {"type": "string"} });
    if with_tournaments {
        props["tournament_ids"] = serde_json::json!({"type": "array", "items": {"type": "string"}});
    }
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "properties": props,
        "required": [field]
    })
}

pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        tool(
            "ping",
            "Health check; echoes a message.",
            serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": { "message": {"type": "string"} }
            }),
        ),
        tool(
            "run_query",
            "Run a raw GRID GraphQL query through the gate (cache, budgets, circuit breaker)",
            serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "query": {"type": "string"},
                    "variables": {"type": "object"}
                },
                "required": ["query"]
            }),
        ),
        tool("get_series", "Get a series by id", id_schema("id", false)),
        tool(
            "get_player_stats",
            "Aggregated statistics for a player",
            id_schema("player_id", true),
        ),
        tool(
            "get_team_stats",
            "Aggregated statistics for a team",
            id_schema("team_id", true),
        ),
        tool("list_games", "List games of a series", id_schema("series_id", false)),
        tool(
            "get_game_timeline",
            "Rounds and events of a single game",
            id_schema("game_id", false),
        ),
        tool(
            "list_series_window",
            "Series scheduled to start between two ISO-8601 timestamps",
            serde_json::json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "gte": {"type": "string"},
                    "lte": {"type": "string"},
                    "first": {"type": "integer", "minimum": 1}
                },
                "required": ["gte", "lte"]
            }),
        ),
        tool(
            "grid_health",
            "Circuit state, remaining budgets and call counters",
            serde_json::json!({"type": "object", "additionalProperties": false, "properties": {}}),
        ),
    ]
}

#[derive(Debug, Deserialize)]
pub struct PingInput {
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PingOutput {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RunQueryInput {
    pub query: String,
    #[serde(default)]
    pub variables: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct GetSeriesInput {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct GetPlayerStatsInput {
    pub player_id: String,
    pub tournament_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct GetTeamStatsInput {
    pub team_id: String,
    pub tournament_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListGamesInput {
    pub series_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GetGameTimelineInput {
    pub game_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSeriesWindowInput {
    pub gte: String,
    pub lte: String,
    pub first: Option<u32>,
}

/// Error shape carried inside tool outputs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    pub retriable: bool,
    /// User-facing apology to show in place of an answer.
    pub fallback: String,
}

impl From<&GridError> for ErrorShape {
    fn from(e: &GridError) -> Self {
        let info = e.to_error_info();
        ErrorShape {
            code: info.code,
            message: info.message,
            retriable: info.retriable,
            fallback: e.fallback_message().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemOutput<T> {
    pub item: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl<T> From<Result<Option<T>, GridError>> for ItemOutput<T> {
    fn from(r: Result<Option<T>, GridError>) -> Self {
        match r {
            Ok(item) => ItemOutput { item, error: None },
            Err(e) => ItemOutput {
                item: None,
                error: Some(ErrorShape::from(&e)),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListOutput<T> {
    pub items: Option<Vec<T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl<T> From<Result<Vec<T>, GridError>> for ListOutput<T> {
    fn from(r: Result<Vec<T>, GridError>) -> Self {
        match r {
            Ok(items) => ListOutput {
                items: Some(items),
                error: None,
            },
            Err(e) => ListOutput {
                items: None,
                error: Some(ErrorShape::from(&e)),
            },
        }
    }
}
