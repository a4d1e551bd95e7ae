//! Typed helpers over the frozen query templates.
//!
//! GRID deployments differ in which fields they populate, so every decoded
//! shape is tolerant: optional fields default instead of failing the call.

use super::queries;
use crate::error::GridError;
use crate::http::GridClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameShortened {
    #[serde(default)]
    pub name_shortened: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesFormat {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_shortened: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesTeam {
    #[serde(default)]
    pub base_info: Option<TeamRef>,
    #[serde(default)]
    pub score_advantage: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: String,
    #[serde(default)]
    pub title: Option<NameShortened>,
    #[serde(default)]
    pub tournament: Option<NameShortened>,
    #[serde(default)]
    pub start_time_scheduled: Option<String>,
    #[serde(default)]
    pub format: Option<SeriesFormat>,
    #[serde(default)]
    pub teams: Vec<SeriesTeam>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapRef {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameTeam {
    #[serde(default)]
    pub team: Option<TeamRef>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub side: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub map: Option<MapRef>,
    #[serde(default)]
    pub teams: Vec<GameTeam>,
}

#[derive(Deserialize)]
struct SeriesData {
    series: Option<Series>,
}

#[derive(Deserialize)]
struct SeriesWithGames {
    #[serde(default)]
    games: Option<Vec<Game>>,
}

#[derive(Deserialize)]
struct GamesData {
    series: Option<SeriesWithGames>,
}

#[derive(Deserialize)]
struct Edge {
    node: Series,
}

#[derive(Deserialize)]
struct Connection {
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct WindowData {
    #[serde(rename = "allSeries")]
    all_series: Option<Connection>,
}

/// Thin façade binding the query templates to a [`GridClient`].
#[derive(Debug, Clone)]
pub struct GridFetcher {
    client: GridClient,
}

impl GridFetcher {
    pub fn new(client: GridClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GridClient {
        &self.client
    }

    pub async fn fetch_series(&self, series_id: &str) -> Result<Option<Series>, GridError> {
        let data: SeriesData = self
            .client
            .query(queries::SERIES_BY_ID, &json!({ "id": series_id }))
            .await?;
        Ok(data.series)
    }

    pub async fn fetch_player_stats(
        &self,
        player_id: &str,
        tournament_ids: Option<&[String]>,
    ) -> Result<Option<Value>, GridError> {
        let vars = json!({ "playerId": player_id, "tournamentIds": tournament_ids });
        let payload = self.client.run_query(queries::PLAYER_STATISTICS, &vars).await?;
        Ok(data_field(&payload, "playerStatistics"))
    }

    pub async fn fetch_team_stats(
        &self,
        team_id: &str,
        tournament_ids: Option<&[String]>,
    ) -> Result<Option<Value>, GridError> {
        let vars = json!({ "teamId": team_id, "tournamentIds": tournament_ids });
        let payload = self.client.run_query(queries::TEAM_STATISTICS, &vars).await?;
        Ok(data_field(&payload, "teamStatistics"))
    }

    /// Games under a series; empty when the series or its games are missing.
    pub async fn fetch_games(&self, series_id: &str) -> Result<Vec<Game>, GridError> {
        let data: GamesData = self
            .client
            .query(queries::SERIES_GAMES, &json!({ "id": series_id }))
            .await?;
        Ok(data.series.and_then(|s| s.games).unwrap_or_default())
    }

    /// Rounds and events of one game as GRID returns them; `{}` when missing.
    pub async fn fetch_game_timeline(&self, game_id: &str) -> Result<Value, GridError> {
        let payload = self
            .client
            .run_query(queries::GAME_TIMELINE, &json!({ "id": game_id }))
            .await?;
        Ok(data_field(&payload, "game").unwrap_or_else(|| json!({})))
    }

    /// Series whose scheduled start falls in `[gte, lte]`, at most `first`.
    pub async fn fetch_series_window(
        &self,
        gte: &str,
        lte: &str,
        first: u32,
    ) -> Result<Vec<Series>, GridError> {
        let vars = json!({ "gte": gte, "lte": lte, "first": first });
        let data: WindowData = self.client.query(queries::ALL_SERIES_WINDOW, &vars).await?;
        Ok(data
            .all_series
            .map(|c| c.edges.into_iter().map(|e| e.node).collect())
            .unwrap_or_default())
    }
}

fn data_field(payload: &Value, field: &str) -> Option<Value> {
    payload
        .get("data")
        .and_then(|d| d.get(field))
        .filter(|v| !v.is_null())
        .cloned()
}
