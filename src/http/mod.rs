use crate::config::{Config, FaultMode};
use crate::error::{GridError, RateScope};
use crate::gate::cache::CacheLookup;
use crate::gate::circuit::Failure;
use crate::gate::Gate;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as _;
use std::io;
use std::sync::Arc;
use std::time::Duration;

const X_API_KEY: &str = "x-api-key";
const PREVIEW_CHARS: usize = 200;

pub fn build_client(cfg: &Config) -> Result<Client, GridError> {
    let mut default_headers = HeaderMap::new();
    let ua = HeaderValue::from_str(&cfg.user_agent)
        .map_err(|e| GridError::Config(format!("user agent: {e}")))?;
    default_headers.insert(USER_AGENT, ua);
    // The API key is attached per request, not as a default header.
    Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
        .map_err(|e| GridError::Config(e.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<Value>,
}

/// Map a transport error onto a circuit failure.
///
/// Connect-phase errors (refused, DNS, TLS handshake) and streams that end
/// early (EOF, reset, aborted) count as a lost connection. Timeouts do not.
pub fn classify_transport(err: &reqwest::Error) -> Failure {
    if err.is_timeout() {
        return Failure::Other;
    }
    if err.is_connect() {
        return Failure::ConnectionLost;
    }
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::BrokenPipe
            ) {
                return Failure::ConnectionLost;
            }
        }
        source = e.source();
    }
    Failure::Other
}

/// The `errors` member of a GraphQL payload, if it carries anything.
pub fn graphql_errors(payload: &Value) -> Option<&Value> {
    match payload.get("errors") {
        None | Some(Value::Null) => None,
        Some(Value::Array(a)) if a.is_empty() => None,
        Some(v) => Some(v),
    }
}

/// True when GRID reports throttling inside a GraphQL errors array.
pub fn is_throttle(errors: &Value) -> bool {
    fn single(e: &Value) -> bool {
        if let Some(s) = e.as_str() {
            return s.contains("ENHANCE_YOUR_CALM") || s.to_lowercase().contains("rate limit");
        }
        let ext = e.get("extensions");
        let tagged = ["code", "errorType", "errorDetail"].iter().any(|k| {
            ext.and_then(|x| x.get(*k))
                .and_then(Value::as_str)
                .is_some_and(|v| v == "ENHANCE_YOUR_CALM")
        });
        tagged
            || e.get("message")
                .and_then(Value::as_str)
                .is_some_and(|m| m.contains("ENHANCE_YOUR_CALM") || m.to_lowercase().contains("rate limit"))
    }
    match errors {
        Value::Array(items) => items.iter().any(single),
        other => single(other),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// GRID GraphQL client. Every call goes through the shared [`Gate`]; nothing
/// here retries.
#[derive(Debug, Clone)]
pub struct GridClient {
    http: Client,
    cfg: Arc<Config>,
    api_key: HeaderValue,
    gate: Arc<Gate>,
}

impl GridClient {
    pub fn new(cfg: Config, gate: Arc<Gate>) -> Result<Self, GridError> {
        let mut api_key = HeaderValue::from_str(&cfg.api_key)
            .map_err(|e| GridError::Config(format!("api key: {e}")))?;
        api_key.set_sensitive(true);
        Ok(Self {
            http: build_client(&cfg)?,
            cfg: Arc::new(cfg),
            api_key,
            gate,
        })
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Run one GraphQL query and return the raw payload (`{"data": ...}`).
    pub async fn run_query(&self, query: &str, variables: &Value) -> Result<Value, GridError> {
        let gate = &self.gate;
        gate.admit()?;

        match gate.cache().get(query, variables) {
            CacheLookup::Error(reason) => {
                gate.counters().mark_cache_hit();
                return Err(GridError::upstream(None, reason));
            }
            CacheLookup::Hit(payload) => {
                gate.counters().mark_cache_hit();
                debug!("GRID cache hit");
                return Ok(payload);
            }
            CacheLookup::Miss => gate.counters().mark_cache_miss(),
        }

        match self.cfg.fault_mode {
            FaultMode::RateLimited => {
                gate.circuit().record_failure(Failure::RateLimited);
                return Err(GridError::rate(RateScope::Provider, "grid_fault_429"));
            }
            FaultMode::Eof => {
                gate.circuit().record_failure(Failure::ConnectionLost);
                return Err(GridError::circuit("grid_fault_eof"));
            }
            FaultMode::None => {}
        }

        gate.counters().mark_call_sent();
        let body = serde_json::json!({ "query": query, "variables": variables });
        let sent = self
            .http
            .post(&self.cfg.graphql_url)
            .header(X_API_KEY, self.api_key.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(&body)
            .send()
            .await;
        let res = match sent {
            Ok(r) => r,
            Err(e) => return Err(self.transport_failure(e)),
        };

        let status = res.status();
        let text = match res.text().await {
            Ok(t) => t,
            Err(e) => return Err(self.transport_failure(e)),
        };
        debug!(
            "GRID request endpoint={} status={} body_preview={}",
            self.cfg.graphql_url,
            status,
            preview(&text)
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("GRID answered 429");
            gate.circuit().record_failure(Failure::RateLimited);
            return Err(GridError::rate(RateScope::Provider, "grid_rate_limit"));
        }
        if !status.is_success() {
            gate.circuit().record_failure(Failure::Status(status.as_u16()));
            return Err(GridError::upstream(Some(status.as_u16()), preview(&text)));
        }

        let payload: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                gate.circuit().record_failure(Failure::Other);
                return Err(GridError::upstream(
                    Some(status.as_u16()),
                    format!("invalid JSON from GRID: {e}"),
                ));
            }
        };

        if let Some(errors) = graphql_errors(&payload) {
            if is_throttle(errors) {
                warn!("GRID throttled the query");
                gate.circuit().record_failure(Failure::RateLimited);
                return Err(GridError::rate(RateScope::Provider, "grid_rate_limit"));
            }
            let rendered = errors.to_string();
            gate.cache()
                .set_error(query, variables, format!("schema_error:{rendered}"));
            gate.circuit().record_failure(Failure::Other);
            return Err(GridError::upstream(
                Some(status.as_u16()),
                format!("GRID GraphQL errors: {rendered}"),
            ));
        }

        gate.cache().set(query, variables, payload.clone(), None);
        gate.circuit().record_success();
        Ok(payload)
    }

    /// Run a query and decode its `data` member.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: &Value,
    ) -> Result<T, GridError> {
        let payload = self.run_query(query, variables).await?;
        let resp: GraphQlResponse<T> = serde_json::from_value(payload)
            .map_err(|e| GridError::upstream(None, format!("unexpected GRID data shape: {e}")))?;
        resp.data
            .ok_or_else(|| GridError::upstream(None, "GRID response has no data"))
    }

    fn transport_failure(&self, e: reqwest::Error) -> GridError {
        let failure = classify_transport(&e);
        warn!("GRID transport error ({:?}): {}", failure, e);
        self.gate.circuit().record_failure(failure);
        match failure {
            Failure::ConnectionLost => GridError::circuit("grid_ssl_or_eof"),
            _ => GridError::upstream(None, e.to_string()),
        }
    }
}
