use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which limit rejected a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    /// Process-wide fixed-window budget.
    Global,
    /// Budget installed for the current logical run.
    Run,
    /// GRID itself answered with 429 or a throttle error.
    Provider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RateExceeded,
    CircuitOpen,
    Upstream,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("rate exceeded ({scope:?}): {reason}")]
    RateExceeded { scope: RateScope, reason: String },
    #[error("circuit open: {reason}")]
    CircuitOpen { reason: String },
    #[error("upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        status: Option<u16>,
        message: String,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GridError {
    pub fn rate(scope: RateScope, reason: impl Into<String>) -> Self {
        GridError::RateExceeded {
            scope,
            reason: reason.into(),
        }
    }

    pub fn circuit(reason: impl Into<String>) -> Self {
        GridError::CircuitOpen {
            reason: reason.into(),
        }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        GridError::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GridError::RateExceeded { .. } => ErrorKind::RateExceeded,
            GridError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            GridError::Upstream { .. } => ErrorKind::Upstream,
            GridError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            GridError::RateExceeded { reason, .. } => ErrorInfo {
                code: "rate_limited".into(),
                message: reason.clone(),
                retriable: true,
            },
            GridError::CircuitOpen { reason } => ErrorInfo {
                code: "circuit_open".into(),
                message: reason.clone(),
                retriable: true,
            },
            GridError::Upstream {
                status: Some(code),
                message,
            } => match StatusCode::from_u16(*code) {
                Ok(status) => map_status_to_error(status, message.clone()),
                Err(_) => ErrorInfo {
                    code: "upstream_error".into(),
                    message: message.clone(),
                    retriable: false,
                },
            },
            GridError::Upstream {
                status: None,
                message,
            } => ErrorInfo {
                code: "upstream_error".into(),
                message: message.clone(),
                retriable: false,
            },
            GridError::Config(message) => ErrorInfo {
                code: "server_error".into(),
                message: message.clone(),
                retriable: false,
            },
        }
    }

    /// Apologetic text shown to end users instead of the raw error.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            GridError::RateExceeded {
                scope: RateScope::Run,
                ..
            } => "抱歉，本次分析的数据查询次数已用完，请稍后再问一次。",
            GridError::RateExceeded { .. } => {
                "抱歉，数据服务当前请求过于频繁，请稍等片刻再试。"
            }
            GridError::CircuitOpen { .. } => {
                "抱歉，数据服务暂时不可用，我们正在等待其恢复，请稍后再试。"
            }
            GridError::Upstream { .. } => "抱歉，数据服务返回了异常结果，暂时无法回答这个问题。",
            GridError::Config(_) => "抱歉，服务配置有误，暂时无法查询比赛数据。",
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Error shape surfaced to tool callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub retriable: bool,
}

pub fn map_status_to_error(status: StatusCode, message: String) -> ErrorInfo {
    let (code, retriable) = match status {
        StatusCode::BAD_REQUEST => ("bad_request", false),
        StatusCode::UNAUTHORIZED => ("unauthorized", false),
        StatusCode::FORBIDDEN => ("forbidden", false),
        StatusCode::NOT_FOUND => ("not_found", false),
        StatusCode::CONFLICT => ("conflict", false),
        StatusCode::TOO_MANY_REQUESTS => ("rate_limited", true),
        s if s.is_server_error() => ("upstream_error", true),
        _ => ("server_error", false),
    };
    ErrorInfo {
        code: code.to_string(),
        message,
        retriable,
    }
}
