use briefing_models::{IssueKind, Stage};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{provider} returned HTTP {status}: {message}")]
    Provider {
        provider: String,
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Call timed out after {0} seconds")]
    Timeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agent task failed: {0}")]
    Task(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error body shapes used by OpenAI-compatible and most JSON APIs.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed {
        message: Option<String>,
        code: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
    },
    Plain(String),
}

impl AgentError {
    /// Build a `Provider` error from a non-success response, pulling the
    /// provider's error code out of the body when it has one.
    pub async fn from_response(provider: &str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(ErrorEnvelope {
                error: ErrorBody::Detailed { message, code, kind },
            }) => (code.or(kind), message.unwrap_or_else(|| body.clone())),
            Ok(ErrorEnvelope {
                error: ErrorBody::Plain(message),
            }) => (None, message),
            Err(_) => (None, body),
        };

        AgentError::Provider {
            provider: provider.to_string(),
            status,
            code,
            message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AgentError::Provider { status, .. } => Some(*status),
            AgentError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            AgentError::Provider { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// HTTP 429 from any provider.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            AgentError::Timeout(_) => true,
            AgentError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Map to the issue taxonomy. `is_quota` comes from the provider trait.
    pub fn issue_kind(&self, is_quota: bool) -> IssueKind {
        if is_quota {
            IssueKind::QuotaExceeded
        } else if self.is_timeout() {
            IssueKind::Timeout
        } else if matches!(self, AgentError::EmptyResponse(_)) {
            IssueKind::Empty
        } else {
            IssueKind::Failed
        }
    }
}

/// Errors that abort a request. Everything else degrades into a `StageIssue`.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("No ticker symbols found in query: {0:?}")]
    SymbolExtraction(String),

    #[error("Request cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl OrchestrationError {
    pub fn stage(&self) -> Stage {
        match self {
            OrchestrationError::SymbolExtraction(_) => Stage::SymbolExtraction,
            OrchestrationError::Cancelled { stage } => *stage,
        }
    }
}

/// Run `fut` under `timeout`, mapping expiry to [`AgentError::Timeout`].
pub async fn with_timeout<T, F>(timeout: std::time::Duration, fut: F) -> Result<T, AgentError>
where
    F: std::future::Future<Output = Result<T, AgentError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| AgentError::Timeout(timeout.as_secs()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn provider(status: u16, code: Option<&str>) -> AgentError {
        AgentError::Provider {
            provider: "test".to_string(),
            status,
            code: code.map(String::from),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn rate_limit_detection_uses_status() {
        assert!(provider(429, None).is_rate_limited());
        assert!(!provider(500, None).is_rate_limited());
        assert!(!AgentError::Parse("x".to_string()).is_rate_limited());
    }

    #[test]
    fn issue_kind_mapping() {
        assert_eq!(provider(429, None).issue_kind(true), IssueKind::QuotaExceeded);
        assert_eq!(AgentError::Timeout(5).issue_kind(false), IssueKind::Timeout);
        assert_eq!(
            AgentError::EmptyResponse("llm".to_string()).issue_kind(false),
            IssueKind::Empty
        );
        assert_eq!(provider(500, None).issue_kind(false), IssueKind::Failed);
    }

    #[test]
    fn orchestration_error_stage() {
        let err = OrchestrationError::SymbolExtraction("hello".to_string());
        assert_eq!(err.stage(), Stage::SymbolExtraction);
        let err = OrchestrationError::Cancelled {
            stage: Stage::News,
        };
        assert_eq!(err.stage(), Stage::News);
        assert_eq!(err.to_string(), "Request cancelled during news");
    }

    #[tokio::test]
    async fn with_timeout_maps_expiry() {
        let result: Result<(), AgentError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AgentError::Timeout(0))));
    }

    #[tokio::test]
    async fn with_timeout_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, AgentError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
