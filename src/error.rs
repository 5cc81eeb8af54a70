use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why a request was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Every attempt came back 429/503 (or failed to connect) and the bound was reached.
    RetriesExhausted,
    /// A non-200, non-transient status. Never retried.
    UnexpectedStatus,
    /// The last attempt failed below HTTP (connect, timeout, TLS).
    Transport,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RetriesExhausted => "retries exhausted",
            Self::UnexpectedStatus => "unexpected status",
            Self::Transport => "transport error",
        })
    }
}

/// The part of a run a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Auth,
    Fetch,
    Pagination,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auth => "auth",
            Self::Fetch => "fetch",
            Self::Pagination => "pagination",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "API request failed ({reason}): {} for url ({url}){}",
        describe_status(.status),
        describe_body(.status, .body)
    )]
    RequestFailed {
        url: String,
        reason: FailureReason,
        status: Option<u16>,
        body: String,
    },

    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to parse API JSON (url={url})")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("credential store {}: {message}", .path.display())]
    Store { path: PathBuf, message: String },

    #[error("failed to write {}", .path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl Error {
    pub(crate) fn in_stage(self, stage: Stage) -> Self {
        match self {
            // Keep the innermost stage; it is the one that actually failed.
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was raised in, if it was tagged with one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Last HTTP status observed before the failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            Self::Stage { source, .. } => source.status(),
            Self::AuthenticationFailed {
                source: Some(source),
                ..
            } => source.status(),
            _ => None,
        }
    }

    /// Last HTTP body observed before the failure.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::RequestFailed { body, .. } => Some(body),
            Self::Stage { source, .. } => source.body(),
            Self::AuthenticationFailed {
                source: Some(source),
                ..
            } => source.body(),
            _ => None,
        }
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match *status {
        Some(code) => format!("HTTP {}", code),
        None => "no response".to_string(),
    }
}

fn describe_body(status: &Option<u16>, body: &str) -> String {
    let mut out = String::new();
    // Remedies for the failures users can act on.
    match *status {
        Some(401) | Some(403) => out.push_str(
            "\n- Check that the refresh token is valid and has not been revoked on eloverblik.dk\n- Run again with --refresh-token to discard the cached access token",
        ),
        Some(429) | Some(503) => {
            out.push_str("\n- The provider is busy; try again later")
        }
        _ => {}
    }
    if !body.trim().is_empty() {
        out.push('\n');
        out.push_str(body.trim());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_failed(status: Option<u16>) -> Error {
        Error::RequestFailed {
            url: "https://example.test/api/token".to_string(),
            reason: FailureReason::UnexpectedStatus,
            status,
            body: "{\"error\":\"nope\"}".to_string(),
        }
    }

    #[test]
    fn stage_wrapping_keeps_status_and_body() {
        let err = request_failed(Some(500)).in_stage(Stage::Fetch);
        assert_eq!(err.stage(), Some(Stage::Fetch));
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.body(), Some("{\"error\":\"nope\"}"));
    }

    #[test]
    fn innermost_stage_wins() {
        let err = request_failed(Some(503))
            .in_stage(Stage::Pagination)
            .in_stage(Stage::Fetch);
        assert_eq!(err.stage(), Some(Stage::Pagination));
    }

    #[test]
    fn unauthorized_message_carries_remedy() {
        let msg = request_failed(Some(401)).to_string();
        assert!(msg.contains("HTTP 401"));
        assert!(msg.contains("--refresh-token"));
        assert!(msg.contains("nope"));
    }

    #[test]
    fn transport_failure_without_status() {
        let err = Error::RequestFailed {
            url: "https://example.test".to_string(),
            reason: FailureReason::Transport,
            status: None,
            body: String::new(),
        };
        assert!(err.to_string().contains("no response"));
        assert_eq!(err.status(), None);
    }
}
