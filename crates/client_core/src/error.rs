use shared::{domain::JobId, error::ApiError};
use thiserror::Error;

const MAX_RAW_BODY_MESSAGE: usize = 200;

/// A rejected backend call. Transport failures carry no status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiFailure {
    pub message: String,
    pub status: Option<u16>,
}

impl ApiFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn from_error_body(status: u16, body: &str) -> Self {
        if let Ok(parsed) = serde_json::from_str::<ApiError>(body) {
            if let Some(message) = parsed.human_message() {
                return Self::with_status(status, message);
            }
        }

        let body = body.trim();
        if !body.is_empty() && body.chars().count() <= MAX_RAW_BODY_MESSAGE {
            return Self::with_status(status, body);
        }

        Self::with_status(status, format!("request failed with status {status}"))
    }
}

impl From<reqwest::Error> for ApiFailure {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status: err.status().map(|status| status.as_u16()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Request(#[from] ApiFailure),
    #[error("a change to job {0} is still saving")]
    InFlight(JobId),
    #[error("job {0} is not loaded")]
    UnknownEntity(JobId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetailError {
    #[error("no job is open")]
    NotOpen,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Request(#[from] ApiFailure),
    #[error(transparent)]
    Mutation(#[from] MutationError),
}
