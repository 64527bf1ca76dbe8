use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    Conflict,
    Validation,
    RateLimited,
    Internal,
}

/// Error body returned by the jobs backend on non-success responses.
///
/// Backends disagree on the field name, so both `message` and `detail` are
/// accepted; `message` wins when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: Some(message.into()),
            detail: None,
        }
    }

    pub fn human_message(&self) -> Option<&str> {
        [self.message.as_deref(), self.detail.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|message| !message.is_empty())
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
