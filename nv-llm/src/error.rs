use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Every failure of an external model call. The agent reports these as
/// transcript notices and keeps the session going.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing api key for provider {0}")]
    MissingApiKey(String),

    #[error("transport error: {0}")]
    Http(String),

    /// Non-2xx reply; `body` is kept verbatim so quota and auth messages reach the operator.
    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Http(format!("request timed out: {e}"));
        }
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}
