use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

/// Recoverable action failures. Each one becomes a transcript notice; none ends the session.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A run string did not match the command grammar.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Path outside the allowed roots, or script/interpreter not whitelisted.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// The human answered no.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Model call, vision call or child process failed.
    #[error("external failure: {0}")]
    ExternalFailure(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(e.to_string());
        }
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidArguments(e.to_string())
    }
}
