use thiserror::Error;

/// Everything that can go wrong while deriving a context or driving terraform.
#[derive(Debug, Error)]
pub enum ContextError {
    // Bad variable values (empty name, illegal characters, dangling failover reference...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown environment type: {0:?}")]
    UnknownEnvironment(String),

    // The git metadata lookup failed; surfaced as-is, nothing retries it
    #[error("source repo lookup failed: {0}")]
    Lookup(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    Tool {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("output error: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ContextError>;
