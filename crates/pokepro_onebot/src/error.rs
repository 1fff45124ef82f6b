use thiserror::Error;

/// Failure of a single OneBot action call.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action {action} failed (retcode {retcode}): {message}")]
    Failed {
        action: String,
        retcode: i64,
        message: String,
    },
    #[error("action {action} timed out")]
    Timeout { action: String },
    #[error("OneBot connection is down")]
    Disconnected,
    #[error("failed to encode action: {0}")]
    Encode(#[from] serde_json::Error),
}
