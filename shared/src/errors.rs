/// Unified error types for Courier.
use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Sending or editing a chat message failed. Never aborts a request.
    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Everything that can end a single download request early.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL: {0}")]
    InvalidInput(String),

    #[error("failed to start downloader: {0}")]
    SpawnFailed(String),

    #[error("failed to read downloader output: {0}")]
    ReadFailed(String),

    #[error("downloader exited with {}{}", exit_code_label(.code), context_suffix(.context))]
    ExitStatus {
        code: Option<i32>,
        context: Option<String>,
    },

    #[error("could not resolve downloaded files: {0}")]
    ArtifactResolution(String),

    #[error("download timed out after {0}s")]
    Timeout(u64),

    #[error("download cancelled")]
    Cancelled,
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(line) => format!(": {}", line),
        None => String::new(),
    }
}

impl DownloadError {
    /// Whether the failure happened before any process was started.
    pub fn is_input_error(&self) -> bool {
        matches!(self, DownloadError::InvalidInput(_))
    }
}

/// Result type alias for Courier operations.
pub type CourierResult<T> = Result<T, CourierError>;
