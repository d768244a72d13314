/// Request, status and result types passed between orchestrators and the
/// dispatch loop.
use uuid::Uuid;

/// One inbound download request and where its replies go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub id: Uuid,
    pub chat_id: i64,
    /// Message that carried the URL; every reply threads under it.
    pub message_id: i32,
    pub url: String,
}

impl RequestContext {
    pub fn new(chat_id: i64, message_id: i32, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            chat_id,
            message_id,
            url: url.into(),
        }
    }

    /// First 8 characters of the id, for logs and user-facing text.
    pub fn short_id(&self) -> String {
        self.id.to_string().chars().take(8).collect()
    }
}

/// Intermediate status of a running request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    /// Acknowledgement, sent once before any output.
    Started,
    /// Rendered transcript of the downloader output so far.
    Snapshot(String),
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub request: RequestContext,
    pub kind: StatusKind,
}

/// Final outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Paths of the produced files, relative to the storage directory.
    Success { artifacts: Vec<String> },
    Failure { reason: String },
}

#[derive(Debug, Clone)]
pub struct TerminalResult {
    pub request: RequestContext,
    pub outcome: Outcome,
}
