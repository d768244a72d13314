/// Text of every message the bot sends.
use courier_shared::markup::{code_block, escape, link};
use courier_shared::task_queue::{QueueStats, TaskState, TrackedTask};
use url::Url;

/// Acknowledgement sent as soon as a request is accepted.
pub const STARTED_TEXT: &str = "Started";

/// Telegram rejects messages over 4096 characters; stay well below.
const MAX_STATUS_CHARS: usize = 3500;

pub const HELP_TEXT: &str = "\
Send me a link and I will download it.

While the download runs, this chat shows the downloader output. \
When it is done you get a link to every file.

Commands:
/download <url> - Download a URL
/status - Show the download queue
/help - Show this message";

/// Public URL of a file inside the storage directory.
pub fn artifact_url(base: &Url, relative_path: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        segments.extend(
            relative_path
                .split('/')
                .filter(|s| !s.is_empty() && *s != "." && *s != ".."),
        );
    }
    url
}

/// File name part of an artifact path.
pub fn artifact_name(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}

/// Completion message: one link per produced file (MarkdownV2).
pub fn completion_text(base: &Url, artifacts: &[String]) -> String {
    let mut text = String::new();
    for path in artifacts {
        let url = artifact_url(base, path);
        text.push_str(&link(artifact_name(path), url.as_str()));
        text.push('\n');
    }
    text
}

/// Failure reply (MarkdownV2).
pub fn failure_text(reason: &str) -> String {
    escape(&format!("Download failed: {}", reason))
}

/// Status message body for a transcript snapshot (MarkdownV2).
pub fn status_text(snapshot: &str) -> String {
    code_block(tail(snapshot, MAX_STATUS_CHARS))
}

/// Last part of `text` holding at most `max_chars` characters, cut at a line
/// start when possible.
fn tail(text: &str, max_chars: usize) -> &str {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(total - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let rest = &text[cut..];
    match rest.find('\n') {
        Some(pos) if pos + 1 < rest.len() => &rest[pos + 1..],
        _ => rest,
    }
}

/// Reply to /status (plain text): queue totals, then the caller's own
/// requests.
pub fn queue_status_text(stats: &QueueStats, mine: &[TrackedTask]) -> String {
    let mut text = format!(
        "Downloads running: {}/{}\nWaiting: {}\nCompleted: {}\nFailed: {}",
        stats.running, stats.max_concurrent, stats.queued, stats.completed, stats.failed
    );
    if !mine.is_empty() {
        text.push_str("\n\nYour downloads:");
        for task in mine {
            let id = task.request_id.to_string();
            let line = match (&task.status, task.started_at) {
                (TaskState::Running, Some(started)) => {
                    format!("{} running since {} UTC", &id[..8], started.format("%H:%M:%S"))
                }
                _ => format!("{} waiting since {} UTC", &id[..8], task.enqueued_at.format("%H:%M:%S")),
            };
            text.push('\n');
            text.push_str(&line);
        }
    }
    text
}
