/// Shared building blocks for the Courier bot: console output
/// reconstruction, status throttling, MarkdownV2 escaping, request models,
/// error types and the download admission queue.
pub mod console;
pub mod errors;
pub mod markup;
pub mod models;
pub mod task_queue;
pub mod throttle;
