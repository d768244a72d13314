/// Telegram update handling.
///
/// The teloxide dispatcher does no work of its own here: every message or
/// command is turned into an `Inbound` event and queued for the dispatch loop.
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bot command definitions.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Courier commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show help")]
    Help,
    #[command(description = "Download a URL")]
    Download(String),
    #[command(description = "Show the download queue")]
    Status,
}

/// Something the dispatch loop has to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Plain text message, treated as a URL to download.
    Text {
        chat_id: i64,
        message_id: i32,
        text: String,
    },
    Command {
        chat_id: i64,
        message_id: i32,
        command: Command,
    },
}

/// Handler tree that forwards updates into `inbound`.
pub fn schema(inbound: mpsc::Sender<Inbound>) -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint({
                    let inbound = inbound.clone();
                    move |msg: Message, cmd: Command| {
                        let inbound = inbound.clone();
                        async move {
                            forward(&inbound, Inbound::Command {
                                chat_id: msg.chat.id.0,
                                message_id: msg.id.0,
                                command: cmd,
                            })
                            .await
                        }
                    }
                }),
        )
        .branch(Update::filter_message().endpoint(move |msg: Message| {
            let inbound = inbound.clone();
            async move {
                match msg.text() {
                    Some(text) => {
                        forward(&inbound, Inbound::Text {
                            chat_id: msg.chat.id.0,
                            message_id: msg.id.0,
                            text: text.to_string(),
                        })
                        .await
                    }
                    None => {
                        debug!(chat_id = msg.chat.id.0, "ignoring message without text");
                        Ok(())
                    }
                }
            }
        }))
}

async fn forward(inbound: &mpsc::Sender<Inbound>, event: Inbound) -> ResponseResult<()> {
    if inbound.send(event).await.is_err() {
        warn!("dispatch loop is not running, dropping update");
    }
    Ok(())
}
