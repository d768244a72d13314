/// Outbound chat messages.
///
/// The dispatch loop only talks to Telegram through this trait so it can be
/// driven by a recording notifier in tests.
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};

use courier_shared::errors::{CourierError, CourierResult};

/// How Telegram should interpret the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Plain,
    MarkdownV2,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message, optionally as a reply. Returns the new message id.
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        mode: RenderMode,
    ) -> CourierResult<i32>;

    /// Replace the text of a message sent earlier.
    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        mode: RenderMode,
    ) -> CourierResult<()>;
}

#[async_trait]
impl Notifier for Bot {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        mode: RenderMode,
    ) -> CourierResult<i32> {
        let mut request = self
            .send_message(ChatId(chat_id), text)
            .disable_web_page_preview(true);
        if let Some(message_id) = reply_to {
            request = request.reply_to_message_id(MessageId(message_id));
        }
        if mode == RenderMode::MarkdownV2 {
            request = request.parse_mode(ParseMode::MarkdownV2);
        }
        let message = request
            .await
            .map_err(|e| CourierError::Delivery(e.to_string()))?;
        Ok(message.id.0)
    }

    async fn edit(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        mode: RenderMode,
    ) -> CourierResult<()> {
        let mut request = self.edit_message_text(ChatId(chat_id), MessageId(message_id), text);
        if mode == RenderMode::MarkdownV2 {
            request = request.parse_mode(ParseMode::MarkdownV2);
        }
        request
            .await
            .map_err(|e| CourierError::Delivery(e.to_string()))?;
        Ok(())
    }
}
