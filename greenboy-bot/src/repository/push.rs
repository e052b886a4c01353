//! Push channel repository
//!
//! Outgoing side of the chat gateway: new messages, edits of messages the
//! bot already sent, and answers to button presses.

use async_trait::async_trait;

use greenboy_client::{BotClient, ClientError};
use greenboy_core::domain::monitor::DeliveryTarget;
use greenboy_core::dto::telegram::{
    AnswerCallbackQuery, EditMessageText, InlineKeyboardMarkup, ParseMode, SendMessage,
};

/// A message ready to be pushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

impl OutgoingMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
            keyboard: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Markdown),
            ..Self::plain(text)
        }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self {
            parse_mode: Some(ParseMode::Html),
            ..Self::plain(text)
        }
    }

    /// Attaches a keyboard; empty keyboards are dropped
    pub fn with_keyboard(mut self, keyboard: InlineKeyboardMarkup) -> Self {
        self.keyboard = (!keyboard.is_empty()).then_some(keyboard);
        self
    }
}

/// Escapes text placed outside code spans of a Markdown message
///
/// Job names such as `my_job` would otherwise open an unterminated italic
/// entity and the gateway rejects the whole message.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Repository trait for pushing messages to chats
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Sends a new message to a chat
    async fn send(&self, target: DeliveryTarget, message: &OutgoingMessage)
    -> Result<(), ClientError>;

    /// Replaces the content of a message sent earlier
    async fn edit(
        &self,
        target: DeliveryTarget,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), ClientError>;

    /// Acknowledges a button press, optionally with a short toast
    async fn answer_callback(&self, callback_id: &str, text: Option<&str>)
    -> Result<(), ClientError>;
}

/// Bot API implementation of PushChannel
pub struct TelegramPushChannel {
    client: BotClient,
}

impl TelegramPushChannel {
    pub fn new(client: BotClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushChannel for TelegramPushChannel {
    async fn send(
        &self,
        target: DeliveryTarget,
        message: &OutgoingMessage,
    ) -> Result<(), ClientError> {
        self.client
            .send_message(&SendMessage {
                chat_id: target,
                text: message.text.clone(),
                parse_mode: message.parse_mode,
                reply_markup: message.keyboard.clone(),
            })
            .await?;
        Ok(())
    }

    async fn edit(
        &self,
        target: DeliveryTarget,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), ClientError> {
        self.client
            .edit_message_text(&EditMessageText {
                chat_id: target,
                message_id,
                text: message.text.clone(),
                parse_mode: message.parse_mode,
                reply_markup: message.keyboard.clone(),
            })
            .await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ClientError> {
        self.client
            .answer_callback_query(&AnswerCallbackQuery {
                callback_query_id: callback_id.to_string(),
                text: text.map(str::to_string),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenboy_core::dto::telegram::InlineKeyboardButton;

    #[test]
    fn test_empty_keyboard_is_dropped() {
        let message = OutgoingMessage::plain("hi").with_keyboard(InlineKeyboardMarkup::default());
        assert!(message.keyboard.is_none());

        let message = OutgoingMessage::markdown("hi").with_keyboard(InlineKeyboardMarkup::new(
            vec![vec![InlineKeyboardButton::new("📋 Job Details", "jobinfo_1")]],
        ));
        assert!(message.keyboard.is_some());
        assert_eq!(message.parse_mode, Some(ParseMode::Markdown));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("my_job*2"), "my\\_job\\*2");
        assert_eq!(escape_markdown("plain"), "plain");
    }
}
