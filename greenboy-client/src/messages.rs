//! Message endpoints

use crate::BotClient;
use crate::error::Result;
use greenboy_core::dto::telegram::{AnswerCallbackQuery, EditMessageText, Message, SendMessage};

impl BotClient {
    // =============================================================================
    // Messages
    // =============================================================================

    /// Send a new message to a chat
    ///
    /// # Returns
    /// The message as stored by the gateway
    pub async fn send_message(&self, req: &SendMessage) -> Result<Message> {
        self.call("sendMessage", req, None).await
    }

    /// Replace the text (and keyboard) of a message the bot sent earlier
    ///
    /// The gateway answers `true` for inline messages and the edited
    /// message otherwise; only success matters here.
    pub async fn edit_message_text(&self, req: &EditMessageText) -> Result<()> {
        self.call::<_, serde_json::Value>("editMessageText", req, None)
            .await?;
        Ok(())
    }

    /// Acknowledge a button press, optionally showing a short toast
    pub async fn answer_callback_query(&self, req: &AnswerCallbackQuery) -> Result<bool> {
        self.call("answerCallbackQuery", req, None).await
    }
}
