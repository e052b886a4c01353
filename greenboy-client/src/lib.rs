//! Green-Boy Bot API Client
//!
//! A small, type-safe HTTP client for the chat gateway (Telegram Bot API).
//!
//! The bot uses it for three things: long-polling incoming updates,
//! pushing and editing messages, and keeping the gateway free of stale
//! webhooks so that only one poller is active per bot token.
//!
//! # Example
//!
//! ```no_run
//! use greenboy_client::BotClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), greenboy_client::ClientError> {
//!     let client = BotClient::new("https://api.telegram.org", "123456:token");
//!     let me = client.get_me().await?;
//!     println!("Connected as {}", me.display_name());
//!     Ok(())
//! }
//! ```

pub mod error;
mod messages;
mod updates;

// Re-export commonly used types
pub use error::{ClientError, Result};

use greenboy_core::dto::telegram::ApiResponse;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for the Bot API
///
/// Methods are grouped as:
/// - Updates: long polling and webhook management
/// - Messages: send, edit, answer button presses
#[derive(Clone)]
pub struct BotClient {
    /// API root (e.g., "https://api.telegram.org")
    api_url: String,
    /// `bot<token>` path segment; never logged
    bot_path: String,
    /// HTTP client instance
    client: Client,
}

impl std::fmt::Debug for BotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotClient")
            .field("api_url", &self.api_url)
            .field("bot_path", &"bot<redacted>")
            .finish()
    }
}

impl BotClient {
    /// Create a new client with a default HTTP client
    ///
    /// # Arguments
    /// * `api_url` - The API root, e.g. "https://api.telegram.org"
    /// * `token` - The bot token issued by the gateway
    pub fn new(api_url: impl Into<String>, token: &str) -> Self {
        Self::with_client(api_url, token, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use greenboy_client::BotClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = BotClient::with_client("https://api.telegram.org", "123:abc", http_client);
    /// assert_eq!(client.api_url(), "https://api.telegram.org");
    /// ```
    pub fn with_client(api_url: impl Into<String>, token: &str, client: Client) -> Self {
        let api_url = api_url.into();
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_path: format!("bot{}", token),
            client,
        }
    }

    /// Get the API root this client talks to
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}/{}", self.api_url, self.bot_path, method)
    }

    /// POST a JSON body to a Bot API method and decode the result
    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        self.handle_response(method, response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and unwrap the Bot API envelope
    async fn handle_response<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status().as_u16();
        let body = response.text().await?;

        let decoded = decode_envelope(status, &body);
        if let Err(e) = &decoded {
            tracing::debug!("{} failed: {}", method, e);
        }
        decoded
    }
}

/// Decode a Bot API envelope
///
/// The gateway reports failures both through the HTTP status and through
/// `ok: false` + `error_code`; the envelope wins when it is readable.
fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    let envelope: ApiResponse<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => {
            return Err(ClientError::ParseError(format!(
                "Failed to parse JSON response: {}",
                e
            )));
        }
        Err(_) => return Err(ClientError::api_error(status, body.trim())),
    };

    if !envelope.ok {
        return Err(ClientError::api_error(
            envelope.error_code.unwrap_or(status),
            envelope
                .description
                .unwrap_or_else(|| "Unknown error".to_string()),
        ));
    }

    envelope
        .result
        .ok_or_else(|| ClientError::ParseError("Response has no result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenboy_core::dto::telegram::User;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BotClient::new("https://api.telegram.org/", "123:abc");
        assert_eq!(client.api_url(), "https://api.telegram.org");
        assert_eq!(
            client.method_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let client = BotClient::new("https://api.telegram.org", "123:secret");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_decode_success() {
        let body = r#"{"ok": true, "result": {"id": 1, "is_bot": true, "first_name": "green", "username": "green_boy_bot"}}"#;
        let user: User = decode_envelope(200, body).unwrap();
        assert_eq!(user.username.as_deref(), Some("green_boy_bot"));
    }

    #[test]
    fn test_decode_conflict() {
        let body = r#"{"ok": false, "error_code": 409, "description": "Conflict: terminated by other getUpdates request; make sure that only one bot instance is running"}"#;
        let err = decode_envelope::<bool>(409, body).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_decode_non_json_error() {
        let err = decode_envelope::<bool>(502, "<html>Bad Gateway</html>").unwrap_err();
        match err {
            ClientError::ApiError { status, .. } => assert_eq!(status, 502),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_garbage_on_success_is_parse_error() {
        let err = decode_envelope::<bool>(200, "not json").unwrap_err();
        assert!(matches!(err, ClientError::ParseError(_)));
    }
}
