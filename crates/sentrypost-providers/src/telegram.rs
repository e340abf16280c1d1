//! Telegram notification transport.
//!
//! Send-only: `sendMessage` against the Bot API. Messages are split into
//! 4096-character chunks to comply with Telegram's limit. Inbound
//! message handling (the operator chat UI) is out of scope — this is
//! strictly the one-way checkin/alert channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::error;

use crate::config::TelegramConfig;
use crate::traits::NotificationSink;

const MAX_MESSAGE_LEN: usize = 4096;
const TELEGRAM_API: &str = "https://api.telegram.org/bot";

/// Split a long message into <=4096-character chunks, preferring newline
/// boundaries so formatting from the source message survives.
pub fn split_message(text: &str) -> Vec<String> {
    if text.len() <= MAX_MESSAGE_LEN {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let end = (start + MAX_MESSAGE_LEN).min(text.len());
        let chunk = &text[start..end];
        let split_at = if end < text.len() {
            chunk.rfind('\n').map(|p| p + 1).unwrap_or(chunk.len())
        } else {
            chunk.len()
        };
        chunks.push(text[start..start + split_at].to_string());
        start += split_at;
    }
    chunks
}

pub struct TelegramSink {
    bot_token: String,
    chat_id: String,
    client: Client,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token,
            chat_id: config.chat_id,
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("failed to create reqwest client"),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}{}/{}", TELEGRAM_API, self.bot_token, method)
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        for chunk in split_message(message) {
            let body = serde_json::json!({
                "chat_id": self.chat_id,
                "text": chunk,
                "parse_mode": "Markdown",
            });
            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&body)
                .send()
                .await?;
            if !resp.status().is_success() {
                let text = resp.text().await.unwrap_or_default();
                error!("telegram sendMessage failed: {text}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_message() {
        let msg = "Hello, world!";
        assert_eq!(split_message(msg), vec![msg.to_string()]);
    }

    #[test]
    fn test_split_long_message() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_MESSAGE_LEN);
        }
        assert_eq!(chunks.join(""), msg);
    }
}
