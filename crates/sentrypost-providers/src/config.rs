//! Configuration for the notification transport.
//!
//! Loaded from environment variables only, no config file.

use anyhow::bail;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat id every notification is sent to.
    pub chat_id: String,
}

impl TelegramConfig {
    /// Build from environment variables. Returns `Err` if unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let bot_token = std::env::var("SENTRYPOST_TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("SENTRYPOST_TELEGRAM_BOT_TOKEN not set"))?;
        if bot_token.trim().is_empty() {
            bail!("SENTRYPOST_TELEGRAM_BOT_TOKEN is empty");
        }
        let chat_id = std::env::var("SENTRYPOST_TELEGRAM_CHAT_ID")
            .map_err(|_| anyhow::anyhow!("SENTRYPOST_TELEGRAM_CHAT_ID not set"))?;
        if chat_id.trim().is_empty() {
            bail!("SENTRYPOST_TELEGRAM_CHAT_ID is empty");
        }
        Ok(Self { bot_token, chat_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_requires_both_vars() {
        std::env::remove_var("SENTRYPOST_TELEGRAM_BOT_TOKEN");
        std::env::remove_var("SENTRYPOST_TELEGRAM_CHAT_ID");
        assert!(TelegramConfig::from_env().is_err());
    }
}
