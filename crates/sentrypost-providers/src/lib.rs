pub mod config;
pub mod mock;
pub mod telegram;
pub mod traits;

pub use config::TelegramConfig;
pub use telegram::TelegramSink;
pub use traits::{ModelRouter, ModelTier, NotificationSink, PlatformExecutor, SocialPlatform, SocialPost};
