pub mod content_gap;
pub mod handlers;
pub mod inbox;
pub mod notify;
pub mod types;

pub use content_gap::ContentGapChecker;
pub use handlers::Handlers;
pub use inbox::InboxPoller;
pub use notify::Notifier;
pub use types::{OpsError, OpsResult};
