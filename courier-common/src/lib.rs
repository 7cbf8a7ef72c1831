pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod settings;

pub use error::{ConfigurationError, MessageError};
pub use message::Message;
pub use settings::{MailSettings, SettingsProvider};
pub use tracing;
