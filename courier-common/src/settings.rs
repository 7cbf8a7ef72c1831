//! The `MAIL` settings bag and the collaborator that supplies its defaults.
//!
//! Settings are stringly typed: they arrive from configuration
//! files and host applications that know nothing about the transports, and
//! are only interpreted when a transport is resolved.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Well-known keys of the `MAIL` section.
pub mod keys {
    pub const TRANSPORT: &str = "transport";
    pub const SMTP_SERVER: &str = "transport_smtp_server";
    pub const SMTP_ENCRYPT: &str = "transport_smtp_encrypt";
    pub const SMTP_USERNAME: &str = "transport_smtp_username";
    pub const SMTP_PASSWORD: &str = "transport_smtp_password";
    pub const SENDMAIL_COMMAND: &str = "transport_sendmail_command";
    pub const MBOX_FILE: &str = "transport_mbox_file";
    pub const SPOOL: &str = "spool";
    pub const DEFAULT_FROM_ADDRESS: &str = "defaultMailFromAddress";
    pub const DEFAULT_FROM_NAME: &str = "defaultMailFromName";
}

/// A loosely typed `key => value` transport configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailSettings {
    values: AHashMap<String, String>,
}

impl MailSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// The raw value stored for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The value stored for `key`, treating whitespace-only values as absent.
    #[must_use]
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|value| !value.is_empty())
    }

    /// The transport kind discriminator.
    #[must_use]
    pub fn transport(&self) -> Option<&str> {
        self.non_empty(keys::TRANSPORT)
    }

    /// The spool selector. Absent and empty both mean "no spool".
    #[must_use]
    pub fn spool(&self) -> Option<&str> {
        self.non_empty(keys::SPOOL)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<K, V> FromIterator<(K, V)> for MailSettings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for MailSettings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// Source of the process-wide default `MAIL` section.
///
/// The resolver reads it exactly once, when it is constructed.
pub trait SettingsProvider {
    fn mail_settings(&self) -> MailSettings;
}

impl SettingsProvider for MailSettings {
    fn mail_settings(&self) -> MailSettings {
        self.clone()
    }
}

impl<P: SettingsProvider + ?Sized> SettingsProvider for &P {
    fn mail_settings(&self) -> MailSettings {
        (**self).mail_settings()
    }
}

impl<P: SettingsProvider + ?Sized> SettingsProvider for std::sync::Arc<P> {
    fn mail_settings(&self) -> MailSettings {
        (**self).mail_settings()
    }
}
