//! The `mbox` transport: append messages to a local mailbox file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::{
    ConfigurationError, MailSettings, Message, internal, settings::keys, tracing,
};
use courier_tracing::traced;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::{
    error::TransportError,
    transport::{Outcome, Transport},
};

/// Envelope sender written when the message has none.
const UNKNOWN_SENDER: &str = "MAILER-DAEMON";

#[derive(Debug, Clone)]
pub struct MboxTransport {
    path: PathBuf,
}

impl MboxTransport {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Build from `transport_mbox_file`.
    ///
    /// # Errors
    ///
    /// The path is missing or empty.
    pub fn from_settings(settings: &MailSettings) -> Result<Self, ConfigurationError> {
        settings
            .non_empty(keys::MBOX_FILE)
            .map(Self::new)
            .ok_or(ConfigurationError::MissingField {
                transport: "mbox",
                field: keys::MBOX_FILE,
            })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(path = %self.path.display())), timing(precision = "us"))]
    async fn append(&self, message: &Message) -> Result<usize, TransportError> {
        let entry = entry(message, Utc::now());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&entry).await?;
        file.flush().await?;

        internal!(bytes = entry.len(), "Appended message to mbox");
        Ok(message.recipients().len())
    }
}

/// Render one mailbox entry (mboxrd).
///
/// The separator line is followed by the payload with LF line endings, every
/// line matching `>*From ` gains one more `>`, and a blank line closes the
/// entry.
fn entry(message: &Message, received: DateTime<Utc>) -> Vec<u8> {
    let sender = message.sender().unwrap_or(UNKNOWN_SENDER);
    let mut out = format!("From {sender} {}\n", received.format("%a %b %e %H:%M:%S %Y")).into_bytes();

    let data = message.data();
    let body = data.strip_suffix(b"\n").unwrap_or(data);

    for line in body.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let unquoted = line.iter().position(|b| *b != b'>').map_or(&[][..], |at| &line[at..]);
        if unquoted.starts_with(b"From ") {
            out.push(b'>');
        }
        out.extend_from_slice(line);
        out.push(b'\n');
    }

    out.push(b'\n');
    out
}

#[async_trait]
impl Transport for MboxTransport {
    fn kind(&self) -> &str {
        "mbox"
    }

    async fn send(&self, message: &Message) -> Result<Outcome, TransportError> {
        if message.recipients().is_empty() {
            return Err(TransportError::NoRecipients);
        }

        let recipients = self.append(message).await?;
        Ok(Outcome::Sent { recipients })
    }
}
