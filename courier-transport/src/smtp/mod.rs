//! The `smtp` transport: deliver to a relay over the network.

pub mod client;
pub mod error;
pub mod response;
pub mod transaction;

use async_trait::async_trait;
use courier_common::{
    ConfigurationError, MailSettings, Message, config::ClientTimeouts, settings::keys, tracing,
};
use courier_tracing::traced;

use self::{client::SmtpClient, transaction::SmtpTransaction};
use crate::{
    error::TransportError,
    transport::{Outcome, Transport},
};

/// Port used when `transport_smtp_server` names no port.
pub const DEFAULT_PORT: u16 = 25;

/// How the connection to the relay is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encryption {
    #[default]
    None,
    /// Plain connection upgraded with STARTTLS (`tls`).
    StartTls,
    /// TLS from the first byte (`ssl`).
    Implicit,
}

impl Encryption {
    fn parse(value: Option<&str>) -> Result<Self, ConfigurationError> {
        match value.map(str::to_ascii_lowercase).as_deref() {
            None => Ok(Self::None),
            Some("tls") => Ok(Self::StartTls),
            Some("ssl") => Ok(Self::Implicit),
            Some(_) => Err(ConfigurationError::InvalidEncryption(
                value.unwrap_or_default().to_string(),
            )),
        }
    }
}

/// AUTH PLAIN credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Split `host[:port]` into its parts.
///
/// The port defaults to [`DEFAULT_PORT`] when absent or empty. IPv6
/// literals must be bracketed (`[::1]:2525`).
///
/// # Errors
///
/// A missing host, or a port that is not a number in `1..=65535`.
pub fn parse_server(server: &str) -> Result<(String, u16), ConfigurationError> {
    let server = server.trim();

    let (host, port) = if let Some(rest) = server.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| ConfigurationError::InvalidPort(server.to_string()))?;
        match rest {
            "" => (host, None),
            rest => (
                host,
                Some(
                    rest.strip_prefix(':')
                        .ok_or_else(|| ConfigurationError::InvalidPort(rest.to_string()))?,
                ),
            ),
        }
    } else {
        match server.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (server, None),
        }
    };

    if host.is_empty() {
        return Err(ConfigurationError::MissingField {
            transport: "smtp",
            field: keys::SMTP_SERVER,
        });
    }

    let port = match port.map(str::trim) {
        None | Some("") => DEFAULT_PORT,
        Some(port) => port
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| ConfigurationError::InvalidPort(port.to_string()))?,
    };

    Ok((host.to_string(), port))
}

#[derive(Debug, Clone)]
pub struct SmtpTransport {
    host: String,
    port: u16,
    encryption: Encryption,
    credentials: Option<Credentials>,
    timeouts: ClientTimeouts,
}

impl SmtpTransport {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            encryption: Encryption::None,
            credentials: None,
            timeouts: ClientTimeouts::default(),
        }
    }

    /// Build from the `transport_smtp_*` settings.
    ///
    /// # Errors
    ///
    /// Missing server, unusable port, or unknown encryption.
    pub fn from_settings(settings: &MailSettings) -> Result<Self, ConfigurationError> {
        let server =
            settings
                .non_empty(keys::SMTP_SERVER)
                .ok_or(ConfigurationError::MissingField {
                    transport: "smtp",
                    field: keys::SMTP_SERVER,
                })?;
        let (host, port) = parse_server(server)?;

        let credentials = settings.non_empty(keys::SMTP_USERNAME).map(|username| Credentials {
            username: username.to_string(),
            password: settings
                .get(keys::SMTP_PASSWORD)
                .unwrap_or_default()
                .to_string(),
        });

        Ok(Self::new(host, port)
            .with_encryption(Encryption::parse(settings.non_empty(keys::SMTP_ENCRYPT))?)
            .with_credentials(credentials))
    }

    #[must_use]
    pub const fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = encryption;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn encryption(&self) -> Encryption {
        self.encryption
    }

    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(host = %self.host, port = self.port)), timing(precision = "ms"))]
    async fn deliver(&self, message: &Message) -> Result<usize, TransportError> {
        let mut client = self.connect().await?;

        SmtpTransaction::new(message, &self.timeouts)
            .with_starttls(self.encryption == Encryption::StartTls)
            .with_credentials(self.credentials.as_ref())
            .execute(&mut client)
            .await
    }

    async fn connect(&self) -> Result<SmtpClient, TransportError> {
        let limit = self.timeouts.connect();
        let connecting = async {
            match self.encryption {
                Encryption::Implicit => SmtpClient::connect_tls(&self.host, self.port).await,
                Encryption::None | Encryption::StartTls => {
                    SmtpClient::connect(&self.host, self.port).await
                }
            }
        };

        tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| TransportError::Timeout {
                command: "connect",
                timeout: limit,
            })?
            .map_err(TransportError::from)
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn kind(&self) -> &str {
        "smtp"
    }

    async fn send(&self, message: &Message) -> Result<Outcome, TransportError> {
        let recipients = self.deliver(message).await?;
        Ok(Outcome::Sent { recipients })
    }

    fn port(&self) -> Option<u16> {
        Some(self.port)
    }
}
