//! One SMTP mail transaction, from greeting to QUIT.
//!
//! Shared by the network SMTP transport and by `sendmail -bs`, which speaks
//! the same protocol over a child process's pipes.

use std::{future::Future, time::Duration};

use base64::Engine;
use courier_common::{Message, config::ClientTimeouts, internal, tracing};

use super::{
    Credentials,
    client::SmtpClient,
    error::ClientError,
    response::Response,
};
use crate::error::TransportError;

/// Run `future`, turning an elapsed `limit` into [`TransportError::Timeout`].
async fn within<T>(
    command: &'static str,
    limit: Duration,
    future: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TransportError::Timeout {
            command,
            timeout: limit,
        })?
        .map_err(TransportError::from)
}

/// Fail unless `response` carries one of `codes`.
fn expect(command: &'static str, response: Response, codes: &[u16]) -> Result<Response, TransportError> {
    if codes.contains(&response.code) {
        Ok(response)
    } else {
        Err(TransportError::Rejected {
            command,
            code: response.code,
            message: response.message(),
        })
    }
}

pub struct SmtpTransaction<'a> {
    message: &'a Message,
    timeouts: &'a ClientTimeouts,
    starttls: bool,
    credentials: Option<&'a Credentials>,
}

impl<'a> SmtpTransaction<'a> {
    pub const fn new(message: &'a Message, timeouts: &'a ClientTimeouts) -> Self {
        Self {
            message,
            timeouts,
            starttls: false,
            credentials: None,
        }
    }

    /// Require a STARTTLS upgrade after the first EHLO.
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    pub const fn with_credentials(mut self, credentials: Option<&'a Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// The name announced in EHLO: the sender's domain, or `localhost`.
    fn helo_name(&self) -> &str {
        self.message
            .sender()
            .and_then(|sender| sender.rsplit_once('@'))
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
            .unwrap_or("localhost")
    }

    /// Run the whole transaction on an already connected `client`.
    ///
    /// # Errors
    ///
    /// Any unexpected reply, timeout or connection failure.
    pub async fn execute(self, client: &mut SmtpClient) -> Result<usize, TransportError> {
        let sender = self.message.sender().ok_or(TransportError::MissingSender)?;
        if self.message.recipients().is_empty() {
            return Err(TransportError::NoRecipients);
        }

        let command = self.timeouts.command();
        let greeting = within("greeting", command, client.read_greeting()).await?;
        expect("greeting", greeting, &[220])?;

        let mut ehlo = self.hello(client).await?;

        if self.starttls {
            if !ehlo.advertises("STARTTLS") || !client.can_upgrade() {
                return Err(TransportError::Unsupported("STARTTLS"));
            }
            let response = within("STARTTLS", command, client.starttls()).await?;
            expect("STARTTLS", response, &[220])?;
            internal!("Connection upgraded to TLS");
            ehlo = self.hello(client).await?;
        }

        if let Some(credentials) = self.credentials {
            if !ehlo.advertises("AUTH") {
                return Err(TransportError::Unsupported("AUTH"));
            }
            self.authenticate(client, credentials).await?;
        }

        let envelope = self.timeouts.envelope();
        let response = within("MAIL FROM", envelope, client.mail_from(sender)).await?;
        expect("MAIL FROM", response, &[250])?;

        for recipient in self.message.recipients() {
            let response = within("RCPT TO", envelope, client.rcpt_to(recipient)).await?;
            expect("RCPT TO", response, &[250, 251])?;
        }

        let data = self.timeouts.data();
        let response = within("DATA", data, client.data()).await?;
        expect("DATA", response, &[354])?;

        let response = within("DATA", data, client.send_data(self.message.data())).await?;
        expect("DATA", response, &[250])?;

        // The message is accepted at this point; a failed QUIT changes nothing.
        if let Err(e) = within("QUIT", self.timeouts.quit(), client.quit()).await {
            tracing::warn!("QUIT failed after successful delivery: {e}");
        }

        Ok(self.message.recipients().len())
    }

    /// EHLO, falling back to HELO for relays that predate ESMTP.
    async fn hello(&self, client: &mut SmtpClient) -> Result<Response, TransportError> {
        let command = self.timeouts.command();
        let response = within("EHLO", command, client.ehlo(self.helo_name())).await?;
        if response.is_success() {
            return Ok(response);
        }

        let response = within("HELO", command, client.helo(self.helo_name())).await?;
        expect("HELO", response, &[250])
    }

    /// AUTH PLAIN (RFC 4616).
    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        credentials: &Credentials,
    ) -> Result<(), TransportError> {
        let payload = format!("\0{}\0{}", credentials.username, credentials.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());

        let response = within(
            "AUTH",
            self.timeouts.auth(),
            client.sensitive_command(&format!("AUTH PLAIN {encoded}"), "AUTH PLAIN <redacted>"),
        )
        .await?;
        expect("AUTH", response, &[235])?;
        Ok(())
    }
}
