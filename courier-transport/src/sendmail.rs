//! The `sendmail` and `mail` transports: hand messages to a local MTA binary.

use std::process::Stdio;

use async_trait::async_trait;
use courier_common::{
    ConfigurationError, MailSettings, Message, config::ClientTimeouts, internal, settings::keys,
    tracing,
};
use courier_tracing::traced;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::{
    error::TransportError,
    smtp::{client::SmtpClient, error::ClientError, transaction::SmtpTransaction},
    transport::{Outcome, Transport},
};

/// Command used by the `mail` transport.
pub const SYSTEM_SENDMAIL: &str = "/usr/sbin/sendmail -t -i";

/// How the message is handed to the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendmailMode {
    /// `-t`: the payload is written to stdin and the binary reads the
    /// recipients from the headers.
    Pipe,
    /// `-bs`: an SMTP conversation over stdin/stdout.
    Smtp,
}

#[derive(Debug, Clone)]
pub struct SendmailTransport {
    command: String,
    mode: SendmailMode,
    timeouts: ClientTimeouts,
}

impl SendmailTransport {
    /// Wrap a sendmail command line.
    ///
    /// A command with neither `-bs` nor `-t` gets `-t` appended, since the
    /// envelope is otherwise lost.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into().trim().to_string();
        let has_flag = |flag: &str| command.split_whitespace().any(|arg| arg == flag);

        if has_flag("-bs") {
            Self::with_mode(command, SendmailMode::Smtp)
        } else if has_flag("-t") {
            Self::with_mode(command, SendmailMode::Pipe)
        } else {
            Self::with_mode(format!("{command} -t"), SendmailMode::Pipe)
        }
    }

    fn with_mode(command: String, mode: SendmailMode) -> Self {
        Self {
            command,
            mode,
            timeouts: ClientTimeouts::default(),
        }
    }

    /// Build from `transport_sendmail_command`.
    ///
    /// # Errors
    ///
    /// The command is missing or empty.
    pub fn from_settings(settings: &MailSettings) -> Result<Self, ConfigurationError> {
        settings
            .non_empty(keys::SENDMAIL_COMMAND)
            .map(Self::new)
            .ok_or(ConfigurationError::MissingField {
                transport: "sendmail",
                field: keys::SENDMAIL_COMMAND,
            })
    }

    /// Timeouts used for the `-bs` conversation.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub const fn mode(&self) -> SendmailMode {
        self.mode
    }

    fn spawn(&self, stdout: Stdio) -> Result<tokio::process::Child, TransportError> {
        internal!(command = %self.command, "Spawning sendmail");

        Ok(Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(stdout)
            .kill_on_drop(true)
            .spawn()?)
    }

    async fn pipe(&self, message: &Message) -> Result<(), TransportError> {
        let mut child = self.spawn(Stdio::null())?;

        let mut stdin = child.stdin.take().ok_or(ClientError::ConnectionClosed)?;
        stdin.write_all(message.data()).await?;
        stdin.shutdown().await?;
        drop(stdin);

        self.check(child.wait().await?)
    }

    async fn converse(&self, message: &Message) -> Result<(), TransportError> {
        let mut child = self.spawn(Stdio::piped())?;

        let stdin = child.stdin.take().ok_or(ClientError::ConnectionClosed)?;
        let stdout = child.stdout.take().ok_or(ClientError::ConnectionClosed)?;
        let mut client = SmtpClient::over_pipe(stdin, stdout);

        SmtpTransaction::new(message, &self.timeouts)
            .execute(&mut client)
            .await?;
        drop(client);

        self.check(child.wait().await?)
    }

    fn check(&self, status: std::process::ExitStatus) -> Result<(), TransportError> {
        if status.success() {
            Ok(())
        } else {
            Err(TransportError::ProcessFailed {
                command: self.command.clone(),
                status,
            })
        }
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(command = %self.command)), timing(precision = "ms"))]
    async fn deliver(&self, message: &Message) -> Result<usize, TransportError> {
        if message.recipients().is_empty() {
            return Err(TransportError::NoRecipients);
        }

        match self.mode {
            SendmailMode::Pipe => self.pipe(message).await?,
            SendmailMode::Smtp => self.converse(message).await?,
        }

        Ok(message.recipients().len())
    }
}

#[async_trait]
impl Transport for SendmailTransport {
    fn kind(&self) -> &str {
        "sendmail"
    }

    async fn send(&self, message: &Message) -> Result<Outcome, TransportError> {
        let recipients = self.deliver(message).await?;
        Ok(Outcome::Sent { recipients })
    }
}

/// The `mail` transport: the system's own sendmail binary, no settings
/// required.
#[derive(Debug, Clone)]
pub struct MailTransport {
    sendmail: SendmailTransport,
}

impl MailTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sendmail: SendmailTransport::new(SYSTEM_SENDMAIL),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        self.sendmail.command()
    }
}

impl Default for MailTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MailTransport {
    fn kind(&self) -> &str {
        "mail"
    }

    async fn send(&self, message: &Message) -> Result<Outcome, TransportError> {
        self.sendmail.send(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new(
            Some("editor@example.org".to_string()),
            vec!["reader@example.com".to_string()],
            b"From: editor@example.org\r\nTo: reader@example.com\r\n\r\nHello\r\n".to_vec(),
        )
    }

    #[test]
    fn test_mode_detection() {
        let transport = SendmailTransport::new("/usr/sbin/sendmail -bs");
        assert_eq!(transport.mode(), SendmailMode::Smtp);
        assert_eq!(transport.command(), "/usr/sbin/sendmail -bs");

        let transport = SendmailTransport::new("/usr/sbin/sendmail -t -i");
        assert_eq!(transport.mode(), SendmailMode::Pipe);
        assert_eq!(transport.command(), "/usr/sbin/sendmail -t -i");

        let transport = SendmailTransport::new(" /usr/sbin/sendmail -i ");
        assert_eq!(transport.mode(), SendmailMode::Pipe);
        assert_eq!(transport.command(), "/usr/sbin/sendmail -i -t");
    }

    #[test]
    fn test_from_settings_requires_command() {
        let err = SendmailTransport::from_settings(&MailSettings::from([(
            keys::TRANSPORT,
            "sendmail",
        )]))
        .expect_err("no command");

        assert_eq!(
            err,
            ConfigurationError::MissingField {
                transport: "sendmail",
                field: keys::SENDMAIL_COMMAND,
            }
        );
    }

    #[test]
    fn test_mail_transport_uses_system_sendmail() {
        let transport = MailTransport::new();
        assert_eq!(transport.kind(), "mail");
        assert_eq!(transport.command(), SYSTEM_SENDMAIL);
        assert!(!transport.is_spool());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_pipe_mode_writes_payload_to_stdin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("captured.eml");
        // `-t` keeps the command in pipe mode; `cat` ignores it via the
        // shell's positional parameters.
        let transport = SendmailTransport::new(format!(
            "sh -c 'cat > \"{}\"' -t",
            out.display()
        ));

        let outcome = transport.send(&message()).await.expect("send succeeds");

        assert_eq!(outcome, Outcome::Sent { recipients: 1 });
        let captured = std::fs::read(&out).expect("payload captured");
        assert_eq!(captured, message().data());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_failing_command_reports_exit_status() {
        let transport = SendmailTransport::new("cat > /dev/null; exit 75 # -t");

        let err = transport.send(&message()).await.expect_err("non-zero exit");
        assert!(matches!(err, TransportError::ProcessFailed { .. }), "{err}");
    }
}
