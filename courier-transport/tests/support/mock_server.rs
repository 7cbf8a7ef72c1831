//! Scriptable SMTP relay for exercising the transports end to end.
#![allow(dead_code)] // Not every test uses every knob

use std::{fmt::Write, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
    time::timeout,
};

/// A command as the relay saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    StartTls,
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// The payload between DATA and the terminating dot, exactly as sent.
    Content(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    text: String,
}

impl Reply {
    fn new(code: u16, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    fn render(&self) -> String {
        format!("{} {}\r\n", self.code, self.text)
    }
}

#[derive(Debug, Clone)]
struct Script {
    greeting: Reply,
    capabilities: Vec<String>,
    auth: Reply,
    mail_from: Reply,
    rcpt_to: Reply,
    data_end: Reply,
    reply_delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "mock.example.test ESMTP"),
            capabilities: vec!["mock.example.test".to_string(), "SIZE 10000".to_string()],
            auth: Reply::new(235, "Authentication successful"),
            mail_from: Reply::new(250, "OK"),
            rcpt_to: Reply::new(250, "OK"),
            data_end: Reply::new(250, "OK: queued"),
            reply_delay: None,
        }
    }
}

impl Script {
    fn ehlo(&self) -> String {
        let mut reply = String::new();
        let last = self.capabilities.len().saturating_sub(1);
        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            let _ = write!(reply, "250{separator}{capability}\r\n");
        }
        reply
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    task: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            script: Script::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port` in the form `transport_smtp_server` expects.
    #[must_use]
    pub fn server(&self) -> String {
        self.addr.to_string()
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    async fn serve(
        stream: TcpStream,
        script: Arc<Script>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(script.greeting.render().as_bytes()).await?;

        loop {
            line.clear();
            match timeout(Duration::from_secs(10), reader.read_line(&mut line)).await {
                Ok(Ok(0)) | Err(_) => return Ok(()),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
            }

            let input = line.trim_end().to_string();
            let (verb, argument) = input.split_once(' ').unwrap_or((input.as_str(), ""));
            tracing::debug!("Mock relay received: {input}");

            let (command, reply) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => (SmtpCommand::Ehlo(argument.to_string()), script.ehlo()),
                "HELO" => (
                    SmtpCommand::Helo(argument.to_string()),
                    Reply::new(250, "Hello").render(),
                ),
                "STARTTLS" => (
                    SmtpCommand::StartTls,
                    Reply::new(502, "Command not implemented").render(),
                ),
                "AUTH" => (SmtpCommand::Auth(argument.to_string()), script.auth.render()),
                "MAIL" => (
                    SmtpCommand::MailFrom(argument.to_string()),
                    script.mail_from.render(),
                ),
                "RCPT" => (
                    SmtpCommand::RcptTo(argument.to_string()),
                    script.rcpt_to.render(),
                ),
                "DATA" => (
                    SmtpCommand::Data,
                    Reply::new(354, "End data with <CR><LF>.<CR><LF>").render(),
                ),
                "QUIT" => (SmtpCommand::Quit, Reply::new(221, "Bye").render()),
                _ => (
                    SmtpCommand::Other(input.clone()),
                    Reply::new(500, "Unknown command").render(),
                ),
            };

            let is_data = command == SmtpCommand::Data;
            let is_quit = command == SmtpCommand::Quit;
            commands.write().await.push(command);

            if let Some(delay) = script.reply_delay {
                tokio::time::sleep(delay).await;
            }
            writer.write_all(reply.as_bytes()).await?;

            if is_quit {
                return Ok(());
            }

            if is_data {
                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line == ".\r\n" {
                        break;
                    }
                    content.push_str(&line);
                }
                commands.write().await.push(SmtpCommand::Content(content));
                writer.write_all(script.data_end.render().as_bytes()).await?;
            }
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct MockSmtpServerBuilder {
    script: Script,
}

impl MockSmtpServerBuilder {
    /// Replace the EHLO reply lines; the first is the greeting domain.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.script.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, text: impl Into<String>) -> Self {
        self.script.auth = Reply::new(code, text);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, text: impl Into<String>) -> Self {
        self.script.mail_from = Reply::new(code, text);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, text: impl Into<String>) -> Self {
        self.script.rcpt_to = Reply::new(code, text);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, text: impl Into<String>) -> Self {
        self.script.data_end = Reply::new(code, text);
        self
    }

    #[must_use]
    pub const fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.script.reply_delay = Some(delay);
        self
    }

    /// Bind to an ephemeral port on the loopback interface and start
    /// accepting connections.
    ///
    /// # Errors
    ///
    /// The listener could not be bound.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let script = Arc::new(self.script);
        let commands = Arc::new(RwLock::new(Vec::new()));

        let task = {
            let commands = Arc::clone(&commands);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let script = Arc::clone(&script);
                    let commands = Arc::clone(&commands);
                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::serve(stream, script, commands).await {
                            tracing::debug!("Mock relay connection error: {e}");
                        }
                    });
                }
            })
        };

        Ok(MockSmtpServer {
            addr,
            commands,
            task,
        })
    }
}
