use std::fmt::Debug;

use async_trait::async_trait;
use courier_common::Message;

use crate::{error::TransportError, spool::SpoolTransport, spool::SpooledMessageId};

/// What happened to a message handed to [`Transport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The message left this process for the given number of recipients.
    Sent { recipients: usize },
    /// The message was queued by a spool and will be sent on flush.
    Queued(SpooledMessageId),
}

/// Something that can deliver a [`Message`]: an SMTP relay, a sendmail
/// binary, an mbox file, a spool, or a transport registered by the host.
///
/// Constructing a transport never performs I/O; connections are opened,
/// processes spawned and files touched only inside [`Transport::send`].
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// The kind discriminator this transport was resolved from.
    fn kind(&self) -> &str;

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Whatever the underlying mechanism reports.
    async fn send(&self, message: &Message) -> Result<Outcome, TransportError>;

    /// The port an SMTP transport will connect to.
    fn port(&self) -> Option<u16> {
        None
    }

    /// `Some` if this transport is a spool decorator.
    fn as_spool(&self) -> Option<&SpoolTransport> {
        None
    }

    fn is_spool(&self) -> bool {
        self.as_spool().is_some()
    }
}
