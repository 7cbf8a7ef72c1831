//! The in-memory spool decorator.
//!
//! A [`SpoolTransport`] accepts messages without sending them. They sit in a
//! [`MemorySpool`] until the owner calls [`SpoolTransport::flush`], which
//! hands each one to the wrapped transport.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use courier_common::{Message, internal, tracing};

use crate::{
    error::{SpoolError, TransportError},
    transport::{Outcome, Transport},
};

/// Identifier handed out for every queued message.
///
/// A ULID, so identifiers sort by queueing time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpooledMessageId {
    id: ulid::Ulid,
}

impl SpooledMessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }
}

impl fmt::Display for SpooledMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// FIFO queue of messages waiting for a flush.
///
/// With a capacity set, queueing past it fails with
/// [`SpoolError::CapacityExceeded`] instead of growing without bound.
#[derive(Debug, Default)]
pub struct MemorySpool {
    messages: Mutex<VecDeque<(SpooledMessageId, Message)>>,
    capacity: Option<usize>,
}

impl MemorySpool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    /// Queue a copy of `message`.
    ///
    /// # Errors
    ///
    /// The spool is full, or its lock is poisoned.
    pub fn queue(&self, message: &Message) -> Result<SpooledMessageId, SpoolError> {
        let mut messages = self.messages.lock()?;

        if let Some(capacity) = self.capacity.filter(|cap| messages.len() >= *cap) {
            return Err(SpoolError::CapacityExceeded(capacity));
        }

        let id = SpooledMessageId::generate();
        messages.push_back((id.clone(), message.clone()));
        Ok(id)
    }

    /// Take everything currently queued, oldest first.
    fn drain(&self) -> Result<Vec<(SpooledMessageId, Message)>, SpoolError> {
        Ok(self.messages.lock()?.drain(..).collect())
    }

    /// Put messages back at the head of the queue, keeping their order.
    fn requeue(&self, failed: Vec<(SpooledMessageId, Message)>) -> Result<(), SpoolError> {
        let mut messages = self.messages.lock()?;
        for entry in failed.into_iter().rev() {
            messages.push_front(entry);
        }
        Ok(())
    }

    /// Recovers gracefully if the lock is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

/// Result of one [`SpoolTransport::flush`].
#[derive(Debug, Default)]
pub struct FlushReport {
    pub sent: usize,
    /// Messages the real transport refused; they are back in the queue.
    pub failed: Vec<(SpooledMessageId, TransportError)>,
}

impl FlushReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Decorator that queues instead of sending.
#[derive(Debug)]
pub struct SpoolTransport {
    spool: MemorySpool,
    real: Arc<dyn Transport>,
}

impl SpoolTransport {
    #[must_use]
    pub fn new(real: Arc<dyn Transport>) -> Self {
        Self::with_spool(real, MemorySpool::new())
    }

    #[must_use]
    pub fn with_spool(real: Arc<dyn Transport>, spool: MemorySpool) -> Self {
        Self { spool, real }
    }

    /// The wrapped transport that [`flush`](Self::flush) sends through.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Transport> {
        &self.real
    }

    #[must_use]
    pub const fn spool(&self) -> &MemorySpool {
        &self.spool
    }

    /// Send every queued message through the real transport.
    ///
    /// Messages the real transport refuses stay queued, ahead of anything
    /// queued while the flush was running.
    ///
    /// # Errors
    ///
    /// Only if the queue itself cannot be accessed; delivery failures are
    /// reported in the [`FlushReport`].
    pub async fn flush(&self) -> Result<FlushReport, SpoolError> {
        let queued = self.spool.drain()?;
        internal!(count = queued.len(), transport = self.real.kind(), "Flushing spool");

        let mut report = FlushReport::default();
        let mut retained = Vec::new();

        for (id, message) in queued {
            match self.real.send(&message).await {
                Ok(_) => report.sent += 1,
                Err(e) => {
                    tracing::warn!(%id, "Spooled message not sent: {e}");
                    retained.push((id.clone(), message));
                    report.failed.push((id, e));
                }
            }
        }

        self.spool.requeue(retained)?;
        Ok(report)
    }
}

#[async_trait]
impl Transport for SpoolTransport {
    fn kind(&self) -> &str {
        self.real.kind()
    }

    async fn send(&self, message: &Message) -> Result<Outcome, TransportError> {
        if message.recipients().is_empty() {
            return Err(TransportError::NoRecipients);
        }

        let id = self.spool.queue(message)?;
        internal!(%id, "Message spooled");
        Ok(Outcome::Queued(id))
    }

    fn port(&self) -> Option<u16> {
        self.real.port()
    }

    fn as_spool(&self) -> Option<&SpoolTransport> {
        Some(self)
    }
}
