//! Eagerly resolved mail sending.

use std::sync::Arc;

use courier_common::{ConfigurationError, MailSettings, Message, internal, settings::keys, tracing};

use crate::{
    error::{SpoolError, TransportError},
    resolver::TransportResolver,
    spool::FlushReport,
    transport::{Outcome, Transport},
};

/// A resolved transport together with the settings it was built from.
///
/// Construction fails with the resolver's [`ConfigurationError`], so a
/// `Mailer` that exists always has a working transport.
#[derive(Debug, Clone)]
pub struct Mailer {
    settings: MailSettings,
    transport: Arc<dyn Transport>,
    real_transport: Arc<dyn Transport>,
}

impl Mailer {
    /// Resolve the transport now.
    ///
    /// # Errors
    ///
    /// The resolver's effective settings are invalid.
    pub fn new(resolver: &TransportResolver) -> Result<Self, ConfigurationError> {
        let transport = resolver.resolve()?;
        let real_transport = transport
            .as_spool()
            .map_or_else(|| Arc::clone(&transport), |spool| Arc::clone(spool.inner()));

        Ok(Self {
            settings: resolver.settings().clone(),
            transport,
            real_transport,
        })
    }

    /// The transport messages are sent through; a spool when spooling is
    /// enabled.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The transport that actually delivers, with any spool peeled off.
    #[must_use]
    pub fn real_transport(&self) -> &Arc<dyn Transport> {
        &self.real_transport
    }

    #[must_use]
    pub const fn settings(&self) -> &MailSettings {
        &self.settings
    }

    /// Send `message`, filling in `defaultMailFromAddress` as the sender if
    /// it has none.
    ///
    /// # Errors
    ///
    /// Whatever the transport reports.
    pub async fn send(&self, mut message: Message) -> Result<Outcome, TransportError> {
        let default_sender = self
            .settings
            .non_empty(keys::DEFAULT_FROM_ADDRESS)
            .filter(|_| message.sender().is_none());

        if let Some(address) = default_sender {
            internal!(address, "Using default sender");
            message.apply_default_sender(address, self.settings.non_empty(keys::DEFAULT_FROM_NAME));
        }

        self.transport.send(&message).await
    }

    /// Deliver everything the spool is holding.
    ///
    /// Without a spool there is never anything queued, and the report is
    /// empty.
    ///
    /// # Errors
    ///
    /// The spool cannot be accessed.
    pub async fn flush_queue(&self) -> Result<FlushReport, SpoolError> {
        match self.transport.as_spool() {
            Some(spool) => {
                let report = spool.flush().await?;
                tracing::info!(
                    sent = report.sent,
                    failed = report.failed.len(),
                    "Flushed mail queue"
                );
                Ok(report)
            }
            None => Ok(FlushReport::default()),
        }
    }
}
