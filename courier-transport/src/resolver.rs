//! Turn a `MAIL` settings bag into a ready transport.
//!
//! Two bags compete: settings injected by the caller, and the process-wide
//! defaults read from a [`SettingsProvider`]. A non-empty injected bag
//! replaces the defaults entirely; the two are never merged key by key.

use std::sync::Arc;

use courier_common::{
    ConfigurationError, MailSettings, SettingsProvider, config::ClientTimeouts, internal, tracing,
};
use courier_tracing::traced;

use crate::{
    mbox::MboxTransport,
    registry::TransportRegistry,
    sendmail::{MailTransport, SendmailTransport},
    smtp::SmtpTransport,
    spool::SpoolTransport,
    transport::Transport,
};

/// The only accepted non-empty `spool` value.
pub const MEMORY_SPOOL: &str = "memory";

#[derive(Debug, Clone)]
pub struct TransportResolver {
    defaults: MailSettings,
    injected: Option<MailSettings>,
    registry: TransportRegistry,
    client_timeouts: ClientTimeouts,
}

impl TransportResolver {
    /// Snapshot the provider's defaults. The provider is not consulted again.
    #[must_use]
    pub fn new(provider: &impl SettingsProvider) -> Self {
        Self {
            defaults: provider.mail_settings(),
            injected: None,
            registry: TransportRegistry::default(),
            client_timeouts: ClientTimeouts::default(),
        }
    }

    /// Transports available under identifiers other than the built-in kinds.
    #[must_use]
    pub fn with_registry(mut self, registry: TransportRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Timeouts for SMTP conversations, over the network or with
    /// `sendmail -bs`.
    #[must_use]
    pub fn with_client_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.client_timeouts = timeouts;
        self
    }

    /// Use `settings` instead of the defaults.
    ///
    /// An empty bag clears any earlier injection, so the defaults apply
    /// again.
    pub fn inject_settings(&mut self, settings: MailSettings) -> &mut Self {
        self.injected = Some(settings).filter(|settings| !settings.is_empty());
        self
    }

    /// Builder form of [`inject_settings`](Self::inject_settings).
    #[must_use]
    pub fn with_settings(mut self, settings: MailSettings) -> Self {
        self.inject_settings(settings);
        self
    }

    /// The effective settings: the injected bag if there is one, otherwise
    /// the defaults, unchanged.
    #[must_use]
    pub fn settings(&self) -> &MailSettings {
        self.injected.as_ref().unwrap_or(&self.defaults)
    }

    /// Resolve the transport, wrapped in a spool when `spool` is `memory`.
    ///
    /// # Errors
    ///
    /// The effective settings do not describe a usable transport.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all))]
    pub fn resolve(&self) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let spool = self.spool()?;
        let real = self.resolve_real()?;

        if spool {
            internal!(transport = real.kind(), "Wrapping transport in memory spool");
            Ok(Arc::new(SpoolTransport::new(real)))
        } else {
            Ok(real)
        }
    }

    /// Resolve the transport itself, never spool-wrapped.
    ///
    /// # Errors
    ///
    /// The effective settings do not describe a usable transport.
    pub fn resolve_real(&self) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let settings = self.settings();
        let kind = settings
            .transport()
            .ok_or(ConfigurationError::MissingTransport)?;

        let transport: Arc<dyn Transport> = match kind {
            "smtp" => Arc::new(
                SmtpTransport::from_settings(settings)?.with_timeouts(self.client_timeouts.clone()),
            ),
            "sendmail" => Arc::new(
                SendmailTransport::from_settings(settings)?
                    .with_timeouts(self.client_timeouts.clone()),
            ),
            "mbox" => Arc::new(MboxTransport::from_settings(settings)?),
            "mail" => Arc::new(MailTransport::new()),
            identifier => self.custom(identifier, settings)?,
        };

        internal!(kind, port = ?transport.port(), "Resolved mail transport");
        Ok(transport)
    }

    fn custom(
        &self,
        identifier: &str,
        settings: &MailSettings,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        self.registry
            .build(identifier, settings)
            .ok_or_else(|| ConfigurationError::UnknownTransport(identifier.to_string()))?
            .map(Arc::from)
            .map_err(|e| ConfigurationError::Instantiation {
                identifier: identifier.to_string(),
                reason: format!("{e:#}"),
            })
    }

    /// Whether the effective settings ask for a spool.
    fn spool(&self) -> Result<bool, ConfigurationError> {
        match self.settings().spool() {
            None => Ok(false),
            Some(MEMORY_SPOOL) => Ok(true),
            Some(other) => Err(ConfigurationError::UnknownSpool(other.to_string())),
        }
    }
}
