//! Transports the host application makes available under its own
//! identifiers.

use std::{fmt, sync::Arc};

use ahash::AHashMap;
use courier_common::MailSettings;

use crate::transport::Transport;

/// Builds a transport from the effective settings.
pub type TransportFactory =
    Arc<dyn Fn(&MailSettings) -> anyhow::Result<Box<dyn Transport>> + Send + Sync>;

/// Identifier to factory map consulted for any `transport` value that is
/// not one of the built-in kinds.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: AHashMap<String, TransportFactory>,
}

impl TransportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `identifier`, replacing any previous one.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&MailSettings) -> anyhow::Result<Box<dyn Transport>> + Send + Sync + 'static,
    {
        self.factories.insert(identifier.into(), Arc::new(factory));
        self
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&MailSettings) -> anyhow::Result<Box<dyn Transport>> + Send + Sync + 'static,
    {
        self.register(identifier, factory);
        self
    }

    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    /// Run the factory registered under `identifier`.
    ///
    /// Returns `None` when nothing is registered under that name.
    pub fn build(
        &self,
        identifier: &str,
        settings: &MailSettings,
    ) -> Option<anyhow::Result<Box<dyn Transport>>> {
        self.factories
            .get(identifier)
            .map(|factory| factory(settings))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut identifiers: Vec<_> = self.factories.keys().collect();
        identifiers.sort();
        f.debug_struct("TransportRegistry")
            .field("identifiers", &identifiers)
            .finish()
    }
}
