use std::{
    fmt,
    path::{Path, PathBuf},
};

use courier_common::{
    MailSettings, Message, SettingsProvider, config::ClientTimeouts, internal, tracing,
};
use courier_tracing::traced;
use courier_transport::{Mailer, Outcome, TransportRegistry, TransportResolver};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

/// Locations tried, in order, when neither `--config` nor [`CONFIG_ENV`] is
/// given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["./courier.config.ron", "/etc/courier/courier.config.ron"];

/// The contents of `courier.config.ron`.
///
/// ```ron
/// Courier (
///     mail: {
///         "transport": "smtp",
///         "transport_smtp_server": "relay.example.com:587",
///         "transport_smtp_encrypt": "tls",
///     },
///     smtp: (
///         connect_secs: 10,
///     ),
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    /// The default `MAIL` section.
    #[serde(default)]
    mail: MailSettings,
    #[serde(alias = "timeouts", default)]
    smtp: ClientTimeouts,
}

impl SettingsProvider for Courier {
    fn mail_settings(&self) -> MailSettings {
        self.mail.clone()
    }
}

impl Courier {
    /// Parse a configuration file.
    ///
    /// # Errors
    ///
    /// The file cannot be read or is not valid RON.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        Self::from_ron(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
    }

    /// # Errors
    ///
    /// `content` is not a valid configuration.
    pub fn from_ron(content: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(content)
    }

    /// A resolver over this configuration's `mail` section.
    #[must_use]
    pub fn resolver(&self, registry: TransportRegistry) -> TransportResolver {
        TransportResolver::new(self)
            .with_registry(registry)
            .with_client_timeouts(self.smtp.clone())
    }

    /// Resolve the configured transport and describe it.
    ///
    /// # Errors
    ///
    /// The `mail` section does not describe a usable transport.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all))]
    pub fn check(&self) -> anyhow::Result<Summary> {
        let mailer = Mailer::new(&self.resolver(TransportRegistry::default()))?;
        Ok(Summary::of(&mailer))
    }

    /// Send one message, flushing the spool straight away if the transport is
    /// spooled; nothing outlives this call to flush it later.
    ///
    /// # Errors
    ///
    /// The configuration is invalid, or the message could not be sent.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all), timing(precision = "ms"))]
    pub async fn send(&self, message: Message) -> anyhow::Result<Outcome> {
        let mailer = Mailer::new(&self.resolver(TransportRegistry::default()))?;
        let outcome = mailer.send(message).await?;

        if let Outcome::Queued(ref id) = outcome {
            internal!(%id, "Flushing spooled message");
            let report = mailer.flush_queue().await?;
            if let Some((id, e)) = report.failed.into_iter().next() {
                anyhow::bail!("Spooled message {id} was not sent: {e}");
            }
        }

        Ok(outcome)
    }
}

/// What `courier check` reports about a resolved transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub kind: String,
    pub port: Option<u16>,
    pub spooled: bool,
}

impl Summary {
    fn of(mailer: &Mailer) -> Self {
        Self {
            kind: mailer.real_transport().kind().to_string(),
            port: mailer.real_transport().port(),
            spooled: mailer.transport().is_spool(),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport: {}", self.kind)?;
        if let Some(port) = self.port {
            write!(f, " (port {port})")?;
        }
        if self.spooled {
            write!(f, ", spooled in memory")?;
        }
        Ok(())
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit`, from `--config`
/// 2. the [`CONFIG_ENV`] environment variable
/// 3. [`DEFAULT_CONFIG_PATHS`]
///
/// # Errors
///
/// An explicitly named file does not exist, or no default file does.
pub fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let defaults: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
    locate(
        explicit,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        &defaults,
    )
}

fn locate(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    defaults: &[PathBuf],
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Some(path) = from_env {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

#[cfg(test)]
mod tests {
    use courier_common::settings::keys;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_config() {
        let courier = Courier::from_ron(
            r#"Courier (
                mail: {
                    "transport": "smtp",
                    "transport_smtp_server": "localhost:12345",
                    "spool": "memory",
                },
                smtp: (
                    connect_secs: 5,
                ),
            )"#,
        )
        .expect("valid config");

        let settings = courier.mail_settings();
        assert_eq!(settings.get(keys::TRANSPORT), Some("smtp"));
        assert_eq!(settings.len(), 3);
        assert_eq!(courier.smtp.connect_secs, 5);
        assert_eq!(courier.smtp.data_secs, ClientTimeouts::default().data_secs);

        assert_eq!(
            courier.check().expect("valid transport"),
            Summary {
                kind: "smtp".to_string(),
                port: Some(12345),
                spooled: true,
            }
        );
    }

    #[test]
    fn test_check_reports_configuration_error() {
        let courier = Courier::from_ron(r#"(mail: { "transport": "mbox" })"#).expect("valid RON");

        let err = courier.check().expect_err("mbox without a file");
        let config_err = err
            .downcast_ref::<courier_common::ConfigurationError>()
            .expect("configuration error");
        assert_eq!(config_err.code(), 1_291_068_569);
    }

    #[test]
    fn test_summary_display() {
        let summary = Summary {
            kind: "smtp".to_string(),
            port: Some(25),
            spooled: true,
        };
        assert_eq!(
            summary.to_string(),
            "transport: smtp (port 25), spooled in memory"
        );

        let summary = Summary {
            kind: "mbox".to_string(),
            port: None,
            spooled: false,
        };
        assert_eq!(summary.to_string(), "transport: mbox");
    }

    #[tokio::test]
    async fn test_send_flushes_spool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mbox = dir.path().join("outbox");
        let courier = Courier::from_ron(&format!(
            r#"(mail: {{ "transport": "mbox", "transport_mbox_file": "{}", "spool": "memory" }})"#,
            mbox.display()
        ))
        .expect("valid config");

        let message = Message::parse(
            b"From: editor@example.org\r\nTo: reader@example.com\r\n\r\nHello\r\n".to_vec(),
        )
        .expect("valid message");
        let outcome = courier.send(message).await.expect("sent");

        assert!(matches!(outcome, Outcome::Queued(_)));
        let contents = std::fs::read_to_string(&mbox).expect("flushed to mbox");
        assert!(contents.starts_with("From editor@example.org "));
    }

    #[test]
    fn test_config_lookup_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let explicit = dir.path().join("explicit.ron");
        let env = dir.path().join("env.ron");
        let local = dir.path().join("courier.config.ron");
        let missing = dir.path().join("missing.ron");
        for path in [&explicit, &env, &local] {
            std::fs::write(path, "()").expect("write config");
        }
        let defaults = vec![missing.clone(), local.clone()];

        assert_eq!(
            locate(Some(&explicit), Some(env.clone()), &defaults).expect("explicit"),
            explicit
        );
        assert_eq!(
            locate(None, Some(env.clone()), &defaults).expect("environment"),
            env
        );
        assert_eq!(locate(None, None, &defaults).expect("default"), local);

        assert!(locate(Some(&missing), None, &defaults).is_err());
        assert!(locate(None, Some(missing.clone()), &defaults).is_err());

        let err = locate(None, None, std::slice::from_ref(&missing)).expect_err("nothing found");
        assert!(err.to_string().contains("No configuration file found"));
    }
}
