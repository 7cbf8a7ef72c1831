//! Error types shared by the courier crates.

use thiserror::Error;

/// The mail transport configuration is invalid or incomplete.
///
/// Every variant carries the same diagnostic code ([`ConfigurationError::CODE`]),
/// so callers can tell "bad configuration" apart from any other failure
/// without matching on the reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No `transport` key, or an empty one.
    #[error("No mail transport configured")]
    MissingTransport,

    /// The discriminator is neither a built-in kind nor a registered transport.
    #[error("\"{0}\" is not a known mail transport and no transport is registered under that name")]
    UnknownTransport(String),

    /// A field required by the selected kind is absent or empty.
    #[error("Missing required field: {field} needs to be set when transport is set to \"{transport}\"")]
    MissingField {
        transport: &'static str,
        field: &'static str,
    },

    /// The port segment of `transport_smtp_server` is not a usable port.
    #[error("Invalid SMTP port \"{0}\": must be a number between 1-65535")]
    InvalidPort(String),

    /// `transport_smtp_encrypt` is set to something other than `tls` or `ssl`.
    #[error("Invalid SMTP encryption \"{0}\": expected \"tls\" or \"ssl\"")]
    InvalidEncryption(String),

    /// `spool` is set to something other than `memory`.
    #[error("Unknown spool \"{0}\"")]
    UnknownSpool(String),

    /// A registered transport factory refused to build a transport.
    #[error("Transport \"{identifier}\" could not be instantiated: {reason}")]
    Instantiation { identifier: String, reason: String },
}

impl ConfigurationError {
    /// Diagnostic code for an invalid mail transport configuration.
    pub const CODE: u32 = 1_291_068_569;

    #[must_use]
    pub const fn code(&self) -> u32 {
        Self::CODE
    }
}

/// Errors raised while turning raw bytes into a [`crate::Message`].
#[derive(Debug, Error)]
pub enum MessageError {
    /// The headers could not be parsed.
    #[error("Unable to parse message: {0}")]
    Parse(#[from] mailparse::MailParseError),

    /// Neither the caller nor the `To`/`Cc`/`Bcc` headers name a recipient.
    #[error("Message has no recipients")]
    NoRecipients,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_configuration_error_shares_the_code() {
        let errors = [
            ConfigurationError::MissingTransport,
            ConfigurationError::UnknownTransport("Acme\\Controller\\ErrorPage".to_string()),
            ConfigurationError::MissingField {
                transport: "smtp",
                field: "transport_smtp_server",
            },
            ConfigurationError::InvalidPort("abc".to_string()),
            ConfigurationError::InvalidEncryption("starttls".to_string()),
            ConfigurationError::UnknownSpool("file".to_string()),
            ConfigurationError::Instantiation {
                identifier: "fake".to_string(),
                reason: "refused".to_string(),
            },
        ];

        for err in errors {
            assert_eq!(err.code(), 1_291_068_569, "{err}");
        }
    }

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::MissingField {
            transport: "mbox",
            field: "transport_mbox_file",
        };
        assert_eq!(
            err.to_string(),
            "Missing required field: transport_mbox_file needs to be set when transport is set to \"mbox\""
        );

        let err = ConfigurationError::InvalidPort("abc".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid SMTP port \"abc\": must be a number between 1-65535"
        );
    }
}
