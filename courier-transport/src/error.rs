//! Errors raised while sending through a resolved transport.
//!
//! Resolution itself only ever fails with
//! [`ConfigurationError`](courier_common::ConfigurationError).

use std::{io, process::ExitStatus, time::Duration};

use thiserror::Error;

use crate::smtp::error::ClientError;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Local I/O failed (mbox file, child process pipes).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The SMTP conversation broke down below the reply level.
    #[error("SMTP client error: {0}")]
    Client(#[from] ClientError),

    /// The relay answered a command with an unexpected reply.
    #[error("Server rejected {command}: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },

    /// A step of the conversation did not finish in time.
    #[error("{command} timed out after {timeout:?}")]
    Timeout {
        command: &'static str,
        timeout: Duration,
    },

    /// The relay does not offer something the configuration requires.
    #[error("Server does not support {0}")]
    Unsupported(&'static str),

    /// A sendmail-style command exited unsuccessfully.
    #[error("\"{command}\" exited with {status}")]
    ProcessFailed { command: String, status: ExitStatus },

    /// The message has no envelope sender and the transport needs one.
    #[error("Message has no envelope sender")]
    MissingSender,

    /// The message has no recipients.
    #[error("Message has no recipients")]
    NoRecipients,

    /// The spool could not accept or release a message.
    #[error("Spool error: {0}")]
    Spool(#[from] SpoolError),
}

impl TransportError {
    /// Returns `true` if sending the same message again cannot succeed
    /// without changing it or the configuration.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self {
            Self::Rejected { code, .. } => *code >= 500,
            Self::Unsupported(_) | Self::MissingSender | Self::NoRecipients => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SpoolError {
    /// The memory spool is full.
    #[error("Memory spool capacity exceeded: {0} messages")]
    CapacityExceeded(usize),

    /// Internal error (lock poisoning).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<T> From<std::sync::PoisonError<T>> for SpoolError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanence() {
        let err = TransportError::Rejected {
            command: "RCPT TO",
            code: 550,
            message: "User unknown".to_string(),
        };
        assert!(err.is_permanent());
        assert_eq!(err.to_string(), "Server rejected RCPT TO: 550 User unknown");

        let err = TransportError::Rejected {
            command: "MAIL FROM",
            code: 451,
            message: "Try again later".to_string(),
        };
        assert!(!err.is_permanent());

        let err = TransportError::Timeout {
            command: "DATA",
            timeout: Duration::from_secs(120),
        };
        assert!(!err.is_permanent());
        assert!(TransportError::NoRecipients.is_permanent());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: TransportError = io_err.into();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
