//! Errors raised by the SMTP client while talking to a relay.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred on the underlying stream.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The relay sent something that is not an SMTP reply.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The relay closed the connection mid-conversation.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// The reply was not valid UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
