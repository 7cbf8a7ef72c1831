//! Typed configuration that sits alongside the loosely typed `MAIL` bag.
//!
//! - [`timeouts`]: per-command timeouts for the SMTP client transport

pub mod timeouts;

pub use timeouts::ClientTimeouts;
