//! Mail transport resolution and the transports it can produce.
//!
//! ```ignore
//! let resolver = TransportResolver::new(&config);
//! let mailer = Mailer::new(&resolver)?;
//! mailer.send(Message::parse(bytes)?).await?;
//! ```

pub mod error;
pub mod mailer;
pub mod mbox;
pub mod registry;
pub mod resolver;
pub mod sendmail;
pub mod smtp;
pub mod spool;
pub mod transport;

pub use error::{SpoolError, TransportError};
pub use mailer::Mailer;
pub use registry::{TransportFactory, TransportRegistry};
pub use resolver::TransportResolver;
pub use spool::{FlushReport, SpoolTransport, SpooledMessageId};
pub use transport::{Outcome, Transport};
