use std::sync::Arc;

use mailparse::{MailAddr, MailHeaderMap, addrparse_header, parse_headers};

use crate::error::MessageError;

/// A message ready to be handed to a transport: an RFC 5322 payload plus the
/// envelope it should travel under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: Option<String>,
    recipients: Vec<String>,
    data: Arc<[u8]>,
}

impl Message {
    #[must_use]
    pub fn new(
        sender: Option<String>,
        recipients: Vec<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            sender,
            recipients,
            data: data.into(),
        }
    }

    /// Build a message from raw RFC 5322 bytes, taking the envelope from the
    /// headers: the sender is the first `Sender` or `From` address, the
    /// recipients are every address in `To`, `Cc` and `Bcc`.
    ///
    /// # Errors
    ///
    /// Fails if the header block cannot be parsed or no recipient is named.
    pub fn parse(data: impl Into<Arc<[u8]>>) -> Result<Self, MessageError> {
        let data = data.into();
        let (headers, _) = parse_headers(&data)?;

        let sender = ["Sender", "From"].iter().find_map(|name| {
            headers
                .get_first_header(name)
                .and_then(|header| addrparse_header(header).ok())
                .and_then(|list| addresses(&list).into_iter().next())
        });

        let mut recipients = Vec::new();
        for name in ["To", "Cc", "Bcc"] {
            for header in headers.get_all_headers(name) {
                recipients.extend(addresses(&addrparse_header(header)?));
            }
        }

        if recipients.is_empty() {
            return Err(MessageError::NoRecipients);
        }

        Ok(Self {
            sender,
            recipients,
            data,
        })
    }

    /// Envelope sender, if one is known.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Fill in `address` as the envelope sender if the message has none.
    ///
    /// When the payload also lacks a `From` header one is prepended, using
    /// `name` as the display name when given.
    pub fn apply_default_sender(&mut self, address: &str, name: Option<&str>) {
        if self.sender.is_some() {
            return;
        }

        self.sender = Some(address.to_string());

        let has_from = parse_headers(&self.data)
            .map(|(headers, _)| headers.get_first_header("From").is_some())
            .unwrap_or(false);

        if !has_from {
            let from = name.map_or_else(
                || format!("From: <{address}>\r\n"),
                |name| format!("From: \"{name}\" <{address}>\r\n"),
            );
            let mut data = Vec::with_capacity(from.len() + self.data.len());
            data.extend_from_slice(from.as_bytes());
            data.extend_from_slice(&self.data);
            self.data = data.into();
        }
    }
}

fn addresses(list: &[MailAddr]) -> Vec<String> {
    list.iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(single) => vec![single.addr.clone()],
            MailAddr::Group(group) => group.addrs.iter().map(|s| s.addr.clone()).collect(),
        })
        .collect()
}
