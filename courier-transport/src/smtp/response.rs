//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All reply lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Whether an EHLO reply advertises `keyword` (e.g. `STARTTLS`, `AUTH`).
    ///
    /// The first line is the relay's greeting and is skipped.
    #[must_use]
    pub fn advertises(&self, keyword: &str) -> bool {
        self.lines.iter().skip(1).any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }

    /// Parse one reply line into `(code, is_last, text)`.
    fn parse_line(line: &str) -> Result<(u16, bool, &str)> {
        let code = line
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| ClientError::ParseError(format!("Invalid status line: '{line}'")))?;

        match line.as_bytes().get(3) {
            None => Ok((code, true, "")),
            Some(b' ') => Ok((code, true, &line[4..])),
            Some(b'-') => Ok((code, false, &line[4..])),
            Some(c) => Err(ClientError::ParseError(format!(
                "Invalid separator character: '{}'",
                char::from(*c)
            ))),
        }
    }

    /// Parse a complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` when
    /// the buffer does not yet hold a complete reply.
    ///
    /// # Errors
    ///
    /// Fails on malformed lines or mismatched codes in a multi-line reply.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = std::str::from_utf8(&buffer[consumed..consumed + end])?;
            consumed += end + 1;

            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let (line_code, is_last, text) = Self::parse_line(raw)?;
            match code {
                Some(expected) if expected != line_code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {line_code}"
                    )));
                }
                Some(_) => {}
                None => code = Some(line_code),
            }

            lines.push(text.to_string());

            if is_last {
                return Ok(Some((Self::new(line_code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
