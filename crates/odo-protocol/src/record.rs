//! Grammar of the credential log records produced by a capture source.
//!
//! One record per line, `timestamp hex:bits`, for example
//! `1042 2ec0c86:26`. Anything after the bit length is ignored. Lines that do
//! not start with a record are reported as parse errors so the caller can log
//! and skip them.

use odo_core::{Credential, Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static RECORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s(\w+):(\d+)").expect("invalid record pattern"));

/// Parser for `timestamp hex:bits` log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecordParser;

impl LogRecordParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one line into a credential.
    ///
    /// # Errors
    /// - `Error::Parse` if the line is not a record
    /// - `Error::InvalidCredential` if the record does not describe a valid credential
    ///
    /// # Examples
    ///
    /// ```
    /// use odo_protocol::LogRecordParser;
    ///
    /// let credential = LogRecordParser::new().parse_line("1042 2ec0c86:26").unwrap();
    /// assert_eq!(credential.timestamp(), 1042);
    /// assert_eq!(credential.bits(), 26);
    /// assert_eq!(credential.hex(), "2ec0c86");
    /// ```
    pub fn parse_line(&self, line: &str) -> Result<Credential> {
        let captures = RECORD
            .captures(line)
            .ok_or_else(|| Error::Parse(format!("Not a credential record: {line:?}")))?;

        let timestamp = captures[1]
            .parse::<u64>()
            .map_err(|e| Error::Parse(format!("Bad timestamp in {line:?}: {e}")))?;
        let bits = captures[3]
            .parse::<u32>()
            .map_err(|e| Error::Parse(format!("Bad bit length in {line:?}: {e}")))?;

        Credential::new(bits, &captures[2], timestamp)
    }

    /// Parse every non-empty line of a log, in order.
    pub fn parse_log<'a>(&'a self, log: &'a str) -> impl Iterator<Item = Result<Credential>> + 'a {
        log.lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(|line| self.parse_line(line))
    }
}
