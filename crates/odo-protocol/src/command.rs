//! Payload of `set` commands.
//!
//! Commands carry an open set of option keys. Each adapter reads the keys it
//! understands and ignores the rest.

use odo_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key/value options carried by a `set` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandPayload(Map<String, Value>);

impl CommandPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a string option.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), Value::String(value.into()));
        self
    }

    /// Read a string option.
    ///
    /// Returns `Ok(None)` when the key is absent.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the key is present but not a string.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(Error::Configuration(format!(
                "Option {key} must be a string, got {other}"
            ))),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for CommandPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
