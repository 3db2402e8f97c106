//! Versioned JSON envelope carried by every bus message.
//!
//! # Wire Format
//!
//! ```text
//! {"version": 1, "type": "state" | "wiegand" | "set", "payload": {...}}
//! ```
//!
//! # Examples
//!
//! ```
//! use odo_core::Credential;
//! use odo_protocol::{CredentialEnvelope, Envelope, MessageType};
//!
//! let credential = Credential::new(26, "1A2B3C", 5).unwrap();
//! let bytes = Envelope::wiegand(credential.clone()).encode().unwrap();
//!
//! let decoded = CredentialEnvelope::decode(&bytes).unwrap();
//! assert_eq!(decoded.kind, MessageType::Wiegand);
//! assert_eq!(decoded.payload, credential);
//! ```

use crate::{command::CommandPayload, state::DeviceState};
use odo_core::{Credential, Error, Result, WriteStatus, constants::ENVELOPE_VERSION};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// Type tag of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Device state report.
    State,
    /// Credential payload (seen, selected, or written).
    Wiegand,
    /// Command setting adapter options.
    Set,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageType::State => write!(f, "state"),
            MessageType::Wiegand => write!(f, "wiegand"),
            MessageType::Set => write!(f, "set"),
        }
    }
}

/// Bus message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub version: u8,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub payload: P,
}

/// Credential plus the progress of its write.
///
/// Serialized flat: `{bits, hex, timestamp, status}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    #[serde(flatten)]
    pub credential: Credential,
    pub status: WriteStatus,
}

impl WriteReport {
    pub fn new(credential: Credential, status: WriteStatus) -> Self {
        Self { credential, status }
    }
}

pub type StateEnvelope<D> = Envelope<DeviceState<D>>;
pub type CredentialEnvelope = Envelope<Credential>;
pub type WrittenEnvelope = Envelope<WriteReport>;
pub type CommandEnvelope = Envelope<CommandPayload>;

impl<P> Envelope<P> {
    /// Wrap a payload with the current protocol version.
    pub fn new(kind: MessageType, payload: P) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            kind,
            payload,
        }
    }
}

impl<D> Envelope<DeviceState<D>> {
    pub fn state(state: DeviceState<D>) -> Self {
        Self::new(MessageType::State, state)
    }
}

impl Envelope<Credential> {
    pub fn wiegand(credential: Credential) -> Self {
        Self::new(MessageType::Wiegand, credential)
    }
}

impl Envelope<WriteReport> {
    pub fn written(credential: Credential, status: WriteStatus) -> Self {
        Self::new(MessageType::Wiegand, WriteReport::new(credential, status))
    }
}

impl Envelope<CommandPayload> {
    pub fn set(payload: CommandPayload) -> Self {
        Self::new(MessageType::Set, payload)
    }
}

impl<P: Serialize> Envelope<P> {
    /// Serialize to JSON bytes.
    ///
    /// # Errors
    /// Returns `Error::Parse` if the payload cannot be represented as JSON.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Parse(format!("Cannot encode envelope: {e}")))
    }
}

impl<P: DeserializeOwned> Envelope<P> {
    /// Parse JSON bytes and check the protocol version.
    ///
    /// # Errors
    /// Returns `Error::Parse` if the bytes are not a valid envelope for `P`
    /// or carry a version other than [`ENVELOPE_VERSION`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|e| Error::Parse(format!("Malformed envelope: {e}")))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(Error::Parse(format!(
                "Unsupported envelope version {}, expected {ENVELOPE_VERSION}",
                envelope.version
            )));
        }

        Ok(envelope)
    }
}

impl Envelope<serde_json::Value> {
    /// Convert an untyped payload into `T`.
    ///
    /// # Errors
    /// Returns `Error::Parse` if the payload does not match `T`.
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<T> {
        let kind = self.kind;
        serde_json::from_value(self.payload)
            .map_err(|e| Error::Parse(format!("Malformed {kind} payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NoDetails;
    use odo_core::DeviceStatus;
    use serde_json::json;

    #[test]
    fn test_state_wire_format() {
        let envelope = Envelope::state(DeviceState::new(DeviceStatus::Connected, NoDetails {}));
        let value: serde_json::Value = serde_json::from_slice(&envelope.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({"version": 1, "type": "state", "payload": {"status": "connected"}})
        );
    }

    #[test]
    fn test_written_wire_format() {
        let credential = Credential::new(26, "1A2B3C", 9).unwrap();
        let envelope = Envelope::written(credential, WriteStatus::Pending);
        let value: serde_json::Value = serde_json::from_slice(&envelope.encode().unwrap()).unwrap();

        assert_eq!(
            value,
            json!({
                "version": 1,
                "type": "wiegand",
                "payload": {"bits": 26, "hex": "1A2B3C", "timestamp": 9, "status": "pending"}
            })
        );

        let decoded = WrittenEnvelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded.payload.status, WriteStatus::Pending);
        assert_eq!(decoded.payload.credential.hex(), "1A2B3C");
    }

    #[test]
    fn test_decode_rejects_other_version() {
        let bytes = br#"{"version": 2, "type": "wiegand", "payload": {"bits": 26, "hex": "1"}}"#;
        let result = CredentialEnvelope::decode(bytes);
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Envelope::<serde_json::Value>::decode(b"not json"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            Envelope::<serde_json::Value>::decode(
                br#"{"version": 1, "type": "bogus", "payload": {}}"#
            ),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_into_payload() {
        let bytes = serde_json::to_vec(&json!({
            "version": 1,
            "type": "wiegand",
            "payload": {"bits": 26, "hex": "1A2B3C", "timestamp": 3}
        }))
        .unwrap();
        let envelope = Envelope::<serde_json::Value>::decode(&bytes).unwrap();
        assert_eq!(envelope.kind, MessageType::Wiegand);

        let credential: Credential = envelope.into_payload().unwrap();
        assert_eq!(credential.timestamp(), 3);
    }

    #[test]
    fn test_into_payload_invalid_credential() {
        let bytes = br#"{"version": 1, "type": "wiegand", "payload": {"bits": 4, "hex": "FFFF"}}"#;
        let envelope = Envelope::<serde_json::Value>::decode(bytes).unwrap();
        let result: Result<Credential> = envelope.into_payload();
        assert!(matches!(result, Err(Error::Parse(_))));
    }
}
