//! Core constants shared by every odo adapter.
//!
//! This module centralizes the bus topic layout, the envelope version, the
//! lifecycle timings, and the bit positions used by the credential encodings.
//!
//! # Topic Layout
//!
//! ```text
//! devices/<adapter>/state     adapter → bus   type = "state"
//! devices/<adapter>/cmd       bus → adapter   type = "set"
//! credentials/seen            capture → bus   type = "wiegand"
//! credentials/selected        ui → bus        type = "wiegand"
//! credentials/written         encoder → bus   type = "wiegand" + status
//! ```
//!
//! # Usage
//!
//! ```
//! use odo_core::constants::*;
//!
//! assert_eq!(ENVELOPE_VERSION, 1);
//! assert_eq!(DEFAULT_SEEN_TOPIC, "credentials/seen");
//!
//! use std::time::Duration;
//! let backoff = Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS);
//! assert_eq!(backoff.as_secs(), 10);
//! ```

// ============================================================================
// Envelope
// ============================================================================

/// Version stamped on every envelope published on the bus.
///
/// Envelopes carrying any other version are rejected on decode.
pub const ENVELOPE_VERSION: u8 = 1;

// ============================================================================
// Topics
// ============================================================================

/// Prefix of every per-adapter topic (`devices/<adapter>/...`).
pub const DEVICE_TOPIC_PREFIX: &str = "devices";

/// Suffix of the state topic an adapter publishes on.
pub const STATE_TOPIC_SUFFIX: &str = "state";

/// Suffix of the command topic an adapter listens on.
pub const COMMAND_TOPIC_SUFFIX: &str = "cmd";

/// Default topic for credentials observed by the capture stage.
pub const DEFAULT_SEEN_TOPIC: &str = "credentials/seen";

/// Default topic for credentials explicitly selected by an operator.
pub const DEFAULT_SELECTED_TOPIC: &str = "credentials/selected";

/// Default topic for write status reports.
pub const DEFAULT_WRITTEN_TOPIC: &str = "credentials/written";

// ============================================================================
// Lifecycle
// ============================================================================

/// Fixed delay between connection attempts (seconds).
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 10;

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default delay between two credential log polls when nothing new was found (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Timeout applied to the credential source version handshake (seconds).
pub const SOURCE_HANDSHAKE_TIMEOUT_SECS: u64 = 5;

/// Timeout applied to a credential log fetch (seconds).
pub const SOURCE_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default timeout for a command driver response (seconds).
pub const DEFAULT_DRIVER_TIMEOUT_SECS: u64 = 10;

/// Interval between two battery queries of the haptic actuator (seconds).
pub const BATTERY_POLL_INTERVAL_SECS: u64 = 10;

/// Housekeeping tick of the haptic adapter (milliseconds).
pub const HAPTIC_TICK_MILLIS: u64 = 500;

// ============================================================================
// Credential encoding
// ============================================================================

/// Largest credential the encoders accept, in bits.
pub const MAX_CREDENTIAL_BITS: u32 = 128;

/// Fixed high marker bit of the prox preamble frame.
///
/// Credentials shorter than this get two markers: this bit and the bit at
/// position `bits`.
///
/// # Examples
///
/// ```
/// use odo_core::constants::PREAMBLE_MARKER_BIT;
///
/// assert_eq!(1u64 << PREAMBLE_MARKER_BIT, 0x20_0000_0000);
/// ```
pub const PREAMBLE_MARKER_BIT: u32 = 37;

/// iCLASS data blocks written by the encode command, in write order.
pub const ICLASS_DATA_BLOCKS: [u8; 3] = [6, 7, 8];
