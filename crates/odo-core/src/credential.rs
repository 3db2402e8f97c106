//! Wiegand credential value object and its hardware encodings.
//!
//! A [`Credential`] is what every adapter exchanges on the bus: a declared bit
//! length, the payload as hexadecimal, and a capture timestamp used only for
//! deduplication. It is validated once on construction and never mutated.
//!
//! # Encodings
//!
//! All encodings are pure functions of `(bits, hex)`:
//!
//! | Encoding | Shape | Used by |
//! |----------|-------|---------|
//! | [`to_binary`](Credential::to_binary) | `bits` binary digits, zero padded | iCLASS encode |
//! | [`to_bytes`](Credential::to_bytes) | `ceil(bits / 8)` big-endian bytes | byte-oriented writers |
//! | [`to_preamble_hex`](Credential::to_preamble_hex) | marker-framed hex | HID Prox clone/verify |
//!
//! ```
//! use odo_core::Credential;
//!
//! let credential = Credential::new(26, "2ec0c86", 1042).unwrap();
//! assert_eq!(credential.to_binary(), "10111011000000110010000110");
//! assert_eq!(credential.to_bytes(), vec![0x02, 0xec, 0x0c, 0x86]);
//! assert_eq!(credential.to_preamble_hex(), "2006ec0c86");
//! ```

use crate::{
    Result,
    constants::{MAX_CREDENTIAL_BITS, PREAMBLE_MARKER_BIT},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire shape of a credential (`{bits, hex, timestamp}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCredential {
    bits: u32,
    hex: String,
    #[serde(default)]
    timestamp: u64,
}

/// Physical access-card payload.
///
/// Construction guarantees that `hex` is non-empty hexadecimal and that its
/// value fits in `bits` bits, so every encoding below is infallible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCredential", into = "RawCredential")]
pub struct Credential {
    bits: u32,
    hex: String,
    timestamp: u64,
    value: u128,
}

impl Credential {
    /// Create a credential with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCredential` if:
    /// - `bits` is 0 or larger than [`MAX_CREDENTIAL_BITS`]
    /// - `hex` is empty or contains non-hexadecimal characters
    /// - the value of `hex` needs more than `bits` bits
    pub fn new(bits: u32, hex: impl Into<String>, timestamp: u64) -> Result<Self> {
        let hex = hex.into();

        if bits == 0 || bits > MAX_CREDENTIAL_BITS {
            return Err(Error::InvalidCredential(format!(
                "Bit length must be 1-{MAX_CREDENTIAL_BITS}, got {bits}"
            )));
        }

        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidCredential(format!(
                "Payload is not hexadecimal: {hex:?}"
            )));
        }

        let value = u128::from_str_radix(&hex, 16).map_err(|_| {
            Error::InvalidCredential(format!("Payload does not fit in 128 bits: {hex}"))
        })?;

        if bits < MAX_CREDENTIAL_BITS && value >> bits != 0 {
            return Err(Error::InvalidCredential(format!(
                "Payload {hex} does not fit in {bits} bits"
            )));
        }

        Ok(Self {
            bits,
            hex,
            timestamp,
            value,
        })
    }

    /// Declared bit length.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Payload as received.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Capture marker used for deduplication.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Payload as an unsigned integer.
    #[must_use]
    pub fn value(&self) -> u128 {
        self.value
    }

    /// Render the payload as exactly `bits` binary digits, most significant first.
    ///
    /// # Examples
    ///
    /// ```
    /// use odo_core::Credential;
    ///
    /// let credential = Credential::new(26, "1A2B3C", 0).unwrap();
    /// assert_eq!(credential.to_binary(), "00000110100010101100111100");
    /// ```
    #[must_use]
    pub fn to_binary(&self) -> String {
        format!("{:0width$b}", self.value, width = self.bits as usize)
    }

    /// Pack the payload into `ceil(bits / 8)` big-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.bits.div_ceil(8) as usize;
        let bytes = self.value.to_be_bytes();
        bytes[bytes.len() - len..].to_vec()
    }

    /// Frame the payload for an HID Prox clone and render it as hex.
    ///
    /// Credentials shorter than [`PREAMBLE_MARKER_BIT`] bits get two marker
    /// bits, one at [`PREAMBLE_MARKER_BIT`] and one at position `bits`. The
    /// payload bits are then packed into the low-order positions, most
    /// significant first. The result is lowercase without leading zeros, which
    /// is the form the reader echoes back after zero stripping.
    #[must_use]
    pub fn to_preamble_hex(&self) -> String {
        let mut frame: u128 = 0;

        if self.bits < PREAMBLE_MARKER_BIT {
            frame |= 1 << PREAMBLE_MARKER_BIT;
            frame |= 1 << self.bits;
        }

        for (index, digit) in self.to_binary().bytes().enumerate() {
            if digit == b'1' {
                frame |= 1 << (self.bits as usize - 1 - index);
            }
        }

        format!("{frame:x}")
    }
}

impl TryFrom<RawCredential> for Credential {
    type Error = Error;

    fn try_from(raw: RawCredential) -> Result<Self> {
        Credential::new(raw.bits, raw.hex, raw.timestamp)
    }
}

impl From<Credential> for RawCredential {
    fn from(credential: Credential) -> Self {
        RawCredential {
            bits: credential.bits,
            hex: credential.hex,
            timestamp: credential.timestamp,
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Bits: {} Hex: {}", self.bits, self.hex)
    }
}
