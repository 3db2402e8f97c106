use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity of an adapter to its external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    Connected,
}

impl DeviceStatus {
    /// Returns `true` if status is Connected.
    #[inline]
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, DeviceStatus::Connected)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceStatus::Disconnected => write!(f, "disconnected"),
            DeviceStatus::Connected => write!(f, "connected"),
        }
    }
}

/// Category of a credential topic.
///
/// The category is the second path segment of the topic
/// (`credentials/<category>`) and is what the router mode filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialCategory {
    /// Observed by the capture stage.
    Seen,
    /// Explicitly chosen by an operator.
    Selected,
    /// Write status report.
    Written,
}

impl fmt::Display for CredentialCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CredentialCategory::Seen => write!(f, "seen"),
            CredentialCategory::Selected => write!(f, "selected"),
            CredentialCategory::Written => write!(f, "written"),
        }
    }
}

/// Router mode: which credential categories the encoder acts upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Accept both seen and selected credentials.
    Auto,
    /// Accept seen credentials only.
    #[default]
    Seen,
    /// Accept selected credentials only.
    Selected,
}

impl Mode {
    /// Check whether credentials of `category` are processed in this mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use odo_core::{CredentialCategory, Mode};
    ///
    /// assert!(Mode::Auto.accepts(CredentialCategory::Seen));
    /// assert!(Mode::Auto.accepts(CredentialCategory::Selected));
    /// assert!(!Mode::Seen.accepts(CredentialCategory::Selected));
    /// assert!(!Mode::Auto.accepts(CredentialCategory::Written));
    /// ```
    #[must_use]
    pub fn accepts(self, category: CredentialCategory) -> bool {
        matches!(
            (self, category),
            (Mode::Auto, CredentialCategory::Seen | CredentialCategory::Selected)
                | (Mode::Seen, CredentialCategory::Seen)
                | (Mode::Selected, CredentialCategory::Selected)
        )
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mode::Auto => write!(f, "auto"),
            Mode::Seen => write!(f, "seen"),
            Mode::Selected => write!(f, "selected"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Mode::Auto),
            "seen" => Ok(Mode::Seen),
            "selected" => Ok(Mode::Selected),
            other => Err(Error::Configuration(format!("Unknown mode: {other}"))),
        }
    }
}

/// Encoding target: which card technology the encoder writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// HF iCLASS, written as three data blocks.
    #[default]
    Iclass,
    /// LF HID Prox, cloned with a preamble frame and read back.
    Prox,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Iclass => write!(f, "iclass"),
            Target::Prox => write!(f, "prox"),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "iclass" => Ok(Target::Iclass),
            "prox" => Ok(Target::Prox),
            other => Err(Error::Configuration(format!("Unknown target: {other}"))),
        }
    }
}

/// Progress of a credential write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStatus {
    Pending,
    Success,
    Failure,
}

impl WriteStatus {
    /// Returns `true` for `Success` and `Failure`.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, WriteStatus::Pending)
    }

    /// Collapse a boolean verification result into a terminal status.
    #[inline]
    #[must_use]
    pub fn from_verified(verified: bool) -> Self {
        if verified {
            WriteStatus::Success
        } else {
            WriteStatus::Failure
        }
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WriteStatus::Pending => write!(f, "pending"),
            WriteStatus::Success => write!(f, "success"),
            WriteStatus::Failure => write!(f, "failure"),
        }
    }
}
