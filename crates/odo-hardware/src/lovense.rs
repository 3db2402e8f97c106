//! Text protocol of the Lovense haptic actuator.
//!
//! Commands and answers are short ASCII strings terminated by `;`:
//!
//! | Command | Answer |
//! |---------|--------|
//! | `DeviceType;` | `<type>:<version>:<mac>;` |
//! | `GetBatch;` | `<batch>;` |
//! | `Battery;` | `<percent>;` |
//! | `Vibrate:<0-20>;` | `OK;` |

use crate::{
    error::{HardwareError, Result},
    traits::{HapticDevice, HapticLink},
    types::HapticInfo,
};
use tracing::debug;

/// Strongest vibration level the device accepts.
pub const MAX_VIBRATION_LEVEL: u8 = 20;

pub fn vibrate_command(level: u8) -> String {
    format!("Vibrate:{};", level.min(MAX_VIBRATION_LEVEL))
}

fn strip_terminator(answer: &str) -> &str {
    let answer = answer.trim();
    answer.strip_suffix(';').unwrap_or(answer)
}

/// Parse a `DeviceType;` answer into `(type, version, mac)`.
pub fn parse_device_type(answer: &str) -> Result<(String, String, String)> {
    let mut fields = strip_terminator(answer).split(':');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(kind), Some(version), Some(mac)) if !kind.is_empty() => {
            Ok((kind.to_string(), version.to_string(), mac.to_string()))
        }
        _ => Err(HardwareError::invalid_data(format!(
            "Malformed device type answer: {answer:?}"
        ))),
    }
}

/// Parse a `Battery;` answer into a percentage.
pub fn parse_battery(answer: &str) -> Result<u8> {
    strip_terminator(answer)
        .parse::<u8>()
        .ok()
        .filter(|level| *level <= 100)
        .ok_or_else(|| HardwareError::invalid_data(format!("Malformed battery answer: {answer:?}")))
}

/// Haptic actuator speaking the Lovense protocol over a [`HapticLink`].
#[derive(Debug)]
pub struct LovenseDevice<L> {
    link: L,
}

impl<L: HapticLink> LovenseDevice<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    async fn request(&mut self, command: &str) -> Result<String> {
        debug!(command, "Haptic send");
        let answer = self.link.request(command).await?;
        debug!(answer = %answer, "Haptic recv");
        Ok(answer)
    }
}

impl<L: HapticLink> HapticDevice for LovenseDevice<L> {
    async fn connect(&mut self) -> Result<HapticInfo> {
        self.link.connect().await?;

        let (device_type, version, mac_addr) =
            parse_device_type(&self.request("DeviceType;").await?)?;
        let batch = strip_terminator(&self.request("GetBatch;").await?).to_string();

        Ok(HapticInfo {
            device_type,
            version,
            mac_addr,
            batch: Some(batch).filter(|b| !b.is_empty()),
        })
    }

    async fn vibrate(&mut self, level: u8) -> Result<()> {
        let answer = self.request(&vibrate_command(level)).await?;
        if strip_terminator(&answer) == "OK" {
            Ok(())
        } else {
            Err(HardwareError::communication(format!(
                "Vibrate rejected: {answer:?}"
            )))
        }
    }

    async fn battery(&mut self) -> Result<u8> {
        parse_battery(&self.request("Battery;").await?)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.link.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHapticLink;
    use rstest::rstest;

    #[test]
    fn test_parse_device_type() {
        let (kind, version, mac) = parse_device_type("C:11:0082059AD3BD;").unwrap();
        assert_eq!(kind, "C");
        assert_eq!(version, "11");
        assert_eq!(mac, "0082059AD3BD");
    }

    #[rstest]
    #[case("")]
    #[case("C:11;")]
    #[case(":11:00;")]
    fn test_parse_device_type_rejects(#[case] answer: &str) {
        assert!(matches!(
            parse_device_type(answer),
            Err(HardwareError::InvalidData { .. })
        ));
    }

    #[rstest]
    #[case("85;", Some(85))]
    #[case("100;", Some(100))]
    #[case("101;", None)]
    #[case("low;", None)]
    fn test_parse_battery(#[case] answer: &str, #[case] expected: Option<u8>) {
        assert_eq!(parse_battery(answer).ok(), expected);
    }

    #[test]
    fn test_vibrate_command_is_clamped() {
        assert_eq!(vibrate_command(10), "Vibrate:10;");
        assert_eq!(vibrate_command(99), "Vibrate:20;");
    }

    #[tokio::test]
    async fn test_connect_handshake() {
        let (link, handle) = MockHapticLink::new();
        let mut device = LovenseDevice::new(link);

        let info = device.connect().await.unwrap();
        assert_eq!(info.device_type, "C");
        assert_eq!(info.batch.as_deref(), Some("191"));
        assert_eq!(handle.sent().await, vec!["DeviceType;", "GetBatch;"]);
    }

    #[tokio::test]
    async fn test_vibrate_and_battery() {
        let (link, handle) = MockHapticLink::new();
        let mut device = LovenseDevice::new(link);
        device.connect().await.unwrap();

        handle.set_battery(42).await;
        device.vibrate(20).await.unwrap();
        assert_eq!(device.battery().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_write_failure() {
        let (link, handle) = MockHapticLink::new();
        let mut device = LovenseDevice::new(link);
        device.connect().await.unwrap();

        handle.fail_writes(true).await;
        let error: odo_core::Error = device.vibrate(5).await.unwrap_err().into();
        assert!(error.is_retryable());
    }
}
