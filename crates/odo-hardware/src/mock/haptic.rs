//! Mock haptic link.

use crate::{Result, error::HardwareError, traits::HapticLink};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
struct LinkState {
    reachable: bool,
    connected: bool,
    fail_writes: bool,
    battery: u8,
    sent: Vec<String>,
}

/// In-memory stand-in for the actuator's radio link.
///
/// Answers the Lovense text protocol like a healthy device.
#[derive(Debug)]
pub struct MockHapticLink {
    state: Arc<Mutex<LinkState>>,
}

impl MockHapticLink {
    pub fn new() -> (Self, MockHapticHandle) {
        let state = Arc::new(Mutex::new(LinkState {
            reachable: true,
            connected: false,
            fail_writes: false,
            battery: 100,
            sent: Vec::new(),
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHapticHandle { state },
        )
    }
}

impl HapticLink for MockHapticLink {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.reachable {
            return Err(HardwareError::unreachable("no actuator in range"));
        }
        state.connected = true;
        state.fail_writes = false;
        Ok(())
    }

    async fn request(&mut self, command: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if !state.connected {
            return Err(HardwareError::disconnected("mock actuator"));
        }
        if state.fail_writes {
            return Err(HardwareError::communication(format!(
                "write of {command:?} failed"
            )));
        }
        state.sent.push(command.to_string());

        let answer = match command {
            "DeviceType;" => "C:11:0082059AD3BD;".to_string(),
            "GetBatch;" => "191;".to_string(),
            "Battery;" => format!("{};", state.battery),
            c if c.starts_with("Vibrate:") => "OK;".to_string(),
            _ => "ERR;".to_string(),
        };
        Ok(answer)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.state.lock().await.connected = false;
        Ok(())
    }
}

/// Handle for scripting a [`MockHapticLink`].
#[derive(Debug, Clone)]
pub struct MockHapticHandle {
    state: Arc<Mutex<LinkState>>,
}

impl MockHapticHandle {
    /// Make connection attempts fail (or succeed again).
    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    /// Make every request fail until the next connect.
    pub async fn fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }

    pub async fn set_battery(&self, level: u8) {
        self.state.lock().await.battery = level;
    }

    /// Commands sent so far, in order.
    pub async fn sent(&self) -> Vec<String> {
        self.state.lock().await.sent.clone()
    }

    /// Vibration commands sent so far, in order.
    pub async fn vibrations(&self) -> Vec<String> {
        self.sent()
            .await
            .into_iter()
            .filter(|c| c.starts_with("Vibrate:"))
            .collect()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }
}
