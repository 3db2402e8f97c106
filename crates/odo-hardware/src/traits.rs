//! Collaborator trait definitions.
//!
//! These traits are the boundary between the adapters and the outside world.
//! Each one is implemented by a real transport (HTTP, child process) and by a
//! mock driven through a handle for tests.
//!
//! Methods return `impl Future + Send` so adapters generic over a collaborator
//! can run inside spawned tasks. Implementations may still use `async fn`.
//!
//! # Object Safety
//!
//! Like every RPITIT trait these are not object-safe. Use generic parameters:
//!
//! ```no_run
//! use odo_hardware::traits::CommandDriver;
//! use odo_hardware::Result;
//!
//! async fn version<D: CommandDriver>(driver: &mut D) -> Result<String> {
//!     driver.execute("hw version").await
//! }
//! ```

use crate::error::Result;
use crate::types::{HapticInfo, SourceInfo};
use std::future::Future;

/// Device that exposes its credential log as text.
pub trait CredentialSource: Send {
    /// Version handshake.
    ///
    /// Succeeds only if the source answered with a well-formed identity.
    fn fetch_info(&mut self) -> impl Future<Output = Result<SourceInfo>> + Send;

    /// Fetch the whole credential log, one record per line.
    fn fetch_log(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Human readable location of the source, for logs.
    fn describe(&self) -> String;
}

/// Interactive command-line tool: send a command, collect the output up to
/// the next prompt.
///
/// Every wait is bounded by the driver's timeout. A timeout or an unexpected
/// end of output while running is fatal to the caller.
pub trait CommandDriver: Send {
    /// Start the tool and wait for its first prompt.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Run one command and return its output with terminal escapes removed.
    fn execute(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Ask the tool to quit and wait for it to exit.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Returns `true` between a successful `open` and `close`.
    fn is_open(&self) -> bool;
}

/// Raw request/response link to a haptic actuator.
///
/// A link carries the device's text protocol (`Command;` in, `Answer;` out);
/// [`HapticDevice`] gives it meaning.
pub trait HapticLink: Send {
    /// Establish the link.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send one command and wait for its answer.
    fn request(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Tear the link down.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Haptic actuator.
pub trait HapticDevice: Send {
    /// Connect and identify the device.
    fn connect(&mut self) -> impl Future<Output = Result<HapticInfo>> + Send;

    /// Set the vibration strength (0 stops).
    fn vibrate(&mut self, level: u8) -> impl Future<Output = Result<()>> + Send;

    /// Query the battery level in percent.
    fn battery(&mut self) -> impl Future<Output = Result<u8>> + Send;

    /// Disconnect from the device.
    fn disconnect(&mut self) -> impl Future<Output = Result<()>> + Send;
}
