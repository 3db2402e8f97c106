//! Hardware collaborators of the odo adapters.
//!
//! This crate holds everything that talks to a physical device or a device
//! service, behind three async traits:
//!
//! - [`CredentialSource`]: a board that exposes its credential log as text
//!   ([`http::HttpLogSource`]).
//! - [`CommandDriver`]: an interactive command-line tool answering at a
//!   prompt ([`process::Pm3Process`]).
//! - [`HapticDevice`]: a haptic actuator ([`lovense::LovenseDevice`] over a
//!   [`HapticLink`]).
//!
//! Each trait has a mock in [`mock`] driven through a handle, so adapters can
//! be tested without hardware.
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`] with [`HardwareError`]. Converting into
//! [`odo_core::Error`] classifies the failure as retryable, skippable, or
//! fatal for the adapter.
//!
//! ```no_run
//! use odo_hardware::traits::CredentialSource;
//! use odo_hardware::http::HttpLogSource;
//!
//! # async fn run() -> odo_core::Result<()> {
//! let mut source = HttpLogSource::new("http://espkey.local/", "log.txt")?;
//! let info = source.fetch_info().await?;
//! let log = source.fetch_log().await?;
//! println!("{:?}: {} records", info.version, log.lines().count());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod lovense;
pub mod mock;
pub mod process;
pub mod traits;
pub mod types;

pub use error::{HardwareError, Result};
pub use traits::{CommandDriver, CredentialSource, HapticDevice, HapticLink};
pub use types::{HapticInfo, SourceInfo};
