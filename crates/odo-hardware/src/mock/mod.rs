//! Mock device implementations for testing and development.
//!
//! Each mock comes with a handle sharing its state, so a test can script the
//! device while the adapter under test owns it.

pub mod driver;
pub mod haptic;
pub mod source;

pub use driver::{MockCommandDriver, MockDriverHandle, MockReply};
pub use haptic::{MockHapticHandle, MockHapticLink};
pub use source::{MockCredentialSource, MockSourceHandle};
