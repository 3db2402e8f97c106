//! Bus wire protocol for odo adapters.
//!
//! Every message on the bus is a JSON [`Envelope`] with a version, a type tag,
//! and a payload. This crate defines the envelope, the payload shapes for the
//! three message types, the topic layout, and the grammar of the credential
//! log records the capture stage reads.

pub mod command;
pub mod envelope;
pub mod record;
pub mod state;
pub mod topic;

pub use command::CommandPayload;
pub use envelope::{
    CommandEnvelope, CredentialEnvelope, Envelope, MessageType, StateEnvelope, WriteReport,
    WrittenEnvelope,
};
pub use record::LogRecordParser;
pub use state::{DeviceState, NoDetails};
pub use topic::{CredentialTopics, DeviceTopics};
