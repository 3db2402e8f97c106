//! Device adapters and the supervisor that runs them.
//!
//! Every physical device is wrapped in an [`Adapter`] and driven by a
//! [`Supervisor`] on its own task. Adapters never share state; they talk to
//! each other only through the bus.
//!
//! ```text
//! CaptureAdapter ──credentials/seen──▶ EncoderAdapter ──credentials/written──▶ HapticAdapter
//!  (log source)                     (router + pipeline)                        (patterns)
//! ```

pub mod capture;
pub mod encoder;
pub mod haptic;
pub mod lifecycle;
pub mod manager;
pub mod pipeline;
pub mod router;
pub mod supervisor;

pub use capture::{CaptureAdapter, CaptureStage, DedupCache, LogScan};
pub use encoder::EncoderAdapter;
pub use haptic::{HapticAdapter, HapticDetails};
pub use lifecycle::{Lifecycle, LifecycleState, RetryPolicy};
pub use manager::{AdapterExit, AdapterManager};
pub use pipeline::WritePipeline;
pub use router::{Route, Router};
pub use supervisor::{Adapter, AdapterHandle, Outbox, Supervisor, SupervisorConfig};
