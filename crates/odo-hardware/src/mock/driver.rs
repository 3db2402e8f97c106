//! Mock command driver.

use crate::{
    Result,
    error::HardwareError,
    traits::CommandDriver,
};
use odo_core::constants::DEFAULT_DRIVER_TIMEOUT_SECS;
use std::{collections::VecDeque, fmt, sync::Arc};
use tokio::sync::Mutex;

/// Scripted outcome of an `open` or `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Output collected before the next prompt.
    Output(String),
    /// No prompt within the timeout.
    Timeout,
    /// Output ended.
    Closed,
}

impl MockReply {
    pub fn output(text: impl Into<String>) -> Self {
        Self::Output(text.into())
    }
}

type Responder = Arc<dyn Fn(&str) -> MockReply + Send + Sync>;

#[derive(Default)]
struct DriverState {
    open_failures: VecDeque<MockReply>,
    replies: VecDeque<MockReply>,
    responder: Option<Responder>,
    commands: Vec<String>,
    open: bool,
    opens: usize,
    closes: usize,
}

impl fmt::Debug for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverState")
            .field("replies", &self.replies)
            .field("commands", &self.commands)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

/// Command driver answering from a script.
///
/// Replies are taken from the queue filled by
/// [`MockDriverHandle::push_reply`] first, then from the responder installed
/// with [`MockDriverHandle::respond_with`], and default to empty output.
///
/// # Examples
///
/// ```
/// use odo_hardware::mock::{MockCommandDriver, MockReply};
/// use odo_hardware::traits::CommandDriver;
///
/// #[tokio::main]
/// async fn main() -> odo_hardware::Result<()> {
///     let (mut driver, handle) = MockCommandDriver::new();
///     handle.push_reply(MockReply::output("[=] raw: 2006ec0c86")).await;
///
///     driver.open().await?;
///     let output = driver.execute("lf hid reader").await?;
///
///     assert!(output.contains("2006ec0c86"));
///     assert_eq!(handle.commands().await, vec!["lf hid reader"]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockCommandDriver {
    state: Arc<Mutex<DriverState>>,
    timeout_ms: u64,
}

impl MockCommandDriver {
    pub fn new() -> (Self, MockDriverHandle) {
        let state = Arc::new(Mutex::new(DriverState::default()));
        (
            Self {
                state: Arc::clone(&state),
                timeout_ms: DEFAULT_DRIVER_TIMEOUT_SECS * 1000,
            },
            MockDriverHandle { state },
        )
    }
}

impl CommandDriver for MockCommandDriver {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.opens += 1;

        match state.open_failures.pop_front() {
            Some(MockReply::Timeout) => Err(HardwareError::unreachable(format!(
                "no prompt from client within {}ms",
                self.timeout_ms
            ))),
            Some(MockReply::Closed) => Err(HardwareError::initialization_failed(
                "client exited before its first prompt",
            )),
            Some(MockReply::Output(_)) | None => {
                state.open = true;
                Ok(())
            }
        }
    }

    async fn execute(&mut self, command: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(HardwareError::disconnected("mock client"));
        }
        state.commands.push(command.to_string());

        let reply = match state.replies.pop_front() {
            Some(reply) => reply,
            None => match &state.responder {
                Some(responder) => responder(command),
                None => MockReply::Output(String::new()),
            },
        };

        match reply {
            MockReply::Output(text) => Ok(text),
            MockReply::Timeout => Err(HardwareError::timeout(self.timeout_ms)),
            MockReply::Closed => {
                state.open = false;
                Err(HardwareError::stream_closed("mock client"))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.open {
            state.open = false;
            state.closes += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.try_lock().map(|state| state.open).unwrap_or(true)
    }
}

/// Handle for scripting a [`MockCommandDriver`].
#[derive(Debug, Clone)]
pub struct MockDriverHandle {
    state: Arc<Mutex<DriverState>>,
}

impl MockDriverHandle {
    /// Queue the reply to the next command.
    pub async fn push_reply(&self, reply: MockReply) {
        self.state.lock().await.replies.push_back(reply);
    }

    /// Answer unscripted commands with `responder`.
    pub async fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        self.state.lock().await.responder = Some(Arc::new(responder));
    }

    /// Make the next `open` fail with `reply` (`Timeout` or `Closed`).
    pub async fn fail_next_open(&self, reply: MockReply) {
        self.state.lock().await.open_failures.push_back(reply);
    }

    /// Commands executed so far, in order.
    pub async fn commands(&self) -> Vec<String> {
        self.state.lock().await.commands.clone()
    }

    /// Number of `open` attempts so far.
    pub async fn opens(&self) -> usize {
        self.state.lock().await.opens
    }

    /// Number of times an open client was closed.
    pub async fn closes(&self) -> usize {
        self.state.lock().await.closes
    }
}
