//! The lifecycle state of a background task.

use serde::{self, Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt;
use std::result;
use std::str::FromStr;

/// The state of a `Task`, as reported by the server.
///
/// States we don't recognize are kept verbatim in `Other`. They are never
/// terminal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Queued, but not picked up by a worker yet.
    Pending,
    /// A worker has accepted the task.
    Started,
    /// The task is doing its work.
    Running,
    /// The task failed and is scheduled to run again.
    Retry,
    /// The task completed successfully.
    Finished,
    /// The task failed for good.
    Failed,
    /// Someone cancelled the task.
    Canceled,
    /// Any other state string.
    Other(String),
}

impl TaskState {
    /// The wire form of this state.
    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Running => "RUNNING",
            TaskState::Retry => "RETRY",
            TaskState::Finished => "FINISHED",
            TaskState::Failed => "FAILED",
            TaskState::Canceled => "CANCELED",
            TaskState::Other(state) => state,
        }
    }

    /// Will this task never change state again?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Canceled
        )
    }

    /// Did the task finish successfully?
    pub fn is_finished(&self) -> bool {
        *self == TaskState::Finished
    }

    /// Did something go wrong?
    pub fn is_err(&self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Canceled)
    }
}

impl Default for TaskState {
    fn default() -> Self {
        TaskState::Pending
    }
}

impl FromStr for TaskState {
    type Err = Infallible;

    fn from_str(s: &str) -> result::Result<Self, Infallible> {
        Ok(match s {
            "PENDING" => TaskState::Pending,
            "STARTED" => TaskState::Started,
            "RUNNING" => TaskState::Running,
            "RETRY" => TaskState::Retry,
            "FINISHED" => TaskState::Finished,
            "FAILED" => TaskState::Failed,
            "CANCELED" => TaskState::Canceled,
            other => TaskState::Other(other.to_owned()),
        })
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D>(deserializer: D) -> result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let state = String::deserialize(deserializer)?;
        match state.parse() {
            Ok(state) => Ok(state),
            Err(never) => match never {},
        }
    }
}

impl Serialize for TaskState {
    fn serialize<S>(&self, serializer: S) -> result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_str().serialize(serializer)
    }
}

#[test]
fn only_three_states_are_terminal() {
    for state in &["FINISHED", "FAILED", "CANCELED"] {
        assert!(state.parse::<TaskState>().unwrap().is_terminal());
    }
    for state in &["PENDING", "STARTED", "RUNNING", "RETRY", "finished", "SUCCESS"] {
        assert!(!state.parse::<TaskState>().unwrap().is_terminal());
    }
}

#[test]
fn unknown_states_round_trip() {
    let state: TaskState = serde_json::from_str("\"PAUSED\"").unwrap();
    assert_eq!(state, TaskState::Other("PAUSED".to_owned()));
    assert_eq!(serde_json::to_string(&state).unwrap(), "\"PAUSED\"");
}
