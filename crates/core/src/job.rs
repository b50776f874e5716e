//! Pipeline job model
//!
//! A job is a single upload-and-stream run against the 3D pipeline. The
//! server multiplexes several message kinds over one event stream; they are
//! surfaced as the closed [`JobMessage`] enum.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Wire prefix of a directory listing message
pub const FILETREE_PREFIX: &str = "FILETREE:";
/// Wire prefix of the job identifier message
pub const JOB_COMPLETE_PREFIX: &str = "JOB_COMPLETE:";
/// Terminal sentinel, matched exactly
pub const FINISHED_SENTINEL: &str = "PIPELINE:FINISHED";
/// Leading token the server uses for error lines
pub const ERROR_PREFIX: &str = "ERROR";

/// A classified message from the pipeline event stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobMessage {
    /// Plain progress text, verbatim
    Progress(String),
    /// Error text, verbatim (including its `ERROR` lead)
    Error(String),
    /// Directory listing of the job workspace
    FileTree(JsonValue),
    /// Identifier of the produced artifact
    JobComplete(String),
    /// End of pipeline output
    Finished,
}

impl JobMessage {
    /// Classify a message body that has already had its framing stripped.
    ///
    /// Returns `Err` with the JSON error when a `FILETREE:` payload cannot be
    /// parsed; callers drop such messages.
    pub fn classify(body: &str) -> Result<Self, serde_json::Error> {
        if let Some(tree) = body.strip_prefix(FILETREE_PREFIX) {
            return serde_json::from_str(tree).map(Self::FileTree);
        }
        if let Some(job_id) = body.strip_prefix(JOB_COMPLETE_PREFIX) {
            return Ok(Self::JobComplete(job_id.to_string()));
        }
        if body == FINISHED_SENTINEL {
            return Ok(Self::Finished);
        }
        if body.starts_with(ERROR_PREFIX) {
            Ok(Self::Error(body.to_string()))
        } else {
            Ok(Self::Progress(body.to_string()))
        }
    }

    /// Check if this message ends the stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Text forwarded on the caller's progress channel, if any.
    ///
    /// Directory listings and job ids have their own callbacks.
    #[must_use]
    pub fn display_text(&self) -> Option<&str> {
        match self {
            Self::Progress(text) | Self::Error(text) => Some(text),
            Self::Finished => Some(FINISHED_SENTINEL),
            Self::FileTree(_) | Self::JobComplete(_) => None,
        }
    }
}

impl fmt::Display for JobMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress(text) | Self::Error(text) => f.write_str(text),
            Self::FileTree(tree) => write!(f, "{FILETREE_PREFIX}{tree}"),
            Self::JobComplete(job_id) => write!(f, "{JOB_COMPLETE_PREFIX}{job_id}"),
            Self::Finished => f.write_str(FINISHED_SENTINEL),
        }
    }
}

/// Lifecycle position of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobState {
    /// No upload has started
    #[default]
    Idle,
    /// Upload request issued, waiting for response headers
    Uploading,
    /// Reading the event stream
    Streaming,
    /// Sentinel seen after a job id was announced
    Completed,
    /// Sentinel seen without a job id; nothing to download
    FinishedWithoutId,
    /// Transport error or non-success upload status
    Failed,
    /// Stream ended before the sentinel
    Incomplete,
}

impl JobState {
    /// Check if the job is still running
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Uploading | Self::Streaming)
    }

    /// Check if no further transitions can occur
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::FinishedWithoutId | Self::Failed | Self::Incomplete
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::FinishedWithoutId => "finished-without-id",
            Self::Failed => "failed",
            Self::Incomplete => "incomplete",
        };
        f.write_str(name)
    }
}

/// How a successfully streamed job ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// Sentinel reached and an artifact id is available
    Completed { job_id: String },
    /// Sentinel reached without an artifact id
    FinishedWithoutId,
    /// Transport closed the stream before the sentinel
    Incomplete,
}

impl JobOutcome {
    /// Artifact id, when one was announced
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Completed { job_id } => Some(job_id),
            Self::FinishedWithoutId | Self::Incomplete => None,
        }
    }
}

/// Record of the single active (or most recent) job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Artifact id; set only by a `JobComplete` message
    pub id: Option<String>,
    /// Whether the job is still uploading or streaming
    pub active: bool,
    /// Every message received, in server order
    pub messages: Vec<JobMessage>,
    /// Lifecycle position
    pub state: JobState,
}

impl Job {
    /// Fresh record for a new upload
    #[must_use]
    pub fn uploading() -> Self {
        Self {
            id: None,
            active: true,
            messages: Vec::new(),
            state: JobState::Uploading,
        }
    }

    /// Mark the response body as being read
    pub fn begin_streaming(&mut self) {
        self.state = JobState::Streaming;
    }

    /// Append a message and apply its effect on the record
    pub fn record(&mut self, message: JobMessage) {
        match &message {
            JobMessage::JobComplete(job_id) => self.id = Some(job_id.clone()),
            JobMessage::Finished => {
                self.active = false;
                self.state = if self.id.is_some() {
                    JobState::Completed
                } else {
                    JobState::FinishedWithoutId
                };
            }
            JobMessage::Progress(_) | JobMessage::Error(_) | JobMessage::FileTree(_) => {}
        }
        self.messages.push(message);
    }

    /// Record a fatal error line and stop the job
    pub fn fail(&mut self, error_line: String) {
        self.messages.push(JobMessage::Error(error_line));
        self.active = false;
        self.state = JobState::Failed;
    }

    /// Stop the job after the stream closed without the sentinel
    pub fn interrupt(&mut self) {
        self.active = false;
        self.state = JobState::Incomplete;
    }

    /// Outcome of a job that reached a non-failed terminal state
    #[must_use]
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.state {
            JobState::Completed => self
                .id
                .clone()
                .map(|job_id| JobOutcome::Completed { job_id }),
            JobState::FinishedWithoutId => Some(JobOutcome::FinishedWithoutId),
            JobState::Incomplete => Some(JobOutcome::Incomplete),
            JobState::Idle | JobState::Uploading | JobState::Streaming | JobState::Failed => None,
        }
    }
}
