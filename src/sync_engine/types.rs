use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::error_codes;

/// Everything rclone needs for one `copy` run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRequest {
    pub source_dir: PathBuf,
    pub remote_target: String,
    pub ignore_existing: bool,
    pub log_file: PathBuf,
}

/// Result of a copy run that at least managed to start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncOutcome {
    pub exit_status: i32,
    /// Diagnostic text captured from stderr. Empty on success.
    pub log_text: String,
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Output of `rclone lsd <remote>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectivityReport {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ConnectivityReport {
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Published once per finished sync, successful or not.
///
/// `exit_status` is `None` when rclone never ran or the run failed before an
/// exit code was available.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncCompleted {
    pub exit_status: Option<i32>,
    pub log_text: String,
    pub candidate: Option<PathBuf>,
}

impl SyncCompleted {
    pub fn from_result(result: Result<SyncOutcome, SyncError>, candidate: Option<PathBuf>) -> Self {
        match result {
            Ok(outcome) => Self {
                exit_status: Some(outcome.exit_status),
                log_text: outcome.log_text,
                candidate,
            },
            Err(SyncError::NonZeroExit { status, stderr }) => Self {
                exit_status: Some(status),
                log_text: stderr,
                candidate,
            },
            Err(e) => Self {
                exit_status: None,
                log_text: e.to_string(),
                candidate,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("file never became ready: {path:?}")]
    ReadinessTimeout { path: PathBuf },

    #[error("failed to launch {binary:?}: {reason}")]
    LaunchFailed { binary: PathBuf, reason: String },

    #[error("rclone exited with status {status}: {stderr}")]
    NonZeroExit { status: i32, stderr: String },

    #[error("rclone did not finish within {after:?}")]
    Timeout { after: Duration },

    #[error("failed to start watching: {0}")]
    WatchStart(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::ReadinessTimeout { .. } => error_codes::ERR_READINESS_TIMEOUT,
            SyncError::LaunchFailed { .. } => error_codes::ERR_LAUNCH_FAILED,
            SyncError::NonZeroExit { .. } => error_codes::ERR_NON_ZERO_EXIT,
            SyncError::Timeout { .. } => error_codes::ERR_TIMEOUT,
            SyncError::WatchStart(_) => error_codes::ERR_WATCH_START_FAILED,
            SyncError::InvalidConfig(_) => error_codes::ERR_INVALID_CONFIG,
            SyncError::Io(_) => error_codes::ERR_IO,
        }
    }
}

impl From<notify::Error> for SyncError {
    fn from(e: notify::Error) -> Self {
        SyncError::WatchStart(e.to_string())
    }
}
