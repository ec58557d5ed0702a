pub mod engine;
pub mod types;

pub use engine::{RcloneEngine, SyncInvoker, DEFAULT_TEST_TIMEOUT};
pub use types::{ConnectivityReport, SyncCompleted, SyncError, SyncOutcome, SyncRequest};
