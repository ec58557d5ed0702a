pub mod config;
pub mod error_codes;
pub mod filter;
pub mod input_validation;
pub mod logging;
pub mod path_validation;
pub mod readiness;
pub mod session;
pub mod sync_engine;
pub mod trigger;
pub mod watcher;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};

use config::{AppConfig, AppPaths};
use logging::{LogCategory, LogManager, DEFAULT_MAX_LOG_LINES};
use readiness::{Readiness, ReadinessProbe};
use session::{SessionContext, SessionHandle, WatchSession};
use sync_engine::{ConnectivityReport, SyncCompleted, SyncError, SyncInvoker};

/// Application-level controller: what the Start, Stop and Test buttons do.
pub struct AppState {
    pub paths: AppPaths,
    pub log_manager: Arc<LogManager>,
    config_file: PathBuf,
    session: Mutex<Option<SessionHandle>>,
}

impl AppState {
    /// Logs to memory and to `logs/app.log` under the app directory.
    pub fn new(paths: AppPaths) -> Self {
        let log_manager = LogManager::new(DEFAULT_MAX_LOG_LINES).with_file(paths.app_log());
        Self::with_log_manager(paths, Arc::new(log_manager))
    }

    pub fn with_log_manager(paths: AppPaths, log_manager: Arc<LogManager>) -> Self {
        Self {
            config_file: paths.config_file(),
            paths,
            log_manager,
            session: Mutex::new(None),
        }
    }

    /// Where `start_watch` persists the settings it was started with.
    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_file = path;
        self
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub async fn is_watching(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Receiver for sync results of the running session, if any.
    pub async fn subscribe(&self) -> Option<broadcast::Receiver<SyncCompleted>> {
        self.session.lock().await.as_ref().map(SessionHandle::subscribe)
    }

    /// Starts a session with the default readiness probe. Returns `false`
    /// when a session is already running.
    pub async fn start_watch(
        &self,
        config: &AppConfig,
        invoker: Arc<dyn SyncInvoker>,
    ) -> Result<bool, SyncError> {
        self.start_watch_with(config, invoker, Arc::new(ReadinessProbe::default()))
            .await
    }

    pub async fn start_watch_with(
        &self,
        config: &AppConfig,
        invoker: Arc<dyn SyncInvoker>,
        readiness: Arc<dyn Readiness>,
    ) -> Result<bool, SyncError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(false);
        }

        let watch = config.watch_configuration().map_err(|e| {
            self.log_manager.error(LogCategory::App, &format!("Cannot start: {e}"));
            e
        })?;

        let ctx = SessionContext {
            invoker,
            readiness,
            log: Arc::clone(&self.log_manager),
            rclone_log: self.paths.rclone_log(),
        };
        *session = Some(WatchSession::start(watch, ctx)?);
        self.log_manager.info(LogCategory::App, "Watcher STARTED");

        match config.save(&self.config_file) {
            Ok(()) => self.log_manager.info(LogCategory::Config, "Config saved"),
            Err(e) => self
                .log_manager
                .error(LogCategory::Config, &format!("Save config error: {e:#}")),
        }

        Ok(true)
    }

    /// Stops the running session, waiting for an in-flight sync to finish.
    /// Returns `false` when nothing was running.
    ///
    /// The session slot stays locked until the sync is done, so neither a new
    /// session nor `run_sync_once` can start a copy meanwhile.
    pub async fn stop_watch(&self) -> bool {
        let mut session = self.session.lock().await;
        let Some(handle) = session.take() else {
            return false;
        };

        handle.stop_and_wait().await;
        self.log_manager.info(LogCategory::App, "Watcher STOPPED");
        true
    }

    pub async fn test_connection(
        &self,
        config: &AppConfig,
        invoker: &dyn SyncInvoker,
        timeout: Duration,
    ) -> Result<ConnectivityReport, SyncError> {
        config.validate_remote()?;
        self.log_manager
            .info(LogCategory::ConnectionTest, "Test rclone connection");

        match invoker.test_connection(config.remote_path.trim(), timeout).await {
            Ok(report) if report.is_success() => {
                self.log_manager.info(LogCategory::ConnectionTest, "Test OK");
                Ok(report)
            }
            Ok(report) => {
                self.log_manager.error(
                    LogCategory::ConnectionTest,
                    &format!("Test FAILED: {}", report.stderr.trim()),
                );
                Ok(report)
            }
            Err(e) => {
                self.log_manager
                    .error(LogCategory::ConnectionTest, &format!("Test ERROR: {e}"));
                Err(e)
            }
        }
    }

    /// One copy right now, outside any watch session. Holds the session slot
    /// for the whole copy.
    pub async fn run_sync_once(
        &self,
        config: &AppConfig,
        invoker: &dyn SyncInvoker,
    ) -> Result<SyncCompleted, SyncError> {
        let watch = config.watch_configuration()?;
        let session = self.session.lock().await;
        if session.is_some() {
            return Err(SyncError::InvalidConfig(
                "a watch session is already running".to_string(),
            ));
        }

        self.log_manager.info(LogCategory::Fired, "Trigger rclone");
        let result = invoker.copy(&watch.sync_request(self.paths.rclone_log())).await;
        let done = SyncCompleted::from_result(result, None);

        match done.exit_status {
            Some(code) if done.is_success() => self
                .log_manager
                .info(LogCategory::SyncResult, &format!("Rclone exit code: {code}")),
            Some(code) => self.log_manager.error(
                LogCategory::SyncResult,
                &format!("Rclone exit code: {code}: {}", done.log_text),
            ),
            None => self
                .log_manager
                .error(LogCategory::SyncResult, &format!("ERROR: {}", done.log_text)),
        }
        drop(session);
        Ok(done)
    }
}
