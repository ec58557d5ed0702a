//! One watch session: the filesystem source, the readiness probe, the
//! debounce trigger and the sync invocation, tied together by a single task.
//!
//! Every notification (raw changes, readiness results, finished invocations)
//! is funneled into that task, which is the only owner of the
//! [`DebounceTrigger`]. Probing and copying run on their own tasks and post
//! their results back, so neither one stalls event intake.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfiguration;
use crate::filter::ExtensionFilter;
use crate::logging::{LogCategory, LogManager};
use crate::readiness::Readiness;
use crate::sync_engine::{SyncCompleted, SyncError, SyncInvoker};
use crate::trigger::{ChangeOutcome, DebounceTrigger, TriggerState};
use crate::watcher::{FsWatchSource, RawChange, WATCH_CHANNEL_CAPACITY};

const COMPLETED_CHANNEL_CAPACITY: usize = 16;

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct SessionContext {
    pub invoker: Arc<dyn SyncInvoker>,
    pub readiness: Arc<dyn Readiness>,
    pub log: Arc<LogManager>,
    /// Passed to rclone as `--log-file`.
    pub rclone_log: PathBuf,
}

enum Control {
    Ready { path: PathBuf, ready: bool },
    Done(SyncCompleted),
}

pub struct WatchSession;

impl WatchSession {
    /// Starts watching `config.root_path` recursively. Must be called from
    /// inside a Tokio runtime.
    pub fn start(
        config: WatchConfiguration,
        ctx: SessionContext,
    ) -> Result<SessionHandle, SyncError> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let source = FsWatchSource::start(&config.root_path, tx)?;
        Self::spawn(config, ctx, rx, Some(source))
    }

    /// Runs a session over an externally supplied change stream instead of a
    /// real filesystem watch.
    pub fn from_changes(
        config: WatchConfiguration,
        ctx: SessionContext,
        changes: mpsc::Receiver<RawChange>,
    ) -> Result<SessionHandle, SyncError> {
        Self::spawn(config, ctx, changes, None)
    }

    fn spawn(
        config: WatchConfiguration,
        ctx: SessionContext,
        raw_rx: mpsc::Receiver<RawChange>,
        source: Option<FsWatchSource>,
    ) -> Result<SessionHandle, SyncError> {
        let filter = ExtensionFilter::new(&config.extensions)?;
        let trigger = DebounceTrigger::new(filter, config.quiet_period);

        let cancel = CancellationToken::new();
        let (completed, _) = broadcast::channel(COMPLETED_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(TriggerState::Idle);
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let session = SessionLoop {
            config,
            trigger,
            ctx,
            raw_rx,
            control_tx,
            control_rx,
            cancel: cancel.clone(),
            completed: completed.clone(),
            state: state_tx,
            source,
        };
        let task = tokio::spawn(session.run());

        Ok(SessionHandle {
            cancel,
            completed,
            state: state_rx,
            task,
        })
    }
}

pub struct SessionHandle {
    cancel: CancellationToken,
    completed: broadcast::Sender<SyncCompleted>,
    state: watch::Receiver<TriggerState>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// One message per finished sync, successful or not.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncCompleted> {
        self.completed.subscribe()
    }

    pub fn state(&self) -> TriggerState {
        *self.state.borrow()
    }

    /// Cancels any pending quiet period and stops watching. A sync already
    /// in flight runs to completion and is still reported.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the session task has exited.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    pub async fn stop_and_wait(self) {
        self.stop();
        self.join().await;
    }
}

struct SessionLoop {
    config: WatchConfiguration,
    trigger: DebounceTrigger,
    ctx: SessionContext,
    raw_rx: mpsc::Receiver<RawChange>,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    /// Paths with a readiness probe outstanding.
    cancel: CancellationToken,
    completed: broadcast::Sender<SyncCompleted>,
    state: watch::Sender<TriggerState>,
    source: Option<FsWatchSource>,
}

impl SessionLoop {
    async fn run(mut self) {
        loop {
            let stopped = self.trigger.is_stopped();
            let deadline = self.trigger.deadline();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !stopped => {
                    self.trigger.stop();
                    // Dropping the source ends the OS watch.
                    self.source = None;
                    self.raw_rx.close();
                    if !self.trigger.run_state().sync_in_flight {
                        break;
                    }
                }
                Some(msg) = self.control_rx.recv() => {
                    let finished_sync = matches!(msg, Control::Done(_));
                    self.handle_control(msg);
                    if finished_sync && self.trigger.is_stopped() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() && !stopped => {
                    self.fire();
                }
                Some(change) = self.raw_rx.recv(), if !stopped => {
                    self.handle_raw(change);
                }
                else => break,
            }

            self.state.send_replace(self.trigger.state());
        }

        self.state.send_replace(self.trigger.state());
    }

    fn handle_raw(&mut self, change: RawChange) {
        if !self.trigger.accepts(&change.path) {
            return;
        }

        if self.trigger.run_state().sync_in_flight {
            self.ctx.log.info(
                LogCategory::IgnoredInFlight,
                &format!("Ignored {} (sync in flight)", change.path.display()),
            );
            return;
        }

        let readiness = Arc::clone(&self.ctx.readiness);
        let tx = self.control_tx.clone();
        let path = change.path;
        tokio::spawn(async move {
            let ready = readiness.is_ready(&path).await;
            let _ = tx.send(Control::Ready { path, ready });
        });
    }

    fn handle_control(&mut self, msg: Control) {
        match msg {
            Control::Ready { path, ready } => {
                if ready {
                    self.on_ready(path);
                } else if !self.trigger.is_stopped() {
                    let err = SyncError::ReadinessTimeout { path };
                    self.ctx.log.warn(LogCategory::ReadinessTimeout, &err.to_string());
                }
            }
            Control::Done(done) => self.on_done(done),
        }
    }

    fn on_ready(&mut self, path: PathBuf) {
        let shown = path.display().to_string();
        match self.trigger.on_change(path, Instant::now()) {
            ChangeOutcome::Armed => {
                self.ctx.log.info(LogCategory::Armed, &format!("Armed by {shown}"));
            }
            ChangeOutcome::Rearmed => {
                self.ctx.log.info(LogCategory::Armed, &format!("Re-armed by {shown}"));
            }
            ChangeOutcome::IgnoredInFlight => {
                self.ctx.log.info(
                    LogCategory::IgnoredInFlight,
                    &format!("Ignored {shown} (sync in flight)"),
                );
            }
            ChangeOutcome::Filtered | ChangeOutcome::Stopped => {}
        }
    }

    fn fire(&mut self) {
        let Some(action) = self.trigger.on_timer_fire(Instant::now()) else {
            return;
        };

        if let Some(candidate) = &action.candidate {
            self.ctx.log.info(
                LogCategory::Fired,
                &format!("Detected file: {}", candidate.display()),
            );
        }
        self.ctx.log.info(LogCategory::Fired, "Trigger rclone");

        let invoker = Arc::clone(&self.ctx.invoker);
        let request = self.config.sync_request(self.ctx.rclone_log.clone());
        let tx = self.control_tx.clone();
        let candidate = action.candidate;

        tokio::spawn(async move {
            // The inner task isolates panics so the loop always hears back.
            let run = tokio::spawn(async move { invoker.copy(&request).await });
            let done = match run.await {
                Ok(result) => SyncCompleted::from_result(result, candidate),
                Err(e) => SyncCompleted {
                    exit_status: None,
                    log_text: format!("sync task failed: {e}"),
                    candidate,
                },
            };
            let _ = tx.send(Control::Done(done));
        });
    }

    fn on_done(&mut self, done: SyncCompleted) {
        self.trigger.on_invocation_done();

        match done.exit_status {
            Some(0) => {
                self.ctx.log.info(LogCategory::SyncResult, "Rclone exit code: 0");
                self.ctx.log.info(LogCategory::SyncResult, "Rclone finished");
            }
            Some(code) => {
                self.ctx.log.error(
                    LogCategory::SyncResult,
                    &format!("Rclone exit code: {code}: {}", done.log_text),
                );
            }
            None => {
                self.ctx
                    .log
                    .error(LogCategory::SyncResult, &format!("ERROR: {}", done.log_text));
            }
        }

        // No subscribers is fine.
        let _ = self.completed.send(done);
    }
}
