use crate::sync_engine::types::{ConnectivityReport, SyncError, SyncOutcome, SyncRequest};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default bound for `rclone lsd` during a connection test.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The external one-way copy tool, seen from the watch session.
#[async_trait]
pub trait SyncInvoker: Send + Sync {
    /// Copies the whole source directory to the remote. `Ok` only on exit status 0.
    async fn copy(&self, req: &SyncRequest) -> Result<SyncOutcome, SyncError>;

    /// Lists the remote's top-level directories, killing the tool after `timeout`.
    async fn test_connection(
        &self,
        remote: &str,
        timeout: Duration,
    ) -> Result<ConnectivityReport, SyncError>;
}

pub struct RcloneEngine {
    binary: PathBuf,
    working_dir: Option<PathBuf>,
}

impl RcloneEngine {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary, working_dir: None }
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    fn command(&self) -> Result<Command, SyncError> {
        // A bare name such as "rclone" is resolved through PATH at spawn time.
        if self.binary.components().count() > 1 && !self.binary.is_file() {
            return Err(SyncError::LaunchFailed {
                binary: self.binary.clone(),
                reason: "binary not found".to_string(),
            });
        }

        let mut cmd = Command::new(&self.binary);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        Ok(cmd)
    }

    fn launch_failed(&self, e: std::io::Error) -> SyncError {
        SyncError::LaunchFailed {
            binary: self.binary.clone(),
            reason: e.to_string(),
        }
    }

    async fn append_run_header(&self, log_file: &Path) -> Result<(), SyncError> {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .await?;
        file.write_all(run_header(chrono::Local::now()).as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncInvoker for RcloneEngine {
    async fn copy(&self, req: &SyncRequest) -> Result<SyncOutcome, SyncError> {
        let mut cmd = self.command()?;
        self.append_run_header(&req.log_file).await?;

        let output = cmd
            .args(build_copy_args(req))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.launch_failed(e))?;

        outcome_from_output(output)
    }

    async fn test_connection(
        &self,
        remote: &str,
        timeout: Duration,
    ) -> Result<ConnectivityReport, SyncError> {
        let child = self
            .command()?
            .arg("lsd")
            .arg(remote)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.launch_failed(e))?;

        // On timeout the future is dropped together with the child, and
        // kill_on_drop terminates the process.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| SyncError::Timeout { after: timeout })??;

        Ok(ConnectivityReport {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// `copy <source> <remote> [--ignore-existing] --log-file=<log> --log-level INFO`
pub fn build_copy_args(req: &SyncRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "copy".into(),
        req.source_dir.clone().into_os_string(),
        req.remote_target.clone().into(),
    ];

    if req.ignore_existing {
        args.push("--ignore-existing".into());
    }

    let mut log_arg = OsString::from("--log-file=");
    log_arg.push(&req.log_file);
    args.push(log_arg);
    args.push("--log-level".into());
    args.push("INFO".into());
    args
}

pub fn run_header<Tz>(at: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("\n===== RUN {} =====\n", at.format("%Y-%m-%d %H:%M:%S"))
}

fn outcome_from_output(output: Output) -> Result<SyncOutcome, SyncError> {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    match output.status.code() {
        Some(0) => Ok(SyncOutcome { exit_status: 0, log_text: String::new() }),
        Some(status) => Err(SyncError::NonZeroExit { status, stderr }),
        // Terminated by a signal.
        None => Err(SyncError::NonZeroExit { status: -1, stderr }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn request(dir: &Path, ignore_existing: bool) -> SyncRequest {
        SyncRequest {
            source_dir: dir.join("backup"),
            remote_target: "gdrive:db".to_string(),
            ignore_existing,
            log_file: dir.join("logs").join("rclone.log"),
        }
    }

    #[test]
    fn test_build_copy_args() {
        let req = SyncRequest {
            source_dir: PathBuf::from("/data/backup"),
            remote_target: "remote:dumps".to_string(),
            ignore_existing: true,
            log_file: PathBuf::from("/app/logs/rclone.log"),
        };

        let args: Vec<String> = build_copy_args(&req)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "copy",
                "/data/backup",
                "remote:dumps",
                "--ignore-existing",
                "--log-file=/app/logs/rclone.log",
                "--log-level",
                "INFO",
            ]
        );
    }

    #[test]
    fn test_build_copy_args_without_ignore_existing() {
        let req = SyncRequest {
            source_dir: PathBuf::from("/data/backup"),
            remote_target: "remote:dumps".to_string(),
            ignore_existing: false,
            log_file: PathBuf::from("/app/logs/rclone.log"),
        };
        let args = build_copy_args(&req);
        assert!(!args.iter().any(|a| a == "--ignore-existing"));
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn test_run_header_format() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(run_header(at), "\n===== RUN 2024-03-09 07:05:01 =====\n");
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let temp = TempDir::new().unwrap();
        let engine = RcloneEngine::new(temp.path().join("missing").join("rclone"));

        let err = engine.copy(&request(temp.path(), false)).await.unwrap_err();
        assert!(matches!(err, SyncError::LaunchFailed { .. }));

        let err = engine
            .test_connection("remote:", DEFAULT_TEST_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::LaunchFailed { .. }));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_rclone(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("rclone");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_copy_success_writes_run_header() {
            let temp = TempDir::new().unwrap();
            let engine = RcloneEngine::new(fake_rclone(temp.path(), "exit 0"));
            let req = request(temp.path(), true);

            let outcome = engine.copy(&req).await.unwrap();
            assert_eq!(outcome, SyncOutcome { exit_status: 0, log_text: String::new() });

            let log = std::fs::read_to_string(&req.log_file).unwrap();
            assert!(log.contains("===== RUN "));
        }

        #[tokio::test]
        async fn test_copy_non_zero_exit_captures_stderr() {
            let temp = TempDir::new().unwrap();
            let engine = RcloneEngine::new(fake_rclone(
                temp.path(),
                "echo \"didn't find section in config file\" >&2\nexit 3",
            ));

            let err = engine.copy(&request(temp.path(), false)).await.unwrap_err();
            match err {
                SyncError::NonZeroExit { status, stderr } => {
                    assert_eq!(status, 3);
                    assert!(stderr.contains("section in config file"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_connection_reports_stdout() {
            let temp = TempDir::new().unwrap();
            let engine = RcloneEngine::new(fake_rclone(
                temp.path(),
                "echo \"          -1 2024-01-01 00:00:00        -1 $2\"",
            ));

            let report = engine
                .test_connection("remote:dumps", DEFAULT_TEST_TIMEOUT)
                .await
                .unwrap();
            assert!(report.is_success());
            assert!(report.stdout.contains("remote:dumps"));
            assert!(report.stderr.is_empty());
        }

        #[tokio::test]
        async fn test_connection_times_out() {
            let temp = TempDir::new().unwrap();
            let engine = RcloneEngine::new(fake_rclone(temp.path(), "sleep 5"));

            let err = engine
                .test_connection("remote:", Duration::from_millis(200))
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::Timeout { .. }));
        }
    }
}
