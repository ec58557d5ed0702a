use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Default maximum number of log lines to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    App,
    Config,
    Armed,
    Fired,
    IgnoredInFlight,
    ReadinessTimeout,
    SyncResult,
    ConnectionTest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: String,
    pub level: String,
    pub category: LogCategory,
    pub message: String,
}

impl LogEntry {
    /// `yyyy-MM-dd HH:mm:ss  [level] message`, the line written to `app.log`.
    pub fn to_line(&self) -> String {
        format!("{}  [{}] {}", self.timestamp, self.level, self.message)
    }
}

/// Append-only application log: an in-memory ring buffer plus an optional
/// text file. Writing never fails from the caller's point of view.
pub struct LogManager {
    system_logs: Arc<Mutex<VecDeque<LogEntry>>>,
    max_lines: usize,
    file: Option<PathBuf>,
    echo_stderr: bool,
}

impl LogManager {
    pub fn new(max_lines: usize) -> Self {
        Self {
            system_logs: Arc::new(Mutex::new(VecDeque::with_capacity(max_lines.min(1024)))),
            max_lines,
            file: None,
            echo_stderr: false,
        }
    }

    /// Also appends every entry to `path`, creating parent directories.
    pub fn with_file(mut self, path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        self.file = Some(path);
        self
    }

    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.echo_stderr = enabled;
        self
    }

    fn logs(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panic while holding the lock leaves the buffer itself intact.
        self.system_logs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn log(&self, level: &str, category: LogCategory, message: &str) {
        let now = chrono::Local::now();
        let entry = LogEntry {
            id: now.to_rfc3339(),
            timestamp: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            level: level.to_string(),
            category,
            message: message.to_string(),
        };

        let line = entry.to_line();
        if let Some(path) = &self.file {
            let _ = append_line(path, &line);
        }
        if self.echo_stderr {
            eprintln!("{line}");
        }

        let mut logs = self.logs();
        logs.push_back(entry); // Add to end

        // Remove from front if full
        while logs.len() > self.max_lines {
            logs.pop_front();
        }
    }

    pub fn info(&self, category: LogCategory, message: &str) {
        self.log("info", category, message);
    }

    pub fn warn(&self, category: LogCategory, message: &str) {
        self.log("warning", category, message);
    }

    pub fn error(&self, category: LogCategory, message: &str) {
        self.log("error", category, message);
    }

    pub fn get_logs(&self, category: Option<LogCategory>) -> Vec<LogEntry> {
        let logs = self.logs();
        match category {
            Some(c) => logs.iter().filter(|l| l.category == c).cloned().collect(),
            None => logs.iter().cloned().collect(),
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_manager_new() {
        let manager = LogManager::new(100);
        assert_eq!(manager.system_logs.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_log_manager_log() {
        let manager = LogManager::new(10);

        manager.info(LogCategory::App, "App started");
        assert_eq!(manager.system_logs.lock().unwrap().len(), 1);

        manager.warn(LogCategory::ReadinessTimeout, "file never settled");
        assert_eq!(manager.system_logs.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_log_manager_rotation() {
        let manager = LogManager::new(3);

        for i in 0..5 {
            manager.info(LogCategory::App, &format!("message {}", i));
        }

        let logs = manager.get_logs(None);
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "message 2");
        assert_eq!(logs[2].message, "message 4");
    }

    #[test]
    fn test_log_manager_get_logs_by_category() {
        let manager = LogManager::new(10);

        manager.info(LogCategory::Armed, "armed");
        manager.info(LogCategory::Fired, "fired");
        manager.info(LogCategory::Armed, "re-armed");

        assert_eq!(manager.get_logs(None).len(), 3);
        assert_eq!(manager.get_logs(Some(LogCategory::Armed)).len(), 2);
        assert!(manager.get_logs(Some(LogCategory::SyncResult)).is_empty());
    }

    #[test]
    fn test_log_manager_appends_to_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("logs").join("app.log");
        let manager = LogManager::new(10).with_file(path.clone());

        manager.info(LogCategory::App, "Watcher STARTED");
        manager.error(LogCategory::SyncResult, "Rclone exit code: 1");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  [info] Watcher STARTED"));
        assert!(lines[1].ends_with("  [error] Rclone exit code: 1"));
        // "yyyy-MM-dd HH:mm:ss"
        assert_eq!(lines[0].find("  ["), Some(19));
    }

    #[test]
    fn test_unwritable_file_does_not_panic() {
        let temp = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let manager = LogManager::new(10).with_file(temp.path().to_path_buf());
        manager.info(LogCategory::App, "still logged in memory");
        assert_eq!(manager.get_logs(None).len(), 1);
    }

    #[test]
    fn test_default_max_log_lines() {
        assert_eq!(DEFAULT_MAX_LOG_LINES, 10000);
    }
}
