//! Persisted settings and the on-disk layout next to the executable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::input_validation::{validate_extensions, validate_quiet_period};
use crate::path_validation::{validate_backup_path, validate_remote_target};
use crate::sync_engine::{SyncError, SyncRequest};

pub const DEFAULT_QUIET_PERIOD_SECS: u64 = 15;
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_DIR_NAME: &str = "logs";
pub const APP_LOG_NAME: &str = "app.log";
pub const RCLONE_LOG_NAME: &str = "rclone.log";

#[cfg(windows)]
const RCLONE_BINARY_NAME: &str = "rclone.exe";
#[cfg(not(windows))]
const RCLONE_BINARY_NAME: &str = "rclone";

fn default_extensions() -> Vec<String> {
    vec![".bak".to_string(), ".txt".to_string()]
}

fn default_quiet_period_secs() -> u64 {
    DEFAULT_QUIET_PERIOD_SECS
}

/// Settings persisted between runs. Keys are PascalCase so existing
/// `{"BackupPath", "RemotePath", "IgnoreExisting"}` files load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AppConfig {
    #[serde(default)]
    pub backup_path: PathBuf,
    #[serde(default)]
    pub remote_path: String,
    #[serde(default)]
    pub ignore_existing: bool,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_quiet_period_secs")]
    pub quiet_period_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rclone_binary: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup_path: PathBuf::new(),
            remote_path: String::new(),
            ignore_existing: false,
            extensions: default_extensions(),
            quiet_period_secs: DEFAULT_QUIET_PERIOD_SECS,
            rclone_binary: None,
        }
    }
}

/// Immutable for the lifetime of one watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfiguration {
    pub root_path: PathBuf,
    pub remote_target: String,
    pub extensions: Vec<String>,
    pub quiet_period: Duration,
    pub ignore_existing: bool,
}

impl WatchConfiguration {
    pub fn sync_request(&self, log_file: PathBuf) -> SyncRequest {
        SyncRequest {
            source_dir: self.root_path.clone(),
            remote_target: self.remote_target.clone(),
            ignore_existing: self.ignore_existing,
            log_file,
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

impl AppConfig {
    /// Missing file means first run: defaults are returned.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config = if is_yaml(path) {
            serde_yaml::from_str(&text)
                .with_context(|| format!("Invalid YAML config {}", path.display()))?
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON config {}", path.display()))?
        };
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let text = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_secs(self.quiet_period_secs)
    }

    /// Everything a watch needs. Sync-only and test-only paths call the
    /// narrower checks below instead.
    pub fn validate(&self) -> Result<(), SyncError> {
        validate_backup_path(&self.backup_path).map_err(SyncError::InvalidConfig)?;
        self.validate_remote()?;
        validate_extensions(&self.extensions)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        validate_quiet_period(self.quiet_period())
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    pub fn validate_remote(&self) -> Result<(), SyncError> {
        validate_remote_target(&self.remote_path).map_err(SyncError::InvalidConfig)
    }

    pub fn watch_configuration(&self) -> Result<WatchConfiguration, SyncError> {
        self.validate()?;
        Ok(WatchConfiguration {
            root_path: self.backup_path.clone(),
            remote_target: self.remote_path.trim().to_string(),
            extensions: self.extensions.clone(),
            quiet_period: self.quiet_period(),
            ignore_existing: self.ignore_existing,
        })
    }

    /// Explicit setting first, then a binary shipped next to the app, then PATH.
    pub fn resolve_rclone_binary(&self, paths: &AppPaths) -> PathBuf {
        if let Some(binary) = &self.rclone_binary {
            return binary.clone();
        }

        let bundled = paths.bundled_rclone();
        if bundled.is_file() {
            bundled
        } else {
            PathBuf::from(RCLONE_BINARY_NAME)
        }
    }
}

/// Directory layout: `config.json`, `logs/app.log`, `logs/rclone.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    app_dir: PathBuf,
}

impl AppPaths {
    pub fn new(app_dir: PathBuf) -> Self {
        Self { app_dir }
    }

    /// The directory holding the running executable.
    pub fn from_current_exe() -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate executable")?;
        let dir = exe
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow::anyhow!("Executable has no parent directory"))?;
        Ok(Self::new(dir))
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.app_dir.join(CONFIG_FILE_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.app_dir.join(LOG_DIR_NAME)
    }

    pub fn app_log(&self) -> PathBuf {
        self.log_dir().join(APP_LOG_NAME)
    }

    pub fn rclone_log(&self) -> PathBuf {
        self.log_dir().join(RCLONE_LOG_NAME)
    }

    pub fn bundled_rclone(&self) -> PathBuf {
        self.app_dir.join(RCLONE_BINARY_NAME)
    }

    pub fn ensure_log_dir(&self) -> Result<()> {
        std::fs::create_dir_all(self.log_dir())
            .with_context(|| format!("Failed to create {}", self.log_dir().display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.extensions, vec![".bak", ".txt"]);
        assert_eq!(config.quiet_period(), Duration::from_secs(15));
        assert!(!config.ignore_existing);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(&temp.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_three_field_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
  "BackupPath": "D:\\SQLBackup",
  "RemotePath": "gdrive:db",
  "IgnoreExisting": true
}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.backup_path, PathBuf::from("D:\\SQLBackup"));
        assert_eq!(config.remote_path, "gdrive:db");
        assert!(config.ignore_existing);
        assert_eq!(config.extensions, default_extensions());
        assert_eq!(config.quiet_period_secs, DEFAULT_QUIET_PERIOD_SECS);
    }

    #[test]
    fn test_save_and_load_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.json");
        let config = AppConfig {
            backup_path: temp.path().to_path_buf(),
            remote_path: "s3:dumps".to_string(),
            ignore_existing: true,
            extensions: vec![".bak".to_string()],
            quiet_period_secs: 30,
            rclone_binary: Some(PathBuf::from("/usr/bin/rclone")),
        };

        config.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"RemotePath\": \"s3:dumps\""));
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_yaml_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "BackupPath: /var/backups\nRemotePath: \"nas:db\"\nQuietPeriodSecs: 5\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.backup_path, PathBuf::from("/var/backups"));
        assert_eq!(config.quiet_period(), Duration::from_secs(5));
        assert!(!config.ignore_existing);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn test_watch_configuration_requires_valid_settings() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig {
            backup_path: temp.path().to_path_buf(),
            remote_path: "  gdrive:db  ".to_string(),
            ..AppConfig::default()
        };

        let watch = config.watch_configuration().unwrap();
        assert_eq!(watch.root_path, temp.path());
        assert_eq!(watch.remote_target, "gdrive:db");
        assert_eq!(watch.quiet_period, Duration::from_secs(15));

        config.remote_path = " ".to_string();
        assert!(matches!(
            config.watch_configuration(),
            Err(SyncError::InvalidConfig(_))
        ));

        config.remote_path = "gdrive:db".to_string();
        config.backup_path = temp.path().join("missing");
        assert!(config.watch_configuration().is_err());
    }

    #[test]
    fn test_app_paths_layout() {
        let paths = AppPaths::new(PathBuf::from("/opt/syncdb"));
        assert_eq!(paths.config_file(), PathBuf::from("/opt/syncdb/config.json"));
        assert_eq!(paths.app_log(), PathBuf::from("/opt/syncdb/logs/app.log"));
        assert_eq!(paths.rclone_log(), PathBuf::from("/opt/syncdb/logs/rclone.log"));
    }

    #[test]
    fn test_resolve_rclone_binary() {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::new(temp.path().to_path_buf());
        let mut config = AppConfig::default();

        assert_eq!(
            config.resolve_rclone_binary(&paths),
            PathBuf::from(RCLONE_BINARY_NAME)
        );

        std::fs::write(paths.bundled_rclone(), "").unwrap();
        assert_eq!(config.resolve_rclone_binary(&paths), paths.bundled_rclone());

        config.rclone_binary = Some(PathBuf::from("/custom/rclone"));
        assert_eq!(
            config.resolve_rclone_binary(&paths),
            PathBuf::from("/custom/rclone")
        );
    }
}
