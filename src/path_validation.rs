use std::path::Path;

/// Maximum allowed path length for security
const MAX_PATH_LENGTH: usize = 4096;

/// The backup directory must exist and be a directory before a watch starts.
pub fn validate_backup_path(path: &Path) -> Result<(), String> {
    let raw = path.to_string_lossy();

    if raw.trim().is_empty() {
        return Err("Backup path is empty".to_string());
    }

    if raw.len() > MAX_PATH_LENGTH {
        return Err(format!("Path too long (max {MAX_PATH_LENGTH} bytes)"));
    }

    if raw.bytes().any(|b| b == 0) {
        return Err("Path contains null bytes".to_string());
    }

    if !path.exists() {
        return Err(format!("Backup path does not exist: {}", path.display()));
    }

    if !path.is_dir() {
        return Err(format!("Backup path is not a directory: {}", path.display()));
    }

    Ok(())
}

/// Validate an rclone remote such as `gdrive:backups/db`.
///
/// The value ends up as a single process argument, but it is still rejected
/// if it carries anything that would be dangerous on a shell command line.
pub fn validate_remote_target(remote: &str) -> Result<(), String> {
    let trimmed = remote.trim();

    if trimmed.is_empty() {
        return Err("Remote path must not be empty".to_string());
    }

    if trimmed.len() > MAX_PATH_LENGTH {
        return Err(format!("Remote path too long (max {MAX_PATH_LENGTH} bytes)"));
    }

    if trimmed.contains('\0') || trimmed.contains('\n') || trimmed.contains('\r') {
        return Err("Remote path contains control characters".to_string());
    }

    if trimmed.contains('|')
        || trimmed.contains('&')
        || trimmed.contains(';')
        || trimmed.contains('$')
        || trimmed.contains('`')
    {
        return Err("Remote path contains shell metacharacters".to_string());
    }

    Ok(())
}
