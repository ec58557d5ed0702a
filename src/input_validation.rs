//! Validation of the watch settings that come from the config file or CLI.

use anyhow::{bail, Result};
use std::time::Duration;

const MAX_EXTENSIONS: usize = 32;
const MAX_EXTENSION_LENGTH: usize = 16;
const MIN_QUIET_PERIOD: Duration = Duration::from_secs(1);
const MAX_QUIET_PERIOD: Duration = Duration::from_secs(3600);

/// Validate the extension allow-list
///
/// Each entry is a plain extension with an optional leading dot.
pub fn validate_extensions(extensions: &[String]) -> Result<()> {
    if extensions.is_empty() {
        bail!("At least one file extension is required");
    }

    if extensions.len() > MAX_EXTENSIONS {
        bail!(
            "Too many extensions: {} (max: {})",
            extensions.len(),
            MAX_EXTENSIONS
        );
    }

    for ext in extensions {
        let trimmed = ext.trim();
        let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);

        if bare.is_empty() {
            bail!("Extension cannot be empty");
        }

        if bare.len() > MAX_EXTENSION_LENGTH {
            bail!(
                "Extension too long: '{}' (max: {} chars)",
                bare,
                MAX_EXTENSION_LENGTH
            );
        }

        if !bare.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("Extension contains invalid characters: '{}'", trimmed);
        }
    }

    Ok(())
}

pub fn validate_quiet_period(period: Duration) -> Result<()> {
    if period < MIN_QUIET_PERIOD || period > MAX_QUIET_PERIOD {
        bail!(
            "Quiet period must be between {}s and {}s, got {}s",
            MIN_QUIET_PERIOD.as_secs(),
            MAX_QUIET_PERIOD.as_secs(),
            period.as_secs_f64()
        );
    }
    Ok(())
}
