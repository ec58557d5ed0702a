use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

use crate::sync_engine::SyncError;

/// Case-insensitive file extension allow-list.
#[derive(Debug, Clone)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
    set: GlobSet,
}

impl ExtensionFilter {
    pub fn new(extensions: &[String]) -> Result<Self, SyncError> {
        let normalized: Vec<String> = extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();

        if normalized.is_empty() {
            return Err(SyncError::InvalidConfig(
                "extension allow-list is empty".to_string(),
            ));
        }

        let mut builder = GlobSetBuilder::new();
        for ext in &normalized {
            let glob = GlobBuilder::new(&format!("*.{ext}"))
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| SyncError::InvalidConfig(format!("extension '{ext}': {e}")))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            extensions: normalized,
            set,
        })
    }

    /// Matches on the file name alone, so directories above it never count.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.set.is_match(Path::new(name)))
            .unwrap_or(false)
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// `".BAK"`, `"bak"` and `" .bak "` all become `"bak"`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(exts: &[&str]) -> ExtensionFilter {
        let owned: Vec<String> = exts.iter().map(|s| s.to_string()).collect();
        ExtensionFilter::new(&owned).unwrap()
    }

    #[test]
    fn test_matches_case_insensitively() {
        let f = filter(&[".bak", ".txt"]);
        assert!(f.matches(Path::new("/backup/db_2024.bak")));
        assert!(f.matches(Path::new("/backup/DB_2024.BAK")));
        assert!(f.matches(Path::new("/backup/nested/notes.Txt")));
    }

    #[test]
    fn test_rejects_other_extensions() {
        let f = filter(&["bak"]);
        assert!(!f.matches(Path::new("/backup/db.bak.tmp")));
        assert!(!f.matches(Path::new("/backup/db.zip")));
        assert!(!f.matches(Path::new("/backup/bak")));
    }

    #[test]
    fn test_directory_named_like_extension_does_not_match() {
        let f = filter(&["bak"]);
        assert!(!f.matches(Path::new("/backup/old.bak/readme.md")));
    }

    #[test]
    fn test_normalizes_input() {
        let f = filter(&[" .BAK ", "Txt"]);
        assert_eq!(f.extensions(), &["bak".to_string(), "txt".to_string()]);
    }

    #[test]
    fn test_empty_allow_list_is_rejected() {
        assert!(ExtensionFilter::new(&[]).is_err());
        assert!(ExtensionFilter::new(&[".".to_string(), "  ".to_string()]).is_err());
    }
}
