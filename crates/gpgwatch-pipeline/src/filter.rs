//! Extension allow-list

use std::collections::HashSet;
use std::path::Path;

use gpgwatch_core::config::normalize_extension;
use gpgwatch_core::domain::{WatchedEntry, ARTIFACT_SUFFIX};

/// Keeps entries whose final suffix is in the allow-set
///
/// With no allow-set every entry is kept. Suffixes are compared
/// case-insensitively and include the dot (`.csv`).
#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    allowed: Option<HashSet<String>>,
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: extensions
                .map(|exts| exts.into_iter().map(|e| normalize_extension(e.as_ref())).collect()),
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn keeps(&self, entry: &WatchedEntry) -> bool {
        match (&self.allowed, entry.extension()) {
            (None, _) => true,
            (Some(allowed), Some(ext)) => allowed.contains(ext),
            (Some(_), None) => false,
        }
    }

    /// Sorted allow-set, for display
    pub fn allowed(&self) -> Option<Vec<&str>> {
        self.allowed.as_ref().map(|set| {
            let mut exts: Vec<&str> = set.iter().map(String::as_str).collect();
            exts.sort_unstable();
            exts
        })
    }
}

/// True for names ending in `.gpg`, i.e. artifacts this process writes
/// into the watched directory
pub fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_lowercase().ends_with(ARTIFACT_SUFFIX))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> WatchedEntry {
        WatchedEntry::new(path)
    }

    #[test]
    fn no_allow_set_keeps_everything() {
        let filter = ExtensionFilter::allow_all();
        assert!(filter.keeps(&entry("/in/report.csv")));
        assert!(filter.keeps(&entry("/in/README")));
        assert!(filter.allowed().is_none());
    }

    #[test]
    fn allow_set_is_case_insensitive() {
        let filter = ExtensionFilter::new(Some(vec![".csv", "TXT"]));
        assert!(filter.keeps(&entry("/in/report.CSV")));
        assert!(filter.keeps(&entry("/in/notes.txt")));
        assert!(!filter.keeps(&entry("/in/photo.jpg")));
        assert_eq!(filter.allowed(), Some(vec![".csv", ".txt"]));
    }

    #[test]
    fn allow_set_matches_final_suffix_only() {
        let filter = ExtensionFilter::new(Some([".gz"]));
        assert!(filter.keeps(&entry("/in/archive.tar.gz")));
        let filter = ExtensionFilter::new(Some([".tar"]));
        assert!(!filter.keeps(&entry("/in/archive.tar.gz")));
    }

    #[test]
    fn allow_set_skips_names_without_suffix() {
        let filter = ExtensionFilter::new(Some([".csv"]));
        assert!(!filter.keeps(&entry("/in/Makefile")));
    }

    #[test]
    fn detects_artifacts() {
        assert!(is_artifact(Path::new("/in/report.csv.gpg")));
        assert!(is_artifact(Path::new("/in/report.csv.1.GPG")));
        assert!(!is_artifact(Path::new("/in/report.csv")));
        assert!(!is_artifact(Path::new("/")));
    }
}
