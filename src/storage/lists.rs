//! Newline-delimited identifier lists.

use super::{write_atomic, StorageError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read one identifier per line. Surrounding whitespace is stripped and
/// blank lines are skipped.
pub fn read_list(path: &Path) -> Result<Vec<String>, StorageError> {
    let raw = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Write a list, overwriting any existing file.
pub fn write_list<S: AsRef<str>>(path: &Path, items: &[S]) -> Result<(), StorageError> {
    let mut body = String::new();
    for item in items {
        body.push_str(item.as_ref());
        body.push('\n');
    }
    write_atomic(path, body.as_bytes())
}

/// Merge `items` into the list at `path` as a set union.
///
/// Creates the file if missing. Merging the same items twice leaves the file
/// unchanged. Returns the number of entries after the merge.
pub fn append_merge<S: AsRef<str>>(path: &Path, items: &[S]) -> Result<usize, StorageError> {
    let mut merged: BTreeSet<String> = if path.exists() {
        read_list(path)?.into_iter().collect()
    } else {
        BTreeSet::new()
    };
    let before = merged.len();
    merged.extend(items.iter().map(|s| s.as_ref().to_string()));

    let entries: Vec<String> = merged.into_iter().collect();
    write_list(path, &entries)?;
    debug!(
        path = %path.display(),
        added = entries.len() - before,
        total = entries.len(),
        "List merged"
    );
    Ok(entries.len())
}

/// Done/error list files of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeLists {
    pub done: PathBuf,
    pub errors: PathBuf,
}

impl OutcomeLists {
    pub fn new(done: impl Into<PathBuf>, errors: impl Into<PathBuf>) -> Self {
        Self {
            done: done.into(),
            errors: errors.into(),
        }
    }

    /// Append-merge the outcome of a run into both lists.
    pub fn record<S: AsRef<str>>(&self, done: &[S], errors: &[S]) -> Result<(), StorageError> {
        let done_total = append_merge(&self.done, done)?;
        let error_total = append_merge(&self.errors, errors)?;
        info!(
            done_list = %self.done.display(),
            error_list = %self.errors.display(),
            done_total,
            error_total,
            "Outcome lists updated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_list_strips_blank_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("units.txt");
        std::fs::write(&path, "a.ar3\n\n  b.ar3  \nc.ar4").unwrap();
        assert_eq!(read_list(&path).unwrap(), vec!["a.ar3", "b.ar3", "c.ar4"]);
    }

    #[test]
    fn test_append_merge_is_idempotent_union() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("done.txt");

        assert_eq!(append_merge(&path, &["b", "a"]).unwrap(), 2);
        assert_eq!(append_merge(&path, &["c", "a"]).unwrap(), 3);
        assert_eq!(append_merge(&path, &["c", "a"]).unwrap(), 3);
        assert_eq!(read_list(&path).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_append_merge_creates_parent_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lists").join("errors.txt");
        append_merge::<&str>(&path, &[]).unwrap();
        assert!(path.exists());
        assert!(read_list(&path).unwrap().is_empty());
    }

    #[test]
    fn test_outcome_lists_record() {
        let tmp = tempfile::tempdir().unwrap();
        let lists = OutcomeLists::new(tmp.path().join("done"), tmp.path().join("err"));
        lists.record(&["u1".to_string()], &["u2".to_string()]).unwrap();
        lists.record(&["u3".to_string()], &[]).unwrap();

        assert_eq!(read_list(&lists.done).unwrap(), vec!["u1", "u3"]);
        assert_eq!(read_list(&lists.errors).unwrap(), vec!["u2"]);
    }
}
