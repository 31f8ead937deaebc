//! Filesystem helpers with operation + path error context.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// A directory entry seen by [`list_dir`].
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_file: bool,
}

/// List a directory's entries, sorted by name.
///
/// A missing directory yields an empty listing. Names that are not valid
/// UTF-8 are converted lossily.
pub async fn list_dir(path: &Path) -> Result<Vec<DirEntryInfo>> {
    let mut reader = match tokio::fs::read_dir(path).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error("reading directory", path, e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| io_error("reading directory", path, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| io_error("inspecting entry", &entry.path(), e))?;
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            is_file: file_type.is_file(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_dir_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let listing = list_dir(&dir.path().join("absent")).await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_list_dir_reports_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.mp3"), b"x").await.unwrap();
        ensure_dir_all_with_op("creating directory", &dir.path().join("a_sub"))
            .await
            .unwrap();

        let listing = list_dir(dir.path()).await.unwrap();
        let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a_sub", "b.mp3"]);
        assert!(!listing[0].is_file);
        assert!(listing[1].is_file);
    }
}
