//! Atomic write operations and file read helpers.
//!
//! Persisted artifacts (state files, snapshots) are staged to a sibling
//! temp file and renamed into place, so a crash mid-write never leaves a
//! torn file behind.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Write data atomically: stage to `<path>.tmp`, flush to disk, rename
/// over the target, then sync the parent directory entry.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let staged = path.with_extension("tmp");

    {
        let mut file = File::create(&staged)
            .with_context(|| format!("cannot stage {}", staged.display()))?;
        file.write_all(data)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("cannot flush {}", staged.display()))?;
    }

    fs::rename(&staged, path).with_context(|| {
        format!("cannot move {} into place at {}", staged.display(), path.display())
    })?;

    // The rename is only durable once the directory entry itself is synced.
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        File::open(dir)
            .and_then(|handle| handle.sync_all())
            .with_context(|| format!("cannot sync directory {}", dir.display()))?;
    }

    Ok(())
}

/// Read a file into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("cannot read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_round_trip() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("state.json");

        let data = b"{\"k\": 1}";
        write_atomic(&target, data).unwrap();

        let read_back = read_file(&target).unwrap();
        assert_eq!(data, &read_back[..]);

        // No stray temp file left behind.
        assert!(!temp.path().join("state.tmp").exists());
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("state.json");

        write_atomic(&target, b"old").unwrap();
        write_atomic(&target, b"new").unwrap();

        assert_eq!(read_file(&target).unwrap(), b"new");
    }

    #[test]
    fn test_read_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        assert!(read_file(&temp.path().join("absent.json")).is_err());
    }
}
