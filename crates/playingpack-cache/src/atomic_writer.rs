//! Atomic file writer: write to a temp file, then rename into place.
//!
//! A partial failure never leaves a readable file at the target path —
//! either the rename happens after a successful flush, or the temp file
//! is cleaned up on drop and the final path is untouched.

use crate::error::CacheResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: File,
}

impl AtomicWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let final_path = path.as_ref().to_path_buf();

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = Self::temp_path(&final_path);
        let file = File::create(&temp_path)?;

        Ok(Self {
            temp_path,
            final_path,
            file,
        })
    }

    pub fn write(&mut self, data: &[u8]) -> CacheResult<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    /// Flush, sync, and rename the temp file into place. Consumes self
    /// so a caller cannot accidentally write after committing.
    pub fn commit(mut self) -> CacheResult<()> {
        self.file.sync_all()?;
        self.file.flush()?;

        let temp_path = self.temp_path.clone();
        let final_path = self.final_path.clone();

        // Prevent Drop from deleting the temp file we're about to rename.
        std::mem::forget(self);

        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }

    fn temp_path(final_path: &Path) -> PathBuf {
        let mut temp = final_path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.temp_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_commit_produces_final_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");

        let mut w = AtomicWriter::new(&path).unwrap();
        w.write(b"hello").unwrap();
        w.commit().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/record.json");

        let mut w = AtomicWriter::new(&path).unwrap();
        w.write(b"x").unwrap();
        w.commit().unwrap();

        assert!(path.exists());
    }

    #[test]
    fn drop_without_commit_leaves_no_final_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");

        {
            let mut w = AtomicWriter::new(&path).unwrap();
            w.write(b"should not land").unwrap();
        }

        assert!(!path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn commit_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.json");
        fs::write(&path, b"old").unwrap();

        let mut w = AtomicWriter::new(&path).unwrap();
        w.write(b"new").unwrap();
        w.commit().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }
}
