//! Filesystem layout of one cache's archive directory: staging files during
//! upload, finalized `<file_hash>.nar.<ext>` files at rest.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use cache_domain::{Error, Result};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Xz,
    Zst,
}

impl Compression {
    pub fn as_ext(self) -> &'static str {
        match self {
            Compression::Xz => "xz",
            Compression::Zst => "zst",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "xz" => Some(Compression::Xz),
            "zst" => Some(Compression::Zst),
            _ => None,
        }
    }
}

/// One cache's archive directory. Wraps the directory containing `key.pub`,
/// `key.priv`, and one file per archive (staged or finalized).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn create_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Find the single directory entry whose filename contains `needle`.
    /// Mirrors the original's linear directory scan; the first match wins
    /// if more than one entry happens to contain the substring.
    fn find_containing(&self, needle: &str) -> Result<Option<PathBuf>> {
        let mut found = None;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().contains(needle) {
                found = Some(entry.path());
                break;
            }
        }
        Ok(found)
    }

    /// Create an empty staging file `<upload_id>.nar.<ext>`.
    pub fn begin_upload(&self, upload_id: Uuid, compression: Compression) -> Result<()> {
        let path = self
            .dir
            .join(format!("{upload_id}.nar.{}", compression.as_ext()));
        OpenOptions::new().create(true).write(true).open(path)?;
        Ok(())
    }

    /// Overwrite the staging file for `upload_id` with `body`.
    pub fn put(&self, upload_id: Uuid, body: &[u8]) -> Result<()> {
        let path = self
            .find_containing(&upload_id.to_string())?
            .ok_or_else(|| Error::BadRequest(format!("no staging file for upload {upload_id}")))?;
        let mut f = OpenOptions::new().write(true).truncate(true).open(path)?;
        f.write_all(body)?;
        Ok(())
    }

    /// Rename the staging file for `upload_id` to `<file_hash>.nar.<ext>`,
    /// preserving the staging file's extension.
    pub fn finalize(&self, upload_id: Uuid, file_hash: &str) -> Result<()> {
        let staged = self
            .find_containing(&upload_id.to_string())?
            .ok_or_else(|| Error::BadRequest(format!("no staging file for upload {upload_id}")))?;
        let ext = staged
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("xz");
        let finalized = self.dir.join(format!("{file_hash}.nar.{ext}"));
        fs::rename(staged, finalized)?;
        Ok(())
    }

    /// Remove the staging file for `upload_id`.
    pub fn abort(&self, upload_id: Uuid) -> Result<()> {
        let staged = self
            .find_containing(&upload_id.to_string())?
            .ok_or_else(|| Error::BadRequest(format!("no staging file for upload {upload_id}")))?;
        fs::remove_file(staged)?;
        Ok(())
    }

    /// Locate the finalized archive for `file_hash` and return its path and
    /// compression extension.
    pub fn find_archive(&self, file_hash: &str) -> Result<Option<(PathBuf, String)>> {
        let Some(path) = self.find_containing(file_hash)? else {
            return Ok(None);
        };
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("xz")
            .to_string();
        Ok(Some((path, ext)))
    }

    /// Remove the store's file (used by `store-path delete`).
    pub fn remove_archive(&self, file_hash: &str) -> Result<()> {
        if let Some((path, _ext)) = self.find_archive(file_hash)? {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_lifecycle_complete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.create_dir().unwrap();

        let upload_id = Uuid::new_v4();
        store.begin_upload(upload_id, Compression::Xz).unwrap();
        store.put(upload_id, b"HELLO").unwrap();
        store.finalize(upload_id, "deadbeef").unwrap();

        let (path, ext) = store.find_archive("deadbeef").unwrap().unwrap();
        assert_eq!(ext, "xz");
        assert_eq!(fs::read(path).unwrap(), b"HELLO");

        // staging file is gone
        assert!(store
            .find_containing(&upload_id.to_string())
            .unwrap()
            .is_none());
    }

    #[test]
    fn upload_lifecycle_abort() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.create_dir().unwrap();

        let upload_id = Uuid::new_v4();
        store.begin_upload(upload_id, Compression::Zst).unwrap();
        store.abort(upload_id).unwrap();

        assert!(store
            .find_containing(&upload_id.to_string())
            .unwrap()
            .is_none());
    }

    #[test]
    fn put_on_unknown_upload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.create_dir().unwrap();
        assert!(store.put(Uuid::new_v4(), b"x").is_err());
    }
}
