//! GC sweep by file age (component C, hourly per cache with `retention > 0`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use cache_domain::Result;

const SECONDS_PER_WEEK: f64 = 7.0 * 86_400.0;

/// The original computes `age_weeks = (ctime - now) / 604800`, which is
/// always negative and therefore never exceeds a positive retention — the
/// sweep silently collects nothing. `Corrected` flips the subtraction so
/// files actually age out; `AsIs` reproduces the original formula verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcAgeSign {
    AsIs,
    #[default]
    Corrected,
}

#[cfg(unix)]
fn file_ctime_secs(meta: &fs::Metadata) -> f64 {
    use std::os::unix::fs::MetadataExt;
    meta.ctime() as f64
}

#[cfg(not(unix))]
fn file_ctime_secs(meta: &fs::Metadata) -> f64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Sweep `dir`, removing every file (other than `key.pub`/`key.priv`) whose
/// age in weeks exceeds `retention_weeks`. Returns the removed paths.
pub fn sweep(dir: &Path, retention_weeks: i64, sign: GcAgeSign) -> Result<Vec<PathBuf>> {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    let mut removed = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == "key.pub" || name == "key.priv" {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let ctime = file_ctime_secs(&meta);
        let age_weeks = match sign {
            GcAgeSign::AsIs => (ctime - now) / SECONDS_PER_WEEK,
            GcAgeSign::Corrected => (now - ctime) / SECONDS_PER_WEEK,
        };
        if age_weeks > retention_weeks as f64 {
            fs::remove_file(entry.path())?;
            removed.push(entry.path());
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn as_is_never_collects() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("x.nar.xz")).unwrap();
        let removed = sweep(dir.path(), 0, GcAgeSign::AsIs).unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn corrected_spares_key_files() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("key.pub")).unwrap();
        File::create(dir.path().join("key.priv")).unwrap();
        let removed = sweep(dir.path(), -1, GcAgeSign::Corrected).unwrap();
        assert!(removed.is_empty());
        assert!(dir.path().join("key.pub").exists());
    }

    #[test]
    fn corrected_collects_with_negative_retention() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("old.nar.xz")).unwrap();
        // retention of -1 would mean "never expire" at the cache level;
        // the sweep itself just compares weeks, so a deeply negative
        // threshold here stands in for "anything with age > threshold".
        let removed = sweep(dir.path(), -1_000_000, GcAgeSign::Corrected).unwrap();
        assert_eq!(removed.len(), 1);
    }
}
