// File: src/persistence.rs
//! Atomic cache and output writes.
//!
//! Every writer stages into a temporary file next to the destination and
//! renames it into place, so an aborted run never leaves a half-written
//! cache behind.

use crate::error::{AlignError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Stages `write` into a temp file in the destination directory, then
/// renames it over `path`.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&NamedTempFile>) -> Result<()>,
{
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir).map_err(|e| AlignError::io(parent_dir, e))?;

    let temp_file = NamedTempFile::new_in(parent_dir).map_err(|e| AlignError::io(parent_dir, e))?;
    {
        let mut writer = BufWriter::new(&temp_file);
        write(&mut writer)?;
        writer.flush().map_err(|e| AlignError::io(path, e))?;
    }
    temp_file.persist(path).map_err(|e| AlignError::io(path, e.error))?;
    Ok(())
}

pub fn save_bincode<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    write_atomic(path, |writer| {
        bincode::serialize_into(writer, value)?;
        Ok(())
    })
}

pub fn load_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| AlignError::io(path, e))?;
    let reader = BufReader::new(file);
    Ok(bincode::deserialize_from(reader)?)
}

pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    write_atomic(path, |writer| {
        serde_json::to_writer_pretty(writer, value)?;
        Ok(())
    })
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| AlignError::io(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Exclusive right to write one cache entry.
///
/// Backed by a `<entry>.lock` file created with `create_new` and holding
/// the writer's PID; a second writer for the same entry gets `CacheBusy`.
/// The lock file is removed on drop. A run killed before drop leaves the
/// lock behind; `break_stale` removes such a leftover before acquiring.
#[derive(Debug)]
pub struct WriteLease {
    lock_path: PathBuf,
}

impl WriteLease {
    pub fn acquire(entry: &Path, break_stale: bool) -> Result<Self> {
        let mut lock_name = entry.as_os_str().to_owned();
        lock_name.push(".lock");
        let lock_path = PathBuf::from(lock_name);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| AlignError::io(parent, e))?;
        }
        if break_stale && lock_path.exists() {
            let holder = fs::read_to_string(&lock_path).unwrap_or_default();
            tracing::warn!(
                "Breaking leftover lease {} (pid {})",
                lock_path.display(),
                holder.trim()
            );
            fs::remove_file(&lock_path).map_err(|e| AlignError::io(&lock_path, e))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                let lease = Self { lock_path };
                writeln!(file, "{}", std::process::id()).map_err(|e| AlignError::io(&lease.lock_path, e))?;
                Ok(lease)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(AlignError::CacheBusy {
                path: entry.to_path_buf(),
                lock: lock_path,
            }),
            Err(e) => Err(AlignError::io(&lock_path, e)),
        }
    }
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!("Failed to release lease {}: {}", self.lock_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn bincode_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.bin");
        let mut value = BTreeMap::new();
        value.insert("dog".to_string(), vec![1u32, 4, 9]);
        save_bincode(&value, &path).unwrap();
        let loaded: BTreeMap<String, Vec<u32>> = load_bincode(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        save_json(&vec![1, 2, 3], &path).unwrap();

        let result = write_atomic(&path, |_| Err(AlignError::Config("boom".into())));
        assert!(result.is_err());
        let loaded: Vec<i32> = load_json(&path).unwrap();
        assert_eq!(loaded, vec![1, 2, 3]);
    }

    #[test]
    fn second_lease_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("index.bin");
        let lease = WriteLease::acquire(&entry, false).unwrap();
        assert!(matches!(WriteLease::acquire(&entry, false), Err(AlignError::CacheBusy { .. })));
        drop(lease);
        assert!(WriteLease::acquire(&entry, false).is_ok());
    }

    #[test]
    fn leftover_lock_names_itself_and_breaks_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("index.bin");
        let lock = dir.path().join("index.bin.lock");
        fs::write(&lock, "4242\n").unwrap();

        let err = WriteLease::acquire(&entry, false).unwrap_err();
        assert!(matches!(&err, AlignError::CacheBusy { lock: l, .. } if *l == lock));
        assert!(err.to_string().contains("index.bin.lock"));

        let lease = WriteLease::acquire(&entry, true).unwrap();
        let pid = fs::read_to_string(&lock).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
        drop(lease);
        assert!(!lock.exists());
    }
}
