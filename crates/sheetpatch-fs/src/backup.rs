use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tempfile::NamedTempFile;

use crate::atomic::sync_parent_dir;

/// Collision suffixes tried before giving up on a single timestamp.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// A persisted copy of the original workbook bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// Where the copy lives; handed back to callers as a reference string.
    pub location: String,
    pub created_at: NaiveDateTime,
    pub size: usize,
}

/// Durable storage for pre-mutation copies.
pub trait BackupStore {
    /// Persist `bytes` under a name derived from `source_name`. Never overwrites an
    /// existing backup.
    fn store(&self, source_name: &str, bytes: &[u8]) -> io::Result<BackupRecord>;
}

impl<T: BackupStore + ?Sized> BackupStore for &T {
    fn store(&self, source_name: &str, bytes: &[u8]) -> io::Result<BackupRecord> {
        (**self).store(source_name, bytes)
    }
}

/// `<stem>_BACKUP_<YYYYmmdd_HHMMSS>[_n].<ext>`.
pub fn backup_file_name(source_name: &str, timestamp: NaiveDateTime, attempt: u32) -> String {
    let file_name = Path::new(source_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(source_name);
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    let stem = if stem.is_empty() { "workbook" } else { stem };

    let mut name = format!("{stem}_BACKUP_{}", timestamp.format("%Y%m%d_%H%M%S"));
    if attempt > 0 {
        name.push_str(&format!("_{attempt}"));
    }
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Writes backups into one directory.
#[derive(Debug, Clone)]
pub struct DirectoryBackupStore {
    dir: PathBuf,
}

impl DirectoryBackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Like [`BackupStore::store`] with an explicit timestamp.
    pub fn store_at(
        &self,
        source_name: &str,
        bytes: &[u8],
        timestamp: NaiveDateTime,
    ) -> io::Result<BackupRecord> {
        fs::create_dir_all(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file_mut().flush()?;
        tmp.as_file().sync_all()?;

        let mut attempt = 0;
        let path = loop {
            let candidate = self.dir.join(backup_file_name(source_name, timestamp, attempt));
            match tmp.persist_noclobber(&candidate) {
                Ok(_) => break candidate,
                Err(err)
                    if err.error.kind() == io::ErrorKind::AlreadyExists
                        && attempt < MAX_NAME_ATTEMPTS =>
                {
                    tmp = err.file;
                    attempt += 1;
                }
                Err(err) => return Err(err.error),
            }
        };
        let _ = sync_parent_dir(&path);

        log::info!("created backup {} ({} bytes)", path.display(), bytes.len());
        Ok(BackupRecord {
            location: path.to_string_lossy().into_owned(),
            created_at: timestamp,
            size: bytes.len(),
        })
    }
}

impl BackupStore for DirectoryBackupStore {
    fn store(&self, source_name: &str, bytes: &[u8]) -> io::Result<BackupRecord> {
        self.store_at(source_name, bytes, Local::now().naive_local())
    }
}
