//! Durable-storage helpers for workbook updates.
//!
//! - [`atomic_write_bytes`]: write through a temp file in the destination directory,
//!   flush + `sync_all`, then rename into place.
//! - [`DirectoryBackupStore`]: timestamped, never-overwritten copies of the original
//!   workbook bytes, taken before any mutation.

mod atomic;
mod backup;

pub use atomic::atomic_write_bytes;
pub use backup::{backup_file_name, BackupRecord, BackupStore, DirectoryBackupStore};
