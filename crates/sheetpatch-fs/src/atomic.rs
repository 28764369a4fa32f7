use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// `Path::parent` is `Some("")` for bare file names; treat that as `.`.
pub(crate) fn parent_dir_or_dot(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Replace `dest` with `bytes` without ever exposing a partially written workbook.
///
/// The bytes go to a temp file next to `dest`, are flushed and synced, then renamed
/// over `dest`. On any error the temp file is dropped and `dest` keeps its old content.
pub fn atomic_write_bytes(dest: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    let tmp_path = tmp.into_temp_path();
    replace_file(&tmp_path, dest)?;
    // Already renamed; the temp path no longer exists.
    let _ = tmp_path.keep();
    let _ = sync_parent_dir(dest);
    log::debug!("wrote {} ({} bytes)", dest.display(), bytes.len());
    Ok(())
}

pub(crate) fn sync_parent_dir(path: &Path) -> io::Result<()> {
    File::open(parent_dir_or_dot(path))?.sync_all()
}

fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt as _;
        use windows_sys::Win32::Storage::FileSystem::{MoveFileExW, MOVEFILE_REPLACE_EXISTING};

        fn to_wide_null(path: &Path) -> Vec<u16> {
            let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
            wide.push(0);
            wide
        }

        let from_w = to_wide_null(from);
        let to_w = to_wide_null(to);
        let ok = unsafe { MoveFileExW(from_w.as_ptr(), to_w.as_ptr(), MOVEFILE_REPLACE_EXISTING) };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_existing_destination() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("report.xlsm");
        std::fs::write(&dest, b"old").expect("seed");

        atomic_write_bytes(&dest, b"new").expect("atomic write");
        assert_eq!(std::fs::read(&dest).expect("read"), b"new");
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("report.xlsx");
        atomic_write_bytes(&dest, b"first").expect("first write");
        atomic_write_bytes(&dest, b"second").expect("second write");

        assert_eq!(std::fs::read(&dest).expect("read"), b"second");
        let files: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").path())
            .collect();
        assert_eq!(files, vec![dest]);
    }

    #[test]
    fn unwritable_destination_keeps_existing_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("report.xlsx");
        std::fs::create_dir(&dest).expect("directory in the way");
        std::fs::write(dest.join("inside"), b"sentinel").expect("seed");

        assert!(atomic_write_bytes(&dest, b"new").is_err());
        assert_eq!(std::fs::read(dest.join("inside")).expect("read"), b"sentinel");
        let files: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").path())
            .collect();
        assert_eq!(files, vec![dest]);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("nested/dir/out.bin");
        atomic_write_bytes(&dest, b"x").expect("atomic write");
        assert_eq!(std::fs::read(&dest).expect("read"), b"x");
    }
}
