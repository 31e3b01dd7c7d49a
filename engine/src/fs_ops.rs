//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Creating destination directories
//! - Comparing two files byte for byte
//! - Committing a file copy atomically, with metadata preservation

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use filetime::FileTime;

use crate::error::BackupError;

const COMPARE_CHUNK: usize = 64 * 1024;

/// Ensure `path` exists as a directory, creating intermediate segments.
///
/// # Returns
/// `true` if the directory was created, `false` if it already existed.
///
/// # Errors
/// Returns BackupError if `path` exists as something other than a directory
/// or cannot be created.
pub fn ensure_dir(path: &Path) -> Result<bool, BackupError> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => Err(BackupError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| BackupError::DirectoryCreationFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(true)
        }
        Err(e) => Err(BackupError::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), BackupError> {
    match path.parent() {
        // Empty parent means a bare relative file name
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent).map(|_| ()),
        _ => Ok(()),
    }
}

/// Compare two files by full byte content.
///
/// Lengths are checked first; equal lengths are then compared chunk by chunk.
pub fn files_identical(a: &Path, b: &Path) -> Result<bool, BackupError> {
    let read_error = |path: &Path, e| BackupError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file_a = File::open(a).map_err(|e| read_error(a, e))?;
    let mut file_b = File::open(b).map_err(|e| read_error(b, e))?;

    let len_a = file_a.metadata().map_err(|e| read_error(a, e))?.len();
    let len_b = file_b.metadata().map_err(|e| read_error(b, e))?.len();
    if len_a != len_b {
        return Ok(false);
    }

    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];
    loop {
        let n_a = read_full(&mut file_a, &mut buf_a).map_err(|e| read_error(a, e))?;
        let n_b = read_full(&mut file_b, &mut buf_b).map_err(|e| read_error(b, e))?;
        if n_a != n_b || buf_a[..n_a] != buf_b[..n_b] {
            return Ok(false);
        }
        if n_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill `buf` as far as the reader allows. A short count means end of file.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Copy a file from source to destination with metadata preservation.
///
/// The content is staged in a temporary file next to `dst`, stamped with the
/// source's access/modification times and permissions, then renamed over
/// `dst`. Either the whole new file appears at `dst` or `dst` is untouched.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_atomic(src: &Path, dst: &Path) -> Result<u64, BackupError> {
    ensure_parent_dir_exists(dst)?;

    let read_error = |e| BackupError::ReadError {
        path: src.to_path_buf(),
        source: e,
    };
    let write_error = |e| BackupError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    };

    let mut src_file = File::open(src).map_err(read_error)?;
    let src_metadata = src_file.metadata().map_err(read_error)?;

    let staging_dir = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".safeguard-")
        .suffix(".partial")
        .tempfile_in(staging_dir)
        .map_err(write_error)?;

    let bytes_copied = io::copy(&mut src_file, staged.as_file_mut()).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            write_error(e)
        } else {
            read_error(e)
        }
    })?;
    staged.as_file().sync_all().map_err(write_error)?;

    // Times before permissions: a read-only file can't be re-opened for stamping on Windows
    let atime = FileTime::from_last_access_time(&src_metadata);
    let mtime = FileTime::from_last_modification_time(&src_metadata);
    filetime::set_file_times(staged.path(), atime, mtime).map_err(write_error)?;
    fs::set_permissions(staged.path(), src_metadata.permissions()).map_err(write_error)?;

    staged.persist(dst).map_err(|e| write_error(e.error))?;

    Ok(bytes_copied)
}
