//! The backup engine: an additive, content-aware merge-copy.
//!
//! `MirrorEngine::copy` replicates a source file or tree into a destination:
//! - Missing directories and files are created
//! - Files whose bytes already match are skipped, untouched
//! - Files whose bytes differ are overwritten atomically
//! - Nothing at the destination is ever deleted
//!
//! Failures below the copy root are isolated per item; the walk continues
//! and the collected failures are returned as `BackupError::Incomplete`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::checksums::{self, ChecksumAlgorithm};
use crate::error::{BackupError, FileFailure};
use crate::fs_ops;
use crate::model::{CopyDecision, CopyReport};

/// Capability to back up one source into one destination.
pub trait Backup {
    fn copy(&self, source: &Path, destination: &Path) -> Result<CopyReport, BackupError>;
}

/// Determine what to do with a source file given its destination path.
///
/// Only full byte equality leads to `Skip`; timestamps and sizes alone never do.
/// A skipped destination keeps the access time it had before the comparison.
pub fn decide(source: &Path, destination: &Path) -> Result<CopyDecision, BackupError> {
    let metadata = match fs::metadata(destination) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CopyDecision::Create),
        Err(e) => {
            return Err(BackupError::ReadError {
                path: destination.to_path_buf(),
                source: e,
            })
        }
    };

    if metadata.is_dir() {
        return Err(BackupError::NotAFile {
            path: destination.to_path_buf(),
        });
    }
    if !metadata.is_file() {
        return Err(BackupError::SpecialFile {
            path: destination.to_path_buf(),
        });
    }

    let accessed = FileTime::from_last_access_time(&metadata);
    if !fs_ops::files_identical(source, destination)? {
        return Ok(CopyDecision::Overwrite);
    }

    filetime::set_file_atime(destination, accessed).map_err(|e| BackupError::WriteError {
        path: destination.to_path_buf(),
        source: e,
    })?;
    Ok(CopyDecision::Skip)
}

/// The default engine. Stateless apart from its configuration, so one
/// instance serves every ledger entry.
#[derive(Debug, Clone, Default)]
pub struct MirrorEngine {
    verify: Option<ChecksumAlgorithm>,
}

/// State accumulated over one `copy` call.
#[derive(Debug, Default)]
struct Walk {
    report: CopyReport,
    failures: Vec<FileFailure>,
    /// Canonical form of the destination root, once it exists
    destination_root: Option<PathBuf>,
}

impl Walk {
    fn is_destination_root(&self, path: &Path) -> bool {
        match &self.destination_root {
            Some(root) => fs::canonicalize(path).map_or(false, |p| &p == root),
            None => false,
        }
    }
}

impl MirrorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-hash every written file on both sides and fail it on mismatch.
    pub fn with_verification(mut self, algorithm: Option<ChecksumAlgorithm>) -> Self {
        self.verify = algorithm;
        self
    }

    pub fn verification(&self) -> Option<ChecksumAlgorithm> {
        self.verify
    }

    fn mirror_dir(
        &self,
        source: &Path,
        destination: &Path,
        walk: &mut Walk,
    ) -> Result<(), BackupError> {
        // List before creating anything, so a destination nested in the
        // source never shows up in its own listing
        let read_dir = fs::read_dir(source).map_err(|e| BackupError::EnumerationFailed {
            path: source.to_path_buf(),
            source: e,
        })?;
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| BackupError::EnumerationFailed {
                path: source.to_path_buf(),
                source: e,
            })?;
            entries.push(entry.file_name());
        }
        entries.sort();

        if fs_ops::ensure_dir(destination)? {
            walk.report.dirs_created += 1;
        }
        if walk.destination_root.is_none() {
            walk.destination_root = fs::canonicalize(destination).ok();
        }

        for name in entries {
            let src_path = source.join(&name);
            let dst_path = destination.join(&name);
            if walk.is_destination_root(&src_path) {
                tracing::debug!(path = %src_path.display(), "skipped: destination root");
                continue;
            }
            if let Err(e) = self.mirror(&src_path, &dst_path, walk) {
                tracing::debug!(path = %src_path.display(), error = %e, "item failed");
                walk.failures.push(FileFailure::from_error(src_path, &e));
            }
        }

        Ok(())
    }

    fn mirror(
        &self,
        source: &Path,
        destination: &Path,
        walk: &mut Walk,
    ) -> Result<(), BackupError> {
        let metadata = fs::metadata(source).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BackupError::SourceNotFound {
                    path: source.to_path_buf(),
                }
            } else {
                BackupError::ReadError {
                    path: source.to_path_buf(),
                    source: e,
                }
            }
        })?;

        if metadata.is_dir() {
            self.mirror_dir(source, destination, walk)
        } else if metadata.is_file() {
            let (decision, bytes) = self.mirror_file(source, destination)?;
            walk.report.record(decision, bytes);
            Ok(())
        } else {
            // Opening a FIFO or device for reading can block indefinitely
            Err(BackupError::SpecialFile {
                path: source.to_path_buf(),
            })
        }
    }

    fn mirror_file(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<(CopyDecision, u64), BackupError> {
        let decision = decide(source, destination)?;
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            %decision,
            "file decision"
        );

        if decision == CopyDecision::Skip {
            return Ok((decision, 0));
        }

        let bytes = fs_ops::copy_file_atomic(source, destination)?;

        if let Some(algorithm) = self.verify {
            if !checksums::verify_copy(source, destination, algorithm)? {
                return Err(BackupError::VerificationFailed {
                    path: destination.to_path_buf(),
                    algorithm,
                });
            }
        }

        Ok((decision, bytes))
    }
}

impl Backup for MirrorEngine {
    fn copy(&self, source: &Path, destination: &Path) -> Result<CopyReport, BackupError> {
        tracing::info!(
            "Taking backup from {} to {}",
            source.display(),
            destination.display()
        );

        let mut walk = Walk::default();
        self.mirror(source, destination, &mut walk)?;

        let Walk { report, failures, .. } = walk;
        if !failures.is_empty() {
            return Err(BackupError::Incomplete {
                root: source.to_path_buf(),
                failures,
            });
        }

        tracing::info!(
            created = report.files_created,
            overwritten = report.files_overwritten,
            skipped = report.files_skipped,
            dirs_created = report.dirs_created,
            bytes = report.bytes_copied,
            "Backed up successfully"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::path::PathBuf;

    const CONTENT: &str = "This is some content for the file.";

    fn mtime(path: &Path) -> FileTime {
        FileTime::from_last_modification_time(&fs::metadata(path).expect("stat"))
    }

    fn backdate(path: &Path) -> FileTime {
        let old = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(path, old).expect("Failed to backdate");
        old
    }

    fn dirs() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source");
        let dst = temp_dir.path().join("destination");
        fs::create_dir(&src).expect("Failed to create source");
        fs::create_dir(&dst).expect("Failed to create destination");
        (temp_dir, src, dst)
    }

    #[test]
    fn test_should_copy_empty_directory() {
        let (_temp, src, dst) = dirs();
        fs::create_dir(src.join("empty directory")).expect("mkdir");

        let report = MirrorEngine::new().copy(&src, &dst).expect("copy");

        assert!(dst.join("empty directory").is_dir());
        assert_eq!(report.dirs_created, 1);
        assert_eq!(report.files_written(), 0);
    }

    #[test]
    fn test_should_create_missing_destination_root() {
        let (_temp, src, dst) = dirs();
        let target = dst.join("not").join("yet").join("there");

        MirrorEngine::new().copy(&src, &target).expect("copy");

        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).expect("list").count(), 0);
    }

    #[test]
    fn test_should_copy_directory_with_file() {
        let (_temp, src, dst) = dirs();
        fs::create_dir(src.join("dir")).expect("mkdir");
        fs::write(src.join("dir").join("file.txt"), CONTENT).expect("write");

        let report = MirrorEngine::new().copy(&src, &dst).expect("copy");

        let copied = fs::read_to_string(dst.join("dir").join("file.txt")).expect("read");
        assert_eq!(copied, CONTENT);
        assert_eq!(report.files_created, 1);
        assert_eq!(report.bytes_copied, CONTENT.len() as u64);
    }

    #[test]
    fn test_should_copy_a_single_file_source() {
        let (_temp, src, dst) = dirs();
        let file = src.join("file_name.txt");
        fs::write(&file, CONTENT).expect("write");
        let target = dst.join("deep").join("copy.txt");

        let report = MirrorEngine::new().copy(&file, &target).expect("copy");

        assert_eq!(fs::read_to_string(&target).expect("read"), CONTENT);
        assert_eq!(report.files_created, 1);
    }

    #[test]
    fn test_should_not_overwrite_a_file_when_content_is_same() {
        let (_temp, src, dst) = dirs();
        fs::write(src.join("file_name.txt"), CONTENT).expect("write src");
        let dest_file = dst.join("file_name.txt");
        fs::write(&dest_file, CONTENT).expect("write dst");
        let before = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_times(&dest_file, before, before).expect("Failed to backdate");

        let report = MirrorEngine::new().copy(&src, &dst).expect("copy");

        let metadata = fs::metadata(&dest_file).expect("stat");
        assert_eq!(FileTime::from_last_modification_time(&metadata), before);
        assert_eq!(FileTime::from_last_access_time(&metadata), before);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_written(), 0);
    }

    #[test]
    fn test_should_not_overwrite_a_file_inside_a_folder_when_content_is_same() {
        let (_temp, src, dst) = dirs();
        fs::create_dir(src.join("nested directory")).expect("mkdir src");
        fs::create_dir(dst.join("nested directory")).expect("mkdir dst");
        fs::write(src.join("nested directory").join("file_name.txt"), CONTENT).expect("write");
        let dest_file = dst.join("nested directory").join("file_name.txt");
        fs::write(&dest_file, CONTENT).expect("write dst");
        let before = backdate(&dest_file);

        MirrorEngine::new().copy(&src, &dst).expect("copy");

        assert_eq!(mtime(&dest_file), before);
    }

    #[test]
    fn test_should_overwrite_a_file_when_content_is_changed() {
        let (_temp, src, dst) = dirs();
        let src_file = src.join("file_name.txt");
        fs::write(&src_file, format!("{CONTENT}This is some content appended.")).expect("write");
        let dest_file = dst.join("file_name.txt");
        fs::write(&dest_file, CONTENT).expect("write dst");

        let report = MirrorEngine::new().copy(&src, &dst).expect("copy");

        assert_eq!(fs::read(&dest_file).expect("read"), fs::read(&src_file).expect("read"));
        assert_eq!(mtime(&dest_file), mtime(&src_file));
        assert_eq!(report.files_overwritten, 1);
    }

    #[test]
    fn test_same_size_different_content_is_overwritten() {
        let (_temp, src, dst) = dirs();
        fs::write(src.join("f.txt"), "aaaa").expect("write src");
        let dest_file = dst.join("f.txt");
        fs::write(&dest_file, "bbbb").expect("write dst");
        // Same size and same mtime must not fool the comparison
        let stamp = backdate(&src.join("f.txt"));
        filetime::set_file_mtime(&dest_file, stamp).expect("stamp dst");

        MirrorEngine::new().copy(&src, &dst).expect("copy");

        assert_eq!(fs::read_to_string(&dest_file).expect("read"), "aaaa");
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let (_temp, src, dst) = dirs();
        fs::create_dir(src.join("a")).expect("mkdir");
        fs::write(src.join("a").join("one.txt"), "one").expect("write");
        fs::write(src.join("two.txt"), "two").expect("write");
        let engine = MirrorEngine::new();

        engine.copy(&src, &dst).expect("first copy");
        let first_one = backdate(&dst.join("a").join("one.txt"));
        let first_two = backdate(&dst.join("two.txt"));
        let report = engine.copy(&src, &dst).expect("second copy");

        assert_eq!(report.files_written(), 0);
        assert_eq!(report.files_skipped, 2);
        assert_eq!(report.dirs_created, 0);
        assert_eq!(mtime(&dst.join("a").join("one.txt")), first_one);
        assert_eq!(mtime(&dst.join("two.txt")), first_two);
    }

    #[test]
    fn test_destination_only_entries_are_left_untouched() {
        let (_temp, src, dst) = dirs();
        fs::write(src.join("new.txt"), "new").expect("write");
        fs::create_dir(dst.join("old dir")).expect("mkdir");
        fs::write(dst.join("old dir").join("keep.txt"), "keep").expect("write");
        fs::write(dst.join("keep.txt"), "keep").expect("write");

        MirrorEngine::new().copy(&src, &dst).expect("copy");

        assert_eq!(fs::read_to_string(dst.join("keep.txt")).expect("read"), "keep");
        assert_eq!(
            fs::read_to_string(dst.join("old dir").join("keep.txt")).expect("read"),
            "keep"
        );
        assert_eq!(fs::read_to_string(dst.join("new.txt")).expect("read"), "new");
    }

    #[test]
    fn test_every_copied_file_matches_its_source() {
        let (_temp, src, dst) = dirs();
        fs::create_dir_all(src.join("x").join("y")).expect("mkdir");
        fs::write(src.join("root.bin"), [0u8, 1, 2, 255]).expect("write");
        fs::write(src.join("x").join("mid.txt"), "mid").expect("write");
        fs::write(src.join("x").join("y").join("leaf.txt"), "leaf").expect("write");

        MirrorEngine::new()
            .with_verification(Some(ChecksumAlgorithm::Sha256))
            .copy(&src, &dst)
            .expect("copy");

        for rel in ["root.bin", "x/mid.txt", "x/y/leaf.txt"] {
            assert_eq!(
                checksums::compute_file_checksum(&src.join(rel), ChecksumAlgorithm::Sha256)
                    .expect("src checksum"),
                checksums::compute_file_checksum(&dst.join(rel), ChecksumAlgorithm::Sha256)
                    .expect("dst checksum"),
                "{rel} differs"
            );
        }
    }

    #[test]
    fn test_missing_source_fails() {
        let (_temp, src, dst) = dirs();
        let result = MirrorEngine::new().copy(&src.join("missing"), &dst);
        assert!(matches!(result, Err(BackupError::SourceNotFound { .. })));
    }

    #[test]
    fn test_destination_root_that_is_a_file_fails() {
        let (_temp, src, dst) = dirs();
        let occupied = dst.join("occupied");
        fs::write(&occupied, "file").expect("write");

        let result = MirrorEngine::new().copy(&src, &occupied);
        assert!(matches!(result, Err(BackupError::DirectoryCreationFailed { .. })));
        assert_eq!(fs::read_to_string(&occupied).expect("read"), "file");
    }

    #[test]
    fn test_conflicting_item_is_isolated_from_siblings() {
        let (_temp, src, dst) = dirs();
        fs::write(src.join("a.txt"), "a").expect("write");
        fs::write(src.join("b.txt"), "b").expect("write");
        fs::write(src.join("c.txt"), "c").expect("write");
        // A directory sits where b.txt should go
        fs::create_dir(dst.join("b.txt")).expect("mkdir");

        let result = MirrorEngine::new().copy(&src, &dst);

        match result {
            Err(BackupError::Incomplete { root, failures }) => {
                assert_eq!(root, src);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].path, src.join("b.txt"));
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(dst.join("a.txt")).expect("read"), "a");
        assert_eq!(fs::read_to_string(dst.join("c.txt")).expect("read"), "c");
        assert!(dst.join("b.txt").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_fifo_in_source_is_recorded_and_siblings_are_copied() {
        let (_temp, src, dst) = dirs();
        fs::write(src.join("a.txt"), "a").expect("write");
        fs::write(src.join("c.txt"), "c").expect("write");
        let fifo = src.join("b.pipe");
        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .expect("Failed to run mkfifo");
        assert!(status.success());

        let result = MirrorEngine::new().copy(&src, &dst);

        match result {
            Err(BackupError::Incomplete { failures, .. }) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].path, fifo);
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(dst.join("a.txt")).expect("read"), "a");
        assert_eq!(fs::read_to_string(dst.join("c.txt")).expect("read"), "c");
        assert!(!dst.join("b.pipe").exists());
        assert!(matches!(
            decide(&src.join("a.txt"), &fifo),
            Err(BackupError::SpecialFile { .. })
        ));
    }

    #[test]
    fn test_destination_inside_source_is_not_copied_into_itself() {
        let (_temp, src, _dst) = dirs();
        fs::create_dir(src.join("docs")).expect("mkdir");
        fs::write(src.join("docs").join("note.txt"), "note").expect("write");
        fs::write(src.join("top.txt"), "top").expect("write");
        let nested = src.join("backup");
        let engine = MirrorEngine::new();

        engine.copy(&src, &nested).expect("first copy");
        let report = engine.copy(&src, &nested).expect("second copy");

        assert_eq!(
            fs::read_to_string(nested.join("docs").join("note.txt")).expect("read"),
            "note"
        );
        assert_eq!(fs::read_to_string(nested.join("top.txt")).expect("read"), "top");
        assert!(!nested.join("backup").exists());
        assert_eq!(report.files_skipped, 2);
        assert_eq!(report.files_written(), 0);
    }

    #[test]
    fn test_decide() {
        let (_temp, src, dst) = dirs();
        let file = src.join("f.txt");
        fs::write(&file, "same").expect("write");

        assert_eq!(decide(&file, &dst.join("f.txt")).expect("decide"), CopyDecision::Create);
        fs::write(dst.join("f.txt"), "same").expect("write");
        assert_eq!(decide(&file, &dst.join("f.txt")).expect("decide"), CopyDecision::Skip);
        fs::write(dst.join("f.txt"), "other").expect("write");
        assert_eq!(decide(&file, &dst.join("f.txt")).expect("decide"), CopyDecision::Overwrite);
        assert!(matches!(decide(&file, &dst), Err(BackupError::NotAFile { .. })));
    }
}
