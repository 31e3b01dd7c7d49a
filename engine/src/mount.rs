//! Mount detection for backup destinations.
//!
//! A destination on the primary filesystem is always available. A destination
//! under an external-volume namespace (`/Volumes/<name>` on macOS,
//! `/media/<user>/<name>` on Linux, ...) is only available while its volume
//! root is a live mount point.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

/// Capability to decide whether a destination can be written to right now.
pub trait MountChecker {
    fn is_mounted(&self, path: &Path) -> bool;
}

/// Treats every path as mounted. Used where no removable storage is expected.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMounted;

impl MountChecker for AlwaysMounted {
    fn is_mounted(&self, _path: &Path) -> bool {
        true
    }
}

/// A namespace under which external volumes are attached.
///
/// The marker is anchored: it must be the first component below `prefix`,
/// or below the filesystem root when no prefix is set. `depth` is the number
/// of path components after `marker` that name the volume root: 1 for
/// `/Volumes/<volume>`, 2 for `/media/<user>/<volume>`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountRoot {
    pub marker: String,
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Directory the marker sits in, e.g. `/run` for `/run/media`
    #[serde(default)]
    pub prefix: Option<PathBuf>,
}

fn default_depth() -> usize {
    1
}

impl MountRoot {
    pub fn new(marker: impl Into<String>, depth: usize) -> Self {
        MountRoot {
            marker: marker.into(),
            depth,
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Mount roots conventional for the platform this was built for.
    pub fn platform_defaults() -> Vec<MountRoot> {
        if cfg!(target_os = "macos") {
            vec![MountRoot::new("Volumes", 1)]
        } else if cfg!(unix) {
            vec![
                MountRoot::new("media", 2),
                MountRoot::new("media", 2).with_prefix("/run"),
                MountRoot::new("mnt", 1),
            ]
        } else {
            Vec::new()
        }
    }

    /// Volume root of `path` under this namespace, or `None` when `path`
    /// is not under it.
    fn resolve(&self, path: &Path) -> Option<VolumeRoot> {
        let base: PathBuf = match &self.prefix {
            Some(prefix) => prefix.clone(),
            None => path
                .components()
                .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
                .collect(),
        };
        let mut rest = path.strip_prefix(&base).ok()?.components();

        match rest.next() {
            Some(Component::Normal(name)) if name == OsStr::new(&self.marker) => {}
            _ => return None,
        }

        let mut root = base.join(&self.marker);
        for _ in 0..self.depth {
            match rest.next() {
                Some(Component::Normal(name)) => root.push(name),
                _ => return Some(VolumeRoot::Unresolved),
            }
        }
        Some(VolumeRoot::Volume(root))
    }
}

/// Where a destination path lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeRoot {
    /// Not under any external-volume namespace
    Local,
    /// Under an external volume whose root is the given path
    Volume(PathBuf),
    /// A marker was found but the volume root could not be determined
    Unresolved,
}

/// Checks destinations against the live mount table using configured roots.
#[derive(Debug, Clone)]
pub struct VolumeMountChecker {
    roots: Vec<MountRoot>,
}

impl VolumeMountChecker {
    pub fn new(roots: Vec<MountRoot>) -> Self {
        VolumeMountChecker { roots }
    }

    pub fn platform_default() -> Self {
        Self::new(MountRoot::platform_defaults())
    }

    pub fn roots(&self) -> &[MountRoot] {
        &self.roots
    }

    /// Resolve `path` to its volume root.
    ///
    /// Relative paths are always `Local`. The first configured root whose
    /// anchored marker matches wins.
    pub fn resolve(&self, path: &Path) -> VolumeRoot {
        if !path.is_absolute() {
            return VolumeRoot::Local;
        }

        self.roots
            .iter()
            .find_map(|root| root.resolve(path))
            .unwrap_or(VolumeRoot::Local)
    }
}

impl MountChecker for VolumeMountChecker {
    fn is_mounted(&self, path: &Path) -> bool {
        match self.resolve(path) {
            VolumeRoot::Local => true,
            VolumeRoot::Unresolved => {
                tracing::debug!(path = %path.display(), "volume root could not be resolved");
                false
            }
            VolumeRoot::Volume(root) => match is_mount_point(&root) {
                Ok(mounted) => mounted,
                Err(e) => {
                    tracing::debug!(root = %root.display(), error = %e, "mount query failed");
                    false
                }
            },
        }
    }
}

/// Pick the checker for a set of mount roots. No roots means nothing is removable.
pub fn select_checker(roots: &[MountRoot]) -> Box<dyn MountChecker> {
    if roots.is_empty() {
        Box::new(AlwaysMounted)
    } else {
        Box::new(VolumeMountChecker::new(roots.to_vec()))
    }
}

/// Whether `path` is the root of a mounted filesystem.
///
/// A path is a mount point when it sits on a different device than its
/// parent, or when it is its own parent (the filesystem root). Symlinks and
/// missing paths are never mount points.
#[cfg(unix)]
pub fn is_mount_point(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if metadata.file_type().is_symlink() {
        return Ok(false);
    }

    let parent = fs::symlink_metadata(path.join(".."))?;
    Ok(metadata.dev() != parent.dev() || metadata.ino() == parent.ino())
}

/// Whether `path` is the root of a mounted filesystem.
///
/// Without device ids, an existing directory is the best available answer.
#[cfg(not(unix))]
pub fn is_mount_point(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
