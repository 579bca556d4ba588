//! Free disk space lookup.
//!
//! Jobs compare their estimated output size against the space left on the
//! volume that will hold the output. The lookup is a trait so tests and
//! embedders can substitute their own numbers.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use sysinfo::Disks;

/// Reports how many bytes can still be written near a path.
pub trait DiskSpaceProbe: Send + Sync + Debug {
    /// Bytes available on the volume holding `path`, or on the volume of the
    /// working directory when `path` is `None`. Returns `None` when unknown.
    fn available_bytes(&self, path: Option<&Path>) -> Option<u64>;
}

/// Queries mounted volumes through `sysinfo`.
///
/// The volume is the one whose mount point is the longest prefix of the
/// (absolute) directory that holds the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDiskSpace;

impl SystemDiskSpace {
    fn directory_of(path: Option<&Path>) -> Option<PathBuf> {
        let directory = match path {
            Some(path) if path.is_dir() => path.to_path_buf(),
            Some(path) => match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => std::env::current_dir().ok()?,
            },
            None => std::env::current_dir().ok()?,
        };
        Some(directory.canonicalize().unwrap_or(directory))
    }
}

impl DiskSpaceProbe for SystemDiskSpace {
    fn available_bytes(&self, path: Option<&Path>) -> Option<u64> {
        let directory = Self::directory_of(path)?;
        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .filter(|disk| directory.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())?;
        log::debug!(
            "Volume {} holds {}, {} bytes available",
            disk.mount_point().display(),
            directory.display(),
            disk.available_space()
        );
        Some(disk.available_space())
    }
}

/// A probe returning a fixed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDiskSpace(pub Option<u64>);

impl DiskSpaceProbe for FixedDiskSpace {
    fn available_bytes(&self, _path: Option<&Path>) -> Option<u64> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_probe_ignores_path() {
        let probe = FixedDiskSpace(Some(42));
        assert_eq!(probe.available_bytes(None), Some(42));
        assert_eq!(probe.available_bytes(Some(Path::new("/nowhere/out.mp4"))), Some(42));
        assert_eq!(FixedDiskSpace(None).available_bytes(None), None);
    }

    #[test]
    fn relative_file_resolves_to_working_directory() {
        let directory = SystemDiskSpace::directory_of(Some(Path::new("out.mp4"))).unwrap();
        let current = std::env::current_dir().unwrap();
        assert_eq!(directory, current.canonicalize().unwrap_or(current));
    }

    #[test]
    fn existing_directory_is_used_as_is() {
        let temp = tempfile::tempdir().unwrap();
        let directory = SystemDiskSpace::directory_of(Some(temp.path())).unwrap();
        assert_eq!(directory, temp.path().canonicalize().unwrap());
    }
}
