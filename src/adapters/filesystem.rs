//! Filesystem adapter
//!
//! Every filesystem operation the relocator and validator perform goes
//! through [`FileSystem`], so tests can swap in doubles that fail a specific
//! copy or report a specific amount of free space.

use std::fs::{self, File, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::volume::{self, VolumeKind};

/// An entry found while walking a data subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the walked root
    pub relative: PathBuf,
    pub is_dir: bool,
    pub len: u64,
}

/// Filesystem operations used by the migration engine.
///
/// All methods have working defaults backed by `std::fs`, `walkdir` and
/// `fs2`; implementors override only what they need to change.
pub trait FileSystem: Send + Sync {
    /// Walk `root` depth-first in file-name order. A missing root is empty.
    fn walk(&self, root: &Path) -> io::Result<Vec<TreeEntry>> {
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
                .to_path_buf();
            let is_dir = entry.file_type().is_dir();
            let len = if is_dir {
                0
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            };
            entries.push(TreeEntry {
                relative,
                is_dir,
                len,
            });
        }
        Ok(entries)
    }

    /// Copy one file, creating parent directories. Returns bytes written.
    ///
    /// Fails when fewer bytes arrive than the source held when the copy
    /// started; files that grow during the copy (logs) are fine.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        let expected = fs::metadata(from)?.len();
        let copied = fs::copy(from, to)?;
        if copied < expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short copy: {} of {} bytes", copied, expected),
            ));
        }
        debug!("Copied {:?} -> {:?} ({} bytes)", from, to, copied);
        Ok(copied)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    /// Remove a directory only if it is empty
    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        fs::metadata(path)
    }

    /// Whether this process may create entries in the directory `path`
    fn is_writable(&self, path: &Path) -> io::Result<bool> {
        writable(path)
    }

    fn available_space(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }

    fn volume_kind(&self, path: &Path) -> io::Result<VolumeKind> {
        volume::detect(path)
    }

    /// Replace `path` with `contents` via a synced sibling temp file and rename
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "pointer".to_string());
        let tmp_path = parent.join(format!(".{}.tmp", file_name));

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(contents)?;
            tmp.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp_path, path) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove temp file {:?}: {}", tmp_path, cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Sum of file sizes below `root`; unreadable entries count as zero
    fn tree_size(&self, root: &Path) -> u64 {
        match self.walk(root) {
            Ok(entries) => entries.iter().map(|e| e.len).sum(),
            Err(e) => {
                warn!("Failed to measure {:?}: {}", root, e);
                0
            }
        }
    }
}

/// `access(2)` honours ownership, ACLs and read-only mounts; the mode bits
/// alone say nothing about who owns the directory
#[cfg(unix)]
fn writable(path: &Path) -> io::Result<bool> {
    use nix::errno::Errno;
    use nix::unistd::{access, AccessFlags};

    match access(path, AccessFlags::W_OK) {
        Ok(()) => Ok(true),
        Err(Errno::EACCES) | Err(Errno::EPERM) | Err(Errno::EROFS) => Ok(false),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn writable(path: &Path) -> io::Result<bool> {
    Ok(!fs::metadata(path)?.permissions().readonly())
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {}
