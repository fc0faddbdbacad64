//! Volume classification for destination folders
//!
//! Relocating onto a network share or a removable drive works, but a
//! disconnect mid-copy is likely enough that the validator warns about it.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    Local,
    Removable,
    Network,
    Unknown,
}

/// A single line of the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
    pub fstype: String,
}

/// Classify the volume holding `path`, which must exist
pub fn detect(path: &Path) -> io::Result<VolumeKind> {
    let path = path.canonicalize()?;
    platform_detect(&path)
}

#[cfg(target_os = "linux")]
fn platform_detect(path: &Path) -> io::Result<VolumeKind> {
    // No mount table (some sandboxes) says nothing about the volume itself
    let table = match std::fs::read_to_string("/proc/mounts") {
        Ok(table) => table,
        Err(_) => return Ok(VolumeKind::Unknown),
    };
    let mounts = parse_mounts(&table);
    Ok(find_mount(&mounts, path)
        .map(classify)
        .unwrap_or(VolumeKind::Unknown))
}

#[cfg(target_os = "macos")]
fn platform_detect(path: &Path) -> io::Result<VolumeKind> {
    let stat = nix::sys::statfs::statfs(path).map_err(io::Error::from)?;
    Ok(classify_macos(stat.filesystem_type_name(), path))
}

/// Shares are told apart by filesystem type. Anything else mounted under
/// /Volumes other than the boot volume's alias is an external disk or image.
#[cfg(any(target_os = "macos", test))]
fn classify_macos(fstype: &str, path: &Path) -> VolumeKind {
    if is_network_fstype(fstype) {
        return VolumeKind::Network;
    }

    let mut components = path.components();
    components.next();
    let is_volumes = components
        .next()
        .map(|c| c.as_os_str() == "Volumes")
        .unwrap_or(false);
    if is_volumes && components.next().is_some() {
        VolumeKind::Removable
    } else {
        VolumeKind::Local
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_detect(_path: &Path) -> io::Result<VolumeKind> {
    Ok(VolumeKind::Unknown)
}

/// Parse `/proc/mounts` formatted text
pub fn parse_mounts(table: &str) -> Vec<MountEntry> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fstype = fields.next()?;
            Some(MountEntry {
                device: device.to_string(),
                mount_point: PathBuf::from(unescape_mount_field(mount_point)),
                fstype: fstype.to_string(),
            })
        })
        .collect()
}

/// The mount table escapes spaces, tabs, newlines and backslashes as octal
fn unescape_mount_field(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Longest mount point that contains `path`
pub fn find_mount<'a>(mounts: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    mounts
        .iter()
        .filter(|m| path.starts_with(&m.mount_point))
        .max_by_key(|m| m.mount_point.components().count())
}

fn is_network_fstype(fstype: &str) -> bool {
    matches!(
        fstype,
        "nfs" | "nfs4" | "cifs" | "smb" | "smb2" | "smbfs" | "smb3" | "afs" | "afpfs" | "webdav"
            | "9p" | "fuse.sshfs"
    ) || fstype.starts_with("fuse.rclone")
}

pub fn classify(mount: &MountEntry) -> VolumeKind {
    let fstype = mount.fstype.as_str();
    if is_network_fstype(fstype) {
        return VolumeKind::Network;
    }

    let removable_mount = mount.mount_point.starts_with("/media")
        || mount.mount_point.starts_with("/run/media");
    if removable_mount {
        return VolumeKind::Removable;
    }

    match fstype {
        "ext2" | "ext3" | "ext4" | "xfs" | "btrfs" | "zfs" | "f2fs" | "bcachefs" | "tmpfs"
        | "overlay" | "apfs" | "hfs" | "hfsplus" | "ntfs" | "ntfs3" | "vfat" | "exfat" => {
            VolumeKind::Local
        }
        _ => VolumeKind::Unknown,
    }
}
