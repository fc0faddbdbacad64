//! Adapters over the host system
//!
//! - Filesystem: tree walking, copying, atomic pointer writes, free space
//! - Volume: mount-table lookup to spot network and removable volumes

pub mod filesystem;
pub mod volume;

pub use filesystem::{FileSystem, LocalFileSystem, TreeEntry};
pub use volume::VolumeKind;
