//! Fixtures shared by the unit tests

use rusqlite::{params, Connection};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::adapters::{FileSystem, LocalFileSystem, VolumeKind};
use crate::storage::DataRootRegistry;

/// Shape of the libraries older Marginalia versions wrote
pub const LEGACY_SCHEMA: &str = "
CREATE TABLE papers (id INTEGER PRIMARY KEY, title TEXT, doi TEXT, year, journal TEXT,
                     abstract TEXT, url TEXT, added_at TEXT);
CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT);
CREATE TABLE keywords (id INTEGER PRIMARY KEY, word TEXT);
CREATE TABLE labels (id INTEGER PRIMARY KEY, name TEXT, color TEXT);
CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT, parent_id INTEGER);
CREATE TABLE attachments (id INTEGER PRIMARY KEY, paper_id INTEGER, file_name TEXT,
                          file_path TEXT, mime_type TEXT, size_bytes);
CREATE TABLE paper_authors (paper_id INTEGER, author_id INTEGER, position INTEGER);
CREATE TABLE paper_labels (paper_id INTEGER, label_id INTEGER);
CREATE TABLE paper_categories (paper_id INTEGER, category_id INTEGER);
CREATE TABLE paper_keywords (paper_id INTEGER, keyword_id INTEGER);
";

pub fn legacy_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(LEGACY_SCHEMA).unwrap();
    conn
}

pub fn legacy_file(path: &Path) -> Connection {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(LEGACY_SCHEMA).unwrap();
    conn
}

/// Insert papers 1..=count with distinct DOIs
pub fn seed_papers(conn: &Connection, count: i64) {
    for i in 1..=count {
        conn.execute(
            "INSERT INTO papers (id, title, doi, year, journal, added_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                i,
                format!("Paper {}", i),
                format!("10.1000/test.{}", i),
                2000 + (i % 25),
                "Journal of Tests",
                "2024-01-15T10:00:00Z",
            ],
        )
        .unwrap();
    }
}

/// A small but fully linked library
pub fn seed_linked_library(conn: &Connection) {
    seed_papers(conn, 3);
    conn.execute_batch(
        "INSERT INTO categories (id, name, parent_id) VALUES
            (1, 'Science', NULL), (2, 'Physics', 1), (3, 'Quantum', 2);
         INSERT INTO labels (id, name, color) VALUES (1, 'to-read', '#ff0000'), (2, 'favorite', NULL);
         INSERT INTO authors (id, name) VALUES (1, 'Ada Lovelace'), (2, 'Alan Turing');
         INSERT INTO keywords (id, word) VALUES (1, 'computation'), (2, 'Logic');
         INSERT INTO attachments (id, paper_id, file_name, file_path, mime_type, size_bytes) VALUES
            (1, 1, 'paper.pdf', 'papers/1/paper.pdf', 'application/pdf', 1024),
            (2, 2, NULL, 'papers/2/supplement.zip', 'application/zip', 2048);
         INSERT INTO paper_authors (paper_id, author_id, position) VALUES (1, 1, 0), (1, 2, 1), (2, 2, 0);
         INSERT INTO paper_labels (paper_id, label_id) VALUES (1, 1), (3, 2);
         INSERT INTO paper_categories (paper_id, category_id) VALUES (1, 3), (2, 2);
         INSERT INTO paper_keywords (paper_id, keyword_id) VALUES (1, 1), (2, 2), (3, 2);",
    )
    .unwrap();
}

/// Registry whose pointer lives in `<dir>/bootstrap` and default root is `<dir>/default`
pub fn test_registry(dir: &Path) -> DataRootRegistry {
    DataRootRegistry::new(
        dir.join("bootstrap").join("data_root.json"),
        dir.join("default"),
    )
}

/// Write `count` files spread over the four subtrees of `root`
pub fn populate_root(root: &Path, count: usize) {
    let subtrees = ["config", "files/papers", "cache/thumbs", "logs"];
    for i in 0..count {
        let dir = root.join(subtrees[i % subtrees.len()]);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("file-{:03}.dat", i)), format!("contents of file {}", i)).unwrap();
    }
}

/// Local filesystem whose `fail_on`-th copy (1-based) fails
pub struct FailingFs {
    fail_on: u64,
    copies: AtomicU64,
}

impl FailingFs {
    pub fn new(fail_on: u64) -> Self {
        Self {
            fail_on,
            copies: AtomicU64::new(0),
        }
    }
}

impl FileSystem for FailingFs {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let n = self.copies.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "simulated copy failure",
            ));
        }
        LocalFileSystem.copy_file(from, to)
    }
}

/// Local filesystem reporting a fixed amount of free space and volume kind
pub struct FakeVolumeFs {
    pub free: u64,
    pub kind: VolumeKind,
}

impl FileSystem for FakeVolumeFs {
    fn available_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.free)
    }

    fn volume_kind(&self, _path: &Path) -> io::Result<VolumeKind> {
        Ok(self.kind)
    }
}

/// Local filesystem whose pointer writes always fail
pub struct ReadOnlyPointerFs;

impl FileSystem for ReadOnlyPointerFs {
    fn write_atomic(&self, _path: &Path, _contents: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "pointer is read-only",
        ))
    }
}

/// Local filesystem with plenty of room where nothing may be written
pub struct LockedFs;

impl FileSystem for LockedFs {
    fn is_writable(&self, _path: &Path) -> io::Result<bool> {
        Ok(false)
    }

    fn available_space(&self, _path: &Path) -> io::Result<u64> {
        Ok(u64::MAX / 2)
    }

    fn volume_kind(&self, _path: &Path) -> io::Result<VolumeKind> {
        Ok(VolumeKind::Local)
    }
}
