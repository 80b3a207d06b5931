//! Filesystem access used by the walker, the engine and undo.
//!
//! The engine never calls `std::fs` directly. [`OsStorage`] is the real
//! filesystem; [`MemoryStorage`] is an in-memory tree that can simulate
//! unreadable directories and locked files.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What a directory entry is, without following symbolic links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// A single entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub name: String,
    pub kind: EntryKind,
}

/// Metadata of a path, following symbolic links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub is_dir: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// The filesystem capabilities the organizer needs.
pub trait Storage: Send + Sync {
    /// Lists the direct children of `folder`.
    fn list(&self, folder: &Path) -> io::Result<Vec<DirEntry>>;

    /// Reads metadata for `path`, following symbolic links.
    fn stat(&self, path: &Path) -> io::Result<Metadata>;

    /// Moves a file. Implementations must either complete the move or leave
    /// the source untouched and return an error.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Creates `path` and all missing parents. Succeeds if it already exists.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Returns true if anything (including a dangling link) occupies `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// The operating system filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsStorage;

impl OsStorage {
    /// Moves a file to another volume: copy, verify the size, delete the source.
    ///
    /// On any failure the copy is removed again, so only the source remains.
    fn move_across_devices(from: &Path, to: &Path) -> io::Result<()> {
        if fs::symlink_metadata(to).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to.display()),
            ));
        }

        if let Err(e) = Self::copy_verified(from, to) {
            Self::discard_partial(to);
            return Err(e);
        }

        if let Err(e) = fs::remove_file(from) {
            // Keep a single copy so the move is never left half done.
            Self::discard_partial(to);
            return Err(e);
        }
        Ok(())
    }

    fn copy_verified(from: &Path, to: &Path) -> io::Result<()> {
        let source_size = fs::metadata(from)?.len();
        fs::copy(from, to)?;

        let dest_size = fs::metadata(to)?.len();
        if dest_size != source_size {
            return Err(io::Error::other(format!(
                "copy verification failed: source {} bytes, destination {} bytes",
                source_size, dest_size
            )));
        }
        Ok(())
    }

    fn discard_partial(to: &Path) {
        match fs::remove_file(to) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %to.display(), error = %e, "could not remove partial copy");
            }
        }
    }
}

/// Classifies a listed entry. An entry whose type cannot be read is `Other`,
/// which the walker skips.
fn entry_kind(file_type: io::Result<fs::FileType>) -> EntryKind {
    match file_type {
        Ok(t) if t.is_symlink() => EntryKind::Symlink,
        Ok(t) if t.is_dir() => EntryKind::Directory,
        Ok(t) if t.is_file() => EntryKind::File,
        Ok(_) => EntryKind::Other,
        Err(e) => {
            tracing::warn!(error = %e, "could not read entry type");
            EntryKind::Other
        }
    }
}

impl Storage for OsStorage {
    fn list(&self, folder: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(folder)? {
            // One unreadable entry must not hide the rest of the folder.
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(folder = %folder.display(), error = %e, "skipping entry");
                    continue;
                }
            };
            entries.push(DirEntry {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().to_string(),
                kind: entry_kind(entry.file_type()),
            });
        }
        Ok(entries)
    }

    fn stat(&self, path: &Path) -> io::Result<Metadata> {
        let metadata = fs::metadata(path)?;
        Ok(Metadata {
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                Self::move_across_devices(from, to)
            }
            other => other,
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Dir,
    File { size: u64, modified: DateTime<Utc> },
}

#[derive(Debug, Default)]
struct MemoryTree {
    nodes: BTreeMap<PathBuf, Node>,
    denied: HashSet<PathBuf>,
    locked: HashSet<PathBuf>,
}

impl MemoryTree {
    fn insert_dirs(&mut self, path: &Path) -> io::Result<()> {
        for ancestor in path.ancestors().collect::<Vec<_>>().into_iter().rev() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            match self.nodes.get(ancestor) {
                Some(Node::File { .. }) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} is a file", ancestor.display()),
                    ));
                }
                Some(Node::Dir) => {}
                None => {
                    self.nodes.insert(ancestor.to_path_buf(), Node::Dir);
                }
            }
        }
        Ok(())
    }
}

/// An in-memory filesystem tree.
///
/// Directories are implied by the files added beneath them. Access failures
/// are injected with [`MemoryStorage::deny`] and [`MemoryStorage::lock`].
///
/// ```
/// use autotidy::storage::{MemoryStorage, Storage};
/// use chrono::Utc;
/// use std::path::Path;
///
/// let storage = MemoryStorage::new();
/// storage.add_file("/home/me/Downloads/a.pdf", 10, Utc::now());
///
/// assert!(storage.exists(Path::new("/home/me/Downloads")));
/// assert_eq!(storage.list(Path::new("/home/me/Downloads")).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tree: Mutex<MemoryTree>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a directory and its missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let _ = self.tree().insert_dirs(path.as_ref());
    }

    /// Adds a file, creating missing parent directories.
    pub fn add_file(&self, path: impl AsRef<Path>, size: u64, modified: DateTime<Utc>) {
        let path = path.as_ref();
        let mut tree = self.tree();
        if let Some(parent) = path.parent() {
            let _ = tree.insert_dirs(parent);
        }
        tree.nodes
            .insert(path.to_path_buf(), Node::File { size, modified });
    }

    /// Makes listing `path` fail with a permission error.
    pub fn deny(&self, path: impl AsRef<Path>) {
        self.tree().denied.insert(path.as_ref().to_path_buf());
    }

    /// Makes moving the file at `path` fail as if it were in use.
    pub fn lock(&self, path: impl AsRef<Path>) {
        self.tree().locked.insert(path.as_ref().to_path_buf());
    }

    /// Returns true if a file (not a directory) exists at `path`.
    pub fn is_file(&self, path: impl AsRef<Path>) -> bool {
        matches!(self.tree().nodes.get(path.as_ref()), Some(Node::File { .. }))
    }

    /// All file paths, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.tree()
            .nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl Storage for MemoryStorage {
    fn list(&self, folder: &Path) -> io::Result<Vec<DirEntry>> {
        let tree = self.tree();
        if tree.denied.contains(folder) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            ));
        }
        match tree.nodes.get(folder) {
            Some(Node::Dir) => {}
            Some(Node::File { .. }) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    "not a directory",
                ));
            }
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory")),
        }

        Ok(tree
            .nodes
            .iter()
            .filter(|(path, _)| path.parent() == Some(folder))
            .map(|(path, node)| DirEntry {
                path: path.clone(),
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                kind: match node {
                    Node::Dir => EntryKind::Directory,
                    Node::File { .. } => EntryKind::File,
                },
            })
            .collect())
    }

    fn stat(&self, path: &Path) -> io::Result<Metadata> {
        match self.tree().nodes.get(path) {
            Some(Node::Dir) => Ok(Metadata {
                is_dir: true,
                size: 0,
                modified: DateTime::<Utc>::UNIX_EPOCH,
            }),
            Some(Node::File { size, modified }) => Ok(Metadata {
                is_dir: false,
                size: *size,
                modified: *modified,
            }),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut tree = self.tree();
        if tree.locked.contains(from) {
            return Err(io::Error::new(
                io::ErrorKind::ResourceBusy,
                "file is in use by another process",
            ));
        }
        let node = match tree.nodes.get(from) {
            Some(node @ Node::File { .. }) => *node,
            Some(Node::Dir) => {
                return Err(io::Error::new(
                    io::ErrorKind::IsADirectory,
                    "cannot move a directory",
                ));
            }
            None => return Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        };
        match to.parent().and_then(|parent| tree.nodes.get(parent)) {
            Some(Node::Dir) => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    "destination folder does not exist",
                ));
            }
        }
        if matches!(tree.nodes.get(to), Some(Node::Dir)) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                "destination is a directory",
            ));
        }

        tree.nodes.remove(from);
        tree.nodes.insert(to.to_path_buf(), node);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.tree().insert_dirs(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.tree().nodes.contains_key(path)
    }
}
