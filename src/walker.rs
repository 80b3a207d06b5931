//! Recursive traversal of watched folders.
//!
//! The walk is depth-first with directory entries sorted by name, so a pass
//! visits files in the same order every time. A directory that cannot be
//! read yields one error and the walk carries on with its siblings.
//! Symbolic links to files are reported as files; symbolic links to
//! directories are not followed, which keeps link cycles out of the walk.

use crate::error::WalkError;
use crate::storage::{EntryKind, Metadata, Storage};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};

/// A regular file found during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Base name, including the extension.
    pub name: String,
    /// Lower-cased extension without the dot; `None` when the name has none.
    pub extension: Option<String>,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(path: PathBuf, size: u64, modified: DateTime<Utc>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty());

        Self {
            path,
            name,
            extension,
            size,
            modified,
        }
    }

    fn from_metadata(path: PathBuf, metadata: Metadata) -> Self {
        Self::new(path, metadata.size, metadata.modified)
    }
}

#[derive(Debug)]
enum Pending {
    Root(PathBuf),
    Dir(PathBuf),
    File(PathBuf),
    Link(PathBuf),
}

/// Lazy iterator over the files beneath a set of roots.
///
/// Created by [`walk`].
pub struct Walk<'a, S: ?Sized> {
    storage: &'a S,
    stack: Vec<Pending>,
}

/// Walks every root and all of its descendants.
///
/// Roots are visited in the order given.
pub fn walk<'a, S: Storage + ?Sized>(storage: &'a S, roots: &[PathBuf]) -> Walk<'a, S> {
    Walk {
        storage,
        stack: roots.iter().rev().cloned().map(Pending::Root).collect(),
    }
}

impl<S: Storage + ?Sized> Walk<'_, S> {
    fn stat_error(path: PathBuf, source: io::Error) -> WalkError {
        WalkError::Metadata { path, source }
    }

    fn open_root(&mut self, root: PathBuf) -> Option<WalkError> {
        match self.storage.stat(&root) {
            Ok(metadata) if metadata.is_dir => {
                self.stack.push(Pending::Dir(root));
                None
            }
            Ok(_) => Some(WalkError::NotADirectory { path: root }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Some(WalkError::RootNotFound { path: root })
            }
            Err(e) => Some(Self::stat_error(root, e)),
        }
    }

    fn descend(&mut self, dir: &Path) -> Option<WalkError> {
        let mut entries = match self.storage.list(dir) {
            Ok(entries) => entries,
            Err(source) => {
                return Some(WalkError::ReadDirectory {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries.into_iter().rev() {
            let pending = match entry.kind {
                EntryKind::File => Pending::File(entry.path),
                EntryKind::Directory => Pending::Dir(entry.path),
                EntryKind::Symlink => Pending::Link(entry.path),
                EntryKind::Other => continue,
            };
            self.stack.push(pending);
        }
        None
    }
}

impl<S: Storage + ?Sized> Iterator for Walk<'_, S> {
    type Item = Result<FileRecord, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(pending) = self.stack.pop() {
            match pending {
                Pending::Root(root) => {
                    if let Some(err) = self.open_root(root) {
                        return Some(Err(err));
                    }
                }
                Pending::Dir(dir) => {
                    if let Some(err) = self.descend(&dir) {
                        return Some(Err(err));
                    }
                }
                Pending::File(path) => {
                    return Some(match self.storage.stat(&path) {
                        Ok(metadata) => Ok(FileRecord::from_metadata(path, metadata)),
                        Err(e) => Err(Self::stat_error(path, e)),
                    });
                }
                Pending::Link(path) => match self.storage.stat(&path) {
                    Ok(metadata) if metadata.is_dir => {
                        tracing::debug!(path = %path.display(), "not following directory link");
                    }
                    Ok(metadata) => return Some(Ok(FileRecord::from_metadata(path, metadata))),
                    Err(e) => return Some(Err(Self::stat_error(path, e))),
                },
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::fs;
    use tempfile::TempDir;

    fn names(results: Vec<Result<FileRecord, WalkError>>) -> Vec<String> {
        results
            .into_iter()
            .filter_map(Result::ok)
            .map(|f| f.path.display().to_string())
            .collect()
    }

    #[test]
    fn test_file_record_fields() {
        let record = FileRecord::new(PathBuf::from("/w/Archive.TAR.GZ"), 42, Utc::now());

        assert_eq!(record.name, "Archive.TAR.GZ");
        assert_eq!(record.extension.as_deref(), Some("gz"));
        assert_eq!(record.size, 42);

        let hidden = FileRecord::new(PathBuf::from("/w/.bashrc"), 1, Utc::now());
        assert_eq!(hidden.extension, None);
    }

    #[test]
    fn test_walk_recurses_in_name_order() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        storage.add_file("/w/b.txt", 1, now);
        storage.add_file("/w/a/z.txt", 1, now);
        storage.add_file("/w/a/deep/er/y.txt", 1, now);
        storage.add_file("/w/c.txt", 1, now);
        storage.add_dir("/w/empty");

        let found = names(walk(&storage, &[PathBuf::from("/w")]).collect());

        assert_eq!(
            found,
            vec!["/w/a/deep/er/y.txt", "/w/a/z.txt", "/w/b.txt", "/w/c.txt"]
        );
    }

    #[test]
    fn test_walk_skips_unreadable_subtree() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        for i in 0..9 {
            storage.add_file(format!("/w/file{}.txt", i), 1, now);
        }
        storage.add_file("/w/locked/secret.txt", 1, now);
        storage.deny("/w/locked");

        let results: Vec<_> = walk(&storage, &[PathBuf::from("/w")]).collect();
        let errors: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 9);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path(), &PathBuf::from("/w/locked"));
    }

    #[test]
    fn test_walk_reports_missing_root_and_continues() {
        let storage = MemoryStorage::new();
        storage.add_file("/present/a.txt", 1, Utc::now());

        let results: Vec<_> = walk(
            &storage,
            &[PathBuf::from("/missing"), PathBuf::from("/present")],
        )
        .collect();

        assert!(matches!(results[0], Err(WalkError::RootNotFound { .. })));
        assert_eq!(names(results), vec!["/present/a.txt"]);
    }

    #[test]
    fn test_walk_root_that_is_a_file() {
        let storage = MemoryStorage::new();
        storage.add_file("/w/a.txt", 1, Utc::now());

        let results: Vec<_> = walk(&storage, &[PathBuf::from("/w/a.txt")]).collect();

        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(WalkError::NotADirectory { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_does_not_follow_directory_links() {
        use crate::storage::OsStorage;
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        fs::create_dir(base.join("sub")).unwrap();
        fs::write(base.join("sub").join("real.txt"), "x").unwrap();
        symlink(base, base.join("sub").join("loop")).unwrap();
        symlink(base.join("sub").join("real.txt"), base.join("alias.txt")).unwrap();
        symlink(base.join("gone.txt"), base.join("dangling.txt")).unwrap();

        let results: Vec<_> = walk(&OsStorage, &[base.to_path_buf()]).collect();
        let files: Vec<_> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|f| f.name.clone())
            .collect();
        let errors = results.iter().filter(|r| r.is_err()).count();

        assert_eq!(files, vec!["alias.txt", "real.txt"]);
        assert_eq!(errors, 1, "dangling link is reported once");
    }
}
