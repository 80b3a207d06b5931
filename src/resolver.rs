//! Collision-free destination names.
//!
//! `report.pdf` becomes `report (1).pdf`, then `report (2).pdf`, and so on
//! until a free name is found. The existence check is supplied by the caller.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Returns `destination_folder/file_name`, or the first free
/// `stem (N).ext` variant when that path is taken.
///
/// # Examples
///
/// ```
/// use autotidy::resolver::resolve;
/// use std::path::{Path, PathBuf};
///
/// let taken = [PathBuf::from("/docs/report.pdf")];
/// let path = resolve(Path::new("/docs"), "report.pdf", |p| taken.iter().any(|t| t == p));
///
/// assert_eq!(path, PathBuf::from("/docs/report (1).pdf"));
/// ```
pub fn resolve<N, F>(destination_folder: &Path, file_name: N, exists: F) -> PathBuf
where
    N: AsRef<OsStr>,
    F: Fn(&Path) -> bool,
{
    let file_name = Path::new(file_name.as_ref());
    let candidate = destination_folder.join(file_name);
    if !exists(&candidate) {
        return candidate;
    }

    let stem = file_name
        .file_stem()
        .unwrap_or_else(|| file_name.as_os_str());
    let extension = file_name.extension();

    let mut counter: u64 = 1;
    loop {
        let mut name = OsString::from(stem);
        name.push(format!(" ({})", counter));
        if let Some(ext) = extension {
            name.push(".");
            name.push(ext);
        }

        let candidate = destination_folder.join(name);
        if !exists(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn first_k_taken(k: usize) -> impl Fn(&Path) -> bool {
        let calls = Cell::new(0usize);
        move |_| {
            let n = calls.get();
            calls.set(n + 1);
            n < k
        }
    }

    #[test]
    fn test_free_name_is_unchanged() {
        let path = resolve(Path::new("/dest"), "report.pdf", |_| false);
        assert_eq!(path, PathBuf::from("/dest/report.pdf"));
    }

    #[test]
    fn test_counter_matches_number_of_taken_names() {
        for k in 1..6 {
            let path = resolve(Path::new("/dest"), "report.pdf", first_k_taken(k));
            assert_eq!(path, PathBuf::from(format!("/dest/report ({}).pdf", k)));
        }
    }

    #[test]
    fn test_name_without_extension() {
        let path = resolve(Path::new("/dest"), "Makefile", first_k_taken(1));
        assert_eq!(path, PathBuf::from("/dest/Makefile (1)"));
    }

    #[test]
    fn test_only_last_extension_is_kept_apart() {
        let path = resolve(Path::new("/dest"), "backup.tar.gz", first_k_taken(2));
        assert_eq!(path, PathBuf::from("/dest/backup.tar (2).gz"));
    }

    #[test]
    fn test_hidden_file_has_no_extension() {
        let path = resolve(Path::new("/dest"), ".env", first_k_taken(1));
        assert_eq!(path, PathBuf::from("/dest/.env (1)"));
    }

    #[test]
    fn test_checks_real_paths() {
        let taken = [
            PathBuf::from("/dest/photo.jpg"),
            PathBuf::from("/dest/photo (1).jpg"),
            PathBuf::from("/dest/photo (3).jpg"),
        ];
        let path = resolve(Path::new("/dest"), "photo.jpg", |p| {
            taken.iter().any(|t| t == p)
        });
        assert_eq!(path, PathBuf::from("/dest/photo (2).jpg"));
    }
}
