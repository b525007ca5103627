//! Path handling shared by the blocking and async receivers.

use crate::error::{RelocError, Result};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Validate a manifest path and return it relative, with `.` and empty
/// segments dropped.
///
/// Rejects:
/// 1. empty paths and paths containing NUL
/// 2. absolute paths, root and prefix components
/// 3. any `..` component
/// 4. on Windows, components containing ':' (ADS defense)
///
/// Only lexical checks happen here so a whole manifest can be validated before
/// anything touches the disk.
pub fn sanitize_relative(relative: &str) -> Result<PathBuf> {
    let violation = || RelocError::PathViolation(relative.to_string());
    if relative.is_empty() || relative.contains('\0') {
        return Err(violation());
    }
    if relative.starts_with('/') || relative.starts_with('\\') {
        return Err(violation());
    }

    let mut safe = PathBuf::new();
    for segment in relative.split('/') {
        for component in Path::new(segment).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(s) => {
                    #[cfg(windows)]
                    if s.to_string_lossy().contains(':') {
                        return Err(violation());
                    }
                    safe.push(s);
                }
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(violation());
                }
            }
        }
    }
    if safe.as_os_str().is_empty() {
        return Err(violation());
    }
    Ok(safe)
}

/// Create `dir` (relative to `canon_root`) one level at a time.
///
/// Each component that already exists is resolved before the next level is
/// created beneath it, so a symlink pointing outside the root fails with
/// `PathViolation` before anything is created through it. Symlinks that stay
/// inside the root are followed. Returns the resolved directory and whether
/// any level was created.
pub fn create_dir_under(canon_root: &Path, dir: &Path, relative: &str) -> Result<(PathBuf, bool)> {
    let mut current = canon_root.to_path_buf();
    let mut created = false;
    for component in dir.components() {
        let next = current.join(component);
        match fs::symlink_metadata(&next) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let resolved = next.canonicalize().map_err(|e| RelocError::io(&next, e))?;
                if !resolved.starts_with(canon_root) {
                    return Err(RelocError::PathViolation(relative.to_string()));
                }
                if !resolved.is_dir() {
                    return Err(not_a_directory(&next));
                }
                current = resolved;
            }
            Ok(meta) if meta.is_dir() => current = next,
            Ok(_) => return Err(not_a_directory(&next)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match fs::create_dir(&next) {
                    Ok(()) => created = true,
                    // Lost a race with another writer; it is a directory now or the
                    // next lookup fails.
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists && next.is_dir() => {}
                    Err(e) => return Err(RelocError::io(&next, e)),
                }
                current = next;
            }
            Err(e) => return Err(RelocError::io(&next, e)),
        }
    }
    Ok((current, created))
}

fn not_a_directory(path: &Path) -> RelocError {
    RelocError::io(
        path,
        io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_safe_paths() {
        let expected = Path::new("subdir").join("file.txt");
        assert_eq!(sanitize_relative("subdir/file.txt").unwrap(), expected);

        // Current directory markers and doubled separators are dropped
        assert_eq!(sanitize_relative("./subdir/./file.txt").unwrap(), expected);
        assert_eq!(sanitize_relative("subdir//file.txt").unwrap(), expected);
    }

    #[test]
    fn test_resolve_unsafe_paths() {
        for bad in [
            "../etc/passwd",
            "../../etc/passwd",
            "subdir/../../etc/passwd",
            "root/..",
            "/etc/passwd",
            "file\0.txt",
            "",
            ".",
        ] {
            assert!(
                matches!(sanitize_relative(bad), Err(RelocError::PathViolation(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[cfg(windows)]
    #[test]
    fn test_resolve_windows_ads() {
        assert!(sanitize_relative("file.txt:stream").is_err());
        assert!(sanitize_relative("C:/Windows").is_err());
    }

    #[test]
    fn test_create_dir_under_nested() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();

        let (dir, created) = create_dir_under(&root, Path::new("root/photos/2024"), "root/photos/2024/a.jpg").unwrap();
        assert!(created);
        assert_eq!(dir, root.join("root/photos/2024"));
        assert!(dir.is_dir());

        // Second entry under the same directory finds it already there
        let (_, created) = create_dir_under(&root, Path::new("root/photos"), "root/photos").unwrap();
        assert!(!created);
    }

    #[cfg(unix)]
    #[test]
    fn test_create_dir_under_stops_at_escaping_symlink() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("link")).unwrap();

        assert!(matches!(
            create_dir_under(&root, Path::new("link/a/b"), "link/a/b/x.txt"),
            Err(RelocError::PathViolation(p)) if p == "link/a/b/x.txt"
        ));
        assert_eq!(fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_create_dir_under_follows_inner_symlink() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

        let (dir, _) = create_dir_under(&root, Path::new("alias/sub"), "alias/sub").unwrap();
        assert_eq!(dir, root.join("real/sub"));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_create_dir_under_fails_over_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        fs::write(root.join("taken"), "x").unwrap();
        assert!(matches!(
            create_dir_under(&root, Path::new("taken/sub"), "taken/sub"),
            Err(RelocError::Io { .. })
        ));
        assert!(root.join("taken").is_file());
    }
}
