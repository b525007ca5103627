//! Receiver side: replay a manifest against a destination root.

use crate::entry::{Entry, Manifest};
use crate::error::{RelocError, Result};
use crate::logger::{Logger, NoopLogger};
use crate::protocol_core::{create_dir_under, sanitize_relative};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeStats {
    pub directories: u64,
    pub files: u64,
    pub bytes: u64,
}

pub struct Materializer {
    root: PathBuf,
    preserve_mtime: bool,
    logger: Arc<dyn Logger>,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Materializer {
            root: root.into(),
            preserve_mtime: true,
            logger: Arc::new(NoopLogger),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn preserve_mtime(mut self, on: bool) -> Self {
        self.preserve_mtime = on;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write every entry in order. All paths are checked before the first
    /// write; after that a failure stops the replay but keeps what was written.
    pub fn apply(&self, manifest: &Manifest) -> Result<MaterializeStats> {
        let targets = manifest
            .iter()
            .map(|entry| Ok((sanitize_relative(entry.relative_path())?, entry)))
            .collect::<Result<Vec<(PathBuf, &Entry)>>>()?;

        let canon_root = self
            .root
            .canonicalize()
            .map_err(|e| RelocError::io(&self.root, e))?;

        let mut stats = MaterializeStats::default();
        for (rel, entry) in targets {
            if entry.is_dir() {
                self.make_dir(&canon_root, &rel, entry)?;
                stats.directories += 1;
            } else {
                self.write_file(&canon_root, &rel, entry)?;
                stats.files += 1;
                stats.bytes += entry.size();
            }
        }
        Ok(stats)
    }

    fn make_dir(&self, canon_root: &Path, rel: &Path, entry: &Entry) -> Result<()> {
        let (dir, created) = create_dir_under(canon_root, rel, entry.relative_path())?;
        if created {
            self.logger.dir_created(&dir);
        }
        Ok(())
    }

    fn write_file(&self, canon_root: &Path, rel: &Path, entry: &Entry) -> Result<()> {
        let name = rel
            .file_name()
            .ok_or_else(|| RelocError::PathViolation(entry.relative_path().to_string()))?;
        // Entry order is not trusted: create missing ancestors first.
        let parent = rel.parent().unwrap_or_else(|| Path::new(""));
        let (dir, _) = create_dir_under(canon_root, parent, entry.relative_path())?;
        let target = dir.join(name);
        if target.is_symlink() {
            fs::remove_file(&target).map_err(|e| RelocError::io(&target, e))?;
        }
        fs::write(&target, entry.content()).map_err(|e| RelocError::io(&target, e))?;
        if self.preserve_mtime {
            if let Some(secs) = entry.modified_time() {
                set_file_mtime(&target, FileTime::from_unix_time(secs, 0))
                    .map_err(|e| RelocError::io(&target, e))?;
            }
        }
        self.logger.file_saved(entry.display_name(), &target, entry.size());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn sample() -> Manifest {
        Manifest::from(vec![
            Entry::directory("root"),
            Entry::file("root/a.txt", b"hello".to_vec(), Some(1_500_000_000)),
            Entry::directory("root/sub"),
            Entry::file("root/sub/b.txt", b"world".to_vec(), None),
        ])
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Option<Vec<u8>>)> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| {
                let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
                let content = e.file_type().is_file().then(|| fs::read(e.path()).unwrap());
                (rel, content)
            })
            .collect()
    }

    #[test]
    fn test_apply_builds_tree() {
        let dest = TempDir::new().unwrap();
        let stats = Materializer::new(dest.path()).apply(&sample()).unwrap();
        assert_eq!(stats, MaterializeStats { directories: 2, files: 2, bytes: 10 });
        assert_eq!(fs::read(dest.path().join("root/a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dest.path().join("root/sub/b.txt")).unwrap(), b"world");
        assert!(dest.path().join("root/sub").is_dir());
    }

    #[test]
    fn test_apply_preserves_mtime() {
        let dest = TempDir::new().unwrap();
        Materializer::new(dest.path()).apply(&sample()).unwrap();
        let meta = fs::metadata(dest.path().join("root/a.txt")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_500_000_000);
    }

    #[test]
    fn test_files_before_directories() {
        let dest = TempDir::new().unwrap();
        let m = Manifest::from(vec![
            Entry::file("root/deep/er/c.txt", b"c".to_vec(), None),
            Entry::directory("root/deep"),
            Entry::directory("root"),
        ]);
        Materializer::new(dest.path()).apply(&m).unwrap();
        assert_eq!(fs::read(dest.path().join("root/deep/er/c.txt")).unwrap(), b"c");
    }

    #[test]
    fn test_path_escape_rejected_before_any_write() {
        let outer = TempDir::new().unwrap();
        let dest = outer.path().join("dest");
        fs::create_dir(&dest).unwrap();
        let m = Manifest::from(vec![
            Entry::directory("root"),
            Entry::file("root/ok.txt", b"fine".to_vec(), None),
            Entry::file("../../etc/passwd", b"pwned".to_vec(), None),
        ]);
        let err = Materializer::new(&dest).apply(&m).unwrap_err();
        assert!(matches!(err, RelocError::PathViolation(p) if p == "../../etc/passwd"));
        assert!(snapshot(&dest).len() == 1, "destination must stay empty");
        assert_eq!(fs::read_dir(outer.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_absolute_path_rejected() {
        let dest = TempDir::new().unwrap();
        let m = Manifest::from(vec![Entry::file("/tmp/evil", b"x".to_vec(), None)]);
        assert!(matches!(
            Materializer::new(dest.path()).apply(&m),
            Err(RelocError::PathViolation(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_escape_rejected() {
        let dest = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dest.path().join("root")).unwrap();

        for m in [
            Manifest::from(vec![Entry::file("root/a/b/x.txt", b"x".to_vec(), None)]),
            Manifest::from(vec![Entry::directory("root/a/b")]),
            Manifest::from(vec![Entry::file("root/x.txt", b"x".to_vec(), None)]),
        ] {
            assert!(matches!(
                Materializer::new(dest.path()).apply(&m),
                Err(RelocError::PathViolation(_))
            ));
        }
        assert_eq!(fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_symlink_is_replaced_not_followed() {
        let dest = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let victim = outside.path().join("victim.txt");
        fs::write(&victim, "untouched").unwrap();
        std::os::unix::fs::symlink(&victim, dest.path().join("note.txt")).unwrap();

        let m = Manifest::from(vec![Entry::file("note.txt", b"new".to_vec(), None)]);
        Materializer::new(dest.path()).apply(&m).unwrap();
        assert_eq!(fs::read(&victim).unwrap(), b"untouched");
        assert!(!dest.path().join("note.txt").is_symlink());
        assert_eq!(fs::read(dest.path().join("note.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_last_write_wins() {
        let dest = TempDir::new().unwrap();
        let m = Manifest::from(vec![
            Entry::file("note.txt", b"first".to_vec(), None),
            Entry::file("note.txt", b"second".to_vec(), None),
        ]);
        Materializer::new(dest.path()).apply(&m).unwrap();
        assert_eq!(fs::read(dest.path().join("note.txt")).unwrap(), b"second");
    }

    #[test]
    fn test_idempotent_re_receive() {
        let once = TempDir::new().unwrap();
        let twice = TempDir::new().unwrap();
        Materializer::new(once.path()).apply(&sample()).unwrap();
        let m = Materializer::new(twice.path());
        m.apply(&sample()).unwrap();
        m.apply(&sample()).unwrap();
        assert_eq!(snapshot(once.path()), snapshot(twice.path()));
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dest = TempDir::new().unwrap();
        fs::create_dir(dest.path().join("root")).unwrap();
        fs::write(dest.path().join("root/a.txt"), "a much longer previous content").unwrap();
        Materializer::new(dest.path()).apply(&sample()).unwrap();
        assert_eq!(fs::read(dest.path().join("root/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_file_where_directory_expected_is_io_error() {
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("root"), "not a dir").unwrap();
        assert!(matches!(
            Materializer::new(dest.path()).apply(&sample()),
            Err(RelocError::Io { .. })
        ));
    }
}
