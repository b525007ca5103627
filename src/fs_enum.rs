use crate::entry::{Entry, Manifest};
use crate::error::{RelocError, Result};
use filetime::FileTime;
use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
// Source-side enumeration: filesystem path -> Manifest

/// Dotfiles and dot-directories never leave the sender.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn utf8_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RelocError::InvalidPath(path.to_path_buf()))
}

fn mtime_secs(metadata: &Metadata) -> Option<i64> {
    Some(FileTime::from_last_modification_time(metadata).unix_seconds())
}

fn read_file(path: &Path, relative: String, metadata: &Metadata) -> Result<Entry> {
    let content = fs::read(path).map_err(|e| RelocError::io(path, e))?;
    Ok(Entry::file(relative, content, mtime_secs(metadata)))
}

/// Walk `path` into a manifest.
///
/// A file becomes a single entry named by its basename. A directory becomes its
/// own entry followed by every non-hidden descendant, each directory listed
/// before anything nested inside it; siblings are sorted by name.
pub fn walk(path: &Path) -> Result<Manifest> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RelocError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(RelocError::io(path, e)),
    };
    // The name is what the caller typed, even through a symlink; the walk
    // itself runs over the resolved directory.
    let root_name = utf8_name(&lexical_absolute(path)?)?.to_string();
    let root = path
        .canonicalize()
        .map_err(|e| RelocError::io(path, e))?;

    let mut manifest = Manifest::new();
    if metadata.is_file() {
        // A hidden file on its own is treated as absent.
        if is_hidden(&root_name) {
            return Err(RelocError::NotFound(path.to_path_buf()));
        }
        manifest.push(read_file(&root, root_name, &metadata)?);
        return Ok(manifest);
    }
    if !metadata.is_dir() {
        return Err(RelocError::NotFound(path.to_path_buf()));
    }

    manifest.push(Entry::directory(root_name.clone()));
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(root_name.clone());

    for entry in WalkDir::new(&root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        // Skip hidden entries entirely - this prevents walking into them
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_str().map(is_hidden).unwrap_or(false))
    {
        let entry = entry.map_err(|e| {
            let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
            match e.into_io_error() {
                Some(io) => RelocError::io(at, io),
                None => RelocError::InvalidPath(at),
            }
        })?;
        let relative = relative_path(&root_name, &root, entry.path())?;
        if !seen.insert(relative.clone()) {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            manifest.push(Entry::directory(relative));
        } else if file_type.is_file() {
            let metadata = entry
                .metadata()
                .map_err(|e| RelocError::io(entry.path(), e.into()))?;
            manifest.push(read_file(entry.path(), relative, &metadata)?);
        }
        // symlinks, sockets, devices: not transferred
    }

    Ok(manifest)
}

/// Absolute form of `path` with `.` and `..` folded away, without touching
/// symlinks.
fn lexical_absolute(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| RelocError::io(path, e))?
            .join(path)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// `root_name/<path relative to root>` with `/` separators.
fn relative_path(root_name: &str, root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| RelocError::InvalidPath(path.to_path_buf()))?;
    let mut out = String::from(root_name);
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| RelocError::InvalidPath(path.to_path_buf()))?;
        out.push('/');
        out.push_str(part);
    }
    Ok(out)
}

/// Sum of file sizes under `path` that `walk` would pick up, without reading
/// any content. Used to size progress bars before the real walk.
pub fn estimate_bytes(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_str().map(is_hidden).unwrap_or(false))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Basename of a path as the receiver will see it.
pub fn transfer_name(path: &Path) -> PathBuf {
    lexical_absolute(path)
        .ok()
        .and_then(|p| p.file_name().map(PathBuf::from))
        .unwrap_or_else(|| path.to_path_buf())
}
