//! Transfer units: one [`Entry`] per file or directory, collected into a [`Manifest`].

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Wire tag: 0 = file, 1 = directory
    pub fn tag(self) -> u8 {
        match self {
            EntryKind::File => 0,
            EntryKind::Directory => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

/// One filesystem object queued for transfer.
///
/// `relative_path` always uses `/` separators and starts with the basename of
/// the transfer root, so the receiver recreates the root folder itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    kind: EntryKind,
    relative_path: String,
    size: u64,
    modified_time: Option<i64>,
    suffix: String,
    content: Vec<u8>,
}

impl Entry {
    pub fn directory(relative_path: impl Into<String>) -> Self {
        Entry {
            kind: EntryKind::Directory,
            relative_path: relative_path.into(),
            size: 0,
            modified_time: None,
            suffix: String::new(),
            content: Vec::new(),
        }
    }

    /// A file entry; the suffix is taken from the path's extension.
    pub fn file(relative_path: impl Into<String>, content: Vec<u8>, modified_time: Option<i64>) -> Self {
        let relative_path = relative_path.into();
        let suffix = Path::new(&relative_path)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_parts(EntryKind::File, relative_path, modified_time, suffix, content)
    }

    /// Assemble an entry from decoded fields. A zero timestamp means "absent"
    /// on the wire, so it is folded into `None` here as well.
    pub(crate) fn from_parts(
        kind: EntryKind,
        relative_path: String,
        modified_time: Option<i64>,
        suffix: String,
        content: Vec<u8>,
    ) -> Self {
        let content = match kind {
            EntryKind::File => content,
            EntryKind::Directory => Vec::new(),
        };
        Entry {
            kind,
            relative_path,
            size: content.len() as u64,
            modified_time: modified_time.filter(|&t| t != 0),
            suffix,
            content,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// The relative path as a platform path, one component per `/` segment.
    pub fn path(&self) -> PathBuf {
        self.relative_path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Basename, used for progress and log messages only.
    pub fn display_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or(&self.relative_path)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified_time(&self) -> Option<i64> {
        self.modified_time
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Identity rule for deduplication: same relative path, same item.
    pub fn same_item(&self, other: &Entry) -> bool {
        self.relative_path == other.relative_path
    }
}

/// Ordered entries making up one transfer; exactly one is sent per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<Entry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&Entry> {
        self.entries.first()
    }

    pub fn contains_path(&self, relative_path: &str) -> bool {
        self.entries.iter().any(|e| e.relative_path == relative_path)
    }

    pub fn get(&self, relative_path: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.relative_path == relative_path)
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_dir()).count()
    }

    pub fn dir_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_dir()).count()
    }

    /// Sum of file content sizes.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

impl From<Vec<Entry>> for Manifest {
    fn from(entries: Vec<Entry>) -> Self {
        Manifest { entries }
    }
}

impl IntoIterator for Manifest {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
