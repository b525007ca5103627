use std::io;
use std::path::PathBuf;

/// Reasons a byte buffer is not a well-formed manifest.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: u64, remaining: usize },
    #[error("entry count {count} cannot fit in {remaining} remaining bytes")]
    CountTooLarge { count: u32, remaining: usize },
    #[error("unknown entry kind byte {0}")]
    InvalidKind(u8),
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("directory entry declares {0} content bytes")]
    DirectoryWithContent(u64),
    #[error("{0} unexpected bytes after the last entry")]
    TrailingBytes(usize),
    #[error("manifest exceeds {limit} bytes")]
    TooLarge { limit: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum RelocError {
    #[error("no such file or directory: {}", .0.display())]
    NotFound(PathBuf),
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed manifest: {0}")]
    Decode(#[from] DecodeError),
    #[error("path escapes destination root: {0}")]
    PathViolation(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
    #[error("cannot encode manifest: {0}")]
    Encode(String),
    #[error("unsupported path: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("external address lookup failed: {0}")]
    Lookup(String),
}

pub type Result<T> = std::result::Result<T, RelocError>;

impl RelocError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RelocError::Io {
            path: path.into(),
            source,
        }
    }
}
