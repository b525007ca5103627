//! Reloc library
//!
//! Sends a file or directory tree to a listening host as a single manifest
//! over a plain TCP stream and rebuilds it under the receiver's root.

pub mod addr;
pub mod cli;
pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod fs_enum;
pub mod logger;
pub mod materialize;
pub mod net;
pub mod net_async;
pub mod protocol;
pub mod protocol_core;

pub use entry::{Entry, EntryKind, Manifest};
pub use error::{DecodeError, RelocError, Result};
