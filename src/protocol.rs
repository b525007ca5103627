//! Shared protocol constants for the manifest transport

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 1750;

/// Host used by internal mode when none is configured.
pub const DEFAULT_HOST: &str = "localhost";

// Upper bound on bytes accumulated from one connection before it is dropped.
// The whole manifest is held in memory, so this is the practical transfer cap.
pub const MAX_MANIFEST_SIZE: u64 = 4 * 1024 * 1024 * 1024;

// Smallest possible encoded entry: kind(1) + path len(4) + size(8) + mtime(8) + suffix len(4)
pub const MIN_ENTRY_SIZE: usize = 1 + 4 + 8 + 8 + 4;

// Header of an encoded manifest: entry count (u32)
pub const COUNT_SIZE: usize = 4;

// Chunk size for socket reads and writes
pub const IO_CHUNK: usize = 1024 * 1024;

pub mod timeouts {
    // Budget for the external IP lookup (ms)
    pub const LOOKUP_MS: u64 = 3000;

    // Interval between progress redraws (ms)
    pub const PROGRESS_TICK_MS: u64 = 120;
}
