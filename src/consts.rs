//! Общие константы формата журнала (frame header, body versions, I/O).

// -------- Frame header --------
// [magic u32 BE][checksum 16B][len u32 BE] = 24 байта, затем body[len].
pub const JOURNAL_MAGIC: u32 = 0xDEAD_BEEF;
pub const MAGIC_BYTES: [u8; 4] = JOURNAL_MAGIC.to_be_bytes();
pub const MAGIC_LEN: usize = 4;
pub const CHECKSUM_LEN: usize = 16;
pub const FRAME_HDR_SIZE: usize = 24;

// Offsets внутри заголовка кадра
pub const FRAME_OFF_MAGIC: usize = 0;
pub const FRAME_OFF_CHECKSUM: usize = 4;
pub const FRAME_OFF_LEN: usize = 20;

/// Upper bound for a single body. A header claiming more is treated as a
/// false frame boundary, not as a frame to wait for.
pub const MAX_BODY_LEN: u32 = 64 * 1024 * 1024;

// -------- Logical record --------
pub const CURRENT_FORMAT_VERSION: u32 = 2;

// -------- Reader --------
pub const READ_CHUNK: usize = 64 * 1024;

// -------- Retention defaults --------
pub const DEFAULT_MAX_PER_ENTITY: usize = 4;

// -------- Paths --------
pub const DEFAULT_DATA_DIR: &str = ".rjdata";
pub const DEFAULT_JOURNAL_NAME: &str = "journal";
pub const JOURNAL_EXT: &str = "bin";
pub const LOCK_SUFFIX: &str = "lock";
pub const COMPACT_SUFFIX: &str = "compact";
pub const RECOVERED_SUFFIX: &str = "recovered";
pub const RC_FILE: &str = ".rjrc";
