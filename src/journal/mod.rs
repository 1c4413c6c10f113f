//! Журнал прогонов тестов: append-only файл кадров с checksum, resync и компактацией.
//!
//! Разделение:
//! - codec.rs   — кадр [magic][checksum][len][body], проверка, поиск magic для resync.
//! - record.rs  — логическая запись (version, entity, payload), body JSON, трейты payload/sink.
//! - reader.rs  — потоковое чтение кадров чанками, resync, счётчики проблем.
//! - compact.rs — политика хранения, classify + rewrite, атомарная подмена файла.
//! - writer.rs  — Journal: append / load / scan.
//! - fix.rs     — восстановление журнала без политики хранения.

pub mod codec;
pub mod compact;
pub mod fix;
pub mod reader;
pub mod record;
pub mod writer;

pub use codec::{encode_frame, resynchronize, try_decode_frame, Decoded, FrameError};
pub use compact::{classify, compact_and_load, CompactReport, DiscardReason, RetentionPolicy};
pub use fix::{recover_frames, FixReport};
pub use reader::{JournalEntry, JournalReader, ReadProblems, ReaderState};
pub use record::{
    decode_body, encode_body, HistorySink, JournalPayload, LogicalRecord, NoHistory,
};
pub use writer::{Journal, ScanReport};
