// Базовые модули
pub mod config;
pub mod consts;
pub mod lock;
pub mod metrics;

// Журнал: codec, reader, compaction, writer, fix
pub mod journal; // src/journal/{mod,codec,record,reader,compact,writer,fix}.rs

// Payload прогона теста (RunRecord + TestState)
pub mod run_record;

// Утилиты (now_secs, sibling_path, fsync_parent_dir)
pub mod util; // src/util/mod.rs

// CLI (clap), используется бинарником runjournal
pub mod cli;

// Удобные реэкспорты
pub use config::JournalConfig;
pub use journal::{
    CompactReport, FixReport, FrameError, HistorySink, Journal, JournalEntry, JournalPayload,
    JournalReader, LogicalRecord, NoHistory, ReadProblems, RetentionPolicy,
};
pub use lock::{acquire_exclusive_lock, acquire_shared_lock, LockGuard, LockMode};
pub use run_record::{RunRecord, TestState};
