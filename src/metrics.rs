//! Lightweight global metrics for the journal.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - append (кадры, байты, проглоченные ошибки)
//! - reader (resync, пропущенные байты)
//! - compaction (проходы, kept/discarded, доставленные истории)
//! - fix

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Append -----
static APPENDS_TOTAL: AtomicU64 = AtomicU64::new(0);
static APPEND_BYTES: AtomicU64 = AtomicU64::new(0);
static APPEND_FAILURES: AtomicU64 = AtomicU64::new(0);

// ----- Reader -----
static READER_RESYNCS: AtomicU64 = AtomicU64::new(0);
static READER_BYTES_SKIPPED: AtomicU64 = AtomicU64::new(0);

// ----- Compaction -----
static COMPACTIONS_TOTAL: AtomicU64 = AtomicU64::new(0);
static RECORDS_KEPT: AtomicU64 = AtomicU64::new(0);
static RECORDS_DISCARDED: AtomicU64 = AtomicU64::new(0);
static HISTORIES_DELIVERED: AtomicU64 = AtomicU64::new(0);

// ----- Fix -----
static FIX_RUNS: AtomicU64 = AtomicU64::new(0);
static FIX_FRAMES_RECOVERED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    // Append
    pub appends_total: u64,
    pub append_bytes: u64,
    pub append_failures: u64,

    // Reader
    pub reader_resyncs: u64,
    pub reader_bytes_skipped: u64,

    // Compaction
    pub compactions_total: u64,
    pub records_kept: u64,
    pub records_discarded: u64,
    pub histories_delivered: u64,

    // Fix
    pub fix_runs: u64,
    pub fix_frames_recovered: u64,
}

impl MetricsSnapshot {
    /// Доля выброшенных записей среди всех классифицированных.
    pub fn discard_ratio(&self) -> f64 {
        let total = self.records_kept + self.records_discarded;
        if total == 0 {
            0.0
        } else {
            self.records_discarded as f64 / total as f64
        }
    }
}

// ----- Recorders (Append) -----
pub fn record_append(frame_len: usize) {
    APPENDS_TOTAL.fetch_add(1, Ordering::Relaxed);
    APPEND_BYTES.fetch_add(frame_len as u64, Ordering::Relaxed);
}

pub fn record_append_failure() {
    APPEND_FAILURES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Reader) -----
pub fn record_resync(bytes_skipped: u64) {
    READER_RESYNCS.fetch_add(1, Ordering::Relaxed);
    READER_BYTES_SKIPPED.fetch_add(bytes_skipped, Ordering::Relaxed);
}

// ----- Recorders (Compaction) -----
pub fn record_compaction(kept: u64, discarded: u64, delivered: u64) {
    COMPACTIONS_TOTAL.fetch_add(1, Ordering::Relaxed);
    RECORDS_KEPT.fetch_add(kept, Ordering::Relaxed);
    RECORDS_DISCARDED.fetch_add(discarded, Ordering::Relaxed);
    HISTORIES_DELIVERED.fetch_add(delivered, Ordering::Relaxed);
}

// ----- Recorders (Fix) -----
pub fn record_fix(frames: u64) {
    FIX_RUNS.fetch_add(1, Ordering::Relaxed);
    FIX_FRAMES_RECOVERED.fetch_add(frames, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        appends_total: APPENDS_TOTAL.load(Ordering::Relaxed),
        append_bytes: APPEND_BYTES.load(Ordering::Relaxed),
        append_failures: APPEND_FAILURES.load(Ordering::Relaxed),

        reader_resyncs: READER_RESYNCS.load(Ordering::Relaxed),
        reader_bytes_skipped: READER_BYTES_SKIPPED.load(Ordering::Relaxed),

        compactions_total: COMPACTIONS_TOTAL.load(Ordering::Relaxed),
        records_kept: RECORDS_KEPT.load(Ordering::Relaxed),
        records_discarded: RECORDS_DISCARDED.load(Ordering::Relaxed),
        histories_delivered: HISTORIES_DELIVERED.load(Ordering::Relaxed),

        fix_runs: FIX_RUNS.load(Ordering::Relaxed),
        fix_frames_recovered: FIX_FRAMES_RECOVERED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    APPENDS_TOTAL.store(0, Ordering::Relaxed);
    APPEND_BYTES.store(0, Ordering::Relaxed);
    APPEND_FAILURES.store(0, Ordering::Relaxed);

    READER_RESYNCS.store(0, Ordering::Relaxed);
    READER_BYTES_SKIPPED.store(0, Ordering::Relaxed);

    COMPACTIONS_TOTAL.store(0, Ordering::Relaxed);
    RECORDS_KEPT.store(0, Ordering::Relaxed);
    RECORDS_DISCARDED.store(0, Ordering::Relaxed);
    HISTORIES_DELIVERED.store(0, Ordering::Relaxed);

    FIX_RUNS.store(0, Ordering::Relaxed);
    FIX_FRAMES_RECOVERED.store(0, Ordering::Relaxed);
}
