//! journal/writer — Journal: явный хэндл журнала (вместо глобального синглтона).
//!
//! Что здесь:
//! - try_append / append / record — дописать один кадр в конец файла;
//! - load  — компактация с политикой хранения + доставка истории в HistorySink;
//! - scan  — только чтение (для dump/stat), без политики и без перезаписи;
//! - fix / fix_in_place — см. fix.rs.
//!
//! Выключенный журнал (enabled=false) ничего не делает и не трогает ФС.
//! Ошибки append'а не фатальны для вызывающего: append() логирует warn! и продолжает.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::codec::encode_frame;
use super::compact::{compact_and_load, CompactReport};
use super::reader::{JournalEntry, JournalReader, ReadProblems};
use super::record::{encode_body, HistorySink, JournalPayload, LogicalRecord};
use crate::config::JournalConfig;
use crate::lock::{maybe_lock, LockMode};
use crate::metrics::{record_append, record_append_failure};
use crate::util::now_secs;

/// Read-only listing of a journal.
#[derive(Debug, Clone)]
pub struct ScanReport<P> {
    pub entries: Vec<JournalEntry<P>>,
    pub problems: ReadProblems,
    pub file_len: u64,
}

impl<P> Default for ScanReport<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            problems: ReadProblems::default(),
            file_len: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    cfg: JournalConfig,
}

impl Journal {
    /// Journal at an explicit file path.
    pub fn new<T: Into<PathBuf>>(path: T, cfg: JournalConfig) -> Self {
        Self {
            path: path.into(),
            cfg,
        }
    }

    /// Journal at `<project_root>/<data_dir>/<name>.bin`.
    pub fn in_project(project_root: &Path, cfg: JournalConfig) -> Self {
        let path = cfg.journal_path(project_root);
        Self::new(path, cfg)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &JournalConfig {
        &self.cfg
    }

    pub fn is_enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Дописать запись в конец журнала. Ошибки ввода-вывода пробрасываются.
    pub fn try_append<P: JournalPayload>(&self, rec: &LogicalRecord<P>) -> Result<()> {
        if !self.cfg.enabled {
            return Ok(());
        }

        let body = encode_body(rec).context("encode journal record")?;
        let frame = encode_frame(&body).context("frame journal record")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create journal dir {}", parent.display()))?;
            }
        }

        let _guard = maybe_lock(&self.path, LockMode::Exclusive, self.cfg.lock)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open journal {} for append", self.path.display()))?;

        // Один write_all на кадр: при O_APPEND кадр ложится в конец целиком.
        f.write_all(&frame)
            .with_context(|| format!("append to journal {}", self.path.display()))?;
        if self.cfg.fsync {
            f.sync_data()
                .with_context(|| format!("fsync journal {}", self.path.display()))?;
        }

        record_append(frame.len());
        debug!(
            "journal {}: appended {} bytes for {}",
            self.path.display(),
            frame.len(),
            rec.entity_id
        );
        Ok(())
    }

    /// Как try_append, но ошибка только логируется: журнал не должен ронять прогон.
    pub fn append<P: JournalPayload>(&self, rec: &LogicalRecord<P>) {
        if let Err(e) = self.try_append(rec) {
            record_append_failure();
            warn!(
                "unable to write test journal {}: {:#}",
                self.path.display(),
                e
            );
        }
    }

    /// Записать результат прогона сущности (current format).
    pub fn record<P: JournalPayload>(&self, entity_id: &str, payload: P) {
        self.append(&LogicalRecord::new(entity_id, payload));
    }

    /// Компактация по политике из конфига; `now` — текущее время.
    pub fn load_at<P, S>(&self, sink: &mut S, now: u64) -> Result<CompactReport>
    where
        P: JournalPayload,
        S: HistorySink<P> + ?Sized,
    {
        if !self.cfg.enabled {
            return Ok(CompactReport::default());
        }
        if !self.path.exists() {
            debug!("journal {}: not present, nothing to load", self.path.display());
            return Ok(CompactReport::default());
        }
        let _guard = maybe_lock(&self.path, LockMode::Exclusive, self.cfg.lock)?;
        compact_and_load::<P, S>(&self.path, &self.cfg.retention(), now, self.cfg.fsync, sink)
            .with_context(|| format!("load journal {}", self.path.display()))
    }

    /// load_at(sink, now_secs()).
    pub fn load<P, S>(&self, sink: &mut S) -> Result<CompactReport>
    where
        P: JournalPayload,
        S: HistorySink<P> + ?Sized,
    {
        self.load_at::<P, S>(sink, now_secs())
    }

    /// Прочитать все записи без политики и без перезаписи.
    /// Работает и для выключенного журнала (инструмент обслуживания).
    pub fn scan<P: JournalPayload>(&self) -> Result<ScanReport<P>> {
        if !self.path.exists() {
            return Ok(ScanReport::default());
        }
        let _guard = maybe_lock(&self.path, LockMode::Shared, self.cfg.lock)?;
        let mut rd = match JournalReader::<File, P>::open(&self.path)? {
            Some(rd) => rd,
            None => return Ok(ScanReport::default()),
        };
        let entries = rd.read_all()?;
        let file_len = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(ScanReport {
            entries,
            problems: *rd.problems(),
            file_len,
        })
    }
}
