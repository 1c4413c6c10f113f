//! journal/reader — потоковое чтение кадров журнала с resync по magic.
//!
//! Назначение:
//! - Единый путь чтения для compaction, fix и CLI (dump/stat).
//! - Читает источник чанками по READ_CHUNK (64 KiB); один read() не обязан вернуть целый кадр.
//! - Повреждения (bad magic, oversized, checksum, body, обрыв хвоста) НЕ пробрасываются:
//!   они учитываются в ReadProblems, а чтение продолжается со следующего magic.
//! - Ошибки ввода-вывода пробрасываются как есть.
//!
//! Состояния: Empty → Reading ⇄ Resyncing → Exhausted.
//!
//! Использование:
//!   if let Some(mut rd) = JournalReader::<_, RunRecord>::open(&path)? {
//!       while let Some(entry) = rd.next_record()? { /* entry.record, entry.raw */ }
//!   }

use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::marker::PhantomData;
use std::path::Path;

use super::codec::{find_magic, resynchronize, try_decode_frame, Decoded, FrameError};
use super::record::LogicalRecord;
use crate::consts::{MAGIC_LEN, READ_CHUNK};
use crate::metrics::record_resync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Nothing consumed yet.
    Empty,
    Reading,
    /// Corruption seen, scanning for the next magic.
    Resyncing,
    Exhausted,
}

/// Counters of every distinct reason a candidate frame was skipped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadProblems {
    pub bad_magic: u64,
    pub oversized: u64,
    pub checksum_mismatch: u64,
    pub payload_corrupt: u64,
    pub premature_eof: u64,
    pub resyncs: u64,
    pub bytes_skipped: u64,
}

impl ReadProblems {
    fn note(&mut self, err: &FrameError) {
        match err {
            FrameError::BadMagic(_) => self.bad_magic += 1,
            FrameError::Oversized(_) => self.oversized += 1,
            FrameError::ChecksumMismatch => self.checksum_mismatch += 1,
            FrameError::PayloadCorrupt(_) | FrameError::UnsupportedVersion(_) => {
                self.payload_corrupt += 1
            }
            // encode-side errors never come out of a decode
            FrameError::TooLarge(_) | FrameError::Serialize(_) => {}
        }
    }

    /// Total number of frame-level failures (resyncs and skipped bytes excluded).
    pub fn total(&self) -> u64 {
        self.bad_magic
            + self.oversized
            + self.checksum_mismatch
            + self.payload_corrupt
            + self.premature_eof
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    pub fn merge(&mut self, other: &ReadProblems) {
        self.bad_magic += other.bad_magic;
        self.oversized += other.oversized;
        self.checksum_mismatch += other.checksum_mismatch;
        self.payload_corrupt += other.payload_corrupt;
        self.premature_eof += other.premature_eof;
        self.resyncs += other.resyncs;
        self.bytes_skipped += other.bytes_skipped;
    }
}

/// One decoded record together with its exact on-disk bytes.
#[derive(Debug, Clone)]
pub struct JournalEntry<P> {
    pub record: LogicalRecord<P>,
    pub raw: Vec<u8>,
}

pub struct JournalReader<R, P> {
    src: R,
    buf: Vec<u8>,
    /// Start of unconsumed bytes in `buf`.
    start: usize,
    eof: bool,
    state: ReaderState,
    problems: ReadProblems,
    /// Absolute stream offset of `buf[0]` (для диагностики).
    base_off: u64,
    _payload: PhantomData<fn() -> P>,
}

impl<P: DeserializeOwned> JournalReader<File, P> {
    /// Открыть журнал. Отсутствующий файл — пустой журнал (Ok(None)).
    pub fn open(path: &Path) -> Result<Option<Self>> {
        match File::open(path) {
            Ok(f) => Ok(Some(Self::from_reader(f))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("open journal {}", path.display())),
        }
    }
}

impl<R: Read, P: DeserializeOwned> JournalReader<R, P> {
    pub fn from_reader(src: R) -> Self {
        Self {
            src,
            buf: Vec::with_capacity(READ_CHUNK),
            start: 0,
            eof: false,
            state: ReaderState::Empty,
            problems: ReadProblems::default(),
            base_off: 0,
            _payload: PhantomData,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn problems(&self) -> &ReadProblems {
        &self.problems
    }

    /// Следующая валидная запись в порядке файла; Ok(None) — поток исчерпан.
    pub fn next_record(&mut self) -> Result<Option<JournalEntry<P>>> {
        loop {
            if self.state == ReaderState::Exhausted {
                return Ok(None);
            }

            let avail = &self.buf[self.start..];
            match try_decode_frame::<P>(avail) {
                Ok(Decoded::Frame { record, frame_len }) => {
                    let raw = avail[..frame_len].to_vec();
                    self.start += frame_len;
                    self.state = ReaderState::Reading;
                    return Ok(Some(JournalEntry { record, raw }));
                }
                Ok(Decoded::NeedMore) => {
                    if self.fill()? {
                        if self.state == ReaderState::Empty {
                            self.state = ReaderState::Reading;
                        }
                        continue;
                    }
                    if self.start == self.buf.len() {
                        self.state = ReaderState::Exhausted;
                        return Ok(None);
                    }
                    // EOF посреди кадра: хвост оборван, но за ним (внутри заявленной
                    // длины) могут лежать целые кадры — ищем их.
                    self.problems.premature_eof += 1;
                    debug!(
                        "journal reader: truncated frame at off={}, {} byte(s) left",
                        self.abs_off(),
                        self.buf.len() - self.start
                    );
                    if !self.resync()? {
                        return Ok(None);
                    }
                }
                Err(e) => {
                    debug!("journal reader: {} at off={}", e, self.abs_off());
                    self.problems.note(&e);
                    if !self.resync()? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Прочитать все оставшиеся записи.
    pub fn read_all(&mut self) -> Result<Vec<JournalEntry<P>>> {
        let mut out = Vec::new();
        while let Some(e) = self.next_record()? {
            out.push(e);
        }
        Ok(out)
    }

    #[inline]
    fn abs_off(&self) -> u64 {
        self.base_off + self.start as u64
    }

    /// Дочитать чанк. false — источник исчерпан.
    fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        // compact: сдвигаем непрочитанный хвост в начало буфера
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.base_off += self.start as u64;
            self.start = 0;
        }
        let old_len = self.buf.len();
        self.buf.resize(old_len + READ_CHUNK, 0);
        let n = loop {
            match self.src.read(&mut self.buf[old_len..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(old_len);
                    return Err(e).context("read journal chunk");
                }
            }
        };
        self.buf.truncate(old_len + n);
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        Ok(true)
    }

    /// Resync по потоку: отбросить первый байт и искать следующий magic, дочитывая чанки.
    /// true — найден (позиция на magic), false — поток кончился раньше (Exhausted).
    fn resync(&mut self) -> Result<bool> {
        self.state = ReaderState::Resyncing;
        self.problems.resyncs += 1;
        let from = self.abs_off();

        if let Some(off) = resynchronize(&self.buf[self.start..]) {
            self.start += off;
            return Ok(self.resynced(from));
        }
        // В буфере magic нет. Оставляем хвост MAGIC_LEN-1 байт (magic мог разрезаться
        // на границе чанка), но не раньше start+1 — первый байт отброшен в любом случае.
        let keep = (self.buf.len() - self.start - 1).min(MAGIC_LEN - 1);
        self.start = self.buf.len() - keep;

        loop {
            if !self.fill()? {
                self.start = self.buf.len();
                let skipped = self.abs_off() - from;
                self.problems.bytes_skipped += skipped;
                record_resync(skipped);
                debug!(
                    "journal reader: no magic after off={}, {} byte(s) of garbage at end",
                    from, skipped
                );
                self.state = ReaderState::Exhausted;
                return Ok(false);
            }
            if let Some(off) = find_magic(&self.buf[self.start..]) {
                self.start += off;
                return Ok(self.resynced(from));
            }
            let keep = (self.buf.len() - self.start).min(MAGIC_LEN - 1);
            self.start = self.buf.len() - keep;
        }
    }

    fn resynced(&mut self, from: u64) -> bool {
        let skipped = self.abs_off() - from;
        self.problems.bytes_skipped += skipped;
        record_resync(skipped);
        debug!(
            "journal reader: resynced at off={} after skipping {} byte(s)",
            self.abs_off(),
            skipped
        );
        self.state = ReaderState::Reading;
        true
    }
}
