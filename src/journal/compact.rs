//! journal/compact — двухпроходная компактация журнала с политикой хранения.
//!
//! Проход 1 (classify): читаем все записи по порядку и решаем, какие выбросить:
//! - format_version < CURRENT                          → obsolete;
//! - format_version > CURRENT                          → newer: переносится как есть,
//!   не доставляется и не участвует в лимите на сущность;
//! - payload == None                                   → inert (не хранится и не считается);
//! - max_age задан и now - timestamp > max_age         → expired;
//! - иначе позиция кладётся в очередь сущности; если очередь длиннее max_per_entity,
//!   самая старая позиция уходит в discard                → over_cap.
//!
//! Проход 2 (rewrite): перечитываем файл и пишем оставшиеся кадры как есть (raw bytes,
//! без перекодирования) во временный `<journal>.compact`; осмысленные payload'ы
//! доставляются в HistorySink. Затем fsync + атомарный rename поверх журнала.
//!
//! Один проход невозможен: "последние N на сущность" требует знать всю популяцию
//! записей сущности заранее.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::reader::{JournalReader, ReadProblems};
use super::record::{HistorySink, JournalPayload};
use crate::consts::{COMPACT_SUFFIX, DEFAULT_MAX_PER_ENTITY};
use crate::metrics::record_compaction;
use crate::util::{fsync_parent_dir, sibling_path, TempFileGuard};

/// Which records survive a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Records older than this many seconds are dropped. `None` — no age limit.
    pub max_age_secs: Option<u64>,
    /// Most recent records kept per entity. 0 disables the cap.
    pub max_per_entity: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_secs: None,
            max_per_entity: DEFAULT_MAX_PER_ENTITY,
        }
    }
}

impl RetentionPolicy {
    pub fn with_max_age_secs(mut self, secs: Option<u64>) -> Self {
        self.max_age_secs = secs;
        self
    }

    pub fn with_max_per_entity(mut self, n: usize) -> Self {
        self.max_per_entity = n;
        self
    }

    /// true, если запись с таким timestamp уже слишком старая.
    #[inline]
    pub fn is_expired(&self, timestamp: Option<u64>, now: u64) -> bool {
        match (self.max_age_secs, timestamp) {
            (Some(max_age), Some(ts)) => now.saturating_sub(ts) > max_age,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Obsolete,
    Expired,
    OverCap,
}

#[derive(Debug, Default, Clone)]
pub struct CompactReport {
    /// Valid frames seen in the classify pass.
    pub records_read: u64,
    pub kept: u64,
    pub inert: u64,
    /// Frames of a newer format carried forward untouched.
    pub newer_format: u64,
    pub discarded_obsolete: u64,
    pub discarded_expired: u64,
    pub discarded_over_cap: u64,
    /// Payloads accepted by the sink.
    pub delivered: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub problems: ReadProblems,
}

impl CompactReport {
    pub fn discarded(&self) -> u64 {
        self.discarded_obsolete + self.discarded_expired + self.discarded_over_cap
    }

    fn note(&mut self, reason: DiscardReason) {
        match reason {
            DiscardReason::Obsolete => self.discarded_obsolete += 1,
            DiscardReason::Expired => self.discarded_expired += 1,
            DiscardReason::OverCap => self.discarded_over_cap += 1,
        }
    }
}

/// Result of the classify pass: positions (arrival index among valid frames)
/// to drop and to skip.
#[derive(Debug, Default)]
pub struct Classification {
    pub discard: HashMap<u64, DiscardReason>,
    pub inert: HashSet<u64>,
    pub newer_format: u64,
    pub records_read: u64,
    pub problems: ReadProblems,
}

impl Classification {
    #[inline]
    pub fn keeps(&self, pos: u64) -> bool {
        !self.discard.contains_key(&pos) && !self.inert.contains(&pos)
    }
}

/// Проход 1: классификация всех записей файла.
pub fn classify<P: JournalPayload>(
    path: &Path,
    policy: &RetentionPolicy,
    now: u64,
) -> Result<Classification> {
    let mut cls = Classification::default();
    let mut rd = match JournalReader::<File, P>::open(path)? {
        Some(rd) => rd,
        None => return Ok(cls),
    };

    let mut per_entity: HashMap<String, VecDeque<u64>> = HashMap::new();
    let mut pos: u64 = 0;

    while let Some(entry) = rd.next_record()? {
        let rec = entry.record;
        let this = pos;
        pos += 1;

        if rec.is_obsolete() {
            cls.discard.insert(this, DiscardReason::Obsolete);
            continue;
        }
        if rec.is_newer_format() {
            cls.newer_format += 1;
            continue;
        }
        let payload = match rec.payload {
            Some(p) => p,
            None => {
                cls.inert.insert(this);
                continue;
            }
        };
        if policy.is_expired(payload.timestamp(), now) {
            cls.discard.insert(this, DiscardReason::Expired);
            continue;
        }
        if policy.max_per_entity > 0 {
            let q = per_entity.entry(rec.entity_id).or_default();
            q.push_back(this);
            while q.len() > policy.max_per_entity {
                if let Some(oldest) = q.pop_front() {
                    cls.discard.insert(oldest, DiscardReason::OverCap);
                }
            }
        }
    }

    cls.records_read = pos;
    cls.problems = *rd.problems();
    Ok(cls)
}

/// Полный цикл компактации + доставка истории в `sink`.
///
/// Отсутствующий журнал — no-op (файл не создаётся). Блокировки здесь нет —
/// её берёт вызывающий (Journal::load).
pub fn compact_and_load<P, S>(
    path: &Path,
    policy: &RetentionPolicy,
    now: u64,
    fsync: bool,
    sink: &mut S,
) -> Result<CompactReport>
where
    P: JournalPayload,
    S: HistorySink<P> + ?Sized,
{
    let mut rep = CompactReport::default();
    let bytes_before = match fs::metadata(path) {
        Ok(m) => m.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("compact: journal {} not found, nothing to do", path.display());
            return Ok(rep);
        }
        Err(e) => return Err(e).with_context(|| format!("stat journal {}", path.display())),
    };
    rep.bytes_before = bytes_before;

    // ---- pass 1 ----
    let cls = classify::<P>(path, policy, now)
        .with_context(|| format!("classify journal {}", path.display()))?;
    rep.records_read = cls.records_read;
    rep.inert = cls.inert.len() as u64;
    rep.newer_format = cls.newer_format;
    for reason in cls.discard.values() {
        rep.note(*reason);
    }
    rep.problems = cls.problems;

    // ---- pass 2 ----
    let tmp = sibling_path(path, COMPACT_SUFFIX);
    let out = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)
        .with_context(|| format!("create {}", tmp.display()))?;
    // любая ошибка ниже удаляет недописанный .compact
    let tmp_guard = TempFileGuard::new(&tmp);
    let mut w = BufWriter::new(out);

    let written = rewrite_kept::<P, S, _>(path, &cls, &mut w, sink, &mut rep)?;

    let out = w
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flush {}", tmp.display()))?;
    if fsync {
        out.sync_all()
            .with_context(|| format!("fsync {}", tmp.display()))?;
    }
    drop(out);

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    tmp_guard.keep();
    if fsync {
        fsync_parent_dir(path);
    }
    rep.bytes_after = written;

    record_compaction(rep.kept, rep.discarded(), rep.delivered);
    if !rep.problems.is_clean() {
        warn!(
            "journal {}: skipped {} corrupt frame(s) during compaction ({:?})",
            path.display(),
            rep.problems.total(),
            rep.problems
        );
    }
    info!(
        "journal {}: compacted {} record(s): kept={}, discarded={}, inert={}, newer_format={}, delivered={}, {} -> {} bytes",
        path.display(),
        rep.records_read,
        rep.kept,
        rep.discarded(),
        rep.inert,
        rep.newer_format,
        rep.delivered,
        rep.bytes_before,
        rep.bytes_after
    );
    Ok(rep)
}

/// Проход 2: переписать оставшиеся кадры как есть и доставить историю.
fn rewrite_kept<P, S, W>(
    path: &Path,
    cls: &Classification,
    w: &mut W,
    sink: &mut S,
    rep: &mut CompactReport,
) -> Result<u64>
where
    P: JournalPayload,
    S: HistorySink<P> + ?Sized,
    W: Write,
{
    let mut rd = match JournalReader::<File, P>::open(path)? {
        Some(rd) => rd,
        None => return Ok(0),
    };

    let mut written = 0u64;
    let mut pos: u64 = 0;
    while let Some(entry) = rd.next_record()? {
        let this = pos;
        pos += 1;
        if !cls.keeps(this) {
            continue;
        }

        w.write_all(&entry.raw).context("write kept frame")?;
        written += entry.raw.len() as u64;
        rep.kept += 1;

        if let Some(payload) = entry.record.payload {
            if payload.is_meaningful() && sink.add_history(&entry.record.entity_id, payload) {
                rep.delivered += 1;
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strictly_older_than_max_age() {
        let p = RetentionPolicy::default().with_max_age_secs(Some(100));
        assert!(!p.is_expired(Some(900), 1000));
        assert!(p.is_expired(Some(899), 1000));
        assert!(!p.is_expired(None, 1000));
        // timestamp in the future never expires
        assert!(!p.is_expired(Some(2000), 1000));
        assert!(!RetentionPolicy::default().is_expired(Some(0), u64::MAX));
    }

    #[test]
    fn default_policy_caps_at_four() {
        let p = RetentionPolicy::default();
        assert_eq!(p.max_per_entity, 4);
        assert_eq!(p.max_age_secs, None);
    }
}
