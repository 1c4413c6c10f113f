//! journal/fix — ручное восстановление повреждённого журнала.
//!
//! Читает все декодируемые кадры (повреждения пропускаются через resync) и пишет
//! их как есть в recovery-файл. Политика хранения НЕ применяется.
//! fix_in_place дополнительно атомарно подменяет журнал восстановленным файлом.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::reader::{JournalReader, ReadProblems};
use super::record::JournalPayload;
use super::writer::Journal;
use crate::consts::RECOVERED_SUFFIX;
use crate::lock::{maybe_lock, LockMode};
use crate::metrics::record_fix;
use crate::util::{fsync_parent_dir, same_file, sibling_path, TempFileGuard};

#[derive(Debug, Clone, Default)]
pub struct FixReport {
    /// Where the recovered frames were written (None if the journal is absent).
    pub output: Option<PathBuf>,
    pub frames_recovered: u64,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub problems: ReadProblems,
    /// The recovered file replaced the journal.
    pub replaced: bool,
}

/// Скопировать все валидные кадры `src` в `dest` (перезаписывая dest).
/// `dest`, указывающий на сам `src`, — ошибка: truncate уничтожил бы журнал до чтения.
pub fn recover_frames<P: JournalPayload>(src: &Path, dest: &Path, fsync: bool) -> Result<FixReport> {
    if same_file(src, dest) {
        bail!(
            "recovery destination {} is the journal itself; use in-place fix instead",
            dest.display()
        );
    }
    let mut rep = FixReport::default();
    let mut rd = match JournalReader::<File, P>::open(src)? {
        Some(rd) => rd,
        None => return Ok(rep),
    };
    rep.bytes_before = fs::metadata(src).map(|m| m.len()).unwrap_or(0);

    let out = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(dest)
        .with_context(|| format!("create recovery file {}", dest.display()))?;
    let dest_guard = TempFileGuard::new(dest);
    let mut w = BufWriter::new(out);

    while let Some(entry) = rd.next_record()? {
        w.write_all(&entry.raw)
            .with_context(|| format!("write {}", dest.display()))?;
        rep.frames_recovered += 1;
        rep.bytes_after += entry.raw.len() as u64;
    }

    let out = w
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flush {}", dest.display()))?;
    if fsync {
        out.sync_all()
            .with_context(|| format!("fsync {}", dest.display()))?;
    }
    dest_guard.keep();

    rep.problems = *rd.problems();
    rep.output = Some(dest.to_path_buf());
    record_fix(rep.frames_recovered);
    Ok(rep)
}

impl Journal {
    /// Восстановить кадры в `dest` (по умолчанию `<journal>.recovered`).
    pub fn fix<P: JournalPayload>(&self, dest: Option<&Path>) -> Result<FixReport> {
        if !self.path().exists() {
            return Ok(FixReport::default());
        }
        let dest = dest
            .map(Path::to_path_buf)
            .unwrap_or_else(|| sibling_path(self.path(), RECOVERED_SUFFIX));
        let _guard = maybe_lock(self.path(), LockMode::Exclusive, self.config().lock)?;
        let rep = recover_frames::<P>(self.path(), &dest, self.config().fsync)
            .with_context(|| format!("fix journal {}", self.path().display()))?;
        log_fix(self.path(), &rep);
        Ok(rep)
    }

    /// fix + атомарная подмена журнала восстановленным файлом.
    pub fn fix_in_place<P: JournalPayload>(&self) -> Result<FixReport> {
        if !self.path().exists() {
            return Ok(FixReport::default());
        }
        let dest = sibling_path(self.path(), RECOVERED_SUFFIX);
        let _guard = maybe_lock(self.path(), LockMode::Exclusive, self.config().lock)?;
        let mut rep = recover_frames::<P>(self.path(), &dest, self.config().fsync)
            .with_context(|| format!("fix journal {}", self.path().display()))?;
        let dest_guard = TempFileGuard::new(&dest);
        fs::rename(&dest, self.path()).with_context(|| {
            format!("rename {} -> {}", dest.display(), self.path().display())
        })?;
        dest_guard.keep();
        if self.config().fsync {
            fsync_parent_dir(self.path());
        }
        rep.output = Some(self.path().to_path_buf());
        rep.replaced = true;
        log_fix(self.path(), &rep);
        Ok(rep)
    }
}

fn log_fix(path: &Path, rep: &FixReport) {
    if !rep.problems.is_clean() {
        warn!(
            "journal {}: dropped {} corrupt frame(s), {} byte(s) skipped",
            path.display(),
            rep.problems.total(),
            rep.problems.bytes_skipped
        );
    }
    info!(
        "journal {}: recovered {} frame(s), {} -> {} bytes",
        path.display(),
        rep.frames_recovered,
        rep.bytes_before,
        rep.bytes_after
    );
}
