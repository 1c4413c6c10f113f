//! Межпроцессная блокировка журнала.
//!
//! fs2 advisory lock на `<journal>.lock`:
//! - Exclusive — append, compaction и fix; писатели из разных процессов
//!   (параллельные прогоны тестов) сериализуются.
//! - Shared — dump/stat: читатель не видит файл в момент подмены.
//!
//! Lock-файл создаётся только операциями, которые и так пишут в каталог журнала.
//! Блокировка снимается в Drop.
//! Методы fs2 вызываются через FileExt:: — у std::fs::File есть одноимённые.

use anyhow::{Context, Result};
use fs2::FileExt;
use log::debug;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::consts::LOCK_SUFFIX;
use crate::util::sibling_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// `<journal>.lock`
pub fn lock_file_path(journal: &Path) -> PathBuf {
    sibling_path(journal, LOCK_SUFFIX)
}

fn try_lock(file: &File, mode: LockMode) -> std::io::Result<()> {
    match mode {
        LockMode::Shared => FileExt::try_lock_shared(file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
    }
}

fn open_lock(journal: &Path, mode: LockMode, wait: bool) -> Result<LockGuard> {
    let path = lock_file_path(journal);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;

    if let Err(e) = try_lock(&file, mode) {
        if !wait {
            return Err(e).with_context(|| format!("{:?} lock busy: {}", mode, path.display()));
        }
        debug!("journal lock {} busy, waiting ({:?})", path.display(), mode);
        match mode {
            LockMode::Shared => FileExt::lock_shared(&file),
            LockMode::Exclusive => FileExt::lock_exclusive(&file),
        }
        .with_context(|| format!("{:?} lock {}", mode, path.display()))?;
    }
    Ok(LockGuard { file, path, mode })
}

/// Взять lock, дождавшись его освобождения другим процессом.
pub fn acquire_lock(journal: &Path, mode: LockMode) -> Result<LockGuard> {
    open_lock(journal, mode, true)
}

/// Без ожидания: Err, если lock уже занят.
pub fn try_acquire_lock(journal: &Path, mode: LockMode) -> Result<LockGuard> {
    open_lock(journal, mode, false)
}

pub fn acquire_exclusive_lock(journal: &Path) -> Result<LockGuard> {
    acquire_lock(journal, LockMode::Exclusive)
}

pub fn acquire_shared_lock(journal: &Path) -> Result<LockGuard> {
    acquire_lock(journal, LockMode::Shared)
}

/// Lock только если он включён конфигом; `None` — работаем без lock.
pub(crate) fn maybe_lock(
    journal: &Path,
    mode: LockMode,
    enabled: bool,
) -> Result<Option<LockGuard>> {
    if !enabled {
        return Ok(None);
    }
    acquire_lock(journal, mode).map(Some)
}
