//! util — общие утилиты (время, пути-соседи, fsync каталога).
//!
//! Содержит:
//! - now_secs(): текущее Unix-время в секундах.
//! - sibling_path(): `<file>.<suffix>` рядом с журналом (lock/compact/recovered).
//! - fsync_parent_dir(): best-effort fsync каталога после rename.
//! - same_file(): два пути указывают на один существующий файл.
//! - TempFileGuard: удаляет недописанный временный файл при ошибке.

use std::fs;
use std::path::{Path, PathBuf};

/// Текущее Unix-время в секундах.
#[inline]
pub fn now_secs() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `<path>.<suffix>`: расширение добавляется, а не заменяется.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".");
    s.push(suffix);
    PathBuf::from(s)
}

/// Best-effort fsync родительского каталога (чтобы rename пережил crash).
/// На платформах, где каталог нельзя открыть как файл, молча ничего не делает.
pub fn fsync_parent_dir(path: &Path) {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Ok(dir) = std::fs::File::open(parent) {
        let _ = dir.sync_all();
    }
}

/// true, только если оба пути существуют и ведут к одному файлу.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// Removes the file on drop unless `keep()` was called.
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Файл дописан (или уже переименован) — не трогать.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_monotonic_nonzero() {
        let a = now_secs();
        let b = now_secs();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn sibling_keeps_extension() {
        let p = sibling_path(Path::new("data/journal.bin"), "compact");
        assert_eq!(p, PathBuf::from("data/journal.bin.compact"));
    }

    fn temp_file(tag: &str) -> PathBuf {
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let p = std::env::temp_dir().join(format!("rjtest-util-{tag}-{}-{t}", std::process::id()));
        fs::write(&p, b"partial").expect("write temp");
        p
    }

    #[test]
    fn guard_removes_file_unless_kept() {
        let dropped = temp_file("dropped");
        {
            let g = TempFileGuard::new(&dropped);
            assert_eq!(g.path(), dropped.as_path());
        }
        assert!(!dropped.exists());

        let kept = temp_file("kept");
        TempFileGuard::new(&kept).keep();
        assert!(kept.exists());
        let _ = fs::remove_file(&kept);
    }

    #[test]
    fn guard_tolerates_already_moved_file() {
        let p = temp_file("moved");
        let g = TempFileGuard::new(&p);
        fs::remove_file(&p).expect("remove");
        drop(g);
        assert!(!p.exists());
    }

    #[test]
    fn same_file_sees_through_relative_segments() {
        let p = temp_file("same");
        let dir = p.parent().expect("parent");
        let name = p.file_name().expect("name");
        let indirect = dir.join(".").join(name);
        assert!(same_file(&p, &indirect));
        assert!(!same_file(&p, &dir.join("rjtest-util-nonexistent")));
        let _ = fs::remove_file(&p);
    }
}
