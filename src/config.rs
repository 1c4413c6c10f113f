//! Centralized configuration and builder for the journal.
//!
//! Goals:
//! - Single place to collect tunables instead of scattering env lookups.
//! - Configuration problems never block the caller: a missing or malformed rc file
//!   and unparsable env values are ignored and defaults stay in effect.
//!
//! Sources, in order of precedence (later wins):
//! 1. defaults;
//! 2. rc file (JSON, default `$HOME/.rjrc`), section "journal":
//!    {"journal": {"enabled": true, "max_age_secs": 604800, "max_per_entity": 4,
//!                 "lock": true, "fsync": false}}
//! 3. environment (RJ_*), see `JournalConfig::apply_env`;
//! 4. builder overrides (`with_*`).
//!
//! Defaults:
//! - enabled = true
//! - max_age_secs = None (no age-based eviction)
//! - max_per_entity = 4
//! - data_dir = ".rjdata", name = "journal" → `<project>/.rjdata/journal.bin`
//! - lock = true (fs2 advisory lock around append/compaction/fix)
//! - fsync = true (fsync after append and before the compaction rename)

use log::debug;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::consts::{
    DEFAULT_DATA_DIR, DEFAULT_JOURNAL_NAME, DEFAULT_MAX_PER_ENTITY, JOURNAL_EXT, RC_FILE,
};
use crate::journal::RetentionPolicy;

/// Top-level configuration for a journal instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalConfig {
    /// Master switch. When false, append and load do nothing at all.
    /// Env: RJ_JOURNAL_ENABLED (default true; "1|true|on|yes" => true)
    pub enabled: bool,

    /// Age limit in seconds for retained records.
    /// Env: RJ_MAX_AGE_SECS (default unset)
    pub max_age_secs: Option<u64>,

    /// Records kept per entity (0 disables the cap).
    /// Env: RJ_MAX_PER_ENTITY (default 4)
    pub max_per_entity: usize,

    /// Project-relative data directory.
    /// Env: RJ_DATA_DIR (default ".rjdata")
    pub data_dir: String,

    /// Journal file stem; the file is `<data_dir>/<name>.bin`.
    /// Env: RJ_JOURNAL_NAME (default "journal")
    pub name: String,

    /// Take an advisory lock around writers.
    /// Env: RJ_LOCK (default true)
    pub lock: bool,

    /// fsync appended frames and the compacted file.
    /// Env: RJ_FSYNC (default true)
    pub fsync: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: None,
            max_per_entity: DEFAULT_MAX_PER_ENTITY,
            data_dir: DEFAULT_DATA_DIR.to_string(),
            name: DEFAULT_JOURNAL_NAME.to_string(),
            lock: true,
            fsync: true,
        }
    }
}

/// Shape of the rc file. Every field optional; unknown keys ignored.
#[derive(Debug, Default, Deserialize)]
struct RcFile {
    #[serde(default)]
    journal: RcJournal,
}

#[derive(Debug, Default, Deserialize)]
struct RcJournal {
    enabled: Option<bool>,
    max_age_secs: Option<u64>,
    max_per_entity: Option<usize>,
    data_dir: Option<String>,
    name: Option<String>,
    lock: Option<bool>,
    fsync: Option<bool>,
}

#[inline]
fn parse_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "on" || s == "yes"
}

impl JournalConfig {
    /// Defaults + rc file at the default location + env.
    pub fn load() -> Self {
        let mut cfg = Self::default();
        if let Some(rc) = default_rc_path() {
            cfg.apply_rc_file(&rc);
        }
        cfg.apply_env();
        cfg
    }

    /// Defaults + env only (no rc file).
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Defaults + the given rc file (errors ignored).
    pub fn from_rc_file(path: &Path) -> Self {
        let mut cfg = Self::default();
        cfg.apply_rc_file(path);
        cfg
    }

    /// Overlay values from a JSON rc file. Missing or malformed file — no change.
    pub fn apply_rc_file(&mut self, path: &Path) {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                debug!("config: rc file {} not read: {}", path.display(), e);
                return;
            }
        };
        let rc: RcFile = match serde_json::from_slice(&bytes) {
            Ok(rc) => rc,
            Err(e) => {
                debug!("config: rc file {} ignored: {}", path.display(), e);
                return;
            }
        };
        let j = rc.journal;
        if let Some(v) = j.enabled {
            self.enabled = v;
        }
        if j.max_age_secs.is_some() {
            self.max_age_secs = j.max_age_secs;
        }
        if let Some(v) = j.max_per_entity {
            self.max_per_entity = v;
        }
        if let Some(v) = j.data_dir.filter(|s| !s.trim().is_empty()) {
            self.data_dir = v;
        }
        if let Some(v) = j.name.filter(|s| !s.trim().is_empty()) {
            self.name = v;
        }
        if let Some(v) = j.lock {
            self.lock = v;
        }
        if let Some(v) = j.fsync {
            self.fsync = v;
        }
    }

    /// Overlay values from RJ_* environment variables; unparsable values are skipped.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("RJ_JOURNAL_ENABLED") {
            self.enabled = parse_flag(&v);
        }

        if let Ok(v) = std::env::var("RJ_MAX_AGE_SECS") {
            let s = v.trim();
            if s.is_empty() || s == "none" || s == "off" {
                self.max_age_secs = None;
            } else if let Ok(n) = s.parse::<u64>() {
                self.max_age_secs = Some(n);
            }
        }

        if let Ok(v) = std::env::var("RJ_MAX_PER_ENTITY") {
            if let Ok(n) = v.trim().parse::<usize>() {
                self.max_per_entity = n;
            }
        }

        if let Ok(v) = std::env::var("RJ_DATA_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                self.data_dir = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("RJ_JOURNAL_NAME") {
            let s = v.trim();
            if !s.is_empty() {
                self.name = s.to_string();
            }
        }

        if let Ok(v) = std::env::var("RJ_LOCK") {
            self.lock = parse_flag(&v);
        }

        if let Ok(v) = std::env::var("RJ_FSYNC") {
            self.fsync = parse_flag(&v);
        }
    }

    /// Fluent setters (builder-style) to override specific fields.

    pub fn with_enabled(mut self, on: bool) -> Self {
        self.enabled = on;
        self
    }

    pub fn with_max_age_secs(mut self, secs: Option<u64>) -> Self {
        self.max_age_secs = secs;
        self
    }

    pub fn with_max_per_entity(mut self, n: usize) -> Self {
        self.max_per_entity = n;
        self
    }

    pub fn with_data_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_lock(mut self, on: bool) -> Self {
        self.lock = on;
        self
    }

    pub fn with_fsync(mut self, on: bool) -> Self {
        self.fsync = on;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }

    /// Retention rules derived from this configuration.
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_age_secs: self.max_age_secs,
            max_per_entity: self.max_per_entity,
        }
    }

    /// `<project>/<data_dir>/<name>.bin`
    pub fn journal_path(&self, project_root: &Path) -> PathBuf {
        project_root
            .join(&self.data_dir)
            .join(format!("{}.{}", self.name, JOURNAL_EXT))
    }
}

/// `$HOME/.rjrc`, if HOME is set.
pub fn default_rc_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(|h| PathBuf::from(h).join(RC_FILE))
}

impl fmt::Display for JournalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "JournalConfig {{ \
             enabled: {}, \
             max_age_secs: {}, \
             max_per_entity: {}, \
             data_dir: {}, \
             name: {}, \
             lock: {}, \
             fsync: {} \
             }}",
            self.enabled,
            self.max_age_secs
                .map(|v| v.to_string())
                .unwrap_or_else(|| "unset".to_string()),
            self.max_per_entity,
            self.data_dir,
            self.name,
            self.lock,
            self.fsync,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc_in_temp(tag: &str, body: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "rjtest-rc-{tag}-{}-{}",
            std::process::id(),
            crate::util::now_secs()
        ));
        std::fs::write(&p, body).expect("write rc");
        p
    }

    #[test]
    fn defaults() {
        let c = JournalConfig::default();
        assert!(c.enabled);
        assert_eq!(c.max_age_secs, None);
        assert_eq!(c.max_per_entity, 4);
        assert_eq!(
            c.journal_path(Path::new("/proj")),
            PathBuf::from("/proj/.rjdata/journal.bin")
        );
    }

    #[test]
    fn rc_file_overrides_retention() {
        let p = rc_in_temp(
            "ok",
            r#"{"journal": {"max_age_secs": 3600, "max_per_entity": 2, "enabled": false}, "other": 1}"#,
        );
        let c = JournalConfig::from_rc_file(&p);
        assert_eq!(c.max_age_secs, Some(3600));
        assert_eq!(c.max_per_entity, 2);
        assert!(!c.enabled);
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn rc_file_sets_lock_and_fsync() {
        let p = rc_in_temp("flags", r#"{"journal": {"lock": false, "fsync": false}}"#);
        let c = JournalConfig::from_rc_file(&p);
        assert!(!c.lock);
        assert!(!c.fsync);
        assert_eq!(c.max_per_entity, 4);
        let _ = std::fs::remove_file(&p);

        // отсутствующие ключи не трогают значения
        let p = rc_in_temp("noflags", r#"{"journal": {"max_per_entity": 3}}"#);
        let c = JournalConfig::from_rc_file(&p);
        assert!(c.lock);
        assert!(c.fsync);
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn malformed_rc_file_keeps_defaults() {
        let p = rc_in_temp("bad", "{ this is not json");
        assert_eq!(JournalConfig::from_rc_file(&p), JournalConfig::default());
        let _ = std::fs::remove_file(&p);

        let p = rc_in_temp("badtype", r#"{"journal": {"max_per_entity": "four"}}"#);
        assert_eq!(JournalConfig::from_rc_file(&p), JournalConfig::default());
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn missing_rc_file_keeps_defaults() {
        let p = Path::new("/definitely/not/here/.rjrc");
        assert_eq!(JournalConfig::from_rc_file(p), JournalConfig::default());
    }

    #[test]
    fn builder_and_retention() {
        let c = JournalConfig::default()
            .with_max_age_secs(Some(10))
            .with_max_per_entity(7)
            .with_name("runs")
            .with_data_dir(".csdata")
            .build();
        let r = c.retention();
        assert_eq!(r.max_age_secs, Some(10));
        assert_eq!(r.max_per_entity, 7);
        assert_eq!(
            c.journal_path(Path::new("p")),
            PathBuf::from("p/.csdata/runs.bin")
        );
        assert!(c.to_string().contains("max_per_entity: 7"));
    }
}
