use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use runjournal::lock::{lock_file_path, try_acquire_lock};
use runjournal::metrics;
use runjournal::{
    acquire_exclusive_lock, Journal, JournalConfig, LockMode, LogicalRecord, NoHistory, RunRecord,
    TestState,
};

// ---------- helpers ----------

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let base = std::env::temp_dir();
    base.join(format!("rjtest-ops-{prefix}-{pid}-{t}-{id}"))
}

fn cfg() -> JournalConfig {
    JournalConfig::default().with_fsync(false)
}

fn append_garbage(path: &std::path::Path, bytes: &[u8]) {
    let mut f = fs::OpenOptions::new()
        .append(true)
        .open(path)
        .expect("open for garbage");
    f.write_all(bytes).expect("write garbage");
}

// ---------- tests ----------

#[test]
fn disabled_journal_touches_nothing() {
    let root = unique_root("disabled");
    let j = Journal::in_project(&root, cfg().with_enabled(false));

    j.record("A", RunRecord::new(TestState::Pass, 1));
    j.try_append(&LogicalRecord::new("A", RunRecord::new(TestState::Fail, 2)))
        .expect("disabled append is a no-op");
    let rep = j
        .load_at::<RunRecord, _>(&mut NoHistory, 10)
        .expect("disabled load");

    assert_eq!(rep.records_read, 0);
    assert!(!root.exists(), "disabled journal must not create directories");
}

#[test]
fn load_of_missing_journal_creates_nothing() {
    let root = unique_root("missing");
    fs::create_dir_all(&root).expect("mkdir");
    let j = Journal::new(root.join("journal.bin"), cfg());

    let mut sink: HashMap<String, Vec<RunRecord>> = HashMap::new();
    sink.insert("A".into(), Vec::new());
    let rep = j.load_at::<RunRecord, _>(&mut sink, 10).expect("load");

    assert_eq!(rep.records_read, 0);
    assert!(sink["A"].is_empty());
    assert!(!j.path().exists());
    assert!(!lock_file_path(j.path()).exists());
    assert_eq!(fs::read_dir(&root).expect("ls").count(), 0);
}

#[test]
fn append_creates_parent_dirs_and_in_project_layout() {
    let root = unique_root("layout");
    let j = Journal::in_project(&root, cfg().with_data_dir(".rjdata").with_name("runs"));
    assert_eq!(j.path(), root.join(".rjdata").join("runs.bin"));

    j.record("A", RunRecord::new(TestState::Pass, 1));
    assert!(j.path().is_file());

    let scan = j.scan::<RunRecord>().expect("scan");
    assert_eq!(scan.entries.len(), 1);
    assert_eq!(scan.file_len, fs::metadata(j.path()).expect("meta").len());
    assert!(scan.problems.is_clean());
}

#[test]
fn failed_append_is_swallowed_and_counted() {
    let root = unique_root("badpath");
    fs::create_dir_all(&root).expect("mkdir");
    // обычный файл на месте каталога журнала
    let blocker = root.join("blocker");
    fs::write(&blocker, b"not a dir").expect("blocker");
    let j = Journal::new(blocker.join("journal.bin"), cfg());

    assert!(j
        .try_append(&LogicalRecord::new("A", RunRecord::new(TestState::Pass, 1)))
        .is_err());

    let before = metrics::snapshot().append_failures;
    j.record("A", RunRecord::new(TestState::Pass, 1));
    let after = metrics::snapshot().append_failures;
    assert!(after > before);
}

#[test]
fn appends_accumulate_in_file_order() {
    let root = unique_root("order");
    let j = Journal::new(root.join("j.bin"), cfg());
    let states = [TestState::Pass, TestState::Fail, TestState::BugPass, TestState::NotRun];
    for (i, st) in states.iter().enumerate() {
        j.record(&format!("t{i}"), RunRecord::new(*st, i as u64));
    }
    let scan = j.scan::<RunRecord>().expect("scan");
    let got: Vec<TestState> = scan
        .entries
        .iter()
        .map(|e| e.record.payload.as_ref().expect("payload").state)
        .collect();
    assert_eq!(got, states.to_vec());
    let ids: Vec<&str> = scan.entries.iter().map(|e| e.record.entity_id.as_str()).collect();
    assert_eq!(ids, vec!["t0", "t1", "t2", "t3"]);
}

#[test]
fn scan_of_missing_journal_is_empty() {
    let root = unique_root("scanmissing");
    let j = Journal::new(root.join("none.bin"), cfg());
    let scan = j.scan::<RunRecord>().expect("scan");
    assert!(scan.entries.is_empty());
    assert_eq!(scan.file_len, 0);
    assert!(!root.exists());
}

#[test]
fn fix_writes_recovered_copy_and_leaves_journal() {
    let root = unique_root("fix");
    let j = Journal::new(root.join("journal.bin"), cfg());
    j.record("A", RunRecord::new(TestState::Pass, 1));
    append_garbage(j.path(), &[0x13; 40]);
    j.record("B", RunRecord::new(TestState::Fail, 2));
    let original = fs::read(j.path()).expect("read");

    let rep = j.fix::<RunRecord>(None).expect("fix");
    let out = rep.output.clone().expect("output path");
    assert_eq!(out, root.join("journal.bin.recovered"));
    assert!(!rep.replaced);
    assert_eq!(rep.frames_recovered, 2);
    assert_eq!(rep.problems.bad_magic, 1);
    assert_eq!(rep.problems.bytes_skipped, 40);
    assert_eq!(rep.bytes_before, original.len() as u64);
    assert_eq!(rep.bytes_after + 40, rep.bytes_before);

    // журнал не тронут
    assert_eq!(fs::read(j.path()).expect("read"), original);

    let recovered = Journal::new(out, cfg());
    let scan = recovered.scan::<RunRecord>().expect("scan");
    assert!(scan.problems.is_clean());
    assert_eq!(scan.entries.len(), 2);
}

#[test]
fn fix_to_explicit_destination() {
    let root = unique_root("fixdest");
    let j = Journal::new(root.join("journal.bin"), cfg());
    j.record("A", RunRecord::new(TestState::Pass, 1));
    let dest = root.join("copy.bin");
    let rep = j.fix::<RunRecord>(Some(&dest)).expect("fix");
    assert_eq!(rep.output.as_deref(), Some(dest.as_path()));
    assert_eq!(fs::read(&dest).expect("dest"), fs::read(j.path()).expect("src"));
}

#[test]
fn fix_refuses_to_overwrite_the_journal_itself() {
    let root = unique_root("fixself");
    let j = Journal::new(root.join("journal.bin"), cfg());
    for t in 1..=3u64 {
        j.record("A", RunRecord::new(TestState::Pass, t));
    }
    let before = fs::read(j.path()).expect("read");

    assert!(j.fix::<RunRecord>(Some(j.path())).is_err());
    // тот же файл через другой путь
    let indirect = root.join(".").join("journal.bin");
    assert!(j.fix::<RunRecord>(Some(&indirect)).is_err());

    assert_eq!(fs::read(j.path()).expect("read"), before);
    assert_eq!(j.scan::<RunRecord>().expect("scan").entries.len(), 3);
}

#[test]
fn fix_in_place_replaces_journal() {
    let root = unique_root("fixinplace");
    let j = Journal::new(root.join("journal.bin"), cfg());
    j.record("A", RunRecord::new(TestState::Pass, 1));
    j.record("A", RunRecord::new(TestState::Pass, 2));
    // оборванный хвост
    append_garbage(j.path(), &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x00]);

    let rep = j.fix_in_place::<RunRecord>().expect("fix in place");
    assert!(rep.replaced);
    assert_eq!(rep.frames_recovered, 2);
    assert_eq!(rep.problems.premature_eof, 1);
    assert!(!root.join("journal.bin.recovered").exists());

    let scan = j.scan::<RunRecord>().expect("scan");
    assert!(scan.problems.is_clean());
    assert_eq!(scan.entries.len(), 2);
}

#[test]
fn fix_of_missing_journal_is_noop() {
    let root = unique_root("fixmissing");
    let j = Journal::new(root.join("journal.bin"), cfg());
    let rep = j.fix::<RunRecord>(None).expect("fix");
    assert!(rep.output.is_none());
    assert_eq!(rep.frames_recovered, 0);
    assert!(!root.exists());
}

#[test]
fn writer_lock_is_exclusive_between_handles() {
    let root = unique_root("lock");
    fs::create_dir_all(&root).expect("mkdir");
    let path = root.join("journal.bin");

    let held = acquire_exclusive_lock(&path).expect("lock");
    assert_eq!(held.mode(), LockMode::Exclusive);
    assert!(try_acquire_lock(&path, LockMode::Exclusive).is_err());
    drop(held);
    assert!(try_acquire_lock(&path, LockMode::Exclusive).is_ok());

    // без lock журнал работает, не создавая lock-файл
    let other = root.join("nolock.bin");
    let j = Journal::new(&other, cfg().with_lock(false));
    j.record("A", RunRecord::new(TestState::Pass, 1));
    assert!(other.exists());
    assert!(!lock_file_path(&other).exists());
}

#[test]
fn concurrent_appenders_never_interleave_frames() {
    let root = unique_root("concurrent");
    let path = root.join("journal.bin");
    let threads: Vec<_> = (0..4)
        .map(|t| {
            let path = path.clone();
            std::thread::spawn(move || {
                let j = Journal::new(path, cfg());
                for i in 0..50u64 {
                    j.record(
                        &format!("thread{t}::test"),
                        RunRecord::new(TestState::Pass, i).with_extra("pad", "x".repeat(200)),
                    );
                }
            })
        })
        .collect();
    for h in threads {
        h.join().expect("join");
    }

    let j = Journal::new(&path, cfg());
    let scan = j.scan::<RunRecord>().expect("scan");
    assert!(scan.problems.is_clean());
    assert_eq!(scan.entries.len(), 200);

    // внутри одного потока порядок сохраняется
    for t in 0..4 {
        let id = format!("thread{t}::test");
        let times: Vec<u64> = scan
            .entries
            .iter()
            .filter(|e| e.record.entity_id == id)
            .filter_map(|e| e.record.payload.as_ref()?.run_time)
            .collect();
        assert_eq!(times, (0..50).collect::<Vec<_>>());
    }
}
