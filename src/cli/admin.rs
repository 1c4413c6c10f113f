use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::JournalConfig;
use crate::journal::{CompactReport, FixReport, Journal, LogicalRecord, NoHistory, ReadProblems};
use crate::run_record::{RunRecord, TestState};
use crate::util::now_secs;

/// Журнал по явному пути или `<cwd>/<data_dir>/<name>.bin` из конфига.
pub fn open_journal(path: Option<PathBuf>, cfg: JournalConfig) -> Result<Journal> {
    match path {
        Some(p) => Ok(Journal::new(p, cfg)),
        None => {
            let cwd = std::env::current_dir().context("current dir")?;
            Ok(Journal::in_project(&cwd, cfg))
        }
    }
}

pub fn cmd_append(
    j: &Journal,
    entity: &str,
    state: TestState,
    run_time: Option<u64>,
    elapsed_ms: Option<u64>,
) -> Result<()> {
    if !j.is_enabled() {
        println!("journal disabled by configuration, nothing written");
        return Ok(());
    }
    let mut rec = RunRecord::new(state, run_time.unwrap_or_else(now_secs));
    rec.elapsed_ms = elapsed_ms;
    j.try_append(&LogicalRecord::new(entity, rec))?;
    println!("appended {} {} to {}", entity, state, j.path().display());
    Ok(())
}

pub fn cmd_dump(j: &Journal, json: bool) -> Result<()> {
    let scan = j.scan::<RunRecord>()?;
    for (pos, e) in scan.entries.iter().enumerate() {
        let rec = &e.record;
        if json {
            println!(
                "{}",
                json!({
                    "pos": pos,
                    "version": rec.format_version,
                    "entity": rec.entity_id,
                    "payload": rec.payload,
                    "frame_len": e.raw.len(),
                })
            );
            continue;
        }
        let (state, rt) = match &rec.payload {
            Some(p) => (
                p.state.to_string(),
                p.run_time.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
            ),
            None => ("(none)".to_string(), "-".to_string()),
        };
        println!(
            "{:>6}  v{}  {:<18} {:>12}  {}",
            pos, rec.format_version, state, rt, rec.entity_id
        );
    }
    if !json {
        print_problems(&scan.problems);
    }
    Ok(())
}

/// Сводка по журналу: записи по сущностям, obsolete/inert, счётчики повреждений.
#[derive(Debug, Clone, Default)]
pub struct JournalStat {
    pub file_len: u64,
    pub records: u64,
    pub obsolete: u64,
    pub inert: u64,
    pub newer_format: u64,
    pub failures: u64,
    pub per_entity: BTreeMap<String, u64>,
    pub problems: ReadProblems,
}

pub fn journal_stat(j: &Journal) -> Result<JournalStat> {
    let scan = j.scan::<RunRecord>()?;
    let mut st = JournalStat {
        file_len: scan.file_len,
        records: scan.entries.len() as u64,
        problems: scan.problems,
        ..JournalStat::default()
    };
    for e in scan.entries {
        if e.record.is_obsolete() {
            st.obsolete += 1;
            continue;
        }
        if e.record.is_newer_format() {
            st.newer_format += 1;
            continue;
        }
        match e.record.payload {
            None => st.inert += 1,
            Some(p) => {
                if p.has_failed() {
                    st.failures += 1;
                }
                *st.per_entity.entry(e.record.entity_id).or_default() += 1;
            }
        }
    }
    Ok(st)
}

pub fn cmd_stat(j: &Journal, json: bool) -> Result<()> {
    let st = journal_stat(j)?;
    if json {
        println!(
            "{}",
            json!({
                "path": j.path().display().to_string(),
                "file_len": st.file_len,
                "records": st.records,
                "obsolete": st.obsolete,
                "inert": st.inert,
                "newer_format": st.newer_format,
                "failures": st.failures,
                "entities": st.per_entity,
                "problems": problems_json(&st.problems),
            })
        );
        return Ok(());
    }

    println!("Journal at {}", j.path().display());
    println!("  file_len  = {} bytes", st.file_len);
    println!("  records   = {}", st.records);
    println!("  obsolete  = {}", st.obsolete);
    println!("  inert     = {}", st.inert);
    println!("  newer     = {}", st.newer_format);
    println!("  failures  = {}", st.failures);
    println!("  entities  = {}", st.per_entity.len());
    for (id, n) in &st.per_entity {
        println!("    {:>4}  {}", n, id);
    }
    print_problems(&st.problems);
    Ok(())
}

/// Компактация с политикой из `j`; история никуда не доставляется.
pub fn cmd_compact(j: &Journal, json: bool) -> Result<CompactReport> {
    let rep = j.load::<RunRecord, _>(&mut NoHistory)?;
    print_compact(j.path(), &rep, json);
    Ok(rep)
}

pub fn cmd_fix(j: &Journal, out: Option<&Path>, in_place: bool, json: bool) -> Result<FixReport> {
    if !j.path().exists() {
        return Err(anyhow!("journal {} not found", j.path().display()));
    }
    let rep = if in_place {
        j.fix_in_place::<RunRecord>()?
    } else {
        j.fix::<RunRecord>(out)?
    };
    print_fix(j.path(), &rep, json);
    Ok(rep)
}

fn problems_json(p: &ReadProblems) -> serde_json::Value {
    json!({
        "bad_magic": p.bad_magic,
        "oversized": p.oversized,
        "checksum_mismatch": p.checksum_mismatch,
        "payload_corrupt": p.payload_corrupt,
        "premature_eof": p.premature_eof,
        "resyncs": p.resyncs,
        "bytes_skipped": p.bytes_skipped,
    })
}

fn print_problems(p: &ReadProblems) {
    if p.is_clean() {
        println!("  problems  = none");
        return;
    }
    println!("  problems:");
    println!("    bad_magic          = {}", p.bad_magic);
    println!("    oversized          = {}", p.oversized);
    println!("    checksum_mismatch  = {}", p.checksum_mismatch);
    println!("    payload_corrupt    = {}", p.payload_corrupt);
    println!("    premature_eof      = {}", p.premature_eof);
    println!("    resyncs            = {}", p.resyncs);
    println!("    bytes_skipped      = {}", p.bytes_skipped);
}

fn print_compact(path: &Path, rep: &CompactReport, json: bool) {
    if json {
        println!(
            "{}",
            json!({
                "path": path.display().to_string(),
                "records_read": rep.records_read,
                "kept": rep.kept,
                "inert": rep.inert,
                "newer_format": rep.newer_format,
                "discarded_obsolete": rep.discarded_obsolete,
                "discarded_expired": rep.discarded_expired,
                "discarded_over_cap": rep.discarded_over_cap,
                "bytes_before": rep.bytes_before,
                "bytes_after": rep.bytes_after,
                "problems": problems_json(&rep.problems),
            })
        );
        return;
    }

    println!("Compaction ({}):", path.display());
    println!("  records_read        = {}", rep.records_read);
    println!("  kept                = {}", rep.kept);
    println!("  inert               = {}", rep.inert);
    println!("  newer_format        = {}", rep.newer_format);
    println!("  discarded_obsolete  = {}", rep.discarded_obsolete);
    println!("  discarded_expired   = {}", rep.discarded_expired);
    println!("  discarded_over_cap  = {}", rep.discarded_over_cap);
    println!("  bytes               = {} -> {}", rep.bytes_before, rep.bytes_after);
    print_problems(&rep.problems);
}

fn print_fix(path: &Path, rep: &FixReport, json: bool) {
    let out = rep
        .output
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    if json {
        println!(
            "{}",
            json!({
                "path": path.display().to_string(),
                "output": out,
                "replaced": rep.replaced,
                "frames_recovered": rep.frames_recovered,
                "bytes_before": rep.bytes_before,
                "bytes_after": rep.bytes_after,
                "problems": problems_json(&rep.problems),
            })
        );
        return;
    }

    println!("Fix ({}):", path.display());
    println!("  output            = {}", out);
    println!("  replaced          = {}", rep.replaced);
    println!("  frames_recovered  = {}", rep.frames_recovered);
    println!("  bytes             = {} -> {}", rep.bytes_before, rep.bytes_after);
    print_problems(&rep.problems);
}
