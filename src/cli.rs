use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::JournalConfig;
use crate::run_record::TestState;

pub mod admin;

use admin::{cmd_append, cmd_compact, cmd_dump, cmd_fix, cmd_stat, open_journal};

/// Обслуживание журнала прогонов тестов.
#[derive(Parser, Debug)]
#[command(
    name = "runjournal",
    version,
    about = "Append-only test-run journal: inspect, compact and repair",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Append one run record
    Append {
        /// Journal file (default: <cwd>/<data_dir>/<name>.bin from config)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Entity (test) id
        #[arg(long)]
        entity: String,
        /// PASS, FAIL, NOT_RUN, ...
        #[arg(long, value_parser = parse_state)]
        state: TestState,
        /// Run time, unix seconds (default: now)
        #[arg(long)]
        run_time: Option<u64>,
        #[arg(long)]
        elapsed_ms: Option<u64>,
    },
    /// List every decodable record in file order
    Dump {
        #[arg(long)]
        path: Option<PathBuf>,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Per-entity counts and corruption counters
    Stat {
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Apply the retention policy and rewrite the journal
    Compact {
        #[arg(long)]
        path: Option<PathBuf>,
        /// Override max age (seconds)
        #[arg(long)]
        max_age_secs: Option<u64>,
        /// Override records kept per entity (0 = unlimited)
        #[arg(long)]
        max_per_entity: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Copy every valid frame to a recovery file (no retention)
    Fix {
        #[arg(long)]
        path: Option<PathBuf>,
        /// Recovery file (default: <journal>.recovered)
        #[arg(long, conflicts_with = "in_place")]
        out: Option<PathBuf>,
        /// Replace the journal with the recovered file
        #[arg(long)]
        in_place: bool,
        #[arg(long)]
        json: bool,
    },
}

fn parse_state(s: &str) -> Result<TestState, String> {
    TestState::parse(s).ok_or_else(|| format!("unknown test state '{s}'"))
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = JournalConfig::load();
    match cli.cmd {
        Cmd::Append {
            path,
            entity,
            state,
            run_time,
            elapsed_ms,
        } => {
            let j = open_journal(path, cfg)?;
            cmd_append(&j, &entity, state, run_time, elapsed_ms)?;
        }
        Cmd::Dump { path, json } => {
            let j = open_journal(path, cfg)?;
            cmd_dump(&j, json)?;
        }
        Cmd::Stat { path, json } => {
            let j = open_journal(path, cfg)?;
            cmd_stat(&j, json)?;
        }
        Cmd::Compact {
            path,
            max_age_secs,
            max_per_entity,
            json,
        } => {
            // явный compact работает и при выключенном журнале
            let mut cfg = cfg.with_enabled(true);
            if max_age_secs.is_some() {
                cfg = cfg.with_max_age_secs(max_age_secs);
            }
            if let Some(n) = max_per_entity {
                cfg = cfg.with_max_per_entity(n);
            }
            let j = open_journal(path, cfg)?;
            cmd_compact(&j, json)?;
        }
        Cmd::Fix {
            path,
            out,
            in_place,
            json,
        } => {
            let j = open_journal(path, cfg)?;
            cmd_fix(&j, out.as_deref(), in_place, json)?;
        }
    }
    Ok(())
}
