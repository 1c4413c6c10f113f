use env_logger::{Builder, Env};
use log::{debug, error};

fn init_logger() {
    // RUST_LOG, по умолчанию info. Пример: RUST_LOG=debug runjournal dump
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    let res = runjournal::cli::run();

    let m = runjournal::metrics::snapshot();
    debug!(
        "metrics: appends={} ({} bytes, {} failed), resyncs={} ({} bytes skipped), \
         compactions={} kept={} discarded={} ({:.1}%), fix_runs={}",
        m.appends_total,
        m.append_bytes,
        m.append_failures,
        m.reader_resyncs,
        m.reader_bytes_skipped,
        m.compactions_total,
        m.records_kept,
        m.records_discarded,
        m.discard_ratio() * 100.0,
        m.fix_runs
    );

    if let Err(e) = res {
        error!("{:?}", e);
        std::process::exit(1);
    }
}
