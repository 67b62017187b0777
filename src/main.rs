mod output;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tap_apachelog::{Catalog, MalformedLinePolicy, Tap, TapConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Extract Apache combined access logs as Singer records", long_about = None)]
struct Args {
    /// Tap configuration (JSON with `files` or `apachelog_files_definition`)
    #[arg(short, long)]
    config: PathBuf,

    /// Print the stream catalog and exit without reading any log file
    #[arg(long)]
    discover: bool,

    /// `stdout` for Singer messages, or a .jsonl / .ndjson / .csv / .tsv path
    #[arg(short, long, default_value = "stdout")]
    output: String,

    /// What to do with lines that do not match the combined format
    #[arg(long, value_enum, default_value_t = MalformedLinePolicy::Skip)]
    on_malformed: MalformedLinePolicy,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries the records; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = TapConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    if args.discover {
        let catalog = Catalog::from_configs(&config.file_configs()?);
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    let start_time = Instant::now();
    let tap = Tap::discover(&config, args.on_malformed)?;
    for failure in tap.failures() {
        error!("{failure}");
    }
    let mut writer = output::create_writer(&args.output)?;

    let mut total_records = 0usize;
    for stream in tap.streams() {
        writer.write_schema(stream.name())?;
        let time_extracted = Utc::now();
        let mut stream_records = 0usize;
        for record in stream.records() {
            let record = record.with_context(|| format!("stream '{}'", stream.name()))?;
            writer.write_record(stream.name(), &record, time_extracted)?;
            stream_records += 1;
        }
        info!(stream = stream.name(), records = stream_records, "stream complete");
        total_records += stream_records;
    }
    writer.finish()?;

    info!(
        streams = tap.streams().len(),
        records = total_records,
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        "extraction finished"
    );

    let failed = tap.failures().len();
    if failed > 0 {
        bail!(
            "{failed} of {} streams failed",
            failed + tap.streams().len()
        );
    }
    Ok(())
}
