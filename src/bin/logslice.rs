use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use logslice::config::DEFAULT_READ_CHUNK_LARGE;
use logslice::{run_extraction, Config};

#[derive(Parser, Debug)]
#[command(
    name = "logslice",
    version,
    about = "Print the lines of a log file that fall into a time range"
)]
struct Args {
    /// Log file whose lines start with a timestamp
    file: PathBuf,

    /// First timestamp to print, e.g. "2022-01-02 00:00:00"
    #[arg(short, long)]
    start: Option<String>,

    /// Last timestamp to print (inclusive)
    #[arg(short, long)]
    end: Option<String>,

    /// Stop after this many lines
    #[arg(short, long)]
    lines: Option<u64>,

    /// Print only lines containing this text
    #[arg(short, long)]
    filter: Option<String>,

    /// Read buffer size for sequential reads, in bytes
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_LARGE)]
    buffer: usize,

    /// Log diagnostics to stderr
    #[arg(short = 'D', long)]
    debug: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut builder = Config::builder(&args.file)
        .read_chunk_large(args.buffer)
        .debug(args.debug);
    if let Some(start) = args.start {
        builder = builder.start(start);
    }
    if let Some(end) = args.end {
        builder = builder.end(end);
    }
    if let Some(lines) = args.lines {
        builder = builder.max_lines(lines);
    }
    if let Some(filter) = args.filter {
        builder = builder.filter(filter.into_bytes());
    }
    let config = builder.build().context("invalid arguments")?;

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let stats = run_extraction(&config, &mut out)
        .with_context(|| format!("extracting from {}", args.file.display()))?;
    out.flush()?;

    if config.debug() {
        debug!(
            "written:{} lines:{} probes:{} cache-hits:{} cache-miss:{} locate:{:?} total:{:?}",
            stats.bytes_written,
            stats.lines,
            stats.probes,
            stats.cache_hits,
            stats.cache_misses,
            stats.locate_time,
            stats.duration
        );
    }
    Ok(())
}
