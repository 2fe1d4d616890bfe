//! Binary entrypoint: feed log lines from files or stdin, write JSON snapshots to stdout.
//!
//! Batch mode emits one snapshot after the last input. With `--follow` the last
//! file is polled for appended lines and a snapshot is emitted whenever the file
//! goes idle after new lines. `--snapshot-every N` emits a snapshot every N lines
//! and, with `--reset-after-snapshot`, starts a fresh run after each one so memory
//! stays bounded during unattended tailing.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use triage_engine::{Config, Engine};

#[derive(Debug, Parser)]
#[command(name = "triage-engine", version, about = "Classify log lines and diagnose PAPI/TAPI transactions")]
struct Cli {
  /// Log files or directories (immediate files, sorted). `-` or nothing reads stdin.
  paths: Vec<PathBuf>,

  /// TOML file overriding thresholds and percentile ranks.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Pretty-print JSON output.
  #[arg(long)]
  pretty: bool,

  /// Keep polling the last file for appended lines.
  #[arg(long)]
  follow: bool,

  /// Poll interval for `--follow`, in milliseconds.
  #[arg(long, default_value_t = 500)]
  poll_ms: u64,

  /// Emit a snapshot after every N ingested lines.
  #[arg(long)]
  snapshot_every: Option<u64>,

  /// Reset the engine after each periodic snapshot.
  #[arg(long, requires = "snapshot_every")]
  reset_after_snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
  Stdin,
  File(PathBuf),
}

/// Owns the engine and the output stream; applies the periodic snapshot policy.
struct Feeder<W: Write> {
  engine: Engine,
  out: W,
  pretty: bool,
  snapshot_every: Option<u64>,
  reset_after_snapshot: bool,
  since_snapshot: u64,
  emitted: u64,
}

impl<W: Write> Feeder<W> {
  fn feed(&mut self, line: &str) -> Result<()> {
    self.engine.ingest(line);
    self.since_snapshot += 1;
    if self.snapshot_every.is_some_and(|n| n > 0 && self.since_snapshot >= n) {
      self.emit()?;
      if self.reset_after_snapshot {
        self.engine.reset();
      }
    }
    Ok(())
  }

  fn feed_reader(&mut self, mut reader: impl BufRead) -> Result<()> {
    let mut buf = Vec::new();
    loop {
      buf.clear();
      if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(());
      }
      self.feed(&decode_line(&buf))?;
    }
  }

  /// Feed every complete line currently readable. A trailing partial line stays in
  /// `pending` until its newline arrives. Returns whether any line was fed.
  fn drain_complete(&mut self, reader: &mut impl BufRead, pending: &mut Vec<u8>) -> Result<bool> {
    let mut fed = false;
    loop {
      let read = reader.read_until(b'\n', pending)?;
      if read == 0 || pending.last() != Some(&b'\n') {
        return Ok(fed);
      }
      self.feed(&decode_line(pending))?;
      pending.clear();
      fed = true;
    }
  }

  /// One follow step: drain new lines, then snapshot if any of them are not yet reported.
  fn poll_once(&mut self, reader: &mut impl BufRead, pending: &mut Vec<u8>) -> Result<()> {
    if self.drain_complete(reader, pending)? && self.since_snapshot > 0 {
      self.emit()?;
    }
    self.out.flush()?;
    Ok(())
  }

  /// Poll `reader` forever.
  fn follow(&mut self, mut reader: impl BufRead, poll: Duration) -> Result<()> {
    let mut pending = Vec::new();
    loop {
      self.poll_once(&mut reader, &mut pending)?;
      thread::sleep(poll);
    }
  }

  /// Final snapshot, skipped when a periodic one already covered every line.
  fn finish(&mut self) -> Result<()> {
    if self.since_snapshot > 0 || self.emitted == 0 {
      self.emit()?;
    }
    Ok(())
  }

  fn emit(&mut self) -> Result<()> {
    let snapshot = self.engine.snapshot();
    writeln!(self.out, "{}", snapshot.to_json(self.pretty)?)?;
    self.out.flush()?;
    self.since_snapshot = 0;
    self.emitted += 1;
    Ok(())
  }
}

fn decode_line(raw: &[u8]) -> String {
  let line = String::from_utf8_lossy(raw);
  line.trim_end_matches(['\n', '\r']).to_string()
}

fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<Input>> {
  if paths.is_empty() {
    return Ok(vec![Input::Stdin]);
  }
  let mut inputs = Vec::new();
  for path in paths {
    if path.as_os_str() == "-" {
      inputs.push(Input::Stdin);
    } else if path.is_dir() {
      let mut files: Vec<PathBuf> = std::fs::read_dir(path)
        .with_context(|| format!("failed to list {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
      files.sort();
      inputs.extend(files.into_iter().map(Input::File));
    } else if path.is_file() {
      inputs.push(Input::File(path.clone()));
    } else {
      bail!("input not found: {}", path.display());
    }
  }
  Ok(inputs)
}

fn open(path: &Path) -> Result<BufReader<File>> {
  let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
  Ok(BufReader::new(file))
}

fn init_logging() {
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(io::stderr)
    .init();
}

fn run(cli: Cli) -> Result<()> {
  let config = match &cli.config {
    Some(path) => Config::load(path).with_context(|| format!("failed to load config {}", path.display()))?,
    None => Config::default(),
  };

  let inputs = expand_inputs(&cli.paths)?;
  if cli.follow && !matches!(inputs.last(), Some(Input::File(_))) {
    bail!("--follow needs a file as the last input");
  }

  let stdout = io::stdout();
  let mut feeder = Feeder {
    engine: Engine::new(config),
    out: BufWriter::new(stdout.lock()),
    pretty: cli.pretty,
    snapshot_every: cli.snapshot_every,
    reset_after_snapshot: cli.reset_after_snapshot,
    since_snapshot: 0,
    emitted: 0,
  };

  let last = inputs.len().saturating_sub(1);
  for (i, input) in inputs.into_iter().enumerate() {
    match input {
      Input::Stdin => {
        info!("reading stdin");
        feeder.feed_reader(io::stdin().lock())?;
      }
      Input::File(path) if cli.follow && i == last => {
        info!(path = %path.display(), poll_ms = cli.poll_ms, "following");
        return feeder.follow(open(&path)?, Duration::from_millis(cli.poll_ms));
      }
      Input::File(path) => {
        info!(path = %path.display(), "reading");
        feeder.feed_reader(open(&path)?)?;
      }
    }
  }

  feeder.finish()?;
  info!(total_lines = feeder.engine.total_lines(), "done");
  Ok(())
}

fn main() {
  init_logging();
  if let Err(e) = run(Cli::parse()) {
    error!("{e:#}");
    std::process::exit(1);
  }
}
