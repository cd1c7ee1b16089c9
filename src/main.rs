mod ext;
mod format;
mod report;
mod search;

use std::{
  fs,
  io::{self, Read, Write},
  path::PathBuf,
  process::ExitCode,
  time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error};

use self::{
  report::SearchReport,
  search::{Launcher, Mode, SearchError, SearchRequest},
};

#[derive(Parser)]
#[command(version, about = "Run docsearch under MPI and summarise its report")]
struct Args {
  /// Log debug output to stderr.
  #[arg(short, long, global = true)]
  verbose: bool,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Launch a search and print its report.
  Run {
    /// Folder with the documents to search.
    folder: String,
    /// Text to search for.
    pattern: String,
    #[arg(short, long, value_enum, default_value_t = Mode::Exact)]
    mode: Mode,
    /// Number of MPI processes.
    #[arg(short = 'n', long, default_value_t = search::DEFAULT_PROCESSES)]
    processes: u32,
    /// Print the unparsed docsearch output before the report.
    #[arg(long)]
    raw: bool,
    #[command(flatten)]
    launcher: LauncherArgs,
    #[command(flatten)]
    output: OutputArgs,
  },
  /// Summarise previously captured docsearch output.
  Parse {
    /// File with the captured stdout, read from stdin when omitted.
    file: Option<PathBuf>,
    #[command(flatten)]
    output: OutputArgs,
  },
}

#[derive(ClapArgs, Debug)]
struct LauncherArgs {
  /// Multi-process launcher.
  #[arg(long, env = "DOCSEARCH_LAUNCHER", default_value = search::DEFAULT_LAUNCHER)]
  launcher: PathBuf,
  /// Extra argument for the launcher, may be repeated.
  #[arg(long = "launcher-arg", allow_hyphen_values = true)]
  launcher_args: Vec<String>,
  /// Launcher flag taking the process count.
  #[arg(long, default_value = search::DEFAULT_NP_FLAG, allow_hyphen_values = true)]
  np_flag: String,
  /// Path to the docsearch executable.
  #[arg(long, env = "DOCSEARCH_EXECUTABLE", default_value = search::DEFAULT_EXECUTABLE)]
  executable: PathBuf,
  /// Kill the search after this many seconds.
  #[arg(long, env = "DOCSEARCH_TIMEOUT")]
  timeout: Option<u64>,
}

impl From<LauncherArgs> for Launcher {
  fn from(args: LauncherArgs) -> Self {
    Self {
      program: args.launcher,
      args: args.launcher_args,
      np_flag: args.np_flag,
      executable: args.executable,
      timeout: args.timeout.map(Duration::from_secs),
    }
  }
}

#[derive(ClapArgs, Debug)]
struct OutputArgs {
  /// Print the report as JSON.
  #[arg(long)]
  json: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
  match_count: usize,
  #[serde(flatten)]
  report: &'a SearchReport,
  #[serde(skip_serializing_if = "Option::is_none")]
  wall_time_secs: Option<f64>,
}

fn print_report(report: &SearchReport, wall_time: Option<Duration>, output: &OutputArgs) -> Result<()> {
  if output.json {
    let json = JsonReport {
      match_count: report.match_count(),
      report,
      wall_time_secs: wall_time.map(|t| t.as_secs_f64()),
    };
    println!("{}", serde_json::to_string_pretty(&json).context("serialize")?);
  } else {
    print!("{}", format::format(report, wall_time).context("format")?);
  }

  Ok(())
}

/// Writes the child's stdout as it was, ending on a single newline.
fn write_raw<W: Write>(out: &mut W, stdout: &str) -> io::Result<()> {
  out.write_all(stdout.as_bytes())?;
  if !stdout.is_empty() && !stdout.ends_with('\n') {
    writeln!(out)?;
  }

  Ok(())
}

/// Writes the child's stderr byte for byte under an `Error:` heading.
fn write_failure<W: Write>(out: &mut W, stderr: &[u8]) -> io::Result<()> {
  writeln!(out, "Error:")?;
  out.write_all(stderr)?;
  out.flush()
}

fn run(request: &SearchRequest, launcher: &Launcher, raw: bool, output: &OutputArgs) -> Result<ExitCode> {
  match launcher.run(request) {
    Ok(run) => {
      if raw {
        write_raw(&mut io::stdout().lock(), &run.stdout).context("write")?;
      }
      print_report(&run.report, Some(run.wall_time), output)?;
      Ok(ExitCode::SUCCESS)
    }
    Err(SearchError::Failed { status, stderr, .. }) => {
      error!(%status, "search failed");
      write_failure(&mut io::stderr().lock(), &stderr).context("write")?;
      Ok(ExitCode::FAILURE)
    }
    Err(err @ SearchError::Invalid(_)) => {
      eprintln!("Missing input: {err}");
      Ok(ExitCode::FAILURE)
    }
    Err(err) => Err(err).context("run"),
  }
}

fn parse(file: Option<PathBuf>, output: &OutputArgs) -> Result<()> {
  let stdout = match file {
    Some(file) => fs::read_to_string(&file).with_context(|| format!("read {file:?}"))?,
    None => {
      let mut stdout = String::new();
      io::stdin().read_to_string(&mut stdout).context("read stdin")?;
      stdout
    }
  };
  debug!(bytes = stdout.len(), "parsing captured output");

  print_report(&report::parse(&stdout), None, output)
}

fn main() -> Result<ExitCode> {
  let args = Args::parse();

  let log_level = if args.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
    )
    .init();

  match args.command {
    Command::Run {
      folder,
      pattern,
      mode,
      processes,
      raw,
      launcher,
      output,
    } => {
      let request = SearchRequest {
        folder,
        pattern,
        mode,
        processes,
      };

      run(&request, &launcher.into(), raw, &output)
    }
    Command::Parse { file, output } => {
      parse(file, &output).context("parse")?;

      Ok(ExitCode::SUCCESS)
    }
  }
}
