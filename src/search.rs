use std::{
  ffi::OsString,
  io,
  path::PathBuf,
  process::{Command, ExitStatus},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  ext::{CommandExt, OutputExt},
  report::{self, SearchReport},
};

pub const DEFAULT_LAUNCHER: &str = "mpirun";
pub const DEFAULT_NP_FLAG: &str = "-np";
pub const DEFAULT_EXECUTABLE: &str = "./docsearch";
pub const DEFAULT_PROCESSES: u32 = 4;

#[derive(Debug, Error)]
pub enum SearchError {
  #[error("please fill all fields: {0} is missing")]
  Invalid(&'static str),

  #[error("failed to launch {program:?}")]
  Launch {
    program: PathBuf,
    #[source]
    source: io::Error,
  },

  /// `stderr` is kept exactly as the child wrote it.
  #[error("{program:?} exited with {status}")]
  Failed {
    program: PathBuf,
    status: ExitStatus,
    stderr: Vec<u8>,
  },

  #[error("{program:?} did not finish within {timeout:?}")]
  TimedOut { program: PathBuf, timeout: Duration },
}

/// How `docsearch` compares the pattern against document text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
  #[default]
  Exact,
  Approximate,
}

impl Mode {
  /// The positional flag `docsearch` expects.
  pub fn flag(self) -> &'static str {
    match self {
      Mode::Exact => "0",
      Mode::Approximate => "1",
    }
  }
}

/// The parameters of one search, as entered by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
  pub folder: String,
  pub pattern: String,
  pub mode: Mode,
  pub processes: u32,
}

impl SearchRequest {
  pub fn validate(&self) -> Result<(), SearchError> {
    if self.folder.trim().is_empty() {
      return Err(SearchError::Invalid("documents folder"));
    }
    if self.pattern.trim().is_empty() {
      return Err(SearchError::Invalid("search pattern"));
    }
    if self.processes == 0 {
      return Err(SearchError::Invalid("process count"));
    }

    Ok(())
  }
}

/// How `docsearch` gets started: `<program> [args..] <np_flag> <n> <executable> ...`.
#[derive(Clone, Debug)]
pub struct Launcher {
  pub program: PathBuf,
  /// Extra arguments placed right after `program`.
  pub args: Vec<String>,
  pub np_flag: String,
  pub executable: PathBuf,
  /// `None` blocks until the child exits.
  pub timeout: Option<Duration>,
}

impl Default for Launcher {
  fn default() -> Self {
    Self {
      program: DEFAULT_LAUNCHER.into(),
      args: Vec::new(),
      np_flag: DEFAULT_NP_FLAG.to_string(),
      executable: DEFAULT_EXECUTABLE.into(),
      timeout: None,
    }
  }
}

/// A completed search.
#[derive(Debug)]
pub struct SearchRun {
  pub report: SearchReport,
  /// Unparsed stdout of the child.
  pub stdout: String,
  pub wall_time: Duration,
}

impl Launcher {
  /// Builds the full command line for `request`.
  pub fn command(&self, request: &SearchRequest) -> Command {
    let mut command = Command::new(&self.program);
    command
      .args(&self.args)
      .arg(&self.np_flag)
      .arg(request.processes.to_string())
      .arg(&self.executable)
      .arg(request.folder.trim())
      .arg(request.pattern.trim())
      .arg(request.mode.flag());

    command
  }

  /// Runs `request` to completion and parses its stdout.
  ///
  /// # Errors
  ///
  /// This will return an error if:
  /// - the request is missing a field,
  /// - the launcher cannot be started,
  /// - the exit status is non-zero,
  /// - the timeout elapses.
  pub fn run(&self, request: &SearchRequest) -> Result<SearchRun, SearchError> {
    request.validate()?;

    let mut command = self.command(request);
    debug!(argv = ?argv(&command), "launching");
    info!(
      folder = request.folder.trim(),
      pattern = request.pattern.trim(),
      mode = ?request.mode,
      processes = request.processes,
      "running search"
    );

    let start = Instant::now();
    let output = command
      .output_timeout(self.timeout)
      .map_err(|source| SearchError::Launch {
        program: self.program.clone(),
        source,
      })?;
    let wall_time = start.elapsed();

    let Some(output) = output else {
      let timeout = self.timeout.unwrap_or_default();
      warn!(?timeout, "search timed out, child killed");
      return Err(SearchError::TimedOut {
        program: self.program.clone(),
        timeout,
      });
    };

    if !output.status.success() {
      return Err(SearchError::Failed {
        program: self.program.clone(),
        status: output.status,
        stderr: output.stderr,
      });
    }

    let stdout = output.stdout_lossy();
    let report = report::parse(&stdout);
    if report.is_empty() {
      warn!("no recognisable report lines in output");
    }
    info!(matches = report.match_count(), ?wall_time, "search finished");

    Ok(SearchRun {
      report,
      stdout,
      wall_time,
    })
  }
}

fn argv(command: &Command) -> Vec<OsString> {
  std::iter::once(command.get_program())
    .chain(command.get_args())
    .map(ToOwned::to_owned)
    .collect()
}
