//! Parsing of `docsearch` stdout into a [`SearchReport`].
//!
//! The expected shape of the output is:
//!
//! ```text
//! [SERIAL] Rank 0 Found in /tmp/docsearch/report.txt
//! [SERIAL] Preprocessing: 0.420000 seconds
//! [SERIAL] Search: 0.830000 seconds
//! [SERIAL] Total: 1.250000 seconds, Found: 2
//! ...
//! === SPEEDUP ANALYSIS ===
//! Total           | 5.23x  | 3.45x  | 6.78x
//! ...
//! OpenMP: 65.4%
//! ...
//! === PERFORMANCE INSIGHTS ===
//! ✓ Hybrid MPI+OpenMP achieved the best total time
//! ```
//!
//! Parsing never fails. Anything that does not match is left out of the
//! report.

use std::{
  collections::{BTreeMap, HashSet},
  path::Path,
  sync::LazyLock,
};

use regex::Regex;
use serde::Serialize;

const SERIAL_PREFIX: &str = "[SERIAL]";
const FOUND_SENTINEL: &str = "Found in";
const SPEEDUP_HEADER: &str = "=== SPEEDUP ANALYSIS ===";
const SPEEDUP_ROW_LABEL: &str = "Total";
const SPEEDUP_DELIMITER: char = '|';
const INSIGHTS_HEADER: &str = "=== PERFORMANCE INSIGHTS ===";
const INSIGHT_MARKER: char = '✓';

/// An execution strategy reported by `docsearch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
  Serial,
  OpenMp,
  Mpi,
  Hybrid,
}

impl Method {
  pub const ALL: [Method; 4] = [Method::Serial, Method::OpenMp, Method::Mpi, Method::Hybrid];

  /// Methods that are compared against [`Method::Serial`], in the column
  /// order of the speedup table.
  pub const PARALLEL: [Method; 3] = [Method::OpenMp, Method::Mpi, Method::Hybrid];

  /// The bracketed tag `docsearch` prefixes its lines with, without brackets.
  pub fn label(self) -> &'static str {
    match self {
      Method::Serial => "SERIAL",
      Method::OpenMp => "OPENMP",
      Method::Mpi => "MPI",
      Method::Hybrid => "MPI+OPENMP",
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Method::Serial => "Serial",
      Method::OpenMp => "OpenMP",
      Method::Mpi => "MPI",
      Method::Hybrid => "MPI + OpenMP",
    }
  }

  fn efficiency_key(self) -> Option<&'static str> {
    match self {
      Method::Serial => None,
      Method::OpenMp => Some("OpenMP:"),
      Method::Mpi => Some("MPI:"),
      Method::Hybrid => Some("Hybrid:"),
    }
  }
}

/// Structured result of a single `docsearch` run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchReport {
  /// Distinct base filenames from the serial run, in first-seen order.
  pub matches: Vec<String>,
  /// Total elapsed seconds per method.
  pub timings: BTreeMap<Method, f64>,
  pub preprocessing_times: BTreeMap<Method, f64>,
  pub search_times: BTreeMap<Method, f64>,
  pub found_counts: BTreeMap<Method, u64>,
  /// Multiplier relative to serial, parallel methods only.
  pub speedups: BTreeMap<Method, f64>,
  /// Percentages, parallel methods only.
  pub efficiency: BTreeMap<Method, f64>,
  pub insights: Vec<String>,
}

impl SearchReport {
  pub fn match_count(&self) -> usize {
    self.matches.len()
  }

  pub fn is_empty(&self) -> bool {
    *self == SearchReport::default()
  }
}

struct MethodPatterns {
  total: Regex,
  preprocessing: Regex,
  search: Regex,
}

impl MethodPatterns {
  fn new(method: Method) -> Self {
    let label = regex::escape(method.label());
    let compile = |pattern: String| Regex::new(&pattern).expect("method pattern is a valid regex");

    Self {
      total: compile(format!(r"\[{label}\] Total:\s*(\d+(?:\.\d+)?)\s*seconds,\s*Found:\s*(\d+)")),
      preprocessing: compile(format!(r"\[{label}\] Preprocessing:\s*(\d+(?:\.\d+)?)\s*seconds")),
      search: compile(format!(r"\[{label}\] Search:\s*(\d+(?:\.\d+)?)\s*seconds")),
    }
  }
}

static METHOD_PATTERNS: LazyLock<BTreeMap<Method, MethodPatterns>> =
  LazyLock::new(|| Method::ALL.into_iter().map(|m| (m, MethodPatterns::new(m))).collect());

static SPEEDUP_TOKEN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*x$").expect("speedup pattern is a valid regex"));

static TRAILING_PERCENT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%\s*$").expect("percent pattern is a valid regex"));

/// Parses the full stdout of a `docsearch` run.
pub fn parse(stdout: &str) -> SearchReport {
  let lines: Vec<&str> = stdout.lines().collect();

  let mut report = SearchReport {
    matches: parse_matches(&lines),
    speedups: parse_speedups(&lines),
    efficiency: parse_efficiency(&lines),
    insights: parse_insights(&lines),
    ..SearchReport::default()
  };

  for (&method, patterns) in METHOD_PATTERNS.iter() {
    if let Some((total, found)) = parse_total(&patterns.total, stdout) {
      report.timings.insert(method, total);
      report.found_counts.insert(method, found);
    }
    if let Some(secs) = parse_seconds(&patterns.preprocessing, stdout) {
      report.preprocessing_times.insert(method, secs);
    }
    if let Some(secs) = parse_seconds(&patterns.search, stdout) {
      report.search_times.insert(method, secs);
    }
  }

  report
}

fn parse_matches(lines: &[&str]) -> Vec<String> {
  let mut seen = HashSet::new();
  let mut matches = Vec::new();

  for line in lines {
    if !line.starts_with(SERIAL_PREFIX) {
      continue;
    }
    let Some((_, path)) = line.rsplit_once(FOUND_SENTINEL) else {
      continue;
    };
    let Some(filename) = Path::new(path.trim()).file_name() else {
      continue;
    };

    let filename = filename.to_string_lossy().into_owned();
    if seen.insert(filename.clone()) {
      matches.push(filename);
    }
  }

  matches
}

fn parse_total(pattern: &Regex, stdout: &str) -> Option<(f64, u64)> {
  let captures = pattern.captures(stdout)?;
  let total = captures.get(1)?.as_str().parse().ok()?;
  let found = captures.get(2)?.as_str().parse().ok()?;

  Some((total, found))
}

fn parse_seconds(pattern: &Regex, stdout: &str) -> Option<f64> {
  pattern.captures(stdout)?.get(1)?.as_str().parse().ok()
}

/// Lines following the first line that contains `header`.
fn section<'a, 'b>(lines: &'a [&'b str], header: &str) -> &'a [&'b str] {
  match lines.iter().position(|line| line.contains(header)) {
    Some(i) => &lines[i + 1..],
    None => &[],
  }
}

fn parse_speedups(lines: &[&str]) -> BTreeMap<Method, f64> {
  let Some(row) = section(lines, SPEEDUP_HEADER)
    .iter()
    .map(|line| line.trim_start())
    .find(|line| line.starts_with(SPEEDUP_ROW_LABEL))
  else {
    return BTreeMap::new();
  };

  parse_speedup_row(row).unwrap_or_default()
}

/// Parses `Total | 5.23x | 3.45x | 6.78x`. Either all three values parse or
/// none are kept.
fn parse_speedup_row(row: &str) -> Option<BTreeMap<Method, f64>> {
  let values: Vec<&str> = row.split(SPEEDUP_DELIMITER).skip(1).map(str::trim).collect();
  if values.len() < Method::PARALLEL.len() {
    return None;
  }

  Method::PARALLEL
    .into_iter()
    .zip(values)
    .map(|(method, value)| {
      let value = SPEEDUP_TOKEN.captures(value)?.get(1)?.as_str();
      Some((method, value.parse::<f64>().ok()?))
    })
    .collect()
}

/// Whether `key` appears at the start of `line` or right after whitespace,
/// so `MPI+OpenMP:` is not read as `OpenMP:`.
fn has_key(line: &str, key: &str) -> bool {
  line
    .match_indices(key)
    .any(|(i, _)| line[..i].chars().next_back().map_or(true, char::is_whitespace))
}

fn parse_efficiency(lines: &[&str]) -> BTreeMap<Method, f64> {
  let mut efficiency = BTreeMap::new();
  for line in lines {
    let Some(method) = Method::PARALLEL
      .into_iter()
      .find(|m| m.efficiency_key().is_some_and(|key| has_key(line, key)))
    else {
      continue;
    };
    if efficiency.contains_key(&method) {
      continue;
    }

    let percent = TRAILING_PERCENT
      .captures(line)
      .and_then(|c| c.get(1))
      .and_then(|m| m.as_str().parse::<f64>().ok());
    if let Some(percent) = percent {
      efficiency.insert(method, percent);
    }
  }

  efficiency
}

fn parse_insights(lines: &[&str]) -> Vec<String> {
  section(lines, INSIGHTS_HEADER)
    .iter()
    .filter_map(|line| line.trim_start().strip_prefix(INSIGHT_MARKER))
    .map(|insight| insight.trim().to_string())
    .collect()
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  const FULL_RUN: &str = include_str!("../tests/fixtures/full_run.txt");

  #[test]
  fn parses_full_run() {
    let report = parse(FULL_RUN);

    assert_eq!(report.matches, vec!["report.txt", "notes.txt"]);
    assert_eq!(report.match_count(), 2);

    assert_eq!(
      report.timings,
      BTreeMap::from([
        (Method::Serial, 1.25),
        (Method::OpenMp, 0.239),
        (Method::Mpi, 0.362),
        (Method::Hybrid, 0.184),
      ])
    );
    assert_eq!(report.found_counts.values().copied().collect::<Vec<_>>(), vec![2, 2, 2, 2]);
    assert_eq!(report.preprocessing_times[&Method::Serial], 0.42);
    assert_eq!(report.search_times[&Method::Hybrid], 0.104);

    assert_eq!(
      report.speedups,
      BTreeMap::from([(Method::OpenMp, 5.23), (Method::Mpi, 3.45), (Method::Hybrid, 6.78)])
    );
    assert_eq!(
      report.efficiency,
      BTreeMap::from([(Method::OpenMp, 65.4), (Method::Mpi, 86.3), (Method::Hybrid, 42.4)])
    );
    assert_eq!(
      report.insights,
      vec![
        "Hybrid MPI+OpenMP achieved the best total time",
        "OpenMP scales well for the search phase",
        "MPI efficiency is highest per process",
      ]
    );
  }

  #[test]
  fn parse_is_idempotent() {
    assert_eq!(parse(FULL_RUN), parse(FULL_RUN));
  }

  #[test]
  fn empty_and_garbage_input_give_empty_report() {
    assert!(parse("").is_empty());
    assert!(parse("\n\n   \n").is_empty());
    assert!(parse("Segmentation fault (core dumped)\n|||x%\n=== SPEEDUP ANALYSIS ===").is_empty());
  }

  #[test]
  fn duplicate_basenames_are_kept_once() {
    let report = parse("[SERIAL] Found in /a/b/file.txt\n[SERIAL] Found in /c/file.txt\n");

    assert_eq!(report.matches, vec!["file.txt"]);
  }

  #[test]
  fn paths_without_a_file_name_are_skipped() {
    let report = parse("[SERIAL] Found in /a/b/\n[SERIAL] Found in ..\n[SERIAL] Found in \n[SERIAL] Found in /a/c.txt\n");

    assert_eq!(report.matches, vec!["b", "c.txt"]);
  }

  #[test]
  fn only_serial_lines_contribute_matches() {
    let report = parse("[OPENMP] Found in /a/x.txt\n  [SERIAL] Found in /a/y.txt\n[SERIAL] Found in /a/z.txt\n");

    assert_eq!(report.matches, vec!["z.txt"]);
  }

  #[test]
  fn single_total_line() {
    let report = parse("[MPI] Total: 1.250000 seconds, Found: 3");

    assert_eq!(report.timings, BTreeMap::from([(Method::Mpi, 1.25)]));
    assert_eq!(report.found_counts, BTreeMap::from([(Method::Mpi, 3)]));
  }

  #[test]
  fn mpi_tag_does_not_match_hybrid_lines() {
    let report = parse("[MPI+OPENMP] Total: 0.5 seconds, Found: 1\n[MPI+OPENMP] Search: 0.3 seconds");

    assert_eq!(report.timings, BTreeMap::from([(Method::Hybrid, 0.5)]));
    assert_eq!(report.search_times, BTreeMap::from([(Method::Hybrid, 0.3)]));
    assert!(!report.found_counts.contains_key(&Method::Mpi));
  }

  #[test]
  fn absent_methods_are_absent_everywhere() {
    let report = parse("[SERIAL] Total: 2.0 seconds, Found: 0\n[SERIAL] Preprocessing: 1.5 seconds\n");

    for method in Method::PARALLEL {
      assert!(!report.timings.contains_key(&method));
      assert!(!report.found_counts.contains_key(&method));
      assert!(!report.preprocessing_times.contains_key(&method));
      assert!(!report.search_times.contains_key(&method));
    }
    assert!(report.search_times.is_empty());
  }

  #[test]
  fn speedup_row_after_header() {
    let report = parse("=== SPEEDUP ANALYSIS ===\nTotal           | 5.23x  | 3.45x  | 6.78x\n");

    assert_eq!(
      report.speedups,
      BTreeMap::from([(Method::OpenMp, 5.23), (Method::Mpi, 3.45), (Method::Hybrid, 6.78)])
    );
  }

  #[test]
  fn speedup_row_before_header_is_ignored() {
    let report = parse("Total | 5.23x | 3.45x | 6.78x\n=== SPEEDUP ANALYSIS ===\n");

    assert!(report.speedups.is_empty());
  }

  #[test]
  fn only_first_speedup_row_is_consumed() {
    let report = parse("=== SPEEDUP ANALYSIS ===\nTotal | 2.00x | 1.00x\nTotal | 5.23x | 3.45x | 6.78x\n");

    assert!(report.speedups.is_empty());
  }

  #[test]
  fn malformed_speedup_rows_leave_speedups_empty() {
    for row in [
      "Total | 5.23x | 3.45x",
      "Total",
      "Total | fast | 3.45x | 6.78x",
      "Total | NaNx | infx | 1x",
      "Total | 5.23x | +3.45x | 6.78x",
      "Total | 5.23 | 3.45x | 6.78x",
    ] {
      let report = parse(&format!("=== SPEEDUP ANALYSIS ===\n{row}\n"));
      assert!(report.speedups.is_empty(), "{row:?}");
    }
  }

  #[test]
  fn efficiency_lines() {
    let report = parse("  OpenMP: 65.4%\n  Hybrid: MPI+OpenMP: 42%\n  MPI: 86.3 %\n  MPI: 10.0%\n");

    assert_eq!(
      report.efficiency,
      BTreeMap::from([(Method::OpenMp, 65.4), (Method::Mpi, 86.3), (Method::Hybrid, 42.0)])
    );
  }

  #[test]
  fn hybrid_label_does_not_shadow_openmp_efficiency() {
    let report = parse("MPI+OpenMP: 42.4%\nOpenMP: 65.4%\n(MPI: 86.3%)\n");

    assert_eq!(report.efficiency, BTreeMap::from([(Method::OpenMp, 65.4)]));
  }

  #[test]
  fn report_with_speedups_equals_itself() {
    let text = "=== SPEEDUP ANALYSIS ===\nTotal | NaNx | infx | +1x\n";

    assert_eq!(parse(text), parse(text));
    assert!(parse(text).speedups.is_empty());
  }

  #[test]
  fn efficiency_without_percentage_is_skipped() {
    let report = parse("OpenMP: 5.23x\nMPI: n/a\n");

    assert!(report.efficiency.is_empty());
  }

  #[test]
  fn insights_are_stripped_of_markers() {
    let report = parse("✓ before header\n=== PERFORMANCE INSIGHTS ===\n✓ one\n  ✓   two  \nnot an insight\n✓three\n");

    assert_eq!(report.insights, vec!["one", "two", "three"]);
  }
}
