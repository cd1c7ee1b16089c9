use std::{collections::BTreeMap, fmt::Write, time::Duration};

use anyhow::Result;

use crate::report::{Method, SearchReport};

const COLUMN_WIDTH: usize = 14;
const COLUMN_PADDING: &str = "  ";
const MISSING: &str = "N/A";

const COLUMNS: [&str; 7] = ["method", "total", "preprocessing", "search", "found", "speedup", "efficiency"];

fn format_heading(table: &mut String, heading: &str) -> Result<()> {
  writeln!(table, "{heading}")?;
  writeln!(table, "{}", "=".repeat(heading.chars().count()))?;

  Ok(())
}

fn format_row<I: IntoIterator<Item = String>>(cols: I) -> String {
  cols
    .into_iter()
    .enumerate()
    .map(|(i, col)| {
      if i == 0 {
        format!("{col:<COLUMN_WIDTH$}")
      } else {
        format!("{col:>COLUMN_WIDTH$}")
      }
    })
    .collect::<Vec<_>>()
    .join(COLUMN_PADDING)
    .trim_end()
    .to_string()
}

fn cell<T, F: Fn(&T) -> String>(values: &BTreeMap<Method, T>, method: Method, f: F) -> String {
  values.get(&method).map(f).unwrap_or_else(|| MISSING.to_string())
}

fn format_matches(table: &mut String, report: &SearchReport) -> Result<()> {
  format_heading(table, &format!("Matches ({})", report.match_count()))?;

  if report.matches.is_empty() {
    writeln!(table, "No match found.")?;
  }
  for filename in &report.matches {
    writeln!(table, "{filename}")?;
  }

  Ok(())
}

fn format_times(table: &mut String, report: &SearchReport) -> Result<()> {
  format_heading(table, "Execution Times")?;

  let header = format_row(COLUMNS.map(str::to_string));
  writeln!(table, "{header}")?;
  writeln!(table, "{}", "-".repeat(header.len()))?;

  let secs = |s: &f64| format!("{s:.4}s");
  for method in Method::ALL {
    let row = format_row([
      method.name().to_string(),
      cell(&report.timings, method, secs),
      cell(&report.preprocessing_times, method, secs),
      cell(&report.search_times, method, secs),
      cell(&report.found_counts, method, u64::to_string),
      cell(&report.speedups, method, |s| format!("{s:.2}x")),
      cell(&report.efficiency, method, |e| format!("{e:.1}%")),
    ]);

    writeln!(table, "{row}")?;
  }

  Ok(())
}

fn format_insights(table: &mut String, report: &SearchReport) -> Result<()> {
  format_heading(table, "Insights")?;

  for insight in &report.insights {
    writeln!(table, "- {insight}")?;
  }

  Ok(())
}

/// Renders `report` as plain-text tables, followed by the wall time of the
/// run when it is known.
pub fn format(report: &SearchReport, wall_time: Option<Duration>) -> Result<String> {
  let mut table = String::new();

  format_matches(&mut table, report)?;
  writeln!(table)?;
  format_times(&mut table, report)?;

  if !report.insights.is_empty() {
    writeln!(table)?;
    format_insights(&mut table, report)?;
  }

  if let Some(wall_time) = wall_time {
    writeln!(table)?;
    writeln!(table, "Total Wall Time: {:.4} seconds", wall_time.as_secs_f64())?;
  }

  Ok(table)
}
