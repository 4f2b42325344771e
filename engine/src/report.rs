//! Report sinks
//!
//! The run report is rendered as JSON lines, one record per target in report
//! order, and written in a single write so a sink never holds a partial or
//! interleaved report. Files are written next to their destination and
//! renamed into place.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::aggregator::RunReport;
use crate::error::ReportError;
use crate::target::{Status, TargetResult};

/// Width of the `=` rule between targets in a transcript
const RULE_WIDTH: usize = 60;

/// One serialized target record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: String,
    pub status: Status,
    pub lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TargetResult> for ReportRecord {
    fn from(result: &TargetResult) -> Self {
        Self {
            id: result.target_id().to_string(),
            status: result.status(),
            lines: result.output().len(),
            error: result.error().map(str::to_string),
        }
    }
}

/// Render the whole report; identical reports render identically
pub fn render(report: &RunReport) -> Result<String, ReportError> {
    let mut out = String::new();
    for result in report.results() {
        out.push_str(&serde_json::to_string(&ReportRecord::from(result))?);
        out.push('\n');
    }
    Ok(out)
}

/// Write the report to a stream with one write
pub fn write_report<W: Write>(report: &RunReport, sink: &mut W) -> Result<(), ReportError> {
    let rendered = render(report)?;
    sink.write_all(rendered.as_bytes())?;
    sink.flush()?;
    Ok(())
}

/// Write the report to a file, replacing it atomically
pub fn write_report_file(report: &RunReport, path: &Path) -> Result<(), ReportError> {
    let rendered = render(report)?;
    replace_file(path, rendered.as_bytes())?;
    info!("Report for run {} written to {}", report.run_id(), path.display());
    Ok(())
}

/// Parse records written by [`write_report`]; blank lines are skipped
pub fn read_report<R: BufRead>(reader: R) -> Result<Vec<ReportRecord>, ReportError> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ReportError::Parse {
            line: i + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Combined output of every target, each under a ruled header
pub fn render_transcript(report: &RunReport) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "# run {}", report.run_id());
    for result in report.results() {
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Target: {} [{}]", result.target_id(), result.status());
        let _ = writeln!(out, "{rule}");
        for line in result.output() {
            let _ = writeln!(out, "{line}");
        }
        if let Some(error) = result.error() {
            let _ = writeln!(out, "! {error}");
        }
    }
    let _ = writeln!(
        out,
        "# {} targets, {} succeeded, {} failed",
        report.total(),
        report.succeeded(),
        report.failed()
    );
    out
}

pub fn write_transcript(report: &RunReport, path: &Path) -> Result<(), ReportError> {
    replace_file(path, render_transcript(report).as_bytes())?;
    info!("Transcript written to {}", path.display());
    Ok(())
}

/// Save each target's output to `<dir>/<id>.log`. Ids that sanitize to the
/// same name get a numeric suffix, so no target's output is overwritten.
pub fn write_outputs(report: &RunReport, dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(report.results().len());
    let mut taken = HashSet::with_capacity(report.results().len());
    for result in report.results() {
        let stem = unique_stem(file_stem(result.target_id()), &mut taken);
        let path = dir.join(format!("{stem}.log"));
        let mut body = result.output().join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        replace_file(&path, body.as_bytes())?;
        written.push(path);
    }
    Ok(written)
}

/// Make a target id safe to use as a file name
pub fn file_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match stem.trim_start_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn unique_stem(stem: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(stem.clone()) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn replace_file(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    let write_err = |source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = fs::File::create(&tmp).map_err(write_err)?;
    file.write_all(contents).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);
    fs::rename(&tmp, path).map_err(write_err)
}
