//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command works on a captured protocol file: a text file of
//! record lines as written by, or read back from, the analysis engine.

use std::path::{Path, PathBuf};
use strata_core::{ConversionContext, StrataError, codec};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a captured record file (100 MB).
///
/// This prevents memory exhaustion from accidental large files.
const MAX_RECORD_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Read a captured record file, validating its size first.
fn read_record_file(path: &Path) -> Result<String, StrataError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| StrataError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;

    if metadata.len() > MAX_RECORD_FILE_SIZE {
        return Err(StrataError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_RECORD_FILE_SIZE
        )));
    }

    std::fs::read_to_string(path)
        .map_err(|e| StrataError::Io(format!("Read '{}': {}", path.display(), e)))
}

/// Load a captured record file into a fresh conversion session.
///
/// Blank lines are separators in captured files and are dropped before
/// ingestion; everything else goes through the normal skip-and-warn
/// path.
fn load_context(text: &str) -> ConversionContext {
    let mut ctx = ConversionContext::new();
    ctx.ingest_lines(text.lines().filter(|line| !line.trim().is_empty()));
    ctx
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Summarise the records in a captured protocol file.
pub fn cmd_inspect(file: &PathBuf, json_mode: bool) -> Result<(), StrataError> {
    let text = read_record_file(file)?;
    let ctx = load_context(&text);

    let keywords = ctx.cache.keywords();

    if json_mode {
        let per_keyword: Vec<serde_json::Value> = keywords
            .iter()
            .map(|keyword| {
                let summary = ctx.cache.summary(keyword);
                let identified = summary
                    .application_ids
                    .iter()
                    .filter(|id| id.is_some())
                    .count();
                serde_json::json!({
                    "keyword": keyword.as_str(),
                    "records": summary.indices.len(),
                    "identified": identified,
                })
            })
            .collect();
        let output = serde_json::json!({
            "file": file.to_string_lossy(),
            "records": ctx.cache.len(),
            "keywords": per_keyword,
            "warnings": ctx.warnings(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Strata Record Summary");
    println!("=====================");
    println!("File:    {}", file.display());
    println!("Records: {}", ctx.cache.len());
    println!();

    for keyword in &keywords {
        let summary = ctx.cache.summary(keyword);
        let identified = summary
            .application_ids
            .iter()
            .filter(|id| id.is_some())
            .count();
        println!(
            "  {:<16} {} records ({} identified)",
            keyword.as_str(),
            summary.indices.len(),
            identified
        );
    }

    if !ctx.warnings().is_empty() {
        println!();
        println!("Warnings:");
        for warning in ctx.warnings() {
            println!("  {}", warning);
        }
    }

    Ok(())
}

// =============================================================================
// ROUNDTRIP COMMAND
// =============================================================================

/// Outcome of re-formatting every line of a captured file.
pub struct RoundtripReport {
    /// Lines checked (blank lines excluded).
    pub total: usize,
    /// Lines that re-formatted bit-exactly.
    pub clean: usize,
    /// (1-based line number, reformatted text) of each differing line.
    pub mismatched: Vec<(usize, String)>,
    /// (1-based line number, reason) of each unparseable line.
    pub malformed: Vec<(usize, &'static str)>,
}

/// Parse and re-format every line, recording where the codec is not
/// bit-exact against the capture.
#[must_use]
pub fn roundtrip_lines(text: &str) -> RoundtripReport {
    let mut report = RoundtripReport {
        total: 0,
        clean: 0,
        mismatched: Vec::new(),
        malformed: Vec::new(),
    };

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        report.total += 1;
        let number = number + 1;

        match codec::parse(line) {
            Ok(record) => {
                let formatted = codec::format(&record);
                if formatted == line {
                    report.clean += 1;
                } else {
                    report.mismatched.push((number, formatted));
                }
            }
            Err(StrataError::MalformedLine { reason, .. }) => {
                report.malformed.push((number, reason));
            }
            Err(_) => {
                report.malformed.push((number, "unparseable"));
            }
        }
    }

    report
}

/// Verify the codec against the literal lines of a captured file.
pub fn cmd_roundtrip(file: &PathBuf, json_mode: bool) -> Result<(), StrataError> {
    let text = read_record_file(file)?;
    let report = roundtrip_lines(&text);

    if json_mode {
        let output = serde_json::json!({
            "file": file.to_string_lossy(),
            "total": report.total,
            "clean": report.clean,
            "mismatched": report.mismatched.iter().map(|(number, formatted)| {
                serde_json::json!({ "line": number, "reformatted": formatted })
            }).collect::<Vec<_>>(),
            "malformed": report.malformed.iter().map(|(number, reason)| {
                serde_json::json!({ "line": number, "reason": reason })
            }).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Strata Codec Roundtrip");
    println!("======================");
    println!("File:       {}", file.display());
    println!("Lines:      {}", report.total);
    println!("Clean:      {}", report.clean);
    println!("Mismatched: {}", report.mismatched.len());
    println!("Malformed:  {}", report.malformed.len());

    for (number, formatted) in &report.mismatched {
        tracing::warn!("line {}: reformats as '{}'", number, formatted);
    }
    for (number, reason) in &report.malformed {
        tracing::warn!("line {}: {}", number, reason);
    }

    Ok(())
}

// =============================================================================
// IDS COMMAND
// =============================================================================

/// List application-identifier to record-index assignments from a
/// captured file.
pub fn cmd_ids(file: &PathBuf, json_mode: bool) -> Result<(), StrataError> {
    let text = read_record_file(file)?;
    let ctx = load_context(&text);

    let keywords = ctx.cache.keywords();

    if json_mode {
        let assignments: Vec<serde_json::Value> = keywords
            .iter()
            .flat_map(|keyword| {
                ctx.cache
                    .entries(keyword)
                    .filter_map(|entry| {
                        entry.application_id.as_ref().map(|app_id| {
                            serde_json::json!({
                                "keyword": entry.keyword.as_str(),
                                "application_id": app_id.as_str(),
                                "index": entry.index,
                            })
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        let output = serde_json::json!({
            "file": file.to_string_lossy(),
            "assignments": assignments,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Strata Identifier Assignments");
    println!("=============================");
    println!("File: {}", file.display());
    println!();

    let mut any = false;
    for keyword in &keywords {
        for entry in ctx.cache.entries(keyword) {
            if let Some(app_id) = &entry.application_id {
                println!(
                    "  {:<16} {} -> {}",
                    keyword.as_str(),
                    app_id.as_str(),
                    entry.index
                );
                any = true;
            }
        }
    }
    if !any {
        println!("  (no identified records)");
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
