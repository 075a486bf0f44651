/// Report formatting: human-readable and JSON (NDJSON) modes.
///
/// This module renders [`hl7conform_core::MessageFailure`] values together
/// with the [`FailureLevel`] the validation context assigns them:
///
/// - **Human mode** (default): one line per finding, color-coded by level,
///   to stderr. Colors are disabled when `--no-color` is set, the `NO_COLOR`
///   environment variable is present (per <https://no-color.org>), or stderr
///   is not a TTY.
/// - **JSON mode**: each finding is serialized as a single-line JSON object
///   (NDJSON) with an extra `level` key.
///
/// Findings at [`FailureLevel::Ignore`] are never written. Affirmative
/// findings are written only with `--show-passed`. Quiet mode keeps
/// error-level findings and drops the summary.
use std::collections::BTreeMap;
use std::io::{IsTerminal as _, Write};
use std::time::Duration;

use hl7conform_core::{FailureLevel, MessageFailure};

// ---------------------------------------------------------------------------
// Color support detection
// ---------------------------------------------------------------------------

/// Returns `true` if ANSI color codes should be emitted to stderr.
pub fn colors_enabled(no_color_flag: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    std::io::stderr().is_terminal()
}

// ---------------------------------------------------------------------------
// ANSI escape sequences
// ---------------------------------------------------------------------------

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_CYAN: &str = "\x1b[36m";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RESET: &str = "\x1b[0m";

// ---------------------------------------------------------------------------
// FormatterConfig
// ---------------------------------------------------------------------------

/// Configuration for the report formatter, derived from CLI flags.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Whether ANSI colors are enabled.
    pub colors: bool,
    /// Only error-level findings; no summary.
    pub quiet: bool,
    /// Emit timing and metadata to stderr.
    pub verbose: bool,
    /// Include affirmative findings.
    pub show_passed: bool,
}

impl FormatterConfig {
    /// Constructs a [`FormatterConfig`] from the raw CLI flags.
    pub fn from_flags(no_color_flag: bool, quiet: bool, verbose: bool, show_passed: bool) -> Self {
        Self {
            colors: colors_enabled(no_color_flag),
            quiet,
            verbose,
            show_passed,
        }
    }

    /// Returns `true` if a finding at `level` is written.
    pub fn shows(&self, level: FailureLevel) -> bool {
        match level {
            FailureLevel::Error => true,
            FailureLevel::Warning | FailureLevel::Alert => !self.quiet,
            FailureLevel::Affirmative => self.show_passed && !self.quiet,
            FailureLevel::Ignore => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Finding counts per level, as printed in the summary line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Findings at [`FailureLevel::Error`].
    pub errors: usize,
    /// Findings at [`FailureLevel::Warning`].
    pub warnings: usize,
    /// Findings at [`FailureLevel::Alert`].
    pub alerts: usize,
    /// Findings at [`FailureLevel::Affirmative`].
    pub passed: usize,
}

impl Summary {
    /// Collapses the per-level counts of a validation result.
    pub fn from_counts(counts: &BTreeMap<FailureLevel, usize>) -> Self {
        let get = |level| counts.get(&level).copied().unwrap_or(0);
        Self {
            errors: get(FailureLevel::Error),
            warnings: get(FailureLevel::Warning),
            alerts: get(FailureLevel::Alert),
            passed: get(FailureLevel::Affirmative),
        }
    }

    /// Returns `true` when nothing is at the error level.
    pub fn is_conformant(&self) -> bool {
        self.errors == 0
    }
}

// ---------------------------------------------------------------------------
// Human-mode formatting
// ---------------------------------------------------------------------------

/// Writes a single finding in human-readable format.
///
/// Format: `[E] CARDINALITY  4:1 PID[2]: Segment PID is present 2 times ...`
///
/// The offending value and the rule comment, when present, follow the
/// description.
///
/// # Errors
///
/// Returns an error only if writing to `writer` fails.
pub fn write_failure_human<W: Write>(
    writer: &mut W,
    failure: &MessageFailure,
    level: FailureLevel,
    config: &FormatterConfig,
) -> std::io::Result<()> {
    if !config.shows(level) {
        return Ok(());
    }

    let (tag, color) = match level {
        FailureLevel::Error => ("[E]", ANSI_RED),
        FailureLevel::Warning => ("[W]", ANSI_YELLOW),
        FailureLevel::Alert => ("[A]", ANSI_CYAN),
        FailureLevel::Affirmative | FailureLevel::Ignore => ("[+]", ANSI_GREEN),
    };

    let mut line = format!(
        "{kind}  {location}: {description}",
        kind = failure.kind,
        location = failure.location,
        description = failure.description,
    );
    if let Some(content) = &failure.element_content {
        line.push_str(&format!(" (value '{content}')"));
    }
    if let Some(comment) = &failure.user_comment {
        line.push_str(&format!(" [{comment}]"));
    }

    if config.colors {
        writeln!(writer, "{color}{tag}{ANSI_RESET} {line}")
    } else {
        writeln!(writer, "{tag} {line}")
    }
}

/// Writes the summary line for human mode.
///
/// Format: `1 error, 0 warnings, 2 alerts, 5 passed`
///
/// # Errors
///
/// Returns an error only if writing to `writer` fails.
pub fn write_summary_human<W: Write>(
    writer: &mut W,
    summary: &Summary,
    config: &FormatterConfig,
) -> std::io::Result<()> {
    if config.quiet {
        return Ok(());
    }
    writeln!(
        writer,
        "{} {}, {} {}, {} {}, {} passed",
        summary.errors,
        pluralize(summary.errors, "error", "errors"),
        summary.warnings,
        pluralize(summary.warnings, "warning", "warnings"),
        summary.alerts,
        pluralize(summary.alerts, "alert", "alerts"),
        summary.passed,
    )
}

/// Writes timing information in verbose mode.
///
/// # Errors
///
/// Returns an error only if writing to `writer` fails.
pub fn write_timing_human<W: Write>(
    writer: &mut W,
    label: &str,
    duration: Duration,
    config: &FormatterConfig,
) -> std::io::Result<()> {
    if !config.verbose {
        return Ok(());
    }
    writeln!(writer, "{label} in {}ms", duration.as_millis())
}

// ---------------------------------------------------------------------------
// JSON-mode formatting (NDJSON)
// ---------------------------------------------------------------------------

/// Writes a single finding as a NDJSON line.
///
/// The object is the serde form of [`MessageFailure`] plus `level`:
/// ```json
/// {"kind":"DATA","severity":"NORMAL","description":"...","location":{...},"level":"error"}
/// ```
///
/// # Errors
///
/// Returns an error only if writing to `writer` fails.
pub fn write_failure_json<W: Write>(
    writer: &mut W,
    failure: &MessageFailure,
    level: FailureLevel,
    config: &FormatterConfig,
) -> std::io::Result<()> {
    if !config.shows(level) {
        return Ok(());
    }
    let mut value = serde_json::to_value(failure).map_err(std::io::Error::other)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("level".to_owned(), serde_json::Value::from(level.to_string()));
    }
    writeln!(writer, "{value}")
}

/// Writes a JSON summary object as a final NDJSON line.
///
/// Format:
/// `{"summary":{"errors":1,"warnings":0,"alerts":2,"passed":5,"conformant":false}}`
///
/// # Errors
///
/// Returns an error only if writing to `writer` fails.
pub fn write_summary_json<W: Write>(
    writer: &mut W,
    summary: &Summary,
    config: &FormatterConfig,
) -> std::io::Result<()> {
    if config.quiet {
        return Ok(());
    }
    let value = serde_json::json!({
        "summary": {
            "errors": summary.errors,
            "warnings": summary.warnings,
            "alerts": summary.alerts,
            "passed": summary.passed,
            "conformant": summary.is_conformant(),
        }
    });
    writeln!(writer, "{value}")
}

// ---------------------------------------------------------------------------
// Helper: dispatch by format
// ---------------------------------------------------------------------------

/// Output format selection, mirroring the CLI `--format` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Human-readable, optionally colored output.
    Human,
    /// Structured NDJSON output.
    Json,
}

/// Writes a single finding in the requested format.
///
/// # Errors
///
/// Returns an error only if writing to `writer` fails.
pub fn write_failure<W: Write>(
    writer: &mut W,
    failure: &MessageFailure,
    level: FailureLevel,
    mode: FormatMode,
    config: &FormatterConfig,
) -> std::io::Result<()> {
    match mode {
        FormatMode::Human => write_failure_human(writer, failure, level, config),
        FormatMode::Json => write_failure_json(writer, failure, level, config),
    }
}

/// Writes a summary in the requested format.
///
/// # Errors
///
/// Returns an error only if writing to `writer` fails.
pub fn write_summary<W: Write>(
    writer: &mut W,
    summary: &Summary,
    mode: FormatMode,
    config: &FormatterConfig,
) -> std::io::Result<()> {
    match mode {
        FormatMode::Human => write_summary_human(writer, summary, config),
        FormatMode::Json => write_summary_json(writer, summary, config),
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Returns the singular or plural form of `word` depending on `count`.
fn pluralize<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
