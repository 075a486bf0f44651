//! Implementation of `hl7conform validate <message> --profile <profile>`.
//!
//! Loads the profile and the optional table library, validation context and
//! content rules, validates the message and writes the report to stderr.
//!
//! Exit codes:
//! - 0 = conformant (no finding at the `error` level)
//! - 1 = at least one error-level finding
//! - 2 = an input could not be read or parsed
use std::path::{Path, PathBuf};
use std::time::Instant;

use hl7conform_core::{
    Profile, RuleSet, TableLibrary, ValidationContext, ValidationResult, Validator,
};
use tracing::{debug, info};

use crate::OutputFormat;
use crate::error::CliError;
use crate::format::{
    FormatMode, FormatterConfig, Summary, write_failure, write_summary, write_timing_human,
};
use crate::io::{InputKind, load, load_or_default};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Paths of the validator's inputs, as given on the command line.
#[derive(Debug, Clone)]
pub struct ValidatorInputs {
    /// Conformance profile.
    pub profile: PathBuf,
    /// Table library; an empty library when absent.
    pub tables: Option<PathBuf>,
    /// Validation context; the defaults when absent.
    pub context: Option<PathBuf>,
    /// Content rules; none when absent.
    pub rules: Option<PathBuf>,
}

/// Reads and parses every validator input.
///
/// # Errors
///
/// Returns [`CliError`] (exit code 2) when a file cannot be read or parsed.
pub fn load_validator(inputs: &ValidatorInputs, max_file_size: u64) -> Result<Validator, CliError> {
    let profile = load_profile(&inputs.profile, max_file_size)?;
    let tables = load_or_default(
        InputKind::Tables,
        inputs.tables.as_deref(),
        max_file_size,
        TableLibrary::parse,
    )?;
    let context = load_or_default(
        InputKind::Context,
        inputs.context.as_deref(),
        max_file_size,
        ValidationContext::from_json,
    )?;
    let rules = load_or_default(
        InputKind::Rules,
        inputs.rules.as_deref(),
        max_file_size,
        RuleSet::from_json,
    )?;

    info!(
        structure = %profile.header().structure_id,
        tables = tables.len(),
        rules = rules.len(),
        "validator inputs loaded"
    );
    Ok(Validator::new(profile, tables, context).with_rules(rules))
}

/// Reads and parses a conformance profile.
///
/// # Errors
///
/// Returns [`CliError`] (exit code 2) when the file cannot be read, is not
/// an HL7 v2 profile, or is malformed.
pub fn load_profile(path: &Path, max_file_size: u64) -> Result<Profile, CliError> {
    load(InputKind::Profile, path, max_file_size, Profile::parse)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Runs the `validate` command on already read message text.
///
/// `source` labels the message in error messages (`"-"` for stdin).
///
/// # Errors
///
/// - [`CliError::ParseFailed`] when the encoding cannot be detected or the
///   message is malformed.
/// - [`CliError::ValidationErrors`] when a finding is at the error level.
pub fn run(
    content: &str,
    source: &str,
    validator: &Validator,
    format: &OutputFormat,
    config: &FormatterConfig,
) -> Result<(), CliError> {
    let started = Instant::now();
    let result = validator
        .validate(content)
        .map_err(|e| CliError::parse_failed(InputKind::Message, source, &e))?;
    let elapsed = started.elapsed();
    debug!(findings = result.len(), elapsed_ms = elapsed.as_millis(), "validation finished");

    let mode = match format {
        OutputFormat::Human => FormatMode::Human,
        OutputFormat::Json => FormatMode::Json,
    };

    let stderr = std::io::stderr();
    let mut err_out = stderr.lock();
    let summary = write_report(&mut err_out, &result, validator.context(), mode, config)
        .map_err(|e| CliError::output_failed("stderr", &e))?;
    if mode == FormatMode::Human {
        write_timing_human(&mut err_out, &format!("validated {source}"), elapsed, config)
            .map_err(|e| CliError::output_failed("stderr", &e))?;
    }

    if summary.is_conformant() {
        Ok(())
    } else {
        Err(CliError::ValidationErrors)
    }
}

/// Writes every finding and the summary; returns the summary.
fn write_report<W: std::io::Write>(
    writer: &mut W,
    result: &ValidationResult,
    context: &ValidationContext,
    mode: FormatMode,
    config: &FormatterConfig,
) -> std::io::Result<Summary> {
    for failure in result.iter() {
        write_failure(writer, failure, context.level_for(failure.kind), mode, config)?;
    }
    let summary = Summary::from_counts(&result.counts(context));
    write_summary(writer, &summary, mode, config)?;
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::wildcard_enum_match_arm)]

    use std::io::Write as _;

    use super::*;

    const PROFILE: &str = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ADT" EventType="A01" MsgStructID="ADT_A01">
    <Segment Name="MSH" Usage="R" Min="1" Max="1">
      <Field Name="Field Separator" Usage="R" Min="1" Max="1" Datatype="ST" Length="1"/>
      <Field Name="Encoding Characters" Usage="R" Min="1" Max="1" Datatype="ST" Length="4"/>
    </Segment>
    <Segment Name="PID" Usage="R" Min="1" Max="1"/>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;

    const CONFORMANT: &str = "MSH|^~\\&|||||||ADT^A01^ADT_A01|1|P|2.5\rPID|1\r";
    const REPEATED: &str = "MSH|^~\\&|||||||ADT^A01^ADT_A01|1|P|2.5\rPID|1\rPID|2\r";

    fn validator() -> Validator {
        let profile = Profile::parse(PROFILE).expect("valid profile");
        Validator::new(profile, TableLibrary::new(), ValidationContext::default())
    }

    fn config() -> FormatterConfig {
        FormatterConfig {
            colors: false,
            quiet: false,
            verbose: false,
            show_passed: false,
        }
    }

    // ── run ───────────────────────────────────────────────────────────────────

    #[test]
    fn conformant_message_returns_ok() {
        let result = run(CONFORMANT, "-", &validator(), &OutputFormat::Human, &config());
        assert!(result.is_ok(), "expected Ok for conformant message: {result:?}");
    }

    #[test]
    fn repeated_segment_returns_validation_errors() {
        let err = run(REPEATED, "-", &validator(), &OutputFormat::Json, &config())
            .expect_err("PID is repeated");
        assert!(matches!(err, CliError::ValidationErrors));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn unknown_encoding_is_exit_2() {
        let err = run("PID|1", "notes.txt", &validator(), &OutputFormat::Human, &config())
            .expect_err("not a message");
        match &err {
            CliError::ParseFailed {
                input: InputKind::Message,
                source,
                ..
            } => assert_eq!(source, "notes.txt"),
            other => panic!("expected ParseFailed, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 2);
    }

    // ── report ────────────────────────────────────────────────────────────────

    #[test]
    fn report_counts_by_level() {
        let v = validator();
        let result = v.validate(REPEATED).expect("readable");
        let mut buf = Vec::new();
        let summary = write_report(&mut buf, &result, v.context(), FormatMode::Human, &config())
            .expect("write");
        assert_eq!(summary.errors, 1);
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("[E] CARDINALITY"), "{text}");
        assert!(text.contains("\n1 error, 0 warnings, 0 alerts, "), "{text}");
    }

    #[test]
    fn show_passed_writes_markers() {
        let v = validator();
        let result = v.validate(CONFORMANT).expect("readable");
        let passed = FormatterConfig {
            show_passed: true,
            ..config()
        };
        let mut buf = Vec::new();
        write_report(&mut buf, &result, v.context(), FormatMode::Human, &passed).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.lines().filter(|l| l.starts_with("[+] CHECKED")).count() >= 2, "{text}");
    }

    // ── inputs ────────────────────────────────────────────────────────────────

    #[test]
    fn missing_profile_is_file_not_found() {
        let inputs = ValidatorInputs {
            profile: PathBuf::from("/no/such/profile.xml"),
            tables: None,
            context: None,
            rules: None,
        };
        let err = load_validator(&inputs, 1024).expect_err("missing");
        assert!(matches!(
            err,
            CliError::InputNotFound {
                input: InputKind::Profile,
                ..
            }
        ));
    }

    #[test]
    fn malformed_tables_name_the_table_library() {
        let mut profile = tempfile::NamedTempFile::new().expect("temp file");
        profile.write_all(PROFILE.as_bytes()).expect("write");
        let mut tables = tempfile::NamedTempFile::new().expect("temp file");
        tables.write_all(b"<Specification>").expect("write");
        let inputs = ValidatorInputs {
            profile: profile.path().to_path_buf(),
            tables: Some(tables.path().to_path_buf()),
            context: None,
            rules: None,
        };
        let err = load_validator(&inputs, 1024).expect_err("truncated table library");
        match &err {
            CliError::ParseFailed {
                input: InputKind::Tables,
                source,
                ..
            } => assert_eq!(source, &tables.path().display().to_string()),
            other => panic!("expected ParseFailed, got {other:?}"),
        }
    }
}
