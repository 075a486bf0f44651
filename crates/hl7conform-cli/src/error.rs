//! CLI error types with associated exit codes.
//!
//! [`CliError`] is the top-level error type for the `hl7conform` binary.
//! Every variant maps to a stable exit code (1 or 2) via
//! [`CliError::exit_code`]:
//!
//! - Exit code **2**: the tool could not read or parse one of its inputs
//!   (message, profile, table library, context, rules, location). Nothing is
//!   validated. A report that cannot be written also exits 2.
//! - Exit code **1**: validation ran to completion and at least one finding
//!   sits at the `error` level.
use std::fmt;
use std::path::PathBuf;

use crate::io::InputKind;

// ---------------------------------------------------------------------------
// CliError
// ---------------------------------------------------------------------------

/// All error conditions that the `hl7conform` CLI can produce.
///
/// Input failures carry the [`InputKind`] they concern, so a missing table
/// library reads differently from a missing message.
#[derive(Debug)]
pub enum CliError {
    // --- Exit code 2: input failures ---
    /// An input file does not exist.
    InputNotFound {
        input: InputKind,
        path: PathBuf,
    },

    /// The process lacks permission to read an input file.
    PermissionDenied {
        input: InputKind,
        path: PathBuf,
    },

    /// An input exceeds the `--max-file-size` limit.
    InputTooLarge {
        input: InputKind,
        /// `"-"` for stdin, or the filesystem path.
        source: String,
        /// The configured size limit in bytes.
        limit: u64,
        /// The actual size in bytes; `None` for stdin.
        actual: Option<u64>,
    },

    /// An input is not valid UTF-8.
    InvalidUtf8 {
        input: InputKind,
        source: String,
        /// The byte offset of the first invalid byte sequence.
        byte_offset: usize,
    },

    /// Any other I/O failure while reading an input, stdin included.
    InputUnreadable {
        input: InputKind,
        source: String,
        detail: String,
    },

    /// An input was read but could not be parsed: a malformed profile,
    /// table library, context or rule file, or a message whose encoding is
    /// unknown or malformed.
    ParseFailed {
        input: InputKind,
        /// The path, or `"-"` for stdin.
        source: String,
        /// The parser's error message.
        detail: String,
    },

    /// A location argument is not a valid flat path.
    InvalidLocation {
        /// The argument as given.
        input: String,
        /// Why it was rejected.
        detail: String,
    },

    // --- Exit code 2: output failures ---
    /// A report could not be written to `stream` (`"stdout"` or `"stderr"`).
    OutputFailed {
        stream: &'static str,
        detail: String,
    },

    // --- Exit code 1: logical failures ---
    /// The message has findings at the `error` level.
    ///
    /// The findings have already been printed; this variant exists so
    /// `main` can call `process::exit(1)` cleanly.
    ValidationErrors,
}

impl CliError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InputNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::InputTooLarge { .. }
            | Self::InvalidUtf8 { .. }
            | Self::InputUnreadable { .. }
            | Self::ParseFailed { .. }
            | Self::InvalidLocation { .. }
            | Self::OutputFailed { .. } => 2,

            Self::ValidationErrors => 1,
        }
    }

    /// Returns a human-readable error message suitable for printing to stderr.
    pub fn message(&self) -> String {
        match self {
            Self::InputNotFound { input, path } => {
                format!("error: {input} not found: {}", path.display())
            }
            Self::PermissionDenied { input, path } => {
                format!("error: permission denied reading {input} {}", path.display())
            }
            Self::InputTooLarge {
                input,
                source,
                limit,
                actual: Some(actual),
            } => {
                format!("error: {input} too large: {source} is {actual} bytes, limit is {limit} bytes")
            }
            Self::InputTooLarge {
                input,
                source,
                limit,
                actual: None,
            } => {
                format!("error: {input} too large: {source} exceeded limit of {limit} bytes")
            }
            Self::InvalidUtf8 {
                input,
                source,
                byte_offset,
            } => {
                format!(
                    "error: invalid UTF-8 in {input} {source}: first invalid byte at offset {byte_offset}"
                )
            }
            Self::InputUnreadable {
                input,
                source,
                detail,
            } => {
                format!("error: cannot read {input} {source}: {detail}")
            }
            Self::ParseFailed {
                input,
                source,
                detail,
            } => {
                format!("error: cannot parse {input} {source}: {detail}")
            }
            Self::InvalidLocation { input, detail } => {
                format!("error: invalid location '{input}': {detail}")
            }
            Self::OutputFailed { stream, detail } => {
                format!("error: cannot write to {stream}: {detail}")
            }
            Self::ValidationErrors => "error: message is not conformant".to_owned(),
        }
    }

    /// Wraps a parser error for the `input` read from `source`.
    pub fn parse_failed(input: InputKind, source: impl Into<String>, err: &dyn std::error::Error) -> Self {
        Self::ParseFailed {
            input,
            source: source.into(),
            detail: err.to_string(),
        }
    }

    /// Wraps a failed write of a report to `stream`.
    pub fn output_failed(stream: &'static str, err: &std::io::Error) -> Self {
        Self::OutputFailed {
            stream,
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for CliError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use std::path::PathBuf;

    use super::*;

    // ── exit_code ────────────────────────────────────────────────────────────

    #[test]
    fn input_failures_are_exit_2() {
        let errors = [
            CliError::InputNotFound {
                input: InputKind::Message,
                path: PathBuf::from("adt.er7"),
            },
            CliError::PermissionDenied {
                input: InputKind::Profile,
                path: PathBuf::from("/root/adt_a01.xml"),
            },
            CliError::InputTooLarge {
                input: InputKind::Message,
                source: "big.er7".to_owned(),
                limit: 1024,
                actual: Some(2048),
            },
            CliError::InvalidUtf8 {
                input: InputKind::Tables,
                source: "tables.xml".to_owned(),
                byte_offset: 42,
            },
            CliError::InputUnreadable {
                input: InputKind::Message,
                source: "-".to_owned(),
                detail: "broken pipe".to_owned(),
            },
            CliError::ParseFailed {
                input: InputKind::Profile,
                source: "profile.xml".to_owned(),
                detail: "unrecognized profile root element <foo>".to_owned(),
            },
            CliError::InvalidLocation {
                input: "PID[x]".to_owned(),
                detail: "bad instance".to_owned(),
            },
            CliError::OutputFailed {
                stream: "stdout",
                detail: "broken pipe".to_owned(),
            },
        ];
        for e in &errors {
            assert_eq!(e.exit_code(), 2, "{e}");
        }
    }

    #[test]
    fn validation_errors_is_exit_1() {
        assert_eq!(CliError::ValidationErrors.exit_code(), 1);
    }

    // ── message content ──────────────────────────────────────────────────────

    #[test]
    fn not_found_names_the_input_and_path() {
        let e = CliError::InputNotFound {
            input: InputKind::Tables,
            path: PathBuf::from("tables.xml"),
        };
        assert_eq!(e.message(), "error: table library not found: tables.xml");
    }

    #[test]
    fn too_large_mentions_sizes() {
        let with_actual = CliError::InputTooLarge {
            input: InputKind::Message,
            source: "big.er7".to_owned(),
            limit: 1_000_000,
            actual: Some(2_000_000),
        }
        .message();
        assert_eq!(
            with_actual,
            "error: message too large: big.er7 is 2000000 bytes, limit is 1000000 bytes"
        );

        let stdin = CliError::InputTooLarge {
            input: InputKind::Message,
            source: "-".to_owned(),
            limit: 512,
            actual: None,
        }
        .message();
        assert!(stdin.contains("exceeded limit of 512 bytes"), "message: {stdin}");
    }

    #[test]
    fn parse_failed_names_the_input_and_source() {
        let err = serde_json::from_str::<serde_json::Value>("{").expect_err("truncated");
        let e = CliError::parse_failed(InputKind::Rules, "rules.json", &err);
        let msg = e.message();
        assert!(msg.starts_with("error: cannot parse content rules rules.json: "), "message: {msg}");
    }

    #[test]
    fn invalid_location_quotes_the_input() {
        let e = CliError::InvalidLocation {
            input: "PID[0]".to_owned(),
            detail: "instance numbers start at 1".to_owned(),
        };
        assert!(e.message().contains("'PID[0]'"));
    }

    #[test]
    fn display_matches_message() {
        let e = CliError::ValidationErrors;
        assert_eq!(format!("{e}"), e.message());
    }
}
