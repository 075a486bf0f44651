//! Loading the validator's inputs.
//!
//! Every input the binary reads comes through here: the message (a file or
//! stdin) and the conformance profile with its optional table library,
//! validation context and content rules. Each input is capped at
//! `--max-file-size`, must be UTF-8, and any failure names the input it
//! concerns. `hl7conform-core` never touches the filesystem.
use std::fmt;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::PathOrStdin;
use crate::error::CliError;

/// Label of the message when it is read from stdin.
pub const STDIN_LABEL: &str = "-";

/// One of the inputs `hl7conform` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// The message under validation.
    Message,
    /// The conformance profile.
    Profile,
    /// The table library.
    Tables,
    /// The validation context.
    Context,
    /// The content rules.
    Rules,
}

impl InputKind {
    /// The noun used for this input in error messages.
    pub fn noun(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Profile => "profile",
            Self::Tables => "table library",
            Self::Context => "validation context",
            Self::Rules => "content rules",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// The text of the message together with the label it is reported under.
#[derive(Debug, Clone)]
pub struct MessageText {
    /// The path as given, or `"-"` for stdin.
    pub label: String,
    /// The decoded message.
    pub text: String,
}

/// Reads the message from a file or stdin.
///
/// # Errors
///
/// Returns a [`CliError`] tagged [`InputKind::Message`] (exit code 2) when
/// the source is missing, unreadable, over `limit` or not UTF-8.
pub fn read_message(source: &PathOrStdin, limit: u64) -> Result<MessageText, CliError> {
    match source {
        PathOrStdin::Path(path) => Ok(MessageText {
            label: path.display().to_string(),
            text: read_file(InputKind::Message, path, limit)?,
        }),
        PathOrStdin::Stdin => {
            let stdin = std::io::stdin();
            Ok(MessageText {
                label: STDIN_LABEL.to_owned(),
                text: read_stream(InputKind::Message, STDIN_LABEL, stdin.lock(), limit)?,
            })
        }
    }
}

/// Reads the side input at `path` and parses it with `parse`.
///
/// # Errors
///
/// Returns a [`CliError`] tagged with `kind` (exit code 2) when the file
/// cannot be read or `parse` rejects it.
pub fn load<T, E>(
    kind: InputKind,
    path: &Path,
    limit: u64,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, CliError>
where
    E: std::error::Error,
{
    let text = read_file(kind, path, limit)?;
    debug!(input = kind.noun(), path = %path.display(), bytes = text.len(), "input read");
    parse(&text).map_err(|e| CliError::parse_failed(kind, path.display().to_string(), &e))
}

/// Like [`load`], falling back to `T::default()` when no path was given.
///
/// # Errors
///
/// See [`load`].
pub fn load_or_default<T, E>(
    kind: InputKind,
    path: Option<&Path>,
    limit: u64,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, CliError>
where
    T: Default,
    E: std::error::Error,
{
    match path {
        Some(path) => load(kind, path, limit, parse),
        None => Ok(T::default()),
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Reads a disk file; the size is checked before any byte is read.
fn read_file(kind: InputKind, path: &Path, limit: u64) -> Result<String, CliError> {
    let size = std::fs::metadata(path)
        .map_err(|e| unreadable(kind, path, &e))?
        .len();
    if size > limit {
        return Err(CliError::InputTooLarge {
            input: kind,
            source: path.display().to_string(),
            limit,
            actual: Some(size),
        });
    }
    let bytes = std::fs::read(path).map_err(|e| unreadable(kind, path, &e))?;
    decode(kind, &path.display().to_string(), bytes)
}

/// Reads a stream of unknown length, allocating at most `limit + 1` bytes.
fn read_stream(kind: InputKind, label: &str, reader: impl Read, limit: u64) -> Result<String, CliError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| CliError::InputUnreadable {
            input: kind,
            source: label.to_owned(),
            detail: e.to_string(),
        })?;
    if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > limit {
        return Err(CliError::InputTooLarge {
            input: kind,
            source: label.to_owned(),
            limit,
            actual: None,
        });
    }
    decode(kind, label, bytes)
}

fn decode(kind: InputKind, label: &str, bytes: Vec<u8>) -> Result<String, CliError> {
    String::from_utf8(bytes).map_err(|e| CliError::InvalidUtf8 {
        input: kind,
        source: label.to_owned(),
        byte_offset: e.utf8_error().valid_up_to(),
    })
}

fn unreadable(kind: InputKind, path: &Path, e: &std::io::Error) -> CliError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CliError::InputNotFound {
            input: kind,
            path: path.to_path_buf(),
        }
    } else if e.kind() == std::io::ErrorKind::PermissionDenied {
        CliError::PermissionDenied {
            input: kind,
            path: path.to_path_buf(),
        }
    } else {
        CliError::InputUnreadable {
            input: kind,
            source: path.display().to_string(),
            detail: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
