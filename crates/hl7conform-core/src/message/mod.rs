/// HL7 v2 message readers.
///
/// Two encodings are supported:
///
/// - [`Er7Message`]: the pipe-delimited encoding, read as an ordered list of
///   segment lines plus the separators declared in MSH-1/MSH-2;
/// - [`XmlMessage`]: the XML encoding, read as a document tree.
///
/// Both expose the header values the basic checks need through
/// [`MessageHeader`]. [`detect_encoding`] picks the reader from the first
/// bytes of the input.
pub mod er7;
pub mod xml;

use std::fmt;

pub use er7::{Er7Message, Er7Segment, FieldSlice};
pub use xml::{XmlMessage, segment_sequence};

use crate::location::MessageLocation;
use crate::xml::{TreeNavigator, XmlError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading a message. These abort a validation run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The input contains no segments.
    #[error("message is empty")]
    Empty,
    /// The first segment is not MSH.
    #[error("message does not start with an MSH segment (line {line} starts with {found:?})")]
    NoHeader {
        /// Line of the first segment.
        line: usize,
        /// First characters of that line.
        found: String,
    },
    /// MSH is too short to declare its separators.
    #[error("MSH segment on line {line} is too short to declare separators")]
    MalformedHeader {
        /// Line of the MSH segment.
        line: usize,
    },
    /// A line does not start with a three-character segment id followed by
    /// the field separator.
    #[error("line {line} does not start with a segment id: {found:?}")]
    InvalidSegment {
        /// Offending line.
        line: usize,
        /// First characters of that line.
        found: String,
    },
    /// The XML encoding is not well-formed.
    #[error("XML message is not well-formed: {0}")]
    Xml(#[from] XmlError),
    /// The XML encoding has no MSH element below the root.
    #[error("XML message has no MSH element")]
    MissingXmlHeader,
}

// ---------------------------------------------------------------------------
// Separators
// ---------------------------------------------------------------------------

/// The five ER7 delimiter characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    /// Field separator, MSH-1.
    pub field: char,
    /// Component separator, MSH-2 first character.
    pub component: char,
    /// Repetition separator, MSH-2 second character.
    pub repetition: char,
    /// Escape character, MSH-2 third character.
    pub escape: char,
    /// Subcomponent separator, MSH-2 fourth character.
    pub subcomponent: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

// ---------------------------------------------------------------------------
// Header access
// ---------------------------------------------------------------------------

/// Identification values read from the MSH segment.
///
/// Empty values are reported as `None`.
pub trait MessageHeader {
    /// MSH-12.1.
    fn version(&self) -> Option<&str>;
    /// MSH-9.1.
    fn message_type(&self) -> Option<&str>;
    /// MSH-9.2.
    fn trigger_event(&self) -> Option<&str>;
    /// MSH-9.3.
    fn structure_id(&self) -> Option<&str>;
}

// ---------------------------------------------------------------------------
// Encoding detection
// ---------------------------------------------------------------------------

/// Surface syntax of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Pipe-delimited ER7.
    Er7,
    /// XML encoding.
    Xml,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Er7 => f.write_str("ER7"),
            Self::Xml => f.write_str("XML"),
        }
    }
}

/// Error returned when the initial bytes match neither encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingDetectionError {
    /// The first non-whitespace bytes that were inspected (up to 4 bytes).
    pub first_bytes: Vec<u8>,
}

impl fmt::Display for EncodingDetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized message encoding: first bytes are {:02X?}",
            self.first_bytes
        )
    }
}

impl std::error::Error for EncodingDetectionError {}

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const WHITESPACE: [u8; 4] = [0x09, 0x0A, 0x0D, 0x20];

/// Detects the encoding of a message from its initial bytes.
///
/// After skipping a UTF-8 byte-order mark and leading whitespace, `<` selects
/// [`Encoding::Xml`] and `MSH` selects [`Encoding::Er7`].
///
/// # Errors
///
/// Returns [`EncodingDetectionError`] when neither prefix is found.
pub fn detect_encoding(bytes: &[u8]) -> Result<Encoding, EncodingDetectionError> {
    let bytes = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !WHITESPACE.contains(b))
        .unwrap_or(bytes.len());
    let rest = &bytes[start..];

    if rest.starts_with(b"<") {
        return Ok(Encoding::Xml);
    }
    if rest.starts_with(b"MSH") {
        return Ok(Encoding::Er7);
    }
    Err(EncodingDetectionError {
        first_bytes: rest.iter().copied().take(4).collect(),
    })
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message in either encoding.
#[derive(Debug, Clone)]
pub enum Message {
    /// Pipe-delimited message.
    Er7(Er7Message),
    /// XML-encoded message.
    Xml(XmlMessage),
}

impl Message {
    /// The encoding this message was read from.
    pub fn encoding(&self) -> Encoding {
        match self {
            Self::Er7(_) => Encoding::Er7,
            Self::Xml(_) => Encoding::Xml,
        }
    }

    /// Header values, whichever the encoding.
    pub fn header(&self) -> &dyn MessageHeader {
        match self {
            Self::Er7(m) => m,
            Self::Xml(m) => m,
        }
    }

    /// Text at `location`, `None` when the message does not reach it.
    pub fn value_at(&self, location: &MessageLocation) -> Option<&str> {
        match self {
            Self::Er7(m) => m.value_at(location),
            Self::Xml(m) => m.value_at(location),
        }
    }

    /// Line and column of the element at `location`, or of the closest
    /// enclosing segment that exists. `(0, 0)` when not even the segment is
    /// present.
    pub fn position_of(&self, location: &MessageLocation) -> (usize, usize) {
        match self {
            Self::Er7(m) => {
                let Some(segment) = m.segment_at(location) else {
                    return (0, 0);
                };
                let column = segment
                    .fields(m.separators())
                    .into_iter()
                    .find(|f| f.position == location.field())
                    .map_or(1, |f| f.column);
                (segment.line, column)
            }
            Self::Xml(m) => {
                let doc = m.document();
                m.element_at(location)
                    .or_else(|| m.element_at(&location.segment_location()))
                    .map_or((0, 0), |node| {
                        let at = doc.bookmark(node);
                        (at.line, at.column)
                    })
            }
        }
    }
}
