/// Failure records produced by message validation.
///
/// This module defines [`FailureKind`], [`Severity`], [`FailureLocation`],
/// [`MessageFailure`] and [`ValidationResult`]. Every finding of every
/// validation phase is a [`MessageFailure`]; affirmative markers
/// ([`FailureKind::Checked`], [`FailureKind::DataPassed`]) travel in the same
/// list so a report can say "N aspects checked, 0 errors" instead of staying
/// silent.
///
/// The core classifies findings by kind only. Whether a kind counts as an
/// error, a warning, an alert or nothing at all is decided by
/// [`ValidationContext::level_for`].
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{FailureLevel, ValidationContext};
use crate::location::MessageLocation;
use crate::profile::Profile;

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

/// The category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// MSH-12 does not match the profile's HL7 version.
    Version,
    /// MSH-9 type, trigger or structure id does not match the profile.
    MessageStructureId,
    /// The segment skeleton does not follow the profile grammar, or a field
    /// lacks all of its declared children.
    MessageStructure,
    /// A required element is missing.
    Usage,
    /// An element occurs too few or too many times.
    Cardinality,
    /// A value exceeds the declared length.
    Length,
    /// The referenced table is not in the table library.
    TableNotFound,
    /// A value does not match its primitive datatype.
    Datatype,
    /// A value fails a table, constant or separator check.
    Data,
    /// A value passed a table or constant check.
    DataPassed,
    /// A validation phase completed without findings.
    Checked,
    /// An element declared with usage `X` is present.
    XUsage,
    /// An element not declared by the profile is present.
    Xtra,
    /// The profile grammar is ambiguous for this message.
    AmbiguousProfile,
    /// The validation set-up itself is questionable (empty table, content
    /// rule pointing outside the profile).
    ValidationConfiguration,
    /// A segment could not be attributed to a single profile definition.
    SegmentUnmapped,
}

impl FailureKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 16] = [
        Self::Version,
        Self::MessageStructureId,
        Self::MessageStructure,
        Self::Usage,
        Self::Cardinality,
        Self::Length,
        Self::TableNotFound,
        Self::Datatype,
        Self::Data,
        Self::DataPassed,
        Self::Checked,
        Self::XUsage,
        Self::Xtra,
        Self::AmbiguousProfile,
        Self::ValidationConfiguration,
        Self::SegmentUnmapped,
    ];

    /// Canonical upper-case code, as used in serialized output.
    pub fn code(self) -> &'static str {
        match self {
            Self::Version => "VERSION",
            Self::MessageStructureId => "MESSAGE_STRUCTURE_ID",
            Self::MessageStructure => "MESSAGE_STRUCTURE",
            Self::Usage => "USAGE",
            Self::Cardinality => "CARDINALITY",
            Self::Length => "LENGTH",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::Datatype => "DATATYPE",
            Self::Data => "DATA",
            Self::DataPassed => "DATA_PASSED",
            Self::Checked => "CHECKED",
            Self::XUsage => "X_USAGE",
            Self::Xtra => "XTRA",
            Self::AmbiguousProfile => "AMBIGUOUS_PROFILE",
            Self::ValidationConfiguration => "VALIDATION_CONFIGURATION",
            Self::SegmentUnmapped => "SEGMENT_UNMAPPED",
        }
    }

    /// Returns `true` for the markers that record success.
    pub fn is_affirmative(self) -> bool {
        matches!(self, Self::Checked | Self::DataPassed)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Whether a finding stops the phases after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Reported; later phases still run.
    #[default]
    Normal,
    /// Reported; deeper phases are skipped because their positions would be
    /// meaningless.
    Fatal,
}

// ---------------------------------------------------------------------------
// FailureLocation
// ---------------------------------------------------------------------------

/// Where a finding was detected.
///
/// `line` and `column` are 1-based; `0` means "not tied to a position" (for
/// example a finding about the profile set-up).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FailureLocation {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    /// Flat path, e.g. `PID[1].3[1]`.
    pub flat_path: String,
    /// Positional tree path, e.g. `/ADT_A01[1]/PID[1]/PID.3[1]`.
    pub tree_path: String,
}

impl FailureLocation {
    /// Builds a location from a message coordinate, rendering both paths.
    pub fn at(location: &MessageLocation, profile: &Profile, line: usize, column: usize) -> Self {
        Self {
            line,
            column,
            flat_path: location.to_flat_path(),
            tree_path: location.to_tree_path(profile),
        }
    }
}

impl fmt::Display for FailureLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.flat_path.is_empty() {
            &self.tree_path
        } else {
            &self.flat_path
        };
        match (self.line, path.is_empty()) {
            (0, true) => f.write_str("-"),
            (0, false) => f.write_str(path),
            (line, true) => write!(f, "{line}:{}", self.column),
            (line, false) => write!(f, "{line}:{} {path}", self.column),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageFailure
// ---------------------------------------------------------------------------

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFailure {
    /// Category.
    pub kind: FailureKind,
    /// Whether later phases are skipped.
    pub severity: Severity,
    /// Human-readable explanation.
    pub description: String,
    /// The raw value the finding is about, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_content: Option<String>,
    /// Position in the message.
    pub location: FailureLocation,
    /// The assertion that was evaluated (content rules only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<String>,
    /// Free-text comment attached to the rule (content rules only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
}

impl MessageFailure {
    /// A [`Severity::Normal`] finding without location.
    pub fn new(kind: FailureKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Normal,
            description: description.into(),
            element_content: None,
            location: FailureLocation::default(),
            assertion: None,
            user_comment: None,
        }
    }

    /// A [`FailureKind::Checked`] marker.
    pub fn checked(description: impl Into<String>) -> Self {
        Self::new(FailureKind::Checked, description)
    }

    /// Marks the finding [`Severity::Fatal`].
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.severity = Severity::Fatal;
        self
    }

    /// Attaches a location.
    #[must_use]
    pub fn located(mut self, location: FailureLocation) -> Self {
        self.location = location;
        self
    }

    /// Attaches the offending value.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.element_content = Some(content.into());
        self
    }

    /// Returns `true` for [`Severity::Fatal`].
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl fmt::Display for MessageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.severity {
            Severity::Fatal => "!",
            Severity::Normal => "",
        };
        write!(
            f,
            "[{}{marker}] {}: {}",
            self.kind, self.location, self.description
        )
    }
}

// ---------------------------------------------------------------------------
// ValidationResult
// ---------------------------------------------------------------------------

/// The ordered output of one validation run.
///
/// Findings appear in the order the phases produced them; within a phase,
/// in document order. Nothing is ever removed or rewritten once pushed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Every finding, affirmative markers included.
    pub failures: Vec<MessageFailure>,
}

impl ValidationResult {
    /// An empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finding.
    pub fn push(&mut self, failure: MessageFailure) {
        self.failures.push(failure);
    }

    /// Appends several findings in order.
    pub fn extend(&mut self, failures: impl IntoIterator<Item = MessageFailure>) {
        self.failures.extend(failures);
    }

    /// Total number of findings, markers included.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// All findings in order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MessageFailure> {
        self.failures.iter()
    }

    /// Findings of one kind.
    pub fn by_kind(&self, kind: FailureKind) -> impl Iterator<Item = &MessageFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }

    /// Findings that are not affirmative markers.
    pub fn problems(&self) -> impl Iterator<Item = &MessageFailure> {
        self.failures.iter().filter(|f| !f.kind.is_affirmative())
    }

    /// Returns `true` if any finding is fatal.
    pub fn has_fatal(&self) -> bool {
        self.failures.iter().any(MessageFailure::is_fatal)
    }

    /// Findings whose level under `context` is `level`.
    pub fn at_level<'a>(
        &'a self,
        context: &'a ValidationContext,
        level: FailureLevel,
    ) -> impl Iterator<Item = &'a MessageFailure> {
        self.failures
            .iter()
            .filter(move |f| context.level_for(f.kind) == level)
    }

    /// Number of findings per level under `context`.
    pub fn counts(&self, context: &ValidationContext) -> BTreeMap<FailureLevel, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(context.level_for(failure.kind)).or_insert(0) += 1;
        }
        counts
    }

    /// Returns `true` if no finding is at [`FailureLevel::Error`] under `context`.
    pub fn is_conformant(&self, context: &ValidationContext) -> bool {
        self.at_level(context, FailureLevel::Error).next().is_none()
    }
}

impl IntoIterator for ValidationResult {
    type Item = MessageFailure;
    type IntoIter = std::vec::IntoIter<MessageFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn sample() -> ValidationResult {
        let mut result = ValidationResult::new();
        result.push(MessageFailure::checked("Version is correct"));
        result.push(
            MessageFailure::new(FailureKind::Cardinality, "Segment PID is present 2 times")
                .located(FailureLocation {
                    line: 4,
                    column: 1,
                    flat_path: "PID[2]".to_owned(),
                    tree_path: String::new(),
                }),
        );
        result.push(MessageFailure::new(FailureKind::TableNotFound, "Table 0099 not found"));
        result.push(MessageFailure::new(FailureKind::DataPassed, "value ok"));
        result
    }

    #[test]
    fn kind_codes_match_serde() {
        for kind in FailureKind::ALL {
            let json = serde_json::to_string(&kind).expect("serialize");
            assert_eq!(json, format!("\"{}\"", kind.code()));
        }
    }

    #[test]
    fn problems_skip_affirmative_markers() {
        let result = sample();
        let kinds: Vec<FailureKind> = result.problems().map(|f| f.kind).collect();
        assert_eq!(kinds, [FailureKind::Cardinality, FailureKind::TableNotFound]);
    }

    #[test]
    fn counts_follow_default_levels() {
        let result = sample();
        let counts = result.counts(&ValidationContext::default());
        assert_eq!(counts.get(&FailureLevel::Error), Some(&1));
        assert_eq!(counts.get(&FailureLevel::Alert), Some(&1));
        assert_eq!(counts.get(&FailureLevel::Affirmative), Some(&2));
        assert!(!result.is_conformant(&ValidationContext::default()));
    }

    #[test]
    fn overridden_level_changes_conformance() {
        let result = sample();
        let mut context = ValidationContext::default();
        context
            .failure_levels
            .insert(FailureKind::Cardinality, FailureLevel::Warning);
        assert!(result.is_conformant(&context));
    }

    #[test]
    fn display_includes_position_and_path() {
        let result = sample();
        assert_eq!(
            result.failures[1].to_string(),
            "[CARDINALITY] 4:1 PID[2]: Segment PID is present 2 times"
        );
        let fatal = MessageFailure::new(FailureKind::Version, "wrong version").fatal();
        assert_eq!(fatal.to_string(), "[VERSION!] -: wrong version");
    }

    #[test]
    fn json_omits_empty_optionals() {
        let failure = MessageFailure::new(FailureKind::Usage, "missing");
        let json = serde_json::to_value(&failure).expect("serialize");
        assert!(json.get("assertion").is_none());
        assert_eq!(json["severity"], "NORMAL");
        assert_eq!(json["kind"], "USAGE");
    }
}
