/// Validation context: caller-tunable settings for one validator.
///
/// ```
/// use hl7conform_core::config::{FailureLevel, ValidationContext};
/// use hl7conform_core::failure::FailureKind;
///
/// let ctx = ValidationContext::default();
/// assert!(!ctx.has_groups);
/// assert_eq!(ctx.unbounded_max, 3);
/// assert_eq!(ctx.level_for(FailureKind::TableNotFound), FailureLevel::Alert);
/// ```
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::failure::FailureKind;

/// Final verdict a report assigns to a failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureLevel {
    /// Counts against conformance.
    Error,
    /// Reported, does not count against conformance.
    Warning,
    /// Advisory note about the validation set-up.
    Alert,
    /// Not reported.
    Ignore,
    /// Success marker.
    Affirmative,
}

impl fmt::Display for FailureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Alert => "alert",
            Self::Ignore => "ignore",
            Self::Affirmative => "affirmative",
        })
    }
}

/// Errors raised while loading a context file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON is malformed or has unknown keys.
    #[error("invalid validation context: {0}")]
    Json(#[from] serde_json::Error),
    /// `unbounded_max` must be at least 1.
    #[error("unbounded_max must be at least 1")]
    ZeroUnboundedMax,
}

/// Settings for one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationContext {
    /// Treat segment groups as FSM states of their own. When `false`, group
    /// transitions are expanded into the segments they lead to.
    pub has_groups: bool,
    /// Stand-in for `Max="*"` wherever a number is needed.
    pub unbounded_max: u32,
    /// Table ids whose value checks are skipped.
    pub excluded_tables: BTreeSet<String>,
    /// Per-kind overrides of the default levels.
    pub failure_levels: BTreeMap<FailureKind, FailureLevel>,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self {
            has_groups: false,
            unbounded_max: 3,
            excluded_tables: BTreeSet::new(),
            failure_levels: BTreeMap::new(),
        }
    }
}

impl ValidationContext {
    /// Parses a JSON context document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed JSON, unknown keys or a zero
    /// `unbounded_max`.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let context: Self = serde_json::from_str(text)?;
        if context.unbounded_max == 0 {
            return Err(ConfigError::ZeroUnboundedMax);
        }
        Ok(context)
    }

    /// Level of `kind`: the override if one is set, otherwise the default.
    pub fn level_for(&self, kind: FailureKind) -> FailureLevel {
        if let Some(level) = self.failure_levels.get(&kind) {
            return *level;
        }
        match kind {
            FailureKind::Checked | FailureKind::DataPassed => FailureLevel::Affirmative,
            FailureKind::TableNotFound
            | FailureKind::ValidationConfiguration
            | FailureKind::SegmentUnmapped => FailureLevel::Alert,
            FailureKind::Version
            | FailureKind::MessageStructureId
            | FailureKind::MessageStructure
            | FailureKind::Usage
            | FailureKind::Cardinality
            | FailureKind::Length
            | FailureKind::Datatype
            | FailureKind::Data
            | FailureKind::XUsage
            | FailureKind::Xtra
            | FailureKind::AmbiguousProfile => FailureLevel::Error,
        }
    }

    /// Returns `true` if value checks against `table` are switched off.
    pub fn is_table_excluded(&self, table: &str) -> bool {
        self.excluded_tables.contains(table)
    }
}
