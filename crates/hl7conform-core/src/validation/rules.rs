/// User-supplied content rules.
///
/// A rule set is a JSON array:
///
/// ```json
/// [
///   { "location": "PID[1].8[1]", "check": { "type": "value", "value": "F" },
///     "comment": "female patients only" },
///   { "location": "PV1[1].2[1]", "check": { "type": "regex", "pattern": "^[EIO]$" } }
/// ]
/// ```
///
/// Each rule is checked against the profile before it is applied: a
/// location the profile does not declare (or declares with usage `X`)
/// yields a [`FailureKind::ValidationConfiguration`] note instead of a
/// verdict.
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::failure::{FailureKind, FailureLocation, MessageFailure};
use crate::location::MessageLocation;
use crate::message::Message;
use crate::profile::{Profile, Resolution};
use crate::validation::ContentCheck;

/// Errors raised while loading a rule set.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The JSON is malformed, has unknown keys or an invalid location.
    #[error("invalid content rules: {0}")]
    Json(#[from] serde_json::Error),
    /// A `regex` rule's pattern does not compile.
    #[error("content rule {index} has an invalid pattern: {source}")]
    Pattern {
        /// 0-based index of the rule.
        index: usize,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
}

/// What a rule asserts about the value at its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleCheck {
    /// The element is present and non-empty.
    Presence,
    /// The element is absent or empty.
    Absence,
    /// The element equals `value`.
    Value {
        /// Expected value.
        value: String,
        /// Compare ignoring ASCII case.
        #[serde(default)]
        ignore_case: bool,
    },
    /// The element matches `pattern`.
    Regex {
        /// Regular expression, unanchored.
        pattern: String,
    },
}

/// One content rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentRule {
    /// Where the rule applies.
    pub location: MessageLocation,
    /// The assertion.
    pub check: RuleCheck,
    /// Free text copied into every failure the rule produces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ContentRule {
    /// Human-readable form of the assertion.
    pub fn assertion(&self) -> String {
        let at = &self.location;
        match &self.check {
            RuleCheck::Presence => format!("{at} is present"),
            RuleCheck::Absence => format!("{at} is absent"),
            RuleCheck::Value {
                value,
                ignore_case: false,
            } => format!("{at} equals '{value}'"),
            RuleCheck::Value {
                value,
                ignore_case: true,
            } => format!("{at} equals '{value}' ignoring case"),
            RuleCheck::Regex { pattern } => format!("{at} matches '{pattern}'"),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ContentRule,
    pattern: Option<Regex>,
}

/// A loaded, compiled list of content rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles `rules`.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::Pattern`] for the first pattern that does not
    /// compile.
    pub fn new(rules: Vec<ContentRule>) -> Result<Self, RuleError> {
        let rules = rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| {
                let pattern = match &rule.check {
                    RuleCheck::Regex { pattern } => {
                        Some(Regex::new(pattern).map_err(|source| RuleError::Pattern { index, source })?)
                    }
                    RuleCheck::Presence | RuleCheck::Absence | RuleCheck::Value { .. } => None,
                };
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(Self { rules })
    }

    /// Parses and compiles a JSON rule array.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] for malformed JSON, unknown keys, unparseable
    /// locations and invalid patterns.
    pub fn from_json(text: &str) -> Result<Self, RuleError> {
        let rules: Vec<ContentRule> = serde_json::from_str(text)?;
        Self::new(rules)
    }

    /// The rules in order.
    pub fn rules(&self) -> impl Iterator<Item = &ContentRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the set has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn apply(&self, compiled: &CompiledRule, profile: &Profile, message: &Message) -> MessageFailure {
        let rule = &compiled.rule;
        let location = &rule.location;
        let (line, column) = message.position_of(location);
        let at = FailureLocation::at(location, profile, line, column);

        let failure = match profile.resolve(location, Resolution::Strict) {
            None => MessageFailure::new(
                FailureKind::ValidationConfiguration,
                format!("The content rule location {location} is not declared by the profile"),
            )
            .located(at),
            Some(id) => {
                let label = profile.describe(id);
                let value = message
                    .value_at(location)
                    .map(str::trim)
                    .filter(|v| !v.is_empty());
                verdict(&label, value, &rule.check, compiled.pattern.as_ref()).located(at)
            }
        };
        MessageFailure {
            assertion: Some(rule.assertion()),
            user_comment: rule.comment.clone(),
            ..failure
        }
    }
}

fn verdict(label: &str, value: Option<&str>, check: &RuleCheck, pattern: Option<&Regex>) -> MessageFailure {
    let missing = || MessageFailure::new(FailureKind::Usage, format!("{label} is missing"));
    match (check, value) {
        (RuleCheck::Presence, Some(v)) => {
            MessageFailure::new(FailureKind::DataPassed, format!("{label} is present")).with_content(v)
        }
        (RuleCheck::Presence, None) => missing(),
        (RuleCheck::Absence, Some(v)) => MessageFailure::new(
            FailureKind::Data,
            format!("{label} is present but must be absent"),
        )
        .with_content(v),
        (RuleCheck::Absence, None) => {
            MessageFailure::new(FailureKind::DataPassed, format!("{label} is absent"))
        }
        (RuleCheck::Value { value: expected, ignore_case }, Some(v)) => {
            let equal = if *ignore_case {
                v.eq_ignore_ascii_case(expected)
            } else {
                v == expected
            };
            if equal {
                MessageFailure::new(FailureKind::DataPassed, format!("The value '{v}' of {label} is '{expected}'"))
                    .with_content(v)
            } else {
                MessageFailure::new(
                    FailureKind::Data,
                    format!("The value '{v}' of {label} does not match the expected value '{expected}'"),
                )
                .with_content(v)
            }
        }
        (RuleCheck::Regex { pattern: source }, Some(v)) => {
            if pattern.is_some_and(|p| p.is_match(v)) {
                MessageFailure::new(
                    FailureKind::DataPassed,
                    format!("The value '{v}' of {label} matches the pattern '{source}'"),
                )
                .with_content(v)
            } else {
                MessageFailure::new(
                    FailureKind::Data,
                    format!("The value '{v}' of {label} does not match the pattern '{source}'"),
                )
                .with_content(v)
            }
        }
        (RuleCheck::Value { .. } | RuleCheck::Regex { .. }, None) => missing(),
    }
}

impl ContentCheck for RuleSet {
    fn name(&self) -> &str {
        "content rules"
    }

    fn check(&self, profile: &Profile, message: &Message, out: &mut Vec<MessageFailure>) {
        for compiled in &self.rules {
            out.push(self.apply(compiled, profile, message));
        }
    }
}
