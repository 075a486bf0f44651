/// The validation pipeline.
///
/// [`Validator`] runs the phases in order and stops early when a phase
/// reports something that makes the later ones meaningless:
///
/// 1. **basic**: version, message type, trigger event and structure id;
///    any finding here is fatal.
/// 2. **structure**: the ER7 segment sequence is matched against the profile
///    grammar; for XML, the root element is compared with the structure id.
///    A `MESSAGE_STRUCTURE` finding stops the run.
/// 3. **elements**: segments are mapped to profile definitions by the state
///    machine, then every element is walked. An ambiguous grammar is fatal and
///    skips the walk.
/// 4. **content**: every registered [`ContentCheck`], in registration order.
///
/// Each clean phase contributes one [`FailureKind::Checked`] marker.
mod basic;
mod content;
mod er7;
mod rules;
mod structure;
mod xml;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::config::{ConfigError, ValidationContext};
use crate::failure::{FailureKind, FailureLocation, MessageFailure, ValidationResult};
use crate::fsm::{FiniteStateMachine, SegmentMapping};
use crate::location::MessageLocation;
use crate::message::{
    Encoding, EncodingDetectionError, Er7Message, Message, MessageError, XmlMessage,
    detect_encoding,
};
use crate::profile::{Profile, ProfileError};
use crate::tables::{TableError, TableLibrary};
use crate::xml::TreeNavigator;

pub use rules::{ContentRule, RuleCheck, RuleError, RuleSet};
pub use structure::StructureIssue;

use content::ValueChecks;
use structure::SkeletonSegment;

// ---------------------------------------------------------------------------
// Content checks
// ---------------------------------------------------------------------------

/// A check that runs after the structural phases.
///
/// Implementations inspect the message through [`Message::value_at`] and
/// [`Message::position_of`] and push their findings into `out`. They must
/// not assume the element walk ran: an ambiguous profile skips it.
pub trait ContentCheck: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Inspects `message` and appends findings to `out`.
    fn check(&self, profile: &Profile, message: &Message, out: &mut Vec<MessageFailure>);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that abort a validation run or the set-up of a [`Validator`].
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The profile could not be loaded.
    #[error(transparent)]
    Profile(#[from] ProfileError),
    /// The message could not be read.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// The message is neither ER7 nor XML.
    #[error(transparent)]
    Encoding(#[from] EncodingDetectionError),
    /// The table library could not be loaded.
    #[error(transparent)]
    Table(#[from] TableError),
    /// The content rules could not be loaded.
    #[error(transparent)]
    Rule(#[from] RuleError),
    /// The validation context could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates messages against one profile.
///
/// Everything a validator holds is immutable, so a single instance can be
/// shared across threads; clones share the same profile and state machine.
#[derive(Clone)]
pub struct Validator {
    profile: Arc<Profile>,
    fsm: Arc<FiniteStateMachine>,
    tables: Arc<TableLibrary>,
    context: Arc<ValidationContext>,
    content: Vec<Arc<dyn ContentCheck>>,
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content: Vec<&str> = self.content.iter().map(|c| c.name()).collect();
        f.debug_struct("Validator")
            .field("structure", &self.profile.header().structure_id)
            .field("states", &self.fsm.state_count())
            .field("tables", &self.tables.len())
            .field("context", &self.context)
            .field("content", &content)
            .finish()
    }
}

impl Validator {
    /// Builds the state machine for `profile` and prepares a validator.
    pub fn new(profile: Profile, tables: TableLibrary, context: ValidationContext) -> Self {
        let fsm = FiniteStateMachine::build(&profile, context.has_groups);
        Self {
            profile: Arc::new(profile),
            fsm: Arc::new(fsm),
            tables: Arc::new(tables),
            context: Arc::new(context),
            content: Vec::new(),
        }
    }

    /// Adds a rule set as a content check. Empty sets are ignored.
    #[must_use]
    pub fn with_rules(self, rules: RuleSet) -> Self {
        if rules.is_empty() {
            return self;
        }
        self.with_content_check(Arc::new(rules))
    }

    /// Appends a content check.
    #[must_use]
    pub fn with_content_check(mut self, check: Arc<dyn ContentCheck>) -> Self {
        self.content.push(check);
        self
    }

    /// The profile.
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The state machine built from the profile.
    pub fn fsm(&self) -> &FiniteStateMachine {
        &self.fsm
    }

    /// The table library.
    pub fn tables(&self) -> &TableLibrary {
        &self.tables
    }

    /// The validation context.
    pub fn context(&self) -> &ValidationContext {
        &self.context
    }

    /// Detects the encoding of `text`, reads it and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Encoding`] when the input is neither ER7
    /// nor XML and [`ValidationError::Message`] when it cannot be read.
    pub fn validate(&self, text: &str) -> Result<ValidationResult, ValidationError> {
        match detect_encoding(text.as_bytes())? {
            Encoding::Er7 => self.validate_er7(text),
            Encoding::Xml => self.validate_xml(text),
        }
    }

    /// Reads `text` as ER7 and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Message`] when the message cannot be read.
    pub fn validate_er7(&self, text: &str) -> Result<ValidationResult, ValidationError> {
        let message = Message::Er7(Er7Message::parse(text)?);
        Ok(self.validate_message(&message))
    }

    /// Reads `text` as XML and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Message`] when the message is not
    /// well-formed or has no MSH element.
    pub fn validate_xml(&self, text: &str) -> Result<ValidationResult, ValidationError> {
        let message = Message::Xml(XmlMessage::parse(text)?);
        Ok(self.validate_message(&message))
    }

    /// Runs every phase on a message that has already been read.
    #[instrument(level = "debug", skip_all, fields(encoding = %message.encoding()))]
    pub fn validate_message(&self, message: &Message) -> ValidationResult {
        let mut result = ValidationResult::new();

        let basic = basic::check_header(&self.profile, message.header(), &|loc| {
            self.locate(message, loc)
        });
        let stop = basic.iter().any(MessageFailure::is_fatal);
        debug!(findings = basic.len(), stop, "basic checks done");
        result.extend(basic);
        if stop {
            return result;
        }

        let structure = self.check_structure(message);
        let stop = structure
            .iter()
            .any(|f| f.kind == FailureKind::MessageStructure);
        debug!(findings = structure.len(), stop, "structure check done");
        result.extend(structure);
        if stop {
            return result;
        }

        let (elements, placed) = self.check_elements(message);
        debug!(findings = elements.len(), "element checks done");
        result.extend(elements);
        let message = placed.as_ref().unwrap_or(message);

        for check in &self.content {
            let mut out = Vec::new();
            check.check(&self.profile, message, &mut out);
            debug!(check = check.name(), findings = out.len(), "content check done");
            result.extend(out);
        }
        result
    }

    fn value_checks(&self) -> ValueChecks<'_> {
        ValueChecks {
            profile: &self.profile,
            tables: &self.tables,
            context: &self.context,
        }
    }

    fn locate(&self, message: &Message, location: &MessageLocation) -> FailureLocation {
        let (line, column) = message.position_of(location);
        FailureLocation::at(location, &self.profile, line, column)
    }

    fn check_structure(&self, message: &Message) -> Vec<MessageFailure> {
        match message {
            Message::Er7(m) => {
                let skeleton: Vec<SkeletonSegment<'_>> = m
                    .segments()
                    .iter()
                    .map(|s| SkeletonSegment {
                        line: s.line,
                        column: 1,
                        name: s.name.as_str(),
                    })
                    .collect();
                structure::check_skeleton(&self.profile, &skeleton)
            }
            Message::Xml(m) => {
                let doc = m.document();
                let root = doc.root();
                let at = doc.bookmark(root);
                let location = FailureLocation {
                    line: at.line,
                    column: at.column,
                    flat_path: String::new(),
                    tree_path: doc.positional_path(root),
                };
                let root_check = structure::check_root(&self.profile, m.structure_name(), location);
                if root_check.iter().any(MessageFailure::is_fatal) {
                    return root_check;
                }
                let skeleton: Vec<SkeletonSegment<'_>> = m
                    .segments()
                    .into_iter()
                    .map(|node| {
                        let at = doc.bookmark(node);
                        SkeletonSegment {
                            line: at.line,
                            column: at.column,
                            name: doc.local_name(node),
                        }
                    })
                    .collect();
                structure::check_skeleton(&self.profile, &skeleton)
            }
        }
    }

    /// Maps and walks the message. For ER7 the message is returned again
    /// with the group placement of every mapped segment recorded, so later
    /// checks can resolve group-qualified locations.
    fn check_elements(&self, message: &Message) -> (Vec<MessageFailure>, Option<Message>) {
        match message {
            Message::Er7(m) => {
                let mapping = self.fsm.map_er7(m);
                let mut placed = m.clone();
                placed.place(mapping.locations(&self.profile));
                // unmapped segments have no group; ER7 segments start in column 1
                let mut out = self.mapping_findings(&mapping, |line, name| {
                    let instance = m
                        .segments()
                        .iter()
                        .filter(|s| s.name == name && s.line <= line)
                        .count();
                    let location = segment_location(name, instance);
                    FailureLocation::at(&location, &self.profile, line, 1)
                });
                if mapping.ambiguous_hits().is_empty() {
                    out.extend(er7::check_elements(self.value_checks(), &placed, &mapping));
                    push_walk_marker(&mut out);
                }
                (out, Some(Message::Er7(placed)))
            }
            Message::Xml(m) => {
                let doc = m.document();
                let sequence = m.segments();
                let mapping = self.fsm.map_tree(doc);
                let mut out = self.mapping_findings(&mapping, |node, name| {
                    let instance = sequence
                        .iter()
                        .take_while(|s| **s != node)
                        .filter(|s| doc.local_name(**s) == name)
                        .count()
                        + 1;
                    let at = doc.bookmark(node);
                    FailureLocation {
                        line: at.line,
                        column: at.column,
                        flat_path: segment_location(name, instance).to_flat_path(),
                        tree_path: doc.positional_path(node),
                    }
                });
                if mapping.ambiguous_hits().is_empty() {
                    out.extend(xml::check_tree(self.value_checks(), doc, &mapping));
                    push_walk_marker(&mut out);
                }
                (out, None)
            }
        }
    }

    /// Findings about the mapping itself: ambiguous transitions taken and
    /// segments that could not be attributed.
    fn mapping_findings<T: Copy + PartialEq>(
        &self,
        mapping: &SegmentMapping<T>,
        locate: impl Fn(T, &str) -> FailureLocation,
    ) -> Vec<MessageFailure> {
        let profile = &self.profile;
        let mut out = Vec::new();
        for hit in mapping.ambiguous_hits() {
            let candidates: Vec<String> = hit.targets.iter().map(|t| profile.describe(*t)).collect();
            out.push(
                MessageFailure::new(
                    FailureKind::AmbiguousProfile,
                    format!(
                        "The profile is ambiguous: segment '{}' after {} may be {}",
                        hit.label,
                        profile.describe(hit.from),
                        candidates.join(" or ")
                    ),
                )
                .fatal()
                .with_content(hit.label.as_str()),
            );
        }
        for (item, name) in mapping.unmapped() {
            out.push(
                MessageFailure::new(
                    FailureKind::SegmentUnmapped,
                    format!("Segment {name} could not be attributed to a single profile definition"),
                )
                .located(locate(*item, name))
                .with_content(name.as_str()),
            );
        }
        debug!(
            strategy = ?mapping.strategy(),
            mapped = mapping.mapped_count(),
            unmapped = mapping.unmapped().len(),
            ambiguous = mapping.ambiguous_hits().len(),
            "segments mapped"
        );
        out
    }
}

fn segment_location(name: &str, instance: usize) -> MessageLocation {
    MessageLocation::for_segment(name, u32::try_from(instance).unwrap_or(u32::MAX))
}

fn push_walk_marker(out: &mut Vec<MessageFailure>) {
    if out.iter().all(|f| f.kind.is_affirmative()) {
        out.push(MessageFailure::checked(
            "Every message element conforms to its profile definition",
        ));
    }
}
