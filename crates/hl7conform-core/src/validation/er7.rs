/// Element walk over an ER7 message.
///
/// Every segment the state machine mapped is walked against its definition:
/// fields by position, repetitions, then components and subcomponents.
/// Segment paths come from the placements recorded on the message
/// ([`Er7Message::place`]), so they carry group steps and match what
/// [`Er7Message::value_at`] resolves.
use std::collections::HashMap;

use crate::failure::{FailureKind, FailureLocation, MessageFailure};
use crate::fsm::SegmentMapping;
use crate::location::MessageLocation;
use crate::message::{Er7Message, Er7Segment, Separators};
use crate::profile::{MaxOccurs, NodeKind, ProfileNodeId, Usage};
use crate::validation::content::{ValueChecks, occurrence_finding, x_usage_description};

/// Walks every mapped segment of `message`.
///
/// Unmapped segments and segments whose definition has usage `X` are
/// skipped; the mapping and structure phases report those.
pub(crate) fn check_elements(
    checks: ValueChecks<'_>,
    message: &Er7Message,
    mapping: &SegmentMapping<usize>,
) -> Vec<MessageFailure> {
    let by_line: HashMap<usize, ProfileNodeId> = mapping.mapped().iter().copied().collect();
    let mut walk = Walk {
        checks,
        separators: *message.separators(),
        line: 0,
        out: Vec::new(),
    };
    let mut seen: HashMap<&str, u32> = HashMap::new();
    for segment in message.standard_segments() {
        let instance = seen.entry(segment.name.as_str()).or_insert(0);
        *instance += 1;
        let Some(definition) = by_line.get(&segment.line).copied() else {
            continue;
        };
        if checks.profile.node(definition).usage == Usage::X {
            continue;
        }
        let at_segment = message
            .placement(segment.line)
            .cloned()
            .unwrap_or_else(|| MessageLocation::for_segment(&segment.name, *instance));
        walk.line = segment.line;
        walk.segment(segment, definition, &at_segment);
    }
    walk.out
}

/// Splits `text` on `separator`, pairing each part with its 1-based column.
fn split_columns(text: &str, separator: char, start: usize) -> Vec<(&str, usize)> {
    let mut column = start;
    text.split(separator)
        .map(|part| {
            let at = column;
            column += part.chars().count() + 1;
            (part, at)
        })
        .collect()
}

struct Walk<'a> {
    checks: ValueChecks<'a>,
    separators: Separators,
    line: usize,
    out: Vec<MessageFailure>,
}

impl Walk<'_> {
    fn report(
        &mut self,
        kind: FailureKind,
        description: String,
        location: &MessageLocation,
        column: usize,
        content: Option<&str>,
    ) {
        let at = FailureLocation::at(location, self.checks.profile, self.line, column);
        let mut failure = MessageFailure::new(kind, description).located(at);
        if let Some(content) = content {
            failure = failure.with_content(content);
        }
        self.out.push(failure);
    }

    fn extra(&mut self, location: &MessageLocation, column: usize, content: &str) {
        self.report(
            FailureKind::Xtra,
            format!("The element {location} is present but not declared in the profile"),
            location,
            column,
            Some(content),
        );
    }

    fn segment(&mut self, segment: &Er7Segment, definition: ProfileNodeId, at_segment: &MessageLocation) {
        let profile = self.checks.profile;
        let slices = segment.fields(&self.separators);
        let end_column = segment.text.chars().count() + 1;
        let declared = &profile.node(definition).children;

        for field in declared {
            let position = profile.node(*field).position;
            // MSH-1 and MSH-2 hold the separators themselves
            if segment.name == "MSH" && position <= 2 {
                continue;
            }
            let (value, column) = slices
                .iter()
                .find(|s| s.position == position)
                .map_or(("", end_column), |s| (s.value, s.column));
            self.field(*field, value, &at_segment.clone().with_field(position, 1), column);
        }

        let last_declared = declared
            .iter()
            .map(|f| profile.node(*f).position)
            .max()
            .unwrap_or(0);
        for slice in slices
            .iter()
            .filter(|s| s.position > last_declared && !s.value.is_empty())
        {
            self.extra(
                &at_segment.clone().with_field(slice.position, 1),
                slice.column,
                slice.value,
            );
        }
    }

    fn field(&mut self, id: ProfileNodeId, value: &str, location: &MessageLocation, column: usize) {
        let profile = self.checks.profile;
        let node = profile.node(id);
        let label = profile.describe(id);

        if value.is_empty() {
            if let Some((kind, description)) = occurrence_finding(&label, node.usage, node.cardinality, 0) {
                self.report(kind, description, location, column, None);
            }
            return;
        }
        if node.usage == Usage::X {
            self.report(FailureKind::XUsage, x_usage_description(&label), location, column, Some(value));
            return;
        }

        let repetitions = split_columns(value, self.separators.repetition, column);
        let count = u32::try_from(repetitions.len()).unwrap_or(u32::MAX);
        if let Some((kind, description)) = occurrence_finding(&label, node.usage, node.cardinality, count) {
            let instance = match node.cardinality.max {
                MaxOccurs::Bounded(max) if count > max => max + 1,
                MaxOccurs::Bounded(_) | MaxOccurs::Unbounded => 1,
            };
            let index = usize::try_from(instance - 1).unwrap_or(0);
            let at_column = repetitions.get(index).map_or(column, |(_, c)| *c);
            let at = location.clone().with_field(node.position, instance);
            self.report(kind, description, &at, at_column, Some(value));
        }

        for (index, (repetition, rep_column)) in (1u32..).zip(repetitions) {
            if repetition.is_empty() {
                continue;
            }
            let at = location.clone().with_field(node.position, index);
            self.element(id, repetition, &at, rep_column);
        }
    }

    /// Checks one non-empty field repetition, component or subcomponent.
    fn element(&mut self, id: ProfileNodeId, text: &str, location: &MessageLocation, column: usize) {
        let profile = self.checks.profile;
        let node = profile.node(id);
        let separator = match node.kind {
            NodeKind::Field => Some(self.separators.component),
            NodeKind::Component => Some(self.separators.subcomponent),
            NodeKind::SubComponent | NodeKind::Segment | NodeKind::SegmentGroup => None,
        };
        let Some(separator) = separator.filter(|_| !node.children.is_empty()) else {
            self.primitive(id, text, location, column);
            return;
        };

        let label = profile.describe(id);
        let parts = split_columns(text, separator, column);
        if parts.iter().all(|(part, _)| part.is_empty()) {
            if node.children.iter().any(|c| profile.node(*c).usage == Usage::R) {
                self.report(
                    FailureKind::MessageStructure,
                    format!("{label} is missing at least one of its children"),
                    location,
                    column,
                    Some(text),
                );
            }
            return;
        }

        let child_location = |position: u32| match node.kind {
            NodeKind::Field => location.clone().with_component(position),
            NodeKind::Component
            | NodeKind::SubComponent
            | NodeKind::Segment
            | NodeKind::SegmentGroup => location.clone().with_subcomponent(position),
        };
        let end_column = column + text.chars().count();
        for child in &node.children {
            let child_node = profile.node(*child);
            let at = child_location(child_node.position);
            let index = usize::try_from(child_node.position.saturating_sub(1)).unwrap_or(usize::MAX);
            let (part, part_column) = parts.get(index).copied().unwrap_or(("", end_column));
            if part.is_empty() {
                let child_label = profile.describe(*child);
                if let Some((kind, description)) =
                    occurrence_finding(&child_label, child_node.usage, child_node.cardinality, 0)
                {
                    self.report(kind, description, &at, part_column, None);
                }
            } else if child_node.usage == Usage::X {
                let child_label = profile.describe(*child);
                self.report(FailureKind::XUsage, x_usage_description(&child_label), &at, part_column, Some(part));
            } else {
                self.element(*child, part, &at, part_column);
            }
        }

        let last_declared = node
            .children
            .iter()
            .map(|c| profile.node(*c).position)
            .max()
            .unwrap_or(0);
        for (position, (part, part_column)) in (1u32..).zip(parts) {
            if position > last_declared && !part.is_empty() {
                self.extra(&child_location(position), part_column, part);
            }
        }
    }

    fn primitive(&mut self, id: ProfileNodeId, value: &str, location: &MessageLocation, column: usize) {
        let profile = self.checks.profile;
        let node = profile.node(id);
        let stray = match node.kind {
            NodeKind::Field => [
                (self.separators.component, "component"),
                (self.separators.subcomponent, "subcomponent"),
            ]
            .into_iter()
            .find(|(c, _)| value.contains(*c)),
            NodeKind::Component => Some((self.separators.subcomponent, "subcomponent"))
                .filter(|(c, _)| value.contains(*c)),
            NodeKind::SubComponent | NodeKind::Segment | NodeKind::SegmentGroup => None,
        };
        if let Some((_, which)) = stray {
            let label = profile.describe(id);
            self.report(
                FailureKind::Data,
                format!("The value '{value}' of {label} contains an unescaped {which} separator"),
                location,
                column,
                Some(value),
            );
            return;
        }
        let at = FailureLocation::at(location, profile, self.line, column);
        self.checks.check_value(id, value, &at, &mut self.out);
    }
}
