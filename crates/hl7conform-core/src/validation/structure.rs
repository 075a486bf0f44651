/// Message-structure check: the segment skeleton against the profile grammar.
///
/// The non-`Z` segment codes of a message are matched against the profile's
/// groups and segments in order. Each definition consumes as many
/// consecutive occurrences as its first set admits (a group's first set is
/// the union of its children's first sets up to the first mandatory child).
/// Once its `Max` is used up, a definition leaves further occurrences to a
/// later sibling or a new enclosing group instance that can take them.
/// Occurrence counts produce USAGE, CARDINALITY and X_USAGE findings; a
/// segment that the grammar cannot place at all stops the match with a fatal
/// MESSAGE_STRUCTURE finding, since field-level checks on a misaligned
/// skeleton would be meaningless.
use std::fmt;

use crate::failure::{FailureKind, FailureLocation, MessageFailure};
use crate::location::MessageLocation;
use crate::profile::{MaxOccurs, NodeKind, Profile, ProfileNodeId, Usage};
use crate::validation::content::{occurrence_finding, x_usage_description};

/// Why a message's structure cannot be matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureIssue {
    /// A segment appears where the grammar allows none of it.
    Unexpected {
        /// The segment code found.
        found: String,
        /// Segment codes the grammar would have accepted there.
        expected: Vec<String>,
    },
    /// The XML root element is not the profile's structure id.
    RootMismatch {
        /// Root element local name.
        found: String,
        /// Profile structure id.
        expected: String,
    },
}

impl fmt::Display for StructureIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unexpected { found, expected } if expected.is_empty() => {
                write!(f, "Expected no further segments instead of '{found}'")
            }
            Self::Unexpected { found, expected } => {
                let list: Vec<String> = expected.iter().map(|e| format!("'{e}'")).collect();
                write!(f, "Expected element(s) {} instead of '{found}'", list.join(", "))
            }
            Self::RootMismatch { found, expected } => {
                write!(f, "Expected root element '{expected}' instead of '{found}'")
            }
        }
    }
}

/// One segment of a message skeleton: its code and where it starts.
///
/// ER7 segments always start in column 1; XML segments start at their
/// element's opening tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SkeletonSegment<'a> {
    pub line: usize,
    pub column: usize,
    pub name: &'a str,
}

/// Matches `skeleton` (the message's segments, in order) against the
/// profile grammar.
///
/// Returns the findings, or one [`FailureKind::Checked`] marker when there
/// are none.
pub(crate) fn check_skeleton(profile: &Profile, skeleton: &[SkeletonSegment<'_>]) -> Vec<MessageFailure> {
    let input: Vec<SkeletonSegment<'_>> = skeleton
        .iter()
        .copied()
        .filter(|s| !s.name.starts_with('Z'))
        .collect();
    let mut matcher = Matcher {
        profile,
        input: &input,
        pos: 0,
        groups: Vec::new(),
        findings: Vec::new(),
        furthest: 0,
        expected: Vec::new(),
    };
    matcher.match_level(None);

    let mut out: Vec<MessageFailure>;
    if let Some(found) = input.get(matcher.pos).copied() {
        let stop = matcher.pos;
        let expected = if matcher.furthest == stop {
            std::mem::take(&mut matcher.expected)
        } else {
            Vec::new()
        };
        // a missing element reported at the stop position is a symptom of the
        // unexpected segment, not a finding of its own
        out = matcher
            .findings
            .into_iter()
            .filter(|(at, f)| !(*at >= stop && f.kind == FailureKind::Usage))
            .map(|(_, f)| f)
            .collect();
        let issue = StructureIssue::Unexpected {
            found: found.name.to_owned(),
            expected,
        };
        let location = MessageLocation::for_segment(found.name, instance_at(&input, found.name, stop));
        out.push(
            MessageFailure::new(FailureKind::MessageStructure, issue.to_string())
                .fatal()
                .located(FailureLocation::at(&location, profile, found.line, found.column))
                .with_content(found.name),
        );
    } else {
        out = matcher.findings.into_iter().map(|(_, f)| f).collect();
    }

    if out.is_empty() {
        out.push(MessageFailure::checked(
            "The segment sequence follows the profile structure",
        ));
    }
    out
}

/// Compares the XML root element with the profile's structure id.
pub(crate) fn check_root(profile: &Profile, root: &str, at: FailureLocation) -> Vec<MessageFailure> {
    let expected = &profile.header().structure_id;
    if root == expected {
        return vec![MessageFailure::checked(
            "The root element matches the message structure id",
        )];
    }
    let issue = StructureIssue::RootMismatch {
        found: root.to_owned(),
        expected: expected.clone(),
    };
    vec![
        MessageFailure::new(FailureKind::MessageStructure, issue.to_string())
            .fatal()
            .located(at)
            .with_content(root),
    ]
}

/// 1-based instance the segment at `pos` has (or would have) in the message.
fn instance_at(input: &[SkeletonSegment<'_>], name: &str, pos: usize) -> u32 {
    let before = input[..pos.min(input.len())]
        .iter()
        .filter(|s| s.name == name)
        .count();
    u32::try_from(before).unwrap_or(u32::MAX).saturating_add(1)
}

struct Matcher<'a> {
    profile: &'a Profile,
    input: &'a [SkeletonSegment<'a>],
    pos: usize,
    groups: Vec<(String, u32)>,
    /// Findings with the input position at which they were decided.
    findings: Vec<(usize, MessageFailure)>,
    furthest: usize,
    expected: Vec<String>,
}

impl Matcher<'_> {
    fn current(&self) -> Option<&str> {
        self.input.get(self.pos).map(|s| s.name)
    }

    /// Line and column of the segment at `pos`, or of the last segment when
    /// the input is exhausted.
    fn position_at(&self, pos: usize) -> (usize, usize) {
        self.input
            .get(pos)
            .or_else(|| self.input.last())
            .map_or((1, 1), |s| (s.line, s.column))
    }

    fn first_set(&self, id: ProfileNodeId) -> Vec<String> {
        let node = self.profile.node(id);
        match node.kind {
            NodeKind::Segment => vec![node.name.clone()],
            NodeKind::SegmentGroup => {
                let mut names = Vec::new();
                for child in &node.children {
                    let child_node = self.profile.node(*child);
                    if !child_node.kind.is_structural() {
                        continue;
                    }
                    for name in self.first_set(*child) {
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                    if child_node.usage == Usage::R && child_node.cardinality.min > 0 {
                        break;
                    }
                }
                names
            }
            NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => Vec::new(),
        }
    }

    /// Returns `true` if a definition other than `id` can take `name` once
    /// `id` has used up its `Max`: a following sibling reachable without
    /// skipping a mandatory definition, or a new instance of an enclosing
    /// repeatable group.
    fn hands_over(&self, id: ProfileNodeId, name: &str) -> bool {
        for sibling in self.profile.following_siblings(id) {
            let node = self.profile.node(*sibling);
            if !node.kind.is_structural() {
                continue;
            }
            if self.first_set(*sibling).iter().any(|n| n == name) {
                return true;
            }
            if node.usage == Usage::R && node.cardinality.min > 0 {
                break;
            }
        }
        self.profile.ancestor_groups(id).into_iter().any(|group| {
            self.profile.node(group).cardinality.is_repeatable()
                && self.first_set(group).iter().any(|n| n == name)
        })
    }

    fn note_expected(&mut self, names: &[String]) {
        if self.pos > self.furthest {
            self.furthest = self.pos;
            self.expected.clear();
        }
        if self.pos == self.furthest {
            for name in names {
                if !self.expected.contains(name) {
                    self.expected.push(name.clone());
                }
            }
        }
    }

    fn location_of(&self, id: ProfileNodeId, instance: u32, pos: usize) -> MessageLocation {
        let node = self.profile.node(id);
        match node.kind {
            NodeKind::SegmentGroup => {
                let mut groups = self.groups.clone();
                groups.push((node.name.clone(), instance));
                MessageLocation::for_group(groups)
            }
            NodeKind::Segment | NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => {
                let instance = if self.groups.is_empty() {
                    instance_at(self.input, &node.name, pos)
                } else {
                    instance
                };
                MessageLocation::for_segment(&node.name, instance).with_groups(self.groups.clone())
            }
        }
    }

    fn push(&mut self, pos: usize, kind: FailureKind, description: String, location: &MessageLocation) {
        let (line, column) = self.position_at(pos);
        let at = FailureLocation::at(location, self.profile, line, column);
        self.findings
            .push((self.pos, MessageFailure::new(kind, description).located(at)));
    }

    fn match_level(&mut self, parent: Option<ProfileNodeId>) {
        let children: Vec<ProfileNodeId> = self
            .profile
            .children_of(parent)
            .iter()
            .copied()
            .filter(|c| self.profile.node(*c).kind.is_structural())
            .collect();
        for child in children {
            self.match_definition(child);
        }
    }

    fn match_definition(&mut self, id: ProfileNodeId) {
        let node = self.profile.node(id);
        let (kind, usage, cardinality, name) = (node.kind, node.usage, node.cardinality, node.name.clone());
        let label = self.profile.describe(id);
        let first = self.first_set(id);

        let mut count = 0u32;
        let mut first_excess: Option<usize> = None;
        loop {
            let Some(current) = self.current() else {
                break;
            };
            if !first.iter().any(|n| n == current) {
                if cardinality.max.admits(count + 1) {
                    self.note_expected(&first);
                }
                break;
            }
            if !cardinality.max.admits(count + 1) && self.hands_over(id, current) {
                break;
            }
            let start = self.pos;
            match kind {
                NodeKind::Segment => self.pos += 1,
                NodeKind::SegmentGroup => {
                    self.groups.push((name.clone(), count + 1));
                    self.match_level(Some(id));
                    self.groups.pop();
                }
                NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => {}
            }
            if self.pos == start {
                break;
            }
            count += 1;
            if usage == Usage::X {
                let location = self.location_of(id, count, start);
                self.push(start, FailureKind::XUsage, x_usage_description(&label), &location);
            }
            if first_excess.is_none() && !cardinality.max.admits(count) {
                first_excess = Some(start);
            }
        }

        if let Some((finding, description)) = occurrence_finding(&label, usage, cardinality, count) {
            let pos = match (finding, first_excess) {
                (FailureKind::Cardinality, Some(excess)) => excess,
                _ => self.pos,
            };
            let instance = match (finding, first_excess, cardinality.max) {
                (FailureKind::Cardinality, Some(_), MaxOccurs::Bounded(max)) => max + 1,
                _ => count.max(1),
            };
            let location = self.location_of(id, instance, pos);
            self.push(pos, finding, description, &location);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_helpers::{adjacent_nte_profile, sample_profile};

    fn skeleton(names: &[&'static str]) -> Vec<SkeletonSegment<'static>> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| SkeletonSegment {
                line: i + 1,
                column: 1,
                name: *name,
            })
            .collect()
    }

    fn kinds(failures: &[MessageFailure]) -> Vec<FailureKind> {
        failures.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn conformant_skeleton_is_checked() {
        let out = check_skeleton(&sample_profile(), &skeleton(&["MSH", "EVN", "PID", "PV1"]));
        assert_eq!(kinds(&out), [FailureKind::Checked]);
    }

    #[test]
    fn groups_and_repetitions_match() {
        let out = check_skeleton(
            &sample_profile(),
            &skeleton(&[
                "MSH", "EVN", "PID", "PV1", "OBX", "OBX", "PR1", "ROL", "ROL", "PR1", "IN1", "IN2", "IN1",
            ]),
        );
        assert_eq!(kinds(&out), [FailureKind::Checked]);
    }

    #[test]
    fn z_segments_are_ignored() {
        let out = check_skeleton(&sample_profile(), &skeleton(&["MSH", "ZAB", "EVN", "PID", "PV1", "ZCD"]));
        assert_eq!(kinds(&out), [FailureKind::Checked]);
    }

    #[test]
    fn repeated_single_segment_is_one_cardinality_failure() {
        let out = check_skeleton(&sample_profile(), &skeleton(&["MSH", "EVN", "PID", "PID", "PV1"]));
        assert_eq!(kinds(&out), [FailureKind::Cardinality]);
        assert_eq!(
            out[0].description,
            "Segment PID (Patient Identification) is present 2 times but is only allowed 1 times"
        );
        assert_eq!(out[0].location.line, 4);
        assert_eq!(out[0].location.flat_path, "PID[2]");
    }

    #[test]
    fn full_definition_leaves_segment_to_same_name_sibling() {
        let out = check_skeleton(&adjacent_nte_profile(), &skeleton(&["MSH", "NTE", "NTE"]));
        assert_eq!(kinds(&out), [FailureKind::Checked]);
    }

    #[test]
    fn last_same_name_definition_takes_the_excess() {
        let out = check_skeleton(&adjacent_nte_profile(), &skeleton(&["MSH", "NTE", "NTE", "NTE"]));
        assert_eq!(kinds(&out), [FailureKind::Cardinality]);
        assert_eq!(
            out[0].description,
            "Segment NTE (Notes and Comments) is present 2 times but is only allowed 1 times"
        );
        assert_eq!(out[0].location.line, 4);
    }

    #[test]
    fn missing_required_segment_is_usage_failure() {
        let out = check_skeleton(&sample_profile(), &skeleton(&["MSH", "PID", "PV1"]));
        assert_eq!(kinds(&out), [FailureKind::Usage]);
        assert_eq!(out[0].description, "Segment EVN (Event Type) is missing");
        assert_eq!(out[0].location.line, 2);
        assert!(!out[0].is_fatal());
    }

    #[test]
    fn group_over_max_is_cardinality_failure() {
        let out = check_skeleton(
            &sample_profile(),
            &skeleton(&["MSH", "EVN", "PID", "PV1", "IN1", "IN1", "IN1", "IN1"]),
        );
        assert_eq!(kinds(&out), [FailureKind::Cardinality]);
        assert!(out[0].description.starts_with("Segment Group INSURANCE is present 4 times"));
        assert_eq!(out[0].location.line, 8);
        assert_eq!(out[0].location.flat_path, "INSURANCE[4]/");
    }

    #[test]
    fn findings_inside_groups_carry_group_steps() {
        let out = check_skeleton(
            &sample_profile(),
            &skeleton(&["MSH", "EVN", "PID", "PV1", "IN1", "IN2", "IN2"]),
        );
        assert_eq!(kinds(&out), [FailureKind::Cardinality]);
        assert_eq!(out[0].location.flat_path, "INSURANCE[1]/IN2[2]");
        assert_eq!(out[0].location.line, 7);
    }

    #[test]
    fn findings_report_the_segment_column() {
        let mut input = skeleton(&["MSH", "EVN", "PV1", "PID"]);
        for (segment, column) in input.iter_mut().zip([3, 3, 5, 7]) {
            segment.column = column;
        }
        let out = check_skeleton(&sample_profile(), &input);
        assert_eq!(kinds(&out), [FailureKind::Usage, FailureKind::MessageStructure]);
        // PID is missing where PV1 starts, then PV1 leaves no place for PID
        assert_eq!((out[0].location.line, out[0].location.column), (3, 5));
        assert_eq!((out[1].location.line, out[1].location.column), (4, 7));
    }

    #[test]
    fn segment_out_of_place_is_fatal() {
        let out = check_skeleton(&sample_profile(), &skeleton(&["MSH", "EVN", "PID", "PV1", "IN1", "PR1"]));
        let last = out.last().expect("a finding");
        assert_eq!(last.kind, FailureKind::MessageStructure);
        assert!(last.is_fatal());
        assert_eq!(last.description, "Expected element(s) 'IN2', 'IN1' instead of 'PR1'");
        assert_eq!(last.location.line, 6);
    }

    #[test]
    fn unknown_segment_lists_expected_codes() {
        let out = check_skeleton(&sample_profile(), &skeleton(&["MSH", "EVN", "FOO"]));
        assert_eq!(kinds(&out), [FailureKind::MessageStructure]);
        assert_eq!(
            out[0].description,
            "Expected element(s) 'PID', 'PV1', 'OBX', 'PR1', 'IN1' instead of 'FOO'"
        );
    }

    #[test]
    fn root_mismatch_is_fatal() {
        let out = check_root(&sample_profile(), "ADT_A02", FailureLocation::default());
        assert_eq!(kinds(&out), [FailureKind::MessageStructure]);
        assert_eq!(out[0].description, "Expected root element 'ADT_A01' instead of 'ADT_A02'");
        assert_eq!(
            kinds(&check_root(&sample_profile(), "ADT_A01", FailureLocation::default())),
            [FailureKind::Checked]
        );
    }
}
