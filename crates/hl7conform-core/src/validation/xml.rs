/// Synchronized walk over an XML message tree and the profile tree.
///
/// At each level the walk keeps one cursor into the profile's children and
/// one into the message element's children, and classifies every message
/// element against the current profile definition ([`WalkState`]):
///
/// - `Normal`: the element is an occurrence of the current definition;
/// - `Max`: the element belongs to a later definition, so the current one is
///   finished and its occurrence count is checked;
/// - `Xtra` / `Unmatching`: no remaining definition accepts the element;
/// - `Xerr`: the element is an occurrence of a usage `X` definition;
/// - `Skip`: `Z` segments and unnamed elements.
///
/// Occurrence counts live in a per-call side array indexed by profile node
/// and are reset whenever a parent instance is entered. Segments that appear
/// without their group wrapper are attributed to groups through the state
/// machine mapping: contiguous segments mapped inside a group form a run,
/// and the run is split into group instances.
use std::collections::HashMap;

use crate::failure::{FailureKind, FailureLocation, MessageFailure};
use crate::fsm::SegmentMapping;
use crate::location::MessageLocation;
use crate::message::xml::{is_group_name, is_segment_name};
use crate::profile::{MaxOccurs, NodeKind, ProfileNodeId, Usage};
use crate::validation::content::{ValueChecks, occurrence_finding, x_usage_description};
use crate::xml::TreeNavigator;

/// Classification of one message element against the profile cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Normal,
    Max,
    Xtra,
    Unmatching,
    Xerr,
    Skip,
}

/// Nesting depth code: 0 group, 1 segment, 2 field, 3 component,
/// 4 subcomponent.
fn depth_of(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::SegmentGroup => 0,
        NodeKind::Segment => 1,
        NodeKind::Field => 2,
        NodeKind::Component => 3,
        NodeKind::SubComponent => 4,
    }
}

/// Occurrence counts per profile node for the parent instance being walked.
struct OccurrenceCounters<N> {
    counts: Vec<u32>,
    first_excess: Vec<Option<N>>,
}

impl<N: Copy> OccurrenceCounters<N> {
    fn new(len: usize) -> Self {
        Self {
            counts: vec![0; len],
            first_excess: vec![None; len],
        }
    }

    fn reset(&mut self, ids: &[ProfileNodeId]) {
        for id in ids {
            self.counts[id.index()] = 0;
            self.first_excess[id.index()] = None;
        }
    }

    /// Counts one more occurrence and returns its 1-based instance number.
    fn record(&mut self, id: ProfileNodeId, node: N, max: MaxOccurs) -> u32 {
        let count = &mut self.counts[id.index()];
        *count += 1;
        let instance = *count;
        if !max.admits(instance) && self.first_excess[id.index()].is_none() {
            self.first_excess[id.index()] = Some(node);
        }
        instance
    }

    fn count(&self, id: ProfileNodeId) -> u32 {
        self.counts[id.index()]
    }

    fn first_excess(&self, id: ProfileNodeId) -> Option<N> {
        self.first_excess[id.index()]
    }
}

/// Walks `tree` against the profile.
pub(crate) fn check_tree<T: TreeNavigator>(
    checks: ValueChecks<'_>,
    tree: &T,
    mapping: &SegmentMapping<T::Node>,
) -> Vec<MessageFailure> {
    let root = tree.root();
    let mut walk = TreeWalk {
        checks,
        tree,
        structure: tree.local_name(root).to_owned(),
        mapped: mapping.mapped().iter().copied().collect(),
        counters: OccurrenceCounters::new(checks.profile.len()),
        out: Vec::new(),
    };
    let nodes = tree.children(root);
    walk.walk_level(None, &nodes, &MessageLocation::for_group(Vec::new()), root);
    walk.out
}

struct TreeWalk<'a, T: TreeNavigator> {
    checks: ValueChecks<'a>,
    tree: &'a T,
    structure: String,
    mapped: HashMap<T::Node, ProfileNodeId>,
    counters: OccurrenceCounters<T::Node>,
    out: Vec<MessageFailure>,
}

impl<T: TreeNavigator> TreeWalk<'_, T> {
    // ── locations ───────────────────────────────────────────────────────────

    fn located_at(&self, node: T::Node, flat_path: String) -> FailureLocation {
        let at = self.tree.bookmark(node);
        FailureLocation {
            line: at.line,
            column: at.column,
            flat_path,
            tree_path: self.tree.positional_path(node),
        }
    }

    fn child_location(&self, scope: &MessageLocation, id: ProfileNodeId, instance: u32) -> MessageLocation {
        let node = self.checks.profile.node(id);
        match node.kind {
            NodeKind::SegmentGroup => {
                let mut groups = scope.groups().to_vec();
                groups.push((node.name.clone(), instance));
                MessageLocation::for_group(groups)
            }
            NodeKind::Segment => {
                MessageLocation::for_segment(&node.name, instance).with_groups(scope.groups().to_vec())
            }
            NodeKind::Field => scope.clone().with_field(node.position, instance),
            NodeKind::Component => scope.clone().with_component(node.position),
            NodeKind::SubComponent => scope.clone().with_subcomponent(node.position),
        }
    }

    /// Flat path of an undeclared element, when its name says where it is.
    fn extra_path(&self, scope: &MessageLocation, node: T::Node, depth: u8) -> String {
        let name = self.tree.local_name(node);
        let index = u32::try_from(self.tree.same_name_index(node)).unwrap_or(u32::MAX);
        if depth == 1 && is_segment_name(name) {
            return MessageLocation::for_segment(name, index)
                .with_groups(scope.groups().to_vec())
                .to_flat_path();
        }
        let Some(position) = name
            .rsplit_once('.')
            .and_then(|(_, n)| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
        else {
            return String::new();
        };
        match depth {
            2 => scope.clone().with_field(position, index).to_flat_path(),
            3 => scope.clone().with_component(position).to_flat_path(),
            4 => scope.clone().with_subcomponent(position).to_flat_path(),
            _ => String::new(),
        }
    }

    // ── classification ──────────────────────────────────────────────────────

    /// Depth code of a message element, from its name where possible.
    ///
    /// Below segment level every dotted name is taken to sit where it is
    /// expected; above it, `SEG.n` is a field and any other dotted name a
    /// component.
    fn message_depth(&self, name: &str, expected: u8) -> u8 {
        if is_group_name(name, &self.structure) {
            0
        } else if is_segment_name(name) {
            1
        } else if expected >= 2 {
            expected
        } else {
            match name.split_once('.') {
                Some((prefix, _)) if is_segment_name(prefix) => 2,
                Some(_) | None => 3,
            }
        }
    }

    /// Returns `true` if `node` is a segment mapped somewhere below `group`.
    fn mapped_into(&self, node: T::Node, group: ProfileNodeId) -> bool {
        self.mapped
            .get(&node)
            .is_some_and(|d| self.checks.profile.ancestor_groups(*d).contains(&group))
    }

    fn matches(&self, id: ProfileNodeId, node: T::Node) -> bool {
        let definition = self.checks.profile.node(id);
        let name = self.tree.local_name(node);
        match definition.kind {
            NodeKind::SegmentGroup => {
                name.strip_prefix(self.structure.as_str())
                    .and_then(|rest| rest.strip_prefix('.'))
                    .is_some_and(|group| group == definition.name)
                    || self.mapped_into(node, id)
            }
            NodeKind::Segment => {
                name == definition.name && self.mapped.get(&node).is_none_or(|d| *d == id)
            }
            NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => name
                .rsplit_once('.')
                .is_some_and(|(prefix, n)| {
                    !prefix.is_empty() && n.parse::<u32>().ok() == Some(definition.position)
                }),
        }
    }

    fn classify(&self, definitions: &[ProfileNodeId], cursor: usize, node: T::Node, expected: u8) -> (WalkState, usize) {
        let name = self.tree.local_name(node);
        if name.is_empty() || (is_segment_name(name) && name.starts_with('Z')) {
            return (WalkState::Skip, cursor);
        }
        if let Some(current) = definitions.get(cursor).copied() {
            if self.matches(current, node) {
                let state = if self.checks.profile.node(current).usage == Usage::X {
                    WalkState::Xerr
                } else {
                    WalkState::Normal
                };
                return (state, cursor);
            }
        }
        if let Some(later) = (cursor + 1..definitions.len()).find(|k| self.matches(definitions[*k], node)) {
            return (WalkState::Max, later);
        }
        let profile_depth = definitions
            .get(cursor)
            .map_or(expected, |d| depth_of(self.checks.profile.node(*d).kind));
        let message_depth = self.message_depth(name, expected);
        if profile_depth.abs_diff(message_depth) > 1 {
            (WalkState::Unmatching, cursor)
        } else {
            (WalkState::Xtra, cursor)
        }
    }

    // ── walk ────────────────────────────────────────────────────────────────

    /// Walks the message `nodes` against the children of `parent`.
    ///
    /// `scope` is the location of the parent instance and `anchor` the
    /// element missing children are reported at when nothing was matched.
    fn walk_level(&mut self, parent: Option<ProfileNodeId>, nodes: &[T::Node], scope: &MessageLocation, anchor: T::Node) {
        let profile = self.checks.profile;
        let definitions: Vec<ProfileNodeId> = profile.children_of(parent).to_vec();
        let expected = parent.map_or(1, |p| {
            let kind = profile.node(p).kind;
            match kind {
                NodeKind::SegmentGroup => 1,
                NodeKind::Segment | NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => {
                    depth_of(kind) + 1
                }
            }
        });
        self.counters.reset(&definitions);

        let mut cursor = 0;
        let mut index = 0;
        let mut last_matched = anchor;
        while let Some(node) = nodes.get(index).copied() {
            let (state, target) = self.classify(&definitions, cursor, node, expected);
            match state {
                WalkState::Skip => index += 1,
                WalkState::Max => {
                    for finished in &definitions[cursor..target] {
                        self.finish(*finished, scope, last_matched);
                    }
                    cursor = target;
                }
                WalkState::Xerr => {
                    let id = definitions[target];
                    let instance = self.counters.record(id, node, profile.node(id).cardinality.max);
                    let path = self.child_location(scope, id, instance).to_flat_path();
                    let label = profile.describe(id);
                    let content = self.tree.text(node).trim().to_owned();
                    let mut failure = MessageFailure::new(FailureKind::XUsage, x_usage_description(&label))
                        .located(self.located_at(node, path));
                    if !content.is_empty() {
                        failure = failure.with_content(content);
                    }
                    self.out.push(failure);
                    last_matched = node;
                    index += 1;
                }
                WalkState::Xtra | WalkState::Unmatching => {
                    let name = self.tree.local_name(node);
                    let description = if state == WalkState::Xtra {
                        format!("{name} is an extra element")
                    } else {
                        format!("{name} is an extra element at the wrong nesting level")
                    };
                    let depth = self.message_depth(name, expected);
                    let path = if depth == expected {
                        self.extra_path(scope, node, depth)
                    } else {
                        String::new()
                    };
                    let content = self.tree.text(node).trim().to_owned();
                    let mut failure =
                        MessageFailure::new(FailureKind::Xtra, description).located(self.located_at(node, path));
                    if !content.is_empty() {
                        failure = failure.with_content(content);
                    }
                    self.out.push(failure);
                    index += 1;
                }
                WalkState::Normal => {
                    let id = definitions[target];
                    let unwrapped = profile.node(id).kind == NodeKind::SegmentGroup
                        && is_segment_name(self.tree.local_name(node));
                    if unwrapped {
                        let consumed = self.implicit_group(id, &nodes[index..], scope);
                        last_matched = nodes[index + consumed - 1];
                        index += consumed;
                    } else {
                        self.occurrence(id, node, scope);
                        last_matched = node;
                        index += 1;
                    }
                }
            }
        }
        for remaining in &definitions[cursor.min(definitions.len())..] {
            self.finish(*remaining, scope, last_matched);
        }
    }

    /// Walks one message element that matched definition `id`.
    fn occurrence(&mut self, id: ProfileNodeId, node: T::Node, scope: &MessageLocation) {
        let profile = self.checks.profile;
        let definition = profile.node(id);
        let instance = self.counters.record(id, node, definition.cardinality.max);
        let location = self.child_location(scope, id, instance);
        let children = self.tree.children(node);

        let is_leaf = definition.children.is_empty()
            && matches!(
                definition.kind,
                NodeKind::Field | NodeKind::Component | NodeKind::SubComponent
            );
        if is_leaf && children.is_empty() {
            let value = self.tree.text(node).trim();
            let at = self.located_at(node, location.to_flat_path());
            if value.is_empty() {
                let label = profile.describe(id);
                if let Some((kind, description)) = occurrence_finding(&label, definition.usage, definition.cardinality, 0) {
                    self.out.push(MessageFailure::new(kind, description).located(at));
                }
            } else {
                self.checks.check_value(id, value, &at, &mut self.out);
            }
            return;
        }
        self.walk_level(Some(id), &children, &location, node);
    }

    /// Consumes the run of unwrapped segments mapped into `group` at the
    /// start of `nodes`, one group instance at a time. Returns the number of
    /// elements consumed.
    fn implicit_group(&mut self, group: ProfileNodeId, nodes: &[T::Node], scope: &MessageLocation) -> usize {
        let profile = self.checks.profile;
        let mut end = 0;
        for (offset, node) in nodes.iter().enumerate() {
            let name = self.tree.local_name(*node);
            if is_segment_name(name) && name.starts_with('Z') {
                continue;
            }
            if !self.mapped_into(*node, group) {
                break;
            }
            end = offset + 1;
        }

        let mut instances: Vec<Vec<T::Node>> = Vec::new();
        let mut previous: Option<ProfileNodeId> = None;
        for node in &nodes[..end] {
            if let Some(definition) = self.mapped.get(node).copied() {
                let restarts = previous.is_none_or(|p| {
                    definition < p || (definition == p && !profile.node(definition).cardinality.is_repeatable())
                });
                if restarts {
                    instances.push(Vec::new());
                }
                previous = Some(definition);
            }
            if let Some(current) = instances.last_mut() {
                current.push(*node);
            }
        }

        let max = profile.node(group).cardinality.max;
        for members in instances {
            let Some(first) = members.first().copied() else {
                continue;
            };
            let instance = self.counters.record(group, first, max);
            let location = self.child_location(scope, group, instance);
            self.walk_level(Some(group), &members, &location, first);
        }
        end.max(1)
    }

    /// Checks the final occurrence count of definition `id`.
    fn finish(&mut self, id: ProfileNodeId, scope: &MessageLocation, last_matched: T::Node) {
        let profile = self.checks.profile;
        let definition = profile.node(id);
        let count = self.counters.count(id);
        let label = profile.describe(id);
        let Some((kind, description)) = occurrence_finding(&label, definition.usage, definition.cardinality, count)
        else {
            return;
        };
        let at = match (kind, self.counters.first_excess(id), definition.cardinality.max) {
            (FailureKind::Cardinality, Some(excess), MaxOccurs::Bounded(max)) => {
                let path = self.child_location(scope, id, max + 1).to_flat_path();
                self.located_at(excess, path)
            }
            _ => {
                let location = self.child_location(scope, id, count + 1);
                let bookmark = self.tree.bookmark(last_matched);
                FailureLocation::at(&location, profile, bookmark.line, bookmark.column)
            }
        };
        self.out.push(MessageFailure::new(kind, description).located(at));
    }
}
