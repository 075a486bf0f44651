/// Finite-state-machine mapping of message segments onto profile definitions.
///
/// [`FiniteStateMachine::build`] derives one state per segment definition
/// (plus one per segment group when groups are kept as states) and the
/// transitions a conformant message may take between them. The machine is
/// read-only afterwards and can be shared between validations.
///
/// # Transition discovery
///
/// For every state, in this order:
/// 1. a self-loop, for repetitions of the same definition;
/// 2. the structural children (groups only), up to and including the first
///    child with usage `R` and `Min > 0`;
/// 3. if no mandatory child was found, the following siblings under the same
///    rule;
/// 4. if still none, each enclosing group in turn: a repeatable group adds a
///    re-entry transition to itself, then its following siblings are scanned.
///
/// Usage `X` definitions are never targets. When groups are not states, a
/// transition into a group is replaced by the segments reachable through
/// that group's own transitions.
///
/// # Replay
///
/// [`FiniteStateMachine::replay`] walks a message's segment sequence through
/// the machine. If a segment has no transition from the current state the
/// whole message falls back to the unique-segment heuristic: every segment
/// defined exactly once in the profile is mapped to that definition, and the
/// rest are reported as unmapped.
use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::instrument;

use crate::location::MessageLocation;
use crate::message::{Er7Message, segment_sequence};
use crate::profile::{MaxOccurs, NodeKind, Profile, ProfileNodeId, Usage};
use crate::xml::TreeNavigator;


// ---------------------------------------------------------------------------
// States and transitions
// ---------------------------------------------------------------------------

/// One state of the machine: a segment or segment-group definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileState {
    /// The profile definition this state stands for.
    pub node: ProfileNodeId,
    /// Segment code or group name; the label of transitions into this state.
    pub name: String,
    /// [`NodeKind::Segment`] or [`NodeKind::SegmentGroup`].
    pub kind: NodeKind,
    /// Consecutive occurrences the definition admits.
    pub max: MaxOccurs,
}

impl ProfileState {
    /// Returns `true` once `run` consecutive occurrences use up the bound.
    fn exhausted_by(&self, run: u32) -> bool {
        !self.max.admits(run.saturating_add(1))
    }
}

/// A transition as exposed for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Transition {
    /// Source definition.
    pub from: ProfileNodeId,
    /// Segment code or group name consumed.
    pub label: String,
    /// Target definition.
    pub to: ProfileNodeId,
}

/// A `(state, segment)` pair with more than one possible target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ambiguity {
    /// Source definition.
    pub from: ProfileNodeId,
    /// Segment code.
    pub label: String,
    /// Candidate targets in discovery order.
    pub targets: Vec<ProfileNodeId>,
}

// ---------------------------------------------------------------------------
// Mapping result
// ---------------------------------------------------------------------------

/// How a [`SegmentMapping`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrategy {
    /// Every segment was consumed by a transition.
    StateMachine,
    /// The replay failed; segments were mapped by unique name.
    UniqueSegments,
}

/// Assignment of message segments to profile segment definitions.
///
/// `T` identifies a segment occurrence: a line number for ER7 messages, a
/// tree node for XML messages. The mapping is allocated per replay and never
/// stored on the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMapping<T> {
    strategy: MappingStrategy,
    by_element: BTreeMap<ProfileNodeId, Vec<T>>,
    in_order: Vec<(T, ProfileNodeId)>,
    unmapped: Vec<(T, String)>,
    ambiguous_hits: Vec<Ambiguity>,
}

impl<T: Copy + PartialEq> SegmentMapping<T> {
    fn new(strategy: MappingStrategy) -> Self {
        Self {
            strategy,
            by_element: BTreeMap::new(),
            in_order: Vec::new(),
            unmapped: Vec::new(),
            ambiguous_hits: Vec::new(),
        }
    }

    fn assign(&mut self, item: T, definition: ProfileNodeId) {
        self.by_element.entry(definition).or_default().push(item);
        self.in_order.push((item, definition));
    }

    /// How the mapping was produced.
    pub fn strategy(&self) -> MappingStrategy {
        self.strategy
    }

    /// Occurrences mapped to `definition`, in message order.
    pub fn occurrences(&self, definition: ProfileNodeId) -> &[T] {
        self.by_element.get(&definition).map_or(&[], Vec::as_slice)
    }

    /// Definitions with at least one occurrence, in profile order.
    pub fn definitions(&self) -> impl Iterator<Item = ProfileNodeId> + '_ {
        self.by_element.keys().copied()
    }

    /// The definition `item` was mapped to.
    pub fn definition_of(&self, item: T) -> Option<ProfileNodeId> {
        self.in_order.iter().find(|(i, _)| *i == item).map(|(_, d)| *d)
    }

    /// Mapped occurrences in message order.
    pub fn mapped(&self) -> &[(T, ProfileNodeId)] {
        &self.in_order
    }

    /// Occurrences that could not be mapped, with their segment codes.
    pub fn unmapped(&self) -> &[(T, String)] {
        &self.unmapped
    }

    /// Ambiguous transitions the replay had to take.
    pub fn ambiguous_hits(&self) -> &[Ambiguity] {
        &self.ambiguous_hits
    }

    /// Number of mapped occurrences.
    pub fn mapped_count(&self) -> usize {
        self.in_order.len()
    }

    /// Locations of the mapped occurrences in message order, group steps
    /// included.
    ///
    /// An occurrence whose branch comes before the last branch placed in the
    /// open instance of a group starts a new instance of that group, as does
    /// a segment that has used up its `Max` in the open instance of a
    /// repeatable group.
    ///
    /// Segment instances count occurrences of the code within the enclosing
    /// group instance, or within the top level.
    pub fn locations(&self, profile: &Profile) -> Vec<(T, MessageLocation)> {
        let mut top = PlacementScope::default();
        let mut open: Vec<OpenGroup> = Vec::new();
        let mut out = Vec::with_capacity(self.in_order.len());
        for (item, definition) in &self.in_order {
            let mut path = profile.ancestor_groups(*definition);
            path.push(*definition);
            let depth = path.len() - 1;
            for (level, pair) in path.windows(2).enumerate() {
                let (group, next) = (pair[0], pair[1]);
                let next_node = profile.node(next);
                let repeatable = profile.node(group).cardinality.is_repeatable();
                let continues = open.get(level).is_some_and(|g| {
                    let used = g.scope.definitions.get(&next).copied().unwrap_or(0);
                    // a used-up segment opens the next instance of a repeatable group
                    let exhausted = repeatable
                        && next_node.kind == NodeKind::Segment
                        && !next_node.cardinality.max.admits(used + 1);
                    g.group == group && g.scope.branch.is_none_or(|b| next_node.position >= b) && !exhausted
                });
                if continues {
                    continue;
                }
                open.truncate(level);
                let scope = scope_at(&mut top, &mut open, level);
                scope.branch = Some(profile.node(group).position);
                let count = scope.groups.entry(group).or_insert(0);
                *count += 1;
                let instance = *count;
                open.push(OpenGroup {
                    group,
                    instance,
                    scope: PlacementScope::default(),
                });
            }
            open.truncate(depth);
            let node = profile.node(*definition);
            let scope = scope_at(&mut top, &mut open, depth);
            scope.branch = Some(node.position);
            *scope.definitions.entry(*definition).or_insert(0) += 1;
            let count = scope.segments.entry(node.name.clone()).or_insert(0);
            *count += 1;
            let instance = *count;
            let groups = open
                .iter()
                .map(|g| (profile.node(g.group).name.clone(), g.instance))
                .collect();
            out.push((*item, MessageLocation::for_segment(&node.name, instance).with_groups(groups)));
        }
        out
    }
}

/// Instance counters of one group instance, or of the top level.
#[derive(Debug, Default)]
struct PlacementScope {
    /// Position of the last child definition placed.
    branch: Option<u32>,
    /// Occurrences per segment code.
    segments: HashMap<String, u32>,
    /// Occurrences per segment definition.
    definitions: HashMap<ProfileNodeId, u32>,
    groups: HashMap<ProfileNodeId, u32>,
}

/// A group instance still open while placing occurrences.
#[derive(Debug)]
struct OpenGroup {
    group: ProfileNodeId,
    instance: u32,
    scope: PlacementScope,
}

fn scope_at<'a>(top: &'a mut PlacementScope, open: &'a mut [OpenGroup], depth: usize) -> &'a mut PlacementScope {
    match depth.checked_sub(1).and_then(|i| open.get_mut(i)) {
        Some(group) => &mut group.scope,
        None => top,
    }
}

// ---------------------------------------------------------------------------
// FiniteStateMachine
// ---------------------------------------------------------------------------

/// The profile grammar as a transition graph over segment definitions.
#[derive(Debug, Clone)]
pub struct FiniteStateMachine {
    graph: StableDiGraph<ProfileState, String>,
    by_node: HashMap<ProfileNodeId, NodeIndex>,
    /// Segment targets per state and segment code, groups already looked
    /// through, in discovery order.
    lookup: HashMap<NodeIndex, BTreeMap<String, Vec<NodeIndex>>>,
    ambiguities: Vec<Ambiguity>,
    unique: BTreeMap<String, ProfileNodeId>,
    initial: Option<NodeIndex>,
    has_groups: bool,
}

impl FiniteStateMachine {
    /// Builds the machine for `profile`.
    ///
    /// With `has_groups` set, segment groups become states of their own and
    /// are looked through during replay; otherwise group transitions are
    /// expanded into segment transitions at build time.
    #[instrument(level = "debug", skip(profile), fields(structure = %profile.header().structure_id))]
    pub fn build(profile: &Profile, has_groups: bool) -> Self {
        let mut graph = StableDiGraph::new();
        let mut by_node = HashMap::new();
        for id in profile.node_ids() {
            let node = profile.node(id);
            let is_state = match node.kind {
                NodeKind::Segment => true,
                NodeKind::SegmentGroup => has_groups,
                NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => false,
            };
            if is_state {
                let index = graph.add_node(ProfileState {
                    node: id,
                    name: node.name.clone(),
                    kind: node.kind,
                    max: node.cardinality.max,
                });
                by_node.insert(id, index);
            }
        }

        let states: Vec<(NodeIndex, ProfileNodeId)> = graph
            .node_indices()
            .map(|index| (index, graph[index].node))
            .collect();
        for (index, id) in &states {
            let raw = discover(profile, *id);
            let targets = if has_groups {
                raw
            } else {
                expand_groups(profile, raw)
            };
            for target in targets {
                if let Some(to) = by_node.get(&target) {
                    let label = profile.node(target).name.clone();
                    graph.add_edge(*index, *to, label);
                }
            }
        }

        let initial = graph.node_indices().next();
        let mut fsm = Self {
            graph,
            by_node,
            lookup: HashMap::new(),
            ambiguities: Vec::new(),
            unique: profile.unique_segments(),
            initial,
            has_groups,
        };
        fsm.build_lookup();
        tracing::debug!(
            states = fsm.state_count(),
            transitions = fsm.transition_count(),
            ambiguities = fsm.ambiguities.len(),
            "state machine built"
        );
        fsm
    }

    fn build_lookup(&mut self) {
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for index in indices {
            let mut by_label: BTreeMap<String, Vec<NodeIndex>> = BTreeMap::new();
            let mut visited = HashSet::from([index]);
            self.collect_segment_targets(index, &mut visited, &mut by_label);
            // a self-loop on a definition that cannot repeat never competes
            // with a sibling of the same name: entering the state uses it up
            let single = self.graph[index].exhausted_by(1);
            for (label, targets) in &by_label {
                let competing = targets.iter().filter(|t| !(single && **t == index)).count();
                if competing > 1 {
                    self.ambiguities.push(Ambiguity {
                        from: self.graph[index].node,
                        label: label.clone(),
                        targets: targets.iter().map(|t| self.graph[*t].node).collect(),
                    });
                }
            }
            self.lookup.insert(index, by_label);
        }
    }

    /// Gathers segment targets of `from`, looking through group states.
    fn collect_segment_targets(
        &self,
        from: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        out: &mut BTreeMap<String, Vec<NodeIndex>>,
    ) {
        for to in self.outgoing(from) {
            let state = &self.graph[to];
            match state.kind {
                NodeKind::Segment => {
                    let targets = out.entry(state.name.clone()).or_default();
                    if !targets.contains(&to) {
                        targets.push(to);
                    }
                }
                NodeKind::SegmentGroup => {
                    if to != from && visited.insert(to) {
                        self.collect_segment_targets(to, visited, out);
                    }
                }
                NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => {}
            }
        }
    }

    /// Targets of `from` in insertion order.
    fn outgoing(&self, from: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges(from)
            .map(|edge| (edge.id(), edge.target()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Returns `true` if segment groups are states.
    pub fn has_groups(&self) -> bool {
        self.has_groups
    }

    /// Number of states.
    pub fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of transitions, self-loops included.
    pub fn transition_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// States in profile order.
    pub fn states(&self) -> impl Iterator<Item = &ProfileState> {
        self.graph.node_indices().map(|index| &self.graph[index])
    }

    /// Every transition in discovery order.
    pub fn transitions(&self) -> Vec<Transition> {
        self.graph
            .edge_indices()
            .filter_map(|edge| {
                let (from, to) = self.graph.edge_endpoints(edge)?;
                Some(Transition {
                    from: self.graph[from].node,
                    label: self.graph.edge_weight(edge)?.clone(),
                    to: self.graph[to].node,
                })
            })
            .collect()
    }

    /// `(state, segment)` pairs with more than one target.
    pub fn ambiguities(&self) -> &[Ambiguity] {
        &self.ambiguities
    }

    /// Segment definitions reachable from `from` by consuming `segment`.
    pub fn targets(&self, from: ProfileNodeId, segment: &str) -> Vec<ProfileNodeId> {
        self.by_node
            .get(&from)
            .map(|index| {
                self.segment_targets(*index, segment)
                    .iter()
                    .map(|t| self.graph[*t].node)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn segment_targets(&self, from: NodeIndex, segment: &str) -> &[NodeIndex] {
        self.lookup
            .get(&from)
            .and_then(|by_label| by_label.get(segment))
            .map_or(&[], Vec::as_slice)
    }

    /// Maps a sequence of `(occurrence, segment code)` pairs.
    ///
    /// `Z` segments are skipped. Every other occurrence ends up either
    /// mapped or unmapped, never both.
    pub fn replay<T, I, S>(&self, segments: I) -> SegmentMapping<T>
    where
        T: Copy + PartialEq,
        I: IntoIterator<Item = (T, S)>,
        S: AsRef<str>,
    {
        let segments: Vec<(T, S)> = segments
            .into_iter()
            .filter(|(_, name)| !name.as_ref().starts_with('Z'))
            .collect();

        let mut mapping = SegmentMapping::new(MappingStrategy::StateMachine);
        let mut current = self.initial;
        let mut last_condition: Option<&str> = None;
        // consecutive occurrences mapped to the current state
        let mut run = 0u32;
        for (item, name) in &segments {
            let name = name.as_ref();
            let Some(state) = current else {
                return self.fall_back(&segments);
            };
            let mut targets = self.segment_targets(state, name).to_vec();
            if targets.len() > 1 && self.graph[state].exhausted_by(run) {
                targets.retain(|t| *t != state);
            }
            let next = match targets.as_slice() {
                [] if last_condition == Some(name) => state,
                [] => return self.fall_back(&segments),
                [only] => *only,
                [first, ..] => {
                    let from = self.graph[state].node;
                    if !mapping
                        .ambiguous_hits
                        .iter()
                        .any(|a| a.from == from && a.label == name)
                    {
                        if let Some(ambiguity) = self
                            .ambiguities
                            .iter()
                            .find(|a| a.from == from && a.label == name)
                        {
                            mapping.ambiguous_hits.push(ambiguity.clone());
                        }
                    }
                    *first
                }
            };
            run = if Some(next) == current { run.saturating_add(1) } else { 1 };
            current = Some(next);
            mapping.assign(*item, self.graph[next].node);
            last_condition = Some(name);
        }
        tracing::debug!(mapped = mapping.mapped_count(), "segments mapped by state machine");
        mapping
    }

    fn fall_back<T: Copy + PartialEq, S: AsRef<str>>(&self, segments: &[(T, S)]) -> SegmentMapping<T> {
        let mut mapping = SegmentMapping::new(MappingStrategy::UniqueSegments);
        for (item, name) in segments {
            let name = name.as_ref();
            match self.unique.get(name) {
                Some(definition) => mapping.assign(*item, *definition),
                None => mapping.unmapped.push((*item, name.to_owned())),
            }
        }
        tracing::warn!(
            mapped = mapping.mapped_count(),
            unmapped = mapping.unmapped.len(),
            "state machine replay failed, mapped segments by unique name"
        );
        mapping
    }

    /// Maps the segments of an ER7 message; occurrences are line numbers.
    pub fn map_er7(&self, message: &Er7Message) -> SegmentMapping<usize> {
        self.replay(message.segments().iter().map(|s| (s.line, s.name.as_str())))
    }

    /// Maps the segment elements of an XML message tree.
    pub fn map_tree<N: TreeNavigator>(&self, tree: &N) -> SegmentMapping<N::Node> {
        let sequence = segment_sequence(tree);
        self.replay(sequence.into_iter().map(|node| (node, tree.local_name(node))))
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Raw targets of `id`, groups not expanded, duplicates removed.
fn discover(profile: &Profile, id: ProfileNodeId) -> Vec<ProfileNodeId> {
    let mut out = vec![id];
    let node = profile.node(id);
    let mut found = node.kind == NodeKind::SegmentGroup
        && scan(profile, profile.children_of(Some(id)), &mut out);
    if !found {
        found = scan(profile, profile.following_siblings(id), &mut out);
    }
    let mut ancestor = node.parent;
    while let Some(group) = ancestor {
        if found {
            break;
        }
        if profile.node(group).cardinality.is_repeatable() {
            push_unique(&mut out, group);
        }
        found = scan(profile, profile.following_siblings(group), &mut out);
        ancestor = profile.node(group).parent;
    }
    out
}

/// Adds eligible candidates up to the first mandatory one. Returns `true`
/// if a mandatory candidate was reached.
fn scan(profile: &Profile, candidates: &[ProfileNodeId], out: &mut Vec<ProfileNodeId>) -> bool {
    for candidate in candidates {
        let node = profile.node(*candidate);
        if !node.kind.is_structural() || node.usage == Usage::X {
            continue;
        }
        push_unique(out, *candidate);
        if node.usage == Usage::R && node.cardinality.min > 0 {
            return true;
        }
    }
    false
}

/// Replaces group targets by the segments reachable through them.
fn expand_groups(profile: &Profile, raw: Vec<ProfileNodeId>) -> Vec<ProfileNodeId> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    for target in raw {
        expand_into(profile, target, &mut visited, &mut out);
    }
    out
}

fn expand_into(
    profile: &Profile,
    target: ProfileNodeId,
    visited: &mut HashSet<ProfileNodeId>,
    out: &mut Vec<ProfileNodeId>,
) {
    match profile.node(target).kind {
        NodeKind::Segment => push_unique(out, target),
        NodeKind::SegmentGroup => {
            if !visited.insert(target) {
                return;
            }
            // the group's own self-loop is not a segment transition
            for next in discover(profile, target).into_iter().filter(|n| *n != target) {
                expand_into(profile, next, visited, out);
            }
        }
        NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => {}
    }
}

fn push_unique(out: &mut Vec<ProfileNodeId>, id: ProfileNodeId) {
    if !out.contains(&id) {
        out.push(id);
    }
}
