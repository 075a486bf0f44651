/// HL7 v2 conformance profiles.
///
/// A profile is parsed once from its XML source into an arena of typed
/// [`ProfileNode`]s (segment groups, segments, fields, components,
/// subcomponents) addressed by [`ProfileNodeId`]. Node ids follow document
/// order, so every traversal over the arena is deterministic.
///
/// # Normalization
///
/// [`Profile::parse`] runs a single normalization pass before returning: a
/// coded composite (`CE`, `CWE`, `CNE`) that carries a `Table` while its first
/// child does not has the table moved down onto that first child, where the
/// value check actually happens. The profile is immutable afterwards.
pub mod index;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::instrument;

use crate::location::{ElementType, MessageLocation, ProfileElement};
use crate::patterns::SEGMENT_ID_RE;
use crate::xml::{TreeNavigator, XmlDocument, XmlError, XmlNodeId};

pub use index::{PComponent, PField, PSegment, PSubComponent, ProfileIndex};

#[cfg(test)]
mod tests;

/// Datatypes whose table constraint is pushed down to the first component.
const CODED_COMPOSITES: [&str; 3] = ["CE", "CWE", "CNE"];

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading a profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    /// The profile text is not well-formed XML.
    #[error("profile is not well-formed: {0}")]
    Xml(#[from] XmlError),
    /// The root element is not a known profile root.
    #[error("unrecognized profile root element <{0}>")]
    Unrecognized(String),
    /// The profile is an HL7 v3 profile.
    #[error("HL7 v3 profiles cannot be used for HL7 v2 structural validation")]
    UnsupportedV3,
    /// No `HL7v2xStaticDef` element below the root.
    #[error("profile has no HL7v2xStaticDef element")]
    MissingStaticDef,
    /// A required attribute is absent.
    #[error("<{element}> at line {line} is missing attribute {attribute}")]
    MissingAttribute {
        /// Element local name.
        element: String,
        /// Attribute name.
        attribute: &'static str,
        /// Source line.
        line: usize,
    },
    /// The `Usage` attribute is not one of R, RE, O, C, CE, X.
    #[error("<{element}> at line {line} has invalid usage {value:?}")]
    InvalidUsage {
        /// Element local name.
        element: String,
        /// Rejected value.
        value: String,
        /// Source line.
        line: usize,
    },
    /// `Min`, `Max` or `Length` is not a number (or `*` for `Max`).
    #[error("<{element}> at line {line} has invalid {attribute} {value:?}")]
    InvalidNumber {
        /// Element local name.
        element: String,
        /// Attribute name.
        attribute: &'static str,
        /// Rejected value.
        value: String,
        /// Source line.
        line: usize,
    },
    /// A segment name is not a three-character code.
    #[error("segment name {name:?} at line {line} is not a three-character code")]
    InvalidSegmentName {
        /// Rejected name.
        name: String,
        /// Source line.
        line: usize,
    },
    /// An element kind appears under a parent that cannot contain it.
    #[error("<{element}> at line {line} cannot appear inside <{parent}>")]
    Misplaced {
        /// Element local name.
        element: String,
        /// Parent local name.
        parent: String,
        /// Source line.
        line: usize,
    },
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What kind of profile a document contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileType {
    /// An HL7 v2.x conformance profile with its declared version.
    V2 {
        /// Value of the root `HL7Version` attribute.
        version: String,
    },
    /// An HL7 v3 profile.
    V3,
    /// Anything else; carries the root element name.
    Unrecognized(String),
}

/// Classifies a parsed document by its root element.
pub fn classify_profile(doc: &XmlDocument) -> ProfileType {
    let root = doc.root();
    let name = doc.local_name(root);
    if name == "HL7v2xConformanceProfile" {
        ProfileType::V2 {
            version: doc.attribute(root, "HL7Version").unwrap_or_default().to_owned(),
        }
    } else if name.starts_with("HL7v3") {
        ProfileType::V3
    } else {
        ProfileType::Unrecognized(name.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Node model
// ---------------------------------------------------------------------------

/// Stable index of a node inside a [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProfileNodeId(usize);

impl ProfileNodeId {
    /// Zero-based arena index, equal to the node's document-order rank.
    pub fn index(self) -> usize {
        self.0
    }
}

/// The structural kind of a profile node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    /// `<SegGroup>`
    SegmentGroup,
    /// `<Segment>`
    Segment,
    /// `<Field>`
    Field,
    /// `<Component>`
    Component,
    /// `<SubComponent>`
    SubComponent,
}

impl NodeKind {
    fn from_element(name: &str) -> Option<Self> {
        match name {
            "SegGroup" => Some(Self::SegmentGroup),
            "Segment" => Some(Self::Segment),
            "Field" => Some(Self::Field),
            "Component" => Some(Self::Component),
            "SubComponent" => Some(Self::SubComponent),
            _ => None,
        }
    }

    /// Returns `true` for segment groups and segments.
    pub fn is_structural(self) -> bool {
        matches!(self, Self::SegmentGroup | Self::Segment)
    }

    fn may_contain(parent: Option<Self>, child: Self) -> bool {
        matches!(
            (parent, child),
            (None | Some(Self::SegmentGroup), Self::SegmentGroup | Self::Segment)
                | (Some(Self::Segment), Self::Field)
                | (Some(Self::Field), Self::Component)
                | (Some(Self::Component), Self::SubComponent)
        )
    }
}

/// Conformance usage code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Usage {
    /// Required.
    R,
    /// Required, but may be empty.
    RE,
    /// Optional.
    O,
    /// Conditional.
    C,
    /// Conditional, but may be empty.
    CE,
    /// Not supported; must not be present.
    X,
}

impl Usage {
    /// Parses a usage attribute value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "R" => Some(Self::R),
            "RE" => Some(Self::RE),
            "O" => Some(Self::O),
            "C" => Some(Self::C),
            "CE" => Some(Self::CE),
            "X" => Some(Self::X),
            _ => None,
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::R => "R",
            Self::RE => "RE",
            Self::O => "O",
            Self::C => "C",
            Self::CE => "CE",
            Self::X => "X",
        })
    }
}

/// Upper bound of a cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MaxOccurs {
    /// At most this many.
    Bounded(u32),
    /// `Max="*"`.
    Unbounded,
}

impl MaxOccurs {
    /// Returns `true` if `count` occurrences do not exceed the bound.
    pub fn admits(self, count: u32) -> bool {
        match self {
            Self::Bounded(max) => count <= max,
            Self::Unbounded => true,
        }
    }

    /// The bound, with `substitute` standing in for unbounded.
    pub fn or_substitute(self, substitute: u32) -> u32 {
        match self {
            Self::Bounded(max) => max,
            Self::Unbounded => substitute,
        }
    }

    fn times(self, other: Self) -> Self {
        match (self, other) {
            (Self::Bounded(a), Self::Bounded(b)) => Self::Bounded(a.saturating_mul(b)),
            (Self::Unbounded, _) | (_, Self::Unbounded) => Self::Unbounded,
        }
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(max) => write!(f, "{max}"),
            Self::Unbounded => f.write_str("*"),
        }
    }
}

/// `Min`/`Max` of a node, applied per parent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Cardinality {
    /// Minimum occurrences.
    pub min: u32,
    /// Maximum occurrences.
    pub max: MaxOccurs,
}

impl Cardinality {
    /// Returns `true` if the node may repeat.
    pub fn is_repeatable(self) -> bool {
        match self.max {
            MaxOccurs::Bounded(max) => max > 1,
            MaxOccurs::Unbounded => true,
        }
    }
}

/// One element of the profile tree.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileNode {
    /// Structural kind.
    pub kind: NodeKind,
    /// `Name` attribute. For segments this is the three-character code, for
    /// groups the group name, for fields and below the descriptive name.
    pub name: String,
    /// `LongName` attribute (segments and groups), empty when absent.
    pub long_name: String,
    /// Usage code.
    pub usage: Usage,
    /// Cardinality per parent instance.
    pub cardinality: Cardinality,
    /// 1-based position among the parent's children.
    pub position: u32,
    /// `Datatype` attribute.
    pub datatype: Option<String>,
    /// `Length` attribute.
    pub length: Option<u32>,
    /// `Table` attribute.
    pub table: Option<String>,
    /// `ConstantValue` attribute.
    pub constant_value: Option<String>,
    /// Enclosing node; `None` for top-level groups and segments.
    pub parent: Option<ProfileNodeId>,
    /// Children in document order.
    pub children: Vec<ProfileNodeId>,
}

/// Message identification declared by the profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProfileHeader {
    /// `HL7Version` of the root element.
    pub hl7_version: String,
    /// `MsgType` of the static definition.
    pub message_type: String,
    /// `EventType` of the static definition.
    pub event_type: String,
    /// `MsgStructID` of the static definition.
    pub structure_id: String,
    /// `MetaData/@Name`, when present.
    pub name: Option<String>,
}

/// How strictly [`Profile::resolve`] matches a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Skip usage `X` branches and reject instance numbers above `Max`.
    Strict,
    /// Match by names and positions only.
    Lenient,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A parsed, normalized HL7 v2 conformance profile.
#[derive(Debug, Clone)]
pub struct Profile {
    header: ProfileHeader,
    nodes: Vec<ProfileNode>,
    top_level: Vec<ProfileNodeId>,
}

impl Profile {
    /// Parses profile XML text.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError`] when the text is not XML, is not an HL7 v2
    /// profile, or carries malformed usage/cardinality attributes.
    #[instrument(level = "debug", skip(text), fields(bytes = text.len()))]
    pub fn parse(text: &str) -> Result<Self, ProfileError> {
        let doc = XmlDocument::parse(text)?;
        Self::from_document(&doc)
    }

    /// Builds a profile from an already parsed document.
    ///
    /// # Errors
    ///
    /// See [`Profile::parse`].
    pub fn from_document(doc: &XmlDocument) -> Result<Self, ProfileError> {
        let hl7_version = match classify_profile(doc) {
            ProfileType::V2 { version } => version,
            ProfileType::V3 => return Err(ProfileError::UnsupportedV3),
            ProfileType::Unrecognized(name) => return Err(ProfileError::Unrecognized(name)),
        };

        let static_def = doc
            .select(&["HL7v2xStaticDef"])
            .ok_or(ProfileError::MissingStaticDef)?;
        let message_type = doc.attribute(static_def, "MsgType").unwrap_or_default().to_owned();
        let event_type = doc.attribute(static_def, "EventType").unwrap_or_default().to_owned();
        let structure_id = match doc.attribute(static_def, "MsgStructID") {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ if event_type.is_empty() => message_type.clone(),
            _ => format!("{message_type}_{event_type}"),
        };
        let name = doc
            .select(&["MetaData"])
            .and_then(|m| doc.attribute(m, "Name"))
            .map(str::to_owned);

        let mut profile = Self {
            header: ProfileHeader {
                hl7_version,
                message_type,
                event_type,
                structure_id,
                name,
            },
            nodes: Vec::new(),
            top_level: Vec::new(),
        };
        profile.load_children(doc, static_def, None)?;
        profile.normalize_coded_tables();
        tracing::debug!(
            structure = %profile.header.structure_id,
            nodes = profile.nodes.len(),
            "profile loaded"
        );
        Ok(profile)
    }

    fn load_children(
        &mut self,
        doc: &XmlDocument,
        element: XmlNodeId,
        parent: Option<ProfileNodeId>,
    ) -> Result<(), ProfileError> {
        let parent_kind = parent.map(|p| self.node(p).kind);
        let mut position = 0u32;
        for child in doc.children(element) {
            let Some(kind) = NodeKind::from_element(doc.local_name(child)) else {
                continue;
            };
            let line = doc.bookmark(child).line;
            if !NodeKind::may_contain(parent_kind, kind) {
                return Err(ProfileError::Misplaced {
                    element: doc.local_name(child).to_owned(),
                    parent: doc.local_name(element).to_owned(),
                    line,
                });
            }
            position += 1;
            let node = read_node(doc, child, kind, position, parent)?;
            let id = ProfileNodeId(self.nodes.len());
            self.nodes.push(node);
            match parent {
                Some(p) => self.nodes[p.0].children.push(id),
                None => self.top_level.push(id),
            }
            self.load_children(doc, child, Some(id))?;
        }
        Ok(())
    }

    fn normalize_coded_tables(&mut self) {
        for index in 0..self.nodes.len() {
            let node = &self.nodes[index];
            let coded = node
                .datatype
                .as_deref()
                .is_some_and(|dt| CODED_COMPOSITES.contains(&dt));
            if !coded || node.table.is_none() {
                continue;
            }
            let Some(first) = node.children.first().copied() else {
                continue;
            };
            if self.nodes[first.0].table.is_some() {
                continue;
            }
            let table = self.nodes[index].table.take();
            self.nodes[first.0].table = table;
        }
    }

    /// Message identification declared by the profile.
    pub fn header(&self) -> &ProfileHeader {
        &self.header
    }

    /// Returns the node at `id`.
    ///
    /// Ids are only handed out by this profile, so the lookup cannot miss.
    pub fn node(&self, id: ProfileNodeId) -> &ProfileNode {
        &self.nodes[id.0]
    }

    /// Number of nodes of every kind.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the static definition declares nothing.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in document order.
    pub fn node_ids(&self) -> impl Iterator<Item = ProfileNodeId> + '_ {
        (0..self.nodes.len()).map(ProfileNodeId)
    }

    /// Top-level groups and segments in document order.
    pub fn top_level(&self) -> &[ProfileNodeId] {
        &self.top_level
    }

    /// Children of `parent`, or the top level when `parent` is `None`.
    pub fn children_of(&self, parent: Option<ProfileNodeId>) -> &[ProfileNodeId] {
        match parent {
            Some(p) => &self.node(p).children,
            None => &self.top_level,
        }
    }

    /// Siblings following `id` under the same parent.
    pub fn following_siblings(&self, id: ProfileNodeId) -> &[ProfileNodeId] {
        let siblings = self.children_of(self.node(id).parent);
        let at = siblings.iter().position(|s| *s == id).map_or(siblings.len(), |p| p + 1);
        &siblings[at..]
    }

    /// The child of `parent` at 1-based `position`.
    pub fn child_at(&self, parent: ProfileNodeId, position: u32) -> Option<ProfileNodeId> {
        let index = usize::try_from(position).ok()?.checked_sub(1)?;
        self.node(parent).children.get(index).copied()
    }

    /// Enclosing segment groups of `id`, outermost first.
    pub fn ancestor_groups(&self, id: ProfileNodeId) -> Vec<ProfileNodeId> {
        let mut groups = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            if self.node(p).kind == NodeKind::SegmentGroup {
                groups.push(p);
            }
            current = self.node(p).parent;
        }
        groups.reverse();
        groups
    }

    /// Every segment definition in document order.
    pub fn segments(&self) -> Vec<ProfileNodeId> {
        self.node_ids()
            .filter(|id| self.node(*id).kind == NodeKind::Segment)
            .collect()
    }

    /// All definitions of the segment `name`, in document order.
    pub fn segment_definitions(&self, name: &str) -> Vec<ProfileNodeId> {
        self.node_ids()
            .filter(|id| {
                let node = self.node(*id);
                node.kind == NodeKind::Segment && node.name == name
            })
            .collect()
    }

    /// Segment names defined exactly once, mapped to that definition.
    pub fn unique_segments(&self) -> BTreeMap<String, ProfileNodeId> {
        let mut seen: BTreeMap<String, Vec<ProfileNodeId>> = BTreeMap::new();
        for id in self.segments() {
            seen.entry(self.node(id).name.clone()).or_default().push(id);
        }
        seen.into_iter()
            .filter_map(|(name, defs)| match defs.as_slice() {
                [only] => Some((name, *only)),
                _ => None,
            })
            .collect()
    }

    /// The node's own `Max` multiplied by the `Max` of every enclosing group.
    pub fn effective_max(&self, id: ProfileNodeId) -> MaxOccurs {
        let mut max = self.node(id).cardinality.max;
        let mut current = self.node(id).parent;
        while let Some(p) = current {
            max = max.times(self.node(p).cardinality.max);
            current = self.node(p).parent;
        }
        max
    }

    /// Upper bound on the number of segments a conformant message may
    /// contain, with `unbounded_substitute` standing in for `Max="*"`.
    pub fn max_segment_count(&self, unbounded_substitute: u32) -> u64 {
        self.top_level
            .iter()
            .map(|id| self.max_count_below(*id, unbounded_substitute))
            .sum()
    }

    fn max_count_below(&self, id: ProfileNodeId, substitute: u32) -> u64 {
        let node = self.node(id);
        if node.usage == Usage::X {
            return 0;
        }
        let repeats = u64::from(node.cardinality.max.or_substitute(substitute));
        match node.kind {
            NodeKind::Segment => repeats,
            NodeKind::SegmentGroup => {
                let inner: u64 = node
                    .children
                    .iter()
                    .map(|c| self.max_count_below(*c, substitute))
                    .sum();
                repeats.saturating_mul(inner)
            }
            NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => 0,
        }
    }

    /// Finds the profile node a location points at.
    ///
    /// Group steps are matched by name from the top level down. A location
    /// without groups matches its segment at any nesting depth, first
    /// definition first. Under [`Resolution::Strict`] a branch is rejected
    /// when its usage is `X` or when the location's instance number exceeds
    /// its `Max` (for ungrouped locations, the `Max` multiplied through the
    /// enclosing groups).
    pub fn resolve(&self, location: &MessageLocation, mode: Resolution) -> Option<ProfileNodeId> {
        let strict = mode == Resolution::Strict;
        let admits = |id: ProfileNodeId, instance: u32| {
            let node = self.node(id);
            !strict || (node.usage != Usage::X && node.cardinality.max.admits(instance))
        };

        let mut scope: Option<ProfileNodeId> = None;
        for (name, instance) in location.groups() {
            let group = self.children_of(scope).iter().copied().find(|c| {
                let node = self.node(*c);
                node.kind == NodeKind::SegmentGroup && node.name == *name && admits(*c, *instance)
            })?;
            scope = Some(group);
        }
        if location.segment().is_empty() {
            return scope;
        }

        let grouped = !location.groups().is_empty();
        let candidates: Vec<ProfileNodeId> = if grouped {
            self.children_of(scope)
                .iter()
                .copied()
                .filter(|c| {
                    let node = self.node(*c);
                    node.kind == NodeKind::Segment && node.name == location.segment()
                })
                .collect()
        } else {
            self.segment_definitions(location.segment())
        };

        candidates.into_iter().find_map(|segment| {
            let node = self.node(segment);
            if strict {
                let max = if grouped {
                    node.cardinality.max
                } else {
                    self.effective_max(segment)
                };
                let blocked = node.usage == Usage::X
                    || !max.admits(location.segment_instance())
                    || self
                        .ancestor_groups(segment)
                        .iter()
                        .any(|g| self.node(*g).usage == Usage::X);
                if blocked {
                    return None;
                }
            }
            self.resolve_below(segment, location, &admits)
        })
    }

    fn resolve_below(
        &self,
        segment: ProfileNodeId,
        location: &MessageLocation,
        admits: &dyn Fn(ProfileNodeId, u32) -> bool,
    ) -> Option<ProfileNodeId> {
        if location.field() == 0 {
            return Some(segment);
        }
        let field = self.child_at(segment, location.field())?;
        if !admits(field, location.field_instance()) {
            return None;
        }
        if location.component() == 0 {
            return Some(field);
        }
        let component = self.child_at(field, location.component())?;
        if !admits(component, 1) {
            return None;
        }
        if location.subcomponent() == 0 {
            return Some(component);
        }
        let subcomponent = self.child_at(component, location.subcomponent())?;
        admits(subcomponent, 1).then_some(subcomponent)
    }

    /// Names of `id` and its ancestors, for failure descriptions.
    pub fn element(&self, id: ProfileNodeId) -> ProfileElement {
        let mut element = ProfileElement {
            element_type: ElementType::from(self.node(id).kind),
            groups: Vec::new(),
            segment: String::new(),
            segment_long_name: String::new(),
            field: None,
            component: None,
            subcomponent: None,
        };
        let mut current = Some(id);
        while let Some(n) = current {
            let node = self.node(n);
            match node.kind {
                NodeKind::SegmentGroup => element.groups.insert(0, node.name.clone()),
                NodeKind::Segment => {
                    element.segment.clone_from(&node.name);
                    element.segment_long_name.clone_from(&node.long_name);
                }
                NodeKind::Field => element.field = Some((node.position, node.name.clone())),
                NodeKind::Component => {
                    element.component = Some((node.position, node.name.clone()));
                }
                NodeKind::SubComponent => {
                    element.subcomponent = Some((node.position, node.name.clone()));
                }
            }
            current = node.parent;
        }
        element
    }

    /// Label used in failure descriptions, e.g. `Field PID-3 (Patient Identifier List)`.
    pub fn describe(&self, id: ProfileNodeId) -> String {
        self.element(id).to_string()
    }
}

fn read_node(
    doc: &XmlDocument,
    element: XmlNodeId,
    kind: NodeKind,
    position: u32,
    parent: Option<ProfileNodeId>,
) -> Result<ProfileNode, ProfileError> {
    let local = doc.local_name(element).to_owned();
    let line = doc.bookmark(element).line;
    let attr = |name: &str| {
        doc.attribute(element, name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let number = |attribute: &'static str, value: &str| {
        value.parse::<u32>().map_err(|_| ProfileError::InvalidNumber {
            element: local.clone(),
            attribute,
            value: value.to_owned(),
            line,
        })
    };

    let name = attr("Name")
        .ok_or_else(|| ProfileError::MissingAttribute {
            element: local.clone(),
            attribute: "Name",
            line,
        })?
        .to_owned();
    if kind == NodeKind::Segment && !SEGMENT_ID_RE.is_match(&name) {
        return Err(ProfileError::InvalidSegmentName { name, line });
    }

    let usage_text = attr("Usage").ok_or_else(|| ProfileError::MissingAttribute {
        element: local.clone(),
        attribute: "Usage",
        line,
    })?;
    let usage = Usage::parse(usage_text).ok_or_else(|| ProfileError::InvalidUsage {
        element: local.clone(),
        value: usage_text.to_owned(),
        line,
    })?;

    // Components and subcomponents carry no Min/Max: they occur once, and
    // only R makes them mandatory.
    let default_min = u32::from(usage == Usage::R);
    let min = attr("Min").map(|v| number("Min", v)).transpose()?.unwrap_or(default_min);
    let max = match attr("Max") {
        None => MaxOccurs::Bounded(1),
        Some("*") => MaxOccurs::Unbounded,
        Some(v) => MaxOccurs::Bounded(number("Max", v)?),
    };
    let length = attr("Length").map(|v| number("Length", v)).transpose()?;

    Ok(ProfileNode {
        kind,
        name,
        long_name: attr("LongName").unwrap_or_default().to_owned(),
        usage,
        cardinality: Cardinality { min, max },
        position,
        datatype: attr("Datatype").map(str::to_owned),
        length,
        table: attr("Table").map(str::to_owned),
        constant_value: attr("ConstantValue").map(str::to_owned),
        parent,
        children: Vec::new(),
    })
}
