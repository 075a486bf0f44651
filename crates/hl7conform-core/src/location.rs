/// Message coordinates: [`MessageLocation`], [`ElementType`] and
/// [`ProfileElement`].
///
/// A [`MessageLocation`] addresses one element of a message (a segment
/// group, segment, field repetition, component or subcomponent) and renders
/// it in two coordinate systems:
///
/// - the flat path used for ER7 messages, `PID[1].3[2].1.4`, optionally
///   prefixed by group steps (`PROCEDURE[2]/PR1[1].3[1]`);
/// - the tree path used for XML messages,
///   `/ADT_A01[1]/ADT_A01.PROCEDURE[2]/PR1[1]/PR1.3[1]/CNE.1[1]`.
///
/// [`MessageLocation::parse`] and [`MessageLocation::to_flat_path`] are
/// mutual inverses once omitted instance numbers are filled in with `1`.
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::patterns::{FLAT_SEGMENT_RE, GROUP_STEP_RE};
use crate::profile::{NodeKind, Profile, Resolution};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced when parsing a flat location path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// The string does not match `SEG[n](.field[n](.component(.subcomponent)?)?)?`.
    #[error("invalid location {got:?}: expected SEG[n].field[n].component.subcomponent")]
    InvalidFormat {
        /// The rejected input.
        got: String,
    },
    /// A position or instance number is zero or does not fit in `u32`.
    #[error("invalid location {got:?}: positions and instances must be between 1 and {max}", max = u32::MAX)]
    OutOfRange {
        /// The rejected input.
        got: String,
    },
}

// ---------------------------------------------------------------------------
// ElementType
// ---------------------------------------------------------------------------

/// The kind of element a [`MessageLocation`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementType {
    /// A segment group.
    SegmentGroup,
    /// A segment.
    Segment,
    /// One repetition of a field.
    Field,
    /// A component of a field.
    Component,
    /// A subcomponent of a component.
    SubComponent,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentGroup => f.write_str("Segment Group"),
            Self::Segment => f.write_str("Segment"),
            Self::Field => f.write_str("Field"),
            Self::Component => f.write_str("Component"),
            Self::SubComponent => f.write_str("Sub-Component"),
        }
    }
}

impl From<NodeKind> for ElementType {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::SegmentGroup => Self::SegmentGroup,
            NodeKind::Segment => Self::Segment,
            NodeKind::Field => Self::Field,
            NodeKind::Component => Self::Component,
            NodeKind::SubComponent => Self::SubComponent,
        }
    }
}

// ---------------------------------------------------------------------------
// MessageLocation
// ---------------------------------------------------------------------------

/// An immutable coordinate of one message element.
///
/// Unset trailing positions are `0`. The segment name is empty only for
/// group-only locations. Equality, hashing and ordering are structural over
/// every part, including the group list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageLocation {
    groups: Vec<(String, u32)>,
    segment: String,
    segment_instance: u32,
    field: u32,
    field_instance: u32,
    component: u32,
    subcomponent: u32,
}

impl MessageLocation {
    /// Location of the `instance`-th occurrence of segment `name`.
    ///
    /// `name` must be a three-character segment code; callers pass codes
    /// taken from a parsed profile or message, which are validated there.
    pub fn for_segment(name: &str, instance: u32) -> Self {
        debug_assert!(name.len() == 3, "segment codes are three characters");
        Self {
            groups: Vec::new(),
            segment: name.to_owned(),
            segment_instance: instance.max(1),
            field: 0,
            field_instance: 0,
            component: 0,
            subcomponent: 0,
        }
    }

    /// Location of a segment group repetition, outermost group first.
    pub fn for_group(groups: Vec<(String, u32)>) -> Self {
        Self {
            groups,
            segment: String::new(),
            segment_instance: 0,
            field: 0,
            field_instance: 0,
            component: 0,
            subcomponent: 0,
        }
    }

    /// Returns a copy nested inside `groups` (outermost first).
    #[must_use]
    pub fn with_groups(mut self, groups: Vec<(String, u32)>) -> Self {
        self.groups = groups;
        self
    }

    /// Returns a copy pointing at repetition `instance` of field `position`.
    #[must_use]
    pub fn with_field(mut self, position: u32, instance: u32) -> Self {
        self.field = position;
        self.field_instance = instance.max(1);
        self.component = 0;
        self.subcomponent = 0;
        self
    }

    /// Returns a copy pointing at component `position` of the current field.
    #[must_use]
    pub fn with_component(mut self, position: u32) -> Self {
        self.component = position;
        self.subcomponent = 0;
        self
    }

    /// Returns a copy pointing at subcomponent `position` of the current component.
    #[must_use]
    pub fn with_subcomponent(mut self, position: u32) -> Self {
        self.subcomponent = position;
        self
    }

    /// Returns the location of the enclosing segment.
    #[must_use]
    pub fn segment_location(&self) -> Self {
        Self {
            field: 0,
            field_instance: 0,
            component: 0,
            subcomponent: 0,
            ..self.clone()
        }
    }

    /// Returns the location of the enclosing field repetition, or `self` if
    /// this location is not below a field.
    #[must_use]
    pub fn field_location(&self) -> Self {
        Self {
            component: 0,
            subcomponent: 0,
            ..self.clone()
        }
    }

    /// Returns the location of the enclosing component.
    #[must_use]
    pub fn component_location(&self) -> Self {
        Self {
            subcomponent: 0,
            ..self.clone()
        }
    }

    /// Group steps, outermost first.
    pub fn groups(&self) -> &[(String, u32)] {
        &self.groups
    }

    /// Three-character segment code (empty for group-only locations).
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// 1-based occurrence of the segment (0 for group-only locations).
    pub fn segment_instance(&self) -> u32 {
        self.segment_instance
    }

    /// 1-based field position, 0 when unset.
    pub fn field(&self) -> u32 {
        self.field
    }

    /// 1-based field repetition, 0 when unset.
    pub fn field_instance(&self) -> u32 {
        self.field_instance
    }

    /// 1-based component position, 0 when unset.
    pub fn component(&self) -> u32 {
        self.component
    }

    /// 1-based subcomponent position, 0 when unset.
    pub fn subcomponent(&self) -> u32 {
        self.subcomponent
    }

    /// Classifies by the deepest part that is set.
    pub fn element_type(&self) -> ElementType {
        if self.subcomponent > 0 {
            ElementType::SubComponent
        } else if self.component > 0 {
            ElementType::Component
        } else if self.field > 0 {
            ElementType::Field
        } else if !self.segment.is_empty() {
            ElementType::Segment
        } else {
            ElementType::SegmentGroup
        }
    }

    /// Parses a flat path.
    ///
    /// Accepts `SEG[n](.field[n](.component(.subcomponent)?)?)?`, optionally
    /// prefixed by `GROUP[n]/` steps. A group-only location is written with a
    /// trailing slash (`PROCEDURE[1]/`). Omitted instance numbers default to 1.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::InvalidFormat`] for malformed input and
    /// [`LocationError::OutOfRange`] for zero or overflowing numbers.
    pub fn parse(input: &str) -> Result<Self, LocationError> {
        let invalid = || LocationError::InvalidFormat {
            got: input.to_owned(),
        };
        let out_of_range = || LocationError::OutOfRange {
            got: input.to_owned(),
        };
        let number = |text: Option<regex::Match<'_>>| -> Result<u32, LocationError> {
            match text {
                None => Ok(1),
                Some(m) => match m.as_str().parse::<u32>() {
                    Ok(0) | Err(_) => Err(out_of_range()),
                    Ok(n) => Ok(n),
                },
            }
        };
        let optional = |text: Option<regex::Match<'_>>| -> Result<u32, LocationError> {
            if text.is_some() { number(text) } else { Ok(0) }
        };

        let mut steps: Vec<&str> = input.split('/').collect();
        let last = steps.pop().ok_or_else(invalid)?;

        let mut groups = Vec::with_capacity(steps.len());
        for step in steps {
            let caps = GROUP_STEP_RE.captures(step).ok_or_else(invalid)?;
            let name = caps.get(1).map(|m| m.as_str().to_owned()).ok_or_else(invalid)?;
            groups.push((name, number(caps.get(2))?));
        }

        if last.is_empty() {
            if groups.is_empty() {
                return Err(invalid());
            }
            return Ok(Self::for_group(groups));
        }

        let caps = FLAT_SEGMENT_RE.captures(last).ok_or_else(invalid)?;
        let segment = caps.get(1).map(|m| m.as_str()).ok_or_else(invalid)?;
        let segment_instance = number(caps.get(2))?;
        let field = optional(caps.get(3))?;
        let field_instance = if field > 0 { number(caps.get(4))? } else { 0 };
        let component = optional(caps.get(5))?;
        let subcomponent = optional(caps.get(6))?;

        Ok(Self {
            groups,
            segment: segment.to_owned(),
            segment_instance,
            field,
            field_instance,
            component,
            subcomponent,
        })
    }

    /// Renders the flat path, always spelling out instance numbers.
    pub fn to_flat_path(&self) -> String {
        let mut out = String::new();
        for (name, instance) in &self.groups {
            out.push_str(&format!("{name}[{instance}]/"));
        }
        if self.segment.is_empty() {
            return out;
        }
        out.push_str(&format!("{}[{}]", self.segment, self.segment_instance));
        if self.field == 0 {
            return out;
        }
        out.push_str(&format!(".{}[{}]", self.field, self.field_instance));
        if self.component == 0 {
            return out;
        }
        out.push_str(&format!(".{}", self.component));
        if self.subcomponent == 0 {
            return out;
        }
        out.push_str(&format!(".{}", self.subcomponent));
        out
    }

    /// Renders the positional tree path used by the XML encoding.
    ///
    /// Group element names are prefixed by the message structure id. When the
    /// location carries no groups, the groups enclosing the segment's first
    /// profile definition are inserted with instance 1. Component and
    /// subcomponent element names use the datatype of the enclosing field or
    /// component; when the profile does not declare one the step is rendered
    /// as `*[n]`.
    pub fn to_tree_path(&self, profile: &Profile) -> String {
        let structure = profile.header().structure_id.as_str();
        let mut out = format!("/{structure}[1]");

        if self.groups.is_empty() {
            let enclosing = profile
                .resolve(&self.segment_location(), Resolution::Lenient)
                .map(|segment| profile.ancestor_groups(segment))
                .unwrap_or_default();
            for group in enclosing {
                out.push_str(&format!("/{structure}.{}[1]", profile.node(group).name));
            }
        } else {
            for (name, instance) in &self.groups {
                out.push_str(&format!("/{structure}.{name}[{instance}]"));
            }
        }

        if self.segment.is_empty() {
            return out;
        }
        out.push_str(&format!("/{}[{}]", self.segment, self.segment_instance));
        if self.field == 0 {
            return out;
        }
        out.push_str(&format!("/{}.{}[{}]", self.segment, self.field, self.field_instance));
        if self.component == 0 {
            return out;
        }
        let datatype_of = |location: &Self| {
            profile
                .resolve(location, Resolution::Lenient)
                .and_then(|id| profile.node(id).datatype.clone())
        };
        match datatype_of(&self.field_location()) {
            Some(dt) => out.push_str(&format!("/{dt}.{}[1]", self.component)),
            None => out.push_str(&format!("/*[{}]", self.component)),
        }
        if self.subcomponent == 0 {
            return out;
        }
        match datatype_of(&self.component_location()) {
            Some(dt) => out.push_str(&format!("/{dt}.{}[1]", self.subcomponent)),
            None => out.push_str(&format!("/*[{}]", self.subcomponent)),
        }
        out
    }

    /// Returns `true` if the profile declares this location with a usage other
    /// than `X` and a cardinality that admits every instance number on the
    /// way down.
    pub fn exists_in_profile(&self, profile: &Profile) -> bool {
        profile.resolve(self, Resolution::Strict).is_some()
    }

    /// Returns `true` if the location exists and names a leaf (a field,
    /// component or subcomponent without declared children).
    pub fn is_primitive(&self, profile: &Profile) -> bool {
        profile
            .resolve(self, Resolution::Strict)
            .is_some_and(|id| {
                let node = profile.node(id);
                !matches!(node.kind, NodeKind::SegmentGroup | NodeKind::Segment)
                    && node.children.is_empty()
            })
    }
}

impl fmt::Display for MessageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_flat_path())
    }
}

impl TryFrom<&str> for MessageLocation {
    type Error = LocationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl Serialize for MessageLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_flat_path())
    }
}

impl<'de> Deserialize<'de> for MessageLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// ProfileElement
// ---------------------------------------------------------------------------

/// Human-readable names of a located element, resolved against a profile.
///
/// The [`fmt::Display`] rendering is the label used in failure descriptions,
/// e.g. `Field PID-3 (Patient Identifier List)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileElement {
    /// Kind of the named element.
    pub element_type: ElementType,
    /// Enclosing group names, outermost first.
    pub groups: Vec<String>,
    /// Segment code.
    pub segment: String,
    /// Segment long name.
    pub segment_long_name: String,
    /// Field position and name.
    pub field: Option<(u32, String)>,
    /// Component position and name.
    pub component: Option<(u32, String)>,
    /// Subcomponent position and name.
    pub subcomponent: Option<(u32, String)>,
}

impl fmt::Display for ProfileElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element_type {
            ElementType::SegmentGroup => {
                let group = self.groups.last().map(String::as_str).unwrap_or_default();
                write!(f, "Segment Group {group}")
            }
            ElementType::Segment => {
                write!(f, "Segment {}", self.segment)?;
                write_long_name(f, &self.segment_long_name)
            }
            ElementType::Field => {
                let (pos, name) = self.field.clone().unwrap_or_default();
                write!(f, "Field {}-{pos}", self.segment)?;
                write_long_name(f, &name)
            }
            ElementType::Component => {
                let (fpos, _) = self.field.clone().unwrap_or_default();
                let (pos, name) = self.component.clone().unwrap_or_default();
                write!(f, "Component {}-{fpos}.{pos}", self.segment)?;
                write_long_name(f, &name)
            }
            ElementType::SubComponent => {
                let (fpos, _) = self.field.clone().unwrap_or_default();
                let (cpos, _) = self.component.clone().unwrap_or_default();
                let (pos, name) = self.subcomponent.clone().unwrap_or_default();
                write!(f, "Sub-Component {}-{fpos}.{cpos}.{pos}", self.segment)?;
                write_long_name(f, &name)
            }
        }
    }
}

fn write_long_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if name.is_empty() {
        Ok(())
    } else {
        write!(f, " ({name})")
    }
}
