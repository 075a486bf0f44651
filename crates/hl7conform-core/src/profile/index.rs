/// Name tables keyed by structural path.
///
/// The index answers one question: what is the human-readable name of the
/// element at a given location? It is built in a single pass over the
/// profile and is never consulted for validation decisions.
///
/// Keys are structural paths without instance numbers: `/MSH`,
/// `/PROCEDURE/PR1`, `/ORDER/OBSERVATION/OBX`.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::location::{ElementType, MessageLocation, ProfileElement};
use crate::profile::{NodeKind, Profile, ProfileNodeId};

/// Subcomponent names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PSubComponent {
    /// Descriptive name.
    pub name: String,
}

/// Component names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PComponent {
    /// Descriptive name.
    pub name: String,
    /// Subcomponents by position.
    pub subcomponents: Vec<PSubComponent>,
}

/// Field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PField {
    /// Descriptive name.
    pub name: String,
    /// Components by position.
    pub components: Vec<PComponent>,
}

/// Names of one segment definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PSegment {
    /// Three-character code.
    pub name: String,
    /// Long name.
    pub long_name: String,
    /// Fields by position.
    pub fields: Vec<PField>,
}

impl PSegment {
    fn field(&self, position: u32) -> Option<&PField> {
        self.fields.get(index_of(position)?)
    }
}

fn index_of(position: u32) -> Option<usize> {
    usize::try_from(position).ok()?.checked_sub(1)
}

/// Structural path → segment name tables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileIndex {
    segments: BTreeMap<String, Vec<PSegment>>,
    paths_by_name: BTreeMap<String, Vec<String>>,
}

impl ProfileIndex {
    /// Builds the index from every segment definition of `profile`.
    pub fn build(profile: &Profile) -> Self {
        let mut index = Self::default();
        for id in profile.segments() {
            let path = structural_path(profile, id);
            let segment = segment_names(profile, id);
            let paths = index.paths_by_name.entry(segment.name.clone()).or_default();
            if !paths.contains(&path) {
                paths.push(path.clone());
            }
            index.segments.entry(path).or_default().push(segment);
        }
        index
    }

    /// Every structural path in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.segments.keys().map(String::as_str)
    }

    /// Segment definitions registered under `path`.
    pub fn segments_at(&self, path: &str) -> &[PSegment] {
        self.segments.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the names of the element at `location`.
    ///
    /// When the location carries groups only the definitions at that exact
    /// structural path are candidates; otherwise every definition of the
    /// segment is. If several candidates exist they must agree on every name
    /// down to the requested depth, otherwise the result is `None` and the
    /// caller must not guess.
    pub fn names_for(&self, location: &MessageLocation) -> Option<ProfileElement> {
        let groups: Vec<String> = location.groups().iter().map(|(g, _)| g.clone()).collect();
        if location.segment().is_empty() {
            return (!groups.is_empty()).then(|| ProfileElement {
                element_type: ElementType::SegmentGroup,
                groups,
                segment: String::new(),
                segment_long_name: String::new(),
                field: None,
                component: None,
                subcomponent: None,
            });
        }

        let candidates: Vec<&PSegment> = if groups.is_empty() {
            self.paths_by_name
                .get(location.segment())?
                .iter()
                .flat_map(|p| self.segments_at(p))
                .collect()
        } else {
            let mut path = String::new();
            for group in &groups {
                path.push('/');
                path.push_str(group);
            }
            path.push('/');
            path.push_str(location.segment());
            self.segments_at(&path).iter().collect()
        };

        let mut resolved = candidates
            .into_iter()
            .map(|segment| element_for(segment, location, &groups));
        let first = resolved.next()??;
        for other in resolved {
            if other.as_ref() != Some(&first) {
                return None;
            }
        }
        Some(first)
    }
}

fn element_for(
    segment: &PSegment,
    location: &MessageLocation,
    groups: &[String],
) -> Option<ProfileElement> {
    let mut element = ProfileElement {
        element_type: location.element_type(),
        groups: groups.to_vec(),
        segment: segment.name.clone(),
        segment_long_name: segment.long_name.clone(),
        field: None,
        component: None,
        subcomponent: None,
    };
    if location.field() == 0 {
        return Some(element);
    }
    let field = segment.field(location.field())?;
    element.field = Some((location.field(), field.name.clone()));
    if location.component() == 0 {
        return Some(element);
    }
    let component = field.components.get(index_of(location.component())?)?;
    element.component = Some((location.component(), component.name.clone()));
    if location.subcomponent() == 0 {
        return Some(element);
    }
    let sub = component.subcomponents.get(index_of(location.subcomponent())?)?;
    element.subcomponent = Some((location.subcomponent(), sub.name.clone()));
    Some(element)
}

/// `/GROUP/GROUP/SEG` for a segment definition.
pub fn structural_path(profile: &Profile, segment: ProfileNodeId) -> String {
    let mut path = String::new();
    for group in profile.ancestor_groups(segment) {
        path.push('/');
        path.push_str(&profile.node(group).name);
    }
    path.push('/');
    path.push_str(&profile.node(segment).name);
    path
}

fn segment_names(profile: &Profile, id: ProfileNodeId) -> PSegment {
    let node = profile.node(id);
    let names_of = |parent: ProfileNodeId, kind: NodeKind| -> Vec<(ProfileNodeId, String)> {
        profile
            .node(parent)
            .children
            .iter()
            .filter(|c| profile.node(**c).kind == kind)
            .map(|c| (*c, profile.node(*c).name.clone()))
            .collect()
    };
    let fields = names_of(id, NodeKind::Field)
        .into_iter()
        .map(|(field, name)| PField {
            name,
            components: names_of(field, NodeKind::Component)
                .into_iter()
                .map(|(component, name)| PComponent {
                    name,
                    subcomponents: names_of(component, NodeKind::SubComponent)
                        .into_iter()
                        .map(|(_, name)| PSubComponent { name })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    PSegment {
        name: node.name.clone(),
        long_name: node.long_name.clone(),
        fields,
    }
}
