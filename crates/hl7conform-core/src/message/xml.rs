/// XML-encoded messages.
///
/// The root element's local name is the message structure id
/// (`ADT_A01`). Segment groups are elements named `{structure}.{GROUP}`;
/// segments are elements with a three-character name; fields are
/// `{SEG}.{n}`; components and subcomponents are `{DATATYPE}.{n}`.
use crate::location::MessageLocation;
use crate::message::{MessageError, MessageHeader};
use crate::patterns::SEGMENT_ID_RE;
use crate::xml::{TreeNavigator, XmlDocument, XmlNodeId};

/// A parsed XML-encoded message.
#[derive(Debug, Clone)]
pub struct XmlMessage {
    doc: XmlDocument,
    msh: XmlNodeId,
}

impl XmlMessage {
    /// Parses the document and locates the MSH element.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::Xml`] for malformed XML and
    /// [`MessageError::MissingXmlHeader`] when no MSH element is present.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let doc = XmlDocument::parse(text)?;
        let msh = doc
            .child_named(doc.root(), "MSH")
            .ok_or(MessageError::MissingXmlHeader)?;
        Ok(Self { doc, msh })
    }

    /// The underlying document.
    pub fn document(&self) -> &XmlDocument {
        &self.doc
    }

    /// Local name of the root element.
    pub fn structure_name(&self) -> &str {
        self.doc.local_name(self.doc.root())
    }

    /// Segment elements in document order, `Z` segments included.
    pub fn segments(&self) -> Vec<XmlNodeId> {
        segment_sequence(&self.doc)
    }

    /// The element at `location`.
    ///
    /// Group steps are followed when present; otherwise the segment
    /// instance counts occurrences across the whole message, as for ER7.
    pub fn element_at(&self, location: &MessageLocation) -> Option<XmlNodeId> {
        let doc = &self.doc;
        let mut scope = doc.root();
        for (group, instance) in location.groups() {
            let name = format!("{}.{group}", self.structure_name());
            scope = nth_named(doc, scope, &name, *instance)?;
        }
        if location.segment().is_empty() {
            return Some(scope);
        }
        let segment = if location.groups().is_empty() {
            let index = usize::try_from(location.segment_instance()).ok()?.checked_sub(1)?;
            self.segments()
                .into_iter()
                .filter(|s| doc.local_name(*s) == location.segment())
                .nth(index)?
        } else {
            nth_named(doc, scope, location.segment(), location.segment_instance())?
        };
        if location.field() == 0 {
            return Some(segment);
        }
        let field_name = format!("{}.{}", location.segment(), location.field());
        let field = nth_named(doc, segment, &field_name, location.field_instance())?;
        if location.component() == 0 {
            return Some(field);
        }
        let component = child_with_suffix(doc, field, location.component())?;
        if location.subcomponent() == 0 {
            return Some(component);
        }
        child_with_suffix(doc, component, location.subcomponent())
    }

    /// Trimmed text at `location`; see [`XmlMessage::element_at`].
    pub fn value_at(&self, location: &MessageLocation) -> Option<&str> {
        self.element_at(location).map(|node| self.doc.text(node).trim())
    }

    fn header_component(&self, field: &str, suffix: &str) -> Option<&str> {
        let field = self.doc.child_named(self.msh, field)?;
        let component = self
            .doc
            .children(field)
            .into_iter()
            .find(|c| self.doc.local_name(*c).ends_with(suffix))?;
        Some(self.doc.text(component).trim()).filter(|v| !v.is_empty())
    }
}

impl MessageHeader for XmlMessage {
    fn version(&self) -> Option<&str> {
        self.header_component("MSH.12", ".1").or_else(|| {
            let field = self.doc.child_named(self.msh, "MSH.12")?;
            Some(self.doc.text(field).trim()).filter(|v| !v.is_empty())
        })
    }

    fn message_type(&self) -> Option<&str> {
        self.header_component("MSH.9", ".1")
    }

    fn trigger_event(&self) -> Option<&str> {
        self.header_component("MSH.9", ".2")
    }

    fn structure_id(&self) -> Option<&str> {
        self.header_component("MSH.9", ".3")
    }
}

/// Returns `true` if `name` is a group element name for `structure`.
pub fn is_group_name(name: &str, structure: &str) -> bool {
    name.strip_prefix(structure)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|group| !group.is_empty())
}

/// Returns `true` if `name` is a segment element name.
pub fn is_segment_name(name: &str) -> bool {
    SEGMENT_ID_RE.is_match(name)
}

/// Segment elements of a message tree in document order.
///
/// Group elements are descended into; anything that is neither a group nor
/// a segment is skipped together with its subtree.
pub fn segment_sequence<T: TreeNavigator>(tree: &T) -> Vec<T::Node> {
    let root = tree.root();
    let structure = tree.local_name(root).to_owned();
    let mut out = Vec::new();
    collect_segments(tree, root, &structure, &mut out);
    out
}

fn nth_named(doc: &XmlDocument, parent: XmlNodeId, name: &str, instance: u32) -> Option<XmlNodeId> {
    let index = usize::try_from(instance).ok()?.checked_sub(1)?;
    doc.children(parent)
        .into_iter()
        .filter(|c| doc.local_name(*c) == name)
        .nth(index)
}

fn child_with_suffix(doc: &XmlDocument, parent: XmlNodeId, position: u32) -> Option<XmlNodeId> {
    let suffix = format!(".{position}");
    doc.children(parent)
        .into_iter()
        .find(|c| doc.local_name(*c).ends_with(&suffix))
}

fn collect_segments<T: TreeNavigator>(
    tree: &T,
    parent: T::Node,
    structure: &str,
    out: &mut Vec<T::Node>,
) {
    let mut next = tree.first_child(parent);
    while let Some(child) = next {
        let name = tree.local_name(child);
        if is_segment_name(name) {
            out.push(child);
        } else if is_group_name(name, structure) {
            collect_segments(tree, child, structure, out);
        }
        next = tree.next_sibling(child);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    const MESSAGE: &str = r#"<?xml version="1.0"?>
<ADT_A01 xmlns="urn:hl7-org:v2xml">
  <MSH>
    <MSH.1>|</MSH.1>
    <MSH.2>^~\&amp;</MSH.2>
    <MSH.9><MSG.1>ADT</MSG.1><MSG.2>A01</MSG.2><MSG.3>ADT_A01</MSG.3></MSH.9>
    <MSH.12><VID.1>2.5</VID.1></MSH.12>
  </MSH>
  <PID><PID.3><CX.1>123</CX.1></PID.3></PID>
  <ZPI><ZPI.1>x</ZPI.1></ZPI>
  <ADT_A01.PROCEDURE>
    <PR1><PR1.1>1</PR1.1></PR1>
  </ADT_A01.PROCEDURE>
</ADT_A01>"#;

    #[test]
    fn header_values_from_components() {
        let msg = XmlMessage::parse(MESSAGE).expect("valid");
        assert_eq!(msg.structure_name(), "ADT_A01");
        assert_eq!(msg.version(), Some("2.5"));
        assert_eq!(msg.message_type(), Some("ADT"));
        assert_eq!(msg.trigger_event(), Some("A01"));
        assert_eq!(msg.structure_id(), Some("ADT_A01"));
    }

    #[test]
    fn version_from_plain_text() {
        let msg = XmlMessage::parse("<ACK><MSH><MSH.12>2.3.1</MSH.12></MSH></ACK>").expect("valid");
        assert_eq!(msg.version(), Some("2.3.1"));
        assert_eq!(msg.trigger_event(), None);
    }

    #[test]
    fn segments_descend_into_groups() {
        let msg = XmlMessage::parse(MESSAGE).expect("valid");
        let names: Vec<&str> = msg
            .segments()
            .into_iter()
            .map(|n| msg.document().local_name(n))
            .collect();
        assert_eq!(names, ["MSH", "PID", "ZPI", "PR1"]);
    }

    #[test]
    fn values_by_location() {
        let msg = XmlMessage::parse(MESSAGE).expect("valid");
        let at = |s: &str| msg.value_at(&MessageLocation::parse(s).expect("location"));
        assert_eq!(at("PID[1].3[1].1"), Some("123"));
        assert_eq!(at("MSH[1].9[1].2"), Some("A01"));
        assert_eq!(at("PROCEDURE[1]/PR1[1].1[1]"), Some("1"));
        assert_eq!(at("PR1[1].1[1]"), Some("1"));
        assert_eq!(at("PID[2]"), None);
    }

    #[test]
    fn missing_msh_is_an_error() {
        let err = XmlMessage::parse("<ADT_A01><PID/></ADT_A01>").expect_err("no MSH");
        assert_eq!(err, MessageError::MissingXmlHeader);
    }

    #[test]
    fn group_names() {
        assert!(is_group_name("ADT_A01.PROCEDURE", "ADT_A01"));
        assert!(!is_group_name("ADT_A01.", "ADT_A01"));
        assert!(!is_group_name("PID.3", "ADT_A01"));
    }
}
