/// Arena-backed XML element tree with source positions.
///
/// Both conformance profiles and XML-encoded messages are read into an
/// [`XmlDocument`]: every element becomes an [`XmlElement`] stored in a flat
/// `Vec` and addressed by [`XmlNodeId`]. Each element keeps the line and
/// column of its opening `<`, so failures found later can point back into the
/// original text.
///
/// Validation code never touches the concrete tree directly; it navigates
/// through the [`TreeNavigator`] trait (first child, next sibling, parent,
/// attribute, bookmark), which is the only capability the structural
/// algorithms need.
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

/// Index of an element inside an [`XmlDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XmlNodeId(usize);

impl XmlNodeId {
    /// Returns the zero-based arena index of this element.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A 1-based line/column pair pointing into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TextPosition {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

/// Errors raised while building an [`XmlDocument`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    /// The underlying reader rejected the input.
    #[error("malformed XML at line {line}, column {column}: {detail}")]
    Malformed {
        /// Line of the offending construct.
        line: usize,
        /// Column of the offending construct.
        column: usize,
        /// Reader error message.
        detail: String,
    },
    /// The input contains no element at all.
    #[error("XML document has no root element")]
    NoRoot,
    /// The input ended while elements were still open.
    #[error("XML document ends inside element <{name}>")]
    Unclosed {
        /// Name of the innermost open element.
        name: String,
    },
}

/// One element of an [`XmlDocument`].
#[derive(Debug, Clone)]
pub struct XmlElement {
    name: String,
    local_name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNodeId>,
    parent: Option<XmlNodeId>,
    index_in_parent: usize,
    position: TextPosition,
}

impl XmlElement {
    /// Qualified element name as written in the source (`v2:PID`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element name without namespace prefix (`PID`).
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Concatenated direct text content, entities resolved.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Child elements in document order.
    pub fn children(&self) -> &[XmlNodeId] {
        &self.children
    }

    /// Position of the element's opening tag.
    pub fn position(&self) -> TextPosition {
        self.position
    }
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    elements: Vec<XmlElement>,
    root: XmlNodeId,
}

impl XmlDocument {
    /// Parses `text` into an element tree.
    ///
    /// Comments, processing instructions and the XML declaration are
    /// dropped. Character and predefined entity references are resolved into
    /// the element text.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError`] if the text is not well-formed or has no root.
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(text);
        let mut tracker = LineTracker::new(text);
        let mut elements: Vec<XmlElement> = Vec::new();
        let mut stack: Vec<XmlNodeId> = Vec::new();
        let mut root: Option<XmlNodeId> = None;

        loop {
            let offset = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
            let position = tracker.advance_to(tag_start(text.as_bytes(), offset));
            let malformed = |detail: String| XmlError::Malformed {
                line: position.line,
                column: position.column,
                detail,
            };

            let event = reader.read_event().map_err(|e| malformed(e.to_string()))?;
            match event {
                Event::Start(start) => {
                    let id = push_element(&mut elements, &stack, &start, position)
                        .map_err(malformed)?;
                    if stack.is_empty() {
                        claim_root(&mut root, id).map_err(malformed)?;
                    }
                    stack.push(id);
                }
                Event::Empty(start) => {
                    let id = push_element(&mut elements, &stack, &start, position)
                        .map_err(malformed)?;
                    if stack.is_empty() {
                        claim_root(&mut root, id).map_err(malformed)?;
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(t) => {
                    if let Some(current) = stack.last() {
                        elements[current.0].text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Event::CData(c) => {
                    if let Some(current) = stack.last() {
                        elements[current.0].text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::GeneralRef(r) => {
                    let name = String::from_utf8_lossy(&r).into_owned();
                    let resolved = resolve_reference(&name)
                        .ok_or_else(|| malformed(format!("unknown entity reference &{name};")))?;
                    if let Some(current) = stack.last() {
                        elements[current.0].text.push_str(&resolved);
                    }
                }
                Event::Eof => break,
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Unclosed {
                name: elements[open.0].name.clone(),
            });
        }
        let root = root.ok_or(XmlError::NoRoot)?;
        Ok(Self { elements, root })
    }

    /// Returns the element stored at `id`.
    ///
    /// Ids are only ever handed out by this document, so the lookup cannot
    /// miss for an id obtained from it.
    pub fn element(&self, id: XmlNodeId) -> &XmlElement {
        &self.elements[id.0]
    }

    /// Returns the number of elements in the document.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the document has no elements (never the case for a
    /// successfully parsed document).
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns all elements below `id` in document order, excluding `id`.
    pub fn descendants(&self, id: XmlNodeId) -> Vec<XmlNodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<XmlNodeId> = self.element(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.element(next).children.iter().rev().copied());
        }
        out
    }

    /// Returns the first child of `id` whose local name is `local`.
    pub fn child_named(&self, id: XmlNodeId, local: &str) -> Option<XmlNodeId> {
        self.element(id)
            .children
            .iter()
            .copied()
            .find(|c| self.element(*c).local_name == local)
    }

    /// Follows a chain of local names starting below the root.
    ///
    /// `select(&["HL7v2xStaticDef"])` returns the static definition element of a
    /// profile. An empty path selects the root.
    pub fn select(&self, path: &[&str]) -> Option<XmlNodeId> {
        path.iter()
            .try_fold(self.root, |current, step| self.child_named(current, step))
    }
}

impl TreeNavigator for XmlDocument {
    type Node = XmlNodeId;

    fn root(&self) -> XmlNodeId {
        self.root
    }

    fn first_child(&self, node: XmlNodeId) -> Option<XmlNodeId> {
        self.element(node).children.first().copied()
    }

    fn next_sibling(&self, node: XmlNodeId) -> Option<XmlNodeId> {
        let element = self.element(node);
        let parent = element.parent?;
        self.element(parent)
            .children
            .get(element.index_in_parent + 1)
            .copied()
    }

    fn parent(&self, node: XmlNodeId) -> Option<XmlNodeId> {
        self.element(node).parent
    }

    fn local_name(&self, node: XmlNodeId) -> &str {
        &self.element(node).local_name
    }

    fn attribute(&self, node: XmlNodeId, name: &str) -> Option<&str> {
        self.element(node)
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn text(&self, node: XmlNodeId) -> &str {
        &self.element(node).text
    }

    fn bookmark(&self, node: XmlNodeId) -> TextPosition {
        self.element(node).position
    }

    fn children(&self, node: XmlNodeId) -> Vec<XmlNodeId> {
        self.element(node).children.clone()
    }
}

/// Minimal navigation capability over an XML-like tree.
///
/// The structural algorithms (FSM replay over XML messages, the synchronized
/// XML walk) are written against this trait so they do not depend on the
/// concrete tree representation.
pub trait TreeNavigator {
    /// Handle type identifying one element.
    type Node: Copy + Eq + std::hash::Hash;

    /// The document element.
    fn root(&self) -> Self::Node;

    /// First child element of `node`.
    fn first_child(&self, node: Self::Node) -> Option<Self::Node>;

    /// Next sibling element of `node`.
    fn next_sibling(&self, node: Self::Node) -> Option<Self::Node>;

    /// Parent element of `node`, `None` for the root.
    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Element name without namespace prefix.
    fn local_name(&self, node: Self::Node) -> &str;

    /// Attribute value by local name.
    fn attribute(&self, node: Self::Node, name: &str) -> Option<&str>;

    /// Direct text content.
    fn text(&self, node: Self::Node) -> &str;

    /// Source position of the element.
    fn bookmark(&self, node: Self::Node) -> TextPosition;

    /// Child elements in document order.
    fn children(&self, node: Self::Node) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut next = self.first_child(node);
        while let Some(child) = next {
            out.push(child);
            next = self.next_sibling(child);
        }
        out
    }

    /// Number of preceding siblings sharing `node`'s local name, plus one.
    fn same_name_index(&self, node: Self::Node) -> usize {
        let Some(parent) = self.parent(node) else {
            return 1;
        };
        let name = self.local_name(node);
        let mut index = 1;
        for sibling in self.children(parent) {
            if sibling == node {
                break;
            }
            if self.local_name(sibling) == name {
                index += 1;
            }
        }
        index
    }

    /// Positional path such as `/ADT_A01[1]/PID[1]/PID.3[2]`.
    fn positional_path(&self, node: Self::Node) -> String {
        let mut steps = Vec::new();
        let mut current = Some(node);
        while let Some(n) = current {
            steps.push(format!("{}[{}]", self.local_name(n), self.same_name_index(n)));
            current = self.parent(n);
        }
        steps.reverse();
        let mut path = String::new();
        for step in steps {
            path.push('/');
            path.push_str(&step);
        }
        path
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Converts byte offsets from the reader into 1-based line/column pairs.
struct LineTracker<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> LineTracker<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance_to(&mut self, offset: usize) -> TextPosition {
        let target = offset.min(self.bytes.len());
        if target > self.offset {
            for &byte in &self.bytes[self.offset..target] {
                if byte == b'\n' {
                    self.line += 1;
                    self.column = 1;
                } else if byte & 0xC0 != 0x80 {
                    // count characters, not UTF-8 continuation bytes
                    self.column += 1;
                }
            }
            self.offset = target;
        }
        TextPosition {
            line: self.line,
            column: self.column,
        }
    }
}

/// Backs up onto the `<` when the reader has already consumed it.
fn tag_start(bytes: &[u8], offset: usize) -> usize {
    match offset.checked_sub(1).and_then(|prev| bytes.get(prev)) {
        Some(b'<') if bytes.get(offset) != Some(&b'<') => offset - 1,
        _ => offset,
    }
}

fn push_element(
    elements: &mut Vec<XmlElement>,
    stack: &[XmlNodeId],
    start: &BytesStart<'_>,
    position: TextPosition,
) -> Result<XmlNodeId, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let local_name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        attributes.push((key, value));
    }

    let id = XmlNodeId(elements.len());
    let parent = stack.last().copied();
    let index_in_parent = match parent {
        Some(p) => {
            let siblings = &mut elements[p.0].children;
            siblings.push(id);
            siblings.len() - 1
        }
        None => 0,
    };
    elements.push(XmlElement {
        name,
        local_name,
        attributes,
        text: String::new(),
        children: Vec::new(),
        parent,
        index_in_parent,
        position,
    });
    Ok(id)
}

fn claim_root(root: &mut Option<XmlNodeId>, id: XmlNodeId) -> Result<(), String> {
    if root.is_some() {
        return Err("document has more than one root element".to_owned());
    }
    *root = Some(id);
    Ok(())
}

/// Resolves `name` from a `&name;` reference: predefined entities and
/// decimal/hex character references.
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_owned)
}
