/// HL7 table library.
///
/// Loaded from the table-library XML format:
///
/// ```xml
/// <hl7tables>
///   <hl7table id="0001" name="Administrative Sex" type="User">
///     <tableElement code="F" displayName="Female"/>
///   </hl7table>
/// </hl7tables>
/// ```
///
/// `hl7table` elements are collected wherever they appear below the root,
/// so wrapper elements are tolerated.
use std::collections::BTreeMap;

use tracing::instrument;

use crate::xml::{TreeNavigator, XmlDocument, XmlError};

/// Errors raised while loading a table library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// The library is not well-formed XML.
    #[error("table library is not well-formed: {0}")]
    Xml(#[from] XmlError),
    /// An `hl7table` element has no `id`.
    #[error("hl7table at line {line} has no id")]
    MissingId {
        /// Source line.
        line: usize,
    },
    /// Two tables share an id.
    #[error("table {id} is defined twice (second definition at line {line})")]
    Duplicate {
        /// The repeated id.
        id: String,
        /// Line of the second definition.
        line: usize,
    },
}

/// One code of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCode {
    /// The code value.
    pub code: String,
    /// Display text, empty when absent.
    pub display_name: String,
}

/// One HL7 table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table id, e.g. `0001`.
    pub id: String,
    /// Table name, empty when absent.
    pub name: String,
    /// `type` attribute (`HL7`, `User`, ...), empty when absent.
    pub kind: String,
    /// Codes in document order.
    pub codes: Vec<TableCode>,
}

impl Table {
    /// Returns `true` if `value` equals one of the codes, ignoring case.
    pub fn contains(&self, value: &str) -> bool {
        self.codes.iter().any(|c| c.code.eq_ignore_ascii_case(value))
    }

    /// Returns `true` if the table declares no codes.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Outcome of a table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLookup<'a> {
    /// The table exists.
    Found(&'a Table),
    /// No table with that id.
    NotFound,
}

/// Tables by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLibrary {
    tables: BTreeMap<String, Table>,
}

impl TableLibrary {
    /// An empty library; every lookup returns [`TableLookup::NotFound`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a table-library document.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] for malformed XML, tables without id, or
    /// duplicate ids.
    #[instrument(level = "debug", skip(text), fields(bytes = text.len()))]
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let doc = XmlDocument::parse(text)?;
        let mut tables = BTreeMap::new();
        let root = doc.root();
        let candidates = std::iter::once(root).chain(doc.descendants(root));
        for node in candidates.filter(|n| doc.local_name(*n) == "hl7table") {
            let line = doc.bookmark(node).line;
            let id = doc
                .attribute(node, "id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(TableError::MissingId { line })?
                .to_owned();
            let codes = doc
                .children(node)
                .into_iter()
                .filter(|c| doc.local_name(*c) == "tableElement")
                .filter_map(|c| {
                    let code = doc.attribute(c, "code")?;
                    Some(TableCode {
                        code: code.to_owned(),
                        display_name: doc.attribute(c, "displayName").unwrap_or_default().to_owned(),
                    })
                })
                .collect();
            let table = Table {
                id: id.clone(),
                name: doc.attribute(node, "name").unwrap_or_default().to_owned(),
                kind: doc.attribute(node, "type").unwrap_or_default().to_owned(),
                codes,
            };
            if tables.insert(id.clone(), table).is_some() {
                return Err(TableError::Duplicate { id, line });
            }
        }
        tracing::debug!(tables = tables.len(), "table library loaded");
        Ok(Self { tables })
    }

    /// Adds or replaces a table.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.id.clone(), table);
    }

    /// Looks up a table by id.
    pub fn lookup(&self, id: &str) -> TableLookup<'_> {
        match self.tables.get(id) {
            Some(table) => TableLookup::Found(table),
            None => TableLookup::NotFound,
        }
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if the library holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
