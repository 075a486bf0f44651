//! Synthetic profile definitions and their XML renderings.
//!
//! Segment codes are unique across the whole profile, so the state machine
//! built from a generated profile never has an ambiguous transition.

use rand::Rng;
use rand::rngs::StdRng;

use super::GeneratorConfig;

/// Message type of every generated profile.
pub const MESSAGE_TYPE: &str = "SYN";
/// Trigger event of every generated profile.
pub const EVENT_TYPE: &str = "S01";
/// Message structure of every generated profile.
pub const STRUCTURE_ID: &str = "SYN_S01";
/// HL7 version of every generated profile.
pub const HL7_VERSION: &str = "2.5";

/// Composite datatypes without a format check.
const COMPOSITE_TYPES: &[&str] = &["CWE", "CX", "HD", "XAD", "XPN"];

/// Header segment definition shared by every generated profile.
const MSH_DEFINITION: &str = r#"    <Segment Name="MSH" LongName="Message Header" Usage="R" Min="1" Max="1">
      <Field Name="Field Separator" Usage="R" Min="1" Max="1" Datatype="ST" Length="1"/>
      <Field Name="Encoding Characters" Usage="R" Min="1" Max="1" Datatype="ST" Length="4"/>
      <Field Name="Sending Application" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Sending Facility" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Receiving Application" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Receiving Facility" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Date/Time Of Message" Usage="R" Min="1" Max="1" Datatype="TS" Length="26"/>
      <Field Name="Security" Usage="X" Min="0" Max="0" Datatype="ST" Length="40"/>
      <Field Name="Message Type" Usage="R" Min="1" Max="1" Datatype="MSG" Length="15">
        <Component Name="Message Code" Usage="R" Datatype="ID" Length="3"/>
        <Component Name="Trigger Event" Usage="R" Datatype="ID" Length="3"/>
        <Component Name="Message Structure" Usage="R" Datatype="ID" Length="7"/>
      </Field>
      <Field Name="Message Control ID" Usage="R" Min="1" Max="1" Datatype="ST" Length="20"/>
      <Field Name="Processing ID" Usage="R" Min="1" Max="1" Datatype="PT" Length="3"/>
      <Field Name="Version ID" Usage="R" Min="1" Max="1" Datatype="VID" Length="60">
        <Component Name="Version ID" Usage="R" Datatype="ID" Length="5"/>
      </Field>
    </Segment>
"#;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Value domain of a generated field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// `ST` with a maximum length.
    Text { length: u32 },
    /// `NM`.
    Numeric,
    /// `TS`.
    Timestamp,
    /// `ID` bound to a generated table.
    Coded { table: usize },
    /// A composite of `ST` components, the first one required.
    Composite { datatype: &'static str, components: usize },
}

impl FieldType {
    fn datatype(&self) -> &'static str {
        match self {
            FieldType::Text { .. } => "ST",
            FieldType::Numeric => "NM",
            FieldType::Timestamp => "TS",
            FieldType::Coded { .. } => "ID",
            FieldType::Composite { datatype, .. } => *datatype,
        }
    }
}

/// Length of every composite component.
pub const COMPONENT_LENGTH: u32 = 20;

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// `true` for `R`, `false` for `O`.
    pub required: bool,
    /// Upper repetition bound; `None` for `*`.
    pub max: Option<u32>,
    /// Value domain.
    pub kind: FieldType,
}

/// A segment definition.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    /// Three character segment code.
    pub name: String,
    /// `true` for `R`, `false` for `O`.
    pub required: bool,
    /// Upper repetition bound; `None` for `*`.
    pub max: Option<u32>,
    /// Fields by position, starting at 1.
    pub fields: Vec<FieldSpec>,
}

/// A segment group definition; its first segment is always required.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// Group name.
    pub name: String,
    /// `true` for `R`, `false` for `O`.
    pub required: bool,
    /// Upper repetition bound; `None` for `*`.
    pub max: Option<u32>,
    /// Member segments in order.
    pub segments: Vec<SegmentSpec>,
}

/// A top-level element after MSH.
#[derive(Debug, Clone)]
pub enum TopLevel {
    /// A segment.
    Segment(SegmentSpec),
    /// A segment group.
    Group(GroupSpec),
}

/// A whole generated profile.
#[derive(Debug, Clone)]
pub struct ProfileSpec {
    /// Elements after MSH, in order.
    pub elements: Vec<TopLevel>,
    /// Codes of every generated table, by table number.
    pub tables: Vec<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Hands out unique segment codes (`A00`, `A01`, ..., `B00`, ...).
struct SegmentNames {
    next: usize,
}

impl SegmentNames {
    fn next(&mut self) -> String {
        let i = self.next;
        self.next += 1;
        // 25 letters, so no generated code starts with Z
        let letter = char::from(b'A' + u8::try_from((i / 100) % 25).unwrap_or(0));
        format!("{letter}{:02}", i % 100)
    }
}

impl ProfileSpec {
    /// Generates a profile definition; top-level segments and groups are
    /// interleaved.
    pub fn generate(config: &GeneratorConfig, rng: &mut StdRng) -> Self {
        let mut spec = ProfileSpec {
            elements: Vec::with_capacity(config.num_segments + config.num_groups),
            tables: Vec::new(),
        };
        let mut names = SegmentNames { next: 0 };

        let mut segments_left = config.num_segments;
        let mut groups_left = config.num_groups;
        while segments_left + groups_left > 0 {
            let pick_group = groups_left > 0
                && (segments_left == 0 || rng.gen_range(0..segments_left + groups_left) < groups_left);
            if pick_group {
                let index = config.num_groups - groups_left;
                let group = spec.group(config, rng, &mut names, index);
                spec.elements.push(TopLevel::Group(group));
                groups_left -= 1;
            } else {
                let segment = spec.segment(config, rng, &mut names, None);
                spec.elements.push(TopLevel::Segment(segment));
                segments_left -= 1;
            }
        }
        spec
    }

    fn group(
        &mut self,
        config: &GeneratorConfig,
        rng: &mut StdRng,
        names: &mut SegmentNames,
        index: usize,
    ) -> GroupSpec {
        let size = config.group_size.max(1);
        let mut segments = Vec::with_capacity(size);
        for position in 0..size {
            let leader = position == 0;
            segments.push(self.segment(config, rng, names, leader.then_some(true)));
        }
        GroupSpec {
            name: format!("GROUP_{}", index + 1),
            required: rng.gen_bool(0.3),
            max: repetition_bound(config, rng),
            segments,
        }
    }

    /// `required` forces a single required segment.
    fn segment(
        &mut self,
        config: &GeneratorConfig,
        rng: &mut StdRng,
        names: &mut SegmentNames,
        required: Option<bool>,
    ) -> SegmentSpec {
        let fields = (0..config.fields_per_segment)
            .map(|_| self.field(config, rng))
            .collect();
        let (required, max) = match required {
            Some(required) => (required, Some(1)),
            None => (rng.gen_bool(0.5), repetition_bound(config, rng)),
        };
        SegmentSpec {
            name: names.next(),
            required,
            max,
            fields,
        }
    }

    fn field(&mut self, config: &GeneratorConfig, rng: &mut StdRng) -> FieldSpec {
        let kind = if rng.gen_bool(config.composite_fraction) {
            FieldType::Composite {
                datatype: COMPOSITE_TYPES
                    .get(rng.gen_range(0..COMPOSITE_TYPES.len()))
                    .copied()
                    .unwrap_or("CWE"),
                components: config.components_per_field.max(1),
            }
        } else if rng.gen_bool(config.coded_fraction) {
            FieldType::Coded {
                table: self.new_table(config),
            }
        } else {
            match rng.gen_range(0..4) {
                0 => FieldType::Numeric,
                1 => FieldType::Timestamp,
                _ => FieldType::Text {
                    length: rng.gen_range(8..=40),
                },
            }
        };
        FieldSpec {
            required: rng.gen_bool(0.4),
            max: repetition_bound(config, rng),
            kind,
        }
    }

    fn new_table(&mut self, config: &GeneratorConfig) -> usize {
        let index = self.tables.len();
        let codes = (0..config.table_size.max(1))
            .map(|k| format!("C{index}_{k}"))
            .collect();
        self.tables.push(codes);
        index
    }

    /// Table identifier of table `index`.
    pub fn table_id(index: usize) -> String {
        format!("9{index:03}")
    }

    /// Number of segment definitions, MSH included.
    pub fn segment_definition_count(&self) -> usize {
        1 + self
            .elements
            .iter()
            .map(|e| match e {
                TopLevel::Segment(_) => 1,
                TopLevel::Group(g) => g.segments.len(),
            })
            .sum::<usize>()
    }

    // ── rendering ───────────────────────────────────────────────────────────

    /// Renders the conformance profile XML.
    pub fn to_profile_xml(&self) -> String {
        let mut out = String::with_capacity(256 * self.segment_definition_count());
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<HL7v2xConformanceProfile HL7Version=\"{HL7_VERSION}\" ProfileType=\"Implementation\" Identifier=\"generated\">\n"
        ));
        out.push_str("  <MetaData Name=\"Generated profile\" OrgName=\"hl7conform-bench\"/>\n");
        out.push_str(&format!(
            "  <HL7v2xStaticDef MsgType=\"{MESSAGE_TYPE}\" EventType=\"{EVENT_TYPE}\" MsgStructID=\"{STRUCTURE_ID}\">\n"
        ));
        out.push_str(MSH_DEFINITION);
        for element in &self.elements {
            match element {
                TopLevel::Segment(segment) => write_segment(&mut out, segment, "    "),
                TopLevel::Group(group) => {
                    out.push_str(&format!(
                        "    <SegGroup Name=\"{}\" {}>\n",
                        group.name,
                        occurrence_attrs(group.required, group.max)
                    ));
                    for segment in &group.segments {
                        write_segment(&mut out, segment, "      ");
                    }
                    out.push_str("    </SegGroup>\n");
                }
            }
        }
        out.push_str("  </HL7v2xStaticDef>\n</HL7v2xConformanceProfile>\n");
        out
    }

    /// Renders the table library XML.
    pub fn to_tables_xml(&self) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<Specification SpecName=\"generated\" HL7Version=\"{HL7_VERSION}\">\n"
        ));
        out.push_str("  <hl7tables>\n");
        for (index, codes) in self.tables.iter().enumerate() {
            let id = Self::table_id(index);
            out.push_str(&format!(
                "    <hl7table id=\"{id}\" name=\"Table {id}\" type=\"User\">\n"
            ));
            for (order, code) in codes.iter().enumerate() {
                out.push_str(&format!(
                    "      <tableElement order=\"{}\" code=\"{code}\" displayName=\"Code {code}\" source=\"User\"/>\n",
                    order + 1
                ));
            }
            out.push_str("    </hl7table>\n");
        }
        out.push_str("  </hl7tables>\n</Specification>\n");
        out
    }
}

fn write_segment(out: &mut String, segment: &SegmentSpec, indent: &str) {
    out.push_str(&format!(
        "{indent}<Segment Name=\"{}\" {}>\n",
        segment.name,
        occurrence_attrs(segment.required, segment.max)
    ));
    for (i, field) in segment.fields.iter().enumerate() {
        let (length, table) = match field.kind {
            FieldType::Text { length } => (length, String::new()),
            FieldType::Numeric => (16, String::new()),
            FieldType::Timestamp => (26, String::new()),
            FieldType::Coded { table } => {
                (20, format!(" Table=\"{}\"", ProfileSpec::table_id(table)))
            }
            FieldType::Composite { components, .. } => (
                (COMPONENT_LENGTH + 1) * u32::try_from(components).unwrap_or(1),
                String::new(),
            ),
        };
        let open = format!(
            "{indent}  <Field Name=\"{} field {}\" {} Datatype=\"{}\" Length=\"{length}\"{table}",
            segment.name,
            i + 1,
            occurrence_attrs(field.required, field.max),
            field.kind.datatype(),
        );
        match field.kind {
            FieldType::Composite { components, .. } => {
                out.push_str(&open);
                out.push_str(">\n");
                for c in 0..components {
                    out.push_str(&format!(
                        "{indent}    <Component Name=\"Component {}\" Usage=\"{}\" Datatype=\"ST\" Length=\"{COMPONENT_LENGTH}\"/>\n",
                        c + 1,
                        usage(c == 0)
                    ));
                }
                out.push_str(&format!("{indent}  </Field>\n"));
            }
            FieldType::Text { .. }
            | FieldType::Numeric
            | FieldType::Timestamp
            | FieldType::Coded { .. } => {
                out.push_str(&open);
                out.push_str("/>\n");
            }
        }
    }
    out.push_str(&format!("{indent}</Segment>\n"));
}

/// `Usage`, `Min` and `Max` attributes.
fn occurrence_attrs(required: bool, max: Option<u32>) -> String {
    let max = max.map_or_else(|| "*".to_owned(), |m| m.to_string());
    format!(
        "Usage=\"{}\" Min=\"{}\" Max=\"{max}\"",
        usage(required),
        u8::from(required)
    )
}

fn repetition_bound(config: &GeneratorConfig, rng: &mut StdRng) -> Option<u32> {
    if !rng.gen_bool(config.repeat_fraction) {
        Some(1)
    } else if rng.gen_bool(0.5) {
        None
    } else {
        Some(config.max_repeats.max(2))
    }
}

fn usage(required: bool) -> &'static str {
    if required { "R" } else { "O" }
}
