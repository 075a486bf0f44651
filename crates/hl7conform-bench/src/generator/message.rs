//! Conforming message instances and their ER7 and XML renderings.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;

use super::GeneratorConfig;
use super::profile::{
    COMPONENT_LENGTH, EVENT_TYPE, FieldSpec, FieldType, HL7_VERSION, MESSAGE_TYPE, ProfileSpec, STRUCTURE_ID,
    SegmentSpec, TopLevel,
};

/// Timestamp carried in MSH-7.
const MESSAGE_TIME: &str = "20240315120000";

/// One value of a field repetition.
#[derive(Debug, Clone)]
enum FieldValue {
    Primitive(String),
    /// Component values; an empty string is an absent component.
    Composite(Vec<String>),
}

/// One segment of the message.
#[derive(Debug, Clone)]
struct SegmentInstance {
    name: String,
    /// Repetitions per field position; empty when the field is absent.
    fields: Vec<Vec<FieldValue>>,
}

#[derive(Debug, Clone)]
enum Occurrence {
    Segment(SegmentInstance),
    /// One instance of a group.
    Group { name: String, segments: Vec<SegmentInstance> },
}

/// A message populated from a [`ProfileSpec`], encoding independent.
#[derive(Debug, Clone)]
pub struct MessageInstance {
    control_id: String,
    body: Vec<Occurrence>,
}

/// Populates a message that conforms to `spec`.
pub fn populate(spec: &ProfileSpec, config: &GeneratorConfig, rng: &mut StdRng) -> MessageInstance {
    let mut body = Vec::new();
    for element in &spec.elements {
        match element {
            TopLevel::Segment(segment) => {
                for _ in 0..occurrences(segment.required, segment.max, config, rng) {
                    body.push(Occurrence::Segment(segment_instance(spec, segment, config, rng)));
                }
            }
            TopLevel::Group(group) => {
                for _ in 0..occurrences(group.required, group.max, config, rng) {
                    let mut segments = Vec::new();
                    for member in &group.segments {
                        for _ in 0..occurrences(member.required, member.max, config, rng) {
                            segments.push(segment_instance(spec, member, config, rng));
                        }
                    }
                    body.push(Occurrence::Group {
                        name: group.name.clone(),
                        segments,
                    });
                }
            }
        }
    }
    MessageInstance {
        control_id: format!("BENCH{:08}", rng.gen_range(0..100_000_000u32)),
        body,
    }
}

/// How many times an element occurs: at least once when required, never
/// more than the profile allows or `config.max_repeats`.
fn occurrences(required: bool, max: Option<u32>, config: &GeneratorConfig, rng: &mut StdRng) -> u32 {
    if !required && !rng.gen_bool(config.fill_fraction) {
        return 0;
    }
    let bound = max.map_or(config.max_repeats, |m| m.min(config.max_repeats)).max(1);
    rng.gen_range(1..=bound)
}

fn segment_instance(
    spec: &ProfileSpec,
    segment: &SegmentSpec,
    config: &GeneratorConfig,
    rng: &mut StdRng,
) -> SegmentInstance {
    let fields = segment
        .fields
        .iter()
        .map(|field| {
            let count = occurrences(field.required, field.max, config, rng);
            (0..count).map(|_| field_value(spec, field, config, rng)).collect()
        })
        .collect();
    SegmentInstance {
        name: segment.name.clone(),
        fields,
    }
}

fn field_value(spec: &ProfileSpec, field: &FieldSpec, config: &GeneratorConfig, rng: &mut StdRng) -> FieldValue {
    match field.kind {
        FieldType::Text { length } => FieldValue::Primitive(text(rng, length)),
        FieldType::Numeric => FieldValue::Primitive(rng.gen_range(0..100_000u32).to_string()),
        FieldType::Timestamp => FieldValue::Primitive(format!(
            "2024{:02}{:02}{:02}{:02}{:02}",
            rng.gen_range(1..=12u8),
            rng.gen_range(1..=28u8),
            rng.gen_range(0..24u8),
            rng.gen_range(0..60u8),
            rng.gen_range(0..60u8)
        )),
        FieldType::Coded { table } => {
            let code = spec
                .tables
                .get(table)
                .and_then(|codes| codes.get(rng.gen_range(0..codes.len().max(1))))
                .cloned()
                .unwrap_or_default();
            FieldValue::Primitive(code)
        }
        FieldType::Composite { components, .. } => FieldValue::Composite(
            (0..components)
                .map(|c| {
                    if c == 0 || rng.gen_bool(config.fill_fraction) {
                        text(rng, COMPONENT_LENGTH)
                    } else {
                        String::new()
                    }
                })
                .collect(),
        ),
    }
}

/// Alphanumeric text of 1 to `max_len` (at most 12) characters.
fn text(rng: &mut StdRng, max_len: u32) -> String {
    let len = rng.gen_range(1..=max_len.clamp(1, 12));
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

impl MessageInstance {
    /// Number of segments, MSH included.
    pub fn segment_count(&self) -> usize {
        1 + self
            .body
            .iter()
            .map(|o| match o {
                Occurrence::Segment(_) => 1,
                Occurrence::Group { segments, .. } => segments.len(),
            })
            .sum::<usize>()
    }

    fn segments(&self) -> impl Iterator<Item = &SegmentInstance> {
        self.body.iter().flat_map(|o| match o {
            Occurrence::Segment(segment) => std::slice::from_ref(segment),
            Occurrence::Group { segments, .. } => segments.as_slice(),
        })
    }

    /// Renders the message in ER7 encoding with the default separators.
    pub fn to_er7(&self) -> String {
        let mut out = format!(
            "MSH|^~\\&|BENCH||||{MESSAGE_TIME}||{MESSAGE_TYPE}^{EVENT_TYPE}^{STRUCTURE_ID}|{}|P|{HL7_VERSION}\r",
            self.control_id
        );
        for segment in self.segments() {
            out.push_str(&segment.name);
            let last = segment.fields.iter().rposition(|reps| !reps.is_empty());
            let used = last.map_or(0, |i| i + 1);
            for reps in segment.fields.iter().take(used) {
                out.push('|');
                let rendered: Vec<String> = reps
                    .iter()
                    .map(|value| match value {
                        FieldValue::Primitive(v) => v.clone(),
                        FieldValue::Composite(components) => er7_components(components),
                    })
                    .collect();
                out.push_str(&rendered.join("~"));
            }
            out.push('\r');
        }
        out
    }

    /// Renders the message in XML encoding; group instances are wrapped in
    /// `STRUCTURE.GROUP` elements.
    pub fn to_xml(&self, spec: &ProfileSpec) -> String {
        let mut out = String::with_capacity(512 * self.segment_count());
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!("<{STRUCTURE_ID} xmlns=\"urn:hl7-org:v2xml\">\n"));
        out.push_str(&format!(
            "  <MSH>\n    <MSH.1>|</MSH.1>\n    <MSH.2>^~\\&amp;</MSH.2>\n    <MSH.3>BENCH</MSH.3>\n    \
             <MSH.7>{MESSAGE_TIME}</MSH.7>\n    \
             <MSH.9><MSG.1>{MESSAGE_TYPE}</MSG.1><MSG.2>{EVENT_TYPE}</MSG.2><MSG.3>{STRUCTURE_ID}</MSG.3></MSH.9>\n    \
             <MSH.10>{}</MSH.10>\n    <MSH.11>P</MSH.11>\n    <MSH.12><VID.1>{HL7_VERSION}</VID.1></MSH.12>\n  </MSH>\n",
            self.control_id
        ));
        for occurrence in &self.body {
            match occurrence {
                Occurrence::Segment(segment) => xml_segment(&mut out, spec, segment, "  "),
                Occurrence::Group { name, segments } => {
                    out.push_str(&format!("  <{STRUCTURE_ID}.{name}>\n"));
                    for segment in segments {
                        xml_segment(&mut out, spec, segment, "    ");
                    }
                    out.push_str(&format!("  </{STRUCTURE_ID}.{name}>\n"));
                }
            }
        }
        out.push_str(&format!("</{STRUCTURE_ID}>\n"));
        out
    }
}

fn er7_components(components: &[String]) -> String {
    let used = components
        .iter()
        .rposition(|c| !c.is_empty())
        .map_or(0, |i| i + 1);
    components
        .iter()
        .take(used)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("^")
}

fn xml_segment(out: &mut String, spec: &ProfileSpec, segment: &SegmentInstance, indent: &str) {
    let datatypes = composite_datatypes(spec, &segment.name);
    out.push_str(&format!("{indent}<{}>", segment.name));
    for (i, reps) in segment.fields.iter().enumerate() {
        let tag = format!("{}.{}", segment.name, i + 1);
        for value in reps {
            match value {
                FieldValue::Primitive(v) => out.push_str(&format!("<{tag}>{v}</{tag}>")),
                FieldValue::Composite(components) => {
                    let datatype = datatypes.get(i).copied().flatten().unwrap_or("CWE");
                    out.push_str(&format!("<{tag}>"));
                    for (c, v) in components.iter().enumerate() {
                        if !v.is_empty() {
                            out.push_str(&format!("<{datatype}.{n}>{v}</{datatype}.{n}>", n = c + 1));
                        }
                    }
                    out.push_str(&format!("</{tag}>"));
                }
            }
        }
    }
    out.push_str(&format!("</{}>\n", segment.name));
}

/// Composite datatype of every field of segment `name`, by position.
fn composite_datatypes<'a>(spec: &'a ProfileSpec, name: &str) -> Vec<Option<&'a str>> {
    let definition = spec.elements.iter().find_map(|e| match e {
        TopLevel::Segment(s) if s.name == name => Some(s),
        TopLevel::Segment(_) => None,
        TopLevel::Group(g) => g.segments.iter().find(|s| s.name == name),
    });
    definition.map_or_else(Vec::new, |s| {
        s.fields
            .iter()
            .map(|f| match f.kind {
                FieldType::Composite { datatype, .. } => Some(datatype),
                FieldType::Text { .. }
                | FieldType::Numeric
                | FieldType::Timestamp
                | FieldType::Coded { .. } => None,
            })
            .collect()
    })
}
