/// Pipe-delimited (ER7) messages.
///
/// Segment terminators `\r`, `\n` and `\r\n` are all accepted. Line numbers
/// count physical lines from 1; blank lines are skipped but still counted,
/// so every reported line number points at the original text.
use crate::location::MessageLocation;
use crate::message::{MessageError, MessageHeader, Separators};
use crate::patterns::SEGMENT_ID_RE;

/// One segment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Er7Segment {
    /// Three-character segment id.
    pub name: String,
    /// 1-based physical line number.
    pub line: usize,
    /// The full line without terminator.
    pub text: String,
}

/// One field of a segment line with its starting column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlice<'a> {
    /// 1-based field position (MSH-1 is the field separator itself).
    pub position: u32,
    /// Raw field text, repetitions included.
    pub value: &'a str,
    /// 1-based column of the first character.
    pub column: usize,
}

impl Er7Segment {
    /// Returns `true` for locally defined `Z` segments.
    pub fn is_z_segment(&self) -> bool {
        self.name.starts_with('Z')
    }

    /// Splits the line into fields.
    ///
    /// For MSH the field separator itself is field 1 and the encoding
    /// characters are field 2; for every other segment field `n` is the
    /// `n`-th value after the segment id.
    pub fn fields(&self, separators: &Separators) -> Vec<FieldSlice<'_>> {
        let mut out = Vec::new();
        let mut column = 1usize;
        let mut parts = self.text.split(separators.field);
        // segment id
        if let Some(id) = parts.next() {
            column += id.chars().count() + 1;
        }
        let mut position = 1u32;
        if self.name == "MSH" {
            let sep_len = separators.field.len_utf8();
            out.push(FieldSlice {
                position: 1,
                value: self.text.get(3..3 + sep_len).unwrap_or_default(),
                column: column - 1,
            });
            position = 2;
        }
        for part in parts {
            out.push(FieldSlice {
                position,
                value: part,
                column,
            });
            column += part.chars().count() + 1;
            position += 1;
        }
        out
    }

    /// Raw text of field `position`, `None` when the line is shorter.
    pub fn field(&self, separators: &Separators, position: u32) -> Option<&str> {
        self.fields(separators)
            .into_iter()
            .find(|f| f.position == position)
            .map(|f| f.value)
    }
}

/// A parsed ER7 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Er7Message {
    segments: Vec<Er7Segment>,
    separators: Separators,
    /// Group-qualified segment locations by line, once placed.
    placements: Vec<(usize, MessageLocation)>,
}

impl Er7Message {
    /// Splits `text` into segments and reads the separators from MSH.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError`] when the text is empty, does not start with
    /// MSH, declares no separators, or contains a line that does not begin
    /// with a segment id.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let lines: Vec<(usize, &str)> = normalized
            .split('\n')
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end_matches([' ', '\t'])))
            .filter(|(_, l)| !l.trim().is_empty())
            .collect();

        let (header_line, header) = *lines.first().ok_or(MessageError::Empty)?;
        let header = header.trim_start_matches('\u{feff}');
        if !header.starts_with("MSH") {
            return Err(MessageError::NoHeader {
                line: header_line,
                found: header.chars().take(3).collect(),
            });
        }
        let separators = read_separators(header)
            .ok_or(MessageError::MalformedHeader { line: header_line })?;

        let mut segments = Vec::with_capacity(lines.len());
        for (index, (line, content)) in lines.iter().enumerate() {
            let content = if index == 0 { header } else { *content };
            let id: String = content.chars().take(3).collect();
            let well_formed = SEGMENT_ID_RE.is_match(&id)
                && content[id.len()..]
                    .chars()
                    .next()
                    .is_none_or(|c| c == separators.field);
            if !well_formed {
                return Err(MessageError::InvalidSegment {
                    line: *line,
                    found: content.chars().take(8).collect(),
                });
            }
            segments.push(Er7Segment {
                name: id,
                line: *line,
                text: content.to_owned(),
            });
        }
        Ok(Self {
            segments,
            separators,
            placements: Vec::new(),
        })
    }

    /// The separators declared in MSH-1/MSH-2.
    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    /// All segments in order.
    pub fn segments(&self) -> &[Er7Segment] {
        &self.segments
    }

    /// Segments that are not `Z` segments, in order.
    pub fn standard_segments(&self) -> impl Iterator<Item = &Er7Segment> {
        self.segments.iter().filter(|s| !s.is_z_segment())
    }

    /// The MSH segment.
    pub fn header_segment(&self) -> Option<&Er7Segment> {
        self.segments.first().filter(|s| s.name == "MSH")
    }

    /// The `instance`-th occurrence (1-based) of segment `name`.
    pub fn occurrence(&self, name: &str, instance: u32) -> Option<&Er7Segment> {
        let index = usize::try_from(instance).ok()?.checked_sub(1)?;
        self.segments.iter().filter(|s| s.name == name).nth(index)
    }

    /// Records the group-qualified location of each segment, keyed by line.
    ///
    /// The ER7 encoding carries no group boundaries; they come from mapping
    /// the segments onto a profile (see
    /// [`SegmentMapping::locations`](crate::fsm::SegmentMapping::locations)).
    pub fn place(&mut self, locations: impl IntoIterator<Item = (usize, MessageLocation)>) {
        self.placements = locations.into_iter().collect();
    }

    /// The recorded location of the segment on `line`.
    pub fn placement(&self, line: usize) -> Option<&MessageLocation> {
        self.placements
            .iter()
            .find(|(l, _)| *l == line)
            .map(|(_, location)| location)
    }

    /// The segment `location` points into.
    ///
    /// Group steps are followed through the recorded placements. Without
    /// group steps the segment instance counts occurrences of the code
    /// across the whole message.
    pub fn segment_at(&self, location: &MessageLocation) -> Option<&Er7Segment> {
        if location.groups().is_empty() {
            return self.occurrence(location.segment(), location.segment_instance());
        }
        let wanted = location.segment_location();
        let (line, _) = self.placements.iter().find(|(_, placed)| *placed == wanted)?;
        self.segments.iter().find(|s| s.line == *line)
    }

    /// Text at `location`; see [`Er7Message::segment_at`].
    ///
    /// Returns `None` when the message is too short to contain the location;
    /// an empty string when the element exists but is empty.
    pub fn value_at(&self, location: &MessageLocation) -> Option<&str> {
        let segment = self.segment_at(location)?;
        if location.field() == 0 {
            return Some(&segment.text);
        }
        let field = segment.field(&self.separators, location.field())?;
        let is_msh_literal = segment.name == "MSH" && location.field() <= 2;
        let repetition = if is_msh_literal {
            (location.field_instance() == 1).then_some(field)?
        } else {
            nth_part(field, self.separators.repetition, location.field_instance())?
        };
        if location.component() == 0 || is_msh_literal {
            return (location.component() == 0).then_some(repetition);
        }
        let component = nth_part(repetition, self.separators.component, location.component())?;
        if location.subcomponent() == 0 {
            return Some(component);
        }
        nth_part(component, self.separators.subcomponent, location.subcomponent())
    }

    fn header_component(&self, field: u32, component: u32) -> Option<&str> {
        let msh = self.header_segment()?;
        let value = msh.field(&self.separators, field)?;
        let first = value.split(self.separators.repetition).next()?;
        nth_part(first, self.separators.component, component).filter(|v| !v.is_empty())
    }
}

impl MessageHeader for Er7Message {
    fn version(&self) -> Option<&str> {
        self.header_component(12, 1)
    }

    fn message_type(&self) -> Option<&str> {
        self.header_component(9, 1)
    }

    fn trigger_event(&self) -> Option<&str> {
        self.header_component(9, 2)
    }

    fn structure_id(&self) -> Option<&str> {
        self.header_component(9, 3)
    }
}

/// The `n`-th (1-based) piece of `text` split on `separator`.
fn nth_part(text: &str, separator: char, n: u32) -> Option<&str> {
    let index = usize::try_from(n).ok()?.checked_sub(1)?;
    text.split(separator).nth(index)
}

fn read_separators(header: &str) -> Option<Separators> {
    let mut chars = header.chars().skip(3);
    let field = chars.next()?;
    let encoding: Vec<char> = chars.take_while(|c| *c != field).collect();
    let defaults = Separators::default();
    let pick = |i: usize, default: char| encoding.get(i).copied().unwrap_or(default);
    if encoding.is_empty() {
        return None;
    }
    Some(Separators {
        field,
        component: pick(0, defaults.component),
        repetition: pick(1, defaults.repetition),
        escape: pick(2, defaults.escape),
        subcomponent: pick(3, defaults.subcomponent),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::test_helpers::{CONFORMANT_ER7, location};

    fn sample() -> Er7Message {
        Er7Message::parse(CONFORMANT_ER7).expect("valid message")
    }

    // ── parsing ──────────────────────────────────────────────────────────────

    #[test]
    fn splits_on_carriage_returns() {
        let msg = sample();
        let names: Vec<&str> = msg.segments().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["MSH", "EVN", "PID", "PV1"]);
        assert_eq!(msg.segments()[2].line, 3);
    }

    #[test]
    fn mixed_terminators_and_blank_lines_keep_line_numbers() {
        let msg = Er7Message::parse("MSH|^~\\&|A\r\n\r\nEVN||x\nPID|1\r").expect("valid");
        let lines: Vec<usize> = msg.segments().iter().map(|s| s.line).collect();
        assert_eq!(lines, [1, 3, 4]);
    }

    #[test]
    fn custom_separators_are_read_from_msh() {
        let msg = Er7Message::parse("MSH#$*!@#A").expect("valid");
        let sep = msg.separators();
        assert_eq!(sep.field, '#');
        assert_eq!(sep.component, '$');
        assert_eq!(sep.repetition, '*');
        assert_eq!(sep.escape, '!');
        assert_eq!(sep.subcomponent, '@');
    }

    #[test]
    fn rejects_missing_msh() {
        let err = Er7Message::parse("PID|1\r").expect_err("no MSH");
        assert!(matches!(err, MessageError::NoHeader { line: 1, .. }));
        assert_eq!(Er7Message::parse("\r\n").expect_err("empty"), MessageError::Empty);
    }

    #[test]
    fn rejects_garbage_lines() {
        let err = Er7Message::parse("MSH|^~\\&|A\rhello world\r").expect_err("garbage");
        assert!(matches!(err, MessageError::InvalidSegment { line: 2, .. }));
    }

    // ── fields ───────────────────────────────────────────────────────────────

    #[test]
    fn msh_fields_are_offset_by_one() {
        let msg = sample();
        let msh = &msg.segments()[0];
        let sep = msg.separators();
        assert_eq!(msh.field(sep, 1), Some("|"));
        assert_eq!(msh.field(sep, 2), Some("^~\\&"));
        assert_eq!(msh.field(sep, 3), Some("SENDER"));
        assert_eq!(msh.field(sep, 9), Some("ADT^A01^ADT_A01"));
    }

    #[test]
    fn field_columns_are_cumulative() {
        let msg = sample();
        let sep = msg.separators();
        let fields = msg.segments()[2].fields(sep);
        // PID|||123^^^HOSP^MR
        assert_eq!(fields[0].column, 5);
        assert_eq!(fields[2].position, 3);
        assert_eq!(fields[2].column, 7);
        let msh = msg.segments()[0].fields(sep);
        assert_eq!(msh[0].column, 4);
        assert_eq!(msh[1].column, 5);
        assert_eq!(msh[2].column, 10);
    }

    // ── header ───────────────────────────────────────────────────────────────

    #[test]
    fn header_values() {
        let msg = sample();
        assert_eq!(msg.version(), Some("2.5"));
        assert_eq!(msg.message_type(), Some("ADT"));
        assert_eq!(msg.trigger_event(), Some("A01"));
        assert_eq!(msg.structure_id(), Some("ADT_A01"));
    }

    #[test]
    fn missing_header_components_are_none() {
        let msg = Er7Message::parse("MSH|^~\\&|||||||ACK|1|P|2.3.1").expect("valid");
        assert_eq!(msg.message_type(), Some("ACK"));
        assert_eq!(msg.trigger_event(), None);
        assert_eq!(msg.structure_id(), None);
        assert_eq!(msg.version(), Some("2.3.1"));
    }

    // ── value lookup ─────────────────────────────────────────────────────────

    #[test]
    fn value_at_descends_to_subcomponents() {
        let msg = sample();
        assert_eq!(msg.value_at(&location("PID[1].3[1]")), Some("123^^^HOSP^MR"));
        assert_eq!(msg.value_at(&location("PID[1].3[1].1")), Some("123"));
        assert_eq!(msg.value_at(&location("PID[1].3[1].4.1")), Some("HOSP"));
        assert_eq!(msg.value_at(&location("PID[1].5[1].2")), Some("JOHN"));
        assert_eq!(msg.value_at(&location("PID[1].3[2]")), None);
        assert_eq!(msg.value_at(&location("PID[2]")), None);
    }

    #[test]
    fn value_at_msh_literals() {
        let msg = sample();
        assert_eq!(msg.value_at(&location("MSH[1].1[1]")), Some("|"));
        assert_eq!(msg.value_at(&location("MSH[1].2[1]")), Some("^~\\&"));
        assert_eq!(msg.value_at(&location("MSH[1].2[1].1")), None);
        assert_eq!(msg.value_at(&location("MSH[1].9[1].3")), Some("ADT_A01"));
    }

    #[test]
    fn value_at_follows_recorded_group_steps() {
        let text = "MSH|^~\\&|||||||ADT^A01^ADT_A01|1|P|2.5\rIN1|1|A\rIN1|2|B\r";
        let mut msg = Er7Message::parse(text).expect("valid");
        assert_eq!(msg.value_at(&location("INSURANCE[2]/IN1[1].2[1]")), None);
        msg.place([
            (1, location("MSH[1]")),
            (2, location("INSURANCE[1]/IN1[1]")),
            (3, location("INSURANCE[2]/IN1[1]")),
        ]);
        assert_eq!(msg.value_at(&location("INSURANCE[2]/IN1[1].2[1]")), Some("B"));
        assert_eq!(msg.value_at(&location("INSURANCE[3]/IN1[1]")), None);
        // without group steps the code is counted across the message
        assert_eq!(msg.value_at(&location("IN1[2].2[1]")), Some("B"));
        assert_eq!(msg.placement(3), Some(&location("INSURANCE[2]/IN1[1]")));
    }
}
