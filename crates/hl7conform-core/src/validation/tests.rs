#![allow(clippy::expect_used)]

use super::*;
use crate::failure::Severity;
use crate::test_helpers::{CONFORMANT_ER7, MSH, adjacent_nte_profile, er7, sample_profile, sample_tables};

const CONFORMANT_XML: &str = r#"<?xml version="1.0"?>
<ADT_A01 xmlns="urn:hl7-org:v2xml">
  <MSH>
    <MSH.1>|</MSH.1>
    <MSH.2>^~\&amp;</MSH.2>
    <MSH.7>20240315120000</MSH.7>
    <MSH.9><MSG.1>ADT</MSG.1><MSG.2>A01</MSG.2><MSG.3>ADT_A01</MSG.3></MSH.9>
    <MSH.10>MSG0001</MSH.10>
    <MSH.11>P</MSH.11>
    <MSH.12><VID.1>2.5</VID.1></MSH.12>
  </MSH>
  <EVN><EVN.2>20240315120000</EVN.2></EVN>
  <PID><PID.3><CX.1>123</CX.1></PID.3><PID.5><XPN.1>DOE</XPN.1></PID.5><PID.8>F</PID.8></PID>
  <PV1><PV1.2>I</PV1.2></PV1>
</ADT_A01>
"#;

const ORU_MSH: &str = "MSH|^~\\&|SENDER||RECEIVER||20240315120000||ORU^R01^ORU_R01|MSG0002|P|2.5";

/// `OBX` appears both at the top level and as the first segment of `NOTES`;
/// `EVN` is not supported.
const SHARED_OBX: &str = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ORU" EventType="R01" MsgStructID="ORU_R01">
    <Segment Name="MSH" Usage="R" Min="1" Max="1"/>
    <Segment Name="EVN" Usage="X" Min="0" Max="0"/>
    <Segment Name="OBX" Usage="O" Min="0" Max="1"/>
    <SegGroup Name="NOTES" Usage="O" Min="0" Max="1">
      <Segment Name="OBX" Usage="R" Min="1" Max="1"/>
      <Segment Name="NTE" Usage="R" Min="1" Max="1"/>
    </SegGroup>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;

fn validator() -> Validator {
    Validator::new(sample_profile(), sample_tables(), ValidationContext::default())
}

fn kinds(result: &ValidationResult) -> Vec<FailureKind> {
    result.iter().map(|f| f.kind).collect()
}

fn problem_kinds(result: &ValidationResult) -> Vec<FailureKind> {
    result.problems().map(|f| f.kind).collect()
}

// ── pipeline ────────────────────────────────────────────────────────────────

#[test]
fn conformant_er7_passes_every_phase() {
    let v = validator();
    let result = v.validate(CONFORMANT_ER7).expect("readable");
    assert!(result.is_conformant(v.context()), "{:?}", problem_kinds(&result));
    assert_eq!(result.by_kind(FailureKind::Checked).count(), 3);
    assert!(result.by_kind(FailureKind::DataPassed).count() >= 2);
    assert!(!result.has_fatal());
}

#[test]
fn conformant_xml_passes_every_phase() {
    let v = validator();
    let result = v.validate(CONFORMANT_XML).expect("readable");
    assert!(result.problems().next().is_none(), "{:?}", problem_kinds(&result));
    assert_eq!(result.by_kind(FailureKind::Checked).count(), 3);
}

#[test]
fn header_mismatch_stops_after_basic_checks() {
    let text = er7(&[
        "MSH|^~\\&|||||||ADT^A01^ADT_A01|1|P|2.4",
        "EVN||20240315120000",
        "FOO|1",
    ]);
    let result = validator().validate(&text).expect("readable");
    assert_eq!(kinds(&result), [FailureKind::Version]);
    assert!(result.has_fatal());
}

#[test]
fn structure_failure_stops_before_element_walk() {
    let text = er7(&[
        MSH,
        "EVN||20240315120000",
        "PID|||123||DOE|||Q",
        "PV1||I",
        "IN1|1|PLAN",
        "PR1|1||P1",
    ]);
    let result = validator().validate(&text).expect("readable");
    let structure: Vec<&MessageFailure> = result.by_kind(FailureKind::MessageStructure).collect();
    assert_eq!(structure.len(), 1);
    assert_eq!(structure[0].severity, Severity::Fatal);
    assert_eq!(structure[0].location.line, 6);
    // PID-8 'Q' would be a DATA finding if the walk had run
    assert_eq!(result.by_kind(FailureKind::Data).count(), 0);
}

#[test]
fn element_findings_follow_structure_findings() {
    let text = er7(&[MSH, "EVN||20240315120000", "PID|||123||DOE|||Q", "PID|||456||ROE", "PV1||I"]);
    let result = validator().validate(&text).expect("readable");
    let problems = problem_kinds(&result);
    let cardinality = problems
        .iter()
        .position(|k| *k == FailureKind::Cardinality)
        .expect("second PID is reported");
    let data = problems
        .iter()
        .position(|k| *k == FailureKind::Data)
        .expect("PID-8 is reported");
    assert!(cardinality < data);
    assert!(!result.is_conformant(&ValidationContext::default()));
}

#[test]
fn xml_root_mismatch_is_fatal() {
    let text = CONFORMANT_XML.replace("ADT_A01 xmlns", "ADT_A04 xmlns").replace("</ADT_A01>", "</ADT_A04>");
    let result = validator().validate(&text).expect("readable");
    let structure: Vec<&MessageFailure> = result.by_kind(FailureKind::MessageStructure).collect();
    assert_eq!(structure.len(), 1);
    assert_eq!(structure[0].description, "Expected root element 'ADT_A01' instead of 'ADT_A04'");
    assert_eq!(structure[0].location.line, 2);
    assert_eq!(result.len(), 2);
}

#[test]
fn misordered_xml_hits_the_structure_gate() {
    let pid = "  <PID><PID.3><CX.1>123</CX.1></PID.3><PID.5><XPN.1>DOE</XPN.1></PID.5><PID.8>F</PID.8></PID>\n";
    let pv1 = "  <PV1><PV1.2>I</PV1.2></PV1>\n";
    let text = CONFORMANT_XML.replace(pid, "").replace(pv1, &format!("{pv1}{pid}"));
    let result = validator().validate(&text).expect("readable");
    let structure: Vec<&MessageFailure> = result.by_kind(FailureKind::MessageStructure).collect();
    assert_eq!(structure.len(), 1);
    assert!(structure[0].is_fatal());
    assert_eq!(
        structure[0].description,
        "Expected element(s) 'OBX', 'PR1', 'IN1' instead of 'PID'"
    );
    assert_eq!((structure[0].location.line, structure[0].location.column), (14, 3));
    assert_eq!(result.by_kind(FailureKind::Xtra).count(), 0);
    assert_eq!(result.by_kind(FailureKind::DataPassed).count(), 0);
}

#[test]
fn er7_and_xml_structure_findings_agree() {
    let er7_text = er7(&[MSH, "EVN||20240315120000", "PV1||I", "PID|||123||DOE|||F"]);
    let er7_result = validator().validate(&er7_text).expect("readable");
    let er7_structure = er7_result
        .by_kind(FailureKind::MessageStructure)
        .next()
        .expect("ER7 structure finding");
    assert_eq!(
        er7_structure.description,
        "Expected element(s) 'OBX', 'PR1', 'IN1' instead of 'PID'"
    );
    assert_eq!((er7_structure.location.line, er7_structure.location.column), (4, 1));
}

// ── mapping ─────────────────────────────────────────────────────────────────

#[test]
fn adjacent_same_name_definitions_accept_conformant_message() {
    let v = Validator::new(adjacent_nte_profile(), TableLibrary::new(), ValidationContext::default());
    let result = v.validate(&er7(&[MSH, "NTE|a", "NTE|b"])).expect("readable");
    let problems: Vec<String> = result
        .problems()
        .map(|f| format!("{} {}: {}", f.kind, f.location, f.description))
        .collect();
    assert!(problems.is_empty(), "{problems:?}");
    assert!(!result.has_fatal());
}

#[test]
fn er7_locations_inside_groups_carry_group_steps() {
    let text = er7(&[MSH, "EVN||20240315120000", "PID|||123||DOE", "PV1||I", "IN1|1|PLAN|X^Y"]);
    let result = validator().validate(&text).expect("readable");
    let extra = result
        .by_kind(FailureKind::Xtra)
        .next()
        .expect("IN1-3 is not declared");
    assert_eq!(extra.location.flat_path, "INSURANCE[1]/IN1[1].3[1]");
    assert_eq!(extra.location.tree_path, "/ADT_A01[1]/ADT_A01.INSURANCE[1]/IN1[1]/IN1.3[1]");
    assert_eq!((extra.location.line, extra.location.column), (5, 12));
}

#[test]
fn segment_instances_restart_per_group_instance() {
    let text = er7(&[
        MSH,
        "EVN||20240315120000",
        "PID|||123||DOE",
        "PV1||I",
        "IN1|1|PLAN",
        "IN1|2|PLAN|X",
    ]);
    let result = validator().validate(&text).expect("readable");
    let extra = result.by_kind(FailureKind::Xtra).next().expect("IN1-3 is not declared");
    assert_eq!(extra.location.flat_path, "INSURANCE[2]/IN1[1].3[1]");
    assert_eq!(extra.location.line, 6);
}

#[test]
fn rules_resolve_group_qualified_er7_locations() {
    let rules = RuleSet::from_json(
        r#"[{"location": "INSURANCE[2]/IN1[1].2[1]", "check": {"type": "value", "value": "GOLD"}}]"#,
    )
    .expect("valid rules");
    let v = validator().with_rules(rules);
    let text = er7(&[
        MSH,
        "EVN||20240315120000",
        "PID|||123||DOE",
        "PV1||I",
        "IN1|1|PLAN",
        "IN1|2|SILVER",
    ]);
    let result = v.validate(&text).expect("readable");
    let last = result.iter().last().expect("findings");
    assert_eq!(last.kind, FailureKind::Data);
    assert_eq!(last.element_content.as_deref(), Some("SILVER"));
    assert_eq!(last.location.line, 6);
}

#[test]
fn ambiguous_profile_skips_element_walk() {
    let profile = Profile::parse(SHARED_OBX).expect("valid profile");
    let v = Validator::new(profile, TableLibrary::new(), ValidationContext::default());
    let result = v.validate(&er7(&[ORU_MSH, "OBX|1|UNDECLARED"])).expect("readable");
    let ambiguous: Vec<&MessageFailure> = result.by_kind(FailureKind::AmbiguousProfile).collect();
    assert_eq!(ambiguous.len(), 1);
    assert!(ambiguous[0].is_fatal());
    assert!(ambiguous[0].description.contains("'OBX'"));
    assert_eq!(result.by_kind(FailureKind::Xtra).count(), 0);
}

#[test]
fn unattributed_segments_are_reported() {
    let profile = Profile::parse(SHARED_OBX).expect("valid profile");
    let v = Validator::new(profile, TableLibrary::new(), ValidationContext::default());
    let text = "<ORU_R01>\n\
        <MSH><MSH.9><MSG.1>ORU</MSG.1><MSG.2>R01</MSG.2><MSG.3>ORU_R01</MSG.3></MSH.9>\
        <MSH.12><VID.1>2.5</VID.1></MSH.12></MSH>\n\
        <EVN/>\n\
        <OBX/>\n\
        <OBX/>\n\
        <NTE/>\n\
        </ORU_R01>";
    let result = v.validate(text).expect("readable");
    // the unsupported EVN breaks the replay; OBX has no unique definition
    let unmapped: Vec<&MessageFailure> = result.by_kind(FailureKind::SegmentUnmapped).collect();
    assert_eq!(unmapped.len(), 2);
    assert_eq!(unmapped[0].element_content.as_deref(), Some("OBX"));
    assert_eq!(unmapped[0].location.flat_path, "OBX[1]");
    assert_eq!(unmapped[0].location.line, 4);
    assert_eq!(unmapped[1].location.flat_path, "OBX[2]");
    assert!(!unmapped[0].is_fatal());
}

// ── content checks ──────────────────────────────────────────────────────────

#[test]
fn rules_run_after_structural_phases() {
    let rules = RuleSet::from_json(
        r#"[{"location": "PID[1].8[1]", "check": {"type": "value", "value": "M"}, "comment": "ward"}]"#,
    )
    .expect("valid rules");
    let v = validator().with_rules(rules);
    let result = v.validate(CONFORMANT_ER7).expect("readable");
    let last = result.iter().last().expect("findings");
    assert_eq!(last.kind, FailureKind::Data);
    assert_eq!(last.assertion.as_deref(), Some("PID[1].8[1] equals 'M'"));
    assert_eq!(last.user_comment.as_deref(), Some("ward"));
}

struct CountSegments;

impl ContentCheck for CountSegments {
    fn name(&self) -> &str {
        "count"
    }

    fn check(&self, _profile: &Profile, message: &Message, out: &mut Vec<MessageFailure>) {
        if let Message::Er7(m) = message {
            out.push(MessageFailure::checked(format!("{} segments", m.segments().len())));
        }
    }
}

#[test]
fn custom_checks_run_in_registration_order() {
    let v = validator()
        .with_rules(RuleSet::default())
        .with_content_check(Arc::new(CountSegments));
    let result = v.validate(CONFORMANT_ER7).expect("readable");
    let last = result.iter().last().expect("findings");
    assert_eq!(last.description, "4 segments");
}

#[test]
fn content_checks_do_not_run_after_fatal_findings() {
    let v = validator().with_content_check(Arc::new(CountSegments));
    let result = v
        .validate(&er7(&["MSH|^~\\&|||||||ADT^A01^ADT_A01|1|P|2.4"]))
        .expect("readable");
    assert!(result.iter().all(|f| f.description != "1 segments"));
}

// ── errors ──────────────────────────────────────────────────────────────────

#[test]
fn unknown_encoding_is_an_error() {
    let err = validator().validate("PID|1").expect_err("not a message");
    assert!(matches!(err, ValidationError::Encoding(_)));
}

#[test]
fn malformed_xml_is_an_error() {
    let err = validator().validate("<ADT_A01><MSH>").expect_err("not well-formed");
    assert!(matches!(err, ValidationError::Message(_)));
}

#[test]
fn validator_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Validator>();
    let v = validator();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let v = v.clone();
            std::thread::spawn(move || v.validate(CONFORMANT_ER7).map(|r| r.len()))
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("thread").is_ok());
    }
}
