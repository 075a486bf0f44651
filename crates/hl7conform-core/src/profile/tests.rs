#![allow(clippy::expect_used)]

use super::*;
use crate::test_helpers::{location, sample_profile};

// ── classification ───────────────────────────────────────────────────────────

#[test]
fn classifies_v2_profile() {
    let doc = XmlDocument::parse(crate::test_helpers::SAMPLE_PROFILE).expect("xml");
    assert_eq!(
        classify_profile(&doc),
        ProfileType::V2 {
            version: "2.5".to_owned()
        }
    );
}

#[test]
fn classifies_v3_and_unknown_roots() {
    let v3 = XmlDocument::parse("<HL7v3ConformanceProfile/>").expect("xml");
    assert_eq!(classify_profile(&v3), ProfileType::V3);
    let other = XmlDocument::parse("<html/>").expect("xml");
    assert_eq!(
        classify_profile(&other),
        ProfileType::Unrecognized("html".to_owned())
    );
}

#[test]
fn v3_profile_is_rejected() {
    let err = Profile::parse("<HL7v3ConformanceProfile/>").expect_err("v3");
    assert_eq!(err, ProfileError::UnsupportedV3);
}

#[test]
fn missing_static_def_is_rejected() {
    let err = Profile::parse(r#"<HL7v2xConformanceProfile HL7Version="2.5"/>"#).expect_err("no def");
    assert_eq!(err, ProfileError::MissingStaticDef);
}

// ── parsing ──────────────────────────────────────────────────────────────────

#[test]
fn header_comes_from_static_def() {
    let profile = sample_profile();
    let header = profile.header();
    assert_eq!(header.hl7_version, "2.5");
    assert_eq!(header.message_type, "ADT");
    assert_eq!(header.event_type, "A01");
    assert_eq!(header.structure_id, "ADT_A01");
    assert_eq!(header.name.as_deref(), Some("ADT A01 sample"));
}

#[test]
fn top_level_in_document_order() {
    let profile = sample_profile();
    let names: Vec<&str> = profile
        .top_level()
        .iter()
        .map(|id| profile.node(*id).name.as_str())
        .collect();
    assert_eq!(
        names,
        ["MSH", "EVN", "PID", "PV1", "OBX", "PROCEDURE", "INSURANCE"]
    );
}

#[test]
fn cardinality_and_usage_are_typed() {
    let profile = sample_profile();
    let obx = profile.segment_definitions("OBX")[0];
    let node = profile.node(obx);
    assert_eq!(node.usage, Usage::O);
    assert_eq!(node.cardinality.min, 0);
    assert_eq!(node.cardinality.max, MaxOccurs::Unbounded);

    let insurance = profile.top_level()[6];
    assert_eq!(profile.node(insurance).kind, NodeKind::SegmentGroup);
    assert_eq!(profile.node(insurance).cardinality.max, MaxOccurs::Bounded(3));
}

#[test]
fn components_default_to_single_occurrence() {
    let profile = sample_profile();
    let id_number = profile
        .resolve(&location("PID[1].3[1].1"), Resolution::Lenient)
        .expect("component");
    let node = profile.node(id_number);
    assert_eq!(node.cardinality.min, 1);
    assert_eq!(node.cardinality.max, MaxOccurs::Bounded(1));
    let check_digit = profile
        .resolve(&location("PID[1].3[1].2"), Resolution::Lenient)
        .expect("component");
    assert_eq!(profile.node(check_digit).cardinality.min, 0);
}

#[test]
fn invalid_usage_is_an_error() {
    let text = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ADT" EventType="A01" MsgStructID="ADT_A01">
    <Segment Name="MSH" Usage="Q" Min="1" Max="1"/>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;
    let err = Profile::parse(text).expect_err("bad usage");
    assert!(matches!(err, ProfileError::InvalidUsage { ref value, line: 3, .. } if value == "Q"));
}

#[test]
fn invalid_max_is_an_error() {
    let text = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ADT" EventType="A01">
    <Segment Name="MSH" Usage="R" Min="1" Max="many"/>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;
    let err = Profile::parse(text).expect_err("bad max");
    assert!(matches!(err, ProfileError::InvalidNumber { attribute: "Max", .. }));
}

#[test]
fn misplaced_field_is_an_error() {
    let text = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ADT" EventType="A01">
    <Field Name="Loose" Usage="O"/>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;
    let err = Profile::parse(text).expect_err("misplaced");
    assert!(matches!(err, ProfileError::Misplaced { .. }));
}

#[test]
fn structure_id_falls_back_to_type_and_event() {
    let text = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ADT" EventType="A04">
    <Segment Name="MSH" Usage="R" Min="1" Max="1"/>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;
    let profile = Profile::parse(text).expect("valid");
    assert_eq!(profile.header().structure_id, "ADT_A04");
}

// ── normalization ────────────────────────────────────────────────────────────

#[test]
fn coded_table_moves_to_first_component() {
    let profile = sample_profile();
    let field = profile
        .resolve(&location("OBX[1].3[1]"), Resolution::Lenient)
        .expect("field");
    assert_eq!(profile.node(field).table, None);
    let first = profile.child_at(field, 1).expect("component");
    assert_eq!(profile.node(first).table.as_deref(), Some("0396"));
}

#[test]
fn non_coded_tables_stay_on_the_field() {
    let profile = sample_profile();
    let sex = profile
        .resolve(&location("PID[1].8[1]"), Resolution::Lenient)
        .expect("field");
    assert_eq!(profile.node(sex).table.as_deref(), Some("0001"));
}

// ── lookups ──────────────────────────────────────────────────────────────────

#[test]
fn unique_segments_exclude_nothing_in_sample() {
    let profile = sample_profile();
    let unique = profile.unique_segments();
    assert_eq!(unique.len(), profile.segments().len());
    assert!(unique.contains_key("PR1"));
}

#[test]
fn unique_segments_drop_duplicates() {
    let text = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ORU" EventType="R01">
    <Segment Name="MSH" Usage="R" Min="1" Max="1"/>
    <Segment Name="NTE" Usage="O" Min="0" Max="*"/>
    <Segment Name="OBX" Usage="R" Min="1" Max="1"/>
    <Segment Name="NTE" Usage="O" Min="0" Max="*"/>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;
    let profile = Profile::parse(text).expect("valid");
    let unique = profile.unique_segments();
    assert!(!unique.contains_key("NTE"));
    assert_eq!(unique.len(), 2);
}

#[test]
fn strict_resolution_honours_usage_and_max() {
    let profile = sample_profile();
    assert!(location("PID[1].3[5]").exists_in_profile(&profile));
    assert!(!location("PID[1].5[3]").exists_in_profile(&profile));
    assert!(!location("PID[1].2[1]").exists_in_profile(&profile));
    assert!(!location("PID[2]").exists_in_profile(&profile));
    assert!(location("OBX[9].3[1].1").exists_in_profile(&profile));
}

#[test]
fn ungrouped_location_multiplies_group_max() {
    let profile = sample_profile();
    // INSURANCE repeats up to 3 times, IN1 once per repetition
    assert!(location("IN1[3]").exists_in_profile(&profile));
    assert!(!location("IN1[4]").exists_in_profile(&profile));
    assert!(location("INSURANCE[3]/IN1[1]").exists_in_profile(&profile));
    assert!(!location("INSURANCE[4]/IN1[1]").exists_in_profile(&profile));
    assert!(!location("INSURANCE[1]/IN1[2]").exists_in_profile(&profile));
}

#[test]
fn primitive_means_leaf_below_segment() {
    let profile = sample_profile();
    assert!(location("PID[1].8[1]").is_primitive(&profile));
    assert!(!location("PID[1].3[1]").is_primitive(&profile));
    assert!(location("PID[1].3[1].4.1").is_primitive(&profile));
    assert!(!location("PID[1]").is_primitive(&profile));
    assert!(!location("PID[1].99[1]").is_primitive(&profile));
}

#[test]
fn describe_labels_nodes() {
    let profile = sample_profile();
    let pid3 = profile
        .resolve(&location("PID[1].3[1]"), Resolution::Lenient)
        .expect("field");
    assert_eq!(profile.describe(pid3), "Field PID-3 (Patient Identifier List)");
    let procedure = profile.top_level()[5];
    assert_eq!(profile.describe(procedure), "Segment Group PROCEDURE");
    assert_eq!(profile.describe(profile.top_level()[0]), "Segment MSH (Message Header)");
}

#[test]
fn max_segment_count_substitutes_unbounded() {
    let profile = sample_profile();
    // MSH EVN PID PV1 = 4, OBX = 3, PROCEDURE = 3 * (1 + 3), INSURANCE = 3 * 2
    assert_eq!(profile.max_segment_count(3), 4 + 3 + 12 + 6);
}

// ── tree paths ───────────────────────────────────────────────────────────────

#[test]
fn tree_path_uses_datatypes() {
    let profile = sample_profile();
    assert_eq!(
        location("PID[1].3[2].4.1").to_tree_path(&profile),
        "/ADT_A01[1]/PID[1]/PID.3[2]/CX.4[1]/HD.1[1]"
    );
}

#[test]
fn tree_path_inserts_enclosing_groups() {
    let profile = sample_profile();
    assert_eq!(
        location("PR1[1].3[1]").to_tree_path(&profile),
        "/ADT_A01[1]/ADT_A01.PROCEDURE[1]/PR1[1]/PR1.3[1]"
    );
    assert_eq!(
        location("PROCEDURE[2]/PR1[1]").to_tree_path(&profile),
        "/ADT_A01[1]/ADT_A01.PROCEDURE[2]/PR1[1]"
    );
}

#[test]
fn tree_path_falls_back_to_wildcard() {
    let profile = sample_profile();
    assert_eq!(
        location("PID[1].8[1].2").to_tree_path(&profile),
        "/ADT_A01[1]/PID[1]/PID.8[1]/IS.2[1]"
    );
    assert_eq!(
        location("ZZZ[1].1[1].1").to_tree_path(&profile),
        "/ADT_A01[1]/ZZZ[1]/ZZZ.1[1]/*[1]"
    );
}
