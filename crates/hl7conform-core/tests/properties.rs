//! Property-based tests for the location model and the segment mapper.
//!
//! - flat paths: `parse` then `to_flat_path` yields the input with every
//!   omitted instance number spelled out;
//! - the state machine is rebuilt identically from the same profile;
//! - every non-`Z` segment of a message ends up mapped or unmapped, exactly
//!   once, whichever strategy the mapper used.
#![allow(clippy::expect_used)]

use std::path::PathBuf;

use hl7conform_core::{Er7Message, FiniteStateMachine, MessageLocation, Profile};
use proptest::prelude::*;

fn sample_profile() -> Profile {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/adt_a01_profile.xml");
    let text = std::fs::read_to_string(path).expect("fixture file should be readable");
    Profile::parse(&text).expect("profile parses")
}

// ── generators ──────────────────────────────────────────────────────────────

/// A location written with or without instance numbers, plus the rendering
/// `to_flat_path` must produce for it.
fn flat_path() -> impl Strategy<Value = (String, String)> {
    let instance = prop::option::of(1u32..50);
    let group = ("[A-Z][A-Z_]{1,10}", instance.clone());
    (
        prop::collection::vec(group, 0..3),
        "[A-Z][A-Z0-9]{2}",
        instance.clone(),
        prop::option::of((1u32..40, instance, prop::option::of((1u32..10, prop::option::of(1u32..10))))),
    )
        .prop_map(|(groups, segment, segment_instance, field)| {
            let mut written = String::new();
            let mut normalized = String::new();
            let spell = |n: Option<u32>| n.map(|n| format!("[{n}]")).unwrap_or_default();
            for (name, instance) in &groups {
                written.push_str(&format!("{name}{}/", spell(*instance)));
                normalized.push_str(&format!("{name}[{}]/", instance.unwrap_or(1)));
            }
            written.push_str(&format!("{segment}{}", spell(segment_instance)));
            normalized.push_str(&format!("{segment}[{}]", segment_instance.unwrap_or(1)));
            if let Some((field, field_instance, component)) = field {
                written.push_str(&format!(".{field}{}", spell(field_instance)));
                normalized.push_str(&format!(".{field}[{}]", field_instance.unwrap_or(1)));
                if let Some((component, subcomponent)) = component {
                    written.push_str(&format!(".{component}"));
                    normalized.push_str(&format!(".{component}"));
                    if let Some(subcomponent) = subcomponent {
                        written.push_str(&format!(".{subcomponent}"));
                        normalized.push_str(&format!(".{subcomponent}"));
                    }
                }
            }
            (written, normalized)
        })
}

/// A segment sequence drawn from the profile's codes plus a few strangers.
fn segment_codes() -> impl Strategy<Value = Vec<&'static str>> {
    let code = prop::sample::select(vec![
        "EVN", "PID", "PV1", "OBX", "PR1", "ROL", "IN1", "IN2", "ZPI", "NTE",
    ]);
    prop::collection::vec(code, 0..25)
}

fn message(codes: &[&str]) -> String {
    let mut text =
        String::from("MSH|^~\\&|SENDER||RECEIVER||20240315120000||ADT^A01^ADT_A01|1|P|2.5\r");
    for code in codes {
        text.push_str(code);
        text.push_str("|1\r");
    }
    text
}

// ── properties ──────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn flat_paths_round_trip((written, normalized) in flat_path()) {
        let location = MessageLocation::parse(&written).expect("generated paths are valid");
        prop_assert_eq!(location.to_flat_path(), normalized.clone());
        let again = MessageLocation::parse(&normalized).expect("rendered paths are valid");
        prop_assert_eq!(again, location);
    }

    #[test]
    fn every_segment_is_accounted_for(codes in segment_codes()) {
        let profile = sample_profile();
        let fsm = FiniteStateMachine::build(&profile, false);
        let parsed = Er7Message::parse(&message(&codes)).expect("generated messages parse");
        let mapping = fsm.map_er7(&parsed);
        let standard = parsed.standard_segments().count();
        prop_assert_eq!(mapping.mapped_count() + mapping.unmapped().len(), standard);

        let mut lines: Vec<usize> = mapping.mapped().iter().map(|(line, _)| *line).collect();
        lines.extend(mapping.unmapped().iter().map(|(line, _)| *line));
        lines.sort_unstable();
        lines.dedup();
        prop_assert_eq!(lines.len(), standard);
    }

    #[test]
    fn grouped_machine_accounts_for_every_segment(codes in segment_codes()) {
        let profile = sample_profile();
        let fsm = FiniteStateMachine::build(&profile, true);
        let parsed = Er7Message::parse(&message(&codes)).expect("generated messages parse");
        let mapping = fsm.map_er7(&parsed);
        prop_assert_eq!(
            mapping.mapped_count() + mapping.unmapped().len(),
            parsed.standard_segments().count()
        );
    }
}

#[test]
fn machine_construction_is_deterministic() {
    for has_groups in [false, true] {
        let first = FiniteStateMachine::build(&sample_profile(), has_groups);
        let second = FiniteStateMachine::build(&sample_profile(), has_groups);
        assert_eq!(first.transitions(), second.transitions());
        assert_eq!(first.ambiguities(), second.ambiguities());
        let names = |fsm: &FiniteStateMachine| -> Vec<String> {
            fsm.states().map(|s| s.name.clone()).collect()
        };
        assert_eq!(names(&first), names(&second));
    }
}

#[test]
fn z_segments_are_never_mapped() {
    let fsm = FiniteStateMachine::build(&sample_profile(), false);
    let parsed = Er7Message::parse(&message(&["EVN", "ZPI", "PID", "PV1", "ZZ1"])).expect("parses");
    let mapping = fsm.map_er7(&parsed);
    assert_eq!(mapping.mapped_count(), 4);
    assert!(mapping.unmapped().is_empty());
}
