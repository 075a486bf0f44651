//! Integration tests for `hl7conform profile`.
#![allow(clippy::expect_used)]

use std::path::PathBuf;
use std::process::{Command, Output};

fn hl7conform_bin() -> PathBuf {
    let mut path = std::env::current_exe().expect("current exe");
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("hl7conform");
    path
}

fn fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("../../tests/fixtures");
    path.push(name);
    path.to_str().expect("path").to_owned()
}

fn profile(extra: &[&str]) -> Output {
    Command::new(hl7conform_bin())
        .args(["profile", &fixture("adt_a01_profile.xml")])
        .args(extra)
        .output()
        .expect("run hl7conform profile")
}

#[test]
fn human_summary_on_stdout() {
    let out = profile(&[]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("message         ADT^A01 (ADT_A01)"), "stdout: {stdout}");
    assert!(stdout.contains("hl7 version     2.5"), "stdout: {stdout}");
    assert!(stdout.contains("ambiguities     0"), "stdout: {stdout}");
    assert!(stdout.contains("(unbounded max = 3)"), "stdout: {stdout}");
}

#[test]
fn json_output_is_one_object() {
    let out = profile(&["--format", "json", "--transitions"]);
    assert_eq!(out.status.code(), Some(0));
    let value: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout is JSON");
    assert_eq!(value["structure_id"], "ADT_A01");
    assert_eq!(value["groups"], 0);
    let unique = value["unique_segments"].as_array().expect("array");
    assert!(unique.iter().any(|s| s == "PID"));
    assert!(value["transitions"].as_array().is_some_and(|t| !t.is_empty()));
}

#[test]
fn grouped_machine_counts_groups() {
    let out = profile(&["--format", "json", "--has-groups"]);
    let value: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout is JSON");
    assert!(value["groups"].as_u64().is_some_and(|g| g > 0));
}

#[test]
fn larger_unbounded_max_raises_the_bound() {
    let bound = |max: &str| {
        let out = profile(&["--format", "json", "--unbounded-max", max]);
        let value: serde_json::Value =
            serde_json::from_slice(&out.stdout).expect("stdout is JSON");
        value["max_segment_count"].as_u64().expect("number")
    };
    assert!(bound("10") > bound("3"));
}

#[test]
fn missing_profile_exits_2() {
    let out = Command::new(hl7conform_bin())
        .args(["profile", "/no/such/profile.xml"])
        .output()
        .expect("run hl7conform profile");
    assert_eq!(out.status.code(), Some(2));
}
