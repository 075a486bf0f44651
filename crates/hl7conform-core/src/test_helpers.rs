//! Shared test helpers for unit test modules throughout `hl7conform-core`.
//!
//! The sample profile and table library live in the workspace
//! `tests/fixtures/` directory so the integration tests and the CLI tests
//! exercise the same documents.
#![allow(clippy::expect_used)]

use crate::location::MessageLocation;
use crate::profile::Profile;
use crate::tables::TableLibrary;

/// ADT^A01 sample profile (MSH, EVN, PID, PV1, OBX*, PROCEDURE*, INSURANCE{0,3}).
pub const SAMPLE_PROFILE: &str = include_str!("../../../tests/fixtures/adt_a01_profile.xml");

/// Table library matching [`SAMPLE_PROFILE`].
pub const SAMPLE_TABLES: &str = include_str!("../../../tests/fixtures/tables.xml");

/// A message that conforms to [`SAMPLE_PROFILE`] and [`SAMPLE_TABLES`].
pub const CONFORMANT_ER7: &str = "MSH|^~\\&|SENDER||RECEIVER||20240315120000||ADT^A01^ADT_A01|MSG0001|P|2.5\r\
EVN||20240315120000\r\
PID|||123^^^HOSP^MR||DOE^JOHN|||F\r\
PV1||I\r";

/// Parses [`SAMPLE_PROFILE`].
pub fn sample_profile() -> Profile {
    Profile::parse(SAMPLE_PROFILE).expect("sample profile parses")
}

/// Parses [`SAMPLE_TABLES`].
pub fn sample_tables() -> TableLibrary {
    TableLibrary::parse(SAMPLE_TABLES).expect("sample tables parse")
}

/// Parses a flat location path.
pub fn location(s: &str) -> MessageLocation {
    MessageLocation::parse(s).expect("valid location")
}

/// Joins segment lines with the standard `\r` terminator.
pub fn er7(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\r');
    }
    out
}

/// The MSH line used by most hand-written test messages.
pub const MSH: &str = "MSH|^~\\&|SENDER||RECEIVER||20240315120000||ADT^A01^ADT_A01|MSG0001|P|2.5";

/// Two adjacent `NTE` definitions: one required, one optional, neither
/// repeatable.
pub const ADJACENT_NTE_PROFILE: &str = r#"<HL7v2xConformanceProfile HL7Version="2.5">
  <HL7v2xStaticDef MsgType="ADT" EventType="A01" MsgStructID="ADT_A01">
    <Segment Name="MSH" Usage="R" Min="1" Max="1">
      <Field Name="Field Separator" Usage="R" Min="1" Max="1" Datatype="ST" Length="1"/>
      <Field Name="Encoding Characters" Usage="R" Min="1" Max="1" Datatype="ST" Length="4"/>
      <Field Name="Sending Application" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Sending Facility" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Receiving Application" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Receiving Facility" Usage="O" Min="0" Max="1" Datatype="HD" Length="227"/>
      <Field Name="Date/Time Of Message" Usage="R" Min="1" Max="1" Datatype="TS" Length="26"/>
      <Field Name="Security" Usage="O" Min="0" Max="1" Datatype="ST" Length="40"/>
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
    <Segment Name="NTE" LongName="Notes and Comments" Usage="R" Min="1" Max="1">
      <Field Name="Comment" Usage="O" Min="0" Max="1" Datatype="ST" Length="80"/>
    </Segment>
    <Segment Name="NTE" LongName="Notes and Comments" Usage="O" Min="0" Max="1">
      <Field Name="Comment" Usage="O" Min="0" Max="1" Datatype="ST" Length="80"/>
    </Segment>
  </HL7v2xStaticDef>
</HL7v2xConformanceProfile>"#;

/// Parses [`ADJACENT_NTE_PROFILE`].
pub fn adjacent_nte_profile() -> Profile {
    Profile::parse(ADJACENT_NTE_PROFILE).expect("adjacent NTE profile parses")
}
