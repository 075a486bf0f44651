/// Checks shared by the ER7 and XML element walks.
///
/// [`ValueChecks::check_value`] runs the leaf checks (LENGTH, CONSTANT,
/// TABLE, DATATYPE) on one non-empty primitive value;
/// [`occurrence_finding`] turns an occurrence count into the usage or
/// cardinality finding it implies.
use regex::Regex;

use crate::config::ValidationContext;
use crate::failure::{FailureKind, FailureLocation, MessageFailure};
use crate::patterns::{DT_RE, DTM_RE, NM_RE, SI_RE, TM_RE, TN_RE};
use crate::profile::{Cardinality, Profile, ProfileNodeId, Usage};
use crate::tables::{TableLibrary, TableLookup};

/// `Length` value that means "no limit".
const UNBOUNDED_LENGTH: u32 = 99_999;

/// The pattern a primitive datatype must match, if it has one.
fn datatype_pattern(datatype: &str) -> Option<&'static Regex> {
    match datatype {
        "DTM" | "TS" => Some(&*DTM_RE),
        "DT" => Some(&*DT_RE),
        "TM" => Some(&*TM_RE),
        "SI" => Some(&*SI_RE),
        "NM" => Some(&*NM_RE),
        "TN" => Some(&*TN_RE),
        _ => None,
    }
}

/// Inputs of the leaf value checks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ValueChecks<'a> {
    pub profile: &'a Profile,
    pub tables: &'a TableLibrary,
    pub context: &'a ValidationContext,
}

impl ValueChecks<'_> {
    /// Runs every value check that applies to `node` on `value`.
    ///
    /// `value` must be non-empty and free of separators.
    pub fn check_value(
        &self,
        node: ProfileNodeId,
        value: &str,
        location: &FailureLocation,
        out: &mut Vec<MessageFailure>,
    ) {
        let definition = self.profile.node(node);
        let label = self.profile.describe(node);
        let finding = |kind: FailureKind, description: String| {
            MessageFailure::new(kind, description)
                .located(location.clone())
                .with_content(value)
        };

        if let Some(max) = definition.length.filter(|l| *l != UNBOUNDED_LENGTH) {
            let length = value.chars().count();
            if length > usize::try_from(max).unwrap_or(usize::MAX) {
                out.push(finding(
                    FailureKind::Length,
                    format!(
                        "The value '{value}' of {label} is {length} characters long but the maximum allowed length is {max}"
                    ),
                ));
            }
        }

        if let Some(constant) = &definition.constant_value {
            if value == constant {
                out.push(finding(
                    FailureKind::DataPassed,
                    format!("The value '{value}' of {label} matches the constant value '{constant}'"),
                ));
            } else {
                out.push(finding(
                    FailureKind::Data,
                    format!("The value '{value}' of {label} does not match the constant value '{constant}'"),
                ));
            }
        }

        if let Some(table_id) = &definition.table {
            if !self.context.is_table_excluded(table_id) {
                match self.tables.lookup(table_id) {
                    TableLookup::NotFound => out.push(finding(
                        FailureKind::TableNotFound,
                        format!("The table '{table_id}' used by {label} is not in the table library"),
                    )),
                    TableLookup::Found(table) if table.is_empty() => out.push(finding(
                        FailureKind::ValidationConfiguration,
                        format!(
                            "The table '{table_id}' used by {label} has no values, so '{value}' cannot be checked"
                        ),
                    )),
                    TableLookup::Found(table) if table.contains(value) => out.push(finding(
                        FailureKind::DataPassed,
                        format!("The value '{value}' of {label} matches a value in the table '{table_id}'"),
                    )),
                    TableLookup::Found(_) => out.push(finding(
                        FailureKind::Data,
                        format!(
                            "The value '{value}' of {label} does not match any of the values in the table '{table_id}'"
                        ),
                    )),
                }
            }
        }

        if let Some(datatype) = &definition.datatype {
            if let Some(pattern) = datatype_pattern(datatype) {
                if !pattern.is_match(value) {
                    out.push(finding(
                        FailureKind::Datatype,
                        format!("The value '{value}' of {label} is not a valid {datatype} value"),
                    ));
                }
            }
        }
    }
}

/// The usage or cardinality finding implied by `count` occurrences of an
/// element under one parent instance, as `(kind, description)`.
///
/// Usage `X` is not handled here; the walks report each occurrence of an
/// unsupported element on its own. Only `R` elements may be missing; `RE`,
/// `O` and conditional elements are exempt from the minimum when absent.
pub(crate) fn occurrence_finding(
    label: &str,
    usage: Usage,
    cardinality: Cardinality,
    count: u32,
) -> Option<(FailureKind, String)> {
    match usage {
        Usage::X => None,
        Usage::R if count == 0 => Some((FailureKind::Usage, format!("{label} is missing"))),
        Usage::R | Usage::RE | Usage::O | Usage::C | Usage::CE => {
            if count > 0 && count < cardinality.min {
                Some((
                    FailureKind::Cardinality,
                    format!(
                        "{label} must be present at least {} times but is present {count} times",
                        cardinality.min
                    ),
                ))
            } else if !cardinality.max.admits(count) {
                Some((
                    FailureKind::Cardinality,
                    format!(
                        "{label} is present {count} times but is only allowed {} times",
                        cardinality.max
                    ),
                ))
            } else {
                None
            }
        }
    }
}

/// Description of an unsupported element that is present.
pub(crate) fn x_usage_description(label: &str) -> String {
    format!("{label} is not supported (usage X) but is present")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::profile::MaxOccurs;
    use crate::tables::{Table, TableCode};
    use crate::test_helpers::{location, sample_profile, sample_tables};

    fn run(profile: &Profile, tables: &TableLibrary, ctx: &ValidationContext, path: &str, value: &str) -> Vec<MessageFailure> {
        let checks = ValueChecks {
            profile,
            tables,
            context: ctx,
        };
        let loc = location(path);
        let node = profile
            .resolve(&loc, crate::profile::Resolution::Lenient)
            .expect("location resolves");
        let mut out = Vec::new();
        checks.check_value(node, value, &FailureLocation::at(&loc, profile, 3, 1), &mut out);
        out
    }

    fn kinds(failures: &[MessageFailure]) -> Vec<FailureKind> {
        failures.iter().map(|f| f.kind).collect()
    }

    // ── tables ───────────────────────────────────────────────────────────────

    #[test]
    fn value_outside_table_is_data_failure() {
        let out = run(&sample_profile(), &sample_tables(), &ValidationContext::default(), "PID[1].8[1]", "9");
        assert_eq!(kinds(&out), [FailureKind::Data]);
        assert!(
            out[0]
                .description
                .contains("does not match any of the values in the table '0001'")
        );
        assert_eq!(out[0].element_content.as_deref(), Some("9"));
        assert_eq!(out[0].location.line, 3);
    }

    #[test]
    fn table_match_ignores_case() {
        let out = run(&sample_profile(), &sample_tables(), &ValidationContext::default(), "PID[1].8[1]", "f");
        assert_eq!(kinds(&out), [FailureKind::DataPassed]);
    }

    #[test]
    fn missing_table_is_reported() {
        let out = run(&sample_profile(), &TableLibrary::new(), &ValidationContext::default(), "PID[1].8[1]", "F");
        assert_eq!(kinds(&out), [FailureKind::TableNotFound]);
    }

    #[test]
    fn empty_table_is_a_configuration_note() {
        let out = run(&sample_profile(), &sample_tables(), &ValidationContext::default(), "OBX[1].3[1].1", "X");
        assert_eq!(kinds(&out), [FailureKind::ValidationConfiguration]);
    }

    #[test]
    fn excluded_table_is_skipped() {
        let ctx = ValidationContext::from_json(r#"{"excluded_tables": ["0001"]}"#).expect("valid");
        let out = run(&sample_profile(), &sample_tables(), &ctx, "PID[1].8[1]", "9");
        assert!(out.is_empty());
    }

    #[test]
    fn inserted_table_is_used() {
        let mut tables = TableLibrary::new();
        tables.insert(Table {
            id: "0004".to_owned(),
            name: String::new(),
            kind: String::new(),
            codes: vec![TableCode {
                code: "Z".to_owned(),
                display_name: String::new(),
            }],
        });
        let out = run(&sample_profile(), &tables, &ValidationContext::default(), "PV1[1].2[1]", "Z");
        assert_eq!(kinds(&out), [FailureKind::DataPassed]);
    }

    // ── length and datatype ──────────────────────────────────────────────────

    #[test]
    fn over_long_value_is_length_failure() {
        let out = run(
            &sample_profile(),
            &sample_tables(),
            &ValidationContext::default(),
            "PID[1].1[1]",
            "12345",
        );
        // SI is also limited to four digits
        assert_eq!(kinds(&out), [FailureKind::Length, FailureKind::Datatype]);
        assert!(out[0].description.contains("is 5 characters long but the maximum allowed length is 4"));
    }

    #[test]
    fn value_within_length_passes() {
        let out = run(&sample_profile(), &sample_tables(), &ValidationContext::default(), "PID[1].3[1].1", "123");
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_timestamp_is_datatype_failure() {
        let out = run(&sample_profile(), &sample_tables(), &ValidationContext::default(), "EVN[1].2[1]", "2024-03-15");
        assert_eq!(kinds(&out), [FailureKind::Datatype]);
        assert!(out[0].description.ends_with("is not a valid TS value"));
    }

    // ── occurrences ──────────────────────────────────────────────────────────

    fn card(min: u32, max: MaxOccurs) -> Cardinality {
        Cardinality { min, max }
    }

    #[test]
    fn required_and_absent_is_missing() {
        let (kind, text) = occurrence_finding("Segment PID", Usage::R, card(1, MaxOccurs::Bounded(1)), 0)
            .expect("finding");
        assert_eq!(kind, FailureKind::Usage);
        assert_eq!(text, "Segment PID is missing");
    }

    #[test]
    fn required_but_empty_is_exempt() {
        assert!(occurrence_finding("x", Usage::RE, card(1, MaxOccurs::Bounded(1)), 0).is_none());
    }

    #[test]
    fn over_max_is_cardinality() {
        let (kind, text) = occurrence_finding("Segment PID", Usage::R, card(1, MaxOccurs::Bounded(1)), 2)
            .expect("finding");
        assert_eq!(kind, FailureKind::Cardinality);
        assert_eq!(text, "Segment PID is present 2 times but is only allowed 1 times");
    }

    #[test]
    fn under_min_is_cardinality() {
        let (kind, _) = occurrence_finding("x", Usage::R, card(2, MaxOccurs::Unbounded), 1).expect("finding");
        assert_eq!(kind, FailureKind::Cardinality);
        assert!(occurrence_finding("x", Usage::R, card(2, MaxOccurs::Unbounded), 7).is_none());
    }
}
