//! Implementation of `hl7conform profile <profile>`.
//!
//! Builds the segment state machine for a profile and prints what it looks
//! like: identification, state and transition counts, ambiguous transitions,
//! segments defined exactly once, and the message size bound.
//!
//! Output goes to stdout, as aligned text or a single JSON object.
use std::io::Write;

use hl7conform_core::{FiniteStateMachine, NodeKind, Profile};
use serde_json::json;

use crate::OutputFormat;
use crate::error::CliError;

/// Options of the `profile` command.
#[derive(Debug, Clone, Copy)]
pub struct ProfileOptions {
    /// Keep segment groups as states.
    pub has_groups: bool,
    /// Stand-in for `Max="*"`.
    pub unbounded_max: u32,
    /// List every transition.
    pub transitions: bool,
}

/// Runs the `profile` command, writing to stdout.
///
/// # Errors
///
/// Returns [`CliError::OutputFailed`] if stdout cannot be written.
pub fn run(profile: &Profile, options: ProfileOptions, format: &OutputFormat) -> Result<(), CliError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_profile(&mut out, profile, options, format).map_err(|e| CliError::output_failed("stdout", &e))
}

fn write_profile<W: Write>(
    out: &mut W,
    profile: &Profile,
    options: ProfileOptions,
    format: &OutputFormat,
) -> std::io::Result<()> {
    let fsm = FiniteStateMachine::build(profile, options.has_groups);
    let header = profile.header();
    let unique: Vec<&str> = profile
        .unique_segments()
        .into_values()
        .map(|id| profile.node(id).name.as_str())
        .collect();
    let groups = fsm
        .states()
        .filter(|s| match s.kind {
            NodeKind::SegmentGroup => true,
            NodeKind::Segment | NodeKind::Field | NodeKind::Component | NodeKind::SubComponent => false,
        })
        .count();
    let max_segments = profile.max_segment_count(options.unbounded_max);

    match format {
        OutputFormat::Human => {
            writeln!(
                out,
                "message         {}^{} ({})",
                header.message_type, header.event_type, header.structure_id
            )?;
            writeln!(out, "hl7 version     {}", header.hl7_version)?;
            if let Some(name) = &header.name {
                writeln!(out, "name            {name}")?;
            }
            writeln!(out, "states          {} ({groups} groups)", fsm.state_count())?;
            writeln!(out, "transitions     {}", fsm.transition_count())?;
            writeln!(out, "ambiguities     {}", fsm.ambiguities().len())?;
            for ambiguity in fsm.ambiguities() {
                let targets: Vec<String> =
                    ambiguity.targets.iter().map(|t| profile.describe(*t)).collect();
                writeln!(
                    out,
                    "  after {}: '{}' may be {}",
                    profile.describe(ambiguity.from),
                    ambiguity.label,
                    targets.join(" or ")
                )?;
            }
            writeln!(out, "unique segments {}", unique.join(", "))?;
            writeln!(
                out,
                "max segments    {max_segments} (unbounded max = {})",
                options.unbounded_max
            )?;
            if options.transitions {
                writeln!(out, "transitions:")?;
                for t in fsm.transitions() {
                    writeln!(
                        out,
                        "  {} --{}--> {}",
                        profile.describe(t.from),
                        t.label,
                        profile.describe(t.to)
                    )?;
                }
            }
        }
        OutputFormat::Json => {
            let ambiguities: Vec<serde_json::Value> = fsm
                .ambiguities()
                .iter()
                .map(|a| {
                    json!({
                        "from": profile.describe(a.from),
                        "segment": a.label,
                        "targets": a.targets.iter().map(|t| profile.describe(*t)).collect::<Vec<_>>(),
                    })
                })
                .collect();
            let mut value = json!({
                "message_type": header.message_type,
                "event_type": header.event_type,
                "structure_id": header.structure_id,
                "hl7_version": header.hl7_version,
                "name": header.name,
                "has_groups": options.has_groups,
                "states": fsm.state_count(),
                "groups": groups,
                "transition_count": fsm.transition_count(),
                "ambiguities": ambiguities,
                "unique_segments": unique,
                "unbounded_max": options.unbounded_max,
                "max_segment_count": max_segments,
            });
            if options.transitions {
                let transitions: Vec<serde_json::Value> = fsm
                    .transitions()
                    .iter()
                    .map(|t| {
                        json!({
                            "from": profile.describe(t.from),
                            "segment": t.label,
                            "to": profile.describe(t.to),
                        })
                    })
                    .collect();
                value["transitions"] = serde_json::Value::from(transitions);
            }
            let pretty = serde_json::to_string_pretty(&value).map_err(std::io::Error::other)?;
            writeln!(out, "{pretty}")?;
        }
    }
    Ok(())
}
