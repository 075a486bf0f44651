//! Implementation of `hl7conform locate <location> --profile <profile>`.
//!
//! Parses a flat location and reports how it resolves against the profile:
//! both path renderings, whether the profile declares it, whether it is a
//! leaf, and the element names the profile gives it.
use std::io::Write;

use hl7conform_core::{MessageLocation, Profile, ProfileIndex, Resolution};
use serde_json::json;

use crate::OutputFormat;
use crate::error::CliError;

/// Runs the `locate` command, writing to stdout.
///
/// # Errors
///
/// - [`CliError::InvalidLocation`] when `input` is not a flat path.
/// - [`CliError::OutputFailed`] if stdout cannot be written.
pub fn run(input: &str, profile: &Profile, format: &OutputFormat) -> Result<(), CliError> {
    let location = MessageLocation::parse(input).map_err(|e| CliError::InvalidLocation {
        input: input.to_owned(),
        detail: e.to_string(),
    })?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_location(&mut out, &location, profile, format).map_err(|e| CliError::output_failed("stdout", &e))
}

fn write_location<W: Write>(
    out: &mut W,
    location: &MessageLocation,
    profile: &Profile,
    format: &OutputFormat,
) -> std::io::Result<()> {
    let index = ProfileIndex::build(profile);
    let names = index.names_for(location);
    let exists = location.exists_in_profile(profile);
    let primitive = location.is_primitive(profile);
    let definition = profile
        .resolve(location, Resolution::Lenient)
        .map(|id| profile.describe(id));

    match format {
        OutputFormat::Human => {
            writeln!(out, "flat path   {}", location.to_flat_path())?;
            writeln!(out, "tree path   {}", location.to_tree_path(profile))?;
            writeln!(out, "type        {}", location.element_type())?;
            writeln!(out, "declared    {}", yes_no(exists))?;
            writeln!(out, "primitive   {}", yes_no(primitive))?;
            match (&names, &definition) {
                (Some(names), _) => writeln!(out, "names       {names}")?,
                (None, Some(definition)) => {
                    writeln!(out, "names       ambiguous (first match {definition})")?;
                }
                (None, None) => writeln!(out, "names       -")?,
            }
        }
        OutputFormat::Json => {
            let value = json!({
                "flat_path": location.to_flat_path(),
                "tree_path": location.to_tree_path(profile),
                "element_type": location.element_type(),
                "exists": exists,
                "primitive": primitive,
                "names": names,
                "label": names.as_ref().map(ToString::to_string),
                "definition": definition,
            });
            let pretty = serde_json::to_string_pretty(&value).map_err(std::io::Error::other)?;
            writeln!(out, "{pretty}")?;
        }
    }
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
