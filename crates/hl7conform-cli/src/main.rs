//! `hl7conform`: validate HL7 v2 messages against conformance profiles.
mod cli;
mod cmd;
mod error;
mod format;
mod io;
mod logging;

use clap::Parser;

pub use cli::{Cli, Command, OutputFormat, PathOrStdin};
use error::CliError;
use format::FormatterConfig;
use logging::LogConfig;

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_flags(cli.log_level, cli.log_format, cli.no_color);
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("warning: logging disabled: {e}");
    }

    if let Err(e) = dispatch(&cli) {
        eprintln!("{}", e.message());
        std::process::exit(e.exit_code());
    }
}

/// Routes the parsed command line to its subcommand.
fn dispatch(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Validate {
            message,
            profile,
            tables,
            context,
            rules,
            show_passed,
        } => {
            let inputs = cmd::validate::ValidatorInputs {
                profile: profile.clone(),
                tables: tables.clone(),
                context: context.clone(),
                rules: rules.clone(),
            };
            let validator = cmd::validate::load_validator(&inputs, cli.max_file_size)?;
            let message = io::read_message(message, cli.max_file_size)?;
            let config =
                FormatterConfig::from_flags(cli.no_color, cli.quiet, cli.verbose, *show_passed);
            cmd::validate::run(&message.text, &message.label, &validator, &cli.format, &config)
        }
        Command::Profile {
            profile,
            has_groups,
            unbounded_max,
            transitions,
        } => {
            let profile = cmd::validate::load_profile(profile, cli.max_file_size)?;
            let options = cmd::profile::ProfileOptions {
                has_groups: *has_groups,
                unbounded_max: *unbounded_max,
                transitions: *transitions,
            };
            cmd::profile::run(&profile, options, &cli.format)
        }
        Command::Locate { location, profile } => {
            let profile = cmd::validate::load_profile(profile, cli.max_file_size)?;
            cmd::locate::run(location, &profile, &cli.format)
        }
    }
}
