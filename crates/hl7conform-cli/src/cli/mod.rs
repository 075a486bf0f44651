//! Clap CLI definition: root struct, subcommands, and shared argument types.
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// A CLI argument that is either a filesystem path or the stdin sentinel `"-"`.
///
/// Parsing `"-"` yields [`PathOrStdin::Stdin`]; anything else yields
/// [`PathOrStdin::Path`].
#[derive(Clone, Debug)]
pub enum PathOrStdin {
    /// Read from standard input.
    Stdin,
    /// Read from the given filesystem path.
    Path(PathBuf),
}

impl std::str::FromStr for PathOrStdin {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            Ok(PathOrStdin::Stdin)
        } else {
            Ok(PathOrStdin::Path(PathBuf::from(s)))
        }
    }
}

/// Output format for CLI commands.
///
/// `Human` emits colored lines to stderr (reports) or aligned text to stdout
/// (data). `Json` emits NDJSON for reports and a single object for data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, optionally colored output (default).
    Human,
    /// Structured JSON / NDJSON output.
    Json,
}

/// Log verbosity for the `tracing` subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors (default).
    Warn,
    /// Phase progress.
    Info,
    /// Phase results and mapping details.
    Debug,
    /// Everything.
    Trace,
}

/// Layout of log lines on stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One compact line per event (default).
    Compact,
    /// One JSON object per event.
    Json,
}

/// All top-level subcommands exposed by the `hl7conform` binary.
#[derive(Subcommand)]
pub enum Command {
    /// Validate an HL7 v2 message (ER7 or XML) against a conformance profile.
    Validate {
        /// Path to the message, or `-` for stdin.
        #[arg(value_name = "MESSAGE")]
        message: PathOrStdin,
        /// Conformance profile (HL7 v2 XML profile).
        #[arg(long, short = 'p', value_name = "PROFILE")]
        profile: PathBuf,
        /// HL7 table library used for table checks.
        #[arg(long, value_name = "TABLES")]
        tables: Option<PathBuf>,
        /// Validation context (JSON): groups, table exclusions, failure levels.
        #[arg(long, value_name = "CONTEXT")]
        context: Option<PathBuf>,
        /// Content rules (JSON array) checked after the structural phases.
        #[arg(long, value_name = "RULES")]
        rules: Option<PathBuf>,
        /// Also report affirmative findings (checked phases, passed values).
        #[arg(long)]
        show_passed: bool,
    },

    /// Print the segment state machine derived from a profile.
    Profile {
        /// Conformance profile (HL7 v2 XML profile).
        #[arg(value_name = "PROFILE")]
        profile: PathBuf,
        /// Keep segment groups as states of their own.
        #[arg(long)]
        has_groups: bool,
        /// Stand-in for unbounded `Max` values when computing the message size bound.
        #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
        unbounded_max: u32,
        /// List every transition, not only the counts.
        #[arg(long)]
        transitions: bool,
    },

    /// Resolve a message location against a profile.
    Locate {
        /// Flat location, e.g. `PID[1].3[1].1` or `INSURANCE[2]/IN1[1].2`.
        #[arg(value_name = "LOCATION")]
        location: String,
        /// Conformance profile (HL7 v2 XML profile).
        #[arg(long, short = 'p', value_name = "PROFILE")]
        profile: PathBuf,
    },
}

/// Root CLI struct for the `hl7conform` binary.
///
/// All global flags are defined here and marked `global = true` so that clap
/// propagates them to every subcommand.
#[derive(Parser)]
#[command(
    name = "hl7conform",
    version,
    about = "HL7 v2 conformance profile validator",
    long_about = "Validates HL7 v2 messages (ER7 or XML encoding) against HL7 v2 XML\n\
                  conformance profiles, inspects the segment state machine a profile\n\
                  defines, and resolves message locations against a profile."
)]
pub struct Cli {
    /// Active subcommand.
    #[command(subcommand)]
    pub command: Command,

    /// Output format: human (default) or json.
    #[arg(long, short = 'f', default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Only report error-level findings and no summary (incompatible with `--verbose`).
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Add timing and input metadata to stderr (incompatible with `--quiet`).
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Maximum input file size in bytes.
    ///
    /// Can also be set via the `HL7CONFORM_MAX_FILE_SIZE` environment
    /// variable. The CLI flag takes precedence over the environment variable.
    /// Default: 67108864 (64 MB).
    #[arg(
        long,
        global = true,
        env = "HL7CONFORM_MAX_FILE_SIZE",
        default_value = "67108864"
    )]
    pub max_file_size: u64,

    /// Disable ANSI color codes in human output.
    ///
    /// Also respects the `NO_COLOR` environment variable per
    /// <https://no-color.org>.
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Log level for diagnostics on stderr; `HL7CONFORM_LOG` overrides it.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: LogLevel,

    /// Log line layout.
    #[arg(long, global = true, default_value = "compact")]
    pub log_format: LogFormat,
}
