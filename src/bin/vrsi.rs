//! VRSI CLI - Command-line interface for VRSI Analytics
//!
//! Commands:
//! - analyze: Compute the behavioural report of one recorded session
//! - validate: Check a session's tables against the pipeline preconditions
//! - config: Print the default analysis configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

use vrsi_analytics::encoder::{OutputFormat as ReportFormat, ReportEncoder};
use vrsi_analytics::pipeline::{parse_session, SessionAnalyzer};
use vrsi_analytics::{AnalysisConfig, AnalysisError, VRSI_VERSION};

/// VRSI - Behavioural analytics for VR shopping sessions
#[derive(Parser)]
#[command(name = "vrsi")]
#[command(version = VRSI_VERSION)]
#[command(about = "Turn VR shopping telemetry into behavioural metrics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse one session and write the report
    Analyze {
        /// Session JSON file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Analysis configuration JSON; defaults apply to omitted fields
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, default_value = "json")]
        format: OutputFormat,

        /// Drop duplicate frame ids and sort tables by time instead of failing
        #[arg(long)]
        sanitize: bool,
    },

    /// Check a session against the pipeline preconditions
    Validate {
        /// Session JSON file (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Analysis configuration JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Validate as the sanitizing pipeline would see the session
        #[arg(long)]
        sanitize: bool,
    },

    /// Print the default analysis configuration
    Config,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single compact JSON document
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::JsonPretty => ReportFormat::JsonPretty,
            OutputFormat::Ndjson => ReportFormat::Ndjson,
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), VrsiCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            config,
            format,
            sanitize,
        } => cmd_analyze(&input, &output, config.as_deref(), format, sanitize),
        Commands::Validate {
            input,
            config,
            sanitize,
        } => cmd_validate(&input, config.as_deref(), sanitize),
        Commands::Config => cmd_config(),
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    config: Option<&Path>,
    format: OutputFormat,
    sanitize: bool,
) -> Result<(), VrsiCliError> {
    let analyzer = SessionAnalyzer::new(load_config(config)?)?.sanitizing(sanitize);

    let session = parse_session(&read_input(input)?)?;
    info!(session_id = %session.session_id, sanitize, "session_loaded");

    let report = analyzer.analyze(session)?;
    let output_data = ReportEncoder::new().encode(&report, format.into())?;

    if output.to_string_lossy() == "-" {
        print!("{}", output_data);
        if !output_data.ends_with('\n') {
            println!();
        }
    } else {
        fs::write(output, output_data)?;
        info!(path = %output.display(), "report_written");
    }

    Ok(())
}

fn cmd_validate(input: &Path, config: Option<&Path>, sanitize: bool) -> Result<(), VrsiCliError> {
    let analyzer = SessionAnalyzer::new(load_config(config)?)?.sanitizing(sanitize);
    let session = parse_session(&read_input(input)?)?;
    let summary = analyzer.validate(&session)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_config() -> Result<(), VrsiCliError> {
    println!("{}", AnalysisConfig::default().to_json()?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig, VrsiCliError> {
    match path {
        Some(path) => {
            let config = AnalysisConfig::from_json(&fs::read_to_string(path)?)?;
            info!(path = %path.display(), "config_loaded");
            Ok(config)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn read_input(input: &Path) -> Result<String, VrsiCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(VrsiCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

#[derive(Debug)]
enum VrsiCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    InteractiveStdin,
}

impl From<io::Error> for VrsiCliError {
    fn from(e: io::Error) -> Self {
        VrsiCliError::Io(e)
    }
}

impl From<AnalysisError> for VrsiCliError {
    fn from(e: AnalysisError) -> Self {
        VrsiCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for VrsiCliError {
    fn from(e: serde_json::Error) -> Self {
        VrsiCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VrsiCliError> for CliError {
    fn from(e: VrsiCliError) -> Self {
        match e {
            VrsiCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VrsiCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VrsiCliError::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a terminal, expected piped session JSON".to_string(),
                hint: Some("Pipe a session file or pass --input <path>".to_string()),
            },
            VrsiCliError::Analysis(e) => {
                let (code, hint) = analysis_error_details(&e);
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}

fn analysis_error_details(e: &AnalysisError) -> (&'static str, &'static str) {
    match e {
        AnalysisError::ParseError(_) | AnalysisError::JsonError(_) => {
            ("PARSE_ERROR", "Ensure input matches the session JSON layout")
        }
        AnalysisError::MissingColumn { .. } => {
            ("MISSING_COLUMN", "Add the column to the table or drop the table from the session")
        }
        AnalysisError::NonMonotonicTimestamps { .. }
        | AnalysisError::UnorderedEvents { .. }
        | AnalysisError::InvalidTimestamp { .. }
        | AnalysisError::DuplicateFrame { .. } => {
            ("PRECONDITION_FAILED", "Re-run with --sanitize to drop duplicates and sort by time")
        }
        AnalysisError::EmptyStream(_) => ("NO_FRAMES", "Ensure the session contains at least one frame table"),
        AnalysisError::InvalidConfig(_) => ("INVALID_CONFIG", "Run 'vrsi config' for a valid configuration"),
        AnalysisError::Classifier(_) => ("CLASSIFIER_FAILED", "Check the fixation classifier and its parameters"),
        AnalysisError::InvariantViolation(_) => ("INVARIANT_VIOLATED", "Report this session; the counts disagree"),
    }
}
