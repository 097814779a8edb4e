//! Phenoflow CLI - Command-line interface for per-participant feature runs
//!
//! Commands:
//! - features: Compute the full feature report from local event files
//! - frame: Build and export the daily frame as CSV
//! - fetch: Pull events from a sensing server and compute features (api feature)
//! - doctor: Diagnose configuration and input health

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use phenoflow::bins::BinOptions;
use phenoflow::client::{EventSource, StaticSource};
use phenoflow::export::{bins_to_csv, frame_to_csv, FeatureReport, TrajectoryReport};
use phenoflow::frame::FrameOptions;
use phenoflow::localize::{parse_timezone, FixedTimezone};
use phenoflow::pipeline::ParticipantPipeline;
use phenoflow::surveys::QuestionCategories;
use phenoflow::trajectory::{cluster_days, TrajectoryMetric};
use phenoflow::types::{Activity, ActivityEvent, SensorEvent};
use phenoflow::{FeatureError, PHENOFLOW_VERSION, PRODUCER_NAME};

/// Phenoflow - Behavioral feature engine for digital phenotyping studies
#[derive(Parser)]
#[command(name = "phenoflow")]
#[command(version = PHENOFLOW_VERSION)]
#[command(about = "Derive behavioral features from sensing and survey data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the full feature report from local event files
    Features {
        #[command(flatten)]
        inputs: InputFiles,

        #[command(flatten)]
        options: RunOptions,

        /// Output file path for the JSON report (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Build the daily frame and export it as CSV
    Frame {
        #[command(flatten)]
        inputs: InputFiles,

        #[command(flatten)]
        options: RunOptions,

        /// Output file path for the frame CSV (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Also write the binned frame CSV to this path
        #[arg(long)]
        bins: Option<PathBuf>,
    },

    /// Pull events from a sensing server and compute features
    #[cfg(feature = "api")]
    Fetch {
        /// Sensing server base URL
        #[arg(long)]
        url: String,

        /// Credential for the Authorization header
        #[arg(long)]
        credential: Option<String>,

        /// Window start (UTC milliseconds)
        #[arg(long)]
        from: Option<i64>,

        /// Window end (UTC milliseconds)
        #[arg(long)]
        to: Option<i64>,

        #[command(flatten)]
        options: RunOptions,

        /// Output file path for the JSON report (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Diagnose configuration and input health
    Doctor {
        /// Check a question-category mapping file
        #[arg(long)]
        categories: Option<PathBuf>,

        /// Check a timezone name
        #[arg(long)]
        timezone: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct InputFiles {
    /// Sensor events, NDJSON (one event per line; use - for stdin)
    #[arg(long)]
    sensor_events: Option<PathBuf>,

    /// Activity definitions, JSON array
    #[arg(long)]
    activities: Option<PathBuf>,

    /// Activity events, NDJSON
    #[arg(long)]
    activity_events: Option<PathBuf>,
}

#[derive(clap::Args)]
struct RunOptions {
    /// Participant id stamped into outputs
    #[arg(long, default_value = "participant")]
    participant: String,

    /// Fallback timezone (IANA format, e.g. "America/New_York")
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// Question-category mapping file (JSON)
    #[arg(long)]
    categories: Option<PathBuf>,

    /// Restrict features to these domains
    #[arg(long, value_delimiter = ',')]
    domains: Option<Vec<String>>,

    /// Cap on the number of frame days
    #[arg(long, default_value = "120")]
    days_cap: i64,

    /// Walk the frame start back to the preceding Monday
    #[arg(long)]
    start_monday: bool,

    /// Match survey points to the closest grid date instead of the preceding one
    #[arg(long)]
    time_centered: bool,

    /// Bin width in days
    #[arg(long, default_value = "3")]
    bin_window: usize,

    /// Largest domain-group size for transition tables
    #[arg(long, default_value = "1")]
    joint_size: usize,

    /// Z-score the frame before deriving features
    #[arg(long)]
    normalize: bool,

    /// Day-trajectory distance metric
    #[arg(long, value_enum, default_value = "frechet")]
    metric: MetricArg,

    /// Distance threshold (km) under which trajectory days cluster together
    #[arg(long, default_value = "1.0")]
    cluster_threshold: f64,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    /// Dynamic time warping
    Dtw,
    /// Discrete Fréchet
    Frechet,
}

impl From<MetricArg> for TrajectoryMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Dtw => TrajectoryMetric::Dtw,
            MetricArg::Frechet => TrajectoryMetric::Frechet,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PhenoCliError> {
    match cli.command {
        Commands::Features {
            inputs,
            options,
            output,
        } => {
            let source = load_source(&inputs)?;
            let report = compute_report(&source, &options)?;
            write_output(&output, &report.to_json().map(|s| s + "\n")?)
        }

        Commands::Frame {
            inputs,
            options,
            output,
            bins,
        } => cmd_frame(&inputs, &options, &output, bins.as_deref()),

        #[cfg(feature = "api")]
        Commands::Fetch {
            url,
            credential,
            from,
            to,
            options,
            output,
        } => {
            let mut client = phenoflow::SensingClient::new(url);
            if let Some(credential) = credential {
                client = client.with_credential(credential);
            }
            let report = compute_report_window(&client, &options, from, to)?;
            write_output(&output, &report.to_json().map(|s| s + "\n")?)
        }

        Commands::Doctor {
            categories,
            timezone,
            json,
        } => cmd_doctor(categories.as_deref(), timezone.as_deref(), json),
    }
}

fn compute_report(
    source: &dyn EventSource,
    options: &RunOptions,
) -> Result<FeatureReport, PhenoCliError> {
    compute_report_window(source, options, None, None)
}

fn compute_report_window(
    source: &dyn EventSource,
    options: &RunOptions,
    from: Option<i64>,
    to: Option<i64>,
) -> Result<FeatureReport, PhenoCliError> {
    let zone = FixedTimezone(parse_timezone(&options.timezone)?);
    let mut pipeline = ParticipantPipeline::new(source, &zone, zone.0)
        .with_options(frame_options(options));
    if let Some(categories) = load_categories(options)? {
        pipeline = pipeline.with_categories(categories);
    }
    if let Some(domains) = &options.domains {
        pipeline = pipeline.with_domains(domains.clone());
    }

    let mut participant = pipeline.run(&options.participant, from, to)?;
    participant.impute()?;
    if options.normalize {
        participant.normalize(None)?;
    }
    participant.bin(&BinOptions {
        window_size: options.bin_window,
        ..BinOptions::default()
    })?;

    let metric = TrajectoryMetric::from(options.metric);
    let matrix = participant.trajectory_matrix(metric);
    let clusters = cluster_days(&matrix, options.cluster_threshold);

    let mut report = FeatureReport::new(&options.participant)
        .with_bouts(participant.bouts()?)
        .with_transitions(participant.transitions(options.joint_size)?);
    if !clusters.assignments.is_empty() {
        report = report.with_trajectory(TrajectoryReport::new(metric, clusters));
    }
    Ok(report)
}

fn cmd_frame(
    inputs: &InputFiles,
    options: &RunOptions,
    output: &Path,
    bins_path: Option<&Path>,
) -> Result<(), PhenoCliError> {
    let source = load_source(inputs)?;
    let zone = FixedTimezone(parse_timezone(&options.timezone)?);
    let mut pipeline = ParticipantPipeline::new(&source, &zone, zone.0)
        .with_options(frame_options(options));
    if let Some(categories) = load_categories(options)? {
        pipeline = pipeline.with_categories(categories);
    }
    if let Some(domains) = &options.domains {
        pipeline = pipeline.with_domains(domains.clone());
    }

    let mut participant = pipeline.run(&options.participant, None, None)?;
    participant.impute()?;
    if options.normalize {
        participant.normalize(None)?;
    }

    let frame = participant
        .frame
        .as_ref()
        .ok_or_else(|| FeatureError::NoData(options.participant.clone()))?;
    let mut buffer = Vec::new();
    frame_to_csv(frame, &mut buffer)?;
    write_output(output, &String::from_utf8_lossy(&buffer))?;

    if let Some(bins_path) = bins_path {
        participant.bin(&BinOptions {
            window_size: options.bin_window,
            ..BinOptions::default()
        })?;
        let bins = participant.bins.as_ref().ok_or(FeatureError::NotBinned)?;
        let mut buffer = Vec::new();
        bins_to_csv(bins, &mut buffer)?;
        fs::write(bins_path, buffer)?;
    }

    Ok(())
}

fn cmd_doctor(
    categories: Option<&Path>,
    timezone: Option<&str>,
    json: bool,
) -> Result<(), PhenoCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("phenoflow {}", PHENOFLOW_VERSION),
    });

    if let Some(name) = timezone {
        checks.push(match parse_timezone(name) {
            Ok(zone) => DoctorCheck {
                name: "timezone".to_string(),
                status: CheckStatus::Ok,
                message: format!("Timezone valid: {}", zone.name()),
            },
            Err(e) => DoctorCheck {
                name: "timezone".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        });
    }

    if let Some(path) = categories {
        let check = if path.exists() {
            match fs::read_to_string(path)
                .map_err(PhenoCliError::Io)
                .and_then(|text| serde_json::from_str::<QuestionCategories>(&text).map_err(Into::into))
            {
                Ok(map) => DoctorCheck {
                    name: "categories".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Category mapping valid ({} questions)", map.len()),
                },
                Err(e) => DoctorCheck {
                    name: "categories".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid category mapping: {}", e),
                },
            }
        } else {
            DoctorCheck {
                name: "categories".to_string(),
                status: CheckStatus::Warning,
                message: "Category mapping file does not exist".to_string(),
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming input ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PHENOFLOW_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Phenoflow Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PhenoCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn frame_options(options: &RunOptions) -> FrameOptions {
    FrameOptions {
        days_cap: options.days_cap,
        start_monday: options.start_monday,
        time_centered: options.time_centered,
        ..FrameOptions::default()
    }
}

fn load_categories(options: &RunOptions) -> Result<Option<QuestionCategories>, PhenoCliError> {
    match &options.categories {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            Ok(Some(serde_json::from_str(&text)?))
        }
        None => Ok(None),
    }
}

fn load_source(inputs: &InputFiles) -> Result<StaticSource, PhenoCliError> {
    let sensor_events = match &inputs.sensor_events {
        Some(path) => parse_ndjson::<SensorEvent>(&read_input(path)?)?,
        None => Vec::new(),
    };
    let activities: Vec<Activity> = match &inputs.activities {
        Some(path) => serde_json::from_str(&read_input(path)?)?,
        None => Vec::new(),
    };
    let activity_events = match &inputs.activity_events {
        Some(path) => parse_ndjson::<ActivityEvent>(&read_input(path)?)?,
        None => Vec::new(),
    };

    if sensor_events.is_empty() && activity_events.is_empty() {
        return Err(PhenoCliError::NoEvents);
    }

    Ok(StaticSource::new(sensor_events, activities, activity_events))
}

fn parse_ndjson<T: serde::de::DeserializeOwned>(text: &str) -> Result<Vec<T>, PhenoCliError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(Into::into))
        .collect()
}

fn read_input(path: &Path) -> Result<String, PhenoCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), PhenoCliError> {
    if path.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", data)?;
        stdout.flush()?;
        Ok(())
    } else {
        fs::write(path, data)?;
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum PhenoCliError {
    Io(io::Error),
    Feature(FeatureError),
    Json(serde_json::Error),
    NoEvents,
    DoctorFailed,
}

impl std::fmt::Display for PhenoCliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhenoCliError::Io(e) => e.fmt(f),
            PhenoCliError::Feature(e) => e.fmt(f),
            PhenoCliError::Json(e) => e.fmt(f),
            PhenoCliError::NoEvents => write!(f, "No events found in input"),
            PhenoCliError::DoctorFailed => write!(f, "One or more health checks failed"),
        }
    }
}

impl From<io::Error> for PhenoCliError {
    fn from(e: io::Error) -> Self {
        PhenoCliError::Io(e)
    }
}

impl From<FeatureError> for PhenoCliError {
    fn from(e: FeatureError) -> Self {
        PhenoCliError::Feature(e)
    }
}

impl From<serde_json::Error> for PhenoCliError {
    fn from(e: serde_json::Error) -> Self {
        PhenoCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PhenoCliError> for CliError {
    fn from(e: PhenoCliError) -> Self {
        match e {
            PhenoCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PhenoCliError::Feature(e) => CliError {
                code: "FEATURE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check input events and run options".to_string()),
            },
            PhenoCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PhenoCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Provide --sensor-events or --activity-events".to_string()),
            },
            PhenoCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
