//! ringstress CLI
//!
//! Commands:
//! - replay: Run captured ring frames through a monitoring session
//! - decode: Decode hex frames into readings
//! - analyze: Summarize a recorded channel (timestamp/value pairs)
//! - doctor: Check configuration and baselines files
//! - schema: Print the packet channel vocabulary

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ringstress::baseline::analyze_session;
use ringstress::config::MonitorConfig;
use ringstress::decoder::{PacketDecoder, RawFrame};
use ringstress::difficulty::{AdaptiveState, DifficultyMapper, DifficultyProfile};
use ringstress::error::{ComputeError, ConfigError};
use ringstress::packet::{Channel, CHANNEL_VOCABULARY_VERSION};
use ringstress::queue::{frame_queue, spawn_consumer};
use ringstress::session::{MonitoringSession, SessionUpdate};
use ringstress::sink::{JsonLinesSink, PacketSink};
use ringstress::{PRODUCER_NAME, VERSION};

/// ringstress - stress state engine for wearable ring biosignals
#[derive(Parser)]
#[command(name = "ringstress")]
#[command(version = VERSION)]
#[command(about = "Decode ring frames and track a hysteretic stress state", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run captured frames through a monitoring session
    Replay(ReplayArgs),

    /// Decode hex frames into readings
    Decode {
        /// Single hex frame to decode
        #[arg(long)]
        hex: Option<String>,

        /// Input file with one hex frame per line (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Summarize a recorded channel (NDJSON of {"timestamp", "value"})
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration and baselines files
    Doctor {
        /// Monitor configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Saved baselines file
        #[arg(long)]
        baselines: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the packet channel vocabulary
    Schema {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ReplayArgs {
    /// Input file: NDJSON records ({"timestamp", "hex"} or {"heart_rate_hex"})
    /// or plain hex lines (use - for stdin)
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Output file path (use - for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Monitor configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the packet source tag
    #[arg(long)]
    source: Option<String>,

    /// Override the subject id
    #[arg(long)]
    subject: Option<String>,

    /// What to write per frame [default: updates]
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Performance score (0-1) fed to the difficulty mapper [default: 0.5]
    #[arg(long)]
    performance: Option<f64>,

    /// Push frames through the bounded queue and a consumer thread
    /// (packets only, heart-rate records are skipped)
    #[arg(long, conflicts_with_all = ["emit", "performance"])]
    threaded: bool,

    /// Load baselines from file
    #[arg(long)]
    load_baselines: Option<PathBuf>,

    /// Save baselines to file after processing
    #[arg(long)]
    save_baselines: Option<PathBuf>,
}

const DEFAULT_PERFORMANCE: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// One SignalPacket per line
    Packets,
    /// Session update plus difficulty decision per line
    Updates,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{PRODUCER_NAME}=info,warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .try_init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), RingCliError> {
    match cli.command {
        Commands::Replay(args) => cmd_replay(args),
        Commands::Decode { hex, input } => cmd_decode(hex.as_deref(), &input),
        Commands::Analyze { input, json } => cmd_analyze(&input, json),
        Commands::Doctor {
            config,
            baselines,
            json,
        } => cmd_doctor(config.as_deref(), baselines.as_deref(), json),
        Commands::Schema { json } => cmd_schema(json),
    }
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>, RingCliError> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(fs::File::open(path)?)))
    }
}

fn open_output(path: &Path) -> Result<Box<dyn Write + Send>, RingCliError> {
    if path.as_os_str() == "-" {
        Ok(Box::new(io::stdout()))
    } else {
        Ok(Box::new(BufWriter::new(fs::File::create(path)?)))
    }
}

/// Non-empty, non-comment lines with their 1-based line numbers
fn content_lines(reader: Box<dyn BufRead>) -> impl Iterator<Item = io::Result<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .map(|(index, line)| line.map(|l| (index + 1, l.trim().to_string())))
        .filter(|item| match item {
            Ok((_, l)) => !l.is_empty() && !l.starts_with('#'),
            Err(_) => true,
        })
}

// ============================================================================
// replay
// ============================================================================

#[derive(Deserialize)]
struct ReplayRecord {
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    hex: Option<String>,
    #[serde(default)]
    heart_rate_hex: Option<String>,
}

enum ReplayInput {
    Frame(RawFrame),
    HeartRate(Vec<u8>),
}

fn parse_replay_line(line: &str) -> Result<ReplayInput, ComputeError> {
    if !line.starts_with('{') {
        return Ok(ReplayInput::Frame(RawFrame::from_hex(line, None)?));
    }
    let record: ReplayRecord = serde_json::from_str(line)?;
    match (record.hex, record.heart_rate_hex) {
        (Some(hex), _) => Ok(ReplayInput::Frame(RawFrame::from_hex(&hex, record.timestamp)?)),
        (None, Some(hex)) => Ok(ReplayInput::HeartRate(RawFrame::from_hex(&hex, None)?.bytes)),
        (None, None) => Err(ComputeError::ParseError(
            "record has neither `hex` nor `heart_rate_hex`".to_string(),
        )),
    }
}

#[derive(Serialize)]
struct ReplayOutput<'a> {
    #[serde(flatten)]
    update: &'a SessionUpdate,
    adaptive_state: AdaptiveState,
    profile: DifficultyProfile,
}

fn cmd_replay(args: ReplayArgs) -> Result<(), RingCliError> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(source) = args.source.clone() {
        config.source = source;
    }
    if let Some(subject) = args.subject.clone() {
        config.subject_id = Some(subject);
    }

    let mut session = MonitoringSession::from_config(&config);
    if let Some(path) = &args.load_baselines {
        session.load_baselines(&fs::read_to_string(path)?)?;
    }
    info!(session_id = %session.session_id(), source = %config.source, "replay started");

    let input = open_input(&args.input)?;
    let output = open_output(&args.output)?;

    let session = if args.threaded {
        replay_threaded(input, output, session, &config)?
    } else {
        let mapper = DifficultyMapper::new(config.difficulty);
        replay_sequential(input, output, session, &mapper, &args)?
    };

    let stats = session.stats();
    info!(
        frames = stats.frames_ingested,
        rejected = stats.frames_rejected,
        transitions = stats.transitions,
        final_state = session.state().as_str(),
        "replay finished"
    );

    if let Some(path) = &args.save_baselines {
        fs::write(path, session.save_baselines()?)?;
    }
    Ok(())
}

fn replay_sequential(
    input: Box<dyn BufRead>,
    mut output: Box<dyn Write + Send>,
    mut session: MonitoringSession,
    mapper: &DifficultyMapper,
    args: &ReplayArgs,
) -> Result<MonitoringSession, RingCliError> {
    let emit = args.emit.unwrap_or(Emit::Updates);
    let performance = args.performance.unwrap_or(DEFAULT_PERFORMANCE);
    for item in content_lines(input) {
        let (line_no, line) = item?;
        let record = match parse_replay_line(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping unparsable line");
                continue;
            }
        };

        match record {
            ReplayInput::HeartRate(bytes) => {
                if let Err(e) = session.ingest_heart_rate(&bytes) {
                    warn!(line = line_no, error = %e, "skipping heart-rate record");
                }
            }
            ReplayInput::Frame(frame) => match session.ingest_frame(&frame) {
                Ok(update) => write_update(output.as_mut(), &update, emit, mapper, performance)?,
                Err(e) => warn!(line = line_no, error = %e, "skipping frame"),
            },
        }
    }

    output.flush()?;
    Ok(session)
}

fn write_update(
    out: &mut dyn Write,
    update: &SessionUpdate,
    emit: Emit,
    mapper: &DifficultyMapper,
    performance: f64,
) -> Result<(), RingCliError> {
    match emit {
        Emit::Packets => serde_json::to_writer(&mut *out, &update.packet)?,
        Emit::Updates => {
            let adaptive_state = mapper.decide_state(update.smoothed_score, performance);
            let line = ReplayOutput {
                update,
                adaptive_state,
                profile: mapper.build_profile(adaptive_state),
            };
            serde_json::to_writer(&mut *out, &line)?;
        }
    }
    out.write_all(b"\n")?;
    Ok(())
}

fn replay_threaded(
    input: Box<dyn BufRead>,
    output: Box<dyn Write + Send>,
    session: MonitoringSession,
    config: &MonitorConfig,
) -> Result<MonitoringSession, RingCliError> {
    let (tx, rx) = frame_queue(config.queue_capacity)?;
    let sinks: Vec<Box<dyn PacketSink + Send>> = vec![Box::new(JsonLinesSink::new(output))];
    let handle = spawn_consumer(rx, session, sinks)?;

    for item in content_lines(input) {
        let (line_no, line) = item?;
        match parse_replay_line(&line) {
            Ok(ReplayInput::Frame(frame)) => {
                tx.push(frame);
            }
            Ok(ReplayInput::HeartRate(_)) => {
                warn!(line = line_no, "heart-rate records are not queued, skipping")
            }
            Err(e) => warn!(line = line_no, error = %e, "skipping unparsable line"),
        }
    }
    drop(tx);

    let (session, report) = handle.join().map_err(|_| RingCliError::ConsumerPanicked)?;
    info!(
        processed = report.frames_processed,
        decode_errors = report.decode_errors,
        dropped = report.frames_dropped,
        "consumer joined"
    );
    Ok(session)
}

// ============================================================================
// decode
// ============================================================================

fn cmd_decode(hex: Option<&str>, input: &Path) -> Result<(), RingCliError> {
    if let Some(hex) = hex {
        let reading = RawFrame::from_hex(hex, None)?.decode()?;
        println!("{}", serde_json::to_string_pretty(&reading.summary())?);
        return Ok(());
    }

    let mut stdout = io::stdout();
    for item in content_lines(open_input(input)?) {
        let (line_no, line) = item?;
        match RawFrame::from_hex(&line, None).and_then(|frame| PacketDecoder::decode(&frame.bytes)) {
            Ok(reading) => serde_json::to_writer(&mut stdout, &reading.summary())?,
            Err(e) => serde_json::to_writer(
                &mut stdout,
                &serde_json::json!({ "line": line_no, "error": e.to_string() }),
            )?,
        }
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

// ============================================================================
// analyze
// ============================================================================

#[derive(Deserialize)]
struct RecordedValue {
    timestamp: f64,
    value: f64,
}

fn cmd_analyze(input: &Path, json: bool) -> Result<(), RingCliError> {
    let mut readings = Vec::new();
    for item in content_lines(open_input(input)?) {
        let (line_no, line) = item?;
        let recorded: RecordedValue = serde_json::from_str(&line)
            .map_err(|e| RingCliError::ParseError(format!("line {line_no}: {e}")))?;
        readings.push((recorded.timestamp, recorded.value));
    }

    let stats = analyze_session(&readings).ok_or(RingCliError::NoReadings)?;

    if json {
        let report = serde_json::json!({
            "stats": stats,
            "interpretation": stats.interpret(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Session Analysis");
        println!("================");
        println!("{stats}");
    }
    Ok(())
}

// ============================================================================
// doctor
// ============================================================================

fn check_file<T>(name: &str, path: &Path, parse: impl Fn(&str) -> Result<T, ComputeError>) -> DoctorCheck {
    let (status, message) = if !path.exists() {
        (CheckStatus::Warning, format!("{} does not exist", path.display()))
    } else {
        match fs::read_to_string(path) {
            Ok(content) => match parse(&content) {
                Ok(_) => (CheckStatus::Ok, format!("{} is valid", path.display())),
                Err(e) => (CheckStatus::Error, format!("Invalid {name}: {e}")),
            },
            Err(e) => (CheckStatus::Error, format!("Cannot read {}: {e}", path.display())),
        }
    };
    DoctorCheck {
        name: name.to_string(),
        status,
        message,
    }
}

fn cmd_doctor(config: Option<&Path>, baselines: Option<&Path>, json: bool) -> Result<(), RingCliError> {
    let mut checks = vec![DoctorCheck {
        name: "vocabulary".to_string(),
        status: CheckStatus::Ok,
        message: format!("Channel vocabulary {CHANNEL_VOCABULARY_VERSION}"),
    }];

    if let Some(path) = config {
        checks.push(check_file("config", path, MonitorConfig::from_json));
    }

    if let Some(path) = baselines {
        checks.push(check_file("baselines", path, |content| {
            MonitoringSession::default().load_baselines(content)
        }));
    }

    let stdin_message = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (replay ready)"
    };
    checks.push(DoctorCheck {
        name: "stdin".to_string(),
        status: CheckStatus::Ok,
        message: stdin_message.to_string(),
    });

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("ringstress Doctor Report");
        println!("========================");
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

    if report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(RingCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// ============================================================================
// schema
// ============================================================================

#[derive(Serialize)]
struct ChannelEntry {
    name: &'static str,
    kind: ringstress::packet::ChannelKind,
    description: &'static str,
}

fn cmd_schema(json: bool) -> Result<(), RingCliError> {
    if json {
        let channels: Vec<ChannelEntry> = Channel::ALL
            .iter()
            .map(|c| ChannelEntry {
                name: c.as_str(),
                kind: c.kind(),
                description: c.description(),
            })
            .collect();
        let schema = serde_json::json!({
            "version": CHANNEL_VOCABULARY_VERSION,
            "channels": channels,
        });
        println!("{}", serde_json::to_string_pretty(&schema)?);
    } else {
        println!("Channel vocabulary: {CHANNEL_VOCABULARY_VERSION}");
        println!();
        for channel in Channel::ALL {
            let map = match channel.kind() {
                ringstress::packet::ChannelKind::Signal => "signals",
                ringstress::packet::ChannelKind::Feature => "features",
            };
            println!("  {:<16} {:<9} {}", channel.as_str(), map, channel.description());
        }
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum RingCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoReadings,
    DoctorFailed,
    ConsumerPanicked,
    ParseError(String),
}

impl From<io::Error> for RingCliError {
    fn from(e: io::Error) -> Self {
        RingCliError::Io(e)
    }
}

impl From<ComputeError> for RingCliError {
    fn from(e: ComputeError) -> Self {
        RingCliError::Compute(e)
    }
}

impl From<ringstress::error::DecodeError> for RingCliError {
    fn from(e: ringstress::error::DecodeError) -> Self {
        RingCliError::Compute(e.into())
    }
}

impl From<ConfigError> for RingCliError {
    fn from(e: ConfigError) -> Self {
        RingCliError::Compute(e.into())
    }
}

impl From<serde_json::Error> for RingCliError {
    fn from(e: serde_json::Error) -> Self {
        RingCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<RingCliError> for CliError {
    fn from(e: RingCliError) -> Self {
        match e {
            RingCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            RingCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::Config(_) => ("CONFIG_ERROR", "Run 'ringstress doctor --config <file>'"),
                    ComputeError::Decode(_) => ("DECODE_ERROR", "Frames need at least 15 bytes of hex"),
                    _ => ("COMPUTE_ERROR", "Check input format"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            RingCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            RingCliError::NoReadings => CliError {
                code: "NO_READINGS".to_string(),
                message: "No readings found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            RingCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            RingCliError::ConsumerPanicked => CliError {
                code: "CONSUMER_PANICKED".to_string(),
                message: "The consumer thread panicked".to_string(),
                hint: None,
            },
            RingCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Expected one {\"timestamp\", \"value\"} object per line".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn replay_args(argv: &[&str]) -> Result<ReplayArgs, clap::Error> {
        let cli = Cli::try_parse_from(argv)?;
        match cli.command {
            Commands::Replay(args) => Ok(args),
            _ => panic!("expected replay command"),
        }
    }

    #[test]
    fn test_threaded_rejects_update_options() {
        for extra in [["--emit", "updates"], ["--performance", "0.9"]] {
            let mut argv = vec!["ringstress", "replay", "--threaded"];
            argv.extend(extra);
            let err = replay_args(&argv).err().unwrap();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        }
    }

    #[test]
    fn test_replay_option_defaults() {
        let threaded = replay_args(&["ringstress", "replay", "--threaded"]).unwrap();
        assert!(threaded.threaded);
        assert_eq!(threaded.emit, None);

        let sequential = replay_args(&["ringstress", "replay", "--emit", "packets", "--performance", "0.8"]).unwrap();
        assert!(!sequential.threaded);
        assert_eq!(sequential.emit, Some(Emit::Packets));
        assert_eq!(sequential.performance, Some(0.8));
    }
}
