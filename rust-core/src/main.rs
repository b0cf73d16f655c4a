//! unlock-replay: drive the unlock monitor from a recorded script.
//!
//! Each script line is one host callback:
//!
//! ```text
//! # comment
//! tilt <ms> <radians>
//! lock <ms> <0|1|locked|unlocked>
//! tick <ms>
//! poll <ms>
//! unavailable
//! stop
//! start
//! ```
//!
//! The monitor starts before the first line. Every event it emits is printed
//! to stdout as one JSON record per line; logs go to stderr.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use unlock_sensing::alarm::RefirePolicy;
use unlock_sensing::monitor::{MonitorConfig, UnlockMonitor};
use unlock_sensing::types::LockSignal;
use unlock_sensing::window::DispersionMetric;

/// Replay a tilt/lock script through the unlock monitor
#[derive(Parser, Debug)]
#[command(name = "unlock-replay")]
#[command(version)]
#[command(about = "Replay recorded sensor callbacks and print monitor events as JSON", long_about = None)]
struct Cli {
    /// Script file; reads stdin when omitted or "-"
    script: Option<PathBuf>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the window capacity in samples
    #[arg(short, long)]
    window_capacity: Option<usize>,

    /// Use standard deviation instead of range for oscillation
    #[arg(long)]
    std_dev: bool,

    /// Re-fire the alarm on every evaluation while the condition holds
    #[arg(long)]
    level_triggered: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

/// One parsed script line.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ScriptLine {
    Tilt { at_ms: u64, radians: f64 },
    Lock { at_ms: u64, signal: LockSignal },
    Tick { at_ms: u64 },
    Poll { at_ms: u64 },
    Unavailable,
    Start,
    Stop,
}

fn parse_ms(field: Option<&str>) -> Result<u64> {
    let field = field.ok_or_else(|| anyhow!("missing timestamp"))?;
    field
        .parse()
        .with_context(|| format!("bad timestamp `{field}`"))
}

impl FromStr for ScriptLine {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let verb = fields.next().ok_or_else(|| anyhow!("empty line"))?;
        let command = match verb {
            "tilt" => {
                let at_ms = parse_ms(fields.next())?;
                let value = fields.next().ok_or_else(|| anyhow!("missing tilt value"))?;
                let radians = value
                    .parse()
                    .with_context(|| format!("bad tilt value `{value}`"))?;
                ScriptLine::Tilt { at_ms, radians }
            }
            "lock" => {
                let at_ms = parse_ms(fields.next())?;
                let signal = match fields.next() {
                    Some("1") | Some("locked") => LockSignal::Locked,
                    Some("0") | Some("unlocked") => LockSignal::Unlocked,
                    Some(other) => bail!("bad lock value `{other}`"),
                    None => bail!("missing lock value"),
                };
                ScriptLine::Lock { at_ms, signal }
            }
            "tick" => ScriptLine::Tick {
                at_ms: parse_ms(fields.next())?,
            },
            "poll" => ScriptLine::Poll {
                at_ms: parse_ms(fields.next())?,
            },
            "unavailable" => ScriptLine::Unavailable,
            "start" => ScriptLine::Start,
            "stop" => ScriptLine::Stop,
            other => bail!("unknown command `{other}`"),
        };
        if let Some(extra) = fields.next() {
            bail!("unexpected argument `{extra}`");
        }
        Ok(command)
    }
}

fn load_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            MonitorConfig::from_json_str(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => MonitorConfig::default(),
    };
    if let Some(capacity) = cli.window_capacity {
        config.tilt.window_capacity = Some(capacity);
    }
    if cli.std_dev {
        config.tilt.dispersion = DispersionMetric::StdDev;
    }
    if cli.level_triggered {
        config.alarm.refire = RefirePolicy::LevelTriggered;
    }
    config.validate()?;
    Ok(config)
}

fn apply(monitor: &mut UnlockMonitor, command: ScriptLine) {
    match command {
        ScriptLine::Tilt { at_ms, radians } => monitor.on_tilt_sample(radians, at_ms),
        ScriptLine::Lock { at_ms, signal } => monitor.on_lock_signal(signal, at_ms),
        ScriptLine::Tick { at_ms } => {
            monitor.on_tick(at_ms);
        }
        ScriptLine::Poll { at_ms } => {
            monitor.poll(at_ms);
        }
        ScriptLine::Unavailable => {
            monitor.on_sensor_unavailable();
        }
        ScriptLine::Start => {
            monitor.start();
        }
        ScriptLine::Stop => {
            monitor.stop();
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let mut monitor = UnlockMonitor::new(config)?;
    let events = monitor.listen();

    let input: Box<dyn BufRead> = match &cli.script {
        Some(path) if path.to_str() != Some("-") => Box::new(BufReader::new(
            fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        _ => Box::new(BufReader::new(io::stdin())),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut commands = 0u64;

    for (index, line) in input.lines().enumerate() {
        let line = line.context("reading script")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command: ScriptLine = line
            .parse()
            .with_context(|| format!("line {}: `{line}`", index + 1))?;
        debug!(?command, "replaying");
        apply(&mut monitor, command);
        commands += 1;

        for record in events.try_iter() {
            writeln!(out, "{record}")?;
        }
    }

    monitor.unlisten();
    for record in events.try_iter() {
        writeln!(out, "{record}")?;
    }
    out.flush()?;

    let stats = monitor.sink().stats();
    info!(
        commands,
        delivered = stats.delivered,
        dropped = stats.dropped_no_listener,
        queue_full = stats.dropped_queue_full,
        encode_failures = stats.encode_failures,
        alarms = monitor.alarm_count(),
        "replay finished"
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    run(&cli)
}
