//! wavetrace CLI
//!
//! Inspect waveform dumps from the command line: list changing signals,
//! run capped range queries and point lookups, render bounded summaries,
//! or sample a live viewer when no dump file is at hand.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wavetrace_core::{
    render_summary, CancelFlag, ConverterConfig, Markers, SampleRequest, SamplerConfig, Session,
    StopReason, SummaryOptions, TimeWindow, DEFAULT_CONVERTER, DEFAULT_RANGE_CAP,
};

mod viewer;

use viewer::HttpPointQuery;

/// Waveform transition index and live sampler
#[derive(Parser, Debug)]
#[command(name = "wavetrace")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Program used to convert FST dumps to VCD
    #[arg(long, global = true, env = "WAVETRACE_CONVERTER", default_value = DEFAULT_CONVERTER)]
    converter: String,
}

/// Marker pair and fallback bounds for the analysis window
#[derive(Args, Debug, Clone, Copy)]
struct WindowArgs {
    /// Primary marker position
    #[arg(long)]
    marker: Option<u64>,

    /// Secondary marker position
    #[arg(long)]
    alt_marker: Option<u64>,

    /// Window start used when markers do not set it
    #[arg(long, default_value = "0")]
    from: u64,

    /// Window end used when neither markers nor the dump set it
    #[arg(long, default_value = "10000")]
    to: u64,
}

impl WindowArgs {
    fn markers(&self) -> Markers {
        Markers::new(self.marker, self.alt_marker)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List signals that change in a dump
    Signals {
        /// VCD or FST dump
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Transitions of one signal inside the window
    Query {
        file: PathBuf,
        signal: String,

        #[command(flatten)]
        window: WindowArgs,

        /// Maximum transitions returned
        #[arg(long, default_value_t = DEFAULT_RANGE_CAP)]
        cap: usize,

        #[arg(long)]
        json: bool,
    },

    /// Value of one signal at a given time
    Value {
        file: PathBuf,
        signal: String,
        time: u64,
    },

    /// Bounded text summary of a dump
    Summary {
        file: PathBuf,

        /// Signals to include (default: all)
        #[arg(short, long = "signal")]
        signals: Vec<String>,

        #[command(flatten)]
        window: WindowArgs,

        /// Character budget for the whole summary
        #[arg(long, default_value = "8000")]
        max_chars: usize,
    },

    /// Sample signals from a live viewer
    Sample {
        /// Viewer point-query endpoint
        #[arg(long, default_value = "http://127.0.0.1:7878/values")]
        endpoint: String,

        /// Waveform identifier understood by the viewer
        #[arg(long)]
        uri: String,

        /// Signals to sample
        #[arg(short, long = "signal", required = true)]
        signals: Vec<String>,

        #[command(flatten)]
        window: WindowArgs,

        /// Sampling step in ticks
        #[arg(long, default_value = "1")]
        step: u64,

        /// Stop sampling after this many seconds, keeping partial results
        #[arg(long)]
        max_duration: Option<u64>,

        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let converter = ConverterConfig::with_program(cli.converter);

    match cli.command {
        Commands::Signals { file, json } => {
            let session = open_session(&file, &converter)?;
            list_signals(&session, json)?;
        }

        Commands::Query {
            file,
            signal,
            window,
            cap,
            json,
        } => {
            let session = open_session(&file, &converter)?;
            warn_unknown_signal(&session, &signal);
            let window = session.window(window.markers(), window.from, window.to);
            let hits = session
                .index()
                .query_transitions(&signal, window.start, window.end, cap);
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                println!("{signal} in {window}: {} transitions", hits.len());
                for t in &hits {
                    println!("  @{} {}", t.time, t.value);
                }
            }
        }

        Commands::Value { file, signal, time } => {
            let session = open_session(&file, &converter)?;
            warn_unknown_signal(&session, &signal);
            println!("{}", session.value_at(&signal, time));
        }

        Commands::Summary {
            file,
            signals,
            window,
            max_chars,
        } => {
            let session = open_session(&file, &converter)?;
            let window = session.window(window.markers(), window.from, window.to);
            let options = SummaryOptions {
                max_chars,
                signals,
                ..SummaryOptions::default()
            };
            print!(
                "{}",
                render_summary(&session.index(), session.metadata(), window, &options)
            );
        }

        Commands::Sample {
            endpoint,
            uri,
            signals,
            window,
            step,
            max_duration,
            json,
        } => {
            let request = SampleRequest {
                uri,
                window: sample_window(&window),
                step,
                signals,
            };
            run_sample(&endpoint, request, max_duration, json)?;
        }
    }

    Ok(())
}

fn open_session(file: &Path, converter: &ConverterConfig) -> Result<Session> {
    Session::open(file, converter).with_context(|| format!("failed to load {}", file.display()))
}

fn warn_unknown_signal(session: &Session, signal: &str) {
    if !session.index().contains(signal) {
        warn!(signal, "Signal has no transitions in this dump");
    }
}

/// Live sampling has no reported end yet; markers and defaults decide.
fn sample_window(args: &WindowArgs) -> TimeWindow {
    wavetrace_core::resolve_window(
        args.markers(),
        wavetrace_core::WindowDefaults {
            start: args.from,
            end: args.to,
            reported_end: None,
        },
    )
}

fn list_signals(session: &Session, json: bool) -> Result<()> {
    let index = session.index();
    let rows = index.list_signals();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    let meta = session.metadata();
    println!(
        "{} signals | timescale {} | end time {}",
        rows.len(),
        meta.timescale,
        meta.end_time
    );
    for row in rows {
        let width = session
            .signals()
            .iter()
            .find(|s| s.path == row.name)
            .map_or(1, |s| s.width);
        println!("  {:<48} [{}] {} transitions", row.name, width, row.transition_count);
    }
    Ok(())
}

fn run_sample(
    endpoint: &str,
    request: SampleRequest,
    max_duration: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut viewer = HttpPointQuery::new(endpoint).context("failed to create viewer client")?;
    let cancel = CancelFlag::new();

    if let Some(secs) = max_duration {
        let flag = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            flag.cancel();
        });
    }

    let (session, stop) = Session::sample(&mut viewer, &request, &SamplerConfig::default(), &cancel)
        .with_context(|| format!("sampling {} failed", request.uri))?;

    match stop {
        StopReason::Cancelled => warn!("Sampling cancelled; results are partial"),
        other => info!(stop = ?other, "Sampling done"),
    }

    if json {
        let index = session.index();
        let hits: Vec<_> = index
            .list_signals()
            .iter()
            .flat_map(|s| index.query_transitions(&s.name, 0, u64::MAX, usize::MAX))
            .collect();
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        let window = request.window;
        print!(
            "{}",
            render_summary(
                &session.index(),
                session.metadata(),
                window,
                &SummaryOptions::default()
            )
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_args() {
        let cli = Cli::try_parse_from([
            "wavetrace", "query", "sim.vcd", "tb.clk", "--marker", "120", "--alt-marker", "80",
        ])
        .unwrap();
        let Commands::Query {
            signal, window, cap, ..
        } = cli.command
        else {
            panic!("expected query");
        };
        assert_eq!(signal, "tb.clk");
        assert_eq!(cap, DEFAULT_RANGE_CAP);
        assert_eq!(window.markers(), Markers::new(Some(120), Some(80)));
        assert_eq!(cli.converter, DEFAULT_CONVERTER);
    }

    #[test]
    fn test_sample_requires_signal() {
        let err = Cli::try_parse_from(["wavetrace", "sample", "--uri", "file:///a.vcd"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_sample_window_without_markers() {
        let cli = Cli::try_parse_from([
            "wavetrace", "-vv", "sample", "--uri", "u", "-s", "tb.clk", "--to", "400",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Sample { window, .. } = cli.command else {
            panic!("expected sample");
        };
        assert_eq!(sample_window(&window), TimeWindow::new(0, 400));
    }
}
