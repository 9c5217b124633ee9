//! Load generator CLI
//!
//! Runs one mode per invocation, or an interactive menu when no subcommand
//! is given. The queue lives for the whole process, so menu choices can build
//! on each other (fetch now, push later).

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use metrics_loadgen::{
    LoadConfig, LoadError, PhaseReport, Pipeline,
    pipeline::FullRunReport,
    util,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "loadgen")]
#[command(about = "Two-phase load generator for a load-balanced metrics pipeline", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Source base URL (overrides config and environment)
    #[arg(long, value_name = "URL", global = true)]
    source: Option<String>,

    /// Destination base URL (overrides config and environment)
    #[arg(long, value_name = "URL", global = true)]
    destination: Option<String>,

    /// Directory snapshots are written to
    #[arg(long, value_name = "DIR", global = true)]
    snapshot_dir: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Fetch phase followed by push phase
    Full {
        /// Records to collect before pushing
        #[arg(long)]
        target: Option<usize>,
    },

    /// Fetch phase only; the result is saved as a snapshot
    Fetch {
        #[arg(long)]
        target: Option<usize>,
    },

    /// Push phase over the records of a snapshot file
    Push {
        #[arg(long, value_name = "FILE")]
        snapshot: PathBuf,

        /// Stop once every record was delivered
        #[arg(long)]
        until_empty: bool,
    },

    /// Generate dummy records
    Dummy {
        #[arg(long, default_value_t = 2000)]
        count: usize,

        /// Push the generated records right away
        #[arg(long)]
        push: bool,
    },

    /// Deliver each fetched record immediately, without a queue
    Direct,

    /// Interactive menu (default)
    Menu,
}

fn init(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new()
        .with_targets(vec![("metrics_loadgen", level), ("loadgen", level)])
        .with_default(LevelFilter::WARN);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let mut config = LoadConfig::load(args.config.as_deref())?;
    config.apply_overrides(util::env_lookup)?;
    apply_args(&args, &mut config);
    config.validate().context("invalid configuration")?;

    let pipeline = Pipeline::from_config(config)?;

    match args.command.unwrap_or(Command::Menu) {
        Command::Menu => menu(&pipeline).await,
        command => {
            let result = execute(&pipeline, command).await;
            if let Err(e) = &result {
                error!("{e:#}");
                save_queue(&pipeline).await;
            }
            result
        }
    }
}

fn apply_args(args: &Args, config: &mut LoadConfig) {
    if let Some(source) = &args.source {
        config.source_url = source.clone();
    }
    if let Some(destination) = &args.destination {
        config.destination_url = destination.clone();
    }
    if let Some(dir) = &args.snapshot_dir {
        config.snapshot_dir = dir.clone();
    }
    if let Some(Command::Full { target: Some(target) } | Command::Fetch { target: Some(target) }) =
        &args.command
    {
        config.target_records = *target;
    }
}

/// Cancellation token tripped by Ctrl-C while the returned listener runs
fn interrupt_token() -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping current phase");
            token.cancel();
        }
    });
    (cancel, listener)
}

async fn execute(pipeline: &Pipeline, command: Command) -> Result<()> {
    let (cancel, listener) = interrupt_token();

    let result = match command {
        Command::Full { .. } => pipeline.run_full(&cancel).await.map(print_full),
        Command::Fetch { .. } => pipeline.run_fetch(&cancel).await.map(|r| print_report(&r)),
        Command::Push {
            snapshot,
            until_empty,
        } => push_snapshot(pipeline, &snapshot, until_empty, &cancel).await,
        Command::Dummy { count, push } => dummy(pipeline, count, push, &cancel).await,
        Command::Direct => pipeline.run_direct(&cancel).await.map(|r| print_report(&r)),
        Command::Menu => Ok(()),
    };

    listener.abort();
    Ok(result?)
}

async fn push_snapshot(
    pipeline: &Pipeline,
    snapshot: &std::path::Path,
    until_empty: bool,
    cancel: &CancellationToken,
) -> Result<(), LoadError> {
    pipeline.load_snapshot(snapshot).await?;
    let report = pipeline.continue_push(until_empty, cancel).await?;
    print_report(&report);
    Ok(())
}

async fn dummy(
    pipeline: &Pipeline,
    count: usize,
    push: bool,
    cancel: &CancellationToken,
) -> Result<(), LoadError> {
    let path = pipeline.generate_dummy(count, push).await?;
    println!("dummy records saved to {}", path.display());

    if push {
        let report = pipeline.continue_push(true, cancel).await?;
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &PhaseReport) {
    println!(
        "{} phase: {} after {}s",
        report.kind,
        report.reason,
        report.elapsed.as_secs()
    );
    println!(
        "  fetched {} (rejected {}, failed {}) | delivered {} (requeued {}) | forwarded {} (failed {})",
        report.stats.fetched,
        report.stats.rejected,
        report.stats.fetch_failed,
        report.stats.delivered,
        report.stats.requeued,
        report.stats.forwarded,
        report.stats.forward_failed,
    );
    println!("  queue: {} records", report.queue_len);
    if let Some(path) = &report.snapshot {
        println!("  snapshot: {}", path.display());
    }
}

fn print_full(report: FullRunReport) {
    print_report(&report.fetch);
    match &report.push {
        Some(push) => print_report(push),
        None => println!("push phase skipped"),
    }
}

async fn save_queue(pipeline: &Pipeline) {
    match pipeline.persist_remaining().await {
        Ok(Some(path)) => info!("queue saved to {}", path.display()),
        Ok(None) => {}
        Err(e) => error!("failed to save queue: {e}"),
    }
}

const MENU: &str = "
  1) full run (fetch + push)
  2) fetch only
  3) push from snapshot file
  4) push in-memory records
  5) generate dummy records
  6) direct mode
  q) quit";

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, question: &str) -> Result<Option<String>> {
    print!("{question}");
    std::io::stdout().flush()?;

    tokio::select! {
        line = lines.next_line() => Ok(line?.map(|line| line.trim().to_string())),
        _ = tokio::signal::ctrl_c() => Ok(None),
    }
}

async fn menu(pipeline: &Pipeline) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("{MENU}");
        println!("  queue: {} records", pipeline.queue().len());
        let Some(choice) = prompt(&mut lines, "> ").await? else {
            break;
        };

        let command = match choice.as_str() {
            "1" => Command::Full { target: None },
            "2" => Command::Fetch { target: None },
            "3" => {
                let Some(path) = prompt(&mut lines, "snapshot file: ").await? else {
                    break;
                };
                Command::Push {
                    snapshot: PathBuf::from(path),
                    until_empty: false,
                }
            }
            "4" => {
                let (cancel, listener) = interrupt_token();
                match pipeline.continue_push(false, &cancel).await {
                    Ok(report) => print_report(&report),
                    Err(e) => error!("{e:#}"),
                }
                listener.abort();
                continue;
            }
            "5" => {
                let Some(count) = prompt(&mut lines, "how many records? [2000] ").await? else {
                    break;
                };
                let count = if count.is_empty() {
                    2000
                } else {
                    match count.parse() {
                        Ok(count) => count,
                        Err(_) => {
                            println!("not a number: {count}");
                            continue;
                        }
                    }
                };
                let Some(push) = prompt(&mut lines, "push them now? [y/N] ").await? else {
                    break;
                };
                Command::Dummy {
                    count,
                    push: push.eq_ignore_ascii_case("y"),
                }
            }
            "6" => Command::Direct,
            "q" | "quit" | "exit" => break,
            "" => continue,
            other => {
                println!("unknown choice: {other}");
                continue;
            }
        };

        if let Err(e) = execute(pipeline, command).await {
            error!("{e:#}");
        }
    }

    save_queue(pipeline).await;
    Ok(())
}
