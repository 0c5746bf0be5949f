use std::path::PathBuf;
use std::process::exit;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tokio::{signal, time};

use netstats::{
    NetworkStats, StatsTables, UID_ALL, aggregate, config::Config, parse::ParsedStats,
    unknown_iface::UnknownInterfaceTracker,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "netstats")]
#[command(about = "Per-uid and per-interface traffic statistics reader", long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump per-(uid, tag, interface) records
    Detail(DumpArgs),
    /// Dump per-interface records
    Dev(DumpArgs),
    /// Total traffic of one uid, or "all"
    Uid {
        #[arg(value_parser = parse_uid)]
        uid: u32,
    },
    /// Total traffic of an interface name
    Iface(IfaceArgs),
    /// Raw counters of one interface index
    Ifindex { index: u32 },
    /// Record an interface name so its traffic can be attributed
    RegisterIface { name: String },
    /// Remove stale socket tag mappings once
    Clean,
    /// Periodically clean the tag map and print interface snapshots
    Watch {
        /// Seconds between passes; overrides the config file
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
    },
}

#[derive(Args)]
struct DumpArgs {
    /// Merge records that share interface, uid, set and tag
    #[arg(long)]
    group: bool,
}

#[derive(Args)]
struct IfaceArgs {
    /// Interface name
    #[arg(required_unless_present = "all")]
    name: Option<String>,
    /// Sum every interface that still has a name
    #[arg(long, conflicts_with = "name")]
    all: bool,
}

fn parse_uid(raw: &str) -> Result<u32, String> {
    if raw.eq_ignore_ascii_case("all") {
        return Ok(UID_ALL);
    }
    raw.parse::<u32>()
        .map_err(|e| format!("invalid uid '{raw}': {e}"))
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("netstats error: {err:?}");
        exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let Some(command) = cli.command else {
        Cli::command().print_help().ok();
        println!();
        return Ok(());
    };

    let cfg = Config::load_or_default(cli.config.as_deref())?;
    let tables = StatsTables::open_pinned(&cfg.maps).context("failed to open stats maps")?;
    let stats = NetworkStats::from_config(tables, &cfg);

    match command {
        Commands::Detail(args) => {
            let parsed = stats.parse_detail().context("failed to read detail stats")?;
            print_records(parsed, args.group)?;
        }
        Commands::Dev(args) => {
            let parsed = stats.parse_device().context("failed to read device stats")?;
            print_records(parsed, args.group)?;
        }
        Commands::Uid { uid } => print_json(&stats.total_for_owner(uid)?)?,
        Commands::Iface(args) => {
            let total = match args.name {
                Some(name) => stats.total_for_interface_name(&name)?,
                None => stats.total_all_interfaces()?,
            };
            print_json(&total)?;
        }
        Commands::Ifindex { index } => print_json(&stats.total_for_interface_index(index)?)?,
        Commands::RegisterIface { name } => {
            let index = stats
                .register_interface(&name)
                .with_context(|| format!("failed to register {name}"))?;
            println!("{name} -> {index}");
        }
        Commands::Clean => {
            let report = stats.clean_tag_map().context("tag map cleanup failed")?;
            if report.unreadable_rows > 0 {
                println!(
                    "cleanup refused: {} unreadable detail rows, scanned {} deleted 0",
                    report.unreadable_rows, report.scanned
                );
            } else {
                println!(
                    "scanned {} deleted {} already gone {} failed {}",
                    report.scanned, report.deleted, report.already_absent, report.failed
                );
            }
        }
        Commands::Watch { interval_secs } => {
            let interval = interval_secs
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| cfg.clean_interval());
            watch(&stats, interval).await?;
        }
    }

    Ok(())
}

fn print_records(mut parsed: ParsedStats, group: bool) -> Result<()> {
    if group {
        aggregate::group(&mut parsed.records);
    }
    for record in &parsed.records {
        print_json(record)?;
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

async fn watch(stats: &NetworkStats, interval: Duration) -> Result<()> {
    let mut ticker = time::interval(interval);
    // One tracking context for the whole run: the unknown-interface alert
    // fires at most once per process.
    let mut tracker = stats.new_tracker();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match stats.clean_tag_map() {
                    Ok(report) if report.unreadable_rows > 0 => {
                        log::warn!(
                            "tag map cleanup refused: {} unreadable detail rows",
                            report.unreadable_rows
                        );
                    }
                    Ok(report) if report.deleted > 0 => {
                        log::info!("removed {} stale tag mappings", report.deleted);
                    }
                    Ok(_) => {}
                    Err(err) => log::warn!("tag map cleanup failed: {err}"),
                }
                log_snapshot(stats, &mut tracker);
            }
            res = signal::ctrl_c() => {
                res.context("failed to wait for shutdown signal")?;
                log::info!("Received shutdown signal, exiting");
                return Ok(());
            }
        }
    }
}

fn log_snapshot(stats: &NetworkStats, tracker: &mut UnknownInterfaceTracker) {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    match stats.parse_device_with(tracker) {
        Ok(mut parsed) => {
            aggregate::group(&mut parsed.records);
            for record in &parsed.records {
                println!("[{timestamp}] {record}");
            }
        }
        Err(err) => log::warn!("device snapshot failed: {err}"),
    }
}
