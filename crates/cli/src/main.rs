//! clamdctl - command-line client for the clamd scanning daemon.

mod cli;

use clamd_client::{eicar, Client, ScanResults};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cli::Command;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CLAMD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Something was detected.
const EXIT_FOUND: u8 = 1;
/// Transport, protocol, input or configuration failure.
const EXIT_ERROR: u8 = 2;

fn main() -> ExitCode {
    init_tracing();
    let cli = cli::Cli::parse();

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            warn!(%e, "invalid configuration");
            eprintln!("clamdctl: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
    };
    debug!(target = %config.target, timeout = ?config.timeout, "client configured");

    let client = Client::from_config(&config);
    match run(&client, &cli.command, cli.json) {
        Ok(code) => code,
        Err(e) => {
            warn!(%e, "command failed");
            eprintln!("clamdctl: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run(client: &Client, command: &Command, json: bool) -> eyre::Result<ExitCode> {
    match command {
        Command::Ping => {
            client.ping()?;
            println!("PONG");
        }
        Command::Version => println!("{}", client.version()?),
        Command::Reload => println!("{}", client.reload()?),
        Command::Shutdown => {
            client.shutdown()?;
            info!("shutdown sent");
        }
        Command::Scan { path } => return report(&client.scan(path)?, json),
        Command::Contscan { path } => return report(&client.contscan(path)?, json),
        Command::Multiscan { path } => return report(&client.multiscan(path)?, json),
        Command::Instream { eicar: true, .. } => {
            return report(&client.instream(eicar())?, json);
        }
        Command::Instream { file: Some(path), .. } => {
            let file = File::open(path)
                .map_err(|e| eyre::eyre!("failed to open {}: {e}", path.display()))?;
            return report(&client.instream(BufReader::new(file))?, json);
        }
        Command::Instream { file: None, .. } => {
            return report(&client.instream(std::io::stdin().lock())?, json);
        }
        Command::Stats => print!("{}", client.stats()?),
    }
    Ok(ExitCode::SUCCESS)
}

/// Print one line per entry (or a JSON object) and map the verdicts to an exit status.
fn report(results: &ScanResults, json: bool) -> eyre::Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        for entry in results.iter() {
            match entry.detail {
                Some(ref detail) => println!("{}: {detail} {}", entry.path, entry.status),
                None => println!("{}: {}", entry.path, entry.status),
            }
        }
    }

    let found = results.found().count();
    info!(entries = results.len(), found, "scan complete");
    if found > 0 {
        Ok(ExitCode::from(EXIT_FOUND))
    } else if results.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_ERROR))
    }
}
