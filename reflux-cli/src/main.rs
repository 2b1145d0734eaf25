mod scenario;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use scenario::ScenarioFile;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "reflux-cli")]
#[command(about = "Reflux CLI - verify reactive pipeline scenarios", long_about = None)]
struct Args {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every scenario in a file
    Verify {
        file: PathBuf,

        /// Only run scenarios whose name contains this text
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// List the scenarios in a file
    List { file: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    match args.command {
        Command::Verify { file, filter } => verify(file, filter),
        Command::List { file } => list(file),
    }
}

fn load(file: &PathBuf) -> Result<ScenarioFile> {
    ScenarioFile::from_file(file)
        .with_context(|| format!("failed to load scenarios from {}", file.display()))
}

fn list(file: PathBuf) -> Result<()> {
    let scenarios = load(&file)?;
    for scenario in &scenarios.scenarios {
        let clock = if scenario.virtual_time {
            "virtual"
        } else {
            "real"
        };
        println!(
            "{} {}",
            scenario.name.bold(),
            format!("({} time, {} steps)", clock, scenario.expect.len()).dimmed()
        );
    }
    Ok(())
}

fn verify(file: PathBuf, filter: Option<String>) -> Result<()> {
    let scenarios = load(&file)?;
    info!("Loaded {} scenarios from {}", scenarios.scenarios.len(), file.display());

    let (mut passed, mut failed) = (0usize, 0usize);
    for scenario in &scenarios.scenarios {
        if filter
            .as_deref()
            .is_some_and(|filter| !scenario.name.contains(filter))
        {
            debug!("Skipping scenario {}", scenario.name);
            continue;
        }

        match scenario.verify() {
            Ok(elapsed) => {
                passed += 1;
                println!(
                    "{} {} {}",
                    "PASS".green().bold(),
                    scenario.name,
                    format!("({:.2?})", elapsed).dimmed()
                );
            }
            Err(e) => {
                failed += 1;
                println!("{} {}", "FAIL".red().bold(), scenario.name);
                println!("     {}", e.to_string().red());
            }
        }
    }

    println!();
    println!(
        "{} passed, {} failed",
        passed.to_string().green(),
        failed.to_string().red()
    );

    if failed > 0 {
        bail!("{} scenario(s) failed", failed);
    }
    Ok(())
}
