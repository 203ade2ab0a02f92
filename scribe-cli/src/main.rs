use std::process;

use anyhow::Context;
use clap::Parser;
use pipeline_common::CancellationToken;
use scribe::cli::{Args, Commands};
use scribe::commands;
use tracing::{Level, error, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.quiet) {
        eprintln!("Error: failed to initialize logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let token = CancellationToken::new();

    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling in-flight work");
            signal_token.cancel();
        }
    });

    match args.command {
        Commands::Transcribe(transcribe_args) => {
            let report = commands::transcribe_files(transcribe_args, token)
                .await
                .context("transcribe failed")?;
            println!("{report}");
            if report.cancelled {
                anyhow::bail!("cancelled: {} file(s) not completed", report.not_completed);
            }
            if !report.faults.is_empty() {
                anyhow::bail!(
                    "{} pipeline fault(s), {} file(s) not completed",
                    report.faults.len(),
                    report.not_completed
                );
            }
        }
        Commands::Probe(probe_args) => {
            let out = commands::probe_file(probe_args, args.verbose, token)
                .await
                .context("probe failed")?;
            println!("{out}");
        }
    }
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}
