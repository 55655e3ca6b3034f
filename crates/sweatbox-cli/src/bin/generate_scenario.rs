//! Generate a sweatbox scenario for one airport and write it to disk.
//!
//! Usage:
//!   cargo run -p sweatbox-cli --bin generate_scenario -- --airport KPHX --departures 8

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use sweatbox_cli::Args;
use sweatbox_core::{GeneratorConfig, Pipeline, Stage};
use sweatbox_sources::{remote_sources, SourceSettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sweatbox_core=info".parse()?)
                .add_directive("sweatbox_sources=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let job = args.job()?;

    let config = match &args.config {
        Some(path) => GeneratorConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => GeneratorConfig::default(),
    }
    .install()?;

    let mut settings = SourceSettings::from_env();
    settings.offline |= args.offline;
    let (flight_plans, elevation) = remote_sources(&settings);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let pipeline = Arc::new(
        Pipeline::new(config)
            .with_flight_plans(flight_plans)
            .with_elevation(elevation)
            .with_progress(tx),
    );
    let cancel = pipeline.cancel_token();

    let printer = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            println!("[{:>3}%] {}: {}", progress.percent, progress.stage, progress.message);
            if progress.stage == Stage::Done {
                break;
            }
        }
    });

    let mut worker = {
        let pipeline = pipeline.clone();
        tokio::task::spawn_blocking(move || pipeline.run(&job))
    };

    let report = tokio::select! {
        joined = &mut worker => joined.context("generation task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling generation");
            cancel.cancel();
            worker.await.context("generation task panicked")??
        }
    };
    drop(pipeline);
    let _ = printer.await;

    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    if report.fallbacks > 0 {
        println!("{} aircraft used locally synthesized flight plans", report.fallbacks);
    }
    println!(
        "Generated {} aircraft at {} in {} (field elevation {} ft)",
        report.aircraft.len(),
        report.scenario.primary_airport_id,
        report.artcc_id,
        report.field_elevation_ft
    );
    for path in &report.written {
        println!("  wrote {}", path.display());
    }
    Ok(())
}
