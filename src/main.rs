//! volzone - Intraday Volatility Zone Signal Engine
//!
//! Forecasts the daily move, lays the zone ladder around the session open and
//! publishes order-flow confirmed signals.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use volzone::adapters::cli::{
    CliApp, Command, ForecastCmd, InitConfigCmd, OutputFormat, RunCmd, ZonesCmd,
};
use volzone::adapters::{BinanceClient, LoggingSink, PaperGateway};
use volzone::application::{DailyLevels, DecisionOrchestrator, MutationSyncManager};
use volzone::config::{load_config, Config, LoggingConfig};
use volzone::strategy::{EngineConfig, ZoneEngine, ZoneMap};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (VOLZONE__* overrides can live there)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config = match app.command.config_path() {
        Some(path) => Some(
            load_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        ),
        None => None,
    };
    init_logging(app.verbose, app.debug, config.as_ref().map(|c| &c.logging))?;

    match (app.command, config) {
        (Command::Run(cmd), Some(config)) => run_command(cmd, config).await,
        (Command::Forecast(cmd), Some(config)) => forecast_command(cmd, config).await,
        (Command::Zones(cmd), _) => zones_command(cmd),
        (Command::InitConfig(cmd), _) => init_config_command(cmd),
        (command, None) => bail!("{:?} needs a configuration file", command),
    }
}

fn init_logging(verbose: bool, debug: bool, logging: Option<&LoggingConfig>) -> Result<()> {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.map(|l| l.level.as_str()).unwrap_or("warn")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = fmt().with_env_filter(filter).with_target(false);
    let result = if logging.is_some_and(|l| l.json) {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

async fn run_command(cmd: RunCmd, mut config: Config) -> Result<()> {
    if !cmd.instruments.is_empty() {
        config.engine.instruments = cmd.instruments.iter().map(|s| s.to_uppercase()).collect();
    }
    tracing::info!(instruments = ?config.engine.instruments, "Starting volzone...");

    let client = Arc::new(
        BinanceClient::new(config.market_data.clone()).context("Failed to create Binance client")?,
    );
    let gateway = Arc::new(PaperGateway::new());
    let mutations = Arc::new(MutationSyncManager::new(gateway, config.mutation.clone()));
    let sink = Arc::new(LoggingSink::default().with_protection(mutations));

    let orchestrator = Arc::new(
        DecisionOrchestrator::new(
            config.engine.clone(),
            EngineConfig::from(&config),
            client.clone(),
            client,
            sink,
        )
        .context("Failed to create orchestrator")?,
    );

    tracing::warn!("PAPER MODE - protective levels are tracked in memory only");

    if cmd.once {
        for (instrument, result) in orchestrator.tick_all().await {
            match result {
                Ok(Some(signal)) => println!(
                    "{}: {} {} entry {:.2} tp {:.2} sl {:.2} conf {:.3}\n  {}",
                    instrument,
                    signal.setup_type,
                    signal.side,
                    signal.entry,
                    signal.take_profit,
                    signal.stop_loss,
                    signal.confidence,
                    signal.context.reason
                ),
                Ok(None) => println!("{}: no signal", instrument),
                Err(e) => println!("{}: error: {}", instrument, e),
            }
        }
        return Ok(());
    }

    // Setup Ctrl+C handler
    let orch = orchestrator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        orch.stop().await;
    });

    orchestrator.run().await?;
    tracing::info!("volzone stopped");
    Ok(())
}

async fn forecast_command(cmd: ForecastCmd, mut config: Config) -> Result<()> {
    let instrument = cmd.instrument.to_uppercase();
    config.engine.instruments = vec![instrument.clone()];

    let client = Arc::new(
        BinanceClient::new(config.market_data.clone()).context("Failed to create Binance client")?,
    );
    let orchestrator = DecisionOrchestrator::new(
        config.engine.clone(),
        EngineConfig::from(&config),
        client.clone(),
        client,
        Arc::new(LoggingSink::default()),
    )
    .context("Failed to create orchestrator")?;

    let levels = orchestrator
        .levels(&instrument, Utc::now())
        .await
        .with_context(|| format!("Failed to forecast {}", instrument))?;

    match cmd.format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "instrument": instrument,
                "day": levels.day,
                "estimate": levels.estimate,
                "zones": levels.zones.as_ref(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_forecast(&instrument, &levels),
    }
    Ok(())
}

fn print_forecast(instrument: &str, levels: &DailyLevels) {
    let estimate = &levels.estimate;
    println!("{} forecast for {}", instrument, levels.day);
    println!("  Closes used:   {}", estimate.data_point_count);
    for (model, pct) in &estimate.per_model_pct {
        let note = if estimate.degraded_models.contains(model) {
            " (EWMA fallback)"
        } else {
            ""
        };
        println!("  {:<12} {:>7.3}%{}", model, pct * 100.0, note);
    }
    println!("  Averaged:      {:>7.3}%", estimate.averaged_pct * 100.0);
    println!();
    print_ladder(&levels.zones);
}

fn zones_command(cmd: ZonesCmd) -> Result<()> {
    let zones = ZoneEngine::build(cmd.open, cmd.pct, cmd.subdivisions)
        .context("Failed to build zone map")?;
    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&zones)?),
        OutputFormat::Text => print_ladder(&zones),
    }
    Ok(())
}

fn print_ladder(zones: &ZoneMap) {
    println!(
        "Zone map: open {:.2}, move {:.3}%, spacing {:.2}",
        zones.reference_open,
        zones.pct * 100.0,
        zones.spacing()
    );
    for level in zones.boundaries().iter().rev() {
        println!("  {:>5}  {:>14.2}", level.label, level.price);
    }
    println!(
        "  Quadrants: Q2 {:.2} | Q1 {:.2} | Q-1 {:.2} | Q-2 {:.2}",
        zones.quadrants.q2, zones.quadrants.q1, zones.quadrants.q_neg1, zones.quadrants.q_neg2
    );
}

fn init_config_command(cmd: InitConfigCmd) -> Result<()> {
    let path = shellexpand::tilde(&cmd.output.to_string_lossy()).to_string();
    if std::path::Path::new(&path).exists() && !cmd.force {
        bail!("{} already exists (use --force to overwrite)", path);
    }
    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let rendered = Config::default().to_toml()?;
    std::fs::write(&path, rendered).with_context(|| format!("Failed to write {}", path))?;
    println!("Wrote default configuration to {}", path);
    Ok(())
}
