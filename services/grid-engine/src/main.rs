//! Grid Engine - autonomous grid strategy runner
//!
//! 1. Loads `GRID_*` configuration and checks credentials
//! 2. Wires the portfolio, advisory and signer clients
//! 3. Spawns the engine runner
//! 4. Reads operator commands from stdin until `quit` or Ctrl-C

use anyhow::Context;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use grid_engine::{
    AdvisoryGenerator, AdvisoryReviewer, AppConfig, EngineController, EngineHandle, EngineOptions,
    EngineRunner, EngineServices, ExecutionSubmitter, OctavPortfolioClient, OrderSigner,
    PaperSigner, SettingsUpdate, SignerBridgeClient, SignerMode, StateManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::INFO)
                .init();
            error!("Cannot start: {}", e);
            return Err(e.into());
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();

    info!("Starting Grid Engine...");
    info!("Wallet: {}, signer: {:?}", config.wallet_address, config.signer_mode);

    let advisory_key = config.advisory_api_key.clone().unwrap_or_default();
    let portfolio_key = config.portfolio_api_key.clone().unwrap_or_default();

    let portfolio = Arc::new(OctavPortfolioClient::new(&config.portfolio_base_url, &portfolio_key)?);
    match portfolio.credits().await {
        Ok(credits) => info!("Portfolio API credits: {}", credits),
        Err(e) => warn!("Could not read portfolio API credits: {}", e),
    }

    let generator = Arc::new(AdvisoryGenerator::new(
        &config.advisory_base_url,
        &advisory_key,
        &config.generator_model,
    )?);
    let reviewer = Arc::new(AdvisoryReviewer::new(
        &config.advisory_base_url,
        &advisory_key,
        &config.reviewer_model,
    )?);

    let signer: Arc<dyn OrderSigner> = match config.signer_mode {
        SignerMode::Paper => {
            info!("📝 Running in PAPER TRADING mode");
            Arc::new(PaperSigner::new(config.expected_chain_id))
        }
        SignerMode::Bridge => {
            let url = config
                .signer_url
                .as_deref()
                .context("GRID_SIGNER_URL is required for bridge mode")?;
            warn!("⚠️ Running in LIVE mode via signer bridge at {}", url);
            Arc::new(SignerBridgeClient::new(url)?)
        }
    };

    let services = EngineServices {
        portfolio,
        generator,
        reviewer,
        submitter: ExecutionSubmitter::new(signer, config.expected_chain_id, config.order_delay()),
    };
    let options = EngineOptions {
        wallet_address: config.wallet_address.clone(),
        market_condition: config.market_condition,
        preferred_token: config.preferred_token.clone(),
        gates: config.confidence_gates(),
        reference_balance_usd: config.reference_balance_usd,
        expected_chain_id: config.expected_chain_id,
    };

    let controller = EngineController::new(services, options, config.engine_settings())?;
    let state = StateManager::new(config.state_dir());
    info!("State directory: {:?}", config.state_dir());

    let (handle, task) = EngineRunner::spawn(controller, Some(state));

    if config.start_enabled {
        handle.enable().await?;
    }

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_console_line(&handle, line.trim()).await {
                        break;
                    }
                }
                Ok(None) => {
                    // stdin closed; keep running until Ctrl-C
                    tokio::signal::ctrl_c().await?;
                    break;
                }
                Err(e) => {
                    warn!("stdin error: {}", e);
                    tokio::signal::ctrl_c().await?;
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
        }
    }

    handle.shutdown().await.ok();
    let controller = task.await?;
    let stats = controller.stats();
    info!(
        "Grid Engine stopped. Trades: {} placed, {} failed, success rate {}",
        stats.successful_trades,
        stats.failed_trades,
        stats
            .success_rate()
            .map(|r| format!("{}%", r.round_dp(1)))
            .unwrap_or_else(|| "n/a".to_string())
    );
    Ok(())
}

fn print_help() {
    println!("Commands: enable | disable | cycle | execute | plan | status | pnl <amount> | auto <on|off> | interval <minutes> | quit");
}

/// Returns false when the operator asked to quit
async fn handle_console_line(handle: &EngineHandle, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let arg = parts.next();

    let result: anyhow::Result<()> = async {
        match command {
            "" => {}
            "quit" | "exit" => return Ok(()),
            "enable" => handle.enable().await?,
            "disable" => handle.disable().await?,
            "cycle" => {
                let outcome = handle.run_cycle().await?;
                println!("{:?}", outcome);
            }
            "execute" => {
                let report = handle.execute_manually().await?;
                println!(
                    "Placed {} of {} orders on {}",
                    report.succeeded,
                    report.outcomes.len(),
                    report.asset
                );
            }
            "plan" => {
                let plan = handle.preview_plan().await?;
                println!("{}", serde_json::to_string_pretty(&plan)?);
            }
            "status" => {
                let snapshot = handle.snapshot().await?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            }
            "pnl" => {
                let amount: Decimal = arg.context("usage: pnl <amount>")?.parse()?;
                handle.record_pnl(amount).await?;
            }
            "auto" => {
                let auto_execute = match arg {
                    Some("on") => true,
                    Some("off") => false,
                    _ => anyhow::bail!("usage: auto <on|off>"),
                };
                handle
                    .update_settings(SettingsUpdate {
                        auto_execute: Some(auto_execute),
                        ..SettingsUpdate::default()
                    })
                    .await?;
            }
            "interval" => {
                let minutes: u32 = arg.context("usage: interval <minutes>")?.parse()?;
                let settings = handle
                    .update_settings(SettingsUpdate {
                        check_interval_minutes: Some(minutes),
                        ..SettingsUpdate::default()
                    })
                    .await?;
                println!("Checking every {} minutes", settings.check_interval_minutes);
            }
            "help" => print_help(),
            other => println!("Unknown command: {}", other),
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        println!("Error: {}", e);
    }
    !matches!(command, "quit" | "exit")
}
