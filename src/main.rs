//! MINTWATCH: Autonomous generative-art release collector
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the chain collaborators into the transport, and runs the tick loop with
//! graceful shutdown.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use mintwatch::config;
use mintwatch::dashboard::{self, DashboardState};
use mintwatch::engine::{Agent, Supervisor, TickOutcome};
use mintwatch::ledger::gateway::GatewayClient;
use mintwatch::ledger::simulated::SimulatedChain;
use mintwatch::strategy;
use mintwatch::transport::runtime::{Collaborators, Transport};
use mintwatch::types::format_eth;

const BANNER: &str = r#"
 __  __ ___ _   _ _______        ___  _____ ____ _   _
|  \/  |_ _| \ | |_   _\ \      / / \|_   _/ ___| | | |
| |\/| || ||  \| | | |  \ \ /\ / / _ \ | || |   | |_| |
| |  | || || |\  | | |   \ V  V / ___ \| || |___|  _  |
|_|  |_|___|_| \_| |_|    \_/\_/_/   \_\_| \____|_| |_|

  Autonomous generative-art release collector
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        tick_interval_ms = cfg.agent.tick_interval_ms,
        price_ceiling = %format_eth(cfg.purchase.price_ceiling),
        dry_run = cfg.agent.dry_run,
        "MINTWATCH starting up"
    );

    // -- Collaborators -----------------------------------------------------

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.gateway.request_timeout_secs))
        .build()?;

    let collaborators = if cfg.agent.dry_run {
        warn!("Dry-run mode: purchases run against the simulated chain");
        Collaborators::from_single(Arc::new(SimulatedChain::demo()), http)
    } else {
        let gateway = GatewayClient::new(
            &cfg.gateway.base_url,
            cfg.gateway_api_key(),
            Duration::from_secs(cfg.gateway.request_timeout_secs),
        )?;
        info!(base_url = %cfg.gateway.base_url, "Using signing/ledger gateway");
        Collaborators::from_single(Arc::new(gateway), http)
    };

    let (transport, mut inbox) = Transport::new(collaborators);

    // -- Core --------------------------------------------------------------

    let policy = strategy::from_config(&cfg.purchase);
    info!(policy = ?policy, "Acceptance policy configured");
    let supervisor = Supervisor::new(cfg.purchase.clone(), policy, Utc::now());
    let mut agent = Agent::new(supervisor, transport, cfg.alerts.webhook_url.clone());

    // -- Dashboard ---------------------------------------------------------

    let dashboard_state = Arc::new(DashboardState::new(cfg.agent.name.clone(), Utc::now()));
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop ---------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_millis(cfg.agent.tick_interval_ms));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_ms = cfg.agent.tick_interval_ms,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match agent.tick(Utc::now()) {
                    Ok(outcome) => log_tick(&outcome),
                    Err(e) => error!(error = %e, "Tick failed, continuing"),
                }
            }
            Some(message) = inbox.recv() => {
                let outcome = agent.deliver(message, Utc::now());
                debug!(outcome = ?outcome, "Message dispatched");
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
        dashboard_state.publish(agent.snapshot(Utc::now())).await;
    }

    let snapshot = agent.snapshot(Utc::now());
    info!(
        workflows = snapshot.workflows.len(),
        active_workflow = snapshot.active_workflow_id,
        stage = %snapshot.active_stage,
        pending_requests = snapshot.pending_requests,
        dropped_messages = snapshot.dropped(),
        "MINTWATCH shut down cleanly."
    );

    Ok(())
}

fn log_tick(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Issued { .. } | TickOutcome::AwaitingResponse { .. } => {
            debug!(outcome = ?outcome, "Tick")
        }
        TickOutcome::Abandoned { workflow_id, step, error } => warn!(
            workflow_id,
            step = %step,
            error = %error,
            "Request abandoned, retrying next tick"
        ),
        TickOutcome::Finished { workflow_id } => {
            debug!(workflow_id, "Workflow done, waiting for expiry")
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mintwatch=info"));

    let json_logging = std::env::var("MINTWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
