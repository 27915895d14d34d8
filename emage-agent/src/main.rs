//! emage eNB agent
//!
//! Runs one agent against a controller until Ctrl+C:
//! - CLI argument parsing
//! - Configuration loading and validation
//! - Agent start and graceful termination
//!
//! # Usage
//!
//! ```bash
//! em-agent -c config/agent.yaml
//! em-agent --id 7 --ctrl-addr 10.0.0.5 --ctrl-port 3000
//! ```

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use emage_agent::{Agent, AgentOps, HandlerResult, Outbox};
use emage_common::{
    init_logging, load_agent_config, validate_agent_config, AgentConfig, CellId, LogLevel,
    ModuleId, TriggerId,
};
use emage_proto::{CellMeasure, HandoverUe, UeMeasure};

/// emage agent - eNB agent for the EmPOWER controller
#[derive(Parser, Debug)]
#[command(name = "em-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the agent configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: Option<String>,

    /// eNB identifier
    #[arg(long = "id")]
    id: Option<u64>,

    /// Controller address
    #[arg(long = "ctrl-addr")]
    ctrl_addr: Option<String>,

    /// Controller port
    #[arg(long = "ctrl-port")]
    ctrl_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info")]
    log_level: LogLevel,
}

/// Acks every request and logs it. Stands in for a base-station
/// integration.
struct LoggingOps;

impl AgentOps for LoggingOps {
    fn init(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        info!("Controller session initialized");
        Ok(())
    }

    fn release(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        info!("Controller session released");
        Ok(())
    }

    fn disconnected(&mut self, _outbox: &mut Outbox) -> HandlerResult {
        warn!("Controller disconnected");
        Ok(())
    }

    fn cell_setup_request(&mut self, cell_id: CellId, _outbox: &mut Outbox) -> HandlerResult {
        info!("Cell setup request for cell {}", cell_id);
        Ok(())
    }

    fn enb_setup_request(&mut self, module_id: ModuleId, _outbox: &mut Outbox) -> HandlerResult {
        info!("eNB setup request for module {}", module_id);
        Ok(())
    }

    fn ue_report(
        &mut self,
        module_id: ModuleId,
        trigger_id: TriggerId,
        _outbox: &mut Outbox,
    ) -> HandlerResult {
        info!("UE report trigger {} on module {}", trigger_id, module_id);
        Ok(())
    }

    fn ue_measure(&mut self, request: &UeMeasure, _outbox: &mut Outbox) -> HandlerResult {
        info!(
            "RRC measurement {} for RNTI {:#06x} (trigger {})",
            request.measure_id, request.rnti, request.trigger_id
        );
        Ok(())
    }

    fn handover_ue(&mut self, request: &HandoverUe, _outbox: &mut Outbox) -> HandlerResult {
        info!(
            "Handover of RNTI {:#06x} to eNB {} cell {}",
            request.rnti, request.target_enb, request.target_cell
        );
        Ok(())
    }

    fn cell_measure(&mut self, request: &CellMeasure, _outbox: &mut Outbox) -> HandlerResult {
        info!(
            "Cell {} statistics every {} ms (trigger {})",
            request.cell_id, request.interval, request.trigger_id
        );
        Ok(())
    }
}

fn build_config(args: &Args) -> Result<AgentConfig> {
    let mut config = match &args.config_file {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            load_agent_config(path)
                .with_context(|| format!("Failed to load configuration from {path}"))?
        }
        None => AgentConfig::default(),
    };

    if let Some(id) = args.id {
        config.id = id;
    }
    if let Some(addr) = &args.ctrl_addr {
        config.ctrl_addr = addr.clone();
    }
    if let Some(port) = args.ctrl_port {
        config.ctrl_port = port;
    }

    validate_agent_config(&config).context("Invalid agent configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run_agent(args).await {
        Ok(()) => {
            info!("Agent exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Agent failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_agent(args: Args) -> Result<()> {
    let config = build_config(&args)?;
    info!("Configuration loaded: {}", config.identity());

    let mut agent = Agent::new(config);
    agent.register_ops(LoggingOps);
    agent
        .start()
        .await
        .with_context(|| format!("Failed to start agent ({})", agent.identity()))?;

    info!("Agent started, waiting for shutdown signal...");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = agent.disconnected() => {
            warn!("Controller connection lost, shutting down");
        }
    }

    agent.terminate().await.context("Failed to terminate agent")?;
    Ok(())
}
