//! chainplan deploys a plan of interdependent smart contracts onto an EVM
//! network, resuming from its ledger whenever a previous run stopped early.

mod cli;
mod config;
mod table;

use std::path::Path;

use anyhow::{Context, Result};
use chainplan_deploy::{
    ArtifactStore, DeploymentPlan, Ledger, Orchestrator, RpcChainClient, resolve,
};
use clap::Parser;

use cli::{Cli, Command, DeployArgs, PlanArgs, StatusArgs};
use config::ChainplanConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbosity,
        config,
        network,
        command,
    } = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt().with_max_level(verbosity).init();

    let config = ChainplanConfig::load(&config)?;

    match command {
        Command::Deploy(args) => deploy(&config, &network, args).await,
        Command::Plan(args) => plan(&config, &network, args),
        Command::Status(args) => status(&config, &network, args),
    }
}

async fn deploy(config: &ChainplanConfig, network: &str, args: DeployArgs) -> Result<()> {
    let plan = DeploymentPlan::load_from_file(&args.plan)?;
    let ledger_path = args
        .ledger
        .unwrap_or_else(|| config.ledger_path(network));
    let mut ledger = Ledger::open(&ledger_path)?;

    tracing::info!(
        network,
        plan = %args.plan.display(),
        ledger = %ledger_path.display(),
        contracts = plan.len(),
        "Deploying plan"
    );

    let client = RpcChainClient::connect(
        config.network(network)?,
        ArtifactStore::new(&config.artifacts_dir),
        config.proxy_artifact.as_str(),
    )
    .await
    .with_context(|| format!("Failed to connect to network `{network}`"))?;
    ledger.bind_chain_id(client.chain_id())?;

    let orchestrator = Orchestrator::new(client).verify_skipped(args.verify_skipped);
    match orchestrator.run(&plan, &mut ledger).await {
        Ok(report) => {
            if report.is_noop() {
                tracing::info!("Nothing to deploy, every contract is already recorded");
            }
            println!("{}", table::ledger_table(&ledger, Some(&report)));
            Ok(())
        }
        Err(err) => {
            if !ledger.is_empty() {
                println!("{}", table::ledger_table(&ledger, None));
            }
            if let Some(step) = err.failed_step() {
                tracing::error!(
                    step,
                    completed = ?err.completed(),
                    "Deployment stopped, run the same command again to resume"
                );
            }
            Err(err.into())
        }
    }
}

fn plan(config: &ChainplanConfig, network: &str, args: PlanArgs) -> Result<()> {
    let plan = DeploymentPlan::load_from_file(&args.plan)?;
    let order = resolve(&plan)?;

    let ledger_path = args
        .ledger
        .unwrap_or_else(|| config.ledger_path(network));
    let ledger = read_ledger_if_exists(&ledger_path)?;

    println!("{}", table::plan_table(&order, &ledger));
    Ok(())
}

fn status(config: &ChainplanConfig, network: &str, args: StatusArgs) -> Result<()> {
    let ledger_path = args
        .ledger
        .unwrap_or_else(|| config.ledger_path(network));
    let ledger = Ledger::read(&ledger_path)?;

    println!(
        "Ledger {} (chain {})",
        ledger_path.display(),
        ledger
            .chain_id()
            .map_or_else(|| "unbound".to_string(), |id| id.to_string())
    );
    println!("{}", table::ledger_table(&ledger, None));
    Ok(())
}

fn read_ledger_if_exists(path: &Path) -> Result<Ledger> {
    if path.exists() {
        Ok(Ledger::read(path)?)
    } else {
        tracing::debug!(path = %path.display(), "No ledger yet, every step is pending");
        Ok(Ledger::new())
    }
}
