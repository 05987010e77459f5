use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::config::{DEFAULT_CONFIG_FILE, DEFAULT_NETWORK};

#[derive(Parser)]
#[command(name = "chainplan")]
#[command(
    author,
    version,
    about = "Deploy interdependent smart contracts in dependency order, exactly once"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "CHAINPLAN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file.
    ///
    /// A missing file is not an error: every setting has a default and can be
    /// provided through `CHAINPLAN_*` environment variables.
    #[arg(short, long, global = true, env = "CHAINPLAN_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// The network to deploy to, as named in the configuration file.
    #[arg(short, long, global = true, env = "CHAINPLAN_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy every contract of a plan that is not yet in the ledger.
    Deploy(DeployArgs),
    /// Print the deployment order of a plan without touching the network.
    Plan(PlanArgs),
    /// Print the contracts recorded in a ledger.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// The plan file to deploy.
    #[arg(short, long, env = "CHAINPLAN_PLAN")]
    pub plan: PathBuf,

    /// The ledger file.
    ///
    /// If not provided, the ledger is stored at: <ledger_dir>/<network>.json
    #[arg(short, long, env = "CHAINPLAN_LEDGER")]
    pub ledger: Option<PathBuf>,

    /// Check that contracts already in the ledger still have code on chain.
    #[arg(long, env = "CHAINPLAN_VERIFY_SKIPPED", default_value_t = false)]
    pub verify_skipped: bool,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// The plan file to inspect.
    #[arg(short, long, env = "CHAINPLAN_PLAN")]
    pub plan: PathBuf,

    /// The ledger file to compare the plan against.
    #[arg(short, long, env = "CHAINPLAN_LEDGER")]
    pub ledger: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// The ledger file.
    #[arg(short, long, env = "CHAINPLAN_LEDGER")]
    pub ledger: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_command_parses() {
        let cli = Cli::try_parse_from([
            "chainplan",
            "--network",
            "goerli",
            "deploy",
            "--plan",
            "plans/roofstock.toml",
            "--verify-skipped",
        ])
        .unwrap();

        assert_eq!(cli.network, "goerli");
        assert_eq!(cli.verbosity, LevelFilter::INFO);
        match cli.command {
            Command::Deploy(args) => {
                assert_eq!(args.plan, PathBuf::from("plans/roofstock.toml"));
                assert!(args.ledger.is_none());
                assert!(args.verify_skipped);
            }
            _ => panic!("expected the deploy command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["chainplan", "status", "-v", "debug", "-n", "mainnet"]).unwrap();

        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
        assert_eq!(cli.network, "mainnet");
        assert!(matches!(cli.command, Command::Status(StatusArgs { ledger: None })));
    }

    #[test]
    fn test_plan_file_required() {
        assert!(Cli::try_parse_from(["chainplan", "deploy"]).is_err());
    }
}
