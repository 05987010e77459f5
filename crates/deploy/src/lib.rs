//! chainplan-deploy - Idempotent, dependency-ordered smart contract deployment.
//!
//! A [`DeploymentPlan`] describes the contracts to deploy and how their
//! constructor or initializer arguments are wired to each other's addresses.
//! The [`Orchestrator`] orders the plan, deploys every contract missing from
//! the [`Ledger`] through a [`ChainClient`], and records each success as soon
//! as it happens.

pub mod client;
pub use client::{ArtifactStore, ChainClient, Deployment, NetworkConfig, RpcChainClient};

mod error;
pub use error::{DeployError, LedgerConsistencyError, LedgerError, PlanError, StepError};

mod executor;
pub use executor::{ExecutionResult, StepExecutor};

mod fs;

mod ledger;
pub use ledger::{Ledger, LedgerEntry};

mod orchestrator;
pub use orchestrator::{Orchestrator, RunReport};

mod plan;
pub use plan::{ArgRef, ContractSpec, DeployMode, DeploymentPlan, Literal};

pub mod resolver;
pub use resolver::resolve;
