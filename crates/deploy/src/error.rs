//! Error taxonomy for plan validation, step execution and ledger bookkeeping.

use std::path::PathBuf;

use alloy_core::primitives::Address;

/// Errors detected while building or resolving a [`crate::DeploymentPlan`].
///
/// These are raised before any contract is deployed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("deployment plan contains no contracts")]
    Empty,

    #[error("contract `{0}` is declared more than once")]
    DuplicateContract(String),

    #[error("contract `{contract}` references unknown contract `{dependency}`")]
    UnknownDependency { contract: String, dependency: String },

    #[error("cyclic dependency between contracts: {}", members.join(" -> "))]
    CyclicDependency { members: Vec<String> },
}

/// Errors raised by the [`crate::Ledger`].
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("contract `{0}` has not been deployed")]
    NotDeployed(String),

    #[error("contract `{0}` is already recorded in the ledger")]
    DuplicateDeployment(String),

    #[error("ledger was created for chain {recorded} but is bound to chain {requested}")]
    ChainMismatch { recorded: u64, requested: u64 },

    #[error("ledger {} is locked by another process", path.display())]
    Locked { path: PathBuf },

    #[error("ledger {} is malformed: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode ledger {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to access ledger {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Internal invariant violations. Always fatal: they point at a bug in plan
/// construction, resolution or at a ledger that no longer matches the chain.
#[derive(Debug, thiserror::Error)]
pub enum LedgerConsistencyError {
    #[error("contract `{0}` is already recorded in the ledger")]
    DuplicateDeployment(String),

    #[error("dependency `{dependency}` of `{contract}` has no recorded address")]
    UnresolvedDependency { contract: String, dependency: String },

    #[error("ledger records `{contract}` at {address} but no code exists there")]
    StaleEntry { contract: String, address: Address },
}

/// Failure of a single step, as returned by the [`crate::StepExecutor`].
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("dependency `{dependency}` of `{contract}` has no recorded address")]
    UnresolvedDependency { contract: String, dependency: String },

    #[error("chain client rejected deployment of `{contract}`: {source:#}")]
    Client {
        contract: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Error returned by an [`crate::Orchestrator`] run.
///
/// Every execution-time variant names the failed step and lists the steps
/// ordered before it that are deployed, whether by this run or by an earlier
/// one. Those steps are all recorded in the ledger, so re-running resumes at
/// `step`.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid deployment plan: {0}")]
    PlanInvalid(#[from] PlanError),

    #[error("deployment of `{step}` failed: {source:#}")]
    ExecutionFailure {
        step: String,
        completed: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("ledger consistency violated at `{step}`: {source}")]
    LedgerConsistency {
        step: String,
        completed: Vec<String>,
        #[source]
        source: LedgerConsistencyError,
    },

    #[error("`{step}` was deployed at {address} but could not be recorded: {source}")]
    LedgerWrite {
        step: String,
        address: Address,
        completed: Vec<String>,
        #[source]
        source: LedgerError,
    },
}

impl DeployError {
    /// The step at which the run stopped, if execution had started.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            DeployError::PlanInvalid(_) => None,
            DeployError::ExecutionFailure { step, .. }
            | DeployError::LedgerConsistency { step, .. }
            | DeployError::LedgerWrite { step, .. } => Some(step),
        }
    }

    /// Steps deployed before the failure, in execution order, including
    /// those an earlier run recorded and this run skipped.
    pub fn completed(&self) -> &[String] {
        match self {
            DeployError::PlanInvalid(_) => &[],
            DeployError::ExecutionFailure { completed, .. }
            | DeployError::LedgerConsistency { completed, .. }
            | DeployError::LedgerWrite { completed, .. } => completed,
        }
    }
}
