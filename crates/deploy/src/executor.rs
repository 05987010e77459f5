//! Execution of a single deployment step.

use crate::{
    client::{ChainClient, Deployment},
    error::StepError,
    ledger::Ledger,
    plan::{ArgRef, ContractSpec, DeployMode, Literal},
};

/// Outcome of one step.
pub type ExecutionResult = Result<Deployment, StepError>;

/// Deploys one [`ContractSpec`] through a [`ChainClient`].
///
/// The executor reads the ledger to resolve address arguments but never
/// writes to it, and never retries.
#[derive(Debug)]
pub struct StepExecutor<'a, C> {
    client: &'a C,
}

impl<'a, C: ChainClient> StepExecutor<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Replace every address reference in `spec.args` by the recorded
    /// address of the referenced contract.
    pub fn resolve_args(spec: &ContractSpec, ledger: &Ledger) -> Result<Vec<Literal>, StepError> {
        spec.args
            .iter()
            .map(|arg| match arg {
                ArgRef::Literal(literal) => Ok(literal.clone()),
                ArgRef::AddressOf(dependency) => ledger
                    .get(dependency)
                    .map(Literal::Address)
                    .map_err(|_| StepError::UnresolvedDependency {
                        contract: spec.name.clone(),
                        dependency: dependency.clone(),
                    }),
            })
            .collect()
    }

    /// Deploy `spec`.
    pub async fn execute(&self, spec: &ContractSpec, ledger: &Ledger) -> ExecutionResult {
        let args = Self::resolve_args(spec, ledger)?;
        let artifact = spec.artifact_name();

        tracing::info!(
            contract = %spec.name,
            artifact = %artifact,
            mode = %spec.mode,
            args = ?args.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Deploying contract"
        );

        let deployed = match spec.mode {
            DeployMode::Plain => self.client.deploy_contract(artifact, &args).await,
            DeployMode::Proxied => self.client.deploy_proxied_contract(artifact, &args).await,
        };

        deployed.map_err(|source| StepError::Client {
            contract: spec.name.clone(),
            source,
        })
    }
}
