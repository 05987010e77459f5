//! Drives a whole [`DeploymentPlan`] to completion.

use crate::{
    client::ChainClient,
    error::{DeployError, LedgerConsistencyError, LedgerError, StepError},
    executor::StepExecutor,
    ledger::Ledger,
    plan::{ContractSpec, DeploymentPlan},
    resolver,
};

/// Summary of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Steps deployed by this run, in execution order.
    pub deployed: Vec<String>,
    /// Steps already present in the ledger, in execution order.
    pub skipped: Vec<String>,
}

impl RunReport {
    /// Whether the run had nothing left to deploy.
    pub fn is_noop(&self) -> bool {
        self.deployed.is_empty()
    }
}

/// Deploys a plan through a [`ChainClient`], recording every success in a
/// [`Ledger`].
///
/// Steps run strictly one after the other. The first failure stops the run;
/// whatever was deployed before it stays in the ledger, so running the same
/// plan again against that ledger picks up at the failed step.
#[derive(Debug)]
pub struct Orchestrator<C> {
    client: C,
    verify_skipped: bool,
}

impl<C: ChainClient> Orchestrator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            verify_skipped: false,
        }
    }

    /// Check that contracts already in the ledger still have code on chain
    /// before skipping them.
    pub fn verify_skipped(mut self, verify: bool) -> Self {
        self.verify_skipped = verify;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Deploy every contract of `plan` that `ledger` does not know yet.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        ledger: &mut Ledger,
    ) -> Result<RunReport, DeployError> {
        let order = resolver::resolve(plan)?;

        tracing::info!(
            steps = order.len(),
            recorded = ledger.len(),
            order = ?order.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>(),
            "Starting deployment run"
        );

        let executor = StepExecutor::new(&self.client);
        let mut report = RunReport::default();
        // Deployed steps in execution order, skipped or not.
        let mut completed: Vec<String> = Vec::new();

        for spec in order {
            if ledger.has(&spec.name) {
                self.check_recorded(spec, ledger, &completed).await?;
                report.skipped.push(spec.name.clone());
                completed.push(spec.name.clone());
                continue;
            }

            let deployment = match executor.execute(spec, ledger).await {
                Ok(deployment) => deployment,
                Err(StepError::Client { source, .. }) => {
                    tracing::error!(contract = %spec.name, error = %format!("{source:#}"), "Deployment failed");
                    return Err(DeployError::ExecutionFailure {
                        step: spec.name.clone(),
                        completed,
                        source,
                    });
                }
                Err(StepError::UnresolvedDependency {
                    contract,
                    dependency,
                }) => {
                    return Err(DeployError::LedgerConsistency {
                        step: spec.name.clone(),
                        completed,
                        source: LedgerConsistencyError::UnresolvedDependency {
                            contract,
                            dependency,
                        },
                    });
                }
            };

            let address = deployment.address;
            match ledger.record(spec, deployment) {
                Ok(entry) => {
                    tracing::info!(
                        contract = %entry.name,
                        address = %entry.address,
                        sequence = entry.sequence,
                        "Contract deployed"
                    );
                }
                Err(LedgerError::DuplicateDeployment(name)) => {
                    return Err(DeployError::LedgerConsistency {
                        step: spec.name.clone(),
                        completed,
                        source: LedgerConsistencyError::DuplicateDeployment(name),
                    });
                }
                Err(source) => {
                    tracing::error!(
                        contract = %spec.name,
                        address = %address,
                        error = %source,
                        "Contract deployed but not recorded"
                    );
                    return Err(DeployError::LedgerWrite {
                        step: spec.name.clone(),
                        address,
                        completed,
                        source,
                    });
                }
            }

            report.deployed.push(spec.name.clone());
            completed.push(spec.name.clone());
        }

        tracing::info!(
            deployed = report.deployed.len(),
            skipped = report.skipped.len(),
            "Deployment run complete"
        );

        Ok(report)
    }

    async fn check_recorded(
        &self,
        spec: &ContractSpec,
        ledger: &Ledger,
        completed: &[String],
    ) -> Result<(), DeployError> {
        let Some(entry) = ledger.entry(&spec.name) else {
            return Ok(());
        };

        if entry.fingerprint != spec.fingerprint() {
            tracing::warn!(
                contract = %spec.name,
                address = %entry.address,
                "Plan entry changed since deployment, keeping recorded contract"
            );
        }

        if self.verify_skipped {
            let has_code = self.client.has_code(entry.address).await.map_err(|source| {
                DeployError::ExecutionFailure {
                    step: spec.name.clone(),
                    completed: completed.to_vec(),
                    source: source.context("Failed to verify recorded contract"),
                }
            })?;
            if !has_code {
                return Err(DeployError::LedgerConsistency {
                    step: spec.name.clone(),
                    completed: completed.to_vec(),
                    source: LedgerConsistencyError::StaleEntry {
                        contract: spec.name.clone(),
                        address: entry.address,
                    },
                });
            }
        }

        tracing::info!(contract = %spec.name, address = %entry.address, "Already deployed, skipping");
        Ok(())
    }
}
