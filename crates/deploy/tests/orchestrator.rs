//! Integration tests for the deployment orchestrator.
//!
//! The chain is replaced by an in-memory client that hands out sequential
//! addresses, records every call and fails on demand.

use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use alloy_core::primitives::{Address, U256};
use chainplan_deploy::{
    ArgRef, ChainClient, ContractSpec, DeployError, DeployMode, Deployment, DeploymentPlan,
    Ledger, LedgerConsistencyError, LedgerEntry, Literal, Orchestrator, PlanError,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tempdir::TempDir;

/// A deployment request as seen by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    mode: DeployMode,
    artifact: String,
    args: Vec<Literal>,
}

#[derive(Default)]
struct MockClient {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<String>>,
    codeless: Mutex<HashSet<Address>>,
    code_lookup_down: AtomicBool,
    next_address: AtomicU64,
}

impl MockClient {
    fn failing_on(artifact: &str) -> Self {
        let client = Self::default();
        client.fail_on(artifact);
        client
    }

    fn fail_on(&self, artifact: &str) {
        self.failing.lock().unwrap().insert(artifact.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn wipe_code(&self, address: Address) {
        self.codeless.lock().unwrap().insert(address);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn artifacts(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.artifact).collect()
    }

    fn allocate(&self) -> Address {
        let n = self.next_address.fetch_add(1, Ordering::SeqCst) + 1;
        Address::left_padding_from(&n.to_be_bytes())
    }

    fn handle(&self, mode: DeployMode, artifact: &str, args: &[Literal]) -> anyhow::Result<Deployment> {
        self.calls.lock().unwrap().push(Call {
            mode,
            artifact: artifact.to_string(),
            args: args.to_vec(),
        });

        if self.failing.lock().unwrap().contains(artifact) {
            anyhow::bail!("execution reverted while deploying {artifact}");
        }

        Ok(match mode {
            DeployMode::Plain => Deployment::at(self.allocate()),
            DeployMode::Proxied => {
                let implementation = self.allocate();
                Deployment {
                    implementation: Some(implementation),
                    admin: Some(Address::repeat_byte(0xad)),
                    ..Deployment::at(self.allocate())
                }
            }
        })
    }
}

impl ChainClient for MockClient {
    async fn deploy_contract(&self, name: &str, args: &[Literal]) -> anyhow::Result<Deployment> {
        self.handle(DeployMode::Plain, name, args)
    }

    async fn deploy_proxied_contract(
        &self,
        name: &str,
        args: &[Literal],
    ) -> anyhow::Result<Deployment> {
        self.handle(DeployMode::Proxied, name, args)
    }

    async fn has_code(&self, address: Address) -> anyhow::Result<bool> {
        if self.code_lookup_down.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(!self.codeless.lock().unwrap().contains(&address))
    }
}

fn plan(specs: impl IntoIterator<Item = ContractSpec>) -> DeploymentPlan {
    DeploymentPlan::from_specs(specs).expect("valid plan")
}

fn kyc_token_plan() -> DeploymentPlan {
    plan([
        ContractSpec::plain("Kyc"),
        ContractSpec::proxied("Token").arg(ArgRef::address_of("Kyc")),
    ])
}

fn three_step_plan() -> DeploymentPlan {
    plan([
        ContractSpec::plain("Allowlist"),
        ContractSpec::proxied("Kyc").arg(ArgRef::address_of("Allowlist")),
        ContractSpec::proxied("Token")
            .arg(ArgRef::address_of("Kyc"))
            .arg(Literal::String("HOC".to_string())),
    ])
}

/// Ledger entries without their timestamps.
fn snapshot(ledger: &Ledger) -> Vec<LedgerEntry> {
    ledger
        .entries()
        .iter()
        .cloned()
        .map(|entry| LedgerEntry {
            recorded_at: 0,
            ..entry
        })
        .collect()
}

#[tokio::test]
async fn test_dependency_is_deployed_first_and_wired() {
    let orchestrator = Orchestrator::new(MockClient::default());
    let mut ledger = Ledger::new();

    let report = orchestrator
        .run(&kyc_token_plan(), &mut ledger)
        .await
        .expect("run should succeed");

    assert_eq!(report.deployed, vec!["Kyc", "Token"]);
    assert!(report.skipped.is_empty());

    let kyc = ledger.get("Kyc").unwrap();
    let calls = orchestrator.client().calls();
    assert_eq!(
        calls,
        vec![
            Call {
                mode: DeployMode::Plain,
                artifact: "Kyc".to_string(),
                args: vec![],
            },
            Call {
                mode: DeployMode::Proxied,
                artifact: "Token".to_string(),
                args: vec![Literal::Address(kyc)],
            },
        ]
    );

    let token = ledger.entry("Token").unwrap();
    assert_eq!(token.mode, DeployMode::Proxied);
    assert_eq!(token.sequence, 2);
    assert!(token.implementation.is_some());
    assert_ne!(token.implementation, Some(token.address));
}

#[tokio::test]
async fn test_cycle_aborts_before_any_deployment() {
    let orchestrator = Orchestrator::new(MockClient::default());
    let mut ledger = Ledger::new();
    let cyclic = plan([
        ContractSpec::plain("A").arg(ArgRef::address_of("B")),
        ContractSpec::plain("B").arg(ArgRef::address_of("A")),
    ]);

    let err = orchestrator.run(&cyclic, &mut ledger).await.unwrap_err();

    match err {
        DeployError::PlanInvalid(PlanError::CyclicDependency { members }) => {
            assert_eq!(members, vec!["A", "B"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(ledger.is_empty());
    assert!(orchestrator.client().calls().is_empty());
}

#[tokio::test]
async fn test_unknown_dependency_aborts_before_any_deployment() {
    let orchestrator = Orchestrator::new(MockClient::default());
    let mut ledger = Ledger::new();
    let broken = plan([
        ContractSpec::plain("Allowlist"),
        ContractSpec::proxied("Token").arg(ArgRef::address_of("Kyc")),
    ]);

    let err = orchestrator.run(&broken, &mut ledger).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::PlanInvalid(PlanError::UnknownDependency { .. })
    ));
    assert_eq!(err.failed_step(), None);
    assert!(ledger.is_empty());
    assert!(orchestrator.client().calls().is_empty());
}

#[tokio::test]
async fn test_independent_contracts_keep_insertion_order() {
    let orchestrator = Orchestrator::new(MockClient::default());
    let mut ledger = Ledger::new();
    let independent = plan([
        ContractSpec::plain("Membership"),
        ContractSpec::plain("Allowlist"),
        ContractSpec::plain("Kyc"),
    ]);

    let report = orchestrator.run(&independent, &mut ledger).await.unwrap();

    assert_eq!(report.deployed, vec!["Membership", "Allowlist", "Kyc"]);
    assert_eq!(ledger.len(), 3);
    let sequences: Vec<u64> = ledger.entries().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_failed_step_stops_run_and_resumes() {
    let orchestrator = Orchestrator::new(MockClient::failing_on("Kyc"));
    let mut ledger = Ledger::new();

    let err = orchestrator
        .run(&three_step_plan(), &mut ledger)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::ExecutionFailure { .. }));
    assert_eq!(err.failed_step(), Some("Kyc"));
    assert_eq!(err.completed(), ["Allowlist".to_string()]);
    assert!(err.to_string().contains("execution reverted"));

    assert_eq!(ledger.len(), 1);
    assert!(ledger.has("Allowlist"));
    assert_eq!(orchestrator.client().artifacts(), vec!["Allowlist", "Kyc"]);

    orchestrator.client().heal();
    let report = orchestrator
        .run(&three_step_plan(), &mut ledger)
        .await
        .expect("resumed run should succeed");

    assert_eq!(report.skipped, vec!["Allowlist"]);
    assert_eq!(report.deployed, vec!["Kyc", "Token"]);
    assert_eq!(
        orchestrator.client().artifacts(),
        vec!["Allowlist", "Kyc", "Kyc", "Token"]
    );
    assert_eq!(ledger.len(), 3);
}

#[tokio::test]
async fn test_completed_steps_include_earlier_runs() {
    let mut ledger = Ledger::new();
    let first = Orchestrator::new(MockClient::failing_on("Kyc"));
    first.run(&three_step_plan(), &mut ledger).await.unwrap_err();

    let second = Orchestrator::new(MockClient::failing_on("Token"));
    let err = second
        .run(&three_step_plan(), &mut ledger)
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some("Token"));
    assert_eq!(
        err.completed(),
        ["Allowlist".to_string(), "Kyc".to_string()]
    );
    assert_eq!(second.client().artifacts(), vec!["Kyc", "Token"]);
}

#[tokio::test]
async fn test_second_run_is_a_noop() {
    let orchestrator = Orchestrator::new(MockClient::default());
    let mut ledger = Ledger::new();

    orchestrator.run(&three_step_plan(), &mut ledger).await.unwrap();
    let after_first = ledger.entries().to_vec();
    let calls_after_first = orchestrator.client().calls().len();

    let report = orchestrator.run(&three_step_plan(), &mut ledger).await.unwrap();

    assert!(report.is_noop());
    assert_eq!(report.skipped, vec!["Allowlist", "Kyc", "Token"]);
    assert_eq!(orchestrator.client().calls().len(), calls_after_first);
    assert_eq!(ledger.entries(), after_first.as_slice());
}

#[tokio::test]
async fn test_identical_runs_produce_identical_ledgers() {
    let mut first = Ledger::new();
    let mut second = Ledger::new();

    Orchestrator::new(MockClient::default())
        .run(&three_step_plan(), &mut first)
        .await
        .unwrap();
    Orchestrator::new(MockClient::default())
        .run(&three_step_plan(), &mut second)
        .await
        .unwrap();

    assert_eq!(snapshot(&first), snapshot(&second));
}

#[tokio::test]
async fn test_resume_from_ledger_file() {
    let temp_dir = TempDir::new("chainplan-resume").expect("Failed to create temp dir");
    let path = temp_dir.path().join("deployments/goerli.json");

    {
        let orchestrator = Orchestrator::new(MockClient::failing_on("Token"));
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.bind_chain_id(5).unwrap();

        let err = orchestrator
            .run(&three_step_plan(), &mut ledger)
            .await
            .unwrap_err();
        assert_eq!(err.failed_step(), Some("Token"));
        assert_eq!(err.completed(), ["Allowlist".to_string(), "Kyc".to_string()]);
    }

    let on_disk = Ledger::read(&path).unwrap();
    assert_eq!(on_disk.len(), 2);
    assert_eq!(on_disk.chain_id(), Some(5));

    let orchestrator = Orchestrator::new(MockClient::default());
    let mut ledger = Ledger::open(&path).unwrap();
    ledger.bind_chain_id(5).unwrap();
    let kyc = ledger.get("Kyc").unwrap();

    let report = orchestrator.run(&three_step_plan(), &mut ledger).await.unwrap();

    assert_eq!(report.deployed, vec!["Token"]);
    assert_eq!(
        orchestrator.client().calls(),
        vec![Call {
            mode: DeployMode::Proxied,
            artifact: "Token".to_string(),
            args: vec![Literal::Address(kyc), Literal::String("HOC".to_string())],
        }]
    );
    drop(ledger);

    let names: Vec<String> = Ledger::read(&path)
        .unwrap()
        .entries()
        .iter()
        .map(|entry| entry.name.clone())
        .collect();
    assert_eq!(names, vec!["Allowlist", "Kyc", "Token"]);
}

#[tokio::test]
async fn test_stale_entry_detected_when_verifying() {
    let mut ledger = Ledger::new();
    Orchestrator::new(MockClient::default())
        .run(&kyc_token_plan(), &mut ledger)
        .await
        .unwrap();

    let client = MockClient::default();
    client.wipe_code(ledger.get("Kyc").unwrap());
    let orchestrator = Orchestrator::new(client).verify_skipped(true);

    let err = orchestrator.run(&kyc_token_plan(), &mut ledger).await.unwrap_err();

    assert!(matches!(
        err,
        DeployError::LedgerConsistency {
            source: LedgerConsistencyError::StaleEntry { .. },
            ..
        }
    ));
    assert_eq!(err.failed_step(), Some("Kyc"));
    assert!(orchestrator.client().calls().is_empty());
}

#[tokio::test]
async fn test_failed_verification_stops_run() {
    let mut ledger = Ledger::new();
    Orchestrator::new(MockClient::default())
        .run(&kyc_token_plan(), &mut ledger)
        .await
        .unwrap();

    let client = MockClient::default();
    client.code_lookup_down.store(true, Ordering::SeqCst);
    let orchestrator = Orchestrator::new(client).verify_skipped(true);

    let err = orchestrator.run(&kyc_token_plan(), &mut ledger).await.unwrap_err();

    assert!(matches!(err, DeployError::ExecutionFailure { .. }));
    assert_eq!(err.failed_step(), Some("Kyc"));
    assert!(err.completed().is_empty());
    assert!(format!("{err:#}").contains("connection refused"));
    assert!(orchestrator.client().calls().is_empty());
    assert_eq!(ledger.len(), 2);
}

#[tokio::test]
async fn test_stale_entry_ignored_without_verification() {
    let mut ledger = Ledger::new();
    Orchestrator::new(MockClient::default())
        .run(&kyc_token_plan(), &mut ledger)
        .await
        .unwrap();

    let client = MockClient::default();
    client.wipe_code(ledger.get("Kyc").unwrap());
    let report = Orchestrator::new(client)
        .run(&kyc_token_plan(), &mut ledger)
        .await
        .unwrap();

    assert_eq!(report.skipped, vec!["Kyc", "Token"]);
}

#[tokio::test]
async fn test_edited_plan_entry_keeps_recorded_contract() {
    let mut ledger = Ledger::new();
    let orchestrator = Orchestrator::new(MockClient::default());
    orchestrator.run(&kyc_token_plan(), &mut ledger).await.unwrap();
    let token = ledger.get("Token").unwrap();

    let edited = plan([
        ContractSpec::plain("Kyc"),
        ContractSpec::proxied("Token")
            .arg(ArgRef::address_of("Kyc"))
            .arg(Literal::Uint(U256::from(18))),
        ContractSpec::plain("Allowlist"),
    ]);
    let report = orchestrator.run(&edited, &mut ledger).await.unwrap();

    assert_eq!(report.skipped, vec!["Kyc", "Token"]);
    assert_eq!(report.deployed, vec!["Allowlist"]);
    assert_eq!(ledger.get("Token").unwrap(), token);
    assert_ne!(
        ledger.entry("Token").unwrap().fingerprint,
        edited.get("Token").unwrap().fingerprint()
    );
}

#[tokio::test]
async fn test_same_artifact_under_two_names() {
    let orchestrator = Orchestrator::new(MockClient::default());
    let mut ledger = Ledger::new();
    let twice = plan([
        ContractSpec::plain("Allowlist"),
        ContractSpec::plain("PartnerAllowlist").with_artifact("Allowlist"),
    ]);

    orchestrator.run(&twice, &mut ledger).await.unwrap();

    assert_eq!(orchestrator.client().artifacts(), vec!["Allowlist", "Allowlist"]);
    assert_ne!(
        ledger.get("Allowlist").unwrap(),
        ledger.get("PartnerAllowlist").unwrap()
    );
}

#[tokio::test]
async fn test_unrecorded_deployment_reports_address() {
    let temp_dir = TempDir::new("chainplan-unwritable").expect("Failed to create temp dir");
    let ledger_dir = temp_dir.path().join("deployments");
    let mut ledger = Ledger::open(ledger_dir.join("development.json")).unwrap();

    // Replace the ledger directory with a plain file so the next save fails.
    std::fs::remove_dir_all(&ledger_dir).unwrap();
    std::fs::write(&ledger_dir, b"").unwrap();

    let orchestrator = Orchestrator::new(MockClient::default());
    let err = orchestrator
        .run(&kyc_token_plan(), &mut ledger)
        .await
        .unwrap_err();

    match &err {
        DeployError::LedgerWrite {
            step,
            address,
            completed,
            ..
        } => {
            assert_eq!(step, "Kyc");
            assert_ne!(*address, Address::ZERO);
            assert!(completed.is_empty());
        }
        other => panic!("expected a ledger write failure, got {other:?}"),
    }
    assert!(ledger.is_empty());
    assert_eq!(orchestrator.client().artifacts(), vec!["Kyc"]);
}

/// Random acyclic plan: contract `i` may only reference contracts `< i`,
/// then the specs are shuffled so insertion order is not a valid order.
fn random_plan(rng: &mut StdRng, size: usize) -> DeploymentPlan {
    use rand::seq::SliceRandom;

    let mut specs: Vec<ContractSpec> = (0..size)
        .map(|i| {
            let mut spec = if rng.random_bool(0.5) {
                ContractSpec::proxied(format!("C{i}"))
            } else {
                ContractSpec::plain(format!("C{i}"))
            };
            for j in 0..i {
                if rng.random_bool(0.3) {
                    spec = spec.arg(ArgRef::address_of(format!("C{j}")));
                }
            }
            spec
        })
        .collect();
    specs.shuffle(rng);
    plan(specs)
}

#[tokio::test]
async fn test_random_plans_wire_recorded_addresses() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..25 {
        let size = rng.random_range(1..12);
        let random = random_plan(&mut rng, size);
        let orchestrator = Orchestrator::new(MockClient::default());
        let mut ledger = Ledger::new();

        let report = orchestrator.run(&random, &mut ledger).await.unwrap();
        assert_eq!(report.deployed.len(), size);

        for call in orchestrator.client().calls() {
            let spec = random.get(&call.artifact).unwrap();
            let own = ledger.entry(&spec.name).unwrap();
            let expected: Vec<Literal> = spec
                .depends_on()
                .iter()
                .map(|dep| {
                    let dep_entry = ledger.entry(dep).unwrap();
                    assert!(dep_entry.sequence < own.sequence);
                    Literal::Address(dep_entry.address)
                })
                .collect();
            assert_eq!(call.args, expected);
        }
    }
}
