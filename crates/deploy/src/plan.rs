//! Declarative description of the contracts to deploy.
//!
//! A [`DeploymentPlan`] is an insertion-ordered set of [`ContractSpec`]s. Each
//! spec lists its constructor (or initializer, for proxied contracts)
//! arguments as [`ArgRef`]s, which are either literals known ahead of time or
//! references to the address of another contract in the same plan.
//!
//! Plans are usually loaded from a TOML file:
//!
//! ```toml
//! [[contracts]]
//! name = "Allowlist"
//!
//! [[contracts]]
//! name = "HomeOnChainToken"
//! mode = "proxied"
//! args = [{ address_of = "Allowlist" }]
//! ```

use std::{collections::HashMap, fmt, path::Path};

use alloy_core::primitives::{Address, U256};
use anyhow::{Context, Result};
use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PlanError;

/// How a contract is put on chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeployMode {
    /// Deployed directly; arguments go to the constructor.
    #[default]
    Plain,
    /// Deployed behind a transparent upgradeable proxy; arguments go to the
    /// `initialize` function and the recorded address is the proxy's.
    Proxied,
}

/// A constant argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, From)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Address(Address),
    Uint(U256),
    Bool(bool),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Address(address) => write!(f, "{address}"),
            Literal::Uint(value) => write!(f, "{value}"),
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::String(value) => write!(f, "{value:?}"),
        }
    }
}

/// A constructor/initializer argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgRef {
    /// A value known when the plan is written.
    Literal(Literal),
    /// The deployed address of another contract of the plan, resolved at
    /// execution time.
    AddressOf(String),
}

impl ArgRef {
    /// Reference the deployed address of `contract`.
    pub fn address_of(contract: impl Into<String>) -> Self {
        ArgRef::AddressOf(contract.into())
    }

    /// The contract this argument depends on, if any.
    pub fn dependency(&self) -> Option<&str> {
        match self {
            ArgRef::Literal(_) => None,
            ArgRef::AddressOf(name) => Some(name),
        }
    }
}

impl From<Literal> for ArgRef {
    fn from(literal: Literal) -> Self {
        ArgRef::Literal(literal)
    }
}

/// A single contract to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Unique key of the contract within the plan and the ledger.
    pub name: String,
    /// Plain or proxied deployment.
    #[serde(default)]
    pub mode: DeployMode,
    /// Ordered constructor/initializer arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgRef>,
    /// Compiled artifact to deploy, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl ContractSpec {
    /// A plain contract without arguments.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: DeployMode::Plain,
            args: Vec::new(),
            artifact: None,
        }
    }

    /// A proxied contract without initializer arguments.
    pub fn proxied(name: impl Into<String>) -> Self {
        Self {
            mode: DeployMode::Proxied,
            ..Self::plain(name)
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<ArgRef>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Deploy from a differently named artifact.
    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    /// Name of the compiled artifact backing this contract.
    pub fn artifact_name(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }

    /// Contracts whose address this one needs, in first-reference order and
    /// without duplicates.
    pub fn depends_on(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for dep in self.args.iter().filter_map(ArgRef::dependency) {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        deps
    }

    /// Compute a SHA-256 fingerprint of this spec.
    ///
    /// The same spec always yields the same fingerprint, so the ledger can
    /// tell whether a recorded contract was deployed from a plan entry that
    /// has since been edited.
    pub fn fingerprint(&self) -> String {
        let json =
            serde_json::to_vec(self).expect("ContractSpec serialization should never fail");

        let mut hasher = Sha256::new();
        hasher.update(&json);
        hex::encode(hasher.finalize())
    }
}

/// On-disk layout of a plan file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PlanFile {
    #[serde(default)]
    contracts: Vec<ContractSpec>,
}

/// Insertion-ordered mapping from contract name to [`ContractSpec`].
///
/// Dereferences to the slice of specs in insertion order. Specs cannot be
/// modified once added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct DeploymentPlan {
    #[deref]
    contracts: Vec<ContractSpec>,
    index: HashMap<String, usize>,
}

impl DeploymentPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a plan from specs, keeping their order.
    pub fn from_specs(specs: impl IntoIterator<Item = ContractSpec>) -> Result<Self, PlanError> {
        let mut plan = Self::new();
        for spec in specs {
            plan.push(spec)?;
        }
        Ok(plan)
    }

    /// Append a spec. Names must be unique.
    pub fn push(&mut self, spec: ContractSpec) -> Result<(), PlanError> {
        if self.index.contains_key(&spec.name) {
            return Err(PlanError::DuplicateContract(spec.name));
        }
        self.index.insert(spec.name.clone(), self.contracts.len());
        self.contracts.push(spec);
        Ok(())
    }

    /// Look up a spec by name.
    pub fn get(&self, name: &str) -> Option<&ContractSpec> {
        self.position(name).map(|i| &self.contracts[i])
    }

    /// Insertion index of a spec.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Parse a plan from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: PlanFile = toml::from_str(content).context("Failed to parse plan as TOML")?;
        Ok(Self::from_specs(file.contracts)?)
    }

    /// Load a plan from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan from {}", path.display()))?;
        let plan = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid plan file {}", path.display()))?;
        tracing::debug!(path = %path.display(), contracts = plan.len(), "Plan loaded");
        Ok(plan)
    }

    /// Render the plan as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        let file = PlanFile {
            contracts: self.contracts.clone(),
        };
        toml::to_string_pretty(&file).context("Failed to serialize plan to TOML")
    }
}
