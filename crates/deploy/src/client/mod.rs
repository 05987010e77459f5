//! The chain client capability consumed by the orchestrator.
//!
//! The orchestrator only needs to deploy contracts and, optionally, to check
//! that a recorded address still holds code. Everything else (endpoint
//! selection, sender account, gas, confirmation policy) belongs to the
//! implementation, which receives its configuration at construction time.

pub mod abi;
pub mod artifacts;
pub mod rpc;

use std::future::Future;

use alloy_core::primitives::{Address, B256};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::plan::Literal;

pub use artifacts::ArtifactStore;
pub use rpc::{NetworkConfig, RpcChainClient};

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// The address callers must use. For proxied deployments this is the
    /// proxy, not the logic contract.
    pub address: Address,
    /// Logic contract behind the proxy.
    pub implementation: Option<Address>,
    /// Admin of the proxy, when the client could determine it.
    pub admin: Option<Address>,
    /// Hash of the transaction that created `address`.
    pub transaction_hash: Option<B256>,
}

impl Deployment {
    /// A deployment known only by its address.
    pub fn at(address: Address) -> Self {
        Self {
            address,
            implementation: None,
            admin: None,
            transaction_hash: None,
        }
    }
}

/// A handle able to put contracts on chain.
///
/// Calls may block for as long as the network needs to confirm a
/// transaction. Implementations own their timeout and retry policy.
pub trait ChainClient: Send + Sync {
    /// Deploy `name` with `args` passed to its constructor.
    fn deploy_contract(
        &self,
        name: &str,
        args: &[Literal],
    ) -> impl Future<Output = Result<Deployment>> + Send;

    /// Deploy `name` behind an upgradeable proxy, passing `args` to its
    /// initializer. The returned address is the proxy's.
    fn deploy_proxied_contract(
        &self,
        name: &str,
        args: &[Literal],
    ) -> impl Future<Output = Result<Deployment>> + Send;

    /// Whether contract code exists at `address`.
    fn has_code(&self, address: Address) -> impl Future<Output = Result<bool>> + Send;
}
