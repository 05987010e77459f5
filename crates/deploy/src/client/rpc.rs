//! [`ChainClient`] backed by an Ethereum JSON-RPC endpoint.
//!
//! Transactions are sent with `eth_sendTransaction`, so the sender must be an
//! account managed by the node (a local development chain, or a signing
//! proxy in front of a remote network). Keys never pass through this crate.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U64};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::{ArtifactStore, ChainClient, Deployment, abi};
use crate::plan::Literal;

/// The EIP-1967 storage slot holding the proxy admin address.
pub const PROXY_ADMIN_STORAGE_SLOT: &str =
    "0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103";

/// Default artifact deployed as the upgradeable proxy.
pub const DEFAULT_PROXY_ARTIFACT: &str = "TransparentUpgradeableProxy";

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_receipt_timeout_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Connection settings of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Expected chain id. Checked on connect when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Sender account. Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Interval between receipt polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to wait for a deployment to be mined.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Timeout of a single RPC request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl NetworkConfig {
    pub fn new(rpc_url: Url) -> Self {
        Self {
            rpc_url,
            chain_id: None,
            from: None,
            poll_interval_ms: default_poll_interval_ms(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Number of receipt polls fitting in the receipt timeout.
    fn receipt_polls(&self) -> usize {
        let interval = self.poll_interval_ms.max(1);
        (self.receipt_timeout_secs.saturating_mul(1_000) / interval).max(1) as usize
    }
}

/// Subset of a transaction receipt needed to confirm a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: B256,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    status: Option<U64>,
}

impl TransactionReceipt {
    /// Address of the created contract, if the creation succeeded.
    fn created_address(&self) -> Result<Address> {
        if self.status.is_some_and(|status| status.is_zero()) {
            anyhow::bail!("Transaction {} reverted", self.transaction_hash);
        }
        self.contract_address.with_context(|| {
            format!(
                "Receipt of {} has no contract address",
                self.transaction_hash
            )
        })
    }
}

/// Extract the address stored in the low 20 bytes of a storage word.
fn address_from_slot(word: B256) -> Option<Address> {
    let address = Address::from_word(word);
    (!address.is_zero()).then_some(address)
}

/// JSON-RPC chain client.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    http: reqwest::Client,
    config: NetworkConfig,
    artifacts: ArtifactStore,
    proxy_artifact: String,
    sender: Address,
    chain_id: u64,
}

impl RpcChainClient {
    /// Connect to the network described by `config`.
    ///
    /// Fails if the endpoint is unreachable, reports a chain id other than
    /// the configured one, or exposes no account to send from.
    pub async fn connect(
        config: NetworkConfig,
        artifacts: ArtifactStore,
        proxy_artifact: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let chain_id: U64 = json_rpc_call(&http, &config.rpc_url, "eth_chainId", vec![])
            .await
            .with_context(|| format!("Failed to reach {}", config.rpc_url))?;
        let chain_id = chain_id.to::<u64>();

        if let Some(expected) = config.chain_id {
            if expected != chain_id {
                anyhow::bail!(
                    "Endpoint {} serves chain {} but chain {} is configured",
                    config.rpc_url,
                    chain_id,
                    expected
                );
            }
        }

        let sender = match config.from {
            Some(from) => from,
            None => {
                let accounts: Vec<Address> =
                    json_rpc_call(&http, &config.rpc_url, "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                accounts
                    .first()
                    .copied()
                    .context("Node exposes no account; set `from` in the network config")?
            }
        };

        tracing::info!(
            rpc_url = %config.rpc_url,
            chain_id,
            sender = %sender,
            "Connected to chain"
        );

        Ok(Self {
            http,
            config,
            artifacts,
            proxy_artifact: proxy_artifact.into(),
            sender,
            chain_id,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        json_rpc_call(&self.http, &self.config.rpc_url, method, params).await
    }

    /// Send a contract creation transaction and wait for it to be mined.
    ///
    /// The send itself is never retried: a retry could create the contract
    /// twice. Only the receipt lookup is polled.
    async fn create(&self, label: &str, data: Vec<u8>) -> Result<(Address, B256)> {
        let tx_hash: B256 = self
            .call(
                "eth_sendTransaction",
                vec![serde_json::json!({
                    "from": self.sender,
                    "data": format!("0x{}", hex::encode(&data)),
                })],
            )
            .await
            .with_context(|| format!("Failed to send creation transaction for {label}"))?;

        tracing::debug!(contract = %label, tx_hash = %tx_hash, "Creation transaction sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        let address = receipt.created_address()?;

        tracing::debug!(contract = %label, address = %address, "Contract created");
        Ok((address, tx_hash))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt> {
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.config.poll_interval_ms))
            .with_max_times(self.config.receipt_polls());

        (move || async move {
            let receipt: Option<TransactionReceipt> = self
                .call(
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(tx_hash)],
                )
                .await?;
            receipt.with_context(|| format!("Transaction {tx_hash} is still pending"))
        })
        .retry(backoff)
        .notify(|err, after| {
            tracing::trace!(error = %err, retry_in = ?after, "Waiting for receipt");
        })
        .await
        .with_context(|| {
            format!(
                "No receipt for {tx_hash} within {}s",
                self.config.receipt_timeout_secs
            )
        })
    }

    /// Read the admin of `proxy` from its EIP-1967 slot.
    async fn proxy_admin(&self, proxy: Address) -> Result<Option<Address>> {
        let word: B256 = self
            .call(
                "eth_getStorageAt",
                vec![
                    serde_json::json!(proxy),
                    serde_json::json!(PROXY_ADMIN_STORAGE_SLOT),
                    serde_json::json!("latest"),
                ],
            )
            .await
            .context("Failed to read proxy admin slot")?;
        Ok(address_from_slot(word))
    }
}

impl ChainClient for RpcChainClient {
    async fn deploy_contract(&self, name: &str, args: &[Literal]) -> Result<Deployment> {
        let mut data = self.artifacts.bytecode(name)?;
        data.extend(abi::encode_params(args));

        let (address, tx_hash) = self.create(name, data).await?;
        Ok(Deployment {
            transaction_hash: Some(tx_hash),
            ..Deployment::at(address)
        })
    }

    async fn deploy_proxied_contract(&self, name: &str, args: &[Literal]) -> Result<Deployment> {
        // Everything that can fail offline is checked before the first
        // transaction, so a bad proxy artifact never strands a logic contract.
        let proxy_bytecode = self
            .artifacts
            .bytecode(&self.proxy_artifact)
            .with_context(|| format!("Failed to load proxy artifact for {name}"))?;
        let init_data = abi::encode_initializer_call(args);

        let logic = self
            .deploy_contract(name, &[])
            .await
            .with_context(|| format!("Failed to deploy logic contract of {name}"))?;

        let mut data = proxy_bytecode;
        data.extend(abi::encode_proxy_constructor(
            logic.address,
            self.sender,
            init_data,
        ));

        let (proxy, tx_hash) = match self.create(&self.proxy_artifact, data).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(
                    contract = %name,
                    implementation = %logic.address,
                    "Proxy creation failed, logic contract left unused"
                );
                return Err(e.context(format!(
                    "Failed to deploy proxy of {name} ({})",
                    abi::initializer_signature(args)
                )));
            }
        };

        // The proxy is mined at this point; a missing admin must not fail the step.
        let admin = match self.proxy_admin(proxy).await {
            Ok(admin) => admin,
            Err(e) => {
                tracing::warn!(
                    contract = %name,
                    proxy = %proxy,
                    error = %format!("{e:#}"),
                    "Could not read proxy admin, recording without it"
                );
                None
            }
        };

        Ok(Deployment {
            address: proxy,
            implementation: Some(logic.address),
            admin,
            transaction_hash: Some(tx_hash),
        })
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        let code: Bytes = self
            .call(
                "eth_getCode",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await
            .with_context(|| format!("Failed to read code at {address}"))?;
        Ok(!code.is_empty())
    }
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an
/// error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    parse_rpc_response(method, result)
}

fn parse_rpc_response<T: DeserializeOwned>(method: &str, mut response: Value) -> Result<T> {
    if let Some(error) = response.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result = response
        .get_mut("result")
        .context("No result in response")?
        .take();

    serde_json::from_value(result)
        .with_context(|| format!("Failed to deserialize {} result", method))
}
