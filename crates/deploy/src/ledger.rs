//! Append-only record of what has been deployed where.
//!
//! The ledger is consulted before every step and appended to after every
//! successful one. A ledger opened from a file persists each entry before
//! [`Ledger::record`] returns, so an interrupted run can always be resumed
//! from the file.

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use alloy_core::primitives::{Address, B256};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::{
    client::Deployment,
    error::LedgerError,
    fs::FsHandler,
    plan::{ContractSpec, DeployMode},
};

/// A deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Contract name, as in the plan.
    pub name: String,
    /// Address to use when talking to the contract (the proxy, if proxied).
    pub address: Address,
    /// How the contract was deployed.
    pub mode: DeployMode,
    /// Position in execution order, starting at 1.
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    /// Fingerprint of the plan entry the contract was deployed from.
    pub fingerprint: String,
    /// Unix timestamp of the recording.
    pub recorded_at: i64,
}

#[derive(Debug, Default, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    chain_id: Option<u64>,
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

#[derive(Serialize)]
struct LedgerFileRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    chain_id: Option<u64>,
    entries: &'a [LedgerEntry],
}

/// Backing file of a persistent ledger, held under an exclusive lock.
#[derive(Debug)]
struct LedgerStore {
    path: PathBuf,
    _lock: File,
}

/// Idempotent deployment record.
#[derive(Debug, Default)]
pub struct Ledger {
    chain_id: Option<u64>,
    entries: Vec<LedgerEntry>,
    store: Option<LedgerStore>,
}

impl Ledger {
    /// Create an empty, in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the ledger stored at `path` for a deployment run.
    ///
    /// A missing file yields an empty ledger which will be created on the
    /// first [`record`](Self::record). The ledger holds an exclusive lock on
    /// `<path>.lock` until dropped, so two runs cannot share a ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let io_err = |source: io::Error| LedgerError::Io {
            path: path.clone(),
            source,
        };

        let (lock_path, lock) = FsHandler::open_lock_file(&path).map_err(io_err)?;
        if let Err(e) = lock.try_lock_exclusive() {
            return Err(if e.kind() == fs2::lock_contended_error().kind() {
                LedgerError::Locked { path: lock_path }
            } else {
                io_err(e)
            });
        }

        let file = if path.exists() {
            Self::load_file(&path)?
        } else {
            LedgerFile::default()
        };

        tracing::info!(
            path = %path.display(),
            entries = file.entries.len(),
            "Ledger opened"
        );

        Self::from_file(file, Some(LedgerStore { path, _lock: lock }))
    }

    /// Load a read-only snapshot of the ledger stored at `path`.
    ///
    /// The snapshot takes no lock. Recording into it only changes memory.
    pub fn read(path: &Path) -> Result<Self, LedgerError> {
        Self::from_file(Self::load_file(path)?, None)
    }

    fn load_file(path: &Path) -> Result<LedgerFile, LedgerError> {
        let content = std::fs::read_to_string(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_file(file: LedgerFile, store: Option<LedgerStore>) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            chain_id: file.chain_id,
            entries: Vec::with_capacity(file.entries.len()),
            store,
        };
        for entry in file.entries {
            if ledger.has(&entry.name) {
                return Err(LedgerError::DuplicateDeployment(entry.name));
            }
            ledger.entries.push(entry);
        }
        ledger.entries.sort_by_key(|entry| entry.sequence);
        Ok(ledger)
    }

    /// Path of the backing file, for persistent ledgers.
    pub fn path(&self) -> Option<&Path> {
        self.store.as_ref().map(|store| store.path.as_path())
    }

    /// Chain the ledger is bound to.
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    /// Bind the ledger to `chain_id`.
    ///
    /// A ledger remembers the first chain it is bound to; binding it to
    /// another chain fails.
    pub fn bind_chain_id(&mut self, chain_id: u64) -> Result<(), LedgerError> {
        match self.chain_id {
            Some(recorded) if recorded != chain_id => Err(LedgerError::ChainMismatch {
                recorded,
                requested: chain_id,
            }),
            Some(_) => Ok(()),
            None => {
                self.chain_id = Some(chain_id);
                if let Err(e) = self.persist() {
                    self.chain_id = None;
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    /// Whether `name` has been deployed.
    pub fn has(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Deployed address of `name`.
    pub fn get(&self, name: &str) -> Result<Address, LedgerError> {
        self.entry(name)
            .map(|entry| entry.address)
            .ok_or_else(|| LedgerError::NotDeployed(name.to_string()))
    }

    /// Full entry of `name`.
    pub fn entry(&self, name: &str) -> Option<&LedgerEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// All entries in execution order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append the deployment of `spec`.
    ///
    /// Fails with [`LedgerError::DuplicateDeployment`] if the contract is
    /// already recorded. For persistent ledgers the entry is on disk when
    /// this returns; if writing fails the entry is dropped again and the
    /// error returned.
    pub fn record(
        &mut self,
        spec: &ContractSpec,
        deployment: Deployment,
    ) -> Result<&LedgerEntry, LedgerError> {
        if self.has(&spec.name) {
            return Err(LedgerError::DuplicateDeployment(spec.name.clone()));
        }

        let sequence = self.entries.last().map_or(1, |entry| entry.sequence + 1);
        self.entries.push(LedgerEntry {
            name: spec.name.clone(),
            address: deployment.address,
            mode: spec.mode,
            sequence,
            implementation: deployment.implementation,
            admin: deployment.admin,
            transaction_hash: deployment.transaction_hash,
            fingerprint: spec.fingerprint(),
            recorded_at: chrono::Utc::now().timestamp(),
        });

        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }

        let index = self.entries.len() - 1;
        Ok(&self.entries[index])
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let file = LedgerFileRef {
            chain_id: self.chain_id,
            entries: &self.entries,
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| LedgerError::Encode {
            path: store.path.clone(),
            source,
        })?;

        FsHandler::write_atomic(&store.path, &json).map_err(|source| LedgerError::Io {
            path: store.path.clone(),
            source,
        })?;

        tracing::debug!(path = %store.path.display(), entries = self.entries.len(), "Ledger saved");
        Ok(())
    }
}
