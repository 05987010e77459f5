//! Loading of compiled contract artifacts.
//!
//! Artifacts are the JSON files produced by the contract toolchain, one per
//! contract, named `<Contract>.json`. Both the Truffle layout
//! (`"bytecode": "0x…"`) and the Foundry layout
//! (`"bytecode": { "object": "0x…" }`) are understood.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

/// Directory of compiled contract artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact of `contract`.
    pub fn path_of(&self, contract: &str) -> PathBuf {
        self.dir.join(format!("{contract}.json"))
    }

    /// Creation bytecode of `contract`.
    pub fn bytecode(&self, contract: &str) -> Result<Vec<u8>> {
        let path = self.path_of(contract);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let artifact: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        parse_bytecode(&artifact).with_context(|| format!("Invalid artifact for {contract}"))
    }
}

fn parse_bytecode(artifact: &Value) -> Result<Vec<u8>> {
    let bytecode = match artifact.get("bytecode") {
        Some(Value::String(code)) => code.as_str(),
        Some(Value::Object(code)) => code
            .get("object")
            .and_then(Value::as_str)
            .context("Artifact bytecode object has no `object` field")?,
        _ => anyhow::bail!("Artifact has no `bytecode` field"),
    };

    let bytecode = bytecode.trim_start_matches("0x");
    if bytecode.is_empty() {
        anyhow::bail!("Artifact has empty bytecode (abstract contract or interface?)");
    }
    if bytecode.contains("__") {
        anyhow::bail!("Artifact bytecode contains unlinked library placeholders");
    }

    hex::decode(bytecode).context("Artifact bytecode is not valid hex")
}
