use chrono::{DateTime, SecondsFormat, Utc};
use ethers::types::{Address, H256, U256};
use ethers::utils::to_checksum;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Summary of one successful deployment, written to
/// `<deployments dir>/<network>-deployment.json`.
///
/// One file per network; a rerun overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract_address: String,
    pub transaction_hash: String,
    pub deployer: String,
    pub network: String,
    /// UTC, millisecond precision (`2024-05-01T12:00:00.000Z`).
    pub timestamp: String,
    /// Decimal string. Omitted when the receipt did not report it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
    pub block_number: u64,
}

impl DeploymentRecord {
    pub fn new(
        contract_address: Address,
        transaction_hash: H256,
        deployer: Address,
        network: &str,
        gas_used: Option<U256>,
        block_number: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            contract_address: to_checksum(&contract_address, None),
            transaction_hash: format!("{:#x}", transaction_hash),
            deployer: to_checksum(&deployer, None),
            network: network.to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            gas_used: gas_used.map(|g| g.to_string()),
            block_number,
        }
    }

    pub fn path_in(dir: impl AsRef<Path>, network: &str) -> PathBuf {
        dir.as_ref().join(format!("{network}-deployment.json"))
    }

    /// The record previously written for `network`, if any.
    ///
    /// An unreadable or malformed file is reported and treated as absent; it is
    /// about to be overwritten anyway.
    pub fn load_existing(dir: impl AsRef<Path>, network: &str) -> Option<Self> {
        let path = Self::path_in(dir, network);
        if !path.exists() {
            return None;
        }
        match Self::load(&path) {
            Ok(rec) => Some(rec),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable deployment record");
                None
            }
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| eyre!("failed to read deployment record {}: {e}", path.display()))?;
        serde_json::from_str(&raw)
            .map_err(|e| eyre!("failed to parse deployment record {}: {e}", path.display()))
    }

    /// Write the record under `dir`, creating the directory if needed.
    /// Returns the path written.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| {
                eyre!("failed to create deployments directory {}: {e}", dir.display())
            })?;
        }

        let path = Self::path_in(dir, &self.network);

        // serde_json's pretty printer indents with two spaces.
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| eyre!("failed to serialize deployment record: {e}"))?;

        // Atomic-ish write: write to a temp file then rename.
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| {
            eyre!(
                "failed to write temp deployment record {}: {e}",
                tmp_path.display()
            )
        })?;

        // On Windows, rename fails if the destination exists; remove then rename.
        if let Err(err) = fs::rename(&tmp_path, &path) {
            if cfg!(windows) {
                let _ = fs::remove_file(&path);
                fs::rename(&tmp_path, &path).map_err(|e| {
                    eyre!("failed to replace deployment record {}: {e}", path.display())
                })?;
            } else {
                let _ = fs::remove_file(&tmp_path);
                return Err(eyre!(
                    "failed to replace deployment record {}: {err}",
                    path.display()
                ));
            }
        }

        Ok(path)
    }
}
