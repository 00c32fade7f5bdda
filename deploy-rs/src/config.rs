use crate::artifact::ArtifactLookup;
use crate::deploy::DeployPlan;
use ethers::types::U256;
use eyre::{eyre, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";

/// One entry of the network table.
///
/// Either `url` or `urlEnvVar` must resolve to an RPC endpoint. Extra fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDef {
    #[serde(default)]
    pub url: Option<String>,
    /// Name of an environment variable that contains the RPC URL.
    /// Useful to avoid committing provider API keys.
    #[serde(default)]
    pub url_env_var: Option<String>,
    /// Expected chain id. When set, the node must report the same id.
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub private_key_env_var: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworksFile {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkDef>,
}

impl NetworksFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| eyre!("failed to read networks file {}: {e}", path.display()))?;
        serde_json::from_str(&raw)
            .map_err(|e| eyre!("failed to parse networks file {}: {e}", path.display()))
    }
}

/// Networks available without a config file.
pub fn builtin_networks() -> BTreeMap<String, NetworkDef> {
    let mut networks = BTreeMap::new();
    networks.insert(
        "sepolia".to_string(),
        NetworkDef {
            url_env_var: Some("SEPOLIA_RPC_URL".to_string()),
            chain_id: Some(11_155_111),
            ..Default::default()
        },
    );
    networks.insert(
        "fhevm".to_string(),
        NetworkDef {
            url: Some("http://localhost:8545".to_string()),
            ..Default::default()
        },
    );
    networks.insert(
        "localhost".to_string(),
        NetworkDef {
            url: Some("http://127.0.0.1:8545".to_string()),
            ..Default::default()
        },
    );
    networks
}

/// Built-in networks, with entries from `path` (if given) added or replacing them.
pub fn load_networks(path: Option<&Path>) -> Result<BTreeMap<String, NetworkDef>> {
    let mut networks = builtin_networks();
    if let Some(path) = path {
        let file = NetworksFile::load(path)?;
        for (name, def) in file.networks {
            if networks.insert(name.clone(), def).is_some() {
                tracing::debug!(network = %name, file = %path.display(), "network overridden by config file");
            }
        }
    }
    Ok(networks)
}

#[derive(Debug, Clone)]
pub struct DeployConfig {
    pub network: String,
    pub rpc_url: String,
    pub chain_id: Option<u64>,
    pub private_key_env: String,

    pub artifact: ArtifactLookup,

    /// Total confirmations to wait for, counting the inclusion block.
    pub confirmations: usize,

    /// Balance below which a low-funds warning is emitted.
    pub min_balance: U256,

    pub gas_limit: Option<u64>,
    pub deployments_dir: PathBuf,
    pub dry_run: bool,
}

impl DeployConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli(
        networks: &BTreeMap<String, NetworkDef>,
        network: String,
        rpc_override: Option<String>,
        private_key_env_override: Option<String>,
        contract_name: String,
        artifacts_dir: PathBuf,
        artifact_path: Option<PathBuf>,
        confirmations: usize,
        min_balance_eth: &str,
        gas_limit: Option<u64>,
        deployments_dir: PathBuf,
        dry_run: bool,
    ) -> Result<Self> {
        validate_network_name(&network)?;

        let def = networks.get(&network).ok_or_else(|| {
            eyre!(
                "unknown network '{network}'. known networks: {}",
                networks.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })?;

        let rpc_url = resolve_rpc_url(&network, def, rpc_override, |k| std::env::var(k).ok())?;

        if rpc_url.contains("alchemy.com/v2/") || rpc_url.contains("infura.io/v3/") {
            tracing::warn!("RPC URL looks like it may contain an API key; consider keeping it in an env var instead of committing it.");
        }

        let private_key_env = private_key_env_override
            .or_else(|| def.private_key_env_var.clone())
            .unwrap_or_else(|| DEFAULT_PRIVATE_KEY_ENV.to_string());

        if contract_name.trim().is_empty() {
            return Err(eyre!("contract name must not be empty"));
        }

        let min_balance = ethers::utils::parse_ether(min_balance_eth.trim())
            .map_err(|e| eyre!("invalid minimum balance '{min_balance_eth}' (ETH): {e}"))?;

        if confirmations == 0 {
            tracing::warn!("confirmations = 0; waiting for inclusion only");
        }

        if gas_limit == Some(0) {
            return Err(eyre!("gas limit must be > 0"));
        }

        Ok(Self {
            network,
            rpc_url,
            chain_id: def.chain_id,
            private_key_env,
            artifact: ArtifactLookup {
                contract_name,
                artifacts_dir,
                explicit_path: artifact_path,
            },
            confirmations: confirmations.max(1),
            min_balance,
            gas_limit,
            deployments_dir,
            dry_run,
        })
    }

    pub fn plan(&self) -> DeployPlan {
        DeployPlan {
            network: self.network.clone(),
            artifact: self.artifact.clone(),
            confirmations: self.confirmations,
            min_balance: self.min_balance,
            deployments_dir: self.deployments_dir.clone(),
            dry_run: self.dry_run,
        }
    }

    /// Hard safety check: refuse to sign for a chain other than the one configured.
    pub fn check_chain_id(&self, remote_chain_id: u64) -> Result<()> {
        match self.chain_id {
            Some(expected) if expected != remote_chain_id => Err(eyre!(
                "RPC chainId mismatch: network '{}' expects {}, but RPC reports {}. Refusing to deploy.",
                self.network,
                expected,
                remote_chain_id
            )),
            _ => Ok(()),
        }
    }
}

/// CLI override, then the network's env var, then its literal URL.
pub fn resolve_rpc_url(
    network: &str,
    def: &NetworkDef,
    rpc_override: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    rpc_override
        .or_else(|| def.url_env_var.as_deref().and_then(&env))
        .or_else(|| def.url.clone())
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| match def.url_env_var.as_deref() {
            Some(var) => eyre!("no rpc url for network '{network}'. set {var} or pass --rpc-url"),
            None => eyre!("no rpc url for network '{network}'. add a url to its definition or pass --rpc-url"),
        })
}

// The name ends up in a file name under the deployments directory.
fn validate_network_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(eyre!(
            "invalid network name '{name}': use letters, digits, '-' or '_'"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_for(network: &str, networks: &BTreeMap<String, NetworkDef>) -> Result<DeployConfig> {
        DeployConfig::from_cli(
            networks,
            network.to_string(),
            Some("http://127.0.0.1:8545".to_string()),
            None,
            "MyConfidentialToken".to_string(),
            PathBuf::from("artifacts"),
            None,
            3,
            "0.01",
            None,
            PathBuf::from("deployments"),
            false,
        )
    }

    #[test]
    fn builtins_mirror_the_default_networks() {
        let networks = builtin_networks();
        let sepolia = &networks["sepolia"];
        assert_eq!(sepolia.url_env_var.as_deref(), Some("SEPOLIA_RPC_URL"));
        assert_eq!(sepolia.chain_id, Some(11_155_111));
        assert_eq!(
            networks["fhevm"].url.as_deref(),
            Some("http://localhost:8545")
        );
    }

    #[test]
    fn rpc_url_prefers_override_then_env_then_literal() {
        let def = NetworkDef {
            url: Some("http://literal:8545".to_string()),
            url_env_var: Some("TEST_RPC".to_string()),
            ..Default::default()
        };
        let env = |k: &str| (k == "TEST_RPC").then(|| "http://from-env:8545".to_string());
        let no_env = |_: &str| None;

        let url = resolve_rpc_url("x", &def, Some("http://cli:8545".to_string()), env).unwrap();
        assert_eq!(url, "http://cli:8545");

        let url = resolve_rpc_url("x", &def, None, env).unwrap();
        assert_eq!(url, "http://from-env:8545");

        let url = resolve_rpc_url("x", &def, None, no_env).unwrap();
        assert_eq!(url, "http://literal:8545");
    }

    #[test]
    fn missing_rpc_url_names_the_env_var() {
        let def = NetworkDef {
            url_env_var: Some("SEPOLIA_RPC_URL".to_string()),
            ..Default::default()
        };
        let err = resolve_rpc_url("sepolia", &def, None, |_| None).unwrap_err();
        assert!(err.to_string().contains("SEPOLIA_RPC_URL"));

        let blank = resolve_rpc_url("sepolia", &def, None, |_| Some("  ".to_string()));
        assert!(blank.is_err());
    }

    #[test]
    fn config_file_adds_and_replaces_networks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "networks": {{
                    "fhevm": {{ "url": "http://devnet:8545", "chainId": 9000 }},
                    "holesky": {{ "urlEnvVar": "HOLESKY_RPC_URL", "privateKeyEnvVar": "HOLESKY_KEY" }}
                }}
            }}"#
        )
        .unwrap();

        let networks = load_networks(Some(file.path())).unwrap();
        assert_eq!(networks["fhevm"].url.as_deref(), Some("http://devnet:8545"));
        assert_eq!(networks["fhevm"].chain_id, Some(9000));
        assert_eq!(
            networks["holesky"].private_key_env_var.as_deref(),
            Some("HOLESKY_KEY")
        );
        assert!(networks.contains_key("sepolia"));
    }

    #[test]
    fn from_cli_resolves_defaults() {
        let cfg = config_for("sepolia", &builtin_networks()).unwrap();
        assert_eq!(cfg.private_key_env, DEFAULT_PRIVATE_KEY_ENV);
        assert_eq!(cfg.chain_id, Some(11_155_111));
        assert_eq!(cfg.min_balance, U256::exp10(16));
        assert_eq!(cfg.confirmations, 3);

        let plan = cfg.plan();
        assert_eq!(plan.network, "sepolia");
        assert_eq!(plan.artifact.contract_name, "MyConfidentialToken");
    }

    #[test]
    fn from_cli_rejects_unknown_and_unsafe_network_names() {
        let networks = builtin_networks();
        let err = config_for("mainnet", &networks).unwrap_err();
        assert!(err.to_string().contains("unknown network"));

        let err = config_for("../etc", &networks).unwrap_err();
        assert!(err.to_string().contains("invalid network name"));
    }

    #[test]
    fn chain_id_guard() {
        let cfg = config_for("sepolia", &builtin_networks()).unwrap();
        assert!(cfg.check_chain_id(11_155_111).is_ok());
        let err = cfg.check_chain_id(1).unwrap_err();
        assert!(err.to_string().contains("chainId mismatch"));

        // No expected chain id configured: anything goes.
        let cfg = config_for("fhevm", &builtin_networks()).unwrap();
        assert!(cfg.check_chain_id(31337).is_ok());
    }
}
