use ethers::abi::Abi;
use ethers::types::Bytes;
use eyre::{eyre, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Subset of a Hardhat-style compiled artifact
/// (`artifacts/contracts/<Source>.sol/<Name>.json`) needed to deploy.
///
/// Extra fields (`deployedBytecode`, `linkReferences`, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    #[serde(default)]
    pub source_name: Option<String>,
    pub abi: Abi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| eyre!("failed to read contract artifact {}: {e}", path.display()))?;
        let art: ContractArtifact = serde_json::from_str(&raw)
            .map_err(|e| eyre!("failed to parse contract artifact {}: {e}", path.display()))?;

        // Interfaces and abstract contracts compile to empty bytecode.
        if art.bytecode.is_empty() {
            return Err(eyre!(
                "artifact {} for {} has no bytecode; is it an interface or abstract contract?",
                path.display(),
                art.contract_name
            ));
        }

        Ok(art)
    }
}

/// How to find the artifact for the contract being deployed: an explicit file,
/// or a search by contract name under the artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactLookup {
    pub contract_name: String,
    pub artifacts_dir: PathBuf,
    pub explicit_path: Option<PathBuf>,
}

impl ArtifactLookup {
    /// Builds the contract factory input for `contract_name`.
    pub fn resolve(&self) -> Result<ContractArtifact> {
        let path = match &self.explicit_path {
            Some(path) => path.clone(),
            None => find_by_name(&self.artifacts_dir, &self.contract_name)?,
        };

        let art = ContractArtifact::load(&path)?;
        if art.contract_name != self.contract_name {
            tracing::warn!(
                expected = %self.contract_name,
                found = %art.contract_name,
                artifact = %path.display(),
                "artifact contract name differs from requested contract"
            );
        }
        Ok(art)
    }
}

/// Locate `<name>.json` anywhere under `dir`.
///
/// Debug files (`<name>.dbg.json`) and `build-info/` are never matched. More than one
/// match is an error; pass the artifact path explicitly to disambiguate.
pub fn find_by_name(dir: &Path, contract_name: &str) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(eyre!(
            "artifacts directory {} not found; compile the contracts first",
            dir.display()
        ));
    }

    let file_name = format!("{contract_name}.json");
    let mut found = Vec::new();
    collect_matches(dir, &file_name, &mut found)?;
    found.sort();

    match found.len() {
        0 => Err(eyre!(
            "no artifact for contract {contract_name} under {}",
            dir.display()
        )),
        1 => Ok(found.remove(0)),
        _ => Err(eyre!(
            "multiple artifacts for contract {contract_name}: {}",
            found
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

fn collect_matches(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| eyre!("failed to list artifacts directory {}: {e}", dir.display()))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| eyre!("failed to list artifacts directory {}: {e}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            if entry.file_name() == "build-info" {
                continue;
            }
            collect_matches(&path, file_name, out)?;
        } else if entry.file_name().to_str() == Some(file_name) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TOKEN_ABI: &str = r#"[
        {"inputs":[],"stateMutability":"nonpayable","type":"constructor"},
        {"inputs":[],"name":"name","outputs":[{"internalType":"string","name":"","type":"string"}],"stateMutability":"view","type":"function"},
        {"inputs":[],"name":"symbol","outputs":[{"internalType":"string","name":"","type":"string"}],"stateMutability":"view","type":"function"}
    ]"#;

    /// Writes a Hardhat-layout artifact (plus its `.dbg.json` sibling) under `root`.
    pub(crate) fn write_artifact(root: &Path, source: &str, name: &str, bytecode: &str) -> PathBuf {
        let dir = root.join("contracts").join(source);
        fs::create_dir_all(&dir).unwrap();

        let body = format!(
            r#"{{
                "_format": "hh-sol-artifact-1",
                "contractName": "{name}",
                "sourceName": "contracts/{source}",
                "abi": {TOKEN_ABI},
                "bytecode": "{bytecode}",
                "deployedBytecode": "0x",
                "linkReferences": {{}},
                "deployedLinkReferences": {{}}
            }}"#
        );
        let path = dir.join(format!("{name}.json"));
        fs::write(&path, body).unwrap();
        fs::write(
            dir.join(format!("{name}.dbg.json")),
            r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/x.json"}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn finds_artifact_by_contract_name() {
        let tmp = tempfile::tempdir().unwrap();
        let expected = write_artifact(
            tmp.path(),
            "MyConfidentialToken.sol",
            "MyConfidentialToken",
            "0x6080604052",
        );

        let found = find_by_name(tmp.path(), "MyConfidentialToken").unwrap();
        assert_eq!(found, expected);

        let lookup = ArtifactLookup {
            contract_name: "MyConfidentialToken".to_string(),
            artifacts_dir: tmp.path().to_path_buf(),
            explicit_path: None,
        };
        let art = lookup.resolve().unwrap();
        assert_eq!(art.contract_name, "MyConfidentialToken");
        assert_eq!(
            art.source_name.as_deref(),
            Some("contracts/MyConfidentialToken.sol")
        );
        assert_eq!(art.bytecode.to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        assert!(art.abi.function("symbol").is_ok());
    }

    #[test]
    fn ambiguous_and_missing_names_are_errors() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifact(tmp.path(), "A.sol", "Token", "0x60");
        write_artifact(tmp.path(), "B.sol", "Token", "0x60");

        let err = find_by_name(tmp.path(), "Token").unwrap_err();
        assert!(err.to_string().contains("multiple artifacts"));

        let err = find_by_name(tmp.path(), "Missing").unwrap_err();
        assert!(err.to_string().contains("no artifact"));

        let err = find_by_name(&tmp.path().join("nope"), "Token").unwrap_err();
        assert!(err.to_string().contains("compile the contracts first"));
    }

    #[test]
    fn empty_bytecode_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_artifact(tmp.path(), "IToken.sol", "IToken", "0x");

        let err = ContractArtifact::load(&path).unwrap_err();
        assert!(err.to_string().contains("no bytecode"));
    }

    #[test]
    fn explicit_path_skips_the_search() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_artifact(tmp.path(), "Token.sol", "Token", "0x60");

        let lookup = ArtifactLookup {
            contract_name: "Token".to_string(),
            artifacts_dir: tmp.path().join("does-not-exist"),
            explicit_path: Some(path),
        };
        assert_eq!(lookup.resolve().unwrap().contract_name, "Token");
    }
}
