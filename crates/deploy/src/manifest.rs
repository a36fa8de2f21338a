//! The address manifest: the only artifact a run leaves behind.
//!
//! A JSON object mapping contract labels to lowercase `0x` addresses, in deployment
//! order. Serialization is byte-stable: the same manifest always produces the same file.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{error::DeployError, orchestrator::DeploymentRecord};

/// Default manifest file name.
pub const DEFAULT_MANIFEST_PATH: &str = "addresses.json";

/// Ordered label → address mapping.
///
/// Addresses serialize as lowercase `0x` hex. A label repeated in a loaded file keeps
/// its last address, like any JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: IndexMap<String, Address>,
}

impl Manifest {
    /// Build the manifest of a completed run.
    ///
    /// Refuses to build one if an address that was baked into a contract before it
    /// existed has no matching realized contract.
    pub fn from_record(record: &DeploymentRecord) -> Result<Self, DeployError> {
        for (label, predicted) in &record.predictions {
            match record.address_of(label) {
                Some(realized) if realized == *predicted => {}
                Some(realized) => {
                    return Err(DeployError::PredictionMismatch {
                        label: label.clone(),
                        predicted: *predicted,
                        realized,
                    });
                }
                None => {
                    return Err(DeployError::Manifest(format!(
                        "predicted address of `{label}` ({predicted}) was never realized"
                    )));
                }
            }
        }

        Ok(Self {
            entries: record
                .contracts
                .iter()
                .map(|contract| (contract.label.clone(), contract.address))
                .collect(),
        })
    }

    pub fn get(&self, label: &str) -> Option<Address> {
        self.entries.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.entries
            .iter()
            .map(|(label, address)| (label.as_str(), *address))
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json =
            serde_json::to_string_pretty(self).context("Failed to serialize manifest to JSON")?;
        json.push('\n');
        Ok(json)
    }

    /// Write the manifest to `path`.
    ///
    /// The content goes to a temporary file next to `path` first and is renamed into
    /// place, so `path` never holds a partial manifest.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;

        let file_name = path
            .file_name()
            .with_context(|| format!("Invalid manifest path {}", path.display()))?
            .to_string_lossy();
        let tmp_path: PathBuf = path.with_file_name(format!(".{file_name}.tmp"));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write manifest to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move manifest from {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        tracing::info!(path = %path.display(), entries = self.len(), "Manifest written");
        Ok(())
    }

    /// Read a manifest back, keeping the file's key order.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }
}

impl FromIterator<(String, Address)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, Address)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{orchestrator::DeployedContract, predictor::Account};
    use alloy_core::primitives::{B256, address};
    use tempdir::TempDir;

    fn record() -> DeploymentRecord {
        let contract = |label: &str, address: Address| DeployedContract {
            label: label.to_string(),
            contract: "C".to_string(),
            address,
            tx: B256::ZERO,
            nonce: 0,
        };
        DeploymentRecord {
            deployer: Account::new(Address::ZERO, 0),
            contracts: vec![
                contract("zeta", address!("abcdef0000000000000000000000000000000001")),
                contract("alpha", address!("0000000000000000000000000000000000000002")),
            ],
            predictions: vec![(
                "alpha".to_string(),
                address!("0000000000000000000000000000000000000002"),
            )],
        }
    }

    #[test]
    fn test_json_layout() {
        let manifest = Manifest::from_record(&record()).expect("valid record");

        assert_eq!(
            manifest.to_json().expect("serializable"),
            "{\n  \"zeta\": \"0xabcdef0000000000000000000000000000000001\",\n  \"alpha\": \"0x0000000000000000000000000000000000000002\"\n}\n"
        );
    }

    #[test]
    fn test_serialization_is_stable() {
        let manifest = Manifest::from_record(&record()).expect("valid record");
        assert_eq!(
            manifest.to_json().expect("serializable"),
            manifest.to_json().expect("serializable")
        );
    }

    #[test]
    fn test_write_then_load_preserves_order() {
        let temp_dir = TempDir::new("hubdeploy-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("out/addresses.json");
        let manifest = Manifest::from_record(&record()).expect("valid record");

        manifest.write(&path).expect("Failed to write manifest");
        let loaded = Manifest::load(&path).expect("Failed to load manifest");

        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.iter().map(|(label, _)| label).collect::<Vec<_>>(),
            vec!["zeta", "alpha"]
        );
        assert!(!temp_dir.path().join("out/.addresses.json.tmp").exists());
    }

    #[test]
    fn test_unrealized_prediction_is_refused() {
        let mut record = record();
        record
            .predictions
            .push(("ghost".to_string(), Address::ZERO));

        assert!(matches!(
            Manifest::from_record(&record),
            Err(DeployError::Manifest(_))
        ));
    }

    #[test]
    fn test_load_rejects_malformed_addresses() {
        let temp_dir = TempDir::new("hubdeploy-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("addresses.json");
        std::fs::write(&path, r#"{"hub proxy": "0x1234"}"#).expect("Failed to write file");

        assert!(Manifest::load(&path).is_err());
    }
}
