//! Contract factory: turns a contract name and typed arguments into deployable init code.
//!
//! [`ArtifactFactory`] reads Hardhat compilation artifacts (`<Name>.json` files with
//! `bytecode` and `linkReferences` fields), splices library addresses into the link
//! placeholders and appends the ABI-encoded constructor arguments.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, keccak256},
};
use anyhow::Context;
use serde::Deserialize;

/// Errors raised while producing init code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactError {
    #[error("no artifact for contract `{contract}`")]
    NotFound { contract: String },

    #[error("failed to read artifact {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("malformed artifact for `{contract}`: {reason}")]
    Malformed { contract: String, reason: String },

    #[error("`{contract}` links against `{library}`, which was not provided")]
    MissingLibrary { contract: String, library: String },

    #[error("`{contract}` still contains unlinked library placeholders")]
    UnlinkedPlaceholder { contract: String },
}

/// Produces the init code of a contract creation transaction.
pub trait ContractFactory: Send + Sync {
    /// Bytecode of `contract`, linked against `libraries` (name → address), followed by
    /// the ABI-encoded constructor `args`.
    fn init_code(
        &self,
        contract: &str,
        libraries: &[(String, Address)],
        args: &[DynSolValue],
    ) -> Result<Bytes, ArtifactError>;
}

/// ABI-encode a call: 4-byte selector of `signature` followed by the encoded `args`.
pub fn encode_call(signature: &str, args: &[DynSolValue]) -> Bytes {
    let selector = keccak256(signature.as_bytes());
    let mut data = selector[..4].to_vec();
    data.extend(encode_params(args));
    data.into()
}

/// ABI-encode a list of values as function (or constructor) parameters.
pub fn encode_params(args: &[DynSolValue]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.to_vec()).abi_encode_params()
}

/// Size of a linked library address, in bytes.
const ADDRESS_LEN: usize = 20;

/// Position of a library placeholder in the bytecode.
#[derive(Debug, Clone, Copy, Deserialize)]
struct LinkOffset {
    start: usize,
    length: usize,
}

/// The subset of a Hardhat artifact needed to deploy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    bytecode: String,
    /// Source file → library name → placeholder offsets (in bytes).
    #[serde(default)]
    link_references: BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>,
}

impl HardhatArtifact {
    /// Bytecode with every library placeholder replaced by its address.
    fn linked_bytecode(
        &self,
        contract: &str,
        libraries: &[(String, Address)],
    ) -> Result<Vec<u8>, ArtifactError> {
        let malformed = |reason: &str| ArtifactError::Malformed {
            contract: contract.to_string(),
            reason: reason.to_string(),
        };

        // Hex digits as raw bytes: placeholders are spliced byte-wise, so a stray
        // non-ASCII character can only fail the final decode.
        let mut code = self.bytecode.trim_start_matches("0x").as_bytes().to_vec();
        if code.is_empty() {
            return Err(malformed("empty bytecode (abstract contract or interface?)"));
        }

        for (library, offsets) in self.link_references.values().flatten() {
            let address = libraries
                .iter()
                .find_map(|(name, address)| (name == library).then_some(*address))
                .ok_or_else(|| ArtifactError::MissingLibrary {
                    contract: contract.to_string(),
                    library: library.clone(),
                })?;
            let address_hex = hex::encode(address);

            for offset in offsets {
                if offset.length != ADDRESS_LEN {
                    return Err(malformed("link reference is not 20 bytes long"));
                }
                let range = offset
                    .start
                    .checked_mul(2)
                    .and_then(|start| Some(start..start.checked_add(address_hex.len())?))
                    .filter(|range| range.end <= code.len())
                    .ok_or_else(|| malformed("link reference out of bounds"))?;
                code[range].copy_from_slice(address_hex.as_bytes());
            }
        }

        hex::decode(&code).map_err(|e| {
            if code.windows(2).any(|w| w == b"__") {
                ArtifactError::UnlinkedPlaceholder {
                    contract: contract.to_string(),
                }
            } else {
                malformed(&e.to_string())
            }
        })
    }
}

/// Factory backed by a directory of Hardhat artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactFactory {
    root: PathBuf,
    /// Contract name → artifact path.
    index: HashMap<String, PathBuf>,
}

impl ArtifactFactory {
    /// Index every `<Name>.json` artifact found below `root`.
    pub fn open(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        let mut index = HashMap::new();
        Self::index_dir(&root, &mut index)
            .with_context(|| format!("Failed to index artifacts in {}", root.display()))?;

        tracing::debug!(
            root = %root.display(),
            artifacts = index.len(),
            "Indexed contract artifacts"
        );

        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_dir(dir: &Path, index: &mut HashMap<String, PathBuf>) -> anyhow::Result<()> {
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                Self::index_dir(&path, index)?;
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            // Hardhat writes debug metadata next to each artifact.
            if file_name.ends_with(".dbg.json") {
                continue;
            }
            if let Some(contract) = file_name.strip_suffix(".json") {
                if let Some(previous) = index.insert(contract.to_string(), path.clone()) {
                    tracing::warn!(
                        contract,
                        kept = %path.display(),
                        ignored = %previous.display(),
                        "Duplicate artifact name"
                    );
                }
            }
        }
        Ok(())
    }

    fn load(&self, contract: &str) -> Result<HardhatArtifact, ArtifactError> {
        let path = self
            .index
            .get(contract)
            .ok_or_else(|| ArtifactError::NotFound {
                contract: contract.to_string(),
            })?;

        let content = std::fs::read_to_string(path).map_err(|e| ArtifactError::Read {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ArtifactError::Malformed {
            contract: contract.to_string(),
            reason: e.to_string(),
        })
    }
}

impl ContractFactory for ArtifactFactory {
    fn init_code(
        &self,
        contract: &str,
        libraries: &[(String, Address)],
        args: &[DynSolValue],
    ) -> Result<Bytes, ArtifactError> {
        let mut code = self.load(contract)?.linked_bytecode(contract, libraries)?;
        code.extend(encode_params(args));
        Ok(code.into())
    }
}
