//! Final run report.

use std::{fmt, path::PathBuf};

use alloy_core::primitives::{Address, B256};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;

use crate::{
    error::{DeployError, WhitelistEntryFailed},
    manifest::Manifest,
    plan::WhitelistCategoryKind,
};

/// Process exit code of a fully successful run.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code when contract creation failed or was aborted. No manifest exists.
pub const EXIT_DEPLOYMENT_FAILED: u8 = 1;
/// Process exit code when every contract was created but some whitelist entry failed.
pub const EXIT_WHITELIST_INCOMPLETE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum StepStatus {
    NotReached,
    Confirmed,
    Failed(String),
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReached => write!(f, "not reached"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of one plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// 1-indexed position in the plan.
    pub position: usize,
    pub label: String,
    /// Contract name for creations, function signature for calls.
    pub action: String,
    /// Deployer nonce, for steps sent by the deployer.
    pub nonce: Option<u64>,
    pub predicted: Option<Address>,
    pub realized: Option<Address>,
    pub tx: Option<B256>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum EntryStatus {
    Whitelisted,
    Failed(String),
    /// Not attempted because the run was aborted.
    Skipped,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whitelisted => write!(f, "whitelisted"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one whitelist authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistOutcome {
    pub category: WhitelistCategoryKind,
    pub label: String,
    pub module: Address,
    pub tx: Option<B256>,
    pub status: EntryStatus,
}

/// Everything that happened during a run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub steps: Vec<StepOutcome>,
    pub whitelist: Vec<WhitelistOutcome>,
    /// Set once every contract has been created.
    pub manifest: Option<Manifest>,
    /// Where the manifest was written, if it was.
    pub manifest_path: Option<PathBuf>,
    /// The error that ended the run, if any.
    pub failure: Option<DeployError>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        match &self.failure {
            None => EXIT_SUCCESS,
            Some(DeployError::WhitelistIncomplete { .. }) => EXIT_WHITELIST_INCOMPLETE,
            Some(_) => EXIT_DEPLOYMENT_FAILED,
        }
    }

    pub fn step(&self, label: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|step| step.label == label)
    }

    /// The whitelist entries that were attempted and failed.
    pub fn failed_entries(&self) -> Vec<WhitelistEntryFailed> {
        self.whitelist
            .iter()
            .filter_map(|entry| match &entry.status {
                EntryStatus::Failed(reason) => Some(WhitelistEntryFailed {
                    category: entry.category,
                    label: entry.label.clone(),
                    module: entry.module,
                    reason: reason.clone(),
                }),
                EntryStatus::Whitelisted | EntryStatus::Skipped => None,
            })
            .collect()
    }

    /// Render the report as human-readable tables.
    pub fn render(&self) -> String {
        let mut steps = Table::new();
        steps
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["#", "step", "action", "nonce", "address", "status"]);

        for step in &self.steps {
            steps.add_row(vec![
                step.position.to_string(),
                step.label.clone(),
                step.action.clone(),
                step.nonce.map(|n| n.to_string()).unwrap_or_default(),
                step.realized
                    .or(step.predicted)
                    .map(|a| a.to_string())
                    .unwrap_or_default(),
                step.status.to_string(),
            ]);
        }

        let mut out = steps.to_string();

        if !self.whitelist.is_empty() {
            let mut whitelist = Table::new();
            whitelist
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["category", "entry", "module", "status"]);

            for entry in &self.whitelist {
                whitelist.add_row(vec![
                    entry.category.to_string(),
                    entry.label.clone(),
                    entry.module.to_string(),
                    entry.status.to_string(),
                ]);
            }

            out.push('\n');
            out.push_str(&whitelist.to_string());
        }

        if let Some(path) = &self.manifest_path {
            out.push_str(&format!("\nmanifest: {}", path.display()));
        }
        match &self.failure {
            Some(failure) => out.push_str(&format!("\nresult: FAILED ({failure})")),
            None => out.push_str("\nresult: OK"),
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, status: EntryStatus) -> WhitelistOutcome {
        WhitelistOutcome {
            category: WhitelistCategoryKind::CollectModule,
            label: label.to_string(),
            module: Address::ZERO,
            tx: None,
            status,
        }
    }

    #[test]
    fn test_exit_codes() {
        let mut report = RunReport::default();
        assert_eq!(report.exit_code(), EXIT_SUCCESS);

        report.failure = Some(DeployError::WhitelistIncomplete {
            failed: 1,
            skipped: 0,
        });
        assert_eq!(report.exit_code(), EXIT_WHITELIST_INCOMPLETE);

        report.failure = Some(DeployError::MissingContractAddress {
            label: "currency".to_string(),
        });
        assert_eq!(report.exit_code(), EXIT_DEPLOYMENT_FAILED);
        assert!(!report.succeeded());
    }

    #[test]
    fn test_failed_entries_ignore_skipped() {
        let report = RunReport {
            whitelist: vec![
                entry("a", EntryStatus::Whitelisted),
                entry("b", EntryStatus::Failed("reverted".to_string())),
                entry("c", EntryStatus::Skipped),
            ],
            ..Default::default()
        };

        let failed = report.failed_entries();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].label, "b");
        assert_eq!(failed[0].reason, "reverted");
    }

    #[test]
    fn test_render_lists_every_step_and_entry() {
        let report = RunReport {
            steps: vec![StepOutcome {
                position: 1,
                label: "module globals".to_string(),
                action: "ModuleGlobals".to_string(),
                nonce: Some(0),
                predicted: Some(Address::ZERO),
                realized: None,
                tx: None,
                status: StepStatus::NotReached,
            }],
            whitelist: vec![entry("fee collect module", EntryStatus::Skipped)],
            ..Default::default()
        };

        let rendered = report.render();
        assert!(rendered.contains("module globals"));
        assert!(rendered.contains("not reached"));
        assert!(rendered.contains("fee collect module"));
        assert!(rendered.contains("result: OK"));
    }
}
