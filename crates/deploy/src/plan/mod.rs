//! Deployment plans.
//!
//! A plan is an explicit, ordered list of steps. Steps reference addresses through
//! [`Slot`]s, which are either predicted (the contract is created later in the deployer's
//! transaction stream) or realized (the contract was created earlier). Together these
//! references form a dependency graph that [`DeploymentPlan::validate`] checks before
//! anything is sent.

mod hub;

use std::collections::{BTreeSet, HashMap};

use alloy_core::primitives::{Address, Bytes, U256};
use derive_more::Display;
use serde::{Deserialize, Serialize};

pub use hub::{
    DEFAULT_NFT_NAME, DEFAULT_NFT_SYMBOL, DEFAULT_TREASURY_FEE_BPS, HubPlanParams, InitMode, labels,
};

/// Account roles resolved when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// The account sending every creation transaction.
    #[display("deployer")]
    Deployer,
    #[display("governance")]
    Governance,
    #[display("treasury")]
    Treasury,
    /// Admin of the upgradeable hub proxy.
    #[display("proxy-admin")]
    ProxyAdmin,
}

/// Reference to an address used as an argument or a call target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Address the labelled creation step will produce. It must come later in the plan.
    Predicted(String),
    /// Address the labelled creation step produced. It must come earlier in the plan.
    Realized(String),
    Role(Role),
    Fixed(Address),
}

impl Slot {
    pub fn predicted(label: impl Into<String>) -> Self {
        Self::Predicted(label.into())
    }

    pub fn realized(label: impl Into<String>) -> Self {
        Self::Realized(label.into())
    }

    /// Label of the step this slot points at, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Predicted(label) | Self::Realized(label) => Some(label),
            Self::Role(_) | Self::Fixed(_) => None,
        }
    }
}

/// A typed constructor or call argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    Address(Slot),
    Uint(U256),
    Bool(bool),
    String(String),
    Bytes(Bytes),
    /// ABI-encoded call data, passed on as `bytes` (e.g. a proxy initialization payload).
    Call(CallSpec),
}

impl Arg {
    pub fn predicted(label: impl Into<String>) -> Self {
        Self::Address(Slot::predicted(label))
    }

    pub fn realized(label: impl Into<String>) -> Self {
        Self::Address(Slot::realized(label))
    }

    pub fn role(role: Role) -> Self {
        Self::Address(Slot::Role(role))
    }

    fn collect_slots<'a>(&'a self, out: &mut Vec<&'a Slot>) {
        match self {
            Self::Address(slot) => out.push(slot),
            Self::Call(call) => call.args.iter().for_each(|arg| arg.collect_slots(out)),
            Self::Uint(_) | Self::Bool(_) | Self::String(_) | Self::Bytes(_) => {}
        }
    }
}

/// A contract function call: human-readable signature plus arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSpec {
    /// Canonical signature, e.g. `initialize(string,string,address)`.
    pub signature: String,
    pub args: Vec<Arg>,
}

impl CallSpec {
    pub fn new(signature: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            signature: signature.into(),
            args,
        }
    }
}

/// Library linked into a contract's bytecode before deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryLink {
    /// Library contract name as it appears in the artifact's link references.
    pub name: String,
    pub address: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Contract creation, always sent by the deployer.
    Create {
        contract: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        libraries: Vec<LibraryLink>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Arg>,
    },
    /// Call on an existing contract.
    Call {
        target: Slot,
        signer: Role,
        call: CallSpec,
    },
}

/// A single transaction of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique label, also used as the manifest key for creations.
    pub label: String,
    pub action: StepAction,
}

impl PlanStep {
    pub fn create(label: impl Into<String>, contract: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            label: label.into(),
            action: StepAction::Create {
                contract: contract.into(),
                libraries: Vec::new(),
                args,
            },
        }
    }

    pub fn call(label: impl Into<String>, target: Slot, signer: Role, call: CallSpec) -> Self {
        Self {
            label: label.into(),
            action: StepAction::Call {
                target,
                signer,
                call,
            },
        }
    }

    /// Link a library into a creation step. No-op on calls.
    pub fn with_library(mut self, name: impl Into<String>, address: Slot) -> Self {
        if let StepAction::Create { libraries, .. } = &mut self.action {
            libraries.push(LibraryLink {
                name: name.into(),
                address,
            });
        }
        self
    }

    pub fn is_creation(&self) -> bool {
        matches!(self.action, StepAction::Create { .. })
    }

    /// Whether this step consumes a nonce of the deployer account.
    pub fn is_deployer_signed(&self) -> bool {
        match &self.action {
            StepAction::Create { .. } => true,
            StepAction::Call { signer, .. } => *signer == Role::Deployer,
        }
    }

    /// Every address slot the step depends on, including library links and call targets.
    pub fn slots(&self) -> Vec<&Slot> {
        let mut out = Vec::new();
        match &self.action {
            StepAction::Create {
                libraries, args, ..
            } => {
                out.extend(libraries.iter().map(|link| &link.address));
                args.iter().for_each(|arg| arg.collect_slots(&mut out));
            }
            StepAction::Call { target, call, .. } => {
                out.push(target);
                call.args.iter().for_each(|arg| arg.collect_slots(&mut out));
            }
        }
        out
    }
}

/// Categories of post-deployment authorizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
pub enum WhitelistCategoryKind {
    #[display("collect module")]
    CollectModule,
    #[display("follow module")]
    FollowModule,
    #[display("reference module")]
    ReferenceModule,
    #[display("currency")]
    Currency,
}

/// One authorization pass: every entry is whitelisted on `target` with `signature`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistCategory {
    pub kind: WhitelistCategoryKind,
    /// Label of the contract holding the whitelist.
    pub target: String,
    /// Signature of the whitelisting function, taking `(address, bool)`.
    pub signature: String,
    pub signer: Role,
    /// Labels of the contracts to whitelist, in deployment order.
    pub entries: Vec<String>,
}

/// Errors found while validating a plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("duplicate step label `{0}`")]
    DuplicateLabel(String),

    #[error("step `{step}` references unknown step `{target}`")]
    UnknownReference { step: String, target: String },

    #[error("step `{step}` references `{target}`, which is a call and has no address")]
    NotACreation { step: String, target: String },

    #[error("step `{step}` uses the predicted address of `{target}`, which is not sent after it")]
    PredictionNotAhead { step: String, target: String },

    #[error("step `{step}` uses the realized address of `{target}`, which is not deployed before it")]
    RealizedNotBehind { step: String, target: String },

    #[error("library `{library}` of step `{step}` must be linked against a realized address")]
    UnrealizedLibrary { step: String, library: String },

    #[error("dependency cycle between steps {0:?}")]
    Cycle(Vec<String>),

    #[error("{category} whitelist references unknown contract `{label}`")]
    UnknownWhitelistEntry {
        category: WhitelistCategoryKind,
        label: String,
    },
}

/// Direction of a dependency edge between two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    /// `from` must be sent before `to` exists: `from` embeds a predicted address of `to`.
    Predicted,
    /// `from` must be confirmed before `to` is built: `to` embeds the realized address.
    Realized,
}

/// A fixed, ordered set of deployment steps plus the whitelist applied afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub whitelist: Vec<WhitelistCategory>,
}

impl DeploymentPlan {
    pub fn new(steps: Vec<PlanStep>, whitelist: Vec<WhitelistCategory>) -> Self {
        Self { steps, whitelist }
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.label == label)
    }

    pub fn step(&self, label: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.label == label)
    }

    /// Creation steps, in plan order.
    pub fn creations(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|step| step.is_creation())
    }

    /// The 1-indexed transaction offset of every step in the deployer's nonce stream.
    ///
    /// Steps signed by another role do not consume a deployer nonce and get `None`.
    pub fn schedule(&self) -> Vec<Option<u64>> {
        let mut offset = 0;
        self.steps
            .iter()
            .map(|step| {
                step.is_deployer_signed().then(|| {
                    offset += 1;
                    offset
                })
            })
            .collect()
    }

    /// Deployer transaction offset of the labelled step.
    pub fn offset_of(&self, label: &str) -> Option<u64> {
        let position = self.position(label)?;
        self.schedule()[position]
    }

    /// Check that every reference can be satisfied in plan order.
    pub fn validate(&self) -> Result<(), PlanError> {
        let positions = self.label_positions()?;
        let edges = self.dependency_edges(&positions)?;

        self.topological_order(&edges)?;

        for (from, to, kind) in &edges {
            if from < to {
                continue;
            }
            // Edges always point forward in a valid plan. Name the offending step.
            let (step, target) = match kind {
                EdgeKind::Predicted => (&self.steps[*from].label, &self.steps[*to].label),
                EdgeKind::Realized => (&self.steps[*to].label, &self.steps[*from].label),
            };
            return Err(match kind {
                EdgeKind::Predicted => PlanError::PredictionNotAhead {
                    step: step.clone(),
                    target: target.clone(),
                },
                EdgeKind::Realized => PlanError::RealizedNotBehind {
                    step: step.clone(),
                    target: target.clone(),
                },
            });
        }

        for step in &self.steps {
            if let StepAction::Create { libraries, .. } = &step.action {
                if let Some(link) = libraries
                    .iter()
                    .find(|link| !matches!(link.address, Slot::Realized(_) | Slot::Fixed(_)))
                {
                    return Err(PlanError::UnrealizedLibrary {
                        step: step.label.clone(),
                        library: link.name.clone(),
                    });
                }
            }
        }

        for category in &self.whitelist {
            for label in std::iter::once(&category.target).chain(&category.entries) {
                let known = self.step(label).is_some_and(PlanStep::is_creation);
                if !known {
                    return Err(PlanError::UnknownWhitelistEntry {
                        category: category.kind,
                        label: label.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    fn label_positions(&self) -> Result<HashMap<&str, usize>, PlanError> {
        let mut positions = HashMap::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if positions.insert(step.label.as_str(), i).is_some() {
                return Err(PlanError::DuplicateLabel(step.label.clone()));
            }
        }
        Ok(positions)
    }

    /// Build the edges of the dependency graph, as `(before, after, kind)` step indices.
    fn dependency_edges(
        &self,
        positions: &HashMap<&str, usize>,
    ) -> Result<Vec<(usize, usize, EdgeKind)>, PlanError> {
        let mut edges = Vec::new();

        for (i, step) in self.steps.iter().enumerate() {
            for slot in step.slots() {
                let Some(target) = slot.target() else {
                    continue;
                };
                let Some(&j) = positions.get(target) else {
                    return Err(PlanError::UnknownReference {
                        step: step.label.clone(),
                        target: target.to_string(),
                    });
                };
                if !self.steps[j].is_creation() {
                    return Err(PlanError::NotACreation {
                        step: step.label.clone(),
                        target: target.to_string(),
                    });
                }
                match slot {
                    Slot::Predicted(_) => edges.push((i, j, EdgeKind::Predicted)),
                    Slot::Realized(_) => edges.push((j, i, EdgeKind::Realized)),
                    Slot::Role(_) | Slot::Fixed(_) => {}
                }
            }
        }

        Ok(edges)
    }

    /// Kahn's algorithm over the dependency graph, breaking ties by plan position.
    fn topological_order(
        &self,
        edges: &[(usize, usize, EdgeKind)],
    ) -> Result<Vec<usize>, PlanError> {
        let n = self.steps.len();
        let mut in_degree = vec![0usize; n];
        let mut successors = vec![Vec::new(); n];
        for (from, to, _) in edges {
            in_degree[*to] += 1;
            successors[*from].push(*to);
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|i| in_degree[*i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(next) = ready.pop_first() {
            order.push(next);
            for succ in &successors[next] {
                in_degree[*succ] -= 1;
                if in_degree[*succ] == 0 {
                    ready.insert(*succ);
                }
            }
        }

        if order.len() < n {
            let stuck = (0..n)
                .filter(|i| in_degree[*i] > 0)
                .map(|i| self.steps[i].label.clone())
                .collect();
            return Err(PlanError::Cycle(stuck));
        }

        Ok(order)
    }
}
