//! The standard hub protocol plan.
//!
//! The hub implementation is built with the addresses of its follow and collect NFT
//! implementations, and those NFTs are built with the address of the hub proxy. None of
//! the three exist at that point, so their addresses are predicted from the deployer's
//! nonce stream. Everything after the proxy only needs realized addresses.

use alloy_core::primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};

use super::{
    Arg, CallSpec, DeploymentPlan, PlanStep, Role, Slot, WhitelistCategory,
    WhitelistCategoryKind,
};

/// Manifest labels of the hub deployment.
pub mod labels {
    pub const MODULE_GLOBALS: &str = "module globals";
    pub const PUBLISHING_LOGIC: &str = "publishing logic lib";
    pub const INTERACTION_LOGIC: &str = "interaction logic lib";
    pub const HUB_IMPL: &str = "hub impl";
    pub const FOLLOW_NFT_IMPL: &str = "follow NFT impl";
    pub const COLLECT_NFT_IMPL: &str = "collect NFT impl";
    pub const HUB_PROXY: &str = "hub proxy";
    pub const CURRENCY: &str = "currency";
    pub const FEE_COLLECT: &str = "fee collect module";
    pub const LIMITED_FEE_COLLECT: &str = "limited fee collect module";
    pub const TIMED_FEE_COLLECT: &str = "timed fee collect module";
    pub const LIMITED_TIMED_FEE_COLLECT: &str = "limited timed fee collect module";
    pub const REVERT_COLLECT: &str = "revert collect module";
    pub const EMPTY_COLLECT: &str = "empty collect module";
    pub const FEE_FOLLOW: &str = "fee follow module";
    pub const APPROVAL_FOLLOW: &str = "approval follow module";
    pub const FOLLOWER_ONLY_REFERENCE: &str = "follower only reference module";
    /// Label of the post-deployment initialization call. Not a manifest entry.
    pub const HUB_INITIALIZE: &str = "hub initialize";
}

/// Signature of the hub initializer.
const INITIALIZE_SIGNATURE: &str = "initialize(string,string,address)";

/// Default treasury fee, in basis points.
pub const DEFAULT_TREASURY_FEE_BPS: u16 = 50;
/// Default name of the hub's profile NFT collection.
pub const DEFAULT_NFT_NAME: &str = "Various Vegetables";
/// Default symbol of the hub's profile NFT collection.
pub const DEFAULT_NFT_SYMBOL: &str = "VVGT";

/// How the hub proxy gets initialized.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InitMode {
    /// The initializer call data is passed to the proxy constructor.
    #[default]
    ProxyConstructor,
    /// The proxy is created uninitialized and a deployer-signed `initialize` call follows
    /// the last creation.
    SeparateCall,
}

/// Parameters baked into the hub plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubPlanParams {
    pub treasury_fee_bps: u16,
    pub nft_name: String,
    pub nft_symbol: String,
    pub init_mode: InitMode,
}

impl Default for HubPlanParams {
    fn default() -> Self {
        Self {
            treasury_fee_bps: DEFAULT_TREASURY_FEE_BPS,
            nft_name: DEFAULT_NFT_NAME.to_string(),
            nft_symbol: DEFAULT_NFT_SYMBOL.to_string(),
            init_mode: InitMode::default(),
        }
    }
}

impl HubPlanParams {
    fn initialize_call(&self) -> CallSpec {
        CallSpec::new(
            INITIALIZE_SIGNATURE,
            vec![
                Arg::String(self.nft_name.clone()),
                Arg::String(self.nft_symbol.clone()),
                Arg::role(Role::Governance),
            ],
        )
    }
}

impl DeploymentPlan {
    /// Build the full hub protocol plan.
    pub fn hub(params: &HubPlanParams) -> Self {
        use labels::*;

        let hub = || Arg::realized(HUB_PROXY);
        let globals = || Arg::realized(MODULE_GLOBALS);

        let proxy_payload = match params.init_mode {
            InitMode::ProxyConstructor => Arg::Call(params.initialize_call()),
            InitMode::SeparateCall => Arg::Bytes(Bytes::new()),
        };

        let mut steps = vec![
            PlanStep::create(
                MODULE_GLOBALS,
                "ModuleGlobals",
                vec![
                    Arg::role(Role::Governance),
                    Arg::role(Role::Treasury),
                    Arg::Uint(U256::from(params.treasury_fee_bps)),
                ],
            ),
            PlanStep::create(PUBLISHING_LOGIC, "PublishingLogic", vec![]),
            PlanStep::create(INTERACTION_LOGIC, "InteractionLogic", vec![]),
            PlanStep::create(
                HUB_IMPL,
                "LensHub",
                vec![
                    Arg::predicted(FOLLOW_NFT_IMPL),
                    Arg::predicted(COLLECT_NFT_IMPL),
                ],
            )
            .with_library("PublishingLogic", Slot::realized(PUBLISHING_LOGIC))
            .with_library("InteractionLogic", Slot::realized(INTERACTION_LOGIC)),
            PlanStep::create(FOLLOW_NFT_IMPL, "FollowNFT", vec![Arg::predicted(HUB_PROXY)]),
            PlanStep::create(
                COLLECT_NFT_IMPL,
                "CollectNFT",
                vec![Arg::predicted(HUB_PROXY)],
            ),
            PlanStep::create(
                HUB_PROXY,
                "TransparentUpgradeableProxy",
                vec![
                    Arg::realized(HUB_IMPL),
                    Arg::role(Role::ProxyAdmin),
                    proxy_payload,
                ],
            ),
            PlanStep::create(CURRENCY, "Currency", vec![]),
            PlanStep::create(FEE_COLLECT, "FeeCollectModule", vec![hub(), globals()]),
            PlanStep::create(
                LIMITED_FEE_COLLECT,
                "LimitedFeeCollectModule",
                vec![hub(), globals()],
            ),
            PlanStep::create(
                TIMED_FEE_COLLECT,
                "TimedFeeCollectModule",
                vec![hub(), globals()],
            ),
            PlanStep::create(
                LIMITED_TIMED_FEE_COLLECT,
                "LimitedTimedFeeCollectModule",
                vec![hub(), globals()],
            ),
            PlanStep::create(REVERT_COLLECT, "RevertCollectModule", vec![]),
            PlanStep::create(EMPTY_COLLECT, "EmptyCollectModule", vec![hub()]),
            PlanStep::create(FEE_FOLLOW, "FeeFollowModule", vec![hub(), globals()]),
            PlanStep::create(APPROVAL_FOLLOW, "ApprovalFollowModule", vec![hub()]),
            PlanStep::create(
                FOLLOWER_ONLY_REFERENCE,
                "FollowerOnlyReferenceModule",
                vec![hub()],
            ),
        ];

        if params.init_mode == InitMode::SeparateCall {
            steps.push(PlanStep::call(
                HUB_INITIALIZE,
                Slot::realized(HUB_PROXY),
                Role::Deployer,
                params.initialize_call(),
            ));
        }

        let whitelist = vec![
            category(
                WhitelistCategoryKind::CollectModule,
                HUB_PROXY,
                "whitelistCollectModule(address,bool)",
                &[
                    FEE_COLLECT,
                    LIMITED_FEE_COLLECT,
                    TIMED_FEE_COLLECT,
                    LIMITED_TIMED_FEE_COLLECT,
                    REVERT_COLLECT,
                    EMPTY_COLLECT,
                ],
            ),
            category(
                WhitelistCategoryKind::FollowModule,
                HUB_PROXY,
                "whitelistFollowModule(address,bool)",
                &[FEE_FOLLOW, APPROVAL_FOLLOW],
            ),
            category(
                WhitelistCategoryKind::ReferenceModule,
                HUB_PROXY,
                "whitelistReferenceModule(address,bool)",
                &[FOLLOWER_ONLY_REFERENCE],
            ),
            category(
                WhitelistCategoryKind::Currency,
                MODULE_GLOBALS,
                "whitelistCurrency(address,bool)",
                &[CURRENCY],
            ),
        ];

        Self::new(steps, whitelist)
    }
}

/// Governance-signed `(address, bool)` whitelist over the labelled entries.
fn category(
    kind: WhitelistCategoryKind,
    target: &str,
    signature: &str,
    entries: &[&str],
) -> WhitelistCategory {
    WhitelistCategory {
        kind,
        target: target.to_string(),
        signature: signature.to_string(),
        signer: Role::Governance,
        entries: entries.iter().map(|label| label.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::labels::*;
    use super::*;
    use crate::plan::StepAction;

    #[test]
    fn test_hub_plan_is_valid_in_both_modes() {
        for init_mode in [InitMode::ProxyConstructor, InitMode::SeparateCall] {
            let plan = DeploymentPlan::hub(&HubPlanParams {
                init_mode,
                ..Default::default()
            });
            assert_eq!(plan.validate(), Ok(()), "invalid plan in {init_mode} mode");
        }
    }

    #[test]
    fn test_hub_plan_offsets() {
        let plan = DeploymentPlan::hub(&HubPlanParams::default());

        assert_eq!(plan.offset_of(MODULE_GLOBALS), Some(1));
        assert_eq!(plan.offset_of(HUB_IMPL), Some(4));
        assert_eq!(plan.offset_of(FOLLOW_NFT_IMPL), Some(5));
        assert_eq!(plan.offset_of(COLLECT_NFT_IMPL), Some(6));
        assert_eq!(plan.offset_of(HUB_PROXY), Some(7));
        assert_eq!(plan.creations().count(), 17);
        assert!(plan.step(HUB_INITIALIZE).is_none());
    }

    #[test]
    fn test_separate_call_consumes_a_nonce_after_the_last_creation() {
        let plan = DeploymentPlan::hub(&HubPlanParams {
            init_mode: InitMode::SeparateCall,
            ..Default::default()
        });

        let last = plan.steps.last().expect("plan is not empty");
        assert_eq!(last.label, HUB_INITIALIZE);
        assert!(!last.is_creation());
        assert_eq!(plan.offset_of(HUB_INITIALIZE), Some(18));

        let StepAction::Create { args, .. } = &plan.step(HUB_PROXY).expect("proxy").action else {
            panic!("hub proxy must be a creation");
        };
        assert_eq!(args[2], Arg::Bytes(Bytes::new()));
    }

    #[test]
    fn test_whitelist_categories_in_order() {
        let plan = DeploymentPlan::hub(&HubPlanParams::default());
        let kinds: Vec<_> = plan.whitelist.iter().map(|c| c.kind).collect();

        assert_eq!(
            kinds,
            vec![
                WhitelistCategoryKind::CollectModule,
                WhitelistCategoryKind::FollowModule,
                WhitelistCategoryKind::ReferenceModule,
                WhitelistCategoryKind::Currency,
            ]
        );
        assert_eq!(plan.whitelist[0].entries.len(), 6);
        assert_eq!(plan.whitelist[3].target, MODULE_GLOBALS);
    }

    #[test]
    fn test_init_mode_parses_kebab_case() {
        assert_eq!(
            "separate-call".parse::<InitMode>().expect("known mode"),
            InitMode::SeparateCall
        );
        assert_eq!(InitMode::ProxyConstructor.to_string(), "proxy-constructor");
    }
}
