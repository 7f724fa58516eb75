//! Call layouts for every write action.
//!
//! A layout is the ordered list of operations an action sends, how each is
//! priced, how the extra fee is found and where the interesting method
//! return sits. Layouts are pure; the composer turns them into groups.

use super::fees::padding_credit;
use super::group::{AppTarget, MethodArg, OpKind, OpRole, PlannedOp};
use crate::types::{
    Address, AppId, AssetId, GatingType, MbrAmounts, MicroAlgos, ValidatorConfig, ValidatorId,
    GATING_ASSET_SLOTS,
};

/// Extra MBR sent with pool storage when the pool also opts in to the reward token.
pub const REWARD_TOKEN_OPT_IN_MBR: MicroAlgos = 100_000;
/// Box storage paid to the name-service app when linking a pool.
pub const NFD_LINK_BOX_MBR: MicroAlgos = 20_500;
/// Fixed extra fee on the validator registration payment.
pub const ADD_VALIDATOR_EXTRA_FEE: MicroAlgos = 10_000_000;
/// Fixed extra fee on calls that create an inner transaction.
pub const INNER_CALL_EXTRA_FEE: MicroAlgos = 1_000;

const NFD_LINK_FIELD: &str = "u.cav.algo.a";

/// How the extra fee of the designated call is obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeePlan {
    /// Dry-run the group and credit back what the padding calls already pay.
    Simulated { padding_credit: MicroAlgos },
    /// Cost is known up front; no dry run.
    Fixed(MicroAlgos),
}

/// What the composer needs to build and check one action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionLayout {
    pub label: &'static str,
    pub ops: Vec<PlannedOp>,
    pub fee_plan: FeePlan,
    /// Method-call index holding the action's result.
    pub result_index: Option<usize>,
    /// Reward token the sender must be opted in to before the group runs.
    pub opt_in_asset: Option<AssetId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    AddStake {
        validator_id: ValidatorId,
        amount: MicroAlgos,
        value_to_verify: u64,
        reward_token_id: AssetId,
    },
    RemoveStake {
        pool_app_id: AppId,
        amount: MicroAlgos,
        reward_token_id: AssetId,
    },
    /// Claims from every listed pool in one group.
    ClaimTokens { pool_app_ids: Vec<AppId> },
    EpochBalanceUpdate { pool_app_id: AppId },
    InitPoolStorage {
        pool: AppTarget,
        opt_in_reward_token: bool,
    },
    AddPool {
        validator_id: ValidatorId,
        node_num: u64,
    },
    LinkPoolToNfd {
        pool: AppTarget,
        nfd: AppTarget,
        nfd_name: String,
    },
    AddValidator {
        config: Box<ValidatorConfig>,
        nfd_name: String,
    },
    ChangeManager {
        validator_id: ValidatorId,
        manager: Address,
    },
    ChangeSunsetInfo {
        validator_id: ValidatorId,
        sunsetting_on: u64,
        sunsetting_to: ValidatorId,
    },
    ChangeNfd {
        validator_id: ValidatorId,
        nfd_app_id: AppId,
        nfd_name: String,
    },
    ChangeCommissionAddress {
        validator_id: ValidatorId,
        address: Address,
    },
    ChangeRewardInfo {
        validator_id: ValidatorId,
        gating_type: GatingType,
        gating_address: Address,
        gating_assets: [AssetId; GATING_ASSET_SLOTS],
        gating_asset_min_balance: u64,
        reward_per_payout: u64,
    },
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::AddStake { .. } => "Add stake",
            Action::RemoveStake { .. } => "Remove stake",
            Action::ClaimTokens { .. } => "Claim tokens",
            Action::EpochBalanceUpdate { .. } => "Epoch balance update",
            Action::InitPoolStorage { .. } => "Pool storage requirement payment",
            Action::AddPool { .. } => "Add staking pool",
            Action::LinkPoolToNfd { .. } => "Link pool to NFD",
            Action::AddValidator { .. } => "Add validator",
            Action::ChangeManager { .. } => "Change validator manager",
            Action::ChangeSunsetInfo { .. } => "Change validator sunset info",
            Action::ChangeNfd { .. } => "Change validator NFD",
            Action::ChangeCommissionAddress { .. } => "Change validator commission address",
            Action::ChangeRewardInfo { .. } => "Change validator reward info",
        }
    }

    /// Whether the layout pays a registry minimum balance.
    pub fn requires_mbr(&self) -> bool {
        matches!(
            self,
            Action::InitPoolStorage { .. } | Action::AddPool { .. } | Action::AddValidator { .. }
        )
    }

    /// Lays the action out against the registry application. `mbr` supplies
    /// the payment amounts for actions that fund registry storage.
    pub fn layout(&self, registry: &AppTarget, mbr: &MbrAmounts) -> ActionLayout {
        let label = self.label();
        let registry_id = registry.app_id;
        match self {
            Action::AddStake {
                validator_id,
                amount,
                value_to_verify,
                reward_token_id,
            } => ActionLayout {
                label,
                ops: vec![
                    PlannedOp::padding(registry_id, "1"),
                    PlannedOp::padding(registry_id, "2"),
                    payment(&registry.address, *amount),
                    PlannedOp::new(
                        OpRole::FeeCarrier,
                        OpKind::call(
                            registry_id,
                            "addStake",
                            vec![MethodArg::U64(*validator_id), MethodArg::U64(*value_to_verify)],
                        ),
                    ),
                ],
                // Only one of the two padding calls is credited back.
                fee_plan: FeePlan::Simulated {
                    padding_credit: padding_credit(1),
                },
                result_index: Some(2),
                opt_in_asset: non_zero(*reward_token_id),
            },
            Action::RemoveStake {
                pool_app_id,
                amount,
                reward_token_id,
            } => ActionLayout {
                label,
                ops: vec![
                    PlannedOp::padding(*pool_app_id, "1"),
                    PlannedOp::padding(*pool_app_id, "2"),
                    PlannedOp::new(
                        OpRole::FeeCarrier,
                        OpKind::call(*pool_app_id, "removeStake", vec![MethodArg::U64(*amount)]),
                    ),
                ],
                fee_plan: FeePlan::Simulated {
                    padding_credit: padding_credit(2),
                },
                result_index: None,
                opt_in_asset: non_zero(*reward_token_id),
            },
            Action::ClaimTokens { pool_app_ids } => {
                let mut ops = Vec::with_capacity(pool_app_ids.len() * 3);
                for (index, pool_app_id) in pool_app_ids.iter().enumerate() {
                    let role = if index == 0 {
                        OpRole::FeeCarrier
                    } else {
                        OpRole::Call
                    };
                    ops.push(PlannedOp::padding(*pool_app_id, "1"));
                    ops.push(PlannedOp::padding(*pool_app_id, "2"));
                    ops.push(PlannedOp::new(
                        role,
                        OpKind::call(*pool_app_id, "claimTokens", Vec::new()),
                    ));
                }
                ActionLayout {
                    label,
                    ops,
                    fee_plan: FeePlan::Simulated {
                        padding_credit: padding_credit(2 * pool_app_ids.len() as u64),
                    },
                    result_index: None,
                    opt_in_asset: None,
                }
            }
            Action::EpochBalanceUpdate { pool_app_id } => ActionLayout {
                label,
                ops: vec![
                    PlannedOp::padding(*pool_app_id, "1"),
                    PlannedOp::padding(*pool_app_id, "2"),
                    PlannedOp::new(
                        OpRole::FeeCarrier,
                        OpKind::call(*pool_app_id, "epochBalanceUpdate", Vec::new()),
                    ),
                ],
                fee_plan: FeePlan::Simulated {
                    padding_credit: padding_credit(2),
                },
                result_index: None,
                opt_in_asset: None,
            },
            Action::InitPoolStorage {
                pool,
                opt_in_reward_token,
            } => {
                let storage_mbr = if *opt_in_reward_token {
                    mbr.pool_init_mbr.saturating_add(REWARD_TOKEN_OPT_IN_MBR)
                } else {
                    mbr.pool_init_mbr
                };
                ActionLayout {
                    label,
                    ops: vec![
                        PlannedOp::padding(pool.app_id, "1"),
                        PlannedOp::padding(pool.app_id, "2"),
                        payment(&pool.address, storage_mbr),
                        PlannedOp::new(
                            OpRole::FeeCarrier,
                            OpKind::call(pool.app_id, "initStorage", Vec::new()),
                        ),
                    ],
                    fee_plan: FeePlan::Simulated {
                        padding_credit: padding_credit(2),
                    },
                    result_index: None,
                    opt_in_asset: None,
                }
            }
            Action::AddPool {
                validator_id,
                node_num,
            } => ActionLayout {
                label,
                ops: vec![
                    PlannedOp::padding(registry_id, "1"),
                    PlannedOp::padding(registry_id, "2"),
                    payment(&registry.address, mbr.add_pool_mbr),
                    PlannedOp::new(
                        OpRole::FeeCarrier,
                        OpKind::call(
                            registry_id,
                            "addPool",
                            vec![MethodArg::U64(*validator_id), MethodArg::U64(*node_num)],
                        ),
                    ),
                ],
                fee_plan: FeePlan::Fixed(INNER_CALL_EXTRA_FEE),
                result_index: Some(2),
                opt_in_asset: None,
            },
            Action::LinkPoolToNfd {
                pool,
                nfd,
                nfd_name,
            } => ActionLayout {
                label,
                ops: vec![
                    payment(&nfd.address, NFD_LINK_BOX_MBR),
                    PlannedOp::new(
                        OpRole::Standard,
                        OpKind::NoOpCall {
                            app_id: nfd.app_id,
                            args: vec![
                                MethodArg::Str("update_field".into()),
                                MethodArg::Str(NFD_LINK_FIELD.into()),
                                MethodArg::Address(pool.address.clone()),
                            ],
                        },
                    ),
                    PlannedOp::new(
                        OpRole::FeeCarrier,
                        OpKind::call(
                            pool.app_id,
                            "linkToNfd",
                            vec![MethodArg::U64(nfd.app_id), MethodArg::Str(nfd_name.clone())],
                        ),
                    ),
                ],
                fee_plan: FeePlan::Simulated { padding_credit: 0 },
                result_index: None,
                opt_in_asset: None,
            },
            Action::AddValidator { config, nfd_name } => ActionLayout {
                label,
                ops: vec![
                    PlannedOp::new(
                        OpRole::FeeCarrier,
                        OpKind::Payment {
                            receiver: registry.address.clone(),
                            amount: mbr.add_validator_mbr,
                        },
                    ),
                    PlannedOp::new(
                        OpRole::Standard,
                        OpKind::call(
                            registry_id,
                            "addValidator",
                            vec![MethodArg::Str(nfd_name.clone()), MethodArg::Config(config.clone())],
                        ),
                    ),
                ],
                fee_plan: FeePlan::Fixed(ADD_VALIDATOR_EXTRA_FEE),
                result_index: Some(0),
                opt_in_asset: None,
            },
            Action::ChangeManager {
                validator_id,
                manager,
            } => admin_call(
                label,
                registry_id,
                "changeValidatorManager",
                vec![MethodArg::U64(*validator_id), MethodArg::Address(manager.clone())],
                0,
            ),
            Action::ChangeSunsetInfo {
                validator_id,
                sunsetting_on,
                sunsetting_to,
            } => admin_call(
                label,
                registry_id,
                "changeValidatorSunsetInfo",
                vec![
                    MethodArg::U64(*validator_id),
                    MethodArg::U64(*sunsetting_on),
                    MethodArg::U64(*sunsetting_to),
                ],
                0,
            ),
            Action::ChangeNfd {
                validator_id,
                nfd_app_id,
                nfd_name,
            } => admin_call(
                label,
                registry_id,
                "changeValidatorNfd",
                vec![
                    MethodArg::U64(*validator_id),
                    MethodArg::U64(*nfd_app_id),
                    MethodArg::Str(nfd_name.clone()),
                ],
                INNER_CALL_EXTRA_FEE,
            ),
            Action::ChangeCommissionAddress {
                validator_id,
                address,
            } => admin_call(
                label,
                registry_id,
                "changeValidatorCommissionAddress",
                vec![MethodArg::U64(*validator_id), MethodArg::Address(address.clone())],
                0,
            ),
            Action::ChangeRewardInfo {
                validator_id,
                gating_type,
                gating_address,
                gating_assets,
                gating_asset_min_balance,
                reward_per_payout,
            } => admin_call(
                label,
                registry_id,
                "changeValidatorRewardInfo",
                vec![
                    MethodArg::U64(*validator_id),
                    MethodArg::U64(u64::from(gating_type.as_u8())),
                    MethodArg::Address(gating_address.clone()),
                    MethodArg::U64Array(gating_assets.to_vec()),
                    MethodArg::U64(*gating_asset_min_balance),
                    MethodArg::U64(*reward_per_payout),
                ],
                0,
            ),
        }
    }
}

fn payment(receiver: &Address, amount: MicroAlgos) -> PlannedOp {
    PlannedOp::new(
        OpRole::Standard,
        OpKind::Payment {
            receiver: receiver.clone(),
            amount,
        },
    )
}

fn admin_call(
    label: &'static str,
    registry_id: AppId,
    method: &'static str,
    args: Vec<MethodArg>,
    extra_fee: MicroAlgos,
) -> ActionLayout {
    ActionLayout {
        label,
        ops: vec![PlannedOp::new(
            OpRole::FeeCarrier,
            OpKind::call(registry_id, method, args),
        )],
        fee_plan: FeePlan::Fixed(extra_fee),
        result_index: None,
        opt_in_asset: None,
    }
}

fn non_zero(asset_id: AssetId) -> Option<AssetId> {
    (asset_id > 0).then_some(asset_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AppTarget {
        AppTarget::new(1, "REGISTRY")
    }

    fn mbr() -> MbrAmounts {
        MbrAmounts {
            add_validator_mbr: 10_000_000,
            add_pool_mbr: 1_100_000,
            pool_init_mbr: 341_000,
            add_staker_mbr: 34_100,
        }
    }

    fn methods(layout: &ActionLayout) -> Vec<&'static str> {
        layout
            .ops
            .iter()
            .filter_map(|op| match &op.kind {
                OpKind::MethodCall { method, .. } => Some(*method),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn add_stake_returns_pool_key_from_third_method_call() {
        let layout = Action::AddStake {
            validator_id: 4,
            amount: 10_000_000,
            value_to_verify: 0,
            reward_token_id: 77,
        }
        .layout(&registry(), &mbr());
        assert_eq!(methods(&layout), vec!["gas", "gas", "addStake"]);
        assert_eq!(layout.result_index, Some(2));
        assert_eq!(layout.opt_in_asset, Some(77));
        assert_eq!(
            layout.fee_plan,
            FeePlan::Simulated {
                padding_credit: 1_000
            }
        );
        assert_eq!(layout.ops[2].kind.payment_amount(), 10_000_000);
    }

    #[test]
    fn claim_tokens_pads_every_pool_and_carries_fee_once() {
        let layout = Action::ClaimTokens {
            pool_app_ids: vec![100, 101],
        }
        .layout(&registry(), &mbr());
        assert_eq!(layout.ops.len(), 6);
        let carriers = layout
            .ops
            .iter()
            .filter(|op| op.role == OpRole::FeeCarrier)
            .count();
        assert_eq!(carriers, 1);
        assert_eq!(
            layout.fee_plan,
            FeePlan::Simulated {
                padding_credit: 4_000
            }
        );
    }

    #[test]
    fn pool_storage_adds_reward_token_mbr_when_opting_in() {
        let pool = AppTarget::new(200, "POOL200");
        let with_token = Action::InitPoolStorage {
            pool: pool.clone(),
            opt_in_reward_token: true,
        }
        .layout(&registry(), &mbr());
        let without = Action::InitPoolStorage {
            pool,
            opt_in_reward_token: false,
        }
        .layout(&registry(), &mbr());
        assert_eq!(with_token.ops[2].kind.payment_amount(), 441_000);
        assert_eq!(without.ops[2].kind.payment_amount(), 341_000);
    }

    #[test]
    fn registry_payments_come_from_mbr_amounts() {
        let pool = Action::AddPool {
            validator_id: 3,
            node_num: 1,
        };
        assert!(pool.requires_mbr());
        assert_eq!(
            pool.layout(&registry(), &mbr()).ops[2].kind.payment_amount(),
            1_100_000
        );

        let validator = Action::AddValidator {
            config: Box::default(),
            nfd_name: String::new(),
        };
        let layout = validator.layout(&registry(), &mbr());
        assert_eq!(layout.ops[0].kind.payment_amount(), 10_000_000);
        assert_eq!(layout.result_index, Some(0));

        assert!(!Action::EpochBalanceUpdate { pool_app_id: 100 }.requires_mbr());
    }

    #[test]
    fn nfd_link_pays_box_storage_and_updates_the_name_record() {
        let layout = Action::LinkPoolToNfd {
            pool: AppTarget::new(200, "POOL200"),
            nfd: AppTarget::new(900, "NFDAPP"),
            nfd_name: "pool.validator.algo".into(),
        }
        .layout(&registry(), &mbr());
        assert_eq!(layout.ops[0].kind.payment_amount(), NFD_LINK_BOX_MBR);
        assert!(matches!(
            &layout.ops[1].kind,
            OpKind::NoOpCall { app_id: 900, args } if args[2] == MethodArg::Address(Address::new("POOL200"))
        ));
        assert_eq!(layout.fee_plan, FeePlan::Simulated { padding_credit: 0 });
    }

    #[test]
    fn admin_changes_use_fixed_fees() {
        let manager = Action::ChangeManager {
            validator_id: 3,
            manager: Address::new("NEWMGR"),
        }
        .layout(&registry(), &mbr());
        assert_eq!(manager.fee_plan, FeePlan::Fixed(0));
        assert_eq!(methods(&manager), vec!["changeValidatorManager"]);

        let nfd = Action::ChangeNfd {
            validator_id: 3,
            nfd_app_id: 5,
            nfd_name: "v.algo".into(),
        }
        .layout(&registry(), &mbr());
        assert_eq!(nfd.fee_plan, FeePlan::Fixed(INNER_CALL_EXTRA_FEE));
    }
}
