use super::asset::{Asset, AssetUnit, Price};
use super::balance::BalanceSheet;
use super::claim::{Claim, ResolvedInput, SignedTransaction, TransactionInput, TransactionOutput};
use super::error::ValidationError;
use super::matcher::OutputMatcher;
use crate::{Address, BlockHash};

/// Read-only, point-in-time view of chain state that [`ValidationContext`]
/// resolves transaction inputs against. Implementations talk to whatever
/// storage backs the node (see `dxid-storage`); none of that I/O is
/// part of the validation core's own error taxonomy, so these methods
/// return `anyhow::Result` rather than [`ValidationError`].
pub trait ChainView: Send + Sync {
    fn fetch_inputs(&self, inputs: &[TransactionInput]) -> anyhow::Result<Vec<ResolvedInput>>;
    fn head_block_num(&self) -> anyhow::Result<u32>;
}

/// Sentinel passed as `ref_head` to [`ValidationContext::new`] meaning
/// "resolve against the chain's current tip rather than a fixed height".
pub const REF_HEAD_CHAIN_TIP: u32 = u32::MAX;

/// Distinguishes the two DEX order-book claim kinds sharing the same
/// owner-cancel / counterparty-fill matching logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderSide {
    Bid,
    Long,
}

/// Orchestrates validation of a single [`SignedTransaction`] against a
/// [`ChainView`]. Construction resolves inputs eagerly; [`Self::validate`]
/// runs the claim-by-claim rule set and is safe to call more than once
/// (it recomputes its balance sheet and coin-days-destroyed totals from
/// scratch every time rather than accumulating across calls).
pub struct ValidationContext<'a> {
    trx: SignedTransaction,
    resolved: Vec<ResolvedInput>,
    _chain_view: &'a dyn ChainView,
    enforce_unspent: bool,
    ref_head: u32,
    stake_window: (BlockHash, BlockHash),
    allow_short_long_matching: bool,
    total_cdd: u128,
    uncounted_cdd: u128,
}

impl<'a> ValidationContext<'a> {
    /// Resolves `trx`'s inputs against `chain_view` and fixes `ref_head`
    /// (resolving [`REF_HEAD_CHAIN_TIP`] to the view's current head). Does
    /// not itself validate anything; call [`Self::validate`] for that.
    pub fn new(
        trx: SignedTransaction,
        chain_view: &'a dyn ChainView,
        enforce_unspent: bool,
        ref_head: u32,
    ) -> anyhow::Result<Self> {
        let resolved = chain_view.fetch_inputs(&trx.inputs)?;
        let ref_head = if ref_head == REF_HEAD_CHAIN_TIP {
            chain_view.head_block_num()?
        } else {
            ref_head
        };
        Ok(ValidationContext {
            trx,
            resolved,
            _chain_view: chain_view,
            enforce_unspent,
            ref_head,
            stake_window: ([0u8; 32], [0u8; 32]),
            allow_short_long_matching: false,
            total_cdd: 0,
            uncounted_cdd: 0,
        })
    }

    pub fn set_stake_window(&mut self, window: (BlockHash, BlockHash)) {
        self.stake_window = window;
    }

    pub fn set_allow_short_long_matching(&mut self, allow: bool) {
        self.allow_short_long_matching = allow;
    }

    pub fn total_cdd(&self) -> u128 {
        self.total_cdd
    }

    pub fn uncounted_cdd(&self) -> u128 {
        self.uncounted_cdd
    }

    /// Runs the full validation pipeline: arity check, unspent check,
    /// input pass (index order), output pass (index order), conservation
    /// check, then the deferred signature-closure check. Fails fatally on
    /// the first violation encountered; [`Self::total_cdd`] and
    /// [`Self::uncounted_cdd`] are only updated on success.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        let declared = self.trx.inputs.len();
        let resolved_len = self.resolved.len();
        if declared != resolved_len {
            return Err(ValidationError::InputArity {
                declared,
                resolved: resolved_len,
            });
        }

        if self.enforce_unspent {
            for (index, r) in self.resolved.iter().enumerate() {
                if r.spent {
                    return Err(ValidationError::InputAlreadySpent { index });
                }
            }
        }

        let mut balance = BalanceSheet::new();
        let mut total_cdd: u128 = 0;
        let mut uncounted_cdd: u128 = 0;
        let mut missing_signatures: Vec<Address> = Vec::new();
        let mut matcher = OutputMatcher::new(&self.trx.outputs);

        let resolved = self.resolved.clone();
        for (index, r) in resolved.iter().enumerate() {
            self.validate_input(
                index,
                r,
                &mut matcher,
                &mut balance,
                &mut total_cdd,
                &mut uncounted_cdd,
                &mut missing_signatures,
            )?;
        }

        for out in self.trx.outputs.iter() {
            self.validate_output(out, &mut balance)?;
        }

        balance.check_conservation()?;

        if !missing_signatures.is_empty() {
            return Err(ValidationError::MissingSignatures(missing_signatures));
        }

        self.total_cdd = total_cdd;
        self.uncounted_cdd = uncounted_cdd;
        Ok(())
    }

    /// Weights coin-days-destroyed for a BTS-denominated input; a no-op
    /// for every other asset unit.
    fn apply_cdd(
        &self,
        resolved: &ResolvedInput,
        asset: &Asset,
        total_cdd: &mut u128,
        uncounted_cdd: &mut u128,
    ) -> Result<(), ValidationError> {
        if !asset.unit.is_native() {
            return Ok(());
        }
        let age = self.ref_head.saturating_sub(resolved.source_block_num) as u128;
        let weight = (asset.rounded_amount().unsigned_abs() as u128)
            .checked_mul(age)
            .ok_or(ValidationError::Overflow)?;
        if self.trx.stake == self.stake_window.0 || self.trx.stake == self.stake_window.1 {
            *total_cdd = total_cdd.checked_add(weight).ok_or(ValidationError::Overflow)?;
        } else {
            *uncounted_cdd = uncounted_cdd.checked_add(weight).ok_or(ValidationError::Overflow)?;
        }
        Ok(())
    }

    fn validate_input(
        &self,
        index: usize,
        resolved: &ResolvedInput,
        matcher: &mut OutputMatcher,
        balance: &mut BalanceSheet,
        total_cdd: &mut u128,
        uncounted_cdd: &mut u128,
        missing_signatures: &mut Vec<Address>,
    ) -> Result<(), ValidationError> {
        let asset = resolved.prior_output.amount;
        match &resolved.prior_output.claim {
            Claim::Signature { owner } => {
                if self.trx.signed_addresses.contains(owner) {
                    balance.credit_in(&asset);
                    self.apply_cdd(resolved, &asset, total_cdd, uncounted_cdd)?;
                } else {
                    missing_signatures.push(*owner);
                }
                Ok(())
            }
            Claim::Pts { owner } => {
                if self.trx.signed_pts_addresses.contains(owner) {
                    balance.credit_in(&asset);
                    self.apply_cdd(resolved, &asset, total_cdd, uncounted_cdd)?;
                    Ok(())
                } else {
                    Err(ValidationError::MissingSignatures(vec![]))
                }
            }
            Claim::Bid { owner, ask_price } => self.validate_order_input(
                index,
                *owner,
                *ask_price,
                &asset,
                OrderSide::Bid,
                matcher,
                balance,
            ),
            Claim::Long { owner, ask_price } => self.validate_order_input(
                index,
                *owner,
                *ask_price,
                &asset,
                OrderSide::Long,
                matcher,
                balance,
            ),
            Claim::Cover { payoff, .. } => {
                balance.credit_in(&asset);
                balance.credit_neg_in(payoff);
                balance.credit_collat_in(payoff.unit, &asset);
                self.apply_cdd(resolved, &asset, total_cdd, uncounted_cdd)?;
                Ok(())
            }
            // OptExecute/MultiSig/Escrow/Password validation is unfinished
            // upstream (see trx_validation_state.cpp); these claims are
            // accepted as no-ops rather than guessed at.
            Claim::OptExecute { .. }
            | Claim::MultiSig { .. }
            | Claim::Escrow { .. }
            | Claim::Password { .. } => Ok(()),
            Claim::Unknown(f) => Err(ValidationError::UnsupportedClaim(*f)),
        }
    }

    /// Shared owner-cancel / counterparty-fill logic for `Bid` and `Long`
    /// inputs. A `Bid` fill is paid off by a `Signature` output; a `Long`
    /// fill is paid off by a `Cover` output carrying at least 2x collateral
    /// (only when short/long matching is enabled) — both support partial
    /// fills via a same-kind change output owned by the original party.
    fn validate_order_input(
        &self,
        index: usize,
        owner: Address,
        ask_price: Price,
        prior: &Asset,
        side: OrderSide,
        matcher: &mut OutputMatcher,
        balance: &mut BalanceSheet,
    ) -> Result<(), ValidationError> {
        balance.credit_in(prior);

        if self.trx.signed_addresses.contains(&owner) {
            // Owner cancels their own order. The source credits the locked
            // asset a second time here (see module docs / DESIGN.md); this
            // preserves that observed behavior rather than "fixing" it.
            balance.credit_in(prior);
            return Ok(());
        }

        if matches!(side, OrderSide::Long) && !self.allow_short_long_matching {
            return Err(ValidationError::MissingCounterparty { input_index: index });
        }

        // A same-kind resting-order output owned by the same party, at the
        // same price, is the change output of a partial fill.
        let change_idx = match side {
            OrderSide::Bid => matcher.find_unused_bid_output(owner, ask_price),
            OrderSide::Long => matcher.find_unused_long_output(owner, ask_price),
        };

        let (filled, accepted) = match change_idx {
            Some(change_idx) => {
                let change_amount = matcher.output(change_idx).amount;
                if change_amount.unit != prior.unit {
                    return Err(ValidationError::UnitMismatch);
                }
                let filled = prior.checked_sub(&change_amount)?;
                let accepted = filled.mul_price(&ask_price)?;
                if accepted.amount <= 0 {
                    return Err(ValidationError::MissingCounterparty { input_index: index });
                }
                matcher.mark_used(change_idx);
                (filled, accepted)
            }
            None => (*prior, prior.mul_price(&ask_price)?),
        };

        match side {
            OrderSide::Bid => {
                let pay_idx = matcher
                    .find_unused_sig_output(owner, accepted)
                    .ok_or(ValidationError::MissingCounterparty { input_index: index })?;
                matcher.mark_used(pay_idx);
            }
            OrderSide::Long => {
                let min_collateral = filled.rounded_amount().saturating_mul(2);
                let cover_idx = matcher
                    .find_unused_cover_output(owner, accepted)
                    .ok_or(ValidationError::MissingCounterparty { input_index: index })?;
                let found = matcher.output(cover_idx).amount.rounded_amount();
                if found < min_collateral {
                    return Err(ValidationError::CollateralInsufficient {
                        required: min_collateral,
                        found,
                    });
                }
                matcher.mark_used(cover_idx);
            }
        }

        Ok(())
    }

    fn validate_output(
        &self,
        out: &TransactionOutput,
        balance: &mut BalanceSheet,
    ) -> Result<(), ValidationError> {
        match &out.claim {
            Claim::Signature { owner } => {
                if *owner == [0u8; 32] {
                    return Err(ValidationError::ZeroOwner);
                }
                balance.credit_out(&out.amount);
            }
            Claim::Pts { .. } => {
                balance.credit_out(&out.amount);
            }
            Claim::Bid { owner, ask_price } | Claim::Long { owner, ask_price } => {
                if *owner == [0u8; 32] {
                    return Err(ValidationError::ZeroOwner);
                }
                if !ask_price.is_canonical() {
                    return Err(ValidationError::PriceMalformed);
                }
                balance.credit_out(&out.amount);
            }
            Claim::Cover { owner, payoff } => {
                if *owner == [0u8; 32] {
                    return Err(ValidationError::ZeroOwner);
                }
                if payoff.amount <= 0 || payoff.unit.is_native() {
                    return Err(ValidationError::UnitMismatch);
                }
                let row = balance.row(payoff.unit);
                if row.neg_in > 0 && row.collat_in > 0 {
                    let incoming_ratio = Asset::new(row.collat_in, out.amount.unit)
                        .div_asset(&Asset::new(row.neg_in, payoff.unit))?;
                    let outgoing_ratio = out.amount.div_asset(payoff)?;
                    if !outgoing_ratio.ge(&incoming_ratio) {
                        return Err(ValidationError::MarginReduction);
                    }
                }
                balance.credit_out(&out.amount);
                balance.credit_collat_out(payoff.unit, &out.amount);
                balance.credit_neg_out(payoff);
            }
            // Accepted no-ops, as on the input side above: no balance
            // credit, no signature or shape requirement.
            Claim::OptExecute { .. }
            | Claim::MultiSig { .. }
            | Claim::Escrow { .. }
            | Claim::Password { .. } => {}
            Claim::Unknown(f) => return Err(ValidationError::UnsupportedClaim(*f)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::asset::{ASSET_PRECISION, PRICE_PRECISION};
    use std::collections::HashSet;

    struct FixedChainView {
        resolved: Vec<ResolvedInput>,
        head: u32,
    }

    impl ChainView for FixedChainView {
        fn fetch_inputs(&self, _inputs: &[TransactionInput]) -> anyhow::Result<Vec<ResolvedInput>> {
            Ok(self.resolved.clone())
        }
        fn head_block_num(&self) -> anyhow::Result<u32> {
            Ok(self.head)
        }
    }

    fn sole_input() -> TransactionInput {
        TransactionInput {
            output_tx: [1u8; 32],
            output_index: 0,
        }
    }

    #[test]
    fn signature_fill_balances_and_accrues_cdd() {
        let owner = [1u8; 32];
        let asset = Asset::new(500 * ASSET_PRECISION, AssetUnit::BTS);
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 10,
                prior_output: TransactionOutput {
                    amount: asset,
                    claim: Claim::Signature { owner },
                },
                spent: false,
            }],
            head: 20,
        };
        let stake = [9u8; 32];
        let mut signed = HashSet::new();
        signed.insert(owner);
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![TransactionOutput {
                amount: asset,
                claim: Claim::Signature { owner: [2u8; 32] },
            }],
            stake,
            signed_addresses: signed,
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        ctx.set_stake_window((stake, [0u8; 32]));
        ctx.validate().unwrap();
        assert_eq!(ctx.total_cdd(), 500 * 10);
    }

    #[test]
    fn unsigned_signature_input_rejected() {
        let owner = [1u8; 32];
        let asset = Asset::new(100 * ASSET_PRECISION, AssetUnit::BTS);
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 1,
                prior_output: TransactionOutput {
                    amount: asset,
                    claim: Claim::Signature { owner },
                },
                spent: false,
            }],
            head: 1,
        };
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![],
            stake: [0u8; 32],
            signed_addresses: HashSet::new(),
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        assert!(matches!(
            ctx.validate(),
            Err(ValidationError::MissingSignatures(_))
        ));
    }

    #[test]
    fn bid_owner_cancel_credits_input_twice() {
        let owner = [3u8; 32];
        let unit = AssetUnit(7);
        let locked = Asset::new(100 * ASSET_PRECISION, unit);
        let ask_price = Price {
            ratio: 2 * PRICE_PRECISION,
            base_unit: unit,
            quote_unit: AssetUnit::BTS,
        };
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 1,
                prior_output: TransactionOutput {
                    amount: locked,
                    claim: Claim::Bid { owner, ask_price },
                },
                spent: false,
            }],
            head: 1,
        };
        let mut signed = HashSet::new();
        signed.insert(owner);
        // Refund the locked asset twice over, matching the double credit
        // the owner-cancel path applies on the input side.
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![
                TransactionOutput {
                    amount: locked,
                    claim: Claim::Signature { owner },
                },
                TransactionOutput {
                    amount: locked,
                    claim: Claim::Signature { owner },
                },
            ],
            stake: [0u8; 32],
            signed_addresses: signed,
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        ctx.validate().unwrap();
    }

    #[test]
    fn bid_counterparty_fill_consumes_a_signature_output() {
        let owner = [5u8; 32];
        let unit = AssetUnit(5);
        let locked = Asset::new(100 * ASSET_PRECISION, unit);
        let ask_price = Price {
            ratio: PRICE_PRECISION,
            base_unit: unit,
            quote_unit: AssetUnit::BTS,
        };
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 1,
                prior_output: TransactionOutput {
                    amount: locked,
                    claim: Claim::Bid { owner, ask_price },
                },
                spent: false,
            }],
            head: 1,
        };
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![TransactionOutput {
                amount: Asset::new(100 * ASSET_PRECISION, AssetUnit::BTS),
                claim: Claim::Signature { owner },
            }],
            stake: [0u8; 32],
            signed_addresses: HashSet::new(),
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        ctx.validate().unwrap();
    }

    #[test]
    fn long_fill_rejects_undercollateralized_cover() {
        let owner = [6u8; 32];
        let unit = AssetUnit(5);
        let locked = Asset::new(100 * ASSET_PRECISION, unit);
        let ask_price = Price {
            ratio: PRICE_PRECISION,
            base_unit: unit,
            quote_unit: AssetUnit::BTS,
        };
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 1,
                prior_output: TransactionOutput {
                    amount: locked,
                    claim: Claim::Long { owner, ask_price },
                },
                spent: false,
            }],
            head: 1,
        };
        let accepted = Asset::new(100 * ASSET_PRECISION, AssetUnit::BTS);
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![TransactionOutput {
                amount: Asset::new(150 * ASSET_PRECISION, AssetUnit::BTS),
                claim: Claim::Cover {
                    owner,
                    payoff: accepted,
                },
            }],
            stake: [0u8; 32],
            signed_addresses: HashSet::new(),
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        ctx.set_allow_short_long_matching(true);
        assert!(matches!(
            ctx.validate(),
            Err(ValidationError::CollateralInsufficient { .. })
        ));
    }

    #[test]
    fn long_fill_rejected_when_short_long_matching_disabled() {
        let owner = [6u8; 32];
        let unit = AssetUnit(5);
        let locked = Asset::new(100 * ASSET_PRECISION, unit);
        let ask_price = Price {
            ratio: PRICE_PRECISION,
            base_unit: unit,
            quote_unit: AssetUnit::BTS,
        };
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 1,
                prior_output: TransactionOutput {
                    amount: locked,
                    claim: Claim::Long { owner, ask_price },
                },
                spent: false,
            }],
            head: 1,
        };
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![],
            stake: [0u8; 32],
            signed_addresses: HashSet::new(),
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        assert!(matches!(
            ctx.validate(),
            Err(ValidationError::MissingCounterparty { .. })
        ));
    }

    #[test]
    fn unsigned_cover_input_reaches_margin_check_not_missing_signatures() {
        let owner = [9u8; 32];
        let unit = AssetUnit(8);
        let collateral = Asset::new(100 * ASSET_PRECISION, AssetUnit::BTS);
        // 100 BTS backing 50 units of debt: a 2x collateral ratio.
        let existing_debt = Asset::new(50 * ASSET_PRECISION, unit);
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 1,
                prior_output: TransactionOutput {
                    amount: collateral,
                    claim: Claim::Cover {
                        owner,
                        payoff: existing_debt,
                    },
                },
                spent: false,
            }],
            head: 1,
        };
        // Refinancing to 100 units of debt against the same 100 BTS halves
        // the ratio to 1x — a reduction that must be rejected.
        let refinanced_payoff = Asset::new(100 * ASSET_PRECISION, unit);
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![TransactionOutput {
                amount: collateral,
                claim: Claim::Cover {
                    owner,
                    payoff: refinanced_payoff,
                },
            }],
            stake: [0u8; 32],
            signed_addresses: HashSet::new(),
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        // No signer for the Cover input's owner at all; validation must still
        // reach the output-pass margin check rather than failing the input
        // pass on a signature requirement the Cover claim doesn't have.
        assert!(matches!(
            ctx.validate(),
            Err(ValidationError::MarginReduction)
        ));
    }

    #[test]
    fn opt_execute_and_password_claims_are_accepted_no_ops() {
        let owner = [4u8; 32];
        let asset = Asset::new(10 * ASSET_PRECISION, AssetUnit(9));
        let view = FixedChainView {
            resolved: vec![ResolvedInput {
                source_block_num: 1,
                prior_output: TransactionOutput {
                    amount: asset,
                    claim: Claim::OptExecute { owner },
                },
                spent: false,
            }],
            head: 1,
        };
        let trx = SignedTransaction {
            inputs: vec![sole_input()],
            outputs: vec![TransactionOutput {
                amount: Asset::zero(AssetUnit::BTS),
                claim: Claim::Password {
                    pre_image_hash: [0u8; 32],
                },
            }],
            stake: [0u8; 32],
            signed_addresses: HashSet::new(),
            signed_pts_addresses: HashSet::new(),
        };
        let mut ctx = ValidationContext::new(trx, &view, true, REF_HEAD_CHAIN_TIP).unwrap();
        ctx.validate().unwrap();
        assert_eq!(ctx.total_cdd(), 0);
    }
}
