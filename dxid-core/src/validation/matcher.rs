use super::asset::{Asset, Price};
use super::claim::{Claim, TransactionOutput};
use crate::Address;

/// Scans a transaction's outputs for the first not-yet-used output
/// matching a predicate, in index order, and prevents the same output
/// from satisfying two different inputs. `find_*` returns `Option<usize>`
/// rather than a sentinel "no match" index, so "no match" and "matched
/// index 0" cannot be confused.
pub struct OutputMatcher<'a> {
    outputs: &'a [TransactionOutput],
    used: Vec<bool>,
}

impl<'a> OutputMatcher<'a> {
    pub fn new(outputs: &'a [TransactionOutput]) -> Self {
        OutputMatcher {
            outputs,
            used: vec![false; outputs.len()],
        }
    }

    pub fn mark_used(&mut self, index: usize) {
        self.used[index] = true;
    }

    pub fn is_used(&self, index: usize) -> bool {
        self.used[index]
    }

    fn find(&self, mut pred: impl FnMut(&TransactionOutput) -> bool) -> Option<usize> {
        self.outputs
            .iter()
            .enumerate()
            .find(|(i, out)| !self.used[*i] && pred(out))
            .map(|(i, _)| i)
    }

    /// A `Signature` output owned by `owner` whose amount is exactly
    /// `required` once both are floored by [`Asset::rounded_amount`].
    pub fn find_unused_sig_output(&self, owner: Address, required: Asset) -> Option<usize> {
        self.find(|out| match &out.claim {
            Claim::Signature { owner: o } => {
                *o == owner
                    && out.amount.unit == required.unit
                    && out.amount.rounded_amount() == required.rounded_amount()
            }
            _ => false,
        })
    }

    /// A `Bid` output that is the exact same resting order as the
    /// prototype (same owner, same `ask_price`) — amount may differ,
    /// which is how a partial-fill change output is represented.
    pub fn find_unused_bid_output(&self, owner: Address, ask_price: Price) -> Option<usize> {
        self.find(|out| {
            matches!(&out.claim, Claim::Bid { owner: o, ask_price: p } if *o == owner && *p == ask_price)
        })
    }

    /// Symmetric to [`Self::find_unused_bid_output`] for `Long` orders.
    pub fn find_unused_long_output(&self, owner: Address, ask_price: Price) -> Option<usize> {
        self.find(|out| {
            matches!(&out.claim, Claim::Long { owner: o, ask_price: p } if *o == owner && *p == ask_price)
        })
    }

    /// A `Cover` output matching `owner`/`payoff` exactly. Collateral
    /// sufficiency (the `>= min_collateral` requirement) is checked by
    /// the caller against the matched output, so it can raise
    /// `CollateralInsufficient` with the actual amount found rather than
    /// folding that comparison into "no match".
    pub fn find_unused_cover_output(&self, owner: Address, payoff: Asset) -> Option<usize> {
        self.find(|out| {
            matches!(&out.claim, Claim::Cover { owner: o, payoff: p } if *o == owner && *p == payoff)
        })
    }

    pub fn output(&self, index: usize) -> &TransactionOutput {
        &self.outputs[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::asset::{AssetUnit, PRICE_PRECISION};

    fn sig_output(owner: Address, amount: i64) -> TransactionOutput {
        TransactionOutput {
            amount: Asset::new(amount, AssetUnit::BTS),
            claim: Claim::Signature { owner },
        }
    }

    #[test]
    fn finds_first_unused_match_in_index_order() {
        let owner = [1u8; 32];
        let required = Asset::new(1, AssetUnit::BTS);
        let outs = vec![sig_output(owner, 1), sig_output(owner, 1)];
        let mut matcher = OutputMatcher::new(&outs);
        let first = matcher.find_unused_sig_output(owner, required).unwrap();
        assert_eq!(first, 0);
        matcher.mark_used(first);
        let second = matcher.find_unused_sig_output(owner, required).unwrap();
        assert_eq!(second, 1);
        matcher.mark_used(second);
        assert_eq!(matcher.find_unused_sig_output(owner, required), None);
    }

    #[test]
    fn no_match_returns_none_not_a_sentinel_index() {
        let owner = [1u8; 32];
        let required = Asset::new(1, AssetUnit::BTS);
        let outs = vec![sig_output([2u8; 32], 1)];
        let matcher = OutputMatcher::new(&outs);
        assert_eq!(matcher.find_unused_sig_output(owner, required), None);
    }

    #[test]
    fn sig_output_amount_must_match_exactly() {
        let owner = [1u8; 32];
        let outs = vec![sig_output(owner, 5)];
        let matcher = OutputMatcher::new(&outs);
        let required = Asset::new(6, AssetUnit::BTS);
        assert_eq!(matcher.find_unused_sig_output(owner, required), None);
    }

    #[test]
    fn bid_prototype_requires_matching_price_not_just_owner() {
        let owner = [1u8; 32];
        let price_a = Price {
            ratio: PRICE_PRECISION * 2,
            base_unit: AssetUnit(1),
            quote_unit: AssetUnit(2),
        };
        let price_b = Price {
            ratio: PRICE_PRECISION * 3,
            base_unit: AssetUnit(1),
            quote_unit: AssetUnit(2),
        };
        let outs = vec![TransactionOutput {
            amount: Asset::new(10, AssetUnit(1)),
            claim: Claim::Bid {
                owner,
                ask_price: price_a,
            },
        }];
        let matcher = OutputMatcher::new(&outs);
        assert_eq!(matcher.find_unused_bid_output(owner, price_b), None);
        assert_eq!(matcher.find_unused_bid_output(owner, price_a), Some(0));
    }
}
