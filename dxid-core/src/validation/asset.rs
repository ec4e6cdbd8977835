use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Fixed-point scale shared by every asset unit: amounts are stored as
/// integer "satoshi-like" units, one displayed unit equals
/// [`ASSET_PRECISION`] stored units.
pub const ASSET_PRECISION: i64 = 10_000;

/// Fixed-point scale for [`Price`] ratios.
pub const PRICE_PRECISION: u128 = 1_000_000_000_000;

/// An asset unit identifier. `0` is reserved for the chain's native unit
/// and is excluded from [`super::balance::BalanceSheet`] accounting (the
/// native unit is settled by the stake layer, not the DEX balance check).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetUnit(pub u16);

impl AssetUnit {
    pub const BTS: AssetUnit = AssetUnit(0);

    pub fn is_native(self) -> bool {
        self == Self::BTS
    }
}

/// A quantity of a single [`AssetUnit`], stored at [`ASSET_PRECISION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub amount: i64,
    pub unit: AssetUnit,
}

impl Asset {
    pub fn new(amount: i64, unit: AssetUnit) -> Self {
        Asset { amount, unit }
    }

    pub fn zero(unit: AssetUnit) -> Self {
        Asset { amount: 0, unit }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn checked_add(&self, other: &Asset) -> Result<Asset, ValidationError> {
        if self.unit != other.unit {
            return Err(ValidationError::UnitMismatch);
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(ValidationError::Overflow)?;
        Ok(Asset::new(amount, self.unit))
    }

    pub fn checked_sub(&self, other: &Asset) -> Result<Asset, ValidationError> {
        if self.unit != other.unit {
            return Err(ValidationError::UnitMismatch);
        }
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or(ValidationError::Overflow)?;
        Ok(Asset::new(amount, self.unit))
    }

    /// `self * price`, producing an [`Asset`] denominated in `price`'s
    /// other unit. `self.unit` must match one of `price.base_unit` or
    /// `price.quote_unit`.
    pub fn mul_price(&self, price: &Price) -> Result<Asset, ValidationError> {
        if self.unit == price.base_unit {
            let out = mul_div(self.amount, price.ratio_num(), price.ratio_den())?;
            Ok(Asset::new(out, price.quote_unit))
        } else if self.unit == price.quote_unit {
            let out = mul_div(self.amount, price.ratio_den(), price.ratio_num())?;
            Ok(Asset::new(out, price.base_unit))
        } else {
            Err(ValidationError::UnitMismatch)
        }
    }

    /// `self / other`, producing the [`Price`] such that
    /// `other.mul_price(result) == self` (numerator-preserving: `self` is
    /// always the dividend, regardless of unit ordering). Used by the
    /// margin-non-reduction check, where the comparison direction depends
    /// on this literal operand order rather than a canonicalized ratio.
    pub fn div_asset(&self, other: &Asset) -> Result<Price, ValidationError> {
        if other.amount == 0 {
            return Err(ValidationError::PriceMalformed);
        }
        let ratio = (self.amount as i128)
            .checked_mul(PRICE_PRECISION as i128)
            .ok_or(ValidationError::Overflow)?
            / other.amount as i128;
        if ratio <= 0 {
            return Err(ValidationError::PriceMalformed);
        }
        Ok(Price {
            ratio: ratio as u128,
            base_unit: self.unit,
            quote_unit: other.unit,
        })
    }

    /// Floors `amount` to a whole number of displayed units, rounding the
    /// remainder off. Used where the original ledger truncates rather than
    /// banker's-rounds (collateral payoff, CDD weight inputs).
    pub fn rounded_amount(&self) -> i64 {
        self.amount / ASSET_PRECISION
    }
}

/// A base/quote exchange ratio. Canonical form requires `base_unit <
/// quote_unit`; ratios built by [`Asset::div_asset`] are *not* required to
/// be canonical because the dividend/divisor order there is meaningful
/// (see that method's docs), but ratios constructed directly by callers
/// (e.g. decoded from the wire) should call [`Price::is_canonical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub ratio: u128,
    pub base_unit: AssetUnit,
    pub quote_unit: AssetUnit,
}

impl Price {
    pub fn is_canonical(&self) -> bool {
        self.base_unit < self.quote_unit && self.ratio > 0
    }

    fn ratio_num(&self) -> i64 {
        // ratio is quote-per-base scaled by PRICE_PRECISION; numerator for
        // base -> quote conversion.
        self.ratio as i64
    }

    fn ratio_den(&self) -> i64 {
        PRICE_PRECISION as i64
    }

    /// Numeric comparison of two prices sharing the same unit pair,
    /// regardless of which asset was the dividend when each was built.
    /// `self.ratio` and `other.ratio` are both "quote units per
    /// [`PRICE_PRECISION`] base units" once `base_unit`/`quote_unit` match;
    /// callers compare `>=`/`<` directly on that basis.
    pub fn ge(&self, other: &Price) -> bool {
        self.ratio >= other.ratio
    }
}

/// Overflow-checked `(a * num) / den`, computed in `i128` to avoid
/// intermediate overflow, then narrowed back with an explicit bounds check.
fn mul_div(a: i64, num: i64, den: i64) -> Result<i64, ValidationError> {
    if den == 0 {
        return Err(ValidationError::PriceMalformed);
    }
    let wide = (a as i128) * (num as i128) / (den as i128);
    if wide > i64::MAX as i128 || wide < i64::MIN as i128 {
        return Err(ValidationError::Overflow);
    }
    Ok(wide as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE: AssetUnit = AssetUnit(1);

    #[test]
    fn add_sub_roundtrip() {
        let a = Asset::new(500, AssetUnit::BTS);
        let b = Asset::new(200, AssetUnit::BTS);
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.amount, 700);
        let diff = sum.checked_sub(&b).unwrap();
        assert_eq!(diff.amount, 500);
    }

    #[test]
    fn unit_mismatch_rejected() {
        let a = Asset::new(500, AssetUnit::BTS);
        let b = Asset::new(200, QUOTE);
        assert_eq!(a.checked_add(&b), Err(ValidationError::UnitMismatch));
    }

    #[test]
    fn div_asset_then_mul_price_roundtrips() {
        let bts = Asset::new(1_000 * ASSET_PRECISION, AssetUnit::BTS);
        let usd = Asset::new(100 * ASSET_PRECISION, QUOTE);
        let price = bts.div_asset(&usd).unwrap();
        let back = usd.mul_price(&price).unwrap();
        assert_eq!(back.unit, AssetUnit::BTS);
        assert_eq!(back.amount, bts.amount);
    }

    #[test]
    fn zero_divisor_is_malformed() {
        let bts = Asset::new(1_000, AssetUnit::BTS);
        let zero = Asset::new(0, QUOTE);
        assert_eq!(bts.div_asset(&zero), Err(ValidationError::PriceMalformed));
    }

    #[test]
    fn rounded_amount_floors() {
        let a = Asset::new(ASSET_PRECISION + ASSET_PRECISION / 2, AssetUnit::BTS);
        assert_eq!(a.rounded_amount(), 1);
    }
}
