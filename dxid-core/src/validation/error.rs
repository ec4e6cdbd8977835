use thiserror::Error;

use super::asset::AssetUnit;
use crate::Address;

/// Typed failure taxonomy for [`super::ValidationContext::validate`].
///
/// Validators are fatal-on-first-failure: there is no partial acceptance, and
/// every variant carries the contextual fields (indices, units, addresses)
/// needed to explain the rejection without re-deriving them from the
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("resolved inputs ({resolved}) do not match transaction inputs ({declared})")]
    InputArity { declared: usize, resolved: usize },

    #[error("input {index} references an output that has already been spent")]
    InputAlreadySpent { index: usize },

    #[error("claim function {0} is not supported")]
    UnsupportedClaim(u8),

    #[error("arithmetic across mismatched asset units")]
    UnitMismatch,

    #[error("price is malformed: zero ratio or base/quote unit inconsistency")]
    PriceMalformed,

    #[error("claim owner is the zero address")]
    ZeroOwner,

    #[error("input {input_index} is a bid/long fill with no matching counterparty output")]
    MissingCounterparty { input_index: usize },

    #[error("counterparty cover output carries insufficient collateral: required {required}, found {found}")]
    CollateralInsufficient { required: i64, found: i64 },

    #[error("outgoing cover position would reduce margin below the incoming collateralization ratio")]
    MarginReduction,

    #[error("output {0} was already claimed by another input or rule")]
    DoubleUseOfOutput(usize),

    #[error("asset unit {unit:?} creates money: in={in_amount} out={out_amount}")]
    ValueCreated {
        unit: AssetUnit,
        in_amount: i64,
        out_amount: i64,
    },

    #[error("missing signatures for {0:?}")]
    MissingSignatures(Vec<Address>),

    #[error("arithmetic overflow")]
    Overflow,
}
