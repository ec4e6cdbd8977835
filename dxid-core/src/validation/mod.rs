//! Polymorphic-claim transaction validation.
//!
//! [`ValidationContext`] is the entry point: resolve a transaction's
//! inputs against a [`ChainView`], then call
//! [`ValidationContext::validate`]. Everything else in this module is
//! vocabulary the validator is built from — fixed-point [`Asset`]
//! arithmetic, the per-unit [`BalanceSheet`], the nine [`Claim`] variants,
//! and the [`matcher::OutputMatcher`] used to pair DEX order inputs with
//! their counterparty outputs.

pub mod asset;
pub mod balance;
pub mod claim;
pub mod context;
pub mod error;
pub mod matcher;

pub use asset::{Asset, AssetUnit, Price, ASSET_PRECISION, PRICE_PRECISION};
pub use balance::{BalanceRow, BalanceSheet};
pub use claim::{
    Claim, PtsAddress, ResolvedInput, SignedTransaction, TransactionInput, TransactionOutput,
};
pub use context::{ChainView, ValidationContext, REF_HEAD_CHAIN_TIP};
pub use error::ValidationError;
pub use matcher::OutputMatcher;
