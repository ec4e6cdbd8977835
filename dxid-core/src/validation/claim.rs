use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::asset::{Asset, Price};
use crate::{Address, BlockHash};

/// A legacy proof-of-transfer address, carried verbatim from the chain
/// this ledger format descends from. Distinct key space from [`Address`]:
/// `Pts` claims are satisfied by a `Pts`-style signature, never an
/// ordinary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PtsAddress(pub [u8; 33]);

/// The spending condition attached to a [`TransactionOutput`].
///
/// A tagged-sum enum in place of the polymorphic claim hierarchy this
/// format is modeled on: every variant the wire format can carry is a
/// compile-time-known case, so there is no downcast-and-dispatch failure
/// mode. `Unknown` exists purely so a future claim kind decodes without
/// erroring the whole transaction; [`super::context::ValidationContext`]
/// rejects it during validation rather than at decode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Claim {
    Signature {
        owner: Address,
    },
    Pts {
        owner: PtsAddress,
    },
    Bid {
        owner: Address,
        ask_price: Price,
    },
    Long {
        owner: Address,
        ask_price: Price,
    },
    Cover {
        owner: Address,
        payoff: Asset,
    },
    OptExecute {
        owner: Address,
    },
    MultiSig {
        required: u16,
        owners: Vec<Address>,
    },
    Escrow {
        sender: Address,
        receiver: Address,
        agent: Address,
    },
    Password {
        pre_image_hash: [u8; 32],
    },
    /// Any claim function byte not covered above. Decodes without error;
    /// rejected by validation with `UnsupportedClaim`.
    Unknown(u8),
}

impl Claim {
    pub fn owner(&self) -> Option<Address> {
        match self {
            Claim::Signature { owner } => Some(*owner),
            Claim::Bid { owner, .. } => Some(*owner),
            Claim::Long { owner, .. } => Some(*owner),
            Claim::Cover { owner, .. } => Some(*owner),
            Claim::OptExecute { owner } => Some(*owner),
            _ => None,
        }
    }
}

/// An unresolved reference to a prior transaction's output, as carried on
/// the wire inside a [`SignedTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub output_tx: BlockHash,
    pub output_index: u16,
}

/// A spendable output: an amount of a single asset plus the claim that
/// must be satisfied to spend it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub amount: Asset,
    pub claim: Claim,
}

/// A [`TransactionInput`] resolved against chain state: the output it
/// references, the height it was created at (for CDD weighting), and
/// whether it has already been spent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    pub source_block_num: u32,
    pub prior_output: TransactionOutput,
    pub spent: bool,
}

/// A transaction together with the signer sets that authenticate it.
///
/// Signature verification is assumed to have already happened upstream
/// (see [`crate::CryptoProvider`]); `signed_addresses`/`signed_pts_addresses`
/// are the *already-verified* result of that step, carried here so the
/// validation core can check claim satisfaction by simple set membership
/// rather than re-deriving public keys from raw signature bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    /// Block hash this transaction stakes its coin-days-destroyed claim
    /// against; compared against the two-block stake window.
    pub stake: BlockHash,
    #[serde(default)]
    pub signed_addresses: HashSet<Address>,
    #[serde(default)]
    pub signed_pts_addresses: HashSet<PtsAddress>,
}
