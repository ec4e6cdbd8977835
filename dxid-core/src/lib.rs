//! Foundational ledger types and the transaction validation core.
//!
//! `validation` holds the polymorphic-claim transaction validator; everything
//! else here is the minimal shared vocabulary (addresses, block headers, the
//! crypto-provider contract) that the rest of the workspace builds on.

pub mod validation;

use serde::{Deserialize, Serialize};

pub type Address = [u8; 32];
pub type BlockHash = [u8; 32];

pub use validation::{
    Asset, AssetUnit, BalanceRow, BalanceSheet, ChainView, Claim, PtsAddress, ResolvedInput,
    SignedTransaction, TransactionInput, TransactionOutput, ValidationContext, ValidationError,
    REF_HEAD_CHAIN_TIP,
};

/// Signature verification and address/public-key recovery are assumed correct
/// upstream (see `validation` module docs); this trait is the seam the rest of
/// the workspace uses to discharge that assumption.
pub trait CryptoProvider: Send + Sync + 'static {
    fn address_from_public_key(&self, pk: &[u8]) -> anyhow::Result<Address>;
    fn verify_signature(&self, pk: &[u8], msg: &[u8], sig: &[u8]) -> anyhow::Result<bool>;
    fn sign_message(&self, sk: &[u8], msg: &[u8]) -> anyhow::Result<Vec<u8>>;
    fn hash_block_header(&self, header: &BlockHeader) -> BlockHash;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous_hash: BlockHash,
    pub merkle_root: BlockHash,
    pub height: u64,
    pub timestamp: u64,
    pub nonce: u64,
    pub validator: Address,
    pub stake_weight: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<SignedTransaction>,
    pub validator_signature: Vec<u8>,
}

pub fn merkle_root(transactions: &[SignedTransaction]) -> BlockHash {
    if transactions.is_empty() {
        return [0u8; 32];
    }
    let mut hashes: Vec<BlockHash> = transactions.iter().map(tx_hash).collect();
    while hashes.len() > 1 {
        let mut next = Vec::new();
        for pair in hashes.chunks(2) {
            let mut hasher = blake3::Hasher::new();
            hasher.update(&pair[0]);
            if pair.len() == 2 {
                hasher.update(&pair[1]);
            } else {
                hasher.update(&pair[0]);
            }
            next.push(hasher.finalize().into());
        }
        hashes = next;
    }
    hashes[0]
}

pub fn tx_hash(tx: &SignedTransaction) -> BlockHash {
    let encoded = serde_json::to_vec(tx).expect("transaction serializes");
    blake3::hash(&encoded).into()
}

pub fn now_ts() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn random_nonce() -> u64 {
    use rand::RngCore;
    rand::thread_rng().next_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merkle_single() {
        let tx = SignedTransaction {
            inputs: vec![],
            outputs: vec![TransactionOutput {
                amount: Asset::new(10, AssetUnit::BTS),
                claim: Claim::Signature { owner: [1u8; 32] },
            }],
            stake: [0u8; 32],
            signed_addresses: Default::default(),
            signed_pts_addresses: Default::default(),
        };
        let root = merkle_root(std::slice::from_ref(&tx));
        assert_eq!(root, tx_hash(&tx));
    }

    #[test]
    fn merkle_empty() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }
}
