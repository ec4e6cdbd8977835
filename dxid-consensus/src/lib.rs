//! Stake-weighted validator selection and per-block transaction validation.
//!
//! Block production is pure proof-of-stake: there is no PoW target here,
//! only the coin-days-destroyed accounting from
//! `dxid_core::validation` — every block's transactions are run through
//! a [`dxid_core::ValidationContext`] before being accepted, and the
//! resulting `total_cdd` feeds into validator weighting alongside bonded
//! stake.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dxid_core::{
    merkle_root, now_ts, Address, Block, BlockHeader, ChainView, CryptoProvider, SignedTransaction,
    ValidationContext, REF_HEAD_CHAIN_TIP,
};
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub max_supply: u64,
    pub base_reward: u64,
    pub enforce_unspent: bool,
    pub allow_short_long_matching: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusState {
    pub stakes: HashMap<Address, u64>,
    pub last_height: u64,
    pub total_cdd: u128,
    pub uncounted_cdd: u128,
}

#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    fn propose_block(
        &self,
        previous: &BlockHeader,
        transactions: Vec<SignedTransaction>,
        validator: Address,
    ) -> Result<Block>;
    fn validate_block(&self, block: &Block) -> Result<()>;
    fn stake(&self, addr: Address, amount: u64) -> Result<()>;
    fn unstake(&self, addr: &Address, amount: u64) -> Result<()>;
    fn slashing(&self, addr: &Address, amount: u64) -> Result<()>;
    fn state(&self) -> ConsensusState;
}

pub struct HybridConsensus<C: CryptoProvider, V: ChainView> {
    crypto: Arc<C>,
    chain_view: Arc<V>,
    state: RwLock<ConsensusState>,
    config: ConsensusConfig,
}

impl<C: CryptoProvider, V: ChainView> HybridConsensus<C, V> {
    pub fn new(crypto: Arc<C>, chain_view: Arc<V>, config: ConsensusConfig) -> Self {
        Self {
            crypto,
            chain_view,
            state: RwLock::new(ConsensusState::default()),
            config,
        }
    }

    fn select_validator(&self) -> Option<Address> {
        let state = self.state.read();
        let total_stake: u128 = state.stakes.values().map(|v| *v as u128).sum();
        if total_stake == 0 {
            return None;
        }
        let mut rng = rand::thread_rng();
        let mut pick = rng.gen_range(0..total_stake);
        for (addr, stake) in state.stakes.iter() {
            if pick < *stake as u128 {
                return Some(*addr);
            }
            pick -= *stake as u128;
        }
        None
    }

    /// Runs every transaction in `transactions` through a
    /// [`ValidationContext`] against this engine's chain view, folding
    /// coin-days-destroyed totals from all of them together. The stake
    /// window for CDD crediting is `(previous block hash, this block's
    /// header hash)` — a transaction's `stake` field must name one of the
    /// two to have its weight counted rather than discarded.
    fn validate_transactions(
        &self,
        previous_hash: dxid_core::BlockHash,
        header_hash: dxid_core::BlockHash,
        transactions: &[SignedTransaction],
    ) -> Result<(u128, u128)> {
        let mut total_cdd = 0u128;
        let mut uncounted_cdd = 0u128;
        for trx in transactions {
            let mut ctx = ValidationContext::new(
                trx.clone(),
                self.chain_view.as_ref(),
                self.config.enforce_unspent,
                REF_HEAD_CHAIN_TIP,
            )?;
            ctx.set_stake_window((previous_hash, header_hash));
            ctx.set_allow_short_long_matching(self.config.allow_short_long_matching);
            ctx.validate()?;
            total_cdd += ctx.total_cdd();
            uncounted_cdd += ctx.uncounted_cdd();
        }
        Ok((total_cdd, uncounted_cdd))
    }
}

#[async_trait]
impl<C: CryptoProvider, V: ChainView> ConsensusEngine for HybridConsensus<C, V> {
    fn propose_block(
        &self,
        previous: &BlockHeader,
        transactions: Vec<SignedTransaction>,
        validator: Address,
    ) -> Result<Block> {
        let previous_hash = self.crypto.hash_block_header(previous);
        let stake_weight = *self.state.read().stakes.get(&validator).unwrap_or(&0);
        let mut header = BlockHeader {
            previous_hash,
            merkle_root: merkle_root(&transactions),
            height: previous.height + 1,
            timestamp: now_ts(),
            nonce: dxid_core::random_nonce(),
            validator,
            stake_weight,
        };
        let header_hash = self.crypto.hash_block_header(&header);
        let (total_cdd, uncounted_cdd) =
            self.validate_transactions(previous_hash, header_hash, &transactions)?;
        debug!(%total_cdd, %uncounted_cdd, "block transactions validated");
        header.nonce = header_hash[0] as u64;
        Ok(Block {
            header,
            transactions,
            validator_signature: vec![],
        })
    }

    fn validate_block(&self, block: &Block) -> Result<()> {
        let state = self.state.read();
        if block.header.height != state.last_height + 1 {
            return Err(anyhow!("unexpected height"));
        }
        if *state.stakes.get(&block.header.validator).unwrap_or(&0) == 0 {
            return Err(anyhow!("validator not staked"));
        }
        if block.header.merkle_root != merkle_root(&block.transactions) {
            return Err(anyhow!("merkle mismatch"));
        }
        drop(state);

        let header_hash = self.crypto.hash_block_header(&block.header);
        let (total_cdd, uncounted_cdd) = self.validate_transactions(
            block.header.previous_hash,
            header_hash,
            &block.transactions,
        )?;

        let mut state = self.state.write();
        state.last_height = block.header.height;
        state.total_cdd += total_cdd;
        state.uncounted_cdd += uncounted_cdd;
        info!(height = block.header.height, %total_cdd, "block accepted");
        Ok(())
    }

    fn stake(&self, addr: Address, amount: u64) -> Result<()> {
        let mut state = self.state.write();
        let entry = state.stakes.entry(addr).or_insert(0);
        *entry = entry.saturating_add(amount);
        Ok(())
    }

    fn unstake(&self, addr: &Address, amount: u64) -> Result<()> {
        let mut state = self.state.write();
        let entry = state.stakes.entry(*addr).or_insert(0);
        if *entry < amount {
            return Err(anyhow!("insufficient stake"));
        }
        *entry -= amount;
        Ok(())
    }

    fn slashing(&self, addr: &Address, amount: u64) -> Result<()> {
        let mut state = self.state.write();
        if let Some(stake) = state.stakes.get_mut(addr) {
            *stake = stake.saturating_sub(amount);
        }
        Ok(())
    }

    fn state(&self) -> ConsensusState {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxid_core::validation::{Asset, AssetUnit, Claim, ResolvedInput, TransactionOutput};
    use dxid_core::{Block, TransactionInput};
    use dxid_crypto::{generate_ed25519, DefaultCryptoProvider};

    struct EmptyChainView;

    impl ChainView for EmptyChainView {
        fn fetch_inputs(&self, inputs: &[TransactionInput]) -> Result<Vec<ResolvedInput>> {
            let _ = inputs;
            Ok(vec![])
        }

        fn head_block_num(&self) -> Result<u32> {
            Ok(0)
        }
    }

    #[test]
    fn pos_propose_and_validate_flow() {
        let crypto = Arc::new(DefaultCryptoProvider::new());
        let chain_view = Arc::new(EmptyChainView);
        let config = ConsensusConfig {
            max_supply: 21_000_000_0000,
            base_reward: 50_0000,
            enforce_unspent: false,
            allow_short_long_matching: false,
        };
        let engine = HybridConsensus::new(crypto.clone(), chain_view, config);
        let key = generate_ed25519();
        let addr = crypto.address_from_public_key(&key.public_key).unwrap();
        engine.stake(addr, 100).unwrap();

        let tx = SignedTransaction {
            inputs: vec![],
            outputs: vec![TransactionOutput {
                amount: Asset::new(10, AssetUnit::BTS),
                claim: Claim::Signature { owner: addr },
            }],
            stake: [0u8; 32],
            signed_addresses: Default::default(),
            signed_pts_addresses: Default::default(),
        };
        let genesis_header = BlockHeader {
            previous_hash: [0u8; 32],
            merkle_root: merkle_root(std::slice::from_ref(&tx)),
            height: 0,
            timestamp: now_ts(),
            nonce: 0,
            validator: addr,
            stake_weight: 0,
        };
        let block: Block = engine
            .propose_block(&genesis_header, vec![tx], addr)
            .unwrap();
        engine.validate_block(&block).unwrap();
        assert_eq!(engine.state().last_height, 1);
    }
}
