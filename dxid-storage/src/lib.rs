use anyhow::Result;
use async_trait::async_trait;
use dxid_core::validation::{ResolvedInput, TransactionInput, TransactionOutput};
use dxid_core::{Address, Block, ChainView};
use serde_json::json;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn insert_block(&self, block: &Block) -> Result<()>;
    async fn get_block_by_height(&self, height: i64) -> Result<Option<Block>>;
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_balance(&self, addr: &Address) -> Result<u64>;
    async fn set_balance(&self, addr: &Address, value: u64) -> Result<()>;
}

/// Persists unspent-output state and answers [`ChainView`] lookups for
/// the validation core. `insert_outputs` is called once per accepted
/// block (one row per output, keyed by the owning transaction's hash and
/// output index); `mark_spent` is called once per accepted input.
#[async_trait]
pub trait UtxoStore: Send + Sync {
    async fn insert_outputs(
        &self,
        tx_hash: dxid_core::BlockHash,
        block_num: u32,
        outputs: &[TransactionOutput],
    ) -> Result<()>;
    async fn mark_spent(&self, tx_hash: dxid_core::BlockHash, output_index: u16) -> Result<()>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    // Minimal schema creation; in production this would be handled by
    // migration files rather than an idempotent CREATE TABLE.
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
        CREATE TABLE IF NOT EXISTS blocks(
            height BIGINT PRIMARY KEY,
            data JSONB NOT NULL
        );
        CREATE TABLE IF NOT EXISTS balances(
            address BYTEA PRIMARY KEY,
            amount BIGINT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS outputs(
            tx_hash BYTEA NOT NULL,
            output_index INT NOT NULL,
            block_num BIGINT NOT NULL,
            data JSONB NOT NULL,
            spent BOOLEAN NOT NULL DEFAULT FALSE,
            PRIMARY KEY (tx_hash, output_index)
        );
        "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BlockStore for PgStore {
    async fn insert_block(&self, block: &Block) -> Result<()> {
        sqlx::query("INSERT INTO blocks(height, data) VALUES ($1, $2) ON CONFLICT (height) DO UPDATE SET data = EXCLUDED.data")
            .bind(block.header.height as i64)
            .bind(json!(block))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_block_by_height(&self, height: i64) -> Result<Option<Block>> {
        let row = sqlx::query("SELECT data FROM blocks WHERE height = $1")
            .bind(height)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            let value: serde_json::Value = row.try_get("data")?;
            let blk: Block = serde_json::from_value(value)?;
            return Ok(Some(blk));
        }
        Ok(None)
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn get_balance(&self, addr: &Address) -> Result<u64> {
        let row = sqlx::query("SELECT amount FROM balances WHERE address = $1")
            .bind(addr.as_slice())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| {
                let v: i64 = r.try_get("amount").unwrap_or(0);
                v as u64
            })
            .unwrap_or(0))
    }

    async fn set_balance(&self, addr: &Address, value: u64) -> Result<()> {
        sqlx::query(
            "INSERT INTO balances(address, amount) VALUES ($1, $2) ON CONFLICT (address) DO UPDATE SET amount = EXCLUDED.amount",
        )
        .bind(addr.as_slice())
        .bind(value as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UtxoStore for PgStore {
    async fn insert_outputs(
        &self,
        tx_hash: dxid_core::BlockHash,
        block_num: u32,
        outputs: &[TransactionOutput],
    ) -> Result<()> {
        for (index, out) in outputs.iter().enumerate() {
            sqlx::query(
                "INSERT INTO outputs(tx_hash, output_index, block_num, data, spent)
                 VALUES ($1, $2, $3, $4, FALSE)
                 ON CONFLICT (tx_hash, output_index) DO UPDATE SET data = EXCLUDED.data",
            )
            .bind(tx_hash.as_slice())
            .bind(index as i32)
            .bind(block_num as i64)
            .bind(json!(out))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn mark_spent(&self, tx_hash: dxid_core::BlockHash, output_index: u16) -> Result<()> {
        sqlx::query("UPDATE outputs SET spent = TRUE WHERE tx_hash = $1 AND output_index = $2")
            .bind(tx_hash.as_slice())
            .bind(output_index as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Blocking [`ChainView`] adapter over [`PgStore`], driven through a
/// `tokio` handle so the synchronous validation core can call it without
/// becoming async itself.
pub struct PgChainView {
    pool: PgPool,
    handle: tokio::runtime::Handle,
}

impl PgChainView {
    pub fn new(store: &PgStore, handle: tokio::runtime::Handle) -> Self {
        PgChainView {
            pool: store.pool.clone(),
            handle,
        }
    }
}

impl ChainView for PgChainView {
    fn fetch_inputs(&self, inputs: &[TransactionInput]) -> anyhow::Result<Vec<ResolvedInput>> {
        let pool = self.pool.clone();
        let inputs = inputs.to_vec();
        self.handle.block_on(async move {
            let mut resolved = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let row = sqlx::query(
                    "SELECT block_num, data, spent FROM outputs WHERE tx_hash = $1 AND output_index = $2",
                )
                .bind(input.output_tx.as_slice())
                .bind(input.output_index as i32)
                .fetch_one(&pool)
                .await?;
                let block_num: i64 = row.try_get("block_num")?;
                let spent: bool = row.try_get("spent")?;
                let data: serde_json::Value = row.try_get("data")?;
                let prior_output: TransactionOutput = serde_json::from_value(data)?;
                resolved.push(ResolvedInput {
                    source_block_num: block_num as u32,
                    prior_output,
                    spent,
                });
            }
            Ok(resolved)
        })
    }

    fn head_block_num(&self) -> anyhow::Result<u32> {
        let pool = self.pool.clone();
        self.handle.block_on(async move {
            let row = sqlx::query("SELECT COALESCE(MAX(height), 0) as height FROM blocks")
                .fetch_one(&pool)
                .await?;
            let height: i64 = row.try_get("height")?;
            Ok(height as u32)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No in-memory Postgres replacement is available in this environment,
    // so exercising PgStore/PgChainView requires a live DATABASE_URL.
    #[tokio::test]
    #[ignore]
    async fn insert_and_fetch_output() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL for test");
        let store = PgStore::connect(&url, 5).await.unwrap();
        let tx_hash = [7u8; 32];
        let outputs = vec![TransactionOutput {
            amount: dxid_core::validation::Asset::new(10, dxid_core::validation::AssetUnit::BTS),
            claim: dxid_core::validation::Claim::Signature { owner: [1u8; 32] },
        }];
        store.insert_outputs(tx_hash, 1, &outputs).await.unwrap();
        let view = PgChainView::new(&store, tokio::runtime::Handle::current());
        let resolved = view
            .fetch_inputs(&[TransactionInput {
                output_tx: tx_hash,
                output_index: 0,
            }])
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(!resolved[0].spent);
    }
}
