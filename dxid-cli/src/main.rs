use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dxid_config::DxidConfig;
use dxid_core::SignedTransaction;
use dxid_node::run_node;
use dxid_wallet::WalletStore;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "dxid", version, about = "dxid Layer-0 CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and genesis
    Init {
        #[arg(long, default_value = "config/dxid.toml")]
        config: PathBuf,
    },
    /// Start node
    Node {
        #[command(subcommand)]
        cmd: NodeCmd,
    },
    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        cmd: WalletCmd,
    },
    /// Transaction operations
    Tx {
        #[command(subcommand)]
        cmd: TxCmd,
    },
}

#[derive(Subcommand)]
enum NodeCmd {
    Start {
        #[arg(long, default_value = "config/dxid.toml")]
        config: PathBuf,
    },
    Status,
}

#[derive(Subcommand)]
enum WalletCmd {
    New {
        #[arg(long, default_value = "default")]
        name: String,
        #[arg(long)]
        password: String,
    },
    List,
}

#[derive(Subcommand)]
enum TxCmd {
    /// Reads a JSON-encoded signed transaction from a file and submits it
    /// to a node's REST endpoint for validation.
    Submit {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        rpc: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init { config } => init_config(config)?,
        Commands::Node { cmd } => match cmd {
            NodeCmd::Start { config } => {
                let rt = Runtime::new()?;
                rt.block_on(async move { run_node(config).await })?;
            }
            NodeCmd::Status => {
                println!("Status endpoint not implemented; query /status REST");
            }
        },
        Commands::Wallet { cmd } => match cmd {
            WalletCmd::New { name, password } => {
                let store = WalletStore::new(wallet_dir()?)?;
                let wallet = store.create(&name, &password)?;
                println!(
                    "Created wallet {} address {}",
                    wallet.name,
                    dxid_crypto::address_to_string(&wallet.address)
                );
            }
            WalletCmd::List => {
                let store = WalletStore::new(wallet_dir()?)?;
                for w in store.list()? {
                    println!(
                        "{} -> {}",
                        w.name,
                        dxid_crypto::address_to_string(&w.address)
                    );
                }
            }
        },
        Commands::Tx { cmd } => match cmd {
            TxCmd::Submit { file, rpc } => {
                let raw = std::fs::read_to_string(&file)?;
                let trx: SignedTransaction = serde_json::from_str(&raw)?;
                let rt = Runtime::new()?;
                rt.block_on(async move { submit_transaction(&rpc, &trx).await })?;
            }
        },
    }
    Ok(())
}

async fn submit_transaction(rpc: &str, trx: &SignedTransaction) -> Result<()> {
    let client = reqwest::Client::new();
    let resp: serde_json::Value = client
        .post(format!("{rpc}/transactions"))
        .json(trx)
        .send()
        .await?
        .json()
        .await?;
    println!("{resp}");
    Ok(())
}

fn init_config(path: PathBuf) -> Result<()> {
    if path.exists() {
        println!("Config already exists at {:?}", path);
        return Ok(());
    }
    let cfg = DxidConfig::example();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(&cfg)?)?;
    println!("Wrote config to {:?}", path);
    Ok(())
}

fn wallet_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .unwrap_or(std::env::temp_dir())
        .join(".dxid")
        .join("wallets");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
