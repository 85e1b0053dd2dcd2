use anyhow::Result;
use chain_mirror::classifier::ClassifierCache;
use chain_mirror::config::Config;
use chain_mirror::query::commands::{
    AddressQuery, Page, cmd_address, cmd_block, cmd_holders, cmd_reimport_block,
    cmd_reimport_contract, cmd_reimport_tx, cmd_rich_list, cmd_stats, cmd_transfers, cmd_tx,
};
use chain_mirror::query::formatters::OutputFormat;
use chain_mirror::repository::Database;
use chain_mirror::rpc::RpcClient;
use chain_mirror::syncer::ChainSyncer;
use chain_mirror::tokens::{TokenUpdater, UpdaterSettings};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query and repair the mirrored chain data", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a stored block by number or hash
    Block {
        block: String,
        #[arg(long, default_value = "false")]
        txs: bool,
    },
    /// Show a stored transaction
    Tx {
        hash: String,
    },
    /// Show an address record and its transactions
    Address {
        address: String,
        #[arg(long)]
        from_timestamp: Option<u64>,
        #[arg(long)]
        to_timestamp: Option<u64>,
        #[arg(long, default_value = "100")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// List token holders of a contract, largest balance first
    Holders {
        contract: String,
        #[arg(long, default_value = "100")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// List decoded transfers of a token contract, newest first
    Transfers {
        contract: String,
        #[arg(long, default_value = "100")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// List addresses by native balance
    RichList {
        #[arg(long, default_value = "10")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show the latest transaction count snapshot
    Stats,
    /// Delete a block and its transactions, then import them again
    ReimportBlock {
        block: String,
    },
    /// Reimport the block containing a stored transaction
    ReimportTx {
        hash: String,
    },
    /// Rescan a contract's transfers from its deployment
    ReimportContract {
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url)?;

    match cli.command {
        Commands::Block { block, txs } => cmd_block(&db, &block, txs, &format)?,
        Commands::Tx { hash } => cmd_tx(&db, &hash, &format)?,
        Commands::Address {
            address,
            from_timestamp,
            to_timestamp,
            limit,
            offset,
        } => {
            let query = AddressQuery {
                address,
                from_timestamp,
                to_timestamp,
                skip: offset,
                limit,
            };
            cmd_address(&db, query, &format)?;
        }
        Commands::Holders {
            contract,
            limit,
            offset,
        } => cmd_holders(&db, &contract, Page { skip: offset, limit }, &format)?,
        Commands::Transfers {
            contract,
            limit,
            offset,
        } => cmd_transfers(&db, &contract, Page { skip: offset, limit }, &format)?,
        Commands::RichList { limit, offset } => {
            cmd_rich_list(&db, Page { skip: offset, limit }, &format)?
        }
        Commands::Stats => cmd_stats(&db, &format)?,
        Commands::ReimportBlock { block } => {
            let syncer = syncer(&config, db)?;
            cmd_reimport_block(&syncer, &block, &format).await?;
        }
        Commands::ReimportTx { hash } => {
            let syncer = syncer(&config, db)?;
            cmd_reimport_tx(&syncer, &hash, &format).await?;
        }
        Commands::ReimportContract { address } => {
            let client = Arc::new(RpcClient::new(
                &config.json_rpc_urls,
                config.rpc_max_retries,
            )?);
            let updater = TokenUpdater::new(
                client,
                db,
                Arc::new(ClassifierCache::new()),
                UpdaterSettings::from(&config),
            );
            cmd_reimport_contract(&updater, &address, &format).await?;
        }
    }

    Ok(())
}

fn syncer(config: &Config, db: Database) -> Result<ChainSyncer<RpcClient>> {
    let client = RpcClient::new(&config.json_rpc_urls, config.rpc_max_retries)?;
    Ok(ChainSyncer::new(Arc::new(client), db))
}
