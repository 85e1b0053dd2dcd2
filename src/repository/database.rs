use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Shared handle to the store.
///
/// Every worker holds a clone. Access goes through [`Database::with`], which
/// runs a synchronous closure under the connection lock, so no guard can be
/// held across an `.await`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;

        create_tables(&conn).context("Failed to create schema")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))?;
        f(&conn)
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS blocks (
            number INTEGER PRIMARY KEY,
            hash TEXT NOT NULL,
            parent_hash TEXT NOT NULL,
            miner TEXT NOT NULL,
            gas_used INTEGER NOT NULL,
            gas_limit INTEGER NOT NULL,
            base_fee_per_gas INTEGER,
            tx_count INTEGER NOT NULL,
            extra_data TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            burned_fees TEXT,
            cumulative_fees_burned TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_blocks_hash ON blocks(hash);

        CREATE TABLE IF NOT EXISTS transactions (
            hash TEXT PRIMARY KEY,
            block_number INTEGER NOT NULL,
            block_hash TEXT NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT,
            contract_address TEXT,
            status INTEGER,
            value TEXT NOT NULL,
            gas_price TEXT NOT NULL,
            gas_limit INTEGER NOT NULL,
            gas_fee TEXT NOT NULL,
            nonce INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            input TEXT NOT NULL,
            input_empty INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_block_number
            ON transactions(block_number);
        CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions(from_address);
        CREATE INDEX IF NOT EXISTS idx_transactions_to ON transactions(to_address);
        CREATE INDEX IF NOT EXISTS idx_transactions_contract
            ON transactions(contract_address);
        CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp);

        CREATE TABLE IF NOT EXISTS addresses (
            address TEXT PRIMARY KEY,
            balance_wei TEXT NOT NULL,
            balance_float REAL NOT NULL,
            balance_display TEXT NOT NULL,
            is_contract INTEGER NOT NULL,
            bytecode TEXT,
            standards TEXT NOT NULL,
            functions TEXT NOT NULL,
            proxy_target TEXT,
            owner TEXT,
            token_name TEXT,
            token_symbol TEXT,
            token_decimals INTEGER,
            token_total_supply TEXT,
            holder_count INTEGER NOT NULL,
            internal_tx_count INTEGER NOT NULL,
            last_updated_block INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_addresses_balance ON addresses(balance_float);

        CREATE TABLE IF NOT EXISTS token_holders (
            contract_address TEXT NOT NULL,
            holder_address TEXT NOT NULL,
            balance TEXT NOT NULL,
            balance_scaled TEXT NOT NULL,
            token_name TEXT NOT NULL,
            token_symbol TEXT NOT NULL,
            PRIMARY KEY (contract_address, holder_address)
        );
        CREATE INDEX IF NOT EXISTS idx_token_holders_holder
            ON token_holders(holder_address);

        CREATE TABLE IF NOT EXISTS internal_transactions (
            transaction_hash TEXT NOT NULL,
            log_index INTEGER NOT NULL,
            contract_address TEXT NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT NOT NULL,
            value TEXT NOT NULL,
            token_id TEXT,
            block_number INTEGER NOT NULL,
            timestamp INTEGER,
            PRIMARY KEY (transaction_hash, log_index)
        );
        CREATE INDEX IF NOT EXISTS idx_internal_transactions_contract
            ON internal_transactions(contract_address, block_number);

        CREATE TABLE IF NOT EXISTS stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            total_txs INTEGER NOT NULL,
            weekly_txs INTEGER NOT NULL,
            daily_txs INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS active_addresses (
            address TEXT PRIMARY KEY,
            contract_hint INTEGER NOT NULL,
            touched_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_active_addresses_touched
            ON active_addresses(touched_at);

        CREATE TABLE IF NOT EXISTS sync_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    Ok(())
}
