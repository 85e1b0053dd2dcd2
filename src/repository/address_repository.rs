use super::models::{ActiveAddress, AddressRecord, clamp_limit, key, parse_column};
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct AddressRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> AddressRepository<'a> {
    const UPSERT_ADDRESS: &'static str = "INSERT INTO addresses (
            address, balance_wei, balance_float, balance_display, is_contract, bytecode,
            standards, functions, proxy_target, owner, token_name, token_symbol,
            token_decimals, token_total_supply, holder_count, internal_tx_count,
            last_updated_block
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ON CONFLICT(address) DO UPDATE SET
            balance_wei = excluded.balance_wei,
            balance_float = excluded.balance_float,
            balance_display = excluded.balance_display,
            is_contract = excluded.is_contract,
            bytecode = excluded.bytecode,
            standards = excluded.standards,
            functions = excluded.functions,
            proxy_target = excluded.proxy_target,
            owner = excluded.owner,
            token_name = excluded.token_name,
            token_symbol = excluded.token_symbol,
            token_decimals = excluded.token_decimals,
            token_total_supply = excluded.token_total_supply,
            holder_count = excluded.holder_count,
            internal_tx_count = excluded.internal_tx_count,
            last_updated_block = excluded.last_updated_block";

    const CLEAR_WATERMARK: &'static str =
        "UPDATE addresses SET last_updated_block = NULL WHERE address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, record: &AddressRecord) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_ADDRESS,
            params![
                key(&record.address),
                record.balance_wei.to_string(),
                record.balance_float,
                record.balance_display,
                record.is_contract,
                record.bytecode,
                serde_json::to_string(&record.standards)?,
                serde_json::to_string(&record.functions)?,
                record.proxy_target.as_ref().map(key),
                record.owner.as_ref().map(key),
                record.token_name,
                record.token_symbol,
                record.token_decimals,
                record.token_total_supply,
                record.holder_count,
                record.internal_tx_count,
                record.last_updated_block,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, address: &Address) -> Result<Option<AddressRecord>> {
        let query = format!(
            "SELECT {} FROM addresses WHERE address = ?1",
            AddressRecord::COLUMNS
        );
        Ok(self
            .conn
            .query_row(&query, params![key(address)], AddressRecord::from_row)
            .optional()?)
    }

    /// Forces the next update to rescan transfers from the deployment block.
    pub fn clear_watermark(&self, address: &Address) -> Result<usize> {
        Ok(self
            .conn
            .execute(Self::CLEAR_WATERMARK, params![key(address)])?)
    }

    /// Addresses ordered by native balance, richest first.
    pub fn rich_list(&self, skip: usize, limit: usize) -> Result<Vec<AddressRecord>> {
        let query = format!(
            "SELECT {} FROM addresses ORDER BY balance_float DESC LIMIT ?1 OFFSET ?2",
            AddressRecord::COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let records = stmt
            .query_map(params![clamp_limit(limit), skip], AddressRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Which half of the active-address index an updater cadence walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSubset {
    Plain,
    Contracts,
}

impl AddressSubset {
    pub fn watermark_key(&self) -> &'static str {
        match self {
            AddressSubset::Plain => "token_updater.plain.touched_at",
            AddressSubset::Contracts => "token_updater.contracts.touched_at",
        }
    }

    fn filter(&self) -> &'static str {
        match self {
            AddressSubset::Plain => {
                "a.contract_hint = 0 AND COALESCE(r.is_contract, 0) = 0"
            }
            AddressSubset::Contracts => "(a.contract_hint = 1 OR r.is_contract = 1)",
        }
    }
}

pub struct ActivityRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> ActivityRepository<'a> {
    // touched_at is strictly increasing across writes so a watermark taken
    // from it can never skip a later touch landing in the same millisecond.
    const TOUCH: &'static str = "INSERT INTO active_addresses (address, contract_hint, touched_at)
        VALUES (?1, ?2, MAX(?3, (SELECT COALESCE(MAX(touched_at), 0) + 1 FROM active_addresses)))
        ON CONFLICT(address) DO UPDATE SET
            contract_hint = MAX(active_addresses.contract_hint, excluded.contract_hint),
            touched_at = excluded.touched_at";

    const GET_STATE: &'static str = "SELECT value FROM sync_state WHERE key = ?1";

    const SET_STATE: &'static str = "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn touch(&self, address: &Address, contract_hint: bool, now_millis: u64) -> Result<()> {
        self.conn
            .execute(Self::TOUCH, params![key(address), contract_hint, now_millis])?;
        Ok(())
    }

    pub fn get(&self, address: &Address) -> Result<Option<ActiveAddress>> {
        Ok(self
            .conn
            .query_row(
                "SELECT address, contract_hint, touched_at FROM active_addresses WHERE address = ?1",
                params![key(address)],
                Self::row_to_active,
            )
            .optional()?)
    }

    /// Active addresses of `subset` touched after `watermark`, oldest first.
    pub fn touched_since(
        &self,
        subset: AddressSubset,
        watermark: u64,
        limit: usize,
    ) -> Result<Vec<ActiveAddress>> {
        let query = format!(
            "SELECT a.address, a.contract_hint, a.touched_at
             FROM active_addresses a
             LEFT JOIN addresses r ON r.address = a.address
             WHERE a.touched_at > ?1 AND {}
             ORDER BY a.touched_at ASC
             LIMIT ?2",
            subset.filter()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt
            .query_map(params![watermark, limit], Self::row_to_active)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_watermark(&self, name: &str) -> Result<u64> {
        let raw: Option<String> = self
            .conn
            .query_row(Self::GET_STATE, params![name], |row| row.get(0))
            .optional()?;
        match raw {
            Some(value) => Ok(value.parse()?),
            None => Ok(0),
        }
    }

    pub fn set_watermark(&self, name: &str, value: u64) -> Result<()> {
        self.conn
            .execute(Self::SET_STATE, params![name, value.to_string()])?;
        Ok(())
    }

    fn row_to_active(row: &rusqlite::Row) -> rusqlite::Result<ActiveAddress> {
        Ok(ActiveAddress {
            address: parse_column(row, 0)?,
            contract_hint: row.get(1)?,
            touched_at: row.get(2)?,
        })
    }
}
