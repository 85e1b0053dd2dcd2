use super::models::{TokenHolder, clamp_limit, key};
use alloy_primitives::Address;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub struct HolderRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> HolderRepository<'a> {
    const UPSERT_HOLDER: &'static str = "INSERT INTO token_holders (
            contract_address, holder_address, balance, balance_scaled, token_name, token_symbol
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(contract_address, holder_address) DO UPDATE SET
            balance = excluded.balance,
            balance_scaled = excluded.balance_scaled,
            token_name = excluded.token_name,
            token_symbol = excluded.token_symbol";

    const COUNT_FOR_CONTRACT: &'static str =
        "SELECT COUNT(*) FROM token_holders WHERE contract_address = ?1";

    const HOLDERS_FOR_CONTRACT: &'static str =
        "SELECT holder_address FROM token_holders WHERE contract_address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, holder: &TokenHolder) -> Result<()> {
        self.conn.execute(
            Self::UPSERT_HOLDER,
            params![
                key(&holder.contract_address),
                key(&holder.holder_address),
                holder.balance.to_string(),
                holder.balance_scaled,
                holder.token_name,
                holder.token_symbol,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, contract: &Address, holder: &Address) -> Result<Option<TokenHolder>> {
        let query = format!(
            "SELECT {} FROM token_holders WHERE contract_address = ?1 AND holder_address = ?2",
            TokenHolder::COLUMNS
        );
        Ok(self
            .conn
            .query_row(
                &query,
                params![key(contract), key(holder)],
                TokenHolder::from_row,
            )
            .optional()?)
    }

    pub fn count_for_contract(&self, contract: &Address) -> Result<u64> {
        Ok(self
            .conn
            .query_row(Self::COUNT_FOR_CONTRACT, params![key(contract)], |row| {
                row.get(0)
            })?)
    }

    /// Every holder address recorded for `contract`, unordered.
    pub fn holders(&self, contract: &Address) -> Result<Vec<Address>> {
        let mut stmt = self.conn.prepare(Self::HOLDERS_FOR_CONTRACT)?;
        let holders = stmt
            .query_map(params![key(contract)], |row| {
                super::models::parse_column(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(holders)
    }

    /// Holders of `contract`, largest raw balance first.
    ///
    /// Balances are stored as decimal text, so ordering is by length and
    /// then lexically, which matches numeric order for unpadded integers.
    pub fn for_contract(
        &self,
        contract: &Address,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<TokenHolder>> {
        let query = format!(
            "SELECT {} FROM token_holders WHERE contract_address = ?1
             ORDER BY LENGTH(balance) DESC, balance DESC, holder_address
             LIMIT ?2 OFFSET ?3",
            TokenHolder::COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let holders = stmt
            .query_map(
                params![key(contract), clamp_limit(limit), skip],
                TokenHolder::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(holders)
    }
}
