use crate::repository::{
    AddressRecord, Block, InternalTransaction, StatsSnapshot, TokenHolder, Transaction,
};
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_string(wtr: Writer<Vec<u8>>) -> String {
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or("N/A".to_string(), |v| v.to_string())
}

/// Renders `(metric, value)` pairs in any format.
fn format_pairs(pairs: &[(&str, String)], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = table(vec!["Field", "Value"]);
            for (field, value) in pairs {
                table.add_row(vec![Cell::new(field), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let object: serde_json::Map<String, serde_json::Value> = pairs
                .iter()
                .map(|(field, value)| (field.to_string(), json!(value)))
                .collect();
            serde_json::to_string_pretty(&object).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["field", "value"]);
            for (field, value) in pairs {
                let _ = wtr.write_record([*field, value.as_str()]);
            }
            csv_string(wtr)
        }
    }
}

pub fn format_block(block: &Block, format: &OutputFormat) -> String {
    format_pairs(
        &[
            ("number", block.number.to_string()),
            ("hash", format!("{:?}", block.hash)),
            ("parent_hash", format!("{:?}", block.parent_hash)),
            ("miner", format!("{:?}", block.miner)),
            ("timestamp", block.timestamp.to_string()),
            ("tx_count", block.tx_count.to_string()),
            ("gas_used", block.gas_used.to_string()),
            ("gas_limit", block.gas_limit.to_string()),
            ("base_fee_per_gas", or_na(block.base_fee_per_gas)),
            ("burned_fees", or_na(block.burned_fees)),
            ("cumulative_fees_burned", or_na(block.cumulative_fees_burned)),
            ("extra_data", block.extra_data.clone()),
        ],
        format,
    )
}

pub fn format_transaction(tx: &Transaction, format: &OutputFormat) -> String {
    format_pairs(
        &[
            ("hash", format!("{:?}", tx.hash)),
            ("block_number", tx.block_number.to_string()),
            ("block_hash", format!("{:?}", tx.block_hash)),
            ("from", format!("{:?}", tx.from_address)),
            ("to", or_na(tx.to_address.map(|a| format!("{a:?}")))),
            (
                "contract_address",
                or_na(tx.contract_address.map(|a| format!("{a:?}"))),
            ),
            ("status", or_na(tx.status)),
            ("value", tx.value.to_string()),
            ("gas_price", tx.gas_price.to_string()),
            ("gas_limit", tx.gas_limit.to_string()),
            ("gas_fee", tx.gas_fee.to_string()),
            ("nonce", tx.nonce.to_string()),
            ("timestamp", tx.timestamp.to_string()),
            ("input", tx.input.clone()),
        ],
        format,
    )
}

pub fn format_transactions(transactions: &[Transaction], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if transactions.is_empty() {
                return "No transactions found.".to_string();
            }
            let mut table = table(vec!["Block", "From", "To", "Value (Wei)", "Tx Hash"]);
            for tx in transactions {
                let to = tx.to_address.or(tx.contract_address);
                table.add_row(vec![
                    Cell::new(tx.block_number),
                    Cell::new(format!("{:#}", tx.from_address)),
                    Cell::new(to.map_or("(creation)".to_string(), |a| format!("{a:#}"))),
                    Cell::new(tx.value.to_string()),
                    Cell::new(format_tx_hash(&format!("{:?}", tx.hash))),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(transactions).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "block_number",
                "hash",
                "from",
                "to",
                "contract_address",
                "value",
                "gas_fee",
                "timestamp",
            ]);
            for tx in transactions {
                let _ = wtr.write_record([
                    &tx.block_number.to_string(),
                    &format!("{:?}", tx.hash),
                    &format!("{:?}", tx.from_address),
                    &tx.to_address.map(|a| format!("{a:?}")).unwrap_or_default(),
                    &tx.contract_address
                        .map(|a| format!("{a:?}"))
                        .unwrap_or_default(),
                    &tx.value.to_string(),
                    &tx.gas_fee.to_string(),
                    &tx.timestamp.to_string(),
                ]);
            }
            csv_string(wtr)
        }
    }
}

pub fn format_address(record: &AddressRecord, format: &OutputFormat) -> String {
    let mut pairs = vec![
        ("address", format!("{:?}", record.address)),
        ("balance", record.balance_display.clone()),
        ("balance_wei", record.balance_wei.to_string()),
        ("is_contract", record.is_contract.to_string()),
        ("last_updated_block", or_na(record.last_updated_block)),
    ];
    if record.is_contract {
        pairs.push(("standards", record.standards.join(",")));
        pairs.push((
            "proxy_target",
            or_na(record.proxy_target.map(|a| format!("{a:?}"))),
        ));
        pairs.push(("owner", or_na(record.owner.map(|a| format!("{a:?}")))));
    }
    if record.is_token() {
        pairs.push(("token_name", or_na(record.token_name.clone())));
        pairs.push(("token_symbol", or_na(record.token_symbol.clone())));
        pairs.push(("token_decimals", or_na(record.token_decimals)));
        pairs.push(("token_total_supply", or_na(record.token_total_supply.clone())));
        pairs.push(("holder_count", record.holder_count.to_string()));
        pairs.push(("internal_tx_count", record.internal_tx_count.to_string()));
    }
    format_pairs(&pairs, format)
}

pub fn format_holders(holders: &[TokenHolder], skip: usize, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if holders.is_empty() {
                return "No holders found.".to_string();
            }
            let mut table = table(vec!["Rank", "Address", "Balance", "Balance (Raw)"]);
            for (i, holder) in holders.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(skip + i + 1),
                    Cell::new(format!("{:#}", holder.holder_address)),
                    Cell::new(&holder.balance_scaled),
                    Cell::new(holder.balance.to_string()),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_holders: Vec<_> = holders
                .iter()
                .enumerate()
                .map(|(i, holder)| {
                    json!({
                        "rank": skip + i + 1,
                        "address": holder.holder_address,
                        "balance": holder.balance_scaled,
                        "balance_raw": holder.balance.to_string(),
                        "token_symbol": holder.token_symbol,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_holders).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["rank", "address", "balance", "balance_raw"]);
            for (i, holder) in holders.iter().enumerate() {
                let _ = wtr.write_record([
                    &(skip + i + 1).to_string(),
                    &format!("{:?}", holder.holder_address),
                    &holder.balance_scaled,
                    &holder.balance.to_string(),
                ]);
            }
            csv_string(wtr)
        }
    }
}

/// Decoded transfers of one contract. Fungible values are scaled by
/// `decimals`; non-fungible transfers show their token id.
pub fn format_internal_transactions(
    events: &[InternalTransaction],
    decimals: Option<u8>,
    format: &OutputFormat,
) -> String {
    let decimals = decimals.unwrap_or(0);
    let amount = |event: &InternalTransaction| match event.token_id {
        Some(id) => format!("#{id}"),
        None => format_units(event.value, decimals).unwrap_or_else(|_| event.value.to_string()),
    };

    match format {
        OutputFormat::Table => {
            if events.is_empty() {
                return "No transfers found.".to_string();
            }
            let mut table = table(vec!["Block", "From", "To", "Value", "Tx Hash"]);
            for event in events {
                table.add_row(vec![
                    Cell::new(event.block_number),
                    Cell::new(format!("{:#}", event.from_address)),
                    Cell::new(format!("{:#}", event.to_address)),
                    Cell::new(amount(event)),
                    Cell::new(format_tx_hash(&format!("{:?}", event.transaction_hash))),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_events: Vec<_> = events
                .iter()
                .map(|event| {
                    json!({
                        "block_number": event.block_number,
                        "transaction_hash": format!("{:?}", event.transaction_hash),
                        "log_index": event.log_index,
                        "from": format!("{:?}", event.from_address),
                        "to": format!("{:?}", event.to_address),
                        "value": amount(event),
                        "value_raw": event.value.to_string(),
                        "token_id": event.token_id.map(|id| id.to_string()),
                        "timestamp": event.timestamp,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_events).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "block_number",
                "from",
                "to",
                "value",
                "value_raw",
                "transaction_hash",
                "log_index",
            ]);
            for event in events {
                let _ = wtr.write_record([
                    &event.block_number.to_string(),
                    &format!("{:?}", event.from_address),
                    &format!("{:?}", event.to_address),
                    &amount(event),
                    &event.value.to_string(),
                    &format!("{:?}", event.transaction_hash),
                    &event.log_index.to_string(),
                ]);
            }
            csv_string(wtr)
        }
    }
}

pub fn format_rich_list(records: &[AddressRecord], skip: usize, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if records.is_empty() {
                return "No addresses found.".to_string();
            }
            let mut table = table(vec!["Rank", "Address", "Balance", "Contract"]);
            for (i, record) in records.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(skip + i + 1),
                    Cell::new(format!("{:#}", record.address)),
                    Cell::new(&record.balance_display),
                    Cell::new(if record.is_contract { "yes" } else { "" }),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_records: Vec<_> = records
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    json!({
                        "rank": skip + i + 1,
                        "address": record.address,
                        "balance": record.balance_display,
                        "balance_wei": record.balance_wei.to_string(),
                        "is_contract": record.is_contract,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_records).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["rank", "address", "balance", "balance_wei", "is_contract"]);
            for (i, record) in records.iter().enumerate() {
                let _ = wtr.write_record([
                    &(skip + i + 1).to_string(),
                    &format!("{:?}", record.address),
                    &record.balance_display,
                    &record.balance_wei.to_string(),
                    &record.is_contract.to_string(),
                ]);
            }
            csv_string(wtr)
        }
    }
}

pub fn format_stats(snapshot: Option<&StatsSnapshot>, format: &OutputFormat) -> String {
    let Some(stats) = snapshot else {
        return match format {
            OutputFormat::Json => "null".to_string(),
            _ => "No stats recorded yet.".to_string(),
        };
    };
    format_pairs(
        &[
            ("total_txs", stats.total_txs.to_string()),
            ("weekly_txs", stats.weekly_txs.to_string()),
            ("daily_txs", stats.daily_txs.to_string()),
            ("created_at", stats.created_at.to_string()),
        ],
        format,
    )
}

fn format_tx_hash(hash: &str) -> String {
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, U256};

    fn holder(byte: u8, balance: u64) -> TokenHolder {
        TokenHolder {
            contract_address: Address::repeat_byte(0xc1),
            holder_address: Address::repeat_byte(byte),
            balance: U256::from(balance),
            balance_scaled: format_units(U256::from(balance), 2).unwrap(),
            token_name: "Test".to_string(),
            token_symbol: "TST".to_string(),
        }
    }

    #[test]
    fn output_format_defaults_to_table() {
        assert!(matches!(OutputFormat::from("JSON"), OutputFormat::Json));
        assert!(matches!(OutputFormat::from("csv"), OutputFormat::Csv));
        assert!(matches!(OutputFormat::from("yaml"), OutputFormat::Table));
    }

    #[test]
    fn holders_csv_ranks_continue_after_skip() {
        let csv = format_holders(&[holder(1, 500), holder(2, 250)], 10, &OutputFormat::Csv);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "rank,address,balance,balance_raw");
        assert!(lines[1].starts_with("11,0x0101"));
        assert!(lines[1].ends_with(",5.00,500"));
        assert!(lines[2].starts_with("12,"));
    }

    #[test]
    fn stats_json_is_an_object() {
        let snapshot = StatsSnapshot {
            total_txs: 10,
            weekly_txs: 4,
            daily_txs: 1,
            created_at: 1_700_000_000,
        };
        let value: serde_json::Value =
            serde_json::from_str(&format_stats(Some(&snapshot), &OutputFormat::Json)).unwrap();
        assert_eq!(value["total_txs"], "10");
        assert_eq!(value["daily_txs"], "1");
        assert_eq!(format_stats(None, &OutputFormat::Json), "null");
    }

    #[test]
    fn non_fungible_transfers_show_token_id() {
        let event = InternalTransaction {
            transaction_hash: B256::repeat_byte(0xaa),
            log_index: 0,
            contract_address: Address::repeat_byte(0xc1),
            from_address: Address::ZERO,
            to_address: Address::repeat_byte(0x01),
            value: U256::from(1),
            token_id: Some(U256::from(77)),
            block_number: 5,
            timestamp: None,
        };
        let csv = format_internal_transactions(&[event], Some(18), &OutputFormat::Csv);
        assert!(csv.lines().nth(1).unwrap().contains(",#77,"));
    }
}
