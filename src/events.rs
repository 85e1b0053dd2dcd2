use crate::chain::ChainLog;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);

    function balanceOf(address owner) external view returns (uint256);
    function decimals() external view returns (uint8);
    function symbol() external view returns (string);
    function name() external view returns (string);
    function totalSupply() external view returns (uint256);
    function owner() external view returns (address);
    function implementation() external view returns (address);
}

pub mod erc721 {
    alloy::sol! {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

/// keccak256("Transfer(address,address,uint256)"), shared by fungible and
/// non-fungible transfers.
pub const TRANSFER_TOPIC: B256 = Transfer::SIGNATURE_HASH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferKind {
    /// topic0 + from + to, value in the body.
    Fungible { value: U256 },
    /// topic0 + from + to + tokenId, empty body.
    NonFungible { token_id: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub contract_address: Address,
    pub transaction_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub kind: TransferKind,
}

impl TokenTransfer {
    /// Amount moved: the value for fungible transfers, one unit for NFTs.
    pub fn amount(&self) -> U256 {
        match self.kind {
            TransferKind::Fungible { value } => value,
            TransferKind::NonFungible { .. } => U256::from(1),
        }
    }

    pub fn token_id(&self) -> Option<U256> {
        match self.kind {
            TransferKind::Fungible { .. } => None,
            TransferKind::NonFungible { token_id } => Some(token_id),
        }
    }
}

/// Decodes a Transfer log by its indexed-topic layout.
pub fn decode_transfer_event(log: &ChainLog) -> Result<TokenTransfer> {
    if log.topics.first() != Some(&TRANSFER_TOPIC) {
        anyhow::bail!("log is not a Transfer event");
    }

    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| anyhow::anyhow!("log has no transaction hash"))?;
    let log_index = log
        .log_index
        .ok_or_else(|| anyhow::anyhow!("log has no log index"))?;
    let block_number = log
        .block_number
        .ok_or_else(|| anyhow::anyhow!("log has no block number"))?;

    let (from, to, kind) = match log.topics.len() {
        3 => {
            let decoded = Transfer::decode_raw_log(log.topics.iter().copied(), &log.data)?;
            (
                decoded.from,
                decoded.to,
                TransferKind::Fungible {
                    value: decoded.value,
                },
            )
        }
        4 => {
            if !log.data.is_empty() {
                anyhow::bail!("non-fungible Transfer carries unexpected body data");
            }
            let decoded = erc721::Transfer::decode_raw_log(log.topics.iter().copied(), &log.data)?;
            (
                decoded.from,
                decoded.to,
                TransferKind::NonFungible {
                    token_id: decoded.tokenId,
                },
            )
        }
        n => anyhow::bail!("unexpected Transfer topic count {n}"),
    };

    Ok(TokenTransfer {
        contract_address: log.address,
        transaction_hash,
        log_index,
        block_number,
        from,
        to,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, address, b256};

    fn topic_for(address: Address) -> B256 {
        address.into_word()
    }

    fn log(topics: Vec<B256>, data: Bytes) -> ChainLog {
        ChainLog {
            address: address!("0x00000000000000000000000000000000000000aa"),
            topics,
            data,
            block_number: Some(42),
            transaction_hash: Some(b256!(
                "0x1111111111111111111111111111111111111111111111111111111111111111"
            )),
            log_index: Some(3),
        }
    }

    #[test]
    fn transfer_topic_matches_known_hash() {
        assert_eq!(
            TRANSFER_TOPIC,
            b256!("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
        );
        assert_eq!(erc721::Transfer::SIGNATURE_HASH, TRANSFER_TOPIC);
    }

    #[test]
    fn decodes_fungible_transfer() {
        let from = address!("0x70997970c51812dc3a010c7d01b50e0d17dc79c8");
        let to = address!("0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc");
        let value = U256::from(1_000_000u64);
        let entry = log(
            vec![TRANSFER_TOPIC, topic_for(from), topic_for(to)],
            Bytes::from(value.to_be_bytes::<32>().to_vec()),
        );

        let transfer = decode_transfer_event(&entry).unwrap();
        assert_eq!(transfer.from, from);
        assert_eq!(transfer.to, to);
        assert_eq!(transfer.kind, TransferKind::Fungible { value });
        assert_eq!(transfer.block_number, 42);
        assert_eq!(transfer.log_index, 3);
    }

    #[test]
    fn decodes_non_fungible_transfer() {
        let from = Address::ZERO;
        let to = address!("0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc");
        let token_id = U256::from(77u64);
        let entry = log(
            vec![
                TRANSFER_TOPIC,
                topic_for(from),
                topic_for(to),
                B256::from(token_id),
            ],
            Bytes::new(),
        );

        let transfer = decode_transfer_event(&entry).unwrap();
        assert_eq!(transfer.token_id(), Some(token_id));
        assert_eq!(transfer.amount(), U256::from(1));
    }

    #[test]
    fn rejects_malformed_layouts() {
        let only_topic = log(vec![TRANSFER_TOPIC], Bytes::new());
        assert!(decode_transfer_event(&only_topic).is_err());

        let other_event = log(vec![B256::ZERO, B256::ZERO, B256::ZERO], Bytes::new());
        assert!(decode_transfer_event(&other_event).is_err());

        let short_body = log(
            vec![TRANSFER_TOPIC, B256::ZERO, B256::ZERO],
            Bytes::from(vec![1u8; 4]),
        );
        assert!(decode_transfer_event(&short_body).is_err());
    }
}
