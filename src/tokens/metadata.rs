use crate::chain::ChainSource;
use crate::events::{
    balanceOfCall, decimalsCall, implementationCall, nameCall, ownerCall, symbolCall,
    totalSupplyCall,
};
use crate::repository::MISSING;
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, U256};
use anyhow::Result;
use tracing::{debug, warn};

/// Token accessors with sentinels in place of anything that reverted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDetails {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

/// Read-only call of `call` on `address`, decoded with its ABI.
pub async fn call_contract<C, T>(chain: &C, address: Address, call: T) -> Result<T::Return>
where
    C: ChainSource + ?Sized,
    T: SolCall,
{
    let output = chain.call(address, call.abi_encode().into()).await?;
    Ok(T::abi_decode_returns(&output)?)
}

/// Queries name, symbol, decimals and totalSupply one by one. Never fails:
/// each accessor that errors falls back to its sentinel on its own.
pub async fn token_details<C: ChainSource + ?Sized>(chain: &C, address: Address) -> TokenDetails {
    let name = match call_contract(chain, address, nameCall {}).await {
        Ok(name) => name,
        Err(e) => {
            warn!("Failed to fetch token name of {:?}: {}", address, e);
            MISSING.to_string()
        }
    };

    let symbol = match call_contract(chain, address, symbolCall {}).await {
        Ok(symbol) => symbol,
        Err(e) => {
            warn!("Failed to fetch token symbol of {:?}: {}", address, e);
            MISSING.to_string()
        }
    };

    let decimals = match call_contract(chain, address, decimalsCall {}).await {
        Ok(decimals) => decimals,
        Err(e) => {
            debug!("Token {:?} has no decimals(): {}", address, e);
            0
        }
    };

    let total_supply = match call_contract(chain, address, totalSupplyCall {}).await {
        Ok(supply) => supply,
        Err(e) => {
            warn!("Failed to fetch total supply of {:?}: {}", address, e);
            U256::ZERO
        }
    };

    TokenDetails {
        name,
        symbol,
        decimals,
        total_supply,
    }
}

pub async fn proxy_target<C: ChainSource + ?Sized>(chain: &C, address: Address) -> Option<Address> {
    call_contract(chain, address, implementationCall {})
        .await
        .inspect_err(|e| debug!("implementation() failed on {:?}: {}", address, e))
        .ok()
}

pub async fn owner<C: ChainSource + ?Sized>(chain: &C, address: Address) -> Option<Address> {
    call_contract(chain, address, ownerCall {})
        .await
        .inspect_err(|e| debug!("owner() failed on {:?}: {}", address, e))
        .ok()
}

pub async fn balance_of<C: ChainSource + ?Sized>(
    chain: &C,
    contract: Address,
    holder: Address,
) -> Result<U256> {
    call_contract(chain, contract, balanceOfCall { owner: holder }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChain;

    #[tokio::test]
    async fn returns_real_metadata_when_accessors_answer() {
        let chain = MockChain::default();
        let token = Address::repeat_byte(0x70);
        chain.respond(token, nameCall {}, "Wrapped Ether".to_string());
        chain.respond(token, symbolCall {}, "WETH".to_string());
        chain.respond(token, decimalsCall {}, U256::from(18u64));
        chain.respond(token, totalSupplyCall {}, U256::from(1_000u64));

        let details = token_details(&chain, token).await;
        assert_eq!(
            details,
            TokenDetails {
                name: "Wrapped Ether".to_string(),
                symbol: "WETH".to_string(),
                decimals: 18,
                total_supply: U256::from(1_000u64),
            }
        );
    }

    #[tokio::test]
    async fn each_reverting_accessor_gets_its_own_sentinel() {
        let chain = MockChain::default();
        let token = Address::repeat_byte(0x71);
        chain.respond(token, nameCall {}, "Half".to_string());
        chain.respond(token, decimalsCall {}, U256::from(6u64));

        let details = token_details(&chain, token).await;
        assert_eq!(details.name, "Half");
        assert_eq!(details.symbol, MISSING);
        assert_eq!(details.decimals, 6);
        assert_eq!(details.total_supply, U256::ZERO);
    }

    #[tokio::test]
    async fn resolves_owner_and_proxy_target() {
        let chain = MockChain::default();
        let contract = Address::repeat_byte(0x72);
        let admin = Address::repeat_byte(0xad);
        let implementation = Address::repeat_byte(0x1a);
        chain.respond(contract, ownerCall {}, admin);
        chain.respond(contract, implementationCall {}, implementation);

        assert_eq!(owner(&chain, contract).await, Some(admin));
        assert_eq!(proxy_target(&chain, contract).await, Some(implementation));
        assert_eq!(owner(&chain, Address::repeat_byte(0x01)).await, None);
    }

    #[tokio::test]
    async fn balance_of_decodes_uint() {
        let chain = MockChain::default();
        let token = Address::repeat_byte(0x73);
        let holder = Address::repeat_byte(0x11);
        chain.respond(token, balanceOfCall { owner: holder }, U256::from(42u64));

        assert_eq!(
            balance_of(&chain, token, holder).await.unwrap(),
            U256::from(42u64)
        );
        assert!(
            balance_of(&chain, token, Address::repeat_byte(0x12))
                .await
                .is_err()
        );
    }
}
