//! Known function signatures and the standards built from them.
//!
//! Signatures are canonical (no spaces, no parameter names) so their
//! keccak256 prefix is the on-chain selector.

pub const TOTAL_SUPPLY: &str = "totalSupply()";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const TRANSFER: &str = "transfer(address,uint256)";
pub const TRANSFER_FROM: &str = "transferFrom(address,address,uint256)";
pub const APPROVE: &str = "approve(address,uint256)";
pub const ALLOWANCE: &str = "allowance(address,address)";
pub const NAME: &str = "name()";
pub const SYMBOL: &str = "symbol()";
pub const DECIMALS: &str = "decimals()";

pub const OWNER_OF: &str = "ownerOf(uint256)";
pub const GET_APPROVED: &str = "getApproved(uint256)";
pub const SET_APPROVAL_FOR_ALL: &str = "setApprovalForAll(address,bool)";
pub const IS_APPROVED_FOR_ALL: &str = "isApprovedForAll(address,address)";
pub const SAFE_TRANSFER_FROM: &str = "safeTransferFrom(address,address,uint256)";
pub const SAFE_TRANSFER_FROM_DATA: &str = "safeTransferFrom(address,address,uint256,bytes)";
pub const TOKEN_URI: &str = "tokenURI(uint256)";
pub const TOKEN_OF_OWNER_BY_INDEX: &str = "tokenOfOwnerByIndex(address,uint256)";
pub const TOKEN_BY_INDEX: &str = "tokenByIndex(uint256)";

pub const BALANCE_OF_ID: &str = "balanceOf(address,uint256)";
pub const BALANCE_OF_BATCH: &str = "balanceOfBatch(address[],uint256[])";
pub const SAFE_TRANSFER_FROM_ID: &str = "safeTransferFrom(address,address,uint256,uint256,bytes)";
pub const SAFE_BATCH_TRANSFER_FROM: &str =
    "safeBatchTransferFrom(address,address,uint256[],uint256[],bytes)";
pub const URI: &str = "uri(uint256)";

pub const SUPPORTS_INTERFACE: &str = "supportsInterface(bytes4)";

pub const OWNER: &str = "owner()";
pub const TRANSFER_OWNERSHIP: &str = "transferOwnership(address)";
pub const RENOUNCE_OWNERSHIP: &str = "renounceOwnership()";

pub const PAUSE: &str = "pause()";
pub const UNPAUSE: &str = "unpause()";
pub const PAUSED: &str = "paused()";

pub const BURN: &str = "burn(uint256)";
pub const BURN_FROM: &str = "burnFrom(address,uint256)";
pub const MINT: &str = "mint(address,uint256)";

pub const IMPLEMENTATION: &str = "implementation()";
pub const UPGRADE_TO: &str = "upgradeTo(address)";
pub const UPGRADE_TO_AND_CALL: &str = "upgradeToAndCall(address,bytes)";

pub const FUNCTIONS: &[&str] = &[
    TOTAL_SUPPLY,
    BALANCE_OF,
    TRANSFER,
    TRANSFER_FROM,
    APPROVE,
    ALLOWANCE,
    NAME,
    SYMBOL,
    DECIMALS,
    OWNER_OF,
    GET_APPROVED,
    SET_APPROVAL_FOR_ALL,
    IS_APPROVED_FOR_ALL,
    SAFE_TRANSFER_FROM,
    SAFE_TRANSFER_FROM_DATA,
    TOKEN_URI,
    TOKEN_OF_OWNER_BY_INDEX,
    TOKEN_BY_INDEX,
    BALANCE_OF_ID,
    BALANCE_OF_BATCH,
    SAFE_TRANSFER_FROM_ID,
    SAFE_BATCH_TRANSFER_FROM,
    URI,
    SUPPORTS_INTERFACE,
    OWNER,
    TRANSFER_OWNERSHIP,
    RENOUNCE_OWNERSHIP,
    PAUSE,
    UNPAUSE,
    PAUSED,
    BURN,
    BURN_FROM,
    MINT,
    IMPLEMENTATION,
    UPGRADE_TO,
    UPGRADE_TO_AND_CALL,
];

pub const ERC20: &str = "ERC20";
pub const ERC20_DETAILED: &str = "ERC20Detailed";
pub const ERC721: &str = "ERC721";
pub const ERC721_METADATA: &str = "ERC721Metadata";
pub const ERC721_ENUMERABLE: &str = "ERC721Enumerable";
pub const ERC1155: &str = "ERC1155";
pub const ERC165: &str = "ERC165";
pub const OWNABLE: &str = "Ownable";
pub const PAUSABLE: &str = "Pausable";
pub const BURNABLE: &str = "Burnable";
pub const MINTABLE: &str = "Mintable";
pub const PROXY: &str = "Proxy";

/// A standard is implemented iff every listed signature is present.
pub const STANDARDS: &[(&str, &[&str])] = &[
    (
        ERC20,
        &[
            TOTAL_SUPPLY,
            BALANCE_OF,
            TRANSFER,
            TRANSFER_FROM,
            APPROVE,
            ALLOWANCE,
        ],
    ),
    (ERC20_DETAILED, &[NAME, SYMBOL, DECIMALS]),
    (
        ERC721,
        &[
            BALANCE_OF,
            OWNER_OF,
            APPROVE,
            GET_APPROVED,
            SET_APPROVAL_FOR_ALL,
            IS_APPROVED_FOR_ALL,
            TRANSFER_FROM,
            SAFE_TRANSFER_FROM,
            SAFE_TRANSFER_FROM_DATA,
        ],
    ),
    (ERC721_METADATA, &[NAME, SYMBOL, TOKEN_URI]),
    (
        ERC721_ENUMERABLE,
        &[TOTAL_SUPPLY, TOKEN_OF_OWNER_BY_INDEX, TOKEN_BY_INDEX],
    ),
    (
        ERC1155,
        &[
            BALANCE_OF_ID,
            BALANCE_OF_BATCH,
            SET_APPROVAL_FOR_ALL,
            IS_APPROVED_FOR_ALL,
            SAFE_TRANSFER_FROM_ID,
            SAFE_BATCH_TRANSFER_FROM,
        ],
    ),
    (ERC165, &[SUPPORTS_INTERFACE]),
    (OWNABLE, &[OWNER, TRANSFER_OWNERSHIP, RENOUNCE_OWNERSHIP]),
    (PAUSABLE, &[PAUSE, UNPAUSE, PAUSED]),
    (BURNABLE, &[BURN, BURN_FROM]),
    (MINTABLE, &[MINT]),
    (PROXY, &[IMPLEMENTATION, UPGRADE_TO]),
];

/// Standards that emit `Transfer(address,address,uint256)` and expose the
/// name/symbol/decimals/totalSupply accessors.
pub const TOKEN_STANDARDS: &[&str] = &[ERC20, ERC721];
