pub mod address_repository;
pub mod block_repository;
pub mod database;
pub mod holder_repository;
pub mod internal_tx_repository;
pub mod models;
pub mod stats_repository;
pub mod transaction_repository;

pub use address_repository::{ActivityRepository, AddressRepository, AddressSubset};
pub use block_repository::BlockRepository;
pub use database::Database;
pub use holder_repository::HolderRepository;
pub use internal_tx_repository::InternalTransactionRepository;
pub use models::{
    ActiveAddress, AddressRecord, Block, InternalTransaction, MAX_PAGE_SIZE, MISSING,
    StatsSnapshot, TokenHolder, Transaction,
};
pub use stats_repository::StatsRepository;
pub use transaction_repository::TransactionRepository;
