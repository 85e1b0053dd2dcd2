pub mod admin;
pub mod chain;
pub mod classifier;
pub mod config;
pub mod deployment;
pub mod events;
pub mod fees;
pub mod query;
pub mod repository;
pub mod retry;
pub mod rpc;
pub mod stats;
pub mod syncer;
pub mod tokens;

#[cfg(test)]
pub(crate) mod test_utils;

/// Wall-clock unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub(crate) fn unix_now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
