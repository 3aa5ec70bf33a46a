//! Adapters implementing the domain ports.

pub mod credentials;
pub mod in_memory;
pub mod push;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sessions;
