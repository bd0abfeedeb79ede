//! Cache-aside support: key derivation and the cache collaborator contract.

mod client;
mod key;
mod memory;

pub use client::CacheClient;
pub use key::{derive_key, CacheKeyDeriver};
pub use memory::InMemoryCache;
