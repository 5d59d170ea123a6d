//! Backing store implementations.
//!
//! This module contains concrete implementations of the `BackingStore` trait
//! for different key-value stores.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
