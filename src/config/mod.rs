//! Configuration module for index synchronization
//!
//! This module provides the `SyncConfig` struct, its type-safe builder and a
//! JSON file loader.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod types;

// Re-exports for public API
pub use builder::{SyncConfigBuilder, WithStorageDir};
pub use types::SyncConfig;
