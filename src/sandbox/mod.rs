//! Sandbox module - Content-addressed stage directories
//!
//! This module provides the on-disk cache that lets unchanged stages be skipped.
//! It handles:
//! - Cache key derivation from file contents and stage identity
//! - Hit/miss decisions, preparation and deletion of sandbox directories
//! - Per-key locking so concurrent runs never race on the same entry
//! - Cache root housekeeping (size, age-based cleanup)
//!
//! The sandbox module does NOT:
//! - Run commands (that's the runner's job)
//! - Know about pipelines beyond a resolved stage

pub mod key;
pub mod manager;
pub mod usage;

// Re-exports for convenience
pub use key::CacheKey;
pub use manager::{Sandbox, SandboxManager};
pub use usage::{clear_older_than, dir_last_modified, dir_last_use, dir_size};
