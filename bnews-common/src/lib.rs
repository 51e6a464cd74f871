//! # bnews Common Library
//!
//! Shared code for the bnews scoring services including:
//! - Error type and result alias
//! - Bootstrap configuration loading (TOML)
//! - Tracing initialization
//! - SQLite pool setup and the lock-contention retry policy
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
