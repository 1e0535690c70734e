//! Core types for Strata STM
//!
//! This crate defines the foundational types shared by every layer:
//! - Error: user-visible error hierarchy
//! - Result: result alias over [`Error`]
//! - StmConfig: restart budget and backoff configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;

pub use config::{StmConfig, CONFIG_FILE_NAME};
pub use error::{Error, Result};
