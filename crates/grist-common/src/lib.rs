//! # grist-common
//!
//! Common types, errors, and configuration for GristDB.
//!
//! This crate provides the foundation shared by all GristDB components:
//!
//! - **Errors**: Unified error handling with [`GristError`]
//! - **Config**: Engine configuration structures
//! - **Constants**: System-wide constants and limits
//!
//! ## Example
//!
//! ```rust
//! use grist_common::config::EngineConfig;
//! use grist_common::error::GristResult;
//!
//! fn example() -> GristResult<()> {
//!     let config = EngineConfig::default();
//!     config.validate()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constants;
pub mod error;

// Re-export commonly used items at the crate root
pub use config::EngineConfig;
pub use constants::*;
pub use error::{ErrorCode, GristError, GristResult};
