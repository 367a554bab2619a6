//! Engine configuration structures.
//!
//! Configuration is fixed before any operator is opened and shared
//! read-only by every operator in a plan.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_NUM_BUFFERS, DEFAULT_PAGE_SIZE, MIN_OPERATOR_BUFFERS};
use crate::error::{GristError, GristResult};

/// Execution engine configuration.
///
/// # Example
///
/// ```rust
/// use grist_common::config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.page_size, 8192);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Size of each page in bytes.
    ///
    /// Must be at least the serialized tuple size of every schema the plan
    /// touches; operators verify this per schema at `open`.
    pub page_size: usize,

    /// Buffer pages of resident memory granted to each operator.
    pub num_buffers: usize,

    /// Directory where operators create their spill files.
    pub spill_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            num_buffers: DEFAULT_NUM_BUFFERS,
            spill_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with the given spill directory.
    #[must_use]
    pub fn with_spill_dir(spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            spill_dir: spill_dir.into(),
            ..Default::default()
        }
    }

    /// Creates a small configuration for testing.
    ///
    /// The tiny page size forces multi-page batches and spill activity even
    /// on small inputs, which is what operator tests want to exercise.
    #[must_use]
    pub fn for_testing(page_size: usize, num_buffers: usize, spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            page_size,
            num_buffers,
            spill_dir: spill_dir.into(),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> GristResult<()> {
        if self.page_size == 0 {
            return Err(GristError::invalid_config("page_size must be non-zero"));
        }

        if self.num_buffers < MIN_OPERATOR_BUFFERS {
            return Err(GristError::invalid_config(format!(
                "num_buffers must be at least {MIN_OPERATOR_BUFFERS}, got {}",
                self.num_buffers
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let config = EngineConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_buffer_budget() {
        let config = EngineConfig {
            num_buffers: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_for_testing() {
        let config = EngineConfig::for_testing(64, 3, "/tmp/grist-test");
        assert_eq!(config.page_size, 64);
        assert_eq!(config.num_buffers, 3);
        config.validate().unwrap();
    }
}
