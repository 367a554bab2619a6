//! Execution context shared by the operators of one plan.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use grist_common::EngineConfig;

/// Shared runtime state for one query plan.
///
/// Carries the engine configuration and the monotonic counter from which
/// operators draw unique spill-file numbers. Cloning is cheap; every clone
/// draws from the same counter, so spill names never collide within a plan.
#[derive(Debug, Clone)]
pub struct ExecContext {
    config: Arc<EngineConfig>,
    file_seq: Arc<AtomicU64>,
}

impl ExecContext {
    /// Creates a context over the given configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            file_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the configured page size in bytes.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    /// Returns the buffer-page budget granted to each operator.
    #[must_use]
    pub fn num_buffers(&self) -> usize {
        self.config.num_buffers
    }

    /// Returns the next unique spill-file number.
    pub fn next_file_num(&self) -> u64 {
        self.file_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Resolves a spill-file name inside the configured spill directory.
    #[must_use]
    pub fn spill_path(&self, name: &str) -> PathBuf {
        self.config.spill_dir.join(name)
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
