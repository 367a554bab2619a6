//! The operator trait for pull-based query execution.
//!
//! Operators are organized in a tree matching the physical plan. Data
//! flows from leaf operators (scans) up through joins and sorts to the
//! root, one page at a time.
//!
//! # Lifecycle
//!
//! `open` must be called exactly once before any `next`; it allocates
//! buffers, opens children, and materializes spill files. `next` returns
//! `Ok(None)` at end-of-stream and keeps returning it if called again.
//! `close` is idempotent, deletes every spill file the operator created,
//! and closes its children.

use std::sync::Arc;

use grist_common::GristResult;

use crate::batch::Batch;
use crate::schema::Schema;

/// A node in the execution tree supporting the pull protocol.
pub trait Operator {
    /// One-time initialization. Setup failures - a child failing to open, a
    /// page smaller than one tuple, mismatched join keys, an I/O error
    /// while materializing - surface here, and the host must not call
    /// `next` afterwards.
    fn open(&mut self) -> GristResult<()>;

    /// Returns the next page of output tuples, or `None` at end-of-stream.
    ///
    /// Only the final page may be partially filled.
    fn next(&mut self) -> GristResult<Option<Batch>>;

    /// Returns up to `num_pages` pages of tuples packed into a single
    /// over-sized batch, or `None` if the stream is already drained.
    ///
    /// The default implementation concatenates successive `next` pages.
    fn get_block(&mut self, num_pages: usize) -> GristResult<Option<Batch>> {
        let mut block: Option<Batch> = None;
        for _ in 0..num_pages {
            let Some(batch) = self.next()? else { break };
            let capacity = num_pages * batch.capacity().max(1);
            block
                .get_or_insert_with(|| Batch::with_capacity(capacity))
                .extend_from(batch);
        }
        Ok(block)
    }

    /// Idempotent cleanup: deletes spill files, releases file handles,
    /// closes children.
    fn close(&mut self) -> GristResult<()>;

    /// Returns the output schema of this operator.
    fn schema(&self) -> Arc<Schema>;
}

/// A boxed operator for dynamic dispatch.
pub type BoxedOperator = Box<dyn Operator>;
