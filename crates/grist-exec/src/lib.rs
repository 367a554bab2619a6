//! # grist-exec
//!
//! Buffer-bounded physical join and sort operators for GristDB.
//!
//! This crate implements the execution core of the engine:
//!
//! - **Value / Tuple / Schema**: the typed runtime data model
//! - **Batch / Block**: page-sized tuple containers and in-memory staging
//! - **Page codec and spill files**: checksummed frames on secondary storage
//! - **Operators**: external sort, sort-merge join, block nested loop join
//!
//! # Execution Model
//!
//! Operators form a tree and use a pull-based iterator model. `open`
//! allocates buffers and spill files, `next` produces one page of output at
//! a time, and `close` deletes every temporary file the operator created:
//!
//! ```ignore
//! let mut op = SortMergeJoin::new(left, right, conditions, JoinType::Inner, ctx);
//! op.open()?;
//! while let Some(batch) = op.next()? {
//!     // Process one page of joined tuples
//! }
//! op.close()?;
//! ```
//!
//! Execution is strictly single-threaded; each operator respects a budget of
//! `num_buffers` resident pages and spills the rest to disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod batch;
mod codec;
mod context;
mod join;
mod operator;
mod scan;
mod schema;
mod sort;
mod spill;
mod tuple;
mod value;

pub use batch::{Batch, Block};
pub use codec::{decode_batch, encode_batch, FrameHeader, FRAME_HEADER_SIZE};
pub use context::ExecContext;
pub use join::{BlockNestedJoin, Condition, JoinType, SortMergeJoin};
pub use operator::Operator;
pub use scan::MemScan;
pub use schema::{ColumnType, Field, Schema};
pub use sort::ExternalSort;
pub use spill::{SpillFile, SpillReader, SpillWriter};
pub use tuple::Tuple;
pub use value::Value;

// The shared foundation is re-exported so operator callers only need one
// crate in scope.
pub use grist_common::{EngineConfig, ErrorCode, GristError, GristResult};
