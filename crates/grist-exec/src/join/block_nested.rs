//! Block nested loop join.
//!
//! Materializes the right child to a spill file once at `open`, then
//! streams the left child in blocks of `B-2` pages, rescanning the spill
//! file for every block. The buffer budget works out to `B-2` pages for
//! the left block, one for the current right page, and one for the output.

use std::sync::Arc;

use grist_common::{GristError, GristResult, MIN_OPERATOR_BUFFERS};

use crate::batch::Batch;
use crate::context::ExecContext;
use crate::operator::{BoxedOperator, Operator};
use crate::schema::Schema;
use crate::spill::{SpillFile, SpillReader, SpillWriter};

use super::{resolve_keys, Condition, JoinType};

/// Inner equi-join by nested iteration over left blocks and the
/// materialized right side.
///
/// Output order follows `(left block, left tuple, right page, right
/// tuple)` arrival order, and every matching pair appears exactly once.
pub struct BlockNestedJoin {
    left: BoxedOperator,
    right: BoxedOperator,
    conditions: Vec<Condition>,
    join_type: JoinType,
    ctx: ExecContext,
    schema: Arc<Schema>,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    batch_size: usize,
    block_pages: usize,
    right_arity: usize,

    spill: Option<SpillFile>,
    reader: Option<SpillReader>,
    left_block: Option<Batch>,
    right_batch: Option<Batch>,
    /// Cursor into the left block, saved across output pages.
    lcurs: usize,
    /// Cursor into the current right page, saved across output pages.
    rcurs: usize,
    eos_left: bool,
    /// True when the current pass over the spill file is finished. Starts
    /// true so the first `next` pulls a left block and begins a pass.
    eos_right: bool,
    closed: bool,
}

impl BlockNestedJoin {
    /// Creates a block nested loop join over the two children.
    #[must_use]
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        conditions: Vec<Condition>,
        join_type: JoinType,
        ctx: ExecContext,
    ) -> Self {
        let schema = Arc::new(left.schema().join(&right.schema()));
        Self {
            left,
            right,
            conditions,
            join_type,
            ctx,
            schema,
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            batch_size: 0,
            block_pages: 0,
            right_arity: 0,
            spill: None,
            reader: None,
            left_block: None,
            right_batch: None,
            lcurs: 0,
            rcurs: 0,
            eos_left: false,
            eos_right: true,
            closed: false,
        }
    }

    /// Drains the right child into a spill file so it can be rescanned
    /// once per left block.
    fn materialize_right(&mut self) -> GristResult<()> {
        self.right.open()?;

        let name = format!("BNJtemp-{}", self.ctx.next_file_num());
        let mut writer = SpillWriter::create(self.ctx.spill_path(&name))?;
        let mut pages = 0usize;
        while let Some(batch) = self.right.next()? {
            if batch.is_empty() {
                continue;
            }
            writer.write_batch(&batch)?;
            pages += 1;
        }
        self.spill = Some(writer.finish()?);
        self.right.close()?;

        tracing::debug!(file = %name, pages, "right side materialized");
        Ok(())
    }
}

impl Operator for BlockNestedJoin {
    fn open(&mut self) -> GristResult<()> {
        if self.join_type != JoinType::Inner {
            return Err(GristError::NotSupported {
                operation: format!("{:?} block nested loop join", self.join_type),
            });
        }
        if self.ctx.num_buffers() < MIN_OPERATOR_BUFFERS {
            return Err(GristError::invalid_config(format!(
                "block nested loop join needs at least {MIN_OPERATOR_BUFFERS} buffers, got {}",
                self.ctx.num_buffers()
            )));
        }

        let tuple_size = self.schema.tuple_size();
        let page_size = self.ctx.page_size();
        if tuple_size == 0 || page_size < tuple_size {
            return Err(GristError::PageTooSmall {
                page_size,
                tuple_size,
            });
        }
        self.batch_size = page_size / tuple_size;
        self.block_pages = self.ctx.num_buffers() - 2;

        let (left_keys, right_keys) =
            resolve_keys(&self.conditions, &self.left.schema(), &self.right.schema())?;
        self.left_keys = left_keys;
        self.right_keys = right_keys;
        self.right_arity = self.right.schema().num_columns();

        self.lcurs = 0;
        self.rcurs = 0;
        self.eos_left = false;
        // The spill file is rescanned from the top for every left block.
        self.eos_right = true;

        self.materialize_right()?;
        self.left.open()
    }

    fn next(&mut self) -> GristResult<Option<Batch>> {
        if self.eos_left || self.closed {
            return Ok(None);
        }
        let mut out = Batch::with_capacity(self.batch_size);

        while !out.is_full() {
            if self.lcurs == 0 && self.eos_right {
                self.left_block = self.left.get_block(self.block_pages)?;
                if self.left_block.is_none() {
                    self.eos_left = true;
                    return if out.is_empty() { Ok(None) } else { Ok(Some(out)) };
                }

                let spill = self
                    .spill
                    .as_ref()
                    .ok_or_else(|| GristError::internal("join used before open"))?;
                self.reader = Some(SpillReader::open(spill.path(), self.right_arity)?);
                self.eos_right = false;
            }

            while !self.eos_right {
                if self.rcurs == 0 && self.lcurs == 0 {
                    let reader = self
                        .reader
                        .as_mut()
                        .ok_or_else(|| GristError::internal("right pass has no reader"))?;
                    match reader.next_batch()? {
                        Some(batch) if !batch.is_empty() => self.right_batch = Some(batch),
                        _ => {
                            self.reader = None;
                            self.eos_right = true;
                            break;
                        }
                    }
                }

                let left_block = self
                    .left_block
                    .as_ref()
                    .ok_or_else(|| GristError::internal("right pass has no left block"))?;
                let right_batch = self
                    .right_batch
                    .as_ref()
                    .ok_or_else(|| GristError::internal("right pass has no right page"))?;

                let mut i = self.lcurs;
                while i < left_block.len() {
                    let left_tuple = left_block
                        .get(i)
                        .ok_or_else(|| GristError::internal("left cursor out of range"))?;

                    let mut j = self.rcurs;
                    while j < right_batch.len() {
                        let right_tuple = right_batch
                            .get(j)
                            .ok_or_else(|| GristError::internal("right cursor out of range"))?;

                        if left_tuple.matches_on(right_tuple, &self.left_keys, &self.right_keys)? {
                            out.push(left_tuple.join_with(right_tuple));
                            if out.is_full() {
                                // Resume exactly after this pair so no pair
                                // is visited twice and none is skipped.
                                let last_left = i == left_block.len() - 1;
                                let last_right = j == right_batch.len() - 1;
                                if last_left && last_right {
                                    self.lcurs = 0;
                                    self.rcurs = 0;
                                } else if last_right {
                                    self.lcurs = i + 1;
                                    self.rcurs = 0;
                                } else {
                                    self.lcurs = i;
                                    self.rcurs = j + 1;
                                }
                                return Ok(Some(out));
                            }
                        }
                        j += 1;
                    }
                    self.rcurs = 0;
                    i += 1;
                }
                self.lcurs = 0;
            }
        }

        Ok(Some(out))
    }

    fn close(&mut self) -> GristResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader = None;
        self.left_block = None;
        self.right_batch = None;
        if let Some(spill) = self.spill.take() {
            spill.delete();
        }
        self.left.close()?;
        self.right.close()
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }
}
