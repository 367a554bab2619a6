//! Sort-merge join.
//!
//! Sorts both inputs on the join keys and advances a merge cursor over the
//! two sorted streams. The right side of a duplicate group may span page
//! boundaries and must be re-scanned once per matching left tuple, so the
//! operator keeps an auxiliary buffer of right tuples belonging to the
//! current group and a saved position marking the group's start.
//!
//! The group buffer is the one place the operator exceeds its nominal page
//! budget: correctness requires the largest right-side duplicate group to
//! fit in memory.

use std::cmp::Ordering;
use std::sync::Arc;

use grist_common::{GristError, GristResult};

use crate::batch::Batch;
use crate::context::ExecContext;
use crate::operator::{BoxedOperator, Operator};
use crate::schema::Schema;
use crate::sort::ExternalSort;
use crate::tuple::Tuple;

use super::{resolve_keys, Condition, JoinType};

/// Inner equi-join of two streams by merging their sorted forms.
///
/// Output order is lexicographic on `(keys, left arrival, right arrival)`,
/// and every matching pair appears exactly once.
pub struct SortMergeJoin {
    left: Option<BoxedOperator>,
    right: Option<BoxedOperator>,
    left_sort: Option<ExternalSort>,
    right_sort: Option<ExternalSort>,
    conditions: Vec<Condition>,
    join_type: JoinType,
    ctx: ExecContext,
    schema: Arc<Schema>,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    batch_size: usize,

    left_batch: Option<Batch>,
    right_batch: Option<Batch>,
    /// Cursor into the current left batch.
    lcurs: usize,
    /// Cursor into the unified view `temp ++ right_batch`.
    rcurs: usize,
    /// Right tuples of the current duplicate group that have already
    /// rotated out of the live batch.
    temp: Vec<Tuple>,
    /// Saved start of the current duplicate group, or `None` between
    /// groups.
    group_start: Option<usize>,
    closed: bool,
}

impl SortMergeJoin {
    /// Creates a sort-merge join over the two children.
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
            left: Some(left),
            right: Some(right),
            left_sort: None,
            right_sort: None,
            conditions,
            join_type,
            ctx,
            schema,
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            batch_size: 0,
            left_batch: None,
            right_batch: None,
            lcurs: 0,
            rcurs: 0,
            temp: Vec::new(),
            group_start: None,
            closed: false,
        }
    }

    fn left_tuple(&self) -> GristResult<&Tuple> {
        self.left_batch
            .as_ref()
            .and_then(|b| b.get(self.lcurs))
            .ok_or_else(|| GristError::internal("left merge cursor out of range"))
    }

    /// Returns the right tuple at `rcurs` in the unified view over the
    /// buffered group prefix and the live batch.
    fn right_tuple(&self) -> GristResult<&Tuple> {
        let tuple = if self.rcurs < self.temp.len() {
            self.temp.get(self.rcurs)
        } else {
            self.right_batch
                .as_ref()
                .and_then(|b| b.get(self.rcurs - self.temp.len()))
        };
        tuple.ok_or_else(|| GristError::internal("right merge cursor out of range"))
    }

    fn compare_current(&self) -> GristResult<Ordering> {
        Tuple::compare_on(
            self.left_tuple()?,
            self.right_tuple()?,
            &self.left_keys,
            &self.right_keys,
        )
    }

    /// Steps the left cursor, pulling the next left batch at a page
    /// boundary.
    fn advance_left(&mut self) -> GristResult<()> {
        self.lcurs += 1;
        let live_len = match &self.left_batch {
            Some(batch) => batch.len(),
            None => return Ok(()),
        };
        if self.lcurs >= live_len {
            self.left_batch = match self.left_sort.as_mut() {
                Some(sort) => sort.next()?,
                None => None,
            };
            self.lcurs = 0;
        }
        Ok(())
    }

    /// Steps the right cursor. Crossing the end of the live batch rolls it
    /// into `temp` so earlier tuples of a potential duplicate group remain
    /// reachable, then pulls the next right batch.
    fn advance_right(&mut self) -> GristResult<()> {
        self.rcurs += 1;
        let live_len = match &self.right_batch {
            Some(batch) => batch.len(),
            None => return Ok(()),
        };
        if self.rcurs >= live_len + self.temp.len() {
            if let Some(batch) = self.right_batch.take() {
                self.temp.extend(batch.into_tuples());
            }
            self.right_batch = match self.right_sort.as_mut() {
                Some(sort) => sort.next()?,
                None => None,
            };
        }
        Ok(())
    }

    /// Positions both cursors on the next candidate pair and records the
    /// start of its (potential) duplicate group.
    fn seek_group(&mut self) -> GristResult<()> {
        while self.left_batch.is_some() && self.compare_current()? == Ordering::Less {
            self.advance_left()?;
            if self.left_batch.is_none() {
                return Ok(());
            }
        }

        while self.right_batch.is_some() && self.compare_current()? == Ordering::Greater {
            self.advance_right()?;
            if self.right_batch.is_none() {
                return Ok(());
            }
        }

        if self.rcurs >= self.temp.len() {
            // The cursor has moved past the buffered prefix: everything in
            // it sorts below the new group, so re-base onto the live batch
            // and discard it.
            self.rcurs -= self.temp.len();
            self.group_start = Some(self.rcurs);
            self.temp.clear();
        } else {
            // The new group begins inside the buffer (a rewind landed
            // here); it must stay reachable for later left tuples.
            self.group_start = Some(self.rcurs);
        }
        Ok(())
    }

    /// Replays the buffered group for the remaining left tuples once the
    /// right stream is exhausted. Every buffered tuple from the group
    /// start onward carries the group key, so a left tuple either matches
    /// all of them or the join is finished.
    ///
    /// Returns `false` when no further output is possible.
    fn replay_group(&mut self, out: &mut Batch) -> GristResult<bool> {
        let Some(start) = self.group_start else {
            return Ok(false);
        };

        if self.rcurs < self.temp.len() && self.compare_current()? == Ordering::Equal {
            let joined = self.left_tuple()?.join_with(self.right_tuple()?);
            out.push(joined);
            self.rcurs += 1;
            return Ok(true);
        }

        // This left tuple is done with the group; rewind and try the next.
        self.rcurs = start;
        self.advance_left()?;
        if self.left_batch.is_none() {
            return Ok(false);
        }
        if self.rcurs >= self.temp.len() || self.compare_current()? != Ordering::Equal {
            return Ok(false);
        }
        Ok(true)
    }
}

impl Operator for SortMergeJoin {
    fn open(&mut self) -> GristResult<()> {
        if self.join_type != JoinType::Inner {
            return Err(GristError::NotSupported {
                operation: format!("{:?} sort-merge join", self.join_type),
            });
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

        let (left, right) = match (self.left.take(), self.right.take()) {
            (Some(left), Some(right)) => (left, right),
            _ => return Err(GristError::internal("sort-merge join opened twice")),
        };

        let (left_keys, right_keys) = resolve_keys(&self.conditions, &left.schema(), &right.schema())?;
        self.left_keys = left_keys;
        self.right_keys = right_keys;

        let mut left_sort = ExternalSort::new(left, self.left_keys.clone(), "left", self.ctx.clone());
        let mut right_sort =
            ExternalSort::new(right, self.right_keys.clone(), "right", self.ctx.clone());
        left_sort.open()?;
        right_sort.open()?;

        self.left_batch = left_sort.next()?;
        self.right_batch = right_sort.next()?;
        self.left_sort = Some(left_sort);
        self.right_sort = Some(right_sort);
        self.lcurs = 0;
        self.rcurs = 0;
        self.temp.clear();
        self.group_start = None;
        Ok(())
    }

    fn next(&mut self) -> GristResult<Option<Batch>> {
        if self.closed {
            return Ok(None);
        }
        let mut out = Batch::with_capacity(self.batch_size);

        while self.left_batch.is_some() {
            // Once the right stream is exhausted, the buffered group is all
            // that remains to match against.
            if self.right_batch.is_none() {
                if !self.replay_group(&mut out)? {
                    break;
                }
                if out.is_full() {
                    return Ok(Some(out));
                }
                continue;
            }

            if self.group_start.is_none() {
                self.seek_group()?;
                continue;
            }

            if self.compare_current()? == Ordering::Equal {
                let joined = self.left_tuple()?.join_with(self.right_tuple()?);
                out.push(joined);
                self.advance_right()?;
                if out.is_full() {
                    return Ok(Some(out));
                }
            } else {
                // The group ended for this left tuple: rewind right to the
                // group start and try the next left tuple against it.
                self.rcurs = self.group_start.unwrap_or(0);
                self.advance_left()?;
                if self.left_batch.is_none() {
                    break;
                }
                self.group_start = None;
            }
        }

        if out.is_empty() {
            self.close()?;
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    fn close(&mut self) -> GristResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.left_batch = None;
        self.right_batch = None;
        self.temp.clear();

        if let Some(mut sort) = self.left_sort.take() {
            sort.close()?;
        }
        if let Some(mut sort) = self.right_sort.take() {
            sort.close()?;
        }
        // Children that were never handed to a sort (open not reached).
        if let Some(mut child) = self.left.take() {
            child.close()?;
        }
        if let Some(mut child) = self.right.take() {
            child.close()?;
        }
        Ok(())
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }
}
