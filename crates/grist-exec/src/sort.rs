//! External merge sort.
//!
//! Sorts an input stream under a budget of `B` buffer pages in two phases.
//! Run generation pulls batches into a block of up to `B` pages, sorts the
//! block's tuples in memory, and spills each sorted block as one run.
//! Merge passes then repeatedly combine groups of up to `B-1` runs - one
//! input page per run plus one output page exactly fills the budget -
//! until a single run remains, which `next` streams back a page at a time.

use std::cmp::Ordering;
use std::sync::Arc;

use grist_common::{GristError, GristResult, MIN_OPERATOR_BUFFERS};

use crate::batch::{repack, Batch, Block};
use crate::context::ExecContext;
use crate::operator::{BoxedOperator, Operator};
use crate::schema::Schema;
use crate::spill::{SpillFile, SpillReader, SpillWriter};
use crate::tuple::Tuple;

/// Sorts its child's output on a set of key columns, spilling to disk.
///
/// `direction` is an opaque tag (conventionally `"left"` / `"right"`) that
/// keeps the temporary files of paired sorts from colliding.
pub struct ExternalSort {
    child: BoxedOperator,
    ctx: ExecContext,
    direction: String,
    key_indices: Vec<usize>,
    arity: usize,
    page_capacity: usize,
    runs: Vec<SpillFile>,
    reader: Option<SpillReader>,
    closed: bool,
}

/// Read cursor over one run during a merge: the run's resident page plus
/// an intra-page position.
struct RunCursor {
    reader: SpillReader,
    batch: Option<Batch>,
    pos: usize,
}

impl RunCursor {
    fn new(mut reader: SpillReader) -> GristResult<Self> {
        let batch = reader.next_batch()?;
        let mut cursor = Self {
            reader,
            batch,
            pos: 0,
        };
        cursor.refill()?;
        Ok(cursor)
    }

    /// Skips exhausted pages until the cursor rests on a tuple or the run
    /// ends.
    fn refill(&mut self) -> GristResult<()> {
        while let Some(batch) = &self.batch {
            if self.pos < batch.len() {
                break;
            }
            self.batch = self.reader.next_batch()?;
            self.pos = 0;
        }
        Ok(())
    }

    fn head(&self) -> Option<&Tuple> {
        self.batch.as_ref().and_then(|b| b.get(self.pos))
    }

    fn advance(&mut self) -> GristResult<()> {
        self.pos += 1;
        self.refill()
    }
}

impl ExternalSort {
    /// Creates a sort over `child` keyed on the given column positions.
    #[must_use]
    pub fn new(
        child: BoxedOperator,
        key_indices: Vec<usize>,
        direction: impl Into<String>,
        ctx: ExecContext,
    ) -> Self {
        Self {
            child,
            ctx,
            direction: direction.into(),
            key_indices,
            arity: 0,
            page_capacity: 0,
            runs: Vec::new(),
            reader: None,
            closed: false,
        }
    }

    fn compare(&self, a: &Tuple, b: &Tuple) -> GristResult<Ordering> {
        Tuple::compare_on(a, b, &self.key_indices, &self.key_indices)
    }

    /// Phase 1: pulls the child dry, sorting and spilling one run per
    /// block of `B` pages.
    fn generate_runs(&mut self) -> GristResult<()> {
        let num_buffers = self.ctx.num_buffers();
        let mut run_no = 0u64;
        let mut incoming = self.child.next()?;

        while incoming.is_some() {
            let mut block = Block::new(num_buffers);
            while !block.is_full() {
                match incoming.take() {
                    Some(batch) => {
                        block.add_batch(batch);
                        incoming = self.child.next()?;
                    }
                    None => break,
                }
            }

            let mut tuples = block.into_tuples();
            let mut sort_err: Option<GristError> = None;
            // Vec::sort_by is stable, which preserves arrival order within
            // equal keys.
            tuples.sort_by(|a, b| match self.compare(a, b) {
                Ok(ordering) => ordering,
                Err(e) => {
                    if sort_err.is_none() {
                        sort_err = Some(e);
                    }
                    Ordering::Equal
                }
            });
            if let Some(e) = sort_err {
                return Err(e);
            }

            run_no += 1;
            let name = format!("{}-SMTemp-{}", self.direction, run_no);
            let mut writer = SpillWriter::create(self.ctx.spill_path(&name))?;
            for batch in repack(tuples, self.page_capacity) {
                writer.write_batch(&batch)?;
            }
            self.runs.push(writer.finish()?);
        }

        tracing::debug!(
            direction = %self.direction,
            runs = self.runs.len(),
            "initial runs generated"
        );
        Ok(())
    }

    /// Phase 2: merge passes at fan-in `B-1` until one run remains.
    fn merge_runs(&mut self) -> GristResult<()> {
        let fan_in = self.ctx.num_buffers() - 1;
        let mut pass = 0u64;

        while self.runs.len() > 1 {
            let inputs = std::mem::take(&mut self.runs);
            let mut outputs = Vec::with_capacity(inputs.len().div_ceil(fan_in));
            let mut failure = None;

            for (group_no, group) in inputs.chunks(fan_in).enumerate() {
                let name = format!("{}-SMTemp-{}-{}", self.direction, pass, group_no);
                match self.merge_group(group, &name) {
                    Ok(run) => outputs.push(run),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            if let Some(e) = failure {
                // Keep the inputs registered so close() still deletes
                // them; the partial outputs go now.
                for run in &outputs {
                    run.delete();
                }
                self.runs = inputs;
                return Err(e);
            }

            for run in &inputs {
                run.delete();
            }
            self.runs = outputs;
            pass += 1;

            tracing::debug!(
                direction = %self.direction,
                pass,
                runs = self.runs.len(),
                "merge pass complete"
            );
        }
        Ok(())
    }

    /// Merges one group of runs into a single new run, holding one resident
    /// page per input run plus one output page.
    fn merge_group(&self, group: &[SpillFile], name: &str) -> GristResult<SpillFile> {
        let mut cursors = Vec::with_capacity(group.len());
        for run in group {
            cursors.push(RunCursor::new(SpillReader::open(run.path(), self.arity)?)?);
        }

        let mut writer = SpillWriter::create(self.ctx.spill_path(name))?;
        let mut out = Batch::with_capacity(self.page_capacity);

        loop {
            let mut min_idx: Option<usize> = None;
            for i in 0..cursors.len() {
                let Some(candidate) = cursors[i].head() else {
                    continue;
                };
                min_idx = match min_idx {
                    None => Some(i),
                    Some(m) => {
                        let smaller = match cursors[m].head() {
                            Some(current) => self.compare(candidate, current)? == Ordering::Less,
                            None => true,
                        };
                        if smaller {
                            Some(i)
                        } else {
                            Some(m)
                        }
                    }
                };
            }

            let Some(idx) = min_idx else { break };
            let tuple = cursors[idx]
                .head()
                .cloned()
                .ok_or_else(|| GristError::internal("merge cursor lost its head tuple"))?;
            cursors[idx].advance()?;

            out.push(tuple);
            if out.is_full() {
                writer.write_batch(&out)?;
                out = Batch::with_capacity(self.page_capacity);
            }
        }

        if !out.is_empty() {
            writer.write_batch(&out)?;
        }
        writer.finish()
    }
}

impl Operator for ExternalSort {
    fn open(&mut self) -> GristResult<()> {
        if self.ctx.num_buffers() < MIN_OPERATOR_BUFFERS {
            return Err(GristError::invalid_config(format!(
                "external sort needs at least {MIN_OPERATOR_BUFFERS} buffers, got {}",
                self.ctx.num_buffers()
            )));
        }

        self.child.open()?;

        let schema = self.child.schema();
        let tuple_size = schema.tuple_size();
        let page_size = self.ctx.page_size();
        if tuple_size == 0 || page_size < tuple_size {
            return Err(GristError::PageTooSmall {
                page_size,
                tuple_size,
            });
        }
        self.page_capacity = page_size / tuple_size;
        self.arity = schema.num_columns();

        for &key in &self.key_indices {
            if key >= self.arity {
                return Err(GristError::internal(format!(
                    "sort key position {key} out of range for arity {}",
                    self.arity
                )));
            }
        }

        self.generate_runs()?;
        self.merge_runs()?;

        // An empty child leaves zero runs; the stream is simply empty.
        self.reader = match self.runs.first() {
            Some(run) => Some(SpillReader::open(run.path(), self.arity)?),
            None => None,
        };
        Ok(())
    }

    fn next(&mut self) -> GristResult<Option<Batch>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.next_batch()? {
            Some(batch) if !batch.is_empty() => Ok(Some(batch)),
            _ => {
                self.reader = None;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> GristResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader = None;
        for run in self.runs.drain(..) {
            run.delete();
        }
        self.child.close()
    }

    fn schema(&self) -> Arc<Schema> {
        self.child.schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::MemScan;
    use crate::schema::Field;
    use crate::value::Value;
    use grist_common::EngineConfig;
    use rand::prelude::*;

    fn test_ctx(dir: &std::path::Path, page_size: usize, num_buffers: usize) -> ExecContext {
        ExecContext::new(EngineConfig::for_testing(page_size, num_buffers, dir))
    }

    fn int_scan(values: &[i32], ctx: &ExecContext) -> BoxedOperator {
        let schema = Arc::new(Schema::new(vec![Field::int("x")]));
        let tuples = values.iter().map(|&v| Tuple::new(vec![Value::int(v)])).collect();
        Box::new(MemScan::new(schema, tuples, ctx.clone()))
    }

    fn drain_ints(op: &mut dyn Operator) -> Vec<i32> {
        let mut out = Vec::new();
        while let Some(batch) = op.next().unwrap() {
            for tuple in batch.iter() {
                match tuple.value_at(0).unwrap() {
                    Value::Int(v) => out.push(*v),
                    other => panic!("unexpected value {other}"),
                }
            }
        }
        out
    }

    fn spill_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 8, 3);
        let mut sort = ExternalSort::new(int_scan(&[], &ctx), vec![0], "left", ctx);

        sort.open().unwrap();
        assert!(sort.next().unwrap().is_none());
        sort.close().unwrap();
        assert_eq!(spill_count(dir.path()), 0);
    }

    #[test]
    fn test_sorts_random_input_under_three_buffers() {
        let dir = tempfile::tempdir().unwrap();
        // 8-byte pages of one-int tuples: two tuples per page, ten pages.
        let ctx = test_ctx(dir.path(), 8, 3);

        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<i32> = (0..20).map(|_| rng.gen_range(-100..100)).collect();

        let mut sort = ExternalSort::new(int_scan(&values, &ctx), vec![0], "left", ctx);
        sort.open().unwrap();
        let sorted = drain_ints(&mut sort);
        sort.close().unwrap();

        let mut expected = values.clone();
        expected.sort_unstable();
        assert_eq!(sorted, expected);
        assert_eq!(spill_count(dir.path()), 0);
    }

    #[test]
    fn test_sorted_input_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 8, 3);
        let values = [1, 2, 3, 4, 5, 6, 7];

        let mut sort = ExternalSort::new(int_scan(&values, &ctx), vec![0], "left", ctx);
        sort.open().unwrap();
        assert_eq!(drain_ints(&mut sort), values);
        sort.close().unwrap();
    }

    #[test]
    fn test_sort_of_sort_matches_single_sort() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 8, 3);
        let values = [5, 3, 9, 3, -1, 0, 12, 5];

        let inner = ExternalSort::new(int_scan(&values, &ctx), vec![0], "left", ctx.clone());
        let mut outer = ExternalSort::new(Box::new(inner), vec![0], "right", ctx.clone());
        outer.open().unwrap();
        let twice = drain_ints(&mut outer);
        outer.close().unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        let ctx2 = test_ctx(dir2.path(), 8, 3);
        let mut once = ExternalSort::new(int_scan(&values, &ctx2), vec![0], "left", ctx2);
        once.open().unwrap();
        assert_eq!(twice, drain_ints(&mut once));
        once.close().unwrap();

        assert_eq!(spill_count(dir.path()), 0);
    }

    #[test]
    fn test_output_batches_full_except_last() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 12, 3);

        let values: Vec<i32> = (0..10).rev().collect();
        let mut sort = ExternalSort::new(int_scan(&values, &ctx), vec![0], "left", ctx);
        sort.open().unwrap();

        let mut sizes = Vec::new();
        while let Some(batch) = sort.next().unwrap() {
            sizes.push(batch.len());
        }
        sort.close().unwrap();

        // Three tuples per 12-byte page, ten tuples total.
        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn test_sort_on_string_key() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 32, 3);

        let schema = Arc::new(Schema::new(vec![Field::varchar("name", 8)]));
        let names = ["pear", "apple", "quince", "fig", "mango"];
        let tuples = names
            .iter()
            .map(|n| Tuple::new(vec![Value::string(*n)]))
            .collect();
        let scan = Box::new(MemScan::new(schema, tuples, ctx.clone()));

        let mut sort = ExternalSort::new(scan, vec![0], "left", ctx);
        sort.open().unwrap();

        let mut out = Vec::new();
        while let Some(batch) = sort.next().unwrap() {
            for tuple in batch.iter() {
                out.push(tuple.value_at(0).unwrap().to_string());
            }
        }
        sort.close().unwrap();

        assert_eq!(out, vec!["apple", "fig", "mango", "pear", "quince"]);
    }

    #[test]
    fn test_rejects_two_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 8, 2);
        let mut sort = ExternalSort::new(int_scan(&[1], &ctx), vec![0], "left", ctx);
        let err = sort.open().unwrap_err();
        assert!(matches!(err, GristError::InvalidConfig { .. }));
    }

    #[test]
    fn test_next_after_drain_stays_drained() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path(), 8, 3);
        let mut sort = ExternalSort::new(int_scan(&[2, 1], &ctx), vec![0], "left", ctx);
        sort.open().unwrap();
        drain_ints(&mut sort);
        assert!(sort.next().unwrap().is_none());
        sort.close().unwrap();
        // close twice is fine
        sort.close().unwrap();
    }
}
