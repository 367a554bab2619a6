//! In-memory scan operator.
//!
//! `MemScan` is the leaf that feeds the execution core in tests, examples,
//! and embedded use: it serves a fixed tuple list one page at a time. A
//! production leaf scan reading base tables plugs in through the same
//! [`Operator`] trait.

use std::sync::Arc;

use grist_common::{GristError, GristResult};

use crate::batch::Batch;
use crate::context::ExecContext;
use crate::operator::Operator;
use crate::schema::{ColumnType, Schema};
use crate::tuple::Tuple;
use crate::value::Value;

/// Serves an in-memory tuple list one page at a time.
#[derive(Debug)]
pub struct MemScan {
    schema: Arc<Schema>,
    tuples: Vec<Tuple>,
    ctx: ExecContext,
    page_capacity: usize,
    cursor: usize,
}

impl MemScan {
    /// Creates a scan over the given tuples.
    #[must_use]
    pub fn new(schema: Arc<Schema>, tuples: Vec<Tuple>, ctx: ExecContext) -> Self {
        Self {
            schema,
            tuples,
            ctx,
            page_capacity: 0,
            cursor: 0,
        }
    }

    /// Checks one tuple against the schema: arity, value tags, and varchar
    /// widths.
    fn check_tuple(&self, tuple: &Tuple) -> GristResult<()> {
        if tuple.arity() != self.schema.num_columns() {
            return Err(GristError::internal(format!(
                "tuple arity {} does not match schema arity {}",
                tuple.arity(),
                self.schema.num_columns()
            )));
        }
        for (value, field) in tuple.values().iter().zip(self.schema.fields()) {
            match (value, field.column_type) {
                (Value::Int(_), ColumnType::Int) | (Value::Float(_), ColumnType::Float) => {}
                (Value::String(s), ColumnType::Varchar(width)) => {
                    if s.len() > width {
                        return Err(GristError::ValueTooWide {
                            size: s.len(),
                            width,
                        });
                    }
                }
                (value, _) => {
                    return Err(GristError::internal(format!(
                        "{} value in column '{}'",
                        value.type_name(),
                        field.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Operator for MemScan {
    fn open(&mut self) -> GristResult<()> {
        let tuple_size = self.schema.tuple_size();
        let page_size = self.ctx.page_size();
        if tuple_size == 0 || page_size < tuple_size {
            return Err(GristError::PageTooSmall {
                page_size,
                tuple_size,
            });
        }
        self.page_capacity = page_size / tuple_size;
        self.cursor = 0;

        for tuple in &self.tuples {
            self.check_tuple(tuple)?;
        }
        Ok(())
    }

    fn next(&mut self) -> GristResult<Option<Batch>> {
        if self.cursor >= self.tuples.len() {
            return Ok(None);
        }
        let end = (self.cursor + self.page_capacity).min(self.tuples.len());
        let mut batch = Batch::with_capacity(self.page_capacity);
        for tuple in &self.tuples[self.cursor..end] {
            batch.push(tuple.clone());
        }
        self.cursor = end;
        Ok(Some(batch))
    }

    fn close(&mut self) -> GristResult<()> {
        Ok(())
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use grist_common::EngineConfig;

    fn ctx(page_size: usize) -> ExecContext {
        ExecContext::new(EngineConfig::for_testing(page_size, 3, "."))
    }

    fn int_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![Field::int("x")]))
    }

    fn int_tuples(values: &[i32]) -> Vec<Tuple> {
        values.iter().map(|&v| Tuple::new(vec![Value::int(v)])).collect()
    }

    #[test]
    fn test_pages_are_full_except_last() {
        let mut scan = MemScan::new(int_schema(), int_tuples(&[1, 2, 3, 4, 5]), ctx(8));
        scan.open().unwrap();

        let first = scan.next().unwrap().unwrap();
        assert_eq!(first.len(), 2);
        let second = scan.next().unwrap().unwrap();
        assert_eq!(second.len(), 2);
        let third = scan.next().unwrap().unwrap();
        assert_eq!(third.len(), 1);
        assert!(scan.next().unwrap().is_none());
        assert!(scan.next().unwrap().is_none());
    }

    #[test]
    fn test_empty_scan() {
        let mut scan = MemScan::new(int_schema(), Vec::new(), ctx(8));
        scan.open().unwrap();
        assert!(scan.next().unwrap().is_none());
    }

    #[test]
    fn test_page_smaller_than_tuple_fails_open() {
        let mut scan = MemScan::new(int_schema(), int_tuples(&[1]), ctx(2));
        let err = scan.open().unwrap_err();
        assert!(matches!(err, GristError::PageTooSmall { .. }));
    }

    #[test]
    fn test_oversized_string_fails_open() {
        let schema = Arc::new(Schema::new(vec![Field::varchar("name", 4)]));
        let tuples = vec![Tuple::new(vec![Value::string("too long")])];
        let mut scan = MemScan::new(schema, tuples, ctx(64));
        let err = scan.open().unwrap_err();
        assert!(matches!(err, GristError::ValueTooWide { .. }));
    }

    #[test]
    fn test_wrong_type_fails_open() {
        let schema = Arc::new(Schema::new(vec![Field::int("x")]));
        let tuples = vec![Tuple::new(vec![Value::string("nope")])];
        let mut scan = MemScan::new(schema, tuples, ctx(64));
        assert!(scan.open().is_err());
    }
}
