//! Join operators and their shared plumbing.
//!
//! The planner hands a join operator its two children, a list of equality
//! conditions, a join type, and the execution context. Key columns are
//! resolved against the child schemas once at `open`, including a type
//! check, so the per-tuple comparisons on the hot path cannot fail on
//! mismatched tags.

mod block_nested;
mod sort_merge;

pub use block_nested::BlockNestedJoin;
pub use sort_merge::SortMergeJoin;

use grist_common::{GristError, GristResult};

use crate::schema::Schema;

/// The type of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Inner join: only matching pairs.
    Inner,
    /// Left outer join.
    Left,
    /// Right outer join.
    Right,
    /// Full outer join.
    Full,
}

/// One equality predicate between a left and a right attribute.
#[derive(Debug, Clone)]
pub struct Condition {
    /// Column name on the left input.
    pub left: String,
    /// Column name on the right input.
    pub right: String,
}

impl Condition {
    /// Creates an equality condition between the two named columns.
    pub fn on(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Resolves a condition list into parallel key-index vectors, verifying
/// that each pair of key columns exists and agrees on type.
pub(crate) fn resolve_keys(
    conditions: &[Condition],
    left_schema: &Schema,
    right_schema: &Schema,
) -> GristResult<(Vec<usize>, Vec<usize>)> {
    let mut left_keys = Vec::with_capacity(conditions.len());
    let mut right_keys = Vec::with_capacity(conditions.len());

    for condition in conditions {
        let l = left_schema.index_of(&condition.left)?;
        let r = right_schema.index_of(&condition.right)?;

        let lt = left_schema
            .field(l)
            .map(|f| f.column_type)
            .ok_or_else(|| GristError::internal("resolved key position out of range"))?;
        let rt = right_schema
            .field(r)
            .map(|f| f.column_type)
            .ok_or_else(|| GristError::internal("resolved key position out of range"))?;
        if lt.name() != rt.name() {
            return Err(GristError::TypeMismatch {
                left: lt.name(),
                right: rt.name(),
            });
        }

        left_keys.push(l);
        right_keys.push(r);
    }

    Ok((left_keys, right_keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    #[test]
    fn test_resolve_keys() {
        let left = Schema::new(vec![Field::int("id"), Field::varchar("name", 8)]);
        let right = Schema::new(vec![Field::varchar("label", 8), Field::int("ref_id")]);

        let conditions = vec![Condition::on("id", "ref_id")];
        let (lk, rk) = resolve_keys(&conditions, &left, &right).unwrap();
        assert_eq!(lk, vec![0]);
        assert_eq!(rk, vec![1]);
    }

    #[test]
    fn test_resolve_missing_column() {
        let left = Schema::new(vec![Field::int("id")]);
        let right = Schema::new(vec![Field::int("id")]);

        let conditions = vec![Condition::on("id", "nope")];
        let err = resolve_keys(&conditions, &left, &right).unwrap_err();
        assert!(matches!(err, GristError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_resolve_type_mismatch() {
        let left = Schema::new(vec![Field::int("id")]);
        let right = Schema::new(vec![Field::varchar("id", 8)]);

        let conditions = vec![Condition::on("id", "id")];
        let err = resolve_keys(&conditions, &left, &right).unwrap_err();
        assert!(matches!(err, GristError::TypeMismatch { .. }));
    }
}
