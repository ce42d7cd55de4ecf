//! Filter Service
//!
//! Evaluates typed filter conditions against records. Evaluation fails
//! closed: a missing field or an unparseable number is a non-match, never
//! an error.

use crate::types::{
    FieldValue, FilterCondition, FilterValue, Operator, Record, RecordCollections,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Records that satisfy every active condition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilteredView {
    pub balance: Vec<Record>,
    pub positions: Vec<Record>,
}

impl FilteredView {
    pub fn total(&self) -> usize {
        self.balance.len() + self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Filter evaluation
pub struct FilterService;

impl FilterService {
    /// Test one condition against a record
    pub fn matches(record: &Record, condition: &FilterCondition) -> bool {
        let Some(field_value) = record.get(&condition.field) else {
            return false;
        };

        match condition.operator {
            Operator::Equals => Self::compare_text(field_value, &condition.value, |f, v| f == v),
            Operator::Contains => {
                Self::compare_text(field_value, &condition.value, |f, v| f.contains(v))
            }
            Operator::StartsWith => {
                Self::compare_text(field_value, &condition.value, |f, v| f.starts_with(v))
            }
            Operator::EndsWith => {
                Self::compare_text(field_value, &condition.value, |f, v| f.ends_with(v))
            }
            Operator::Gt => Self::compare_number(field_value, &condition.value, |f, v| f > v),
            Operator::Gte => Self::compare_number(field_value, &condition.value, |f, v| f >= v),
            Operator::Lt => Self::compare_number(field_value, &condition.value, |f, v| f < v),
            Operator::Lte => Self::compare_number(field_value, &condition.value, |f, v| f <= v),
            Operator::Between => Self::in_range(field_value, &condition.value),
            Operator::In => match &condition.value {
                FilterValue::List(values) => values.iter().any(|v| v == field_value),
                _ => false,
            },
        }
    }

    /// Logical AND across conditions; an empty list matches everything
    pub fn matches_all(record: &Record, conditions: &[FilterCondition]) -> bool {
        conditions.iter().all(|c| Self::matches(record, c))
    }

    /// Apply a condition set to both collections.
    ///
    /// An empty condition set yields an empty view rather than every record.
    pub fn apply(collections: &RecordCollections, conditions: &[FilterCondition]) -> FilteredView {
        if conditions.is_empty() {
            return FilteredView::default();
        }

        let balance: Vec<Record> = collections
            .balance
            .iter()
            .filter(|r| Self::matches_all(r, conditions))
            .cloned()
            .collect();

        let positions: Vec<Record> = collections
            .positions
            .iter()
            .filter(|r| Self::matches_all(r, conditions))
            .cloned()
            .collect();

        debug!(
            "FilterService::apply - {} conditions, {} balance / {} position matches",
            conditions.len(),
            balance.len(),
            positions.len()
        );

        FilteredView { balance, positions }
    }

    // ========================================================================
    // Private Helper Methods
    // ========================================================================

    fn compare_text(
        field_value: &FieldValue,
        condition_value: &FilterValue,
        op: impl Fn(&str, &str) -> bool,
    ) -> bool {
        let FilterValue::Scalar(expected) = condition_value else {
            return false;
        };
        if expected.is_null() {
            return false;
        }

        let field_text = field_value.to_string().to_lowercase();
        let expected_text = expected.to_string().to_lowercase();
        op(&field_text, &expected_text)
    }

    fn compare_number(
        field_value: &FieldValue,
        condition_value: &FilterValue,
        op: impl Fn(f64, f64) -> bool,
    ) -> bool {
        let FilterValue::Scalar(expected) = condition_value else {
            return false;
        };

        match (field_value.as_f64(), expected.as_f64()) {
            (Some(f), Some(v)) => op(f, v),
            _ => false,
        }
    }

    fn in_range(field_value: &FieldValue, condition_value: &FilterValue) -> bool {
        let FilterValue::Range { min, max } = condition_value else {
            return false;
        };
        let Some(value) = field_value.as_f64() else {
            return false;
        };

        min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
    }
}
