//! Predicate types and evaluation logic for promotion conditions.

use serde::{Deserialize, Serialize};

use audience_core::{CellValue, RowView};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: String,
        operator: ComparisonOperator,
        value: CellValue,
    },
    /// Inclusive on both ends.
    Between {
        column: String,
        low: CellValue,
        high: CellValue,
    },
    IsTrue {
        column: String,
    },
}

impl Predicate {
    pub fn equals(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Predicate::Compare {
            column: column.into(),
            operator: ComparisonOperator::Equals,
            value: value.into(),
        }
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<CellValue>,
        high: impl Into<CellValue>,
    ) -> Self {
        Predicate::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn at_least(column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Predicate::Compare {
            column: column.into(),
            operator: ComparisonOperator::GreaterThanOrEqual,
            value: value.into(),
        }
    }

    pub fn is_true(column: impl Into<String>) -> Self {
        Predicate::IsTrue {
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::Between { column, .. }
            | Predicate::IsTrue { column } => column,
        }
    }

    /// A row whose column is absent or missing never matches.
    pub fn matches(&self, row: RowView<'_>) -> bool {
        let Some(actual) = row.get(self.column()) else {
            return false;
        };
        if actual.is_missing() {
            return false;
        }
        match self {
            Predicate::Compare {
                operator, value, ..
            } => compare_values(&actual, operator, value),
            Predicate::Between { low, high, .. } => {
                compare_values(&actual, &ComparisonOperator::GreaterThanOrEqual, low)
                    && compare_values(&actual, &ComparisonOperator::LessThanOrEqual, high)
            }
            Predicate::IsTrue { .. } => actual.as_bool() == Some(true),
        }
    }
}

pub fn compare_values(
    actual: &CellValue,
    operator: &ComparisonOperator,
    expected: &CellValue,
) -> bool {
    use std::cmp::Ordering;

    match operator {
        ComparisonOperator::Equals => values_equal(actual, expected),
        ComparisonOperator::GreaterThanOrEqual => {
            matches!(ordering(actual, expected), Some(Ordering::Greater | Ordering::Equal))
        }
        ComparisonOperator::LessThanOrEqual => {
            matches!(ordering(actual, expected), Some(Ordering::Less | Ordering::Equal))
        }
    }
}

/// Integers and floats compare by value.
fn values_equal(a: &CellValue, b: &CellValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(a: &CellValue, b: &CellValue) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (CellValue::Date(x), CellValue::Date(y)) => Some(x.cmp(y)),
        (CellValue::Text(x), CellValue::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audience_core::RecordTable;
    use serde_json::json;

    fn sample() -> RecordTable {
        RecordTable::from_json_str(
            &json!([
                {"Age": 18, "Gender": "Male", "Churn": true},
                {"Age": 25.0, "Gender": "Female", "Churn": false},
                {"Age": 40, "Gender": null, "Churn": null}
            ])
            .to_string(),
        )
        .unwrap()
    }

    fn count(table: &RecordTable, predicate: &Predicate) -> usize {
        table.count_where(|row| predicate.matches(row))
    }

    #[test]
    fn test_equals_text() {
        let t = sample();
        assert_eq!(count(&t, &Predicate::equals("Gender", "Male")), 1);
        assert_eq!(count(&t, &Predicate::equals("Gender", "Other")), 0);
    }

    #[test]
    fn test_between_is_inclusive_and_mixes_int_float() {
        let t = sample();
        let young = Predicate::between("Age", 18, 25);
        assert_eq!(count(&t, &young), 2);
        assert_eq!(count(&t, &Predicate::between("Age", 26, 45)), 1);
    }

    #[test]
    fn test_at_least_is_inclusive() {
        let t = sample();
        assert_eq!(count(&t, &Predicate::at_least("Age", 40)), 1);
        assert_eq!(count(&t, &Predicate::at_least("Age", 41)), 0);
        assert_eq!(count(&t, &Predicate::at_least("Age", 25.0)), 2);
    }

    #[test]
    fn test_is_true_ignores_missing() {
        let t = sample();
        assert_eq!(count(&t, &Predicate::is_true("Churn")), 1);
    }

    #[test]
    fn test_absent_column_never_matches() {
        let t = sample();
        assert_eq!(count(&t, &Predicate::is_true("Frequent Buyer")), 0);
    }

    #[test]
    fn test_compare_numbers() {
        assert!(compare_values(
            &CellValue::Int(3),
            &ComparisonOperator::GreaterThanOrEqual,
            &CellValue::Float(2.5)
        ));
        assert!(!compare_values(
            &CellValue::Int(3),
            &ComparisonOperator::LessThanOrEqual,
            &CellValue::Float(2.5)
        ));
        assert!(compare_values(
            &CellValue::Float(2.0),
            &ComparisonOperator::Equals,
            &CellValue::Int(2)
        ));
        assert!(!compare_values(
            &CellValue::text("a"),
            &ComparisonOperator::LessThanOrEqual,
            &CellValue::Int(1)
        ));
    }

    #[test]
    fn test_predicate_serde_shape() {
        let p = Predicate::equals("CLV Segment", "High CLV");
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["type"], "compare");
        assert_eq!(value["operator"], "equals");
        assert_eq!(value["value"], "High CLV");
    }
}
