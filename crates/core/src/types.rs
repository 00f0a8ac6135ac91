use std::fmt;

use serde::{Deserialize, Serialize};

/// Source and derived column names. Matching is exact and case-sensitive.
pub mod columns {
    pub const AGE: &str = "Age";
    pub const GENDER: &str = "Gender";
    pub const LOCATION: &str = "Location";
    pub const INCOME_LEVEL: &str = "Income Level";
    pub const PRODUCT_PREFERENCES: &str = "Product Category Preferences";
    pub const CUSTOMER_LIFETIME_VALUE: &str = "Customer Lifetime Value";
    pub const TOTAL_EXPENDITURE: &str = "Total Expenditure(till Date)";
    pub const TRANSACTION_ID: &str = "Transaction ID";
    pub const CUSTOMER_ID: &str = "Customer ID";
    pub const SHIPPING_ADDRESS: &str = "Shipping Address";
    pub const QUANTITY_PURCHASED: &str = "Quantity Purchased";
    pub const TRANSACTION_DATE: &str = "Transaction Date";
    pub const SEASON: &str = "Season";

    pub const AGE_GROUP: &str = "Age Group";
    pub const CLV_SEGMENT: &str = "CLV Segment";
    pub const HIGH_SPEND_BUYER: &str = "High Spend Buyer";
    pub const FREQUENT_BUYER: &str = "Frequent Buyer";
    pub const HIGH_CLV: &str = "High CLV";
    /// Per-address group total of `Quantity Purchased`. The name says "max"
    /// but the value is a sum; consumers read it as such.
    pub const MAX_PRODUCT_SOLD: &str = "Max Product Sold";
    pub const CHURN: &str = "Churn";
}

/// Categorical label values.
pub mod labels {
    pub const YOUNGER: &str = "Younger";
    pub const MIDDLE_AGED: &str = "Middle-Aged";
    pub const OLDER: &str = "Older";
    pub const HIGH_CLV: &str = "High CLV";
    pub const LOW_CLV: &str = "Low CLV";
    pub const MALE: &str = "Male";
    pub const FEMALE: &str = "Female";
}

/// Which family of rules a caller asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SegmentGroup {
    Demographic,
    Transactional,
}

impl fmt::Display for SegmentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentGroup::Demographic => write!(f, "demographic"),
            SegmentGroup::Transactional => write!(f, "transactional"),
        }
    }
}

impl std::str::FromStr for SegmentGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demographic" => Ok(SegmentGroup::Demographic),
            "transactional" => Ok(SegmentGroup::Transactional),
            other => Err(format!("unknown segment group: {other}")),
        }
    }
}

/// Non-fatal data problem found while deriving a segment. Affected rows are
/// left out of the derived label, never defaulted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataQualityWarning {
    pub rule: String,
    pub column: String,
    pub message: String,
    /// Zero-based row indices that were excluded.
    pub rows: Vec<usize>,
}

impl DataQualityWarning {
    pub fn new(
        rule: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
        rows: Vec<usize>,
    ) -> Self {
        Self {
            rule: rule.into(),
            column: column.into(),
            message: message.into(),
            rows,
        }
    }
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.column, self.message)
    }
}

/// A promotion suggestion tied to a non-empty segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendation {
    pub title: String,
    pub body: String,
    pub segment_column: String,
    pub group: SegmentGroup,
    pub matched_rows: usize,
}
