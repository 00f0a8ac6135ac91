//! Chart-ready aggregates produced alongside each derived segment.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::stats::{BoxStats, HistogramBin};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
}

impl CategoryCount {
    pub fn new(label: impl Into<String>, count: usize) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTotal {
    pub key: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// Row-major; `None` where the coefficient is undefined.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentSummary {
    Counts {
        column: String,
        counts: Vec<CategoryCount>,
    },
    Flag {
        column: String,
        threshold: Option<f64>,
        reference_date: Option<NaiveDate>,
        positive: usize,
        negative: usize,
        excluded: usize,
    },
    Segments {
        column: String,
        threshold: f64,
        counts: Vec<CategoryCount>,
        boxes: Vec<BoxStats>,
    },
    GroupTotals {
        key_column: String,
        value_column: String,
        totals: Vec<GroupTotal>,
    },
    Correlation(CorrelationMatrix),
    Histogram {
        column: String,
        bins: Vec<HistogramBin>,
        marker: Option<f64>,
    },
}

impl SegmentSummary {
    /// Count for a label in a `Counts` or `Segments` summary.
    pub fn count_of(&self, label: &str) -> Option<usize> {
        let counts = match self {
            SegmentSummary::Counts { counts, .. } | SegmentSummary::Segments { counts, .. } => {
                counts
            }
            _ => return None,
        };
        counts.iter().find(|c| c.label == label).map(|c| c.count)
    }

    /// Build a flag summary from a derived boolean column.
    pub fn flag(
        column: impl Into<String>,
        threshold: Option<f64>,
        flags: &[Option<bool>],
    ) -> Self {
        let positive = flags.iter().filter(|f| **f == Some(true)).count();
        let negative = flags.iter().filter(|f| **f == Some(false)).count();
        SegmentSummary::Flag {
            column: column.into(),
            threshold,
            reference_date: None,
            positive,
            negative,
            excluded: flags.len() - positive - negative,
        }
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        if let SegmentSummary::Flag { reference_date, .. } = &mut self {
            *reference_date = Some(date);
        }
        self
    }
}
