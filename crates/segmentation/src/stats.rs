//! Table-wide statistics used as segment thresholds.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use audience_core::{RecordTable, SegmentResult};

const X: &str = "__x";
const Y: &str = "__y";
const R: &str = "__r";
const N: &str = "__n";

fn chunked(values: &[f64]) -> Float64Chunked {
    Float64Chunked::from_vec("values", values.to_vec())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    chunked(values).mean()
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    chunked(values)
        .quantile(q, QuantileInterpolOptions::Linear)
        .ok()
        .flatten()
}

pub fn median(values: &[f64]) -> Option<f64> {
    chunked(values).median()
}

/// Pearson correlation of two columns over pairwise-complete rows. `None`
/// when fewer than two pairs remain or either side has zero variance.
pub fn pearson(table: &RecordTable, a: &str, b: &str) -> SegmentResult<Option<f64>> {
    let pairs = table
        .frame()
        .clone()
        .lazy()
        .select([table.numeric_expr(a)?.alias(X), table.numeric_expr(b)?.alias(Y)])
        .drop_nulls(None)
        .select([pearson_corr(col(X), col(Y), 1).alias(R), len().alias(N)])
        .collect()?;

    let n = pairs.column(N)?.cast(&DataType::UInt64)?;
    if n.u64()?.get(0).unwrap_or(0) < 2 {
        return Ok(None);
    }
    let r = pairs.column(R)?.cast(&DataType::Float64)?;
    let r = r.f64()?.get(0);
    Ok(r.filter(|r| r.is_finite()).map(|r| r.clamp(-1.0, 1.0)))
}

/// Five-number summary for a box plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

pub fn box_stats(label: impl Into<String>, values: &[f64]) -> Option<BoxStats> {
    Some(BoxStats {
        label: label.into(),
        count: values.len(),
        min: quantile(values, 0.0)?,
        q1: quantile(values, 0.25)?,
        median: quantile(values, 0.5)?,
        q3: quantile(values, 0.75)?,
        max: quantile(values, 1.0)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram over `[min, max]`; the last bin is closed on the
/// right. A constant input is widened to `[v - 0.5, v + 0.5]`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let values = chunked(values);
    let (Some(mut lo), Some(mut hi)) = (values.min(), values.max()) else {
        return Vec::new();
    };
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins {
                hi
            } else {
                lo + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for v in values.into_no_null_iter() {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}
