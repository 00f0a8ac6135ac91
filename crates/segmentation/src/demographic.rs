//! Demographic segment rules: age bands, categorical breakdowns, CLV
//! segments and the numeric correlation matrix.

use audience_core::{columns, labels, CellValue, RecordTable, SegmentError, SegmentResult};

use crate::rules::{count_categories, numeric_source, RuleOutput};
use crate::stats;
use crate::summary::{CategoryCount, CorrelationMatrix, SegmentSummary};

/// Age band for an age, or `None` below 18. Bands are half-open so
/// fractional ages still land in exactly one band.
pub fn age_band(age: f64) -> Option<&'static str> {
    if age < 18.0 {
        None
    } else if age < 26.0 {
        Some(labels::YOUNGER)
    } else if age < 46.0 {
        Some(labels::MIDDLE_AGED)
    } else {
        Some(labels::OLDER)
    }
}

/// Adds `Age Group` with one of Younger (18-25), Middle-Aged (26-45) or
/// Older (46+). Rows under 18 or without an age get no band.
pub fn classify_age_bands(table: &RecordTable) -> SegmentResult<RuleOutput> {
    let (ages, warning) = numeric_source(table, "age_bands", columns::AGE)?;

    let bands: Vec<Option<&'static str>> = ages.iter().map(|a| a.and_then(age_band)).collect();
    let counts = [labels::YOUNGER, labels::MIDDLE_AGED, labels::OLDER]
        .into_iter()
        .map(|label| CategoryCount::new(label, bands.iter().filter(|b| **b == Some(label)).count()))
        .collect();

    let cells = bands.into_iter().map(CellValue::from).collect();
    Ok(RuleOutput {
        table: table.with_column(columns::AGE_GROUP, cells)?,
        derived_columns: vec![columns::AGE_GROUP.to_string()],
        summary: SegmentSummary::Counts {
            column: columns::AGE_GROUP.to_string(),
            counts,
        },
        warnings: warning.into_iter().collect(),
    })
}

pub fn classify_gender(table: &RecordTable) -> SegmentResult<RuleOutput> {
    count_categories(table, columns::GENDER)
}

pub fn classify_location(table: &RecordTable) -> SegmentResult<RuleOutput> {
    count_categories(table, columns::LOCATION)
}

pub fn classify_income(table: &RecordTable) -> SegmentResult<RuleOutput> {
    count_categories(table, columns::INCOME_LEVEL)
}

/// Counts preference tokens, not rows: "Electronics, Books" adds one to
/// each category.
pub fn classify_product_preference(
    table: &RecordTable,
    delimiter: &str,
) -> SegmentResult<RuleOutput> {
    let counts = table
        .token_counts(columns::PRODUCT_PREFERENCES, delimiter)?
        .into_iter()
        .map(|(label, count)| CategoryCount::new(label, count))
        .collect();
    Ok(RuleOutput::aggregate_only(
        table,
        SegmentSummary::Counts {
            column: columns::PRODUCT_PREFERENCES.to_string(),
            counts,
        },
    ))
}

/// Adds `CLV Segment`: `High CLV` strictly above the mean of known values,
/// `Low CLV` otherwise. Rows without a value get no segment.
pub fn classify_clv(table: &RecordTable) -> SegmentResult<RuleOutput> {
    let (values, warning) = numeric_source(table, "clv", columns::CUSTOMER_LIFETIME_VALUE)?;
    let known: Vec<f64> = values.iter().flatten().copied().collect();
    let mean = stats::mean(&known).ok_or_else(|| {
        SegmentError::DegenerateInput(format!(
            "no numeric {} values to average",
            columns::CUSTOMER_LIFETIME_VALUE
        ))
    })?;

    let mut high = Vec::new();
    let mut low = Vec::new();
    let cells = values
        .iter()
        .map(|v| match v {
            Some(v) if *v > mean => {
                high.push(*v);
                CellValue::from(labels::HIGH_CLV)
            }
            Some(v) => {
                low.push(*v);
                CellValue::from(labels::LOW_CLV)
            }
            None => CellValue::Missing,
        })
        .collect();

    let boxes = [(labels::HIGH_CLV, &high), (labels::LOW_CLV, &low)]
        .into_iter()
        .filter_map(|(label, vals)| stats::box_stats(label, vals))
        .collect();

    Ok(RuleOutput {
        table: table.with_column(columns::CLV_SEGMENT, cells)?,
        derived_columns: vec![columns::CLV_SEGMENT.to_string()],
        summary: SegmentSummary::Segments {
            column: columns::CLV_SEGMENT.to_string(),
            threshold: mean,
            counts: vec![
                CategoryCount::new(labels::HIGH_CLV, high.len()),
                CategoryCount::new(labels::LOW_CLV, low.len()),
            ],
            boxes,
        },
        warnings: warning.into_iter().collect(),
    })
}

/// Pearson matrix across every numeric column, pairwise-complete.
pub fn correlate_numeric(table: &RecordTable) -> SegmentResult<RuleOutput> {
    let numeric = table.numeric_columns();
    if numeric.len() < 2 {
        return Err(SegmentError::InsufficientColumns {
            needed: 2,
            found: numeric.len(),
        });
    }

    let values = numeric
        .iter()
        .map(|a| {
            numeric
                .iter()
                .map(|b| stats::pearson(table, a, b))
                .collect::<SegmentResult<Vec<_>>>()
        })
        .collect::<SegmentResult<Vec<_>>>()?;

    Ok(RuleOutput::aggregate_only(
        table,
        SegmentSummary::Correlation(CorrelationMatrix {
            columns: numeric,
            values,
        }),
    ))
}
