//! Transactional segment rules: spend, purchase frequency, CLV quantile,
//! geolocation totals, churn window and seasonality.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;

use audience_core::{columns, CellValue, DataQualityWarning, RecordTable, SegmentError, SegmentResult};

use crate::rules::{count_categories, flag_cells, keyless_rows, numeric_source, RuleOutput};
use crate::stats;
use crate::summary::{GroupTotal, SegmentSummary};

fn known_values(values: &[Option<f64>], column: &str) -> SegmentResult<Vec<f64>> {
    let known: Vec<f64> = values.iter().flatten().copied().collect();
    if known.is_empty() {
        return Err(SegmentError::DegenerateInput(format!(
            "no numeric {column} values to compute a threshold from"
        )));
    }
    Ok(known)
}

fn threshold_flag(
    table: &RecordTable,
    rule: &str,
    source: &str,
    target: &str,
    threshold_of: impl Fn(&[f64]) -> Option<f64>,
) -> SegmentResult<RuleOutput> {
    let (values, warning) = numeric_source(table, rule, source)?;
    let known = known_values(&values, source)?;
    let threshold = threshold_of(&known).ok_or_else(|| {
        SegmentError::DegenerateInput(format!("threshold for {source} is undefined"))
    })?;

    let flags: Vec<Option<bool>> = values.iter().map(|v| v.map(|v| v >= threshold)).collect();
    Ok(RuleOutput {
        table: table.with_column(target, flag_cells(&flags))?,
        derived_columns: vec![target.to_string()],
        summary: SegmentSummary::flag(target, Some(threshold), &flags),
        warnings: warning.into_iter().collect(),
    })
}

/// `High Spend Buyer` when expenditure is at or above the median.
pub fn classify_spend(table: &RecordTable) -> SegmentResult<RuleOutput> {
    threshold_flag(
        table,
        "spend",
        columns::TOTAL_EXPENDITURE,
        columns::HIGH_SPEND_BUYER,
        stats::median,
    )
}

/// `High CLV` when expenditure is at or above the given quantile (0.75 by
/// default).
pub fn classify_clv_transactional(table: &RecordTable, q: f64) -> SegmentResult<RuleOutput> {
    threshold_flag(
        table,
        "clv_transactional",
        columns::TOTAL_EXPENDITURE,
        columns::HIGH_CLV,
        |values| stats::quantile(values, q),
    )
}

const PER_CUSTOMER: &str = "__per_customer";

/// `Frequent Buyer` for every row of a customer whose distinct transaction
/// count reaches the table-wide ratio of distinct transactions to distinct
/// customers.
pub fn classify_frequency(table: &RecordTable) -> SegmentResult<RuleOutput> {
    table.require(&[columns::TRANSACTION_ID, columns::CUSTOMER_ID])?;

    let frame = table.frame();
    let customers = frame.column(columns::CUSTOMER_ID)?.drop_nulls().n_unique()?;
    if customers == 0 {
        return Err(SegmentError::DegenerateInput(format!(
            "zero distinct {} values",
            columns::CUSTOMER_ID
        )));
    }
    let transactions = frame.column(columns::TRANSACTION_ID)?.drop_nulls().n_unique()?;
    let threshold = transactions as f64 / customers as f64;

    let per_customer = frame
        .clone()
        .lazy()
        .select([col(columns::TRANSACTION_ID)
            .filter(col(columns::TRANSACTION_ID).is_not_null())
            .n_unique()
            .over([col(columns::CUSTOMER_ID)])
            .cast(DataType::Float64)
            .alias(PER_CUSTOMER)])
        .collect()?;
    let keyless = keyless_rows(table, columns::CUSTOMER_ID)?;
    let mut flags: Vec<Option<bool>> = per_customer
        .column(PER_CUSTOMER)?
        .f64()?
        .into_iter()
        .map(|n| Some(n.unwrap_or(0.0) >= threshold))
        .collect();
    for &row in &keyless {
        flags[row] = None;
    }

    let mut warnings = Vec::new();
    if !keyless.is_empty() {
        warnings.push(DataQualityWarning::new(
            "frequency",
            columns::CUSTOMER_ID,
            format!(
                "{} rows had no {}; they carry no frequency flag",
                keyless.len(),
                columns::CUSTOMER_ID
            ),
            keyless,
        ));
    }

    Ok(RuleOutput {
        table: table.with_column(columns::FREQUENT_BUYER, flag_cells(&flags))?,
        derived_columns: vec![columns::FREQUENT_BUYER.to_string()],
        summary: SegmentSummary::flag(columns::FREQUENT_BUYER, Some(threshold), &flags),
        warnings,
    })
}

/// Adds `Max Product Sold`: the total `Quantity Purchased` of every row
/// sharing the row's `Shipping Address`. It is a group sum, not a maximum.
pub fn aggregate_geolocation(table: &RecordTable) -> SegmentResult<RuleOutput> {
    table.require(&[columns::SHIPPING_ADDRESS, columns::QUANTITY_PURCHASED])?;

    let totals = table.group_sum(columns::SHIPPING_ADDRESS, columns::QUANTITY_PURCHASED)?;
    let cells = table.group_sum_per_row(columns::SHIPPING_ADDRESS, columns::QUANTITY_PURCHASED)?;
    let (_, quantity_warning) =
        numeric_source(table, "geolocation", columns::QUANTITY_PURCHASED)?;

    let mut warnings: Vec<DataQualityWarning> = quantity_warning.into_iter().collect();
    let keyless = keyless_rows(table, columns::SHIPPING_ADDRESS)?;
    if !keyless.is_empty() {
        warnings.push(DataQualityWarning::new(
            "geolocation",
            columns::SHIPPING_ADDRESS,
            format!(
                "{} rows had no {}; they belong to no group",
                keyless.len(),
                columns::SHIPPING_ADDRESS
            ),
            keyless,
        ));
    }

    Ok(RuleOutput {
        table: table.with_column(columns::MAX_PRODUCT_SOLD, cells)?,
        derived_columns: vec![columns::MAX_PRODUCT_SOLD.to_string()],
        summary: SegmentSummary::GroupTotals {
            key_column: columns::SHIPPING_ADDRESS.to_string(),
            value_column: columns::MAX_PRODUCT_SOLD.to_string(),
            totals: totals
                .into_iter()
                .map(|(key, total)| GroupTotal { key, total })
                .collect(),
        },
        warnings,
    })
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Timestamp of a cell, if it holds one. Bare dates are midnight.
pub fn parse_timestamp(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        CellValue::Text(s) => {
            let s = s.trim();
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .or_else(|| {
                    DATE_FORMATS
                        .iter()
                        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                        .map(|d| d.and_time(NaiveTime::MIN))
                })
                .or_else(|| {
                    DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|dt| dt.naive_utc())
                })
        }
        _ => None,
    }
}

/// Normalizes `Transaction Date` to dates and adds `Churn`. A row churns
/// when the whole days between it and the latest valid timestamp exceed
/// `window_days`; time of day counts, so 365 days and 23 hours is 365 days.
/// Unparseable dates are reported and carry no flag.
pub fn classify_churn(table: &RecordTable, window_days: i64) -> SegmentResult<RuleOutput> {
    let stamps: Vec<Option<NaiveDateTime>> = table
        .column(columns::TRANSACTION_DATE)?
        .iter()
        .map(parse_timestamp)
        .collect();

    let mut warnings = Vec::new();
    let unparseable: Vec<usize> = stamps
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_none())
        .map(|(i, _)| i)
        .collect();
    if !unparseable.is_empty() {
        warnings.push(DataQualityWarning::new(
            "churn",
            columns::TRANSACTION_DATE,
            format!(
                "{} rows had unparseable {}; they carry no churn flag",
                unparseable.len(),
                columns::TRANSACTION_DATE
            ),
            unparseable,
        ));
    }

    let reference = stamps.iter().flatten().max().copied().ok_or_else(|| {
        SegmentError::DegenerateInput(format!(
            "no valid {} to use as reference",
            columns::TRANSACTION_DATE
        ))
    })?;

    let flags: Vec<Option<bool>> = stamps
        .iter()
        .map(|t| t.map(|t| (reference - t).num_days() > window_days))
        .collect();

    let normalized = stamps.iter().map(|t| CellValue::from(t.map(|t| t.date()))).collect();
    let table = table
        .with_column(columns::TRANSACTION_DATE, normalized)?
        .with_column(columns::CHURN, flag_cells(&flags))?;

    Ok(RuleOutput {
        table,
        derived_columns: vec![columns::CHURN.to_string()],
        summary: SegmentSummary::flag(columns::CHURN, Some(window_days as f64), &flags)
            .with_reference_date(reference.date()),
        warnings,
    })
}

/// Transactions per season.
pub fn classify_season(table: &RecordTable) -> SegmentResult<RuleOutput> {
    count_categories(table, columns::SEASON)
}

/// Expenditure histogram with the high-CLV quantile as a marker.
pub fn expenditure_distribution(
    table: &RecordTable,
    bins: usize,
    q: f64,
) -> SegmentResult<RuleOutput> {
    let (values, warning) =
        numeric_source(table, "expenditure_distribution", columns::TOTAL_EXPENDITURE)?;
    let known = known_values(&values, columns::TOTAL_EXPENDITURE)?;

    let mut output = RuleOutput::aggregate_only(
        table,
        SegmentSummary::Histogram {
            column: columns::TOTAL_EXPENDITURE.to_string(),
            bins: stats::histogram(&known, bins),
            marker: stats::quantile(&known, q),
        },
    );
    output.warnings.extend(warning);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(value: serde_json::Value) -> RecordTable {
        RecordTable::from_json_str(&value.to_string()).unwrap()
    }

    fn flags(table: &RecordTable, column: &str) -> Vec<Option<bool>> {
        table.column(column).unwrap().iter().map(CellValue::as_bool).collect()
    }

    #[test]
    fn test_spend_median_is_inclusive() {
        // median = 200
        let t = table(json!([
            {"Total Expenditure(till Date)": 100},
            {"Total Expenditure(till Date)": 200},
            {"Total Expenditure(till Date)": 300}
        ]));
        let out = classify_spend(&t).unwrap();
        assert_eq!(
            flags(&out.table, columns::HIGH_SPEND_BUYER),
            vec![Some(false), Some(true), Some(true)]
        );
        match out.summary {
            SegmentSummary::Flag {
                threshold,
                positive,
                negative,
                excluded,
                ..
            } => {
                assert_eq!(threshold, Some(200.0));
                assert_eq!((positive, negative, excluded), (2, 1, 0));
            }
            other => panic!("unexpected summary: {other:?}"),
        }
    }

    #[test]
    fn test_spend_missing_value_gets_no_flag() {
        let t = table(json!([
            {"Total Expenditure(till Date)": 100},
            {"Total Expenditure(till Date)": null},
            {"Total Expenditure(till Date)": 300}
        ]));
        let out = classify_spend(&t).unwrap();
        assert_eq!(
            flags(&out.table, columns::HIGH_SPEND_BUYER),
            vec![Some(false), None, Some(true)]
        );
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].rows, vec![1]);
    }

    #[test]
    fn test_spend_all_missing_is_degenerate() {
        let t = table(json!([{"Total Expenditure(till Date)": null}]));
        assert!(matches!(
            classify_spend(&t),
            Err(SegmentError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_clv_transactional_quantile() {
        // q75 of [10, 20, 30, 40, 50] = 40
        let t = table(json!([
            {"Total Expenditure(till Date)": 10},
            {"Total Expenditure(till Date)": 20},
            {"Total Expenditure(till Date)": 30},
            {"Total Expenditure(till Date)": 40},
            {"Total Expenditure(till Date)": 50}
        ]));
        let out = classify_clv_transactional(&t, 0.75).unwrap();
        assert_eq!(
            flags(&out.table, columns::HIGH_CLV),
            vec![Some(false), Some(false), Some(false), Some(true), Some(true)]
        );
    }

    #[test]
    fn test_frequency_threshold_ratio() {
        // 10 transactions across 4 customers -> threshold 2.5
        let t = table(json!([
            {"Customer ID": "A", "Transaction ID": "T1"},
            {"Customer ID": "A", "Transaction ID": "T2"},
            {"Customer ID": "A", "Transaction ID": "T3"},
            {"Customer ID": "B", "Transaction ID": "T4"},
            {"Customer ID": "B", "Transaction ID": "T5"},
            {"Customer ID": "B", "Transaction ID": "T6"},
            {"Customer ID": "C", "Transaction ID": "T7"},
            {"Customer ID": "C", "Transaction ID": "T8"},
            {"Customer ID": "D", "Transaction ID": "T9"},
            {"Customer ID": "D", "Transaction ID": "T10"}
        ]));
        let out = classify_frequency(&t).unwrap();
        let flags = flags(&out.table, columns::FREQUENT_BUYER);
        assert_eq!(&flags[0..3], &[Some(true); 3]);
        assert_eq!(&flags[3..6], &[Some(true); 3]);
        assert_eq!(&flags[6..10], &[Some(false); 4]);
        match out.summary {
            SegmentSummary::Flag { threshold, .. } => assert_eq!(threshold, Some(2.5)),
            other => panic!("unexpected summary: {other:?}"),
        }
    }

    #[test]
    fn test_frequency_counts_distinct_transactions() {
        // A repeats T1, so A has 1 distinct transaction; threshold = 3 / 2
        let t = table(json!([
            {"Customer ID": 1, "Transaction ID": "T1"},
            {"Customer ID": 1, "Transaction ID": "T1"},
            {"Customer ID": 2, "Transaction ID": "T2"},
            {"Customer ID": 2, "Transaction ID": "T3"}
        ]));
        let out = classify_frequency(&t).unwrap();
        assert_eq!(
            flags(&out.table, columns::FREQUENT_BUYER),
            vec![Some(false), Some(false), Some(true), Some(true)]
        );
    }

    #[test]
    fn test_frequency_zero_customers_is_degenerate() {
        let t = table(json!([{"Customer ID": null, "Transaction ID": "T1"}]));
        assert!(matches!(
            classify_frequency(&t),
            Err(SegmentError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_geolocation_broadcasts_group_sum() {
        let t = table(json!([
            {"Shipping Address": "NY", "Quantity Purchased": 2},
            {"Shipping Address": "LA", "Quantity Purchased": 4},
            {"Shipping Address": "NY", "Quantity Purchased": 3}
        ]));
        let out = aggregate_geolocation(&t).unwrap();
        let totals = out.table.column(columns::MAX_PRODUCT_SOLD).unwrap();
        assert_eq!(
            totals,
            vec![CellValue::Int(5), CellValue::Int(4), CellValue::Int(5)]
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_geolocation_float_quantities_and_missing_address() {
        let t = table(json!([
            {"Shipping Address": "NY", "Quantity Purchased": 1.5},
            {"Shipping Address": null, "Quantity Purchased": 4},
            {"Shipping Address": "NY", "Quantity Purchased": 1}
        ]));
        let out = aggregate_geolocation(&t).unwrap();
        assert_eq!(
            out.table.cell(0, columns::MAX_PRODUCT_SOLD),
            Some(CellValue::Float(2.5))
        );
        assert_eq!(
            out.table.cell(1, columns::MAX_PRODUCT_SOLD),
            Some(CellValue::Missing)
        );
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let midnight = day.and_time(NaiveTime::MIN);
        let morning = day.and_hms_opt(10, 30, 0).unwrap();
        for (raw, expected) in [
            ("2024-03-15", midnight),
            ("2024/03/15", midnight),
            ("03/15/2024", midnight),
            ("2024-03-15 10:30:00", morning),
            ("2024-03-15T10:30:00Z", morning),
        ] {
            assert_eq!(parse_timestamp(&CellValue::text(raw)), Some(expected), "{raw}");
        }
        assert_eq!(parse_timestamp(&CellValue::Date(day)), Some(midnight));
        assert_eq!(parse_timestamp(&CellValue::text("yesterday")), None);
        assert_eq!(parse_timestamp(&CellValue::Int(20240315)), None);
        assert_eq!(parse_timestamp(&CellValue::Missing), None);
    }

    #[test]
    fn test_churn_window_boundary() {
        // 2024 is a leap year: 2023-03-01 is 366 days before 2024-03-01.
        let t = table(json!([
            {"Transaction Date": "2024-03-01"},
            {"Transaction Date": "2023-03-02"},
            {"Transaction Date": "2023-03-01"},
            {"Transaction Date": "not a date"}
        ]));
        let out = classify_churn(&t, 365).unwrap();
        assert_eq!(
            flags(&out.table, columns::CHURN),
            vec![Some(false), Some(false), Some(true), None]
        );
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].rows, vec![3]);
        assert_eq!(
            out.table.cell(3, columns::TRANSACTION_DATE),
            Some(CellValue::Missing)
        );
        match out.summary {
            SegmentSummary::Flag {
                reference_date,
                excluded,
                ..
            } => {
                assert_eq!(reference_date, NaiveDate::from_ymd_opt(2024, 3, 1));
                assert_eq!(excluded, 1);
            }
            other => panic!("unexpected summary: {other:?}"),
        }
    }

    #[test]
    fn test_churn_counts_time_of_day() {
        // 365 days 23 hours and 366 days 1 hour before the reference.
        let t = table(json!([
            {"Transaction Date": "2024-03-01 12:00:00"},
            {"Transaction Date": "2023-03-01 13:00:00"},
            {"Transaction Date": "2023-03-01 11:00:00"}
        ]));
        let out = classify_churn(&t, 365).unwrap();
        assert_eq!(
            flags(&out.table, columns::CHURN),
            vec![Some(false), Some(false), Some(true)]
        );
        assert_eq!(
            out.table.cell(1, columns::TRANSACTION_DATE),
            Some(CellValue::Date(NaiveDate::from_ymd_opt(2023, 3, 1).unwrap()))
        );
        match out.summary {
            SegmentSummary::Flag { reference_date, .. } => {
                assert_eq!(reference_date, NaiveDate::from_ymd_opt(2024, 3, 1));
            }
            other => panic!("unexpected summary: {other:?}"),
        }
    }

    #[test]
    fn test_churn_without_valid_dates_is_degenerate() {
        let t = table(json!([{"Transaction Date": "n/a"}]));
        assert!(matches!(
            classify_churn(&t, 365),
            Err(SegmentError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_season_counts() {
        let t = table(json!([
            {"Season": "Winter"}, {"Season": "Summer"}, {"Season": "Winter"}
        ]));
        let out = classify_season(&t).unwrap();
        assert_eq!(out.summary.count_of("Winter"), Some(2));
        assert_eq!(out.summary.count_of("Summer"), Some(1));
    }

    #[test]
    fn test_expenditure_distribution() {
        let t = table(json!([
            {"Total Expenditure(till Date)": 10},
            {"Total Expenditure(till Date)": 20},
            {"Total Expenditure(till Date)": 30},
            {"Total Expenditure(till Date)": 40},
            {"Total Expenditure(till Date)": 50}
        ]));
        let out = expenditure_distribution(&t, 4, 0.75).unwrap();
        match out.summary {
            SegmentSummary::Histogram { bins, marker, .. } => {
                assert_eq!(bins.len(), 4);
                assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 5);
                assert_eq!(marker, Some(40.0));
            }
            other => panic!("unexpected summary: {other:?}"),
        }
    }
}
