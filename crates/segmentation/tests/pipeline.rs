//! End-to-end segmentation over a mixed demographic/transactional table.

use audience_core::{columns, labels, CellValue, RecordTable, SegmentGroup};
use audience_segmentation::{RuleOutcome, SegmentSummary, SegmentationEngine};
use serde_json::json;

fn customers() -> RecordTable {
    RecordTable::from_json_str(
        &json!([
            {
                "Customer ID": "C1", "Transaction ID": "T1", "Age": 22, "Gender": "Male",
                "Location": "Urban", "Income Level": "Low",
                "Product Category Preferences": "Electronics, Books",
                "Customer Lifetime Value": 500, "Total Expenditure(till Date)": 1200,
                "Shipping Address": "NY", "Quantity Purchased": 2,
                "Transaction Date": "2024-06-01", "Season": "Summer"
            },
            {
                "Customer ID": "C1", "Transaction ID": "T2", "Age": 22, "Gender": "Male",
                "Location": "Urban", "Income Level": "Low",
                "Product Category Preferences": "Books",
                "Customer Lifetime Value": 500, "Total Expenditure(till Date)": 1200,
                "Shipping Address": "NY", "Quantity Purchased": 3,
                "Transaction Date": "2024-05-20", "Season": "Spring"
            },
            {
                "Customer ID": "C2", "Transaction ID": "T3", "Age": 37, "Gender": "Female",
                "Location": "Rural", "Income Level": "High",
                "Product Category Preferences": "Clothing",
                "Customer Lifetime Value": 1500, "Total Expenditure(till Date)": 300,
                "Shipping Address": "LA", "Quantity Purchased": 1,
                "Transaction Date": "2022-01-15", "Season": "Winter"
            },
            {
                "Customer ID": "C3", "Transaction ID": "T4", "Age": 61, "Gender": "Female",
                "Location": "Suburban", "Income Level": "Medium",
                "Product Category Preferences": "Home, Garden",
                "Customer Lifetime Value": 200, "Total Expenditure(till Date)": 800,
                "Shipping Address": "LA", "Quantity Purchased": 4,
                "Transaction Date": "last tuesday", "Season": "Summer"
            }
        ])
        .to_string(),
    )
    .unwrap()
}

#[test]
fn full_pipeline_derives_every_segment() {
    let engine = SegmentationEngine::default();
    let report = engine.run(
        &customers(),
        &[SegmentGroup::Demographic, SegmentGroup::Transactional],
    );

    assert_eq!(report.failures().count(), 0);
    for column in [
        columns::AGE_GROUP,
        columns::CLV_SEGMENT,
        columns::HIGH_SPEND_BUYER,
        columns::FREQUENT_BUYER,
        columns::HIGH_CLV,
        columns::MAX_PRODUCT_SOLD,
        columns::CHURN,
    ] {
        assert!(report.table.has_column(column), "missing {column}");
    }

    // Age bands: 22, 22, 37, 61
    let ages = report.summary("age_bands").unwrap();
    assert_eq!(ages.count_of(labels::YOUNGER), Some(2));
    assert_eq!(ages.count_of(labels::MIDDLE_AGED), Some(1));
    assert_eq!(ages.count_of(labels::OLDER), Some(1));

    // Preferences count tokens, not rows.
    let prefs = report.summary("product_preference").unwrap();
    assert_eq!(prefs.count_of("Books"), Some(2));
    assert_eq!(prefs.count_of("Garden"), Some(1));

    // Geolocation: NY = 2 + 3, LA = 1 + 4.
    let totals = report.table.column(columns::MAX_PRODUCT_SOLD).unwrap();
    assert_eq!(
        totals,
        vec![
            CellValue::Int(5),
            CellValue::Int(5),
            CellValue::Int(5),
            CellValue::Int(5)
        ]
    );

    // Frequency: 4 transactions / 3 customers; only C1 (2 transactions) qualifies.
    let frequent: Vec<_> = report
        .table
        .column(columns::FREQUENT_BUYER)
        .unwrap()
        .iter()
        .map(CellValue::as_bool)
        .collect();
    assert_eq!(frequent, vec![Some(true), Some(true), Some(false), Some(false)]);

    // Churn: reference 2024-06-01; 2022-01-15 is churned, the bad date is reported.
    let churn: Vec<_> = report
        .table
        .column(columns::CHURN)
        .unwrap()
        .iter()
        .map(CellValue::as_bool)
        .collect();
    assert_eq!(churn, vec![Some(false), Some(false), Some(true), None]);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.rule == "churn" && w.rows == vec![3]));

    match report.summary("correlation").unwrap() {
        SegmentSummary::Correlation(matrix) => {
            assert!(matrix.columns.contains(&columns::AGE.to_string()));
            assert!(matrix
                .columns
                .contains(&columns::CUSTOMER_LIFETIME_VALUE.to_string()));
        }
        other => panic!("unexpected summary: {other:?}"),
    }
}

#[test]
fn rerunning_is_deterministic() {
    let engine = SegmentationEngine::default();
    let input = customers();
    let groups = [SegmentGroup::Demographic, SegmentGroup::Transactional];

    let first = engine.run(&input, &groups);
    let second = engine.run(&input, &groups);

    assert_eq!(first.table, second.table);
    assert_eq!(first.applied, second.applied);
    assert_eq!(first.warnings, second.warnings);
}

#[test]
fn sparse_table_skips_instead_of_failing() {
    let engine = SegmentationEngine::default();
    let table = RecordTable::from_json_str(r#"[{"Gender": "Female"}, {"Gender": "Male"}]"#).unwrap();
    let report = engine.run(
        &table,
        &[SegmentGroup::Demographic, SegmentGroup::Transactional],
    );

    assert_eq!(report.applied, vec!["gender"]);
    assert_eq!(report.failures().count(), 0);
    let skipped = report
        .outcomes
        .iter()
        .filter(|r| matches!(r.outcome, RuleOutcome::Skipped { .. }))
        .count();
    assert_eq!(skipped, report.outcomes.len() - 1);
    assert_eq!(report.table, table);
}
