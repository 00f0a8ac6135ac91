//! Segment rule registry. Each rule declares the source columns it needs so
//! the engine can filter the registry against a table before running it.

use audience_core::{
    columns, CellValue, DataQualityWarning, RecordTable, SegmentGroup, SegmentResult,
    SegmentationConfig,
};

use crate::summary::{CategoryCount, SegmentSummary};
use crate::{demographic, transactional};

/// What a rule hands back: the enriched table, the columns it derived, a
/// chart-ready summary and any data-quality warnings.
#[derive(Debug, Clone)]
pub struct RuleOutput {
    pub table: RecordTable,
    pub derived_columns: Vec<String>,
    pub summary: SegmentSummary,
    pub warnings: Vec<DataQualityWarning>,
}

impl RuleOutput {
    /// Output for rules that only aggregate and add no column.
    pub fn aggregate_only(table: &RecordTable, summary: SegmentSummary) -> Self {
        Self {
            table: table.clone(),
            derived_columns: Vec::new(),
            summary,
            warnings: Vec::new(),
        }
    }
}

pub type RuleFn = fn(&RecordTable, &SegmentationConfig) -> SegmentResult<RuleOutput>;

#[derive(Clone)]
pub struct SegmentRule {
    pub name: &'static str,
    pub group: SegmentGroup,
    pub required_columns: &'static [&'static str],
    /// Report a warning, not just a skip, when a required column is absent.
    pub warn_if_absent: bool,
    apply: RuleFn,
}

impl std::fmt::Debug for SegmentRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentRule")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("required_columns", &self.required_columns)
            .finish()
    }
}

impl SegmentRule {
    pub fn new(
        name: &'static str,
        group: SegmentGroup,
        required_columns: &'static [&'static str],
        apply: RuleFn,
    ) -> Self {
        Self {
            name,
            group,
            required_columns,
            warn_if_absent: false,
            apply,
        }
    }

    pub fn warn_if_absent(mut self) -> Self {
        self.warn_if_absent = true;
        self
    }

    /// First required column the table lacks.
    pub fn missing_column(&self, table: &RecordTable) -> Option<&'static str> {
        self.required_columns
            .iter()
            .copied()
            .find(|c| !table.has_column(c))
    }

    pub fn apply(
        &self,
        table: &RecordTable,
        config: &SegmentationConfig,
    ) -> SegmentResult<RuleOutput> {
        (self.apply)(table, config)
    }
}

/// All built-in rules, in execution order.
pub fn default_registry() -> Vec<SegmentRule> {
    use SegmentGroup::{Demographic, Transactional};

    vec![
        SegmentRule::new("age_bands", Demographic, &[columns::AGE], |t, _| {
            demographic::classify_age_bands(t)
        }),
        SegmentRule::new("gender", Demographic, &[columns::GENDER], |t, _| {
            demographic::classify_gender(t)
        }),
        SegmentRule::new("location", Demographic, &[columns::LOCATION], |t, _| {
            demographic::classify_location(t)
        }),
        SegmentRule::new("income", Demographic, &[columns::INCOME_LEVEL], |t, _| {
            demographic::classify_income(t)
        }),
        SegmentRule::new(
            "product_preference",
            Demographic,
            &[columns::PRODUCT_PREFERENCES],
            |t, c| demographic::classify_product_preference(t, &c.preference_delimiter),
        ),
        SegmentRule::new(
            "clv",
            Demographic,
            &[columns::CUSTOMER_LIFETIME_VALUE],
            |t, _| demographic::classify_clv(t),
        ),
        SegmentRule::new("correlation", Demographic, &[], |t, _| {
            demographic::correlate_numeric(t)
        }),
        SegmentRule::new(
            "spend",
            Transactional,
            &[columns::TOTAL_EXPENDITURE],
            |t, _| transactional::classify_spend(t),
        ),
        SegmentRule::new(
            "frequency",
            Transactional,
            &[columns::TRANSACTION_ID, columns::CUSTOMER_ID],
            |t, _| transactional::classify_frequency(t),
        ),
        SegmentRule::new(
            "clv_transactional",
            Transactional,
            &[columns::TOTAL_EXPENDITURE],
            |t, c| transactional::classify_clv_transactional(t, c.high_clv_quantile),
        ),
        SegmentRule::new(
            "geolocation",
            Transactional,
            &[columns::SHIPPING_ADDRESS, columns::QUANTITY_PURCHASED],
            |t, _| transactional::aggregate_geolocation(t),
        ),
        SegmentRule::new(
            "churn",
            Transactional,
            &[columns::TRANSACTION_DATE],
            |t, c| transactional::classify_churn(t, c.churn_window_days),
        )
        .warn_if_absent(),
        SegmentRule::new("season", Transactional, &[columns::SEASON], |t, _| {
            transactional::classify_season(t)
        }),
        SegmentRule::new(
            "expenditure_distribution",
            Transactional,
            &[columns::TOTAL_EXPENDITURE],
            |t, c| {
                transactional::expenditure_distribution(t, c.histogram_bins, c.high_clv_quantile)
            },
        ),
    ]
}

/// Numeric view of a source column plus a warning naming the rows that were
/// missing or not numeric.
pub(crate) fn numeric_source(
    table: &RecordTable,
    rule: &str,
    column: &str,
) -> SegmentResult<(Vec<Option<f64>>, Option<DataQualityWarning>)> {
    let values = table.numeric_column(column)?;
    let missing = table.null_rows(column)?;
    let invalid: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(i, v)| v.is_none() && missing.binary_search(i).is_err())
        .map(|(i, _)| i)
        .collect();

    let warning = if missing.is_empty() && invalid.is_empty() {
        None
    } else {
        let message = format!(
            "{} rows had missing and {} rows had non-numeric {column} values; they were left out",
            missing.len(),
            invalid.len()
        );
        let mut rows = missing;
        rows.extend(invalid);
        rows.sort_unstable();
        Some(DataQualityWarning::new(rule, column, message, rows))
    };

    Ok((values, warning))
}

/// Rows whose cell in `column` has no grouping key.
pub(crate) fn keyless_rows(table: &RecordTable, column: &str) -> SegmentResult<Vec<usize>> {
    table.null_rows(column)
}

/// Frequency of each distinct value in `column`; adds no column.
pub(crate) fn count_categories(table: &RecordTable, column: &str) -> SegmentResult<RuleOutput> {
    let counts = table
        .value_counts(column)?
        .into_iter()
        .map(|(label, count)| CategoryCount::new(label, count))
        .collect();
    Ok(RuleOutput::aggregate_only(
        table,
        SegmentSummary::Counts {
            column: column.to_string(),
            counts,
        },
    ))
}

pub(crate) fn flag_cells(flags: &[Option<bool>]) -> Vec<CellValue> {
    flags.iter().map(|f| CellValue::from(*f)).collect()
}
