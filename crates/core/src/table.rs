//! Record table: the in-memory tabular handle every segment rule reads from.
//!
//! Backed by a polars `DataFrame`. Each column gets one dtype inferred from
//! its cells; a column that mixes kinds is kept as text. Enrichment never
//! mutates a table in place: `with_column` returns a new value so callers
//! keep their original input untouched.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{SegmentError, SegmentResult};

/// Days from 0001-01-01 to the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;
const COUNT: &str = "__count";
const TOKEN: &str = "__token";

/// A single cell. JSON `null` deserializes to `Missing`; ISO-8601 date strings
/// deserialize to `Date`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Missing => true,
            CellValue::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric view. Booleans and text are not numbers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) if !v.is_nan() => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Grouping key. Missing cells have no key and drop out of groups.
    pub fn key(&self) -> Option<String> {
        if self.is_missing() {
            None
        } else {
            Some(self.to_string())
        }
    }

    fn kind(&self) -> Option<ColumnKind> {
        if self.is_missing() {
            return None;
        }
        match self {
            CellValue::Missing => None,
            CellValue::Bool(_) => Some(ColumnKind::Bool),
            CellValue::Int(_) => Some(ColumnKind::Int),
            CellValue::Float(_) => Some(ColumnKind::Float),
            CellValue::Date(_) => Some(ColumnKind::Date),
            CellValue::Text(_) => Some(ColumnKind::Text),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Missing => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Int(v.into())
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<NaiveDate> for CellValue {
    fn from(v: NaiveDate) -> Self {
        CellValue::Date(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Missing)
    }
}

impl From<AnyValue<'_>> for CellValue {
    fn from(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => CellValue::Missing,
            AnyValue::Boolean(b) => CellValue::Bool(b),
            AnyValue::Int32(v) => CellValue::Int(v as i64),
            AnyValue::Int64(v) => CellValue::Int(v),
            AnyValue::UInt32(v) => CellValue::Int(v as i64),
            AnyValue::UInt64(v) => CellValue::Int(v as i64),
            AnyValue::Float32(v) => CellValue::Float(v as f64),
            AnyValue::Float64(v) => CellValue::Float(v),
            AnyValue::Date(days) => date_from_days(days).into(),
            AnyValue::String(s) => CellValue::text(s),
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// Storage kind a column settles on once every cell has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    Float,
    Date,
    Text,
}

fn column_kind(cells: &[CellValue]) -> Option<ColumnKind> {
    let mut kind = None;
    for next in cells.iter().filter_map(CellValue::kind) {
        kind = Some(match (kind, next) {
            (None, next) => next,
            (Some(current), next) if current == next => current,
            (Some(ColumnKind::Int), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Int) => ColumnKind::Float,
            _ => return Some(ColumnKind::Text),
        });
    }
    kind
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

fn days_from_date(date: &NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Build a typed series from cells. A column with no values at all is text.
pub fn cells_to_series(name: &str, cells: &[CellValue]) -> SegmentResult<Series> {
    let series = match column_kind(cells) {
        Some(ColumnKind::Bool) => {
            let values: Vec<Option<bool>> = cells.iter().map(CellValue::as_bool).collect();
            Series::new(name, values)
        }
        Some(ColumnKind::Int) => {
            let values: Vec<Option<i64>> = cells
                .iter()
                .map(|c| match c {
                    CellValue::Int(v) => Some(*v),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        Some(ColumnKind::Float) => {
            let values: Vec<Option<f64>> = cells.iter().map(CellValue::as_f64).collect();
            Series::new(name, values)
        }
        Some(ColumnKind::Date) => {
            let days: Vec<Option<i32>> = cells
                .iter()
                .map(|c| match c {
                    CellValue::Date(d) => Some(days_from_date(d)),
                    _ => None,
                })
                .collect();
            Series::new(name, days).cast(&DataType::Date)?
        }
        Some(ColumnKind::Text) | None => {
            let values: Vec<Option<String>> = cells.iter().map(CellValue::key).collect();
            Series::new(name, values)
        }
    };
    Ok(series)
}

/// Cells of a series, in row order.
pub fn series_cells(series: &Series) -> SegmentResult<Vec<CellValue>> {
    let cells: Vec<CellValue> = match series.dtype() {
        DataType::Boolean => series.bool()?.into_iter().map(CellValue::from).collect(),
        DataType::Int64 => series.i64()?.into_iter().map(CellValue::from).collect(),
        DataType::Float64 => series.f64()?.into_iter().map(CellValue::from).collect(),
        DataType::String => series.str()?.into_iter().map(CellValue::from).collect(),
        DataType::Date => series
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .map(|d| CellValue::from(d.and_then(date_from_days)))
            .collect(),
        dtype if dtype.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(CellValue::from)
            .collect(),
        dtype if dtype.is_float() => series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(CellValue::from)
            .collect(),
        _ => series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(CellValue::from)
            .collect(),
    };
    Ok(cells)
}

/// Borrowed view of one row, addressable by column name.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    frame: &'a DataFrame,
    row: usize,
}

impl RowView<'_> {
    pub fn get(&self, column: &str) -> Option<CellValue> {
        let series = self.frame.column(column).ok()?;
        series.get(self.row).ok().map(CellValue::from)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "TableParts")]
pub struct RecordTable {
    frame: DataFrame,
}

/// Serialized shape: column names plus row-major cells.
#[derive(Serialize, Deserialize)]
struct TableParts {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl TryFrom<TableParts> for RecordTable {
    type Error = SegmentError;

    fn try_from(parts: TableParts) -> Result<Self, Self::Error> {
        Self::from_rows(parts.columns, parts.rows)
    }
}

impl Serialize for RecordTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let parts = TableParts {
            columns: self.columns().into_iter().map(str::to_string).collect(),
            rows: self.rows().map_err(S::Error::custom)?,
        };
        parts.serialize(serializer)
    }
}

impl PartialEq for RecordTable {
    fn eq(&self, other: &Self) -> bool {
        self.columns() == other.columns()
            && self
                .frame
                .get_columns()
                .iter()
                .zip(other.frame.get_columns())
                .all(|(a, b)| a.equals_missing(b))
    }
}

impl Default for RecordTable {
    fn default() -> Self {
        Self {
            frame: DataFrame::empty(),
        }
    }
}

impl RecordTable {
    /// Empty table with the given columns.
    pub fn new(columns: Vec<String>) -> SegmentResult<Self> {
        Self::from_rows(columns, Vec::new())
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> SegmentResult<Self> {
        let mut by_column: Vec<Vec<CellValue>> = vec![Vec::with_capacity(rows.len()); columns.len()];
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(SegmentError::DegenerateInput(format!(
                    "row {i} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            for (cells, cell) in by_column.iter_mut().zip(row) {
                cells.push(cell);
            }
        }
        Self::from_columns(columns, by_column)
    }

    fn from_columns(columns: Vec<String>, cells: Vec<Vec<CellValue>>) -> SegmentResult<Self> {
        let series = columns
            .iter()
            .zip(&cells)
            .map(|(name, cells)| cells_to_series(name, cells))
            .collect::<SegmentResult<Vec<_>>>()?;
        Ok(Self {
            frame: DataFrame::new(series)?,
        })
    }

    /// Build a table from JSON objects. Columns are the union of keys in
    /// first-seen order; a key absent from a record becomes `Missing`.
    pub fn from_records(
        records: Vec<serde_json::Map<String, serde_json::Value>>,
    ) -> SegmentResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut cells: Vec<Vec<CellValue>> = vec![Vec::with_capacity(records.len()); columns.len()];
        for mut record in records {
            for (column, values) in columns.iter().zip(cells.iter_mut()) {
                let cell = match record.remove(column) {
                    Some(value) => serde_json::from_value(value)?,
                    None => CellValue::Missing,
                };
                values.push(cell);
            }
        }
        Self::from_columns(columns, cells)
    }

    /// Parse a JSON array of objects.
    pub fn from_json_str(json: &str) -> SegmentResult<Self> {
        let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(json)?;
        Self::from_records(records)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn columns(&self) -> Vec<&str> {
        self.frame.get_column_names()
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    /// Fails with `MissingColumn` naming the first absent column.
    pub fn require(&self, names: &[&str]) -> SegmentResult<()> {
        match names.iter().find(|n| !self.has_column(n)) {
            Some(missing) => Err(SegmentError::missing_column(*missing)),
            None => Ok(()),
        }
    }

    pub fn series(&self, name: &str) -> SegmentResult<&Series> {
        self.frame
            .column(name)
            .map_err(|_| SegmentError::missing_column(name))
    }

    pub fn column(&self, name: &str) -> SegmentResult<Vec<CellValue>> {
        series_cells(self.series(name)?)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<CellValue> {
        if row >= self.len() {
            return None;
        }
        RowView {
            frame: &self.frame,
            row,
        }
        .get(column)
    }

    fn rows(&self) -> SegmentResult<Vec<Vec<CellValue>>> {
        let columns = self
            .frame
            .get_columns()
            .iter()
            .map(series_cells)
            .collect::<SegmentResult<Vec<_>>>()?;
        Ok((0..self.len())
            .map(|row| columns.iter().map(|cells| cells[row].clone()).collect())
            .collect())
    }

    /// Numeric view of a column: `None` for missing or non-numeric cells.
    /// Text cells that spell a number are read as that number.
    pub fn numeric_column(&self, name: &str) -> SegmentResult<Vec<Option<f64>>> {
        let series = self.series(name)?;
        if matches!(series.dtype(), DataType::Boolean | DataType::Date) {
            return Ok(vec![None; series.len()]);
        }
        let values = series.cast(&DataType::Float64)?;
        let values = values
            .f64()?
            .into_iter()
            .map(|v| v.filter(|v| !v.is_nan()))
            .collect();
        Ok(values)
    }

    /// Expression reading `name` as a number, for lazy aggregations.
    pub fn numeric_expr(&self, name: &str) -> SegmentResult<Expr> {
        Ok(match self.series(name)?.dtype() {
            DataType::Int64 | DataType::Float64 => col(name),
            _ => col(name).cast(DataType::Float64),
        })
    }

    /// A column is numeric when it holds integers or floats and at least one
    /// value.
    pub fn is_numeric_column(&self, name: &str) -> bool {
        self.series(name)
            .map(|s| s.dtype().is_numeric() && s.null_count() < s.len())
            .unwrap_or(false)
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns()
            .into_iter()
            .filter(|c| self.is_numeric_column(c))
            .map(str::to_string)
            .collect()
    }

    /// Rows whose cell in `name` is null.
    pub fn null_rows(&self, name: &str) -> SegmentResult<Vec<usize>> {
        Ok(self
            .series(name)?
            .is_null()
            .into_iter()
            .enumerate()
            .filter(|(_, null)| null.unwrap_or(true))
            .map(|(i, _)| i)
            .collect())
    }

    /// Return a new table with `name` set to `values`. An existing column of
    /// the same name is overwritten in place; otherwise it is appended.
    pub fn with_column(&self, name: &str, values: Vec<CellValue>) -> SegmentResult<Self> {
        if values.len() != self.len() {
            return Err(SegmentError::DegenerateInput(format!(
                "column {name} has {} values for {} rows",
                values.len(),
                self.len()
            )));
        }
        let mut frame = self.frame.clone();
        frame.with_column(cells_to_series(name, &values)?)?;
        Ok(Self { frame })
    }

    /// Number of rows the predicate accepts.
    pub fn count_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(RowView<'_>) -> bool,
    {
        (0..self.len())
            .filter(|&row| {
                predicate(RowView {
                    frame: &self.frame,
                    row,
                })
            })
            .count()
    }

    pub fn head(&self, n: usize) -> Self {
        Self {
            frame: self.frame.head(Some(n)),
        }
    }

    /// Frequency of each distinct non-missing value, most frequent first;
    /// ties are ordered by value.
    pub fn value_counts(&self, name: &str) -> SegmentResult<Vec<(String, usize)>> {
        count_values(self.series(name)?.clone())
    }

    /// Like `value_counts`, but over the trimmed tokens of a delimited text
    /// column. Empty tokens are ignored.
    pub fn token_counts(&self, name: &str, delimiter: &str) -> SegmentResult<Vec<(String, usize)>> {
        self.require(&[name])?;
        let exploded = self
            .frame
            .clone()
            .lazy()
            .select([col(name)
                .cast(DataType::String)
                .str()
                .split(lit(delimiter))
                .explode()
                .alias(TOKEN)])
            .collect()?;
        let tokens: Vec<Option<String>> = exploded
            .column(TOKEN)?
            .str()?
            .into_iter()
            .map(|t| {
                t.map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
            })
            .collect();
        count_values(Series::new(TOKEN, tokens))
    }

    /// Sum of the numeric `value` column per distinct `key` value. Rows with a
    /// missing key drop out; missing values add nothing.
    pub fn group_sum(&self, key: &str, value: &str) -> SegmentResult<BTreeMap<String, f64>> {
        self.require(&[key])?;
        let totals = self
            .frame
            .clone()
            .lazy()
            .filter(col(key).is_not_null())
            .group_by([col(key)])
            .agg([self.numeric_expr(value)?.sum().alias(value)])
            .collect()?;

        let keys = totals.column(key)?.cast(&DataType::String)?;
        let sums = totals.column(value)?.cast(&DataType::Float64)?;
        let totals = keys
            .str()?
            .into_iter()
            .zip(sums.f64()?.into_iter())
            .filter_map(|(k, v)| Some((k?.to_string(), v.unwrap_or(0.0))))
            .collect();
        Ok(totals)
    }

    /// The group sum of `value` per `key`, broadcast back onto every row of
    /// the group. Rows with a missing key get `Missing`. Integer columns keep
    /// integer totals.
    pub fn group_sum_per_row(&self, key: &str, value: &str) -> SegmentResult<Vec<CellValue>> {
        self.require(&[key])?;
        let broadcast = self
            .frame
            .clone()
            .lazy()
            .select([self
                .numeric_expr(value)?
                .sum()
                .over([col(key)])
                .alias(value)])
            .collect()?;

        let mut cells = series_cells(broadcast.column(value)?)?;
        for row in self.null_rows(key)? {
            cells[row] = CellValue::Missing;
        }
        Ok(cells)
    }

    /// Rows as JSON objects, for presentation.
    pub fn to_records(&self) -> SegmentResult<Vec<serde_json::Map<String, serde_json::Value>>> {
        let columns = self.columns();
        let mut records = Vec::with_capacity(self.len());
        for row in self.rows()? {
            let mut record = serde_json::Map::new();
            for (column, cell) in columns.iter().zip(row) {
                record.insert(column.to_string(), serde_json::to_value(cell)?);
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn count_values(values: Series) -> SegmentResult<Vec<(String, usize)>> {
    let name = values.name().to_string();
    let counted = DataFrame::new(vec![values])?
        .lazy()
        .filter(col(&name).is_not_null())
        .group_by([col(&name)])
        .agg([len().alias(COUNT)])
        .collect()?;

    let labels = counted.column(&name)?.cast(&DataType::String)?;
    let counts = counted.column(COUNT)?.cast(&DataType::UInt64)?;
    let counts: BTreeMap<String, usize> = labels
        .str()?
        .into_iter()
        .zip(counts.u64()?.into_iter())
        .filter_map(|(label, count)| Some((label?.to_string(), count? as usize)))
        .collect();
    Ok(sort_counts(counts))
}

/// Order counts most frequent first, ties by label.
fn sort_counts(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}
