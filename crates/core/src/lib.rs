//! Shared building blocks for customer segmentation: the record table,
//! column names, warnings, recommendations, errors and configuration.

pub mod config;
pub mod error;
pub mod table;
pub mod types;

pub use config::{AppConfig, SegmentationConfig};
pub use error::{SegmentError, SegmentResult};
pub use table::{CellValue, RecordTable, RowView};
pub use types::{columns, labels, DataQualityWarning, Recommendation, SegmentGroup};
