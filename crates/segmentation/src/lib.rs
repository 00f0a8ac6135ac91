//! Customer segmentation engine: statistical segment rules over a record
//! table: age bands, spend and frequency tiers, CLV tiers, churn flags and
//! geolocation totals.

pub mod demographic;
pub mod engine;
pub mod rules;
pub mod stats;
pub mod summary;
pub mod transactional;

pub use demographic::{
    classify_age_bands, classify_clv, classify_gender, classify_income, classify_location,
    classify_product_preference, correlate_numeric,
};
pub use engine::{RuleOutcome, RuleReport, SegmentationEngine, SegmentationReport};
pub use rules::{default_registry, RuleOutput, SegmentRule};
pub use summary::{CategoryCount, CorrelationMatrix, GroupTotal, SegmentSummary};
pub use transactional::{
    aggregate_geolocation, classify_churn, classify_clv_transactional, classify_frequency,
    classify_season, classify_spend, expenditure_distribution,
};
