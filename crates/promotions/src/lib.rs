//! Target promotion suggestions: maps non-empty customer segments to
//! human-readable campaign ideas.

pub mod engine;
pub mod predicates;

pub use engine::{default_rules, PromotionRule, RecommendationEngine};
pub use predicates::{ComparisonOperator, Predicate};
