//! Recommendation rule engine: evaluates a fixed, ordered rule table against
//! an enriched record table and emits a suggestion for every non-empty
//! segment.

use serde::{Deserialize, Serialize};
use tracing::debug;

use audience_core::{columns, labels, Recommendation, RecordTable, SegmentGroup};

use crate::predicates::Predicate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRule {
    pub title: String,
    pub body: String,
    pub group: SegmentGroup,
    pub condition: Predicate,
}

impl PromotionRule {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        group: SegmentGroup,
        condition: Predicate,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            group,
            condition,
        }
    }
}

/// Built-in suggestions, in evaluation order.
pub fn default_rules() -> Vec<PromotionRule> {
    use SegmentGroup::{Demographic, Transactional};

    vec![
        PromotionRule::new(
            "High CLV Customers",
            "These customers have a high lifetime value. Consider offering them loyalty rewards or exclusive offers.",
            Demographic,
            Predicate::equals(columns::CLV_SEGMENT, labels::HIGH_CLV),
        ),
        PromotionRule::new(
            "Younger Customers (18-25)",
            "Consider targeting with trendy products or social media campaigns.",
            Demographic,
            Predicate::between(columns::AGE, 18, 25),
        ),
        PromotionRule::new(
            "Middle-Aged Customers (26-45)",
            "Consider targeting with family-oriented products or home improvement items.",
            Demographic,
            Predicate::between(columns::AGE, 26, 45),
        ),
        PromotionRule::new(
            "Older Customers (46+)",
            "Consider targeting with health-related products or luxury items.",
            Demographic,
            Predicate::at_least(columns::AGE, 46),
        ),
        PromotionRule::new(
            "Male Customers",
            "Consider targeting with gadgets or sports equipment.",
            Demographic,
            Predicate::equals(columns::GENDER, labels::MALE),
        ),
        PromotionRule::new(
            "Female Customers",
            "Consider targeting with fashion or beauty products.",
            Demographic,
            Predicate::equals(columns::GENDER, labels::FEMALE),
        ),
        PromotionRule::new(
            "High Spend Buyers",
            "Consider offering exclusive discounts or early access to new products.",
            Transactional,
            Predicate::is_true(columns::HIGH_SPEND_BUYER),
        ),
        PromotionRule::new(
            "Frequent Buyers",
            "Consider a loyalty program or reward points for frequent purchases.",
            Transactional,
            Predicate::is_true(columns::FREQUENT_BUYER),
        ),
        PromotionRule::new(
            "High CLV Customers (transactional)",
            "Target with personalized offers or premium services.",
            Transactional,
            Predicate::is_true(columns::HIGH_CLV),
        ),
        PromotionRule::new(
            "Churned Customers",
            "Consider re-engagement strategies such as win-back campaigns or personalized offers.",
            Transactional,
            Predicate::is_true(columns::CHURN),
        ),
    ]
}

/// Stateless apart from its rule table; safe to share across threads.
pub struct RecommendationEngine {
    rules: Vec<PromotionRule>,
}

impl RecommendationEngine {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<PromotionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PromotionRule] {
        &self.rules
    }

    /// Suggestions for the requested groups, in rule order. A rule fires
    /// when its column exists and at least one row matches.
    pub fn recommend(&self, table: &RecordTable, groups: &[SegmentGroup]) -> Vec<Recommendation> {
        let mut out = Vec::new();
        for rule in self.rules.iter().filter(|r| groups.contains(&r.group)) {
            let column = rule.condition.column();
            if !table.has_column(column) {
                debug!(title = %rule.title, %column, "Segment column absent, skipping");
                continue;
            }

            let matched_rows = table.count_where(|row| rule.condition.matches(row));
            if matched_rows == 0 {
                debug!(title = %rule.title, "Segment empty, skipping");
                continue;
            }

            out.push(Recommendation {
                title: rule.title.clone(),
                body: rule.body.clone(),
                segment_column: column.to_string(),
                group: rule.group,
                matched_rows,
            });
        }
        out
    }
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(value: serde_json::Value) -> RecordTable {
        RecordTable::from_json_str(&value.to_string()).unwrap()
    }

    fn titles(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_no_high_clv_rows_means_no_suggestion() {
        let t = table(json!([
            {"CLV Segment": "Low CLV"},
            {"CLV Segment": "Low CLV"}
        ]));
        let recs = RecommendationEngine::new().recommend(&t, &[SegmentGroup::Demographic]);
        assert!(recs.is_empty());
    }

    #[test]
    fn test_demographic_rules_in_order() {
        let t = table(json!([
            {"CLV Segment": "High CLV", "Age": 52, "Gender": "Female"},
            {"CLV Segment": "Low CLV", "Age": 19, "Gender": "Female"}
        ]));
        let recs = RecommendationEngine::new().recommend(&t, &[SegmentGroup::Demographic]);
        assert_eq!(
            titles(&recs),
            vec![
                "High CLV Customers",
                "Younger Customers (18-25)",
                "Older Customers (46+)",
                "Female Customers"
            ]
        );
        assert_eq!(recs[3].matched_rows, 2);
    }

    #[test]
    fn test_age_rules_read_raw_age() {
        let engine = RecommendationEngine::new();
        let middle = table(json!([{"Age": 30}]));
        assert_eq!(
            titles(&engine.recommend(&middle, &[SegmentGroup::Demographic])),
            vec!["Middle-Aged Customers (26-45)"]
        );

        // 25.5 falls between the inclusive bounds; under 18 matches nothing.
        let gaps = table(json!([{"Age": 25.5}, {"Age": 17}, {"Age": null}]));
        assert!(engine
            .recommend(&gaps, &[SegmentGroup::Demographic])
            .is_empty());

        let edges = table(json!([{"Age": 18}, {"Age": 45}, {"Age": 46}]));
        assert_eq!(
            titles(&engine.recommend(&edges, &[SegmentGroup::Demographic])),
            vec![
                "Younger Customers (18-25)",
                "Middle-Aged Customers (26-45)",
                "Older Customers (46+)"
            ]
        );
    }

    #[test]
    fn test_transactional_flags() {
        let t = table(json!([
            {"High Spend Buyer": true, "Frequent Buyer": false, "High CLV": true, "Churn": null},
            {"High Spend Buyer": false, "Frequent Buyer": false, "High CLV": false, "Churn": false}
        ]));
        let recs = RecommendationEngine::new().recommend(&t, &[SegmentGroup::Transactional]);
        assert_eq!(
            titles(&recs),
            vec!["High Spend Buyers", "High CLV Customers (transactional)"]
        );
    }

    #[test]
    fn test_groups_filter_rules() {
        let t = table(json!([
            {"Gender": "Male", "Churn": true}
        ]));
        let engine = RecommendationEngine::new();
        assert_eq!(
            titles(&engine.recommend(&t, &[SegmentGroup::Demographic])),
            vec!["Male Customers"]
        );
        assert_eq!(
            titles(&engine.recommend(&t, &[SegmentGroup::Transactional])),
            vec!["Churned Customers"]
        );
        assert!(engine.recommend(&t, &[]).is_empty());
    }

    #[test]
    fn test_each_rule_fires_at_most_once() {
        let t = table(json!([
            {"Gender": "Male"}, {"Gender": "Male"}, {"Gender": "Male"}
        ]));
        let recs = RecommendationEngine::new().recommend(&t, &[SegmentGroup::Demographic]);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].matched_rows, 3);
    }
}
