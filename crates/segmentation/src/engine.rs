//! Segmentation engine driver: runs the applicable rules for the requested
//! groups and collects per-rule outcomes without letting one failure abort
//! the batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use audience_core::{
    DataQualityWarning, RecordTable, SegmentError, SegmentGroup, SegmentationConfig,
};

use crate::rules::{default_registry, SegmentRule};
use crate::summary::SegmentSummary;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RuleOutcome {
    Applied {
        derived_columns: Vec<String>,
        summary: SegmentSummary,
    },
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule: String,
    pub group: SegmentGroup,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub table: RecordTable,
    /// Names of the rules that produced a result, in execution order.
    pub applied: Vec<String>,
    pub outcomes: Vec<RuleReport>,
    pub warnings: Vec<DataQualityWarning>,
}

impl SegmentationReport {
    pub fn outcome(&self, rule: &str) -> Option<&RuleOutcome> {
        self.outcomes
            .iter()
            .find(|r| r.rule == rule)
            .map(|r| &r.outcome)
    }

    pub fn summary(&self, rule: &str) -> Option<&SegmentSummary> {
        match self.outcome(rule)? {
            RuleOutcome::Applied { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleReport> {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, RuleOutcome::Failed { .. }))
    }
}

pub struct SegmentationEngine {
    config: SegmentationConfig,
    rules: Vec<SegmentRule>,
}

impl SegmentationEngine {
    pub fn new(config: SegmentationConfig) -> Self {
        Self::with_rules(config, default_registry())
    }

    pub fn with_rules(config: SegmentationConfig, rules: Vec<SegmentRule>) -> Self {
        Self { config, rules }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    /// Run every rule of the requested groups against `table`. The input is
    /// never modified; the enriched copy is returned in the report.
    pub fn run(&self, table: &RecordTable, groups: &[SegmentGroup]) -> SegmentationReport {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            rows = table.len(),
            columns = table.columns().len(),
            ?groups,
            "Running segmentation"
        );

        let mut current = table.clone();
        let mut applied = Vec::new();
        let mut outcomes = Vec::new();
        let mut warnings = Vec::new();

        for rule in self.rules.iter().filter(|r| groups.contains(&r.group)) {
            let outcome = match rule.missing_column(&current) {
                Some(column) => {
                    let reason = SegmentError::missing_column(column).to_string();
                    if rule.warn_if_absent {
                        warn!(rule = rule.name, %column, "Required column absent");
                        warnings.push(DataQualityWarning::new(
                            rule.name,
                            column,
                            format!("'{column}' column is not present in the dataset"),
                            Vec::new(),
                        ));
                    } else {
                        debug!(rule = rule.name, %column, "Skipping rule");
                    }
                    RuleOutcome::Skipped { reason }
                }
                None => match rule.apply(&current, &self.config) {
                    Ok(output) => {
                        debug!(
                            rule = rule.name,
                            derived = ?output.derived_columns,
                            warnings = output.warnings.len(),
                            "Rule applied"
                        );
                        for w in &output.warnings {
                            warn!(rows = w.rows.len(), "{w}");
                        }
                        warnings.extend(output.warnings);
                        current = output.table;
                        applied.push(rule.name.to_string());
                        RuleOutcome::Applied {
                            derived_columns: output.derived_columns,
                            summary: output.summary,
                        }
                    }
                    Err(e) if e.is_skip() => {
                        debug!(rule = rule.name, reason = %e, "Skipping rule");
                        RuleOutcome::Skipped {
                            reason: e.to_string(),
                        }
                    }
                    Err(e) => {
                        warn!(rule = rule.name, error = %e, "Rule failed");
                        RuleOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                },
            };

            outcomes.push(RuleReport {
                rule: rule.name.to_string(),
                group: rule.group,
                outcome,
            });
        }

        info!(
            %run_id,
            applied = applied.len(),
            warnings = warnings.len(),
            "Segmentation complete"
        );

        SegmentationReport {
            run_id,
            generated_at: Utc::now(),
            table: current,
            applied,
            outcomes,
            warnings,
        }
    }
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new(SegmentationConfig::default())
    }
}
