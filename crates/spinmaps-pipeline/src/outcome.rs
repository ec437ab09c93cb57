// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-target results of the stats stage

use spinmaps_stats::{CorrelationRecord, SpinTestOutcome};

use crate::artifacts::CorrelationRow;
use crate::types::PipelineError;

/// Result of processing one catalog entry
#[derive(Debug, Clone, PartialEq)]
pub enum TargetOutcome {
    Completed {
        record: CorrelationRecord,
        null_r: Vec<f64>,
    },
    Failed {
        map_name: String,
        kind: String,
        reason: String,
    },
}

impl TargetOutcome {
    pub fn completed(outcome: SpinTestOutcome) -> Self {
        TargetOutcome::Completed {
            record: outcome.record,
            null_r: outcome.null_r,
        }
    }

    pub fn failed(map_name: impl Into<String>, error: &PipelineError) -> Self {
        TargetOutcome::Failed {
            map_name: map_name.into(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }

    pub fn map_name(&self) -> &str {
        match self {
            TargetOutcome::Completed { record, .. } => &record.map_name,
            TargetOutcome::Failed { map_name, .. } => map_name,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TargetOutcome::Completed { .. })
    }

    /// Row for `correlations.csv`
    pub fn to_row(&self) -> CorrelationRow {
        match self {
            TargetOutcome::Completed { record, .. } => CorrelationRow::completed(record),
            TargetOutcome::Failed {
                map_name,
                kind,
                reason,
            } => CorrelationRow::failed(map_name, &format!("{}: {}", kind, reason)),
        }
    }
}

/// Split outcomes into successful records and failed map names, keeping order
pub fn partition(outcomes: &[TargetOutcome]) -> (Vec<&CorrelationRecord>, Vec<&str>) {
    let mut completed = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome {
            TargetOutcome::Completed { record, .. } => completed.push(record),
            TargetOutcome::Failed { map_name, .. } => failed.push(map_name.as_str()),
        }
    }
    (completed, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinmaps_stats::StatsError;

    fn completed(name: &str) -> TargetOutcome {
        TargetOutcome::Completed {
            record: CorrelationRecord {
                map_name: name.to_string(),
                r: 0.4,
                p_spin: 0.02,
                n_perm: 49,
            },
            null_r: vec![0.1; 49],
        }
    }

    #[test]
    fn test_partition_keeps_order() {
        let err = PipelineError::from(StatsError::Data("no defined parcels".into()));
        let outcomes = vec![
            completed("a"),
            TargetOutcome::failed("b", &err),
            completed("c"),
        ];
        let (ok, failed) = partition(&outcomes);
        assert_eq!(
            ok.iter().map(|r| r.map_name.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        assert_eq!(failed, vec!["b"]);
    }

    #[test]
    fn test_failed_row_has_error_column() {
        let err = PipelineError::Collaborator("fetch timed out".into());
        let row = TargetOutcome::failed("cbf", &err).to_row();
        assert_eq!(row.map_name, "cbf");
        assert!(row.r.is_none());
        assert_eq!(
            row.error.as_deref(),
            Some("collaborator: Collaborator failed: fetch timed out")
        );
    }
}
