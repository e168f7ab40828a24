//! Structured outcome of a waiting-time analysis, as written by the
//! analysis task next to its CSV report.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobResult {
    pub num_cases: f64,
    pub num_activities: f64,
    pub num_activity_instances: f64,
    pub num_transitions: f64,
    pub num_transition_instances: f64,
    pub total_wt: f64,
    pub total_batching_wt: f64,
    pub total_prioritization_wt: f64,
    pub total_contention_wt: f64,
    pub total_unavailability_wt: f64,
    pub total_extraneous_wt: f64,
    pub report: Vec<ReportItem>,
    pub cte_impact: Option<CteImpact>,
}

/// Waiting time of one activity-to-activity transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportItem {
    pub source_activity: String,
    pub target_activity: String,
    pub case_freq: f64,
    pub total_freq: f64,
    pub total_wt: f64,
    pub batching_wt: f64,
    pub prioritization_wt: f64,
    pub contention_wt: f64,
    pub unavailability_wt: f64,
    pub extraneous_wt: f64,
    pub wt_by_resource: Vec<ResourceReportItem>,
}

/// Per-resource-pair breakdown of a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceReportItem {
    pub source_resource: String,
    pub target_resource: String,
    pub case_freq: f64,
    pub total_freq: f64,
    pub total_wt: f64,
    pub batching_wt: f64,
    pub prioritization_wt: f64,
    pub contention_wt: f64,
    pub unavailability_wt: f64,
    pub extraneous_wt: f64,
}

/// Cycle-time efficiency gain if a waiting-time cause were removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CteImpact {
    pub batching_impact: f64,
    pub contention_impact: f64,
    pub prioritization_impact: f64,
    pub unavailability_impact: f64,
    pub extraneous_impact: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_summary() {
        let json = r#"{
            "num_cases": 608,
            "total_wt": 1234.5,
            "report": [{
                "source_activity": "A",
                "target_activity": "B",
                "total_wt": 10.0,
                "wt_by_resource": [{"source_resource": "r1", "target_resource": "r2", "total_wt": 10.0}]
            }],
            "cte_impact": {"batching_impact": 0.25}
        }"#;

        let result: JobResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.num_cases, 608.0);
        assert_eq!(result.num_activities, 0.0);
        assert_eq!(result.report.len(), 1);
        assert_eq!(result.report[0].wt_by_resource[0].target_resource, "r2");
        assert_eq!(result.cte_impact.unwrap().batching_impact, 0.25);
    }
}
