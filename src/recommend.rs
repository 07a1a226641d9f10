/*!
 * Rule-based coverage recommendations
 *
 * The rules form a fixed, ordered table. Each rule is a pure predicate over
 * the county metrics and optional stability figures plus the payload it emits;
 * a rule fires at most once and results keep table order.
 */

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::CountyMetrics;
use crate::constants::{CLAIMS_PER_PROVIDER_LIMIT, INSTABILITY_PERCENT, SHORTAGE_THRESHOLD};
use crate::stability::TerminatedAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecommendationType {
    #[serde(rename = "Provider Shortage")]
    ProviderShortage,
    #[serde(rename = "High Utilization")]
    HighUtilization,
    #[serde(rename = "Network Instability")]
    NetworkInstability,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::ProviderShortage => "Provider Shortage",
            RecommendationType::HighUtilization => "High Utilization",
            RecommendationType::NetworkInstability => "Network Instability",
        }
    }
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub description: String,
}

struct Rule {
    priority: Priority,
    kind: RecommendationType,
    applies: fn(&CountyMetrics, Option<&TerminatedAnalysis>) -> bool,
    describe: fn(&CountyMetrics, Option<&TerminatedAnalysis>) -> String,
}

static RULES: [Rule; 3] = [
    Rule {
        priority: Priority::High,
        kind: RecommendationType::ProviderShortage,
        applies: |m, _| m.provider_count < SHORTAGE_THRESHOLD,
        describe: |m, _| {
            format!(
                "{} has {} active providers, below the {} needed for adequate coverage. Recruit providers in this county.",
                m.county, m.provider_count, SHORTAGE_THRESHOLD
            )
        },
    },
    Rule {
        priority: Priority::Medium,
        kind: RecommendationType::HighUtilization,
        applies: |m, _| {
            m.claims_reported && m.claims_count > m.provider_count as u64 * CLAIMS_PER_PROVIDER_LIMIT
        },
        describe: |m, _| {
            format!(
                "{} claims across {} providers exceeds {} claims per provider. Expand capacity to relieve utilization.",
                m.claims_count, m.provider_count, CLAIMS_PER_PROVIDER_LIMIT
            )
        },
    },
    Rule {
        priority: Priority::High,
        kind: RecommendationType::NetworkInstability,
        applies: |_, t| t.map_or(false, |t| t.percentage_terminated > INSTABILITY_PERCENT),
        describe: |_, t| match t {
            Some(t) => format!(
                "{}% of {} enrollments have terminated ({} of {}). Review retention for this network.",
                t.percentage_terminated, t.network_id, t.term_network_count, t.service_location_count
            ),
            None => String::new(),
        },
    },
];

/// Evaluate every rule in order; pure and idempotent
pub fn recommend(metrics: &CountyMetrics, stability: Option<&TerminatedAnalysis>) -> Vec<Recommendation> {
    RULES
        .iter()
        .filter(|rule| (rule.applies)(metrics, stability))
        .map(|rule| Recommendation {
            priority: rule.priority,
            kind: rule.kind,
            description: (rule.describe)(metrics, stability),
        })
        .collect()
}
