//! Strategy bundles over a recommendation set

use crate::anomaly::Severity;
use crate::recommendations::types::{
    CombinedImpact, Difficulty, Recommendation, RecommendationCategory, Strategy,
};

/// Group recommendations into named strategies
///
/// A recommendation can appear in several strategies. Strategies with no
/// members are omitted.
pub fn build_strategies(recommendations: &[Recommendation]) -> Vec<Strategy> {
    let bundles: [(&str, &str, fn(&Recommendation) -> bool); 5] = [
        (
            "Quick Wins",
            "Easy changes that can ship this week",
            |r| r.implementation.difficulty == Difficulty::Easy,
        ),
        (
            "Cost Optimization",
            "Reduce spend without hurting outcomes",
            |r| r.category == RecommendationCategory::Cost,
        ),
        (
            "Performance Excellence",
            "Faster, better-coordinated sessions",
            |r| {
                matches!(
                    r.category,
                    RecommendationCategory::Performance | RecommendationCategory::Efficiency
                )
            },
        ),
        (
            "Quality & Reliability",
            "Fewer failures and earlier warnings",
            |r| {
                matches!(
                    r.category,
                    RecommendationCategory::Quality | RecommendationCategory::Reliability
                )
            },
        ),
        (
            "Critical Fixes",
            "Address before anything else",
            |r| r.priority == Severity::Critical,
        ),
    ];

    bundles
        .iter()
        .filter_map(|(name, description, member)| {
            let members: Vec<Recommendation> =
                recommendations.iter().filter(|r| member(r)).cloned().collect();
            if members.is_empty() {
                return None;
            }
            Some(Strategy {
                name: name.to_string(),
                description: description.to_string(),
                combined: combined_impact(&members),
                recommendations: members,
            })
        })
        .collect()
}

pub fn combined_impact(recommendations: &[Recommendation]) -> CombinedImpact {
    recommendations.iter().fold(CombinedImpact::default(), |acc, r| CombinedImpact {
        performance_gain: acc.performance_gain + r.impact.performance_gain,
        cost_savings: acc.cost_savings + r.impact.cost_savings,
        implementation_hours: acc.implementation_hours + r.implementation.estimated_hours,
    })
}
