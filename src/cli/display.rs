//! Terminal rendering of analysis results

use colored::{ColoredString, Colorize};

use super::Verbosity;
use crate::anomaly::{Anomaly, Severity};
use crate::insights::Insight;
use crate::prediction::{CapacityPlan, ResourceForecast, TrendAnalysis, TrendDirection};
use crate::recommendations::{Recommendation, Strategy};
use crate::service::{AnalyticsSnapshot, ServiceStatus, SessionAnalysis};

const RULE: &str = "─────────────────────────────────────";

pub fn severity_label(severity: Severity) -> ColoredString {
    let label = format!("[{}]", severity);
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.dimmed(),
    }
}

fn heading(title: &str) {
    println!("\n{}", title.bold());
    println!("{}", RULE);
}

/// Prints analysis results at the configured verbosity
pub struct ReportPrinter {
    verbosity: Verbosity,
}

impl ReportPrinter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn print_snapshot(&self, snapshot: &AnalyticsSnapshot) {
        if !self.verbosity.show_output() {
            return;
        }

        println!(
            "{} {} sessions analyzed",
            "📊".bold(),
            snapshot.sessions_analyzed
        );
        self.print_insights(&snapshot.insights);
        self.print_recommendations(&snapshot.recommendations);
        self.print_strategies(&snapshot.strategies);
        self.print_anomalies(&snapshot.anomalies);
        if self.verbosity.show_details() {
            self.print_trends(&snapshot.trends);
        }
    }

    pub fn print_insights(&self, insights: &[Insight]) {
        heading("Insights");
        if insights.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for insight in insights {
            println!(
                "  {} {} ({}, {:.0}% confidence)",
                severity_label(insight.severity),
                insight.title,
                insight.insight_type,
                insight.confidence * 100.0
            );
            if self.verbosity.show_details() {
                println!("      {}", insight.description);
                for suggestion in &insight.suggestions {
                    println!("      → {}", suggestion);
                }
            }
        }
    }

    pub fn print_recommendations(&self, recommendations: &[Recommendation]) {
        heading("Recommendations");
        if recommendations.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for rec in recommendations {
            println!(
                "  {} {} [{} / {}]",
                severity_label(rec.priority),
                rec.title,
                rec.category,
                rec.implementation.difficulty
            );
            if self.verbosity.show_details() {
                println!("      {}", rec.description);
                for (i, step) in rec.implementation.steps.iter().enumerate() {
                    println!("      {}. {}", i + 1, step);
                }
            }
        }
    }

    pub fn print_strategies(&self, strategies: &[Strategy]) {
        if strategies.is_empty() {
            return;
        }
        heading("Strategies");
        for strategy in strategies {
            println!(
                "  {} {} recommendation(s), +{:.0}% performance, ${:.2} savings, {:.0}h",
                strategy.name.cyan(),
                strategy.recommendations.len(),
                strategy.combined.performance_gain * 100.0,
                strategy.combined.cost_savings,
                strategy.combined.implementation_hours
            );
        }
    }

    pub fn print_anomalies(&self, anomalies: &[Anomaly]) {
        heading("Anomalies");
        if anomalies.is_empty() {
            println!("  {}", "none".dimmed());
        }
        for anomaly in anomalies {
            let session = anomaly.session_id.as_deref().unwrap_or("-");
            println!(
                "  {} {} ({}, session {})",
                severity_label(anomaly.severity),
                anomaly.title,
                anomaly.anomaly_type,
                session
            );
            if self.verbosity.show_details() {
                println!(
                    "      actual {:.2}, expected {:.2}, deviation {:.2}",
                    anomaly.metrics.actual_value,
                    anomaly.metrics.expected_value,
                    anomaly.metrics.deviation_score
                );
            }
        }
    }

    pub fn print_trends(&self, trends: &[TrendAnalysis]) {
        heading("Trends");
        for trend in trends {
            let arrow = match trend.direction {
                TrendDirection::Up => "↑".green(),
                TrendDirection::Down => "↓".red(),
                TrendDirection::Stable => "→".dimmed(),
            };
            println!(
                "  {} {} slope {:.3} (r² {:.2}), {} change point(s)",
                arrow,
                trend.metric,
                trend.slope,
                trend.r_squared,
                trend.change_points.len()
            );
        }
    }

    pub fn print_forecast(&self, forecast: &ResourceForecast) {
        if !self.verbosity.show_output() {
            return;
        }
        heading(&format!("Resource forecast ({} days)", forecast.days));
        for metric in &forecast.metrics {
            println!(
                "  {}{}",
                metric.metric.to_string().cyan(),
                if metric.seasonal { " (weekly seasonality)" } else { "" }
            );
            for point in &metric.points {
                println!(
                    "    {}  {:>10.2}  [{:.2} .. {:.2}]  {:.0}%",
                    point.date,
                    point.predicted,
                    point.range.lower,
                    point.range.upper,
                    point.confidence * 100.0
                );
            }
        }
        println!(
            "\n  Budget: expected ${:.2}, optimistic ${:.2}, conservative ${:.2}",
            forecast.budget.expected, forecast.budget.optimistic, forecast.budget.conservative
        );
    }

    pub fn print_capacity(&self, plan: &CapacityPlan) {
        if !self.verbosity.show_output() {
            return;
        }
        heading("Capacity");
        match plan.peak_hour {
            Some(hour) => println!(
                "  Peak at {:02}:00 UTC with {:.1} expected sessions",
                hour, plan.peak_load
            ),
            None => println!("  {}", "no load expected".dimmed()),
        }
        println!("  Projected cost: ${:.2}", plan.projected_cost);
        for alert in &plan.alerts {
            println!("  {} {}", severity_label(alert.severity), alert.message);
        }
    }

    pub fn print_session(&self, analysis: &SessionAnalysis) {
        if !self.verbosity.show_output() {
            return;
        }
        println!("{} session {}", "🔎".bold(), analysis.session_id.bold());
        self.print_anomalies(&analysis.anomalies);

        if let Some(prediction) = &analysis.anomaly_prediction {
            heading("Anomaly risk");
            println!("  Overall risk: {:.0}%", prediction.overall_risk * 100.0);
            for predicted in &prediction.predictions {
                println!(
                    "  {} {} ({:.0}%)",
                    severity_label(predicted.expected_severity),
                    predicted.anomaly_type,
                    predicted.probability * 100.0
                );
            }
        }

        if let Some(outcome) = &analysis.outcome {
            heading("Predicted outcome");
            if let Some(quality) = outcome.predicted_quality {
                println!("  Quality:  {:.2}", quality);
            }
            if let Some(cost) = outcome.predicted_cost {
                println!("  Cost:     ${:.4}", cost);
            }
            if let Some(duration) = outcome.predicted_duration_ms {
                println!("  Duration: {:.1}s", duration / 1000.0);
            }
            println!("  Confidence: {:.0}%", outcome.confidence * 100.0);
            for risk in &outcome.risk_factors {
                println!("  {} {}", severity_label(risk.impact), risk.factor);
            }
        }

        self.print_insights(&analysis.insights);
        if !analysis.recommendations.is_empty() {
            self.print_recommendations(&analysis.recommendations);
        }
    }

    pub fn print_status(&self, status: &ServiceStatus) {
        if !self.verbosity.show_details() {
            return;
        }
        heading("Service");
        println!("  Prediction models: {}", status.prediction_models);
        println!("  Anomaly patterns:  {}", status.anomaly_patterns);
        println!(
            "  Last analysis:     {}",
            status
                .last_analysis
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        );
        println!("  Load failures:     {}", status.telemetry.load_failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_label_text() {
        colored::control::set_override(false);
        assert_eq!(severity_label(Severity::High).to_string(), "[high]");
        assert_eq!(severity_label(Severity::Critical).to_string(), "[critical]");
    }
}
