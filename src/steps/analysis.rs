use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use super::format_hours;
use crate::belief::{Action, AnalysisResult, BeliefState, RiskLevel};
use crate::error::{StepError, StepResult};
use crate::knowledge::{HistoricalEvent, KnowledgeDomain};

/// Normalized hour score at or above which an hour is high risk.
const HIGH_RISK_SCORE: f64 = 0.8;
/// Normalized hour score at or above which an hour is medium risk.
const MEDIUM_RISK_SCORE: f64 = 0.5;
/// Event impact (absolute percent) that marks an event as high risk.
const HIGH_IMPACT_PCT: f64 = 5.0;
const MEDIUM_IMPACT_PCT: f64 = 2.0;
/// Trend (absolute percent) strong enough to suggest a direction.
const TREND_DIRECTION_PCT: f64 = 1.0;

const WEATHER_FEATURES: &[&str] = &[
    "temp", "weather", "hdd", "cdd", "heat", "cool", "wind", "humid", "solar", "cloud",
];
const WEATHER_WORDS: &[&str] = &[
    "cold", "snap", "heat", "temperature", "weather", "freez", "frost", "snow", "storm", "hot",
    "wind",
];
const STOP_WORDS: &[&str] = &[
    "with", "that", "this", "from", "during", "hours", "hour", "demand", "forecast", "should",
    "would", "there", "their", "about", "adjust", "adjustment",
];

/// Per-hour risk inputs, each relative to the largest value observed.
#[derive(Debug, Default, Clone, Copy)]
struct HourRisk {
    variation: Option<f64>,
    mape: Option<f64>,
    spread: Option<f64>,
}

/// Turn visited evidence into patterns and risk buckets.
///
/// Uses only the domains already visited. Fails with an ordering
/// violation if nothing has been visited or analysis already ran.
pub fn analyze(state: &mut BeliefState) -> StepResult<()> {
    if !state.action_available(Action::Analyze) {
        let reason = if state.visited_count() == 0 {
            "no knowledge domain visited"
        } else {
            "analysis is not available in the current phase"
        };
        return Err(StepError::ordering("analyze", reason));
    }

    let result = build_analysis(state);
    info!(
        session_id = %state.session_id,
        patterns = result.patterns.len(),
        high_risk = result.high_risk.len(),
        domains = result.domains_used.len(),
        "Analysis completed"
    );
    state.set_analysis(result)
}

/// Compute the analysis for the current evidence without storing it.
pub(crate) fn build_analysis(state: &BeliefState) -> AnalysisResult {
    let mut result = AnalysisResult {
        domains_used: KnowledgeDomain::ALL
            .into_iter()
            .filter(|d| state.payload(*d).is_some())
            .collect(),
        ..Default::default()
    };

    if result.domains_used.is_empty() {
        result
            .patterns
            .push("No evidence retrieved; every visited domain was unavailable".to_string());
        result
            .low_risk
            .push("no quantitative risk evidence in visited domains".to_string());
        return result;
    }

    hourly_risk(state, &mut result);
    context_evidence(state, &mut result);
    peak_hours(state, &mut result);
    model_patterns(state, &mut result);
    cross_domain_patterns(state, &mut result);

    if result.evidence_direction == 0 {
        if let Some(trend) = state.data().and_then(|d| d.recent_trend_pct) {
            if trend.abs() >= TREND_DIRECTION_PCT {
                result.evidence_direction = if trend > 0.0 { 1 } else { -1 };
            }
        }
    }

    if result.high_risk.is_empty() && result.medium_risk.is_empty() && result.low_risk.is_empty() {
        result
            .low_risk
            .push("no quantitative risk evidence in visited domains".to_string());
    }
    result
}

fn hourly_risk(state: &BeliefState, result: &mut AnalysisResult) {
    let mut hours: BTreeMap<u8, HourRisk> = BTreeMap::new();

    if let Some(data) = state.data() {
        for stat in &data.hourly {
            hours.entry(stat.hour).or_default().variation = Some(stat.variation());
        }
    }
    if let Some(model) = state.model() {
        for error in &model.hourly_error {
            hours.entry(error.hour).or_default().mape = Some(error.mape.abs());
        }
    }
    if let Some(prediction) = state.prediction() {
        for point in &prediction.hourly {
            if let Some(spread) = point.relative_spread() {
                hours.entry(point.hour).or_default().spread = Some(spread);
            }
        }
    }
    if hours.is_empty() {
        return;
    }

    let max_of = |f: fn(&HourRisk) -> Option<f64>| {
        hours
            .values()
            .filter_map(f)
            .fold(0.0_f64, f64::max)
    };
    let max_variation = max_of(|h| h.variation);
    let max_mape = max_of(|h| h.mape);
    let max_spread = max_of(|h| h.spread);

    for (hour, risk) in &hours {
        let mut scores = Vec::new();
        let mut parts = Vec::new();
        if let Some(v) = risk.variation {
            parts.push(format!("variation {:.1}%", v * 100.0));
            if max_variation > 0.0 {
                scores.push(v / max_variation);
            }
        }
        if let Some(m) = risk.mape {
            parts.push(format!("model error {:.1}% MAPE", m));
            if max_mape > 0.0 {
                scores.push(m / max_mape);
            }
        }
        if let Some(s) = risk.spread {
            parts.push(format!("interval ±{:.1}%", s * 50.0));
            if max_spread > 0.0 {
                scores.push(s / max_spread);
            }
        }

        let score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        let level = if score >= HIGH_RISK_SCORE {
            RiskLevel::High
        } else if score >= MEDIUM_RISK_SCORE {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let line = format!("hour {:02}: {}", hour, parts.join(", "));
        match level {
            RiskLevel::High => {
                result.high_risk.push(line);
                result.high_risk_hours.insert(*hour);
            }
            RiskLevel::Medium => result.medium_risk.push(line),
            RiskLevel::Low => result.low_risk.push(line),
        }
    }
}

fn context_evidence(state: &BeliefState, result: &mut AnalysisResult) {
    let Some(context) = state.context() else {
        return;
    };

    let keywords = intent_keywords(&format!("{} {}", state.intent, state.reasoning));
    let with_impact: Vec<&HistoricalEvent> = context
        .events
        .iter()
        .filter(|e| e.demand_impact_pct.is_some())
        .collect();

    for event in &with_impact {
        let impact = event.demand_impact_pct.unwrap_or_default();
        let hours = if event.hours.is_empty() {
            String::new()
        } else {
            format!(" at hours {}", format_hours(&event.hours))
        };
        let line = format!("event: {} ({:+.1}%){}", event.description, impact, hours);
        if impact.abs() >= HIGH_IMPACT_PCT {
            result.high_risk.push(line);
            result.high_risk_hours.extend(event.hours.iter().copied().filter(|h| *h < 24));
        } else if impact.abs() >= MEDIUM_IMPACT_PCT {
            result.medium_risk.push(line);
        } else {
            result.low_risk.push(line);
        }
    }

    let relevant: Vec<&HistoricalEvent> = with_impact
        .iter()
        .copied()
        .filter(|e| is_relevant(e, &keywords))
        .collect();
    let basis = if relevant.is_empty() { &with_impact } else { &relevant };

    if !basis.is_empty() {
        let impacts: Vec<f64> = basis.iter().filter_map(|e| e.demand_impact_pct).collect();
        let mean = impacts.iter().sum::<f64>() / impacts.len() as f64;
        let mean_abs = impacts.iter().map(|i| i.abs()).sum::<f64>() / impacts.len() as f64;
        result.historical_impact_pct = Some(mean_abs);
        if mean.abs() > f64::EPSILON {
            result.evidence_direction = if mean > 0.0 { 1 } else { -1 };
        }
        let label = if relevant.is_empty() { "historical" } else { "similar historical" };
        result.patterns.push(format!(
            "{} {} event(s) averaged {:+.1}% demand impact",
            basis.len(),
            label,
            mean
        ));
    } else if context.events.is_empty() {
        result
            .patterns
            .push("Historical context holds no comparable events".to_string());
    } else {
        result.patterns.push(format!(
            "{} historical event(s) recorded without measured impact",
            context.events.len()
        ));
    }
}

fn peak_hours(state: &BeliefState, result: &mut AnalysisResult) {
    if let Some(prediction) = state.prediction() {
        let mut points: Vec<_> = prediction.hourly.iter().collect();
        points.sort_by(|a, b| b.value.total_cmp(&a.value));
        result.peak_hours = points.iter().take(3).map(|p| p.hour).collect();
        if let Some(top) = points.first() {
            result.patterns.push(format!(
                "Baseline peaks at hour {:02} ({:.1}{})",
                top.hour,
                top.value,
                prediction
                    .unit
                    .as_ref()
                    .map(|u| format!(" {}", u))
                    .unwrap_or_default()
            ));
        }
    }

    if let Some(data) = state.data() {
        let mut stats: Vec<_> = data.hourly.iter().collect();
        stats.sort_by(|a, b| b.mean.total_cmp(&a.mean));
        let historical: BTreeSet<u8> = stats.iter().take(3).map(|s| s.hour).collect();
        if !historical.is_empty() {
            result.patterns.push(format!(
                "Historical demand peaks at hours {}",
                format_hours(&historical)
            ));
        }
        if let Some(trend) = data.recent_trend_pct {
            result
                .patterns
                .push(format!("Recent demand trend {:+.1}%", trend));
        }
        if result.peak_hours.is_empty() {
            result.peak_hours = historical;
        }
    }
}

fn model_patterns(state: &BeliefState, result: &mut AnalysisResult) {
    let Some(model) = state.model() else {
        return;
    };
    let mut features: Vec<_> = model.feature_importances.iter().collect();
    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    if let Some(top) = features.first() {
        result.patterns.push(format!(
            "Model is most sensitive to {} (importance {:.2})",
            top.feature, top.importance
        ));
    }

    let weather_led = features
        .iter()
        .take(3)
        .any(|f| is_weather_feature(&f.feature));
    if weather_led {
        let text = format!("{} {}", state.intent, state.reasoning).to_lowercase();
        if WEATHER_WORDS.iter().any(|w| text.contains(w)) {
            result.patterns.push(
                "Weather features named in the reasoning rank among the model's top drivers"
                    .to_string(),
            );
        } else {
            result
                .patterns
                .push("Weather features rank among the model's top drivers".to_string());
        }
    }
}

fn cross_domain_patterns(state: &BeliefState, result: &mut AnalysisResult) {
    if let (Some(data), Some(prediction)) = (state.data(), state.prediction()) {
        let mut stats: Vec<_> = data.hourly.iter().collect();
        stats.sort_by(|a, b| b.mean.total_cmp(&a.mean));
        let historical: BTreeSet<u8> = stats.iter().take(3).map(|s| s.hour).collect();

        let mut points: Vec<_> = prediction.hourly.iter().collect();
        points.sort_by(|a, b| b.value.total_cmp(&a.value));
        let baseline: BTreeSet<u8> = points.iter().take(3).map(|p| p.hour).collect();

        if !historical.is_empty() && !baseline.is_empty() {
            if historical.intersection(&baseline).next().is_some() {
                result
                    .patterns
                    .push("Baseline peak hours align with historical peaks".to_string());
            } else {
                result
                    .patterns
                    .push("Baseline peak hours differ from historical peaks".to_string());
            }
        }
    }

    if let Some(model) = state.model() {
        let worst = model
            .hourly_error
            .iter()
            .max_by(|a, b| a.mape.total_cmp(&b.mape))
            .map(|e| e.hour);
        if let Some(hour) = worst {
            if result.peak_hours.contains(&hour) {
                result.patterns.push(format!(
                    "Largest model error (hour {:02}) falls in a peak hour",
                    hour
                ));
            }
        }
    }
}

fn is_weather_feature(feature: &str) -> bool {
    let lower = feature.to_lowercase();
    WEATHER_FEATURES.iter().any(|w| lower.contains(w))
}

fn intent_keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn is_relevant(event: &HistoricalEvent, keywords: &BTreeSet<String>) -> bool {
    let text = format!(
        "{} {}",
        event.description,
        event.kind.as_deref().unwrap_or_default()
    )
    .to_lowercase();
    keywords.iter().any(|k| text.contains(k.as_str()))
}
