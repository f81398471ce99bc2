use std::collections::BTreeSet;

use tracing::info;

use super::{format_hours, periods, round2};
use crate::belief::{Action, AnalysisResult, BeliefState, DecisionStrategy, Direction};
use crate::error::{StepError, StepResult};

/// Default magnitude when target hours include a high-risk hour.
const HIGH_RISK_DEFAULT_PCT: f64 = 5.0;
/// Default magnitude otherwise.
const BASE_DEFAULT_PCT: f64 = 3.0;
/// Upper bound on any magnitude, stated or derived.
const MAX_MAGNITUDE_PCT: f64 = 15.0;

/// Choose target hours, direction and magnitude from the analysis.
///
/// Periods named in the intent or reasoning take precedence; without them
/// the high-risk hours, then the peak hours, are targeted.
pub fn decide(state: &mut BeliefState) -> StepResult<()> {
    if !state.action_available(Action::Decide) {
        let reason = if state.analysis().is_none() {
            "analysis has not run"
        } else {
            "decision is not available in the current phase"
        };
        return Err(StepError::ordering("decide", reason));
    }
    let Some(analysis) = state.analysis() else {
        return Err(StepError::ordering("decide", "analysis has not run"));
    };

    let strategy = build_strategy(&state.intent, &state.reasoning, analysis);
    info!(
        session_id = %state.session_id,
        direction = %strategy.direction,
        magnitude_pct = strategy.magnitude_pct,
        hours = %format_hours(&strategy.target_hours),
        "Decision made"
    );
    state.set_decision(strategy)
}

pub(crate) fn build_strategy(
    intent: &str,
    reasoning: &str,
    analysis: &AnalysisResult,
) -> DecisionStrategy {
    let text = format!("{} {}", intent, reasoning);
    let mut rationale: Vec<String> = Vec::new();

    let named = periods::extract_hours(&text);
    let target_hours: BTreeSet<u8> = if !named.is_empty() {
        let overlap: BTreeSet<u8> = named
            .intersection(&analysis.high_risk_hours)
            .copied()
            .collect();
        if overlap.is_empty() {
            rationale.push(format!("Hours {} taken from the stated intent", format_hours(&named)));
        } else {
            rationale.push(format!(
                "Hours {} taken from the stated intent; {} also flagged high risk",
                format_hours(&named),
                format_hours(&overlap)
            ));
        }
        named
    } else if !analysis.high_risk_hours.is_empty() {
        rationale.push(format!(
            "No period named; targeting high-risk hours {}",
            format_hours(&analysis.high_risk_hours)
        ));
        analysis.high_risk_hours.clone()
    } else if !analysis.peak_hours.is_empty() {
        rationale.push(format!(
            "No period named; targeting peak hours {}",
            format_hours(&analysis.peak_hours)
        ));
        analysis.peak_hours.clone()
    } else {
        rationale.push("No period named and no hourly evidence to target".to_string());
        BTreeSet::new()
    };

    let direction = match periods::direction_hint(&text) {
        Some(direction) => {
            rationale.push(format!("Wording asks for an {}", direction));
            direction
        }
        None => match analysis.evidence_direction {
            d if d > 0 => {
                rationale.push("Evidence points to higher demand".to_string());
                Direction::Increase
            }
            d if d < 0 => {
                rationale.push("Evidence points to lower demand".to_string());
                Direction::Decrease
            }
            _ => {
                rationale.push("Neither wording nor evidence gives a direction".to_string());
                Direction::Hold
            }
        },
    };

    let magnitude_pct = if direction == Direction::Hold || target_hours.is_empty() {
        0.0
    } else if let Some(explicit) = periods::magnitude_hint(&text) {
        if explicit > MAX_MAGNITUDE_PCT {
            rationale.push(format!(
                "Magnitude {:.1}% stated explicitly, capped at {:.1}%",
                explicit, MAX_MAGNITUDE_PCT
            ));
            MAX_MAGNITUDE_PCT
        } else {
            rationale.push(format!("Magnitude {:.1}% stated explicitly", explicit));
            explicit
        }
    } else {
        let (base, source) = match analysis.historical_impact_pct {
            Some(impact) if impact > 0.0 => (impact, "historical impact"),
            _ if target_hours.iter().any(|h| analysis.high_risk_hours.contains(h)) => {
                (HIGH_RISK_DEFAULT_PCT, "high-risk default")
            }
            _ => (BASE_DEFAULT_PCT, "default"),
        };
        let scale = periods::intensity(&text);
        let magnitude = round2((base * scale).min(MAX_MAGNITUDE_PCT));
        if (scale - 1.0).abs() > f64::EPSILON {
            rationale.push(format!(
                "Magnitude {:.1}% from {} scaled x{:.1} by intensity wording",
                magnitude, source, scale
            ));
        } else {
            rationale.push(format!("Magnitude {:.1}% from {}", magnitude, source));
        }
        magnitude
    };

    let approach = match direction {
        Direction::Hold => "Hold the baseline; no adjustment".to_string(),
        _ if target_hours.is_empty() => "Hold the baseline; no hours to adjust".to_string(),
        _ => format!(
            "{} demand by {:.1}% over hours {}",
            capitalize(&direction.to_string()),
            magnitude_pct,
            format_hours(&target_hours)
        ),
    };

    DecisionStrategy {
        approach,
        target_hours,
        direction,
        magnitude_pct,
        rationale: rationale.join(". "),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::knowledge::{ContextualInformation, DomainPayload, KnowledgeDomain};

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            high_risk_hours: [18, 19].into_iter().collect(),
            peak_hours: [17, 18, 19].into_iter().collect(),
            evidence_direction: 1,
            historical_impact_pct: Some(4.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_named_period_wins() {
        let strategy = build_strategy("adjust the morning peak", "", &analysis());
        assert_eq!(strategy.target_hours, [7, 8, 9].into_iter().collect());
        assert_eq!(strategy.direction, Direction::Increase);
        assert_eq!(strategy.magnitude_pct, 4.0);
        assert_eq!(strategy.approach, "Increase demand by 4.0% over hours 07-09");
    }

    #[test]
    fn test_falls_back_to_high_risk_hours() {
        let strategy = build_strategy("lower the load", "it looks too high", &analysis());
        assert_eq!(strategy.target_hours, [18, 19].into_iter().collect());
        assert_eq!(strategy.direction, Direction::Decrease);
    }

    #[test]
    fn test_explicit_magnitude_and_intensity() {
        let explicit = build_strategy("raise hours 7-8 by 2.5%", "", &analysis());
        assert_eq!(explicit.magnitude_pct, 2.5);

        let strong = build_strategy("raise 7am", "temperatures far below normal", &analysis());
        assert_eq!(strong.magnitude_pct, 6.0);
    }

    #[test]
    fn test_explicit_magnitude_is_capped() {
        let strategy = build_strategy("raise the morning peak by 40%", "cold", &analysis());
        assert_eq!(strategy.magnitude_pct, MAX_MAGNITUDE_PCT);
        assert!(strategy.rationale.contains("capped at 15.0%"));
    }

    #[test]
    fn test_hold_without_direction() {
        let mut neutral = analysis();
        neutral.evidence_direction = 0;
        let strategy = build_strategy("look at hour 8", "", &neutral);
        assert_eq!(strategy.direction, Direction::Hold);
        assert_eq!(strategy.magnitude_pct, 0.0);
        assert!(strategy.approach.starts_with("Hold"));
    }

    #[test]
    fn test_decide_requires_analysis() {
        let mut state = BeliefState::initialize("s", "i", "r", 5, Duration::from_secs(5));
        assert!(decide(&mut state).is_err());

        state.mark_domain_visited(KnowledgeDomain::Context).unwrap();
        state.store_payload(DomainPayload::Context(ContextualInformation::default()));
        state.set_analysis(analysis()).unwrap();
        decide(&mut state).unwrap();
        assert!(state.decision().is_some());
        assert!(decide(&mut state).is_err());
    }
}
