use std::collections::BTreeMap;

use tracing::info;

use super::{format_hours, round2};
use crate::belief::{
    Action, AdjustmentEntry, AdjustmentPlan, BeliefState, DecisionStrategy, Direction, RiskLevel,
};
use crate::error::{StepError, StepResult};
use crate::knowledge::KnowledgeDomain;

/// Weight of the advisor's own confidence in the final score.
const ADVISOR_WEIGHT: f64 = 0.4;
/// Weight of the mean insight confidence.
const INSIGHT_WEIGHT: f64 = 0.3;
/// Weight of the share of domains retrieved successfully.
const EVIDENCE_WEIGHT: f64 = 0.3;
/// Multiplier applied when no baseline forecast was retrieved.
const NO_BASELINE_FACTOR: f64 = 0.6;
/// Deduction per knowledge domain that failed to retrieve.
const FAILED_DOMAIN_PENALTY: f64 = 0.05;

/// Turn the decision into a per-hour plan and finalize the session.
///
/// With a baseline forecast, only hours present in it are planned and each
/// entry carries original and adjusted values. Without one, entries carry
/// only the percentage change and the confidence is lowered.
pub fn execute(state: &mut BeliefState) -> StepResult<()> {
    if !state.action_available(Action::Execute) {
        let reason = if state.decision().is_none() {
            "decision has not run"
        } else {
            "execution is not available in the current phase"
        };
        return Err(StepError::ordering("execute", reason));
    }
    let Some(decision) = state.decision().cloned() else {
        return Err(StepError::ordering("execute", "decision has not run"));
    };

    let (plan, skipped) = build_plan(state, &decision);
    let confidence = final_confidence(state);
    let recommendations = recommendations(state, &decision, &plan, &skipped);
    let justification = justification(state, &decision);

    info!(
        session_id = %state.session_id,
        entries = plan.entries.len(),
        skipped = skipped.len(),
        confidence,
        "Adjustment plan produced"
    );

    state.set_plan(plan)?;
    state.finalize(justification, recommendations, confidence);
    Ok(())
}

/// Build the plan entries and report target hours missing from the baseline.
fn build_plan(state: &BeliefState, decision: &DecisionStrategy) -> (AdjustmentPlan, Vec<u8>) {
    let mut entries = BTreeMap::new();
    let mut skipped = Vec::new();
    if decision.direction == Direction::Hold {
        return (AdjustmentPlan { entries }, skipped);
    }

    let pct_change = round2(decision.direction.sign() * decision.magnitude_pct);
    let risk_of = |hour: u8| -> Option<RiskLevel> {
        let analysis = state.analysis()?;
        if analysis.high_risk_hours.contains(&hour) {
            Some(RiskLevel::High)
        } else {
            let tag = format!("hour {:02}:", hour);
            if analysis.medium_risk.iter().any(|r| r.starts_with(&tag)) {
                Some(RiskLevel::Medium)
            } else {
                None
            }
        }
    };

    for hour in &decision.target_hours {
        let mut rationale = format!("{} {:.1}%", decision.direction, decision.magnitude_pct);
        match risk_of(*hour) {
            Some(RiskLevel::High) => rationale.push_str("; high-risk hour"),
            Some(RiskLevel::Medium) => rationale.push_str("; medium-risk hour"),
            _ => {}
        }

        match state.prediction() {
            Some(baseline) => match baseline.value_at(*hour) {
                Some(original) => {
                    entries.insert(
                        *hour,
                        AdjustmentEntry {
                            hour: *hour,
                            original: Some(original),
                            adjusted: Some(round2(original * (1.0 + pct_change / 100.0))),
                            pct_change,
                            rationale,
                        },
                    );
                }
                None => skipped.push(*hour),
            },
            None => {
                rationale.push_str("; baseline not retrieved");
                entries.insert(
                    *hour,
                    AdjustmentEntry {
                        hour: *hour,
                        original: None,
                        adjusted: None,
                        pct_change,
                        rationale,
                    },
                );
            }
        }
    }
    (AdjustmentPlan { entries }, skipped)
}

fn final_confidence(state: &BeliefState) -> f64 {
    let advisor = state.confidence();
    let insights = state.insights();
    let insight_mean = if insights.is_empty() {
        advisor
    } else {
        insights.iter().map(|i| i.confidence).sum::<f64>() / insights.len() as f64
    };
    let evidence = state.successful_domains() as f64 / KnowledgeDomain::ALL.len() as f64;

    let mut confidence =
        ADVISOR_WEIGHT * advisor + INSIGHT_WEIGHT * insight_mean + EVIDENCE_WEIGHT * evidence;
    if state.prediction().is_none() {
        confidence *= NO_BASELINE_FACTOR;
    }
    let failed = KnowledgeDomain::ALL
        .into_iter()
        .filter(|d| state.domain_error(*d).is_some())
        .count();
    confidence -= FAILED_DOMAIN_PENALTY * failed as f64;
    round2(confidence.clamp(0.0, 1.0))
}

fn recommendations(
    state: &BeliefState,
    decision: &DecisionStrategy,
    plan: &AdjustmentPlan,
    skipped: &[u8],
) -> Vec<String> {
    let mut recs = Vec::new();

    if decision.direction == Direction::Hold {
        recs.push(
            "No directional evidence; keep the baseline and revisit when new data arrives"
                .to_string(),
        );
    }
    if state.prediction().is_none() && !plan.is_empty() {
        recs.push(
            "Baseline forecast was not retrieved; apply the percentage changes to the published forecast manually"
                .to_string(),
        );
    }
    if !skipped.is_empty() {
        recs.push(format!(
            "Hours {} are not in the baseline forecast and were left out",
            format_hours(skipped)
        ));
    }
    if let Some(analysis) = state.analysis() {
        let watched: Vec<u8> = plan
            .hours()
            .into_iter()
            .filter(|h| analysis.high_risk_hours.contains(h))
            .collect();
        if !watched.is_empty() {
            recs.push(format!(
                "Monitor hours {} closely; evidence marks them high risk",
                format_hours(&watched)
            ));
        }
    }
    for question in state.open_questions_ranked().into_iter().take(3) {
        recs.push(format!("Resolve open question: {}", question.content));
    }
    for gap in state.open_gaps_ranked().into_iter().take(2) {
        recs.push(format!("Fill knowledge gap: {}", gap.description));
    }
    recs
}

fn justification(state: &BeliefState, decision: &DecisionStrategy) -> String {
    let mut lines = vec![
        format!("Intent: {}", state.intent),
        format!("Reasoning: {}", state.reasoning),
        format!("Strategy: {}", decision.approach),
        format!("Rationale: {}", decision.rationale),
    ];

    if let Some(analysis) = state.analysis() {
        if !analysis.patterns.is_empty() {
            lines.push(format!("Evidence: {}", analysis.patterns.join("; ")));
        }
    }

    let mut insights: Vec<_> = state.insights().iter().collect();
    insights.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    if !insights.is_empty() {
        let top: Vec<String> = insights
            .iter()
            .take(3)
            .map(|i| format!("{} ({:.2})", i.content, i.confidence))
            .collect();
        lines.push(format!("Key insights: {}", top.join("; ")));
    }

    let consulted: Vec<String> = state
        .visited_domains()
        .into_iter()
        .map(|d| match state.domain_error(d) {
            Some(_) => format!("{} (unavailable)", d),
            None => d.to_string(),
        })
        .collect();
    lines.push(format!(
        "Domains consulted: {}",
        if consulted.is_empty() { "none".to_string() } else { consulted.join(", ") }
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::belief::{AnalysisResult, InsightDraft};
    use crate::knowledge::{BaselineForecast, DomainPayload, HourlyPrediction};

    fn decided_state(with_baseline: bool) -> BeliefState {
        let mut state = BeliefState::initialize(
            "s",
            "raise morning peak",
            "cold snap",
            10,
            Duration::from_secs(60),
        );
        state.record_round(
            "",
            vec![InsightDraft {
                content: "cold mornings".to_string(),
                confidence: 0.8,
                related_question_ids: vec![],
            }],
            vec![],
            vec![],
            0.6,
        );
        state.mark_domain_visited(KnowledgeDomain::Prediction).unwrap();
        if with_baseline {
            state.store_payload(DomainPayload::Prediction(BaselineForecast {
                target_date: None,
                unit: None,
                hourly: (6..=8)
                    .map(|hour| HourlyPrediction {
                        hour,
                        value: 1000.0,
                        lower: None,
                        upper: None,
                    })
                    .collect(),
            }));
        } else {
            state.record_domain_error(KnowledgeDomain::Prediction, "offline");
        }
        state
            .set_analysis(AnalysisResult {
                high_risk_hours: [8].into_iter().collect(),
                ..Default::default()
            })
            .unwrap();
        state
            .set_decision(DecisionStrategy {
                approach: "Increase demand by 5.0% over hours 07-09".to_string(),
                target_hours: [7, 8, 9].into_iter().collect(),
                direction: Direction::Increase,
                magnitude_pct: 5.0,
                rationale: "cold".to_string(),
            })
            .unwrap();
        state
    }

    #[test]
    fn test_plan_only_covers_baseline_hours() {
        let mut state = decided_state(true);
        execute(&mut state).unwrap();

        let plan = state.plan().unwrap();
        assert_eq!(plan.hours(), [7, 8].into_iter().collect());
        let entry = &plan.entries[&7];
        assert_eq!(entry.original, Some(1000.0));
        assert_eq!(entry.adjusted, Some(1050.0));
        assert_eq!(entry.pct_change, 5.0);
        assert!(plan.entries[&8].rationale.contains("high-risk"));

        assert!(state.is_complete());
        assert!(!state.stopped_by_limit());
        let output = state.to_output();
        assert!(output.recommendations.iter().any(|r| r.contains("Hours 09")));
        assert!(output.justification.contains("Strategy: Increase demand"));
    }

    #[test]
    fn test_missing_baseline_lowers_confidence() {
        let mut with = decided_state(true);
        let mut without = decided_state(false);
        execute(&mut with).unwrap();
        execute(&mut without).unwrap();

        let plan = without.plan().unwrap();
        assert_eq!(plan.entries.len(), 3);
        assert!(plan.entries.values().all(|e| e.original.is_none() && e.adjusted.is_none()));
        assert!(without.confidence() < with.confidence());
        assert!(without
            .to_output()
            .recommendations
            .iter()
            .any(|r| r.contains("not retrieved")));
    }

    #[test]
    fn test_execute_requires_decision() {
        let mut state = BeliefState::initialize("s", "i", "r", 5, Duration::from_secs(5));
        assert!(execute(&mut state).is_err());
        assert!(!state.is_complete());
    }

    #[test]
    fn test_execute_runs_once() {
        let mut state = decided_state(true);
        execute(&mut state).unwrap();
        assert!(execute(&mut state).is_err());
    }
}
