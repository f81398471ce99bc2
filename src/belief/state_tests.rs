//! Unit tests for the belief state.
//!
//! Covers round accounting, question/gap lifecycle, routing order and the
//! ordering guards on the named slots.

use std::time::Duration;

use super::*;
use crate::knowledge::{BaselineForecast, DomainPayload, KnowledgeDomain};

fn new_state() -> BeliefState {
    BeliefState::initialize(
        "session-1",
        "adjust morning peak",
        "cold weather",
        10,
        Duration::from_secs(300),
    )
}

fn question(content: &str, domain: Option<KnowledgeDomain>, priority: f64) -> QuestionDraft {
    QuestionDraft {
        content: content.to_string(),
        target_domain: domain,
        priority,
    }
}

fn gap(description: &str, domains: Vec<KnowledgeDomain>, importance: f64) -> GapDraft {
    GapDraft {
        description: description.to_string(),
        importance,
        candidate_domains: domains,
    }
}

fn strategy() -> DecisionStrategy {
    DecisionStrategy {
        approach: "raise".to_string(),
        target_hours: [7, 8].into_iter().collect(),
        direction: Direction::Increase,
        magnitude_pct: 3.0,
        rationale: "cold".to_string(),
    }
}

#[test]
fn test_initialize_defaults() {
    let state = new_state();
    assert_eq!(state.round(), 0);
    assert_eq!(state.visited_count(), 0);
    assert!(!state.is_complete());
    assert!((state.confidence() - 0.5).abs() < f64::EPSILON);
    assert_eq!(state.phase(), SessionPhase::Initial);
}

#[test]
fn test_record_round_increments_and_assigns_ids() {
    let mut state = new_state();
    let delta = state.record_round(
        "thinking",
        vec![InsightDraft {
            content: "Morning demand is weather sensitive".to_string(),
            confidence: 1.7,
            related_question_ids: vec!["q1".to_string()],
        }],
        vec![
            question("What do hourly stats show?", Some(KnowledgeDomain::Data), 0.8),
            question("Any similar past events?", Some(KnowledgeDomain::Context), 0.6),
        ],
        vec![],
        0.6,
    );

    assert_eq!(state.round(), 1);
    assert_eq!(delta.new_insights.len(), 1);
    assert_eq!(delta.new_insights[0].id, "i1");
    assert_eq!(delta.new_insights[0].confidence, 1.0);
    assert_eq!(delta.new_questions[1].id, "q2");
    assert_eq!(state.transcript().len(), 1);
    assert_eq!(state.transcript()[0].action, None);
    state.record_action(Action::VisitData);
    assert_eq!(state.transcript()[0].action, Some(Action::VisitData));
    assert!((state.confidence() - 0.6).abs() < f64::EPSILON);
}

#[test]
fn test_record_round_skips_duplicates() {
    let mut state = new_state();
    state.record_round(
        "",
        vec![],
        vec![question("Check the baseline", Some(KnowledgeDomain::Prediction), 0.5)],
        vec![gap("Unknown model error", vec![KnowledgeDomain::Model], 0.5)],
        0.5,
    );
    let delta = state.record_round(
        "",
        vec![],
        vec![question("  check THE   baseline ", Some(KnowledgeDomain::Prediction), 0.9)],
        vec![gap("unknown model error", vec![KnowledgeDomain::Model], 0.9)],
        0.5,
    );
    assert!(delta.new_questions.is_empty());
    assert!(delta.new_gaps.is_empty());
    assert_eq!(state.questions().len(), 1);
    assert_eq!(state.knowledge_gaps().len(), 1);
    assert_eq!(state.round(), 2);
}

#[test]
fn test_visit_retires_targeting_questions() {
    let mut state = new_state();
    state.record_round(
        "",
        vec![],
        vec![
            question("stats?", Some(KnowledgeDomain::Data), 0.9),
            question("general?", None, 0.4),
        ],
        vec![gap("need stats and errors", vec![KnowledgeDomain::Data, KnowledgeDomain::Model], 0.7)],
        0.5,
    );

    state.mark_domain_visited(KnowledgeDomain::Data).unwrap();
    assert_eq!(state.questions()[0].status, EntryStatus::Retired);
    assert_eq!(state.questions()[1].status, EntryStatus::Open);
    // Gap still has an unvisited candidate.
    assert_eq!(state.knowledge_gaps()[0].status, EntryStatus::Open);

    state.mark_domain_visited(KnowledgeDomain::Model).unwrap();
    assert_eq!(state.knowledge_gaps()[0].status, EntryStatus::Retired);
}

#[test]
fn test_questions_for_visited_domain_start_retired() {
    let mut state = new_state();
    state.mark_domain_visited(KnowledgeDomain::Context).unwrap();
    let delta = state.record_round(
        "",
        vec![],
        vec![question("past events?", Some(KnowledgeDomain::Context), 0.9)],
        vec![],
        0.5,
    );
    assert_eq!(delta.new_questions[0].status, EntryStatus::Retired);
    assert!(state.routing_target().is_none());
}

#[test]
fn test_domain_visited_at_most_once() {
    let mut state = new_state();
    assert!(state.mark_domain_visited(KnowledgeDomain::Model).is_ok());
    let err = state.mark_domain_visited(KnowledgeDomain::Model).unwrap_err();
    assert!(err.to_string().contains("already visited"));
    assert_eq!(state.visited_count(), 1);
}

#[test]
fn test_routing_prefers_highest_priority_unvisited() {
    let mut state = new_state();
    state.record_round(
        "",
        vec![],
        vec![
            question("low", Some(KnowledgeDomain::Context), 0.2),
            question("high", Some(KnowledgeDomain::Model), 0.9),
            question("no domain", None, 1.0),
        ],
        vec![gap("mid", vec![KnowledgeDomain::Data], 0.5)],
        0.5,
    );
    assert_eq!(state.routing_target(), Some((KnowledgeDomain::Model, 0.9)));

    state.mark_domain_visited(KnowledgeDomain::Model).unwrap();
    assert_eq!(state.routing_target(), Some((KnowledgeDomain::Data, 0.5)));
}

#[test]
fn test_routing_ties_keep_insertion_order() {
    let mut state = new_state();
    state.record_round(
        "",
        vec![],
        vec![
            question("first", Some(KnowledgeDomain::Prediction), 0.7),
            question("second", Some(KnowledgeDomain::Data), 0.7),
        ],
        vec![gap("gap", vec![KnowledgeDomain::Context], 0.7)],
        0.5,
    );
    assert_eq!(
        state.routing_target().map(|(d, _)| d),
        Some(KnowledgeDomain::Prediction)
    );
    let ranked = state.open_questions_ranked();
    assert_eq!(ranked[0].content, "first");
    assert_eq!(ranked[1].content, "second");
}

#[test]
fn test_gap_routes_to_first_unvisited_candidate() {
    let mut state = new_state();
    state.mark_domain_visited(KnowledgeDomain::Model).unwrap();
    state.record_round(
        "",
        vec![],
        vec![],
        vec![gap("g", vec![KnowledgeDomain::Model, KnowledgeDomain::Prediction], 0.4)],
        0.5,
    );
    assert_eq!(
        state.routing_target(),
        Some((KnowledgeDomain::Prediction, 0.4))
    );
}

#[test]
fn test_ordering_guards() {
    let mut state = new_state();

    assert!(state.set_analysis(AnalysisResult::default()).is_err());
    assert!(state.set_decision(strategy()).is_err());
    assert!(state.set_plan(AdjustmentPlan::default()).is_err());

    state.mark_domain_visited(KnowledgeDomain::Data).unwrap();
    assert!(state.set_analysis(AnalysisResult::default()).is_ok());
    assert!(state.set_analysis(AnalysisResult::default()).is_err());
    assert!(state.set_plan(AdjustmentPlan::default()).is_err());
    assert!(state.set_decision(strategy()).is_ok());
    assert!(state.set_plan(AdjustmentPlan::default()).is_ok());
    assert_eq!(state.phase(), SessionPhase::Executed);
}

#[test]
fn test_action_available_follows_lifecycle() {
    let mut state = new_state();
    assert!(state.action_available(Action::VisitContext));
    assert!(!state.action_available(Action::Analyze));
    assert!(!state.action_available(Action::Decide));
    assert!(!state.action_available(Action::Execute));
    assert!(!state.action_available(Action::Complete));

    state.mark_domain_visited(KnowledgeDomain::Context).unwrap();
    assert!(!state.action_available(Action::VisitContext));
    assert!(state.action_available(Action::Analyze));

    state.set_analysis(AnalysisResult::default()).unwrap();
    assert!(!state.action_available(Action::Analyze));
    assert!(state.action_available(Action::Decide));
    // Collection closes once analysis exists.
    assert!(!state.action_available(Action::VisitData));

    state.force_complete("stopped");
    assert!(!state.action_available(Action::VisitData));
    assert!(!state.action_available(Action::Decide));
}

#[test]
fn test_domain_error_and_payload_slots() {
    let mut state = new_state();
    state.mark_domain_visited(KnowledgeDomain::Prediction).unwrap();
    state.record_domain_error(KnowledgeDomain::Prediction, "not found");
    assert!(state.prediction().is_none());
    assert_eq!(state.domain_error(KnowledgeDomain::Prediction), Some("not found"));
    assert_eq!(state.errors().len(), 1);

    state.store_payload(DomainPayload::Prediction(BaselineForecast::default()));
    assert!(state.prediction().is_some());
    assert_eq!(state.successful_domains(), 1);
}

#[test]
fn test_force_complete_is_terminal_and_logged() {
    let mut state = new_state();
    state.force_complete("stopped by limit");
    assert!(state.is_complete());
    assert!(state.stopped_by_limit());
    assert_eq!(state.phase(), SessionPhase::AbortedByLimit);
    let output = state.to_output();
    assert!(output.complete);
    assert_eq!(output.errors, vec!["stopped by limit".to_string()]);
    assert!(output.adjustment_plan.is_empty());
}

#[test]
fn test_finalize_sets_outputs() {
    let mut state = new_state();
    state.finalize("because", vec!["watch hour 8".to_string()], 1.4);
    assert!(state.is_complete());
    let output = state.to_output();
    assert_eq!(output.justification, "because");
    assert_eq!(output.recommendations.len(), 1);
    assert_eq!(output.confidence, 1.0);
    assert!(!output.stopped_by_limit);
}
