//! Belief state and action model.
//!
//! The [`BeliefState`] is the single mutable record threaded through every
//! round of a session. It is an append-only log of insights, questions and
//! knowledge gaps plus a handful of named slots (domain payloads, analysis,
//! decision, plan). Nothing in it is shared between sessions.

mod state;

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;

pub use state::{BeliefState, RoundDelta, SessionPhase};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeDomain;

// ============================================================================
// Action
// ============================================================================

/// The closed set of moves the orchestrator can make in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    VisitContext,
    VisitData,
    VisitModel,
    VisitPrediction,
    Analyze,
    Decide,
    Execute,
    Complete,
}

impl Action {
    /// Every action, in prompt order.
    pub const ALL: [Action; 8] = [
        Action::VisitContext,
        Action::VisitData,
        Action::VisitModel,
        Action::VisitPrediction,
        Action::Analyze,
        Action::Decide,
        Action::Execute,
        Action::Complete,
    ];

    /// Get the action name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::VisitContext => "visit_context",
            Action::VisitData => "visit_data",
            Action::VisitModel => "visit_model",
            Action::VisitPrediction => "visit_prediction",
            Action::Analyze => "analyze",
            Action::Decide => "decide",
            Action::Execute => "execute",
            Action::Complete => "complete",
        }
    }

    /// The visit action for `domain`.
    pub fn visit(domain: KnowledgeDomain) -> Self {
        match domain {
            KnowledgeDomain::Context => Action::VisitContext,
            KnowledgeDomain::Data => Action::VisitData,
            KnowledgeDomain::Model => Action::VisitModel,
            KnowledgeDomain::Prediction => Action::VisitPrediction,
        }
    }

    /// Target domain of a visit action.
    pub fn domain(&self) -> Option<KnowledgeDomain> {
        match self {
            Action::VisitContext => Some(KnowledgeDomain::Context),
            Action::VisitData => Some(KnowledgeDomain::Data),
            Action::VisitModel => Some(KnowledgeDomain::Model),
            Action::VisitPrediction => Some(KnowledgeDomain::Prediction),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
            .replace(['-', ' '], "_");
        match normalized.as_str() {
            "analyze" | "analyse" | "analysis" => Ok(Action::Analyze),
            "decide" | "decision" => Ok(Action::Decide),
            "execute" | "execution" | "apply" => Ok(Action::Execute),
            "complete" | "completed" | "done" | "finish" | "stop" => Ok(Action::Complete),
            other => {
                let target = other
                    .strip_prefix("visit_")
                    .or_else(|| other.strip_prefix("query_"))
                    .or_else(|| other.strip_prefix("fetch_"))
                    .unwrap_or(other);
                target
                    .parse::<KnowledgeDomain>()
                    .map(Action::visit)
                    .map_err(|_| format!("Unknown action: {}", s))
            }
        }
    }
}

// ============================================================================
// Log entries
// ============================================================================

/// Lifecycle of a question or knowledge gap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Open,
    Retired,
}

/// A finding the advisor asserted during a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub content: String,
    pub confidence: f64,
    pub related_question_ids: Vec<String>,
    pub round: u32,
}

/// Something the advisor wants answered, routed to a knowledge domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub content: String,
    pub target_domain: Option<KnowledgeDomain>,
    pub priority: f64,
    pub status: EntryStatus,
    pub round: u32,
}

/// Missing evidence, with the domains that might fill it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub id: String,
    pub description: String,
    pub importance: f64,
    pub candidate_domains: Vec<KnowledgeDomain>,
    pub status: EntryStatus,
    pub round: u32,
}

/// Insight as parsed, before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightDraft {
    pub content: String,
    pub confidence: f64,
    pub related_question_ids: Vec<String>,
}

/// Question as parsed, before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionDraft {
    pub content: String,
    pub target_domain: Option<KnowledgeDomain>,
    pub priority: f64,
}

/// Knowledge gap as parsed, before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct GapDraft {
    pub description: String,
    pub importance: f64,
    pub candidate_domains: Vec<KnowledgeDomain>,
}

/// One round of advisor thinking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingRecord {
    pub round: u32,
    pub content: String,
    pub action: Option<Action>,
    pub confidence: f64,
}

// ============================================================================
// Named slots
// ============================================================================

/// Coarse risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Output of the analysis step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub patterns: Vec<String>,
    pub high_risk: Vec<String>,
    pub medium_risk: Vec<String>,
    pub low_risk: Vec<String>,
    /// Hours flagged high risk, for the decision step.
    pub high_risk_hours: BTreeSet<u8>,
    /// Hours with the highest demand in visited data, for the decision step.
    pub peak_hours: BTreeSet<u8>,
    /// Net demand direction suggested by evidence (+1, -1 or 0).
    pub evidence_direction: i8,
    /// Typical historical impact magnitude in percent, when context shows one.
    pub historical_impact_pct: Option<f64>,
    pub domains_used: Vec<KnowledgeDomain>,
}

impl AnalysisResult {
    /// Bucket contents for `level`.
    pub fn bucket(&self, level: RiskLevel) -> &[String] {
        match level {
            RiskLevel::High => &self.high_risk,
            RiskLevel::Medium => &self.medium_risk,
            RiskLevel::Low => &self.low_risk,
        }
    }
}

/// Which way demand should move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
    Hold,
}

impl Direction {
    /// Sign applied to the adjustment magnitude.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Increase => 1.0,
            Direction::Decrease => -1.0,
            Direction::Hold => 0.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Increase => write!(f, "increase"),
            Direction::Decrease => write!(f, "decrease"),
            Direction::Hold => write!(f, "hold"),
        }
    }
}

/// Output of the decision step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStrategy {
    pub approach: String,
    pub target_hours: BTreeSet<u8>,
    pub direction: Direction,
    /// Unsigned magnitude in percent.
    pub magnitude_pct: f64,
    pub rationale: String,
}

/// One hour of the final plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentEntry {
    pub hour: u8,
    /// Omitted when no baseline value was retrieved.
    pub original: Option<f64>,
    pub adjusted: Option<f64>,
    pub pct_change: f64,
    pub rationale: String,
}

/// Final adjustment plan keyed by hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentPlan {
    pub entries: BTreeMap<u8, AdjustmentEntry>,
}

impl AdjustmentPlan {
    /// Whether the plan carries no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hours covered by the plan
    pub fn hours(&self) -> BTreeSet<u8> {
        self.entries.keys().copied().collect()
    }
}

// ============================================================================
// Session input/output
// ============================================================================

/// Request to run one advisory session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParams {
    pub intent: String,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_clock_secs: Option<u64>,
}

impl SessionParams {
    /// Create new params with intent and reasoning
    pub fn new(intent: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            reasoning: reasoning.into(),
            session_id: None,
            max_iterations: None,
            wall_clock_secs: None,
        }
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the iteration ceiling
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Set the wall-clock ceiling in seconds
    pub fn with_wall_clock_secs(mut self, secs: u64) -> Self {
        self.wall_clock_secs = Some(secs);
        self
    }
}

/// Final result of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutput {
    pub session_id: String,
    pub complete: bool,
    pub stopped_by_limit: bool,
    pub round_count: u32,
    pub visited_domains: Vec<KnowledgeDomain>,
    pub insights: Vec<Insight>,
    pub questions: Vec<Question>,
    pub knowledge_gaps: Vec<KnowledgeGap>,
    pub analysis: Option<AnalysisResult>,
    pub decision: Option<DecisionStrategy>,
    pub adjustment_plan: AdjustmentPlan,
    pub justification: String,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Emitted after every round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEvent {
    pub session_id: String,
    pub round: u32,
    pub new_insights: Vec<Insight>,
    pub new_questions: Vec<Question>,
    pub chosen_action: Action,
    pub partial_confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_action_aliases() {
        assert_eq!("Visit-Data".parse::<Action>().unwrap(), Action::VisitData);
        assert_eq!("baseline_forecast".parse::<Action>().unwrap(), Action::VisitPrediction);
        assert_eq!("query_model".parse::<Action>().unwrap(), Action::VisitModel);
        assert_eq!("\"analyse\".".parse::<Action>().unwrap(), Action::Analyze);
        assert_eq!("DONE".parse::<Action>().unwrap(), Action::Complete);
    }

    #[test]
    fn test_action_unknown() {
        let result = "dance".parse::<Action>();
        assert_eq!(result.unwrap_err(), "Unknown action: dance");
    }

    #[test]
    fn test_action_domain_mapping() {
        for domain in KnowledgeDomain::ALL {
            assert_eq!(Action::visit(domain).domain(), Some(domain));
        }
        assert_eq!(Action::Analyze.domain(), None);
    }

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Increase.sign(), 1.0);
        assert_eq!(Direction::Decrease.sign(), -1.0);
        assert_eq!(Direction::Hold.sign(), 0.0);
    }

    #[test]
    fn test_session_params_builder() {
        let params = SessionParams::new("intent", "reasoning")
            .with_session("s-1")
            .with_max_iterations(3)
            .with_wall_clock_secs(60);
        assert_eq!(params.session_id.as_deref(), Some("s-1"));
        assert_eq!(params.max_iterations, Some(3));
        assert_eq!(params.wall_clock_secs, Some(60));
    }

    #[test]
    fn test_session_params_deserialize_minimal() {
        let params: SessionParams =
            serde_json::from_str(r#"{"intent": "a", "reasoning": "b"}"#).unwrap();
        assert!(params.session_id.is_none());
        assert!(params.max_iterations.is_none());
    }
}
