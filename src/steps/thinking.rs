use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::advisor::ReasoningService;
use crate::belief::{Action, BeliefState, EntryStatus, RoundDelta};
use crate::error::AdvisorResult;
use crate::knowledge::KnowledgeDomain;
use crate::parser;
use crate::prompts::ROUND_INSTRUCTION;

/// How the round's action was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionChoice {
    /// The advisor's proposal was usable and kept.
    Advisor,
    /// The advisor tried to leave collection while a high-priority question
    /// still pointed at an unvisited domain.
    PriorityOverride,
    /// The advisor's proposal was missing or unusable.
    Fallback,
}

/// Result of one thinking round.
#[derive(Debug, Clone)]
pub struct ThinkOutcome {
    pub action: Action,
    pub proposed: Option<Action>,
    pub choice: ActionChoice,
    pub delta: RoundDelta,
}

/// Asks the advisor for the next move and records the round.
pub struct ThinkingStep {
    advisor: Arc<dyn ReasoningService>,
    call_timeout: Duration,
    routing_threshold: f64,
}

impl ThinkingStep {
    /// Create a new thinking step
    pub fn new(
        advisor: Arc<dyn ReasoningService>,
        call_timeout: Duration,
        routing_threshold: f64,
    ) -> Self {
        Self {
            advisor,
            call_timeout,
            routing_threshold,
        }
    }

    /// Run one round: prompt, parse, merge, choose.
    ///
    /// Advisor failure is returned unchanged and leaves the state untouched;
    /// the orchestrator decides whether the session can continue. Parse
    /// problems never fail the round, they are appended to the error log.
    pub async fn think(&self, state: &mut BeliefState) -> AdvisorResult<ThinkOutcome> {
        let start = Instant::now();
        let prompt = render_prompt(state);

        debug!(
            session_id = %state.session_id,
            round = state.round() + 1,
            prompt_chars = prompt.len(),
            "Requesting advisor round"
        );

        let raw = self.advisor.generate(&prompt, self.call_timeout).await?;
        let parsed = parser::parse(&raw);

        let round = state.round() + 1;
        for warning in &parsed.warnings {
            warn!(session_id = %state.session_id, round, warning = %warning, "Advisor response parse issue");
            state.log_error(format!("round {}: parse: {}", round, warning));
        }

        let proposed = parsed.action;
        let delta = state.record_round(
            parsed.thinking,
            parsed.insights,
            parsed.questions,
            parsed.knowledge_gaps,
            parsed.confidence,
        );

        let (action, choice) = select_action(state, proposed, self.routing_threshold);
        state.record_action(action);

        if choice != ActionChoice::Advisor {
            info!(
                session_id = %state.session_id,
                round,
                proposed = ?proposed,
                chosen = %action,
                choice = ?choice,
                "Advisor action replaced"
            );
        }

        debug!(
            session_id = %state.session_id,
            round,
            action = %action,
            new_insights = delta.new_insights.len(),
            new_questions = delta.new_questions.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Thinking round completed"
        );

        Ok(ThinkOutcome {
            action,
            proposed,
            choice,
            delta,
        })
    }
}

/// Pick the action to dispatch this round.
///
/// A usable advisor proposal is kept unless an open question or gap with
/// priority at or above `threshold` targets an unvisited domain the proposal
/// does not visit; that domain is visited instead. Without a usable proposal the
/// fallback order is: routing target, first unvisited domain, analyze,
/// decide, execute, complete.
pub fn select_action(
    state: &BeliefState,
    proposed: Option<Action>,
    threshold: f64,
) -> (Action, ActionChoice) {
    let routed = state
        .routing_target()
        .map(|(domain, priority)| (Action::visit(domain), priority))
        .filter(|(action, _)| state.action_available(*action));

    if let Some(action) = proposed.filter(|a| state.action_available(*a)) {
        if let Some((visit, priority)) = routed {
            if visit != action && priority >= threshold {
                return (visit, ActionChoice::PriorityOverride);
            }
        }
        return (action, ActionChoice::Advisor);
    }

    let fallback = routed
        .map(|(action, _)| action)
        .or_else(|| {
            state
                .first_unvisited()
                .map(Action::visit)
                .filter(|a| state.action_available(*a))
        })
        .or_else(|| {
            [Action::Analyze, Action::Decide, Action::Execute]
                .into_iter()
                .find(|a| state.action_available(*a))
        })
        .unwrap_or(Action::Complete);

    (fallback, ActionChoice::Fallback)
}

/// Render the round prompt from the current state.
pub fn render_prompt(state: &BeliefState) -> String {
    let mut prompt = String::new();
    let round = state.round() + 1;

    let _ = writeln!(prompt, "Adjustment intent: {}", state.intent);
    let _ = writeln!(prompt, "Human reasoning: {}", state.reasoning);
    let _ = writeln!(prompt, "Round {} of at most {}.", round, state.max_iterations);

    prompt.push_str("\nKnowledge domains:\n");
    for domain in KnowledgeDomain::ALL {
        let status = if !state.is_visited(domain) {
            "not visited".to_string()
        } else if let Some(error) = state.domain_error(domain) {
            format!("visited, unavailable ({})", error)
        } else if let Some(payload) = state.payload(domain) {
            format!("visited: {}", payload.summary())
        } else {
            "visited".to_string()
        };
        let _ = writeln!(prompt, "- {} ({}): {}", domain, domain.describe(), status);
    }

    if !state.insights().is_empty() {
        prompt.push_str("\nInsights so far:\n");
        for insight in state.insights() {
            let _ = writeln!(
                prompt,
                "- [{}] {} (confidence {:.2})",
                insight.id, insight.content, insight.confidence
            );
        }
    }

    let open_questions = state.open_questions_ranked();
    if !open_questions.is_empty() {
        prompt.push_str("\nOpen questions (highest priority first):\n");
        for question in open_questions {
            let target = question
                .target_domain
                .map(|d| d.to_string())
                .unwrap_or_else(|| "any".to_string());
            let _ = writeln!(
                prompt,
                "- [{}] {} (domain: {}, priority {:.2})",
                question.id, question.content, target, question.priority
            );
        }
    }

    let open_gaps = state.open_gaps_ranked();
    if !open_gaps.is_empty() {
        prompt.push_str("\nKnowledge gaps:\n");
        for gap in open_gaps {
            let domains: Vec<&str> = gap.candidate_domains.iter().map(|d| d.as_str()).collect();
            let _ = writeln!(
                prompt,
                "- [{}] {} (domains: {}, importance {:.2})",
                gap.id,
                gap.description,
                if domains.is_empty() { "any".to_string() } else { domains.join(", ") },
                gap.importance
            );
        }
    }

    let retired = state
        .questions()
        .iter()
        .filter(|q| q.status == EntryStatus::Retired)
        .count();
    if retired > 0 {
        let _ = writeln!(prompt, "\n{} earlier question(s) already answered by visited domains.", retired);
    }

    if let Some(analysis) = state.analysis() {
        prompt.push_str("\nAnalysis:\n");
        for pattern in &analysis.patterns {
            let _ = writeln!(prompt, "- {}", pattern);
        }
        for risk in &analysis.high_risk {
            let _ = writeln!(prompt, "- high risk: {}", risk);
        }
    }
    if let Some(decision) = state.decision() {
        let _ = writeln!(prompt, "\nDecision: {}", decision.approach);
    }

    let available: Vec<&str> = Action::ALL
        .into_iter()
        .filter(|a| state.action_available(*a))
        .map(|a| a.as_str())
        .collect();
    let _ = writeln!(prompt, "\nAvailable actions: {}", available.join(", "));
    prompt.push('\n');
    prompt.push_str(ROUND_INSTRUCTION);
    prompt
}
