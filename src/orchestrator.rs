//! Session orchestrator.
//!
//! Runs the think, dispatch loop for one advisory session until the session
//! completes, a ceiling is hit, the advisor becomes unavailable or the caller
//! cancels. Each session owns its [`BeliefState`]; the advisor and knowledge
//! source are shared, read-only collaborators, so any number of sessions can
//! run concurrently on one orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::advisor::ReasoningService;
use crate::belief::{Action, BeliefState, RoundEvent, SessionOutput, SessionParams};
use crate::config::{RequestConfig, SessionConfig};
use crate::error::{AppError, AppResult, StepError, StepResult};
use crate::knowledge::KnowledgeSource;
use crate::steps::{self, ThinkingStep};

/// Note logged when a session stops before executing.
const PARTIAL_NOTE: &str = "result may be partial";

/// Drives advisory sessions.
pub struct Orchestrator {
    advisor: Arc<dyn ReasoningService>,
    knowledge: Arc<dyn KnowledgeSource>,
    session: SessionConfig,
    call_timeout: Duration,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        advisor: Arc<dyn ReasoningService>,
        knowledge: Arc<dyn KnowledgeSource>,
        session: SessionConfig,
        request: &RequestConfig,
    ) -> Self {
        Self {
            advisor,
            knowledge,
            session,
            call_timeout: request.timeout(),
        }
    }

    /// Run one session to completion.
    pub async fn run(&self, params: SessionParams) -> AppResult<SessionOutput> {
        self.run_with(params, None, CancellationToken::new()).await
    }

    /// Run one session, emitting a [`RoundEvent`] after every round and
    /// stopping at the first round boundary after `cancel` fires.
    ///
    /// Only invalid input is an error. Advisor outages, failing knowledge
    /// domains and ceilings all end in a completed output whose error log
    /// says what happened.
    pub async fn run_with(
        &self,
        params: SessionParams,
        events: Option<UnboundedSender<RoundEvent>>,
        cancel: CancellationToken,
    ) -> AppResult<SessionOutput> {
        validate(&params)?;

        let session_id = params
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let max_iterations = params.max_iterations.unwrap_or(self.session.max_iterations);
        let wall_clock = params
            .wall_clock_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.session.wall_clock());

        let mut state = BeliefState::initialize(
            session_id,
            params.intent,
            params.reasoning,
            max_iterations,
            wall_clock,
        );
        let thinking = ThinkingStep::new(
            self.advisor.clone(),
            self.call_timeout,
            self.session.routing_priority_threshold,
        );
        let start = Instant::now();

        info!(
            session_id = %state.session_id,
            max_iterations,
            wall_clock_secs = wall_clock.as_secs(),
            "Advisory session started"
        );

        loop {
            if state.is_complete() {
                break;
            }
            if state.round() >= state.max_iterations {
                let note = format!("iteration ceiling of {} rounds reached", state.max_iterations);
                stop(&mut state, &note);
                break;
            }
            if start.elapsed() >= state.wall_clock {
                let note = format!("wall-clock ceiling of {}s reached", state.wall_clock.as_secs());
                stop(&mut state, &note);
                break;
            }
            if cancel.is_cancelled() {
                stop(&mut state, "session cancelled");
                break;
            }

            // An advisor call in flight is never interrupted; cancellation is
            // seen at the next round boundary.
            let outcome = match thinking.think(&mut state).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        session_id = %state.session_id,
                        round = state.round() + 1,
                        error = %e,
                        "Advisor unavailable, halting session"
                    );
                    state.log_error(format!("round {}: advisor: {}", state.round() + 1, e));
                    stop(&mut state, "advisor unavailable");
                    break;
                }
            };

            if let Err(e) = self.dispatch(outcome.action, &mut state).await {
                warn!(
                    session_id = %state.session_id,
                    round = state.round(),
                    action = %outcome.action,
                    error = %e,
                    "Step rejected"
                );
                state.log_error(format!("round {}: {}", state.round(), e));
            }

            if let Some(tx) = &events {
                let event = RoundEvent {
                    session_id: state.session_id.clone(),
                    round: state.round(),
                    new_insights: outcome.delta.new_insights,
                    new_questions: outcome.delta.new_questions,
                    chosen_action: outcome.action,
                    partial_confidence: state.confidence(),
                    timestamp: Utc::now(),
                };
                if tx.send(event).is_err() {
                    debug!(session_id = %state.session_id, "Event receiver dropped");
                }
            }
        }

        let output = state.to_output();
        info!(
            session_id = %output.session_id,
            rounds = output.round_count,
            visited = output.visited_domains.len(),
            plan_entries = output.adjustment_plan.entries.len(),
            stopped_by_limit = output.stopped_by_limit,
            confidence = output.confidence,
            latency_ms = start.elapsed().as_millis() as u64,
            "Advisory session finished"
        );
        Ok(output)
    }

    async fn dispatch(&self, action: Action, state: &mut BeliefState) -> StepResult<()> {
        match action {
            Action::VisitContext
            | Action::VisitData
            | Action::VisitModel
            | Action::VisitPrediction => match action.domain() {
                Some(domain) => steps::access(state, self.knowledge.as_ref(), domain).await,
                None => Err(StepError::ordering("visit", "action has no domain")),
            },
            Action::Analyze => steps::analyze(state),
            Action::Decide => steps::decide(state),
            Action::Execute => steps::execute(state),
            Action::Complete => {
                if state.plan().is_some() {
                    Ok(())
                } else {
                    Err(StepError::ordering("complete", "no adjustment plan produced"))
                }
            }
        }
    }
}

fn validate(params: &SessionParams) -> AppResult<()> {
    if params.intent.trim().is_empty() {
        return Err(AppError::Validation {
            field: "intent".to_string(),
            reason: "cannot be empty".to_string(),
        });
    }
    if params.reasoning.trim().is_empty() {
        return Err(AppError::Validation {
            field: "reasoning".to_string(),
            reason: "cannot be empty".to_string(),
        });
    }
    if params.max_iterations == Some(0) {
        return Err(AppError::Validation {
            field: "max_iterations".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if params.wall_clock_secs == Some(0) {
        return Err(AppError::Validation {
            field: "wall_clock_secs".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// End the session early. A decision without a plan is executed first so
/// the caller still gets the best plan the evidence supports.
fn stop(state: &mut BeliefState, reason: &str) {
    if state.decision().is_some() && state.plan().is_none() {
        if let Err(e) = steps::execute(state) {
            state.log_error(format!("best-effort execution failed: {}", e));
        }
    }
    info!(session_id = %state.session_id, reason, "Session stopped early");
    state.force_complete(format!("stopped: {}, {}", reason, PARTIAL_NOTE));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_input() {
        let err = validate(&SessionParams::new("  ", "r")).unwrap_err();
        assert!(err.to_string().contains("intent"));
        let err = validate(&SessionParams::new("i", "")).unwrap_err();
        assert!(err.to_string().contains("reasoning"));
        let err = validate(&SessionParams::new("i", "r").with_max_iterations(0)).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
        let err = validate(&SessionParams::new("i", "r").with_wall_clock_secs(0)).unwrap_err();
        assert!(err.to_string().contains("wall_clock_secs"));
        assert!(validate(&SessionParams::new("i", "r")).is_ok());
    }
}
