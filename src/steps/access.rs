use tracing::{info, warn};

use crate::belief::{Action, BeliefState};
use crate::error::{StepError, StepResult};
use crate::knowledge::{fetch_domain, KnowledgeDomain, KnowledgeSource};

/// Retrieve `domain` into the state.
///
/// The domain counts as visited whether or not retrieval succeeds, so a
/// failing domain is never retried. Failure is recorded in the error log
/// and the domain slot stays empty.
pub async fn access(
    state: &mut BeliefState,
    source: &dyn KnowledgeSource,
    domain: KnowledgeDomain,
) -> StepResult<()> {
    if !state.action_available(Action::visit(domain)) {
        let reason = if state.is_visited(domain) {
            format!("domain {} was already visited", domain)
        } else {
            format!("domain {} cannot be visited after analysis", domain)
        };
        return Err(StepError::ordering("visit", reason));
    }

    let result = fetch_domain(source, domain).await;
    state.mark_domain_visited(domain)?;

    match result {
        Ok(payload) => {
            info!(
                session_id = %state.session_id,
                domain = %domain,
                summary = %payload.summary(),
                "Knowledge domain retrieved"
            );
            state.store_payload(payload);
        }
        Err(e) => {
            warn!(
                session_id = %state.session_id,
                domain = %domain,
                error = %e,
                "Knowledge domain retrieval failed"
            );
            state.record_domain_error(domain, e.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::knowledge::{BaselineForecast, HourlyPrediction, KnowledgeBundle, StaticKnowledgeSource};

    fn state() -> BeliefState {
        BeliefState::initialize("s", "intent", "reasoning", 5, Duration::from_secs(10))
    }

    fn source() -> StaticKnowledgeSource {
        StaticKnowledgeSource::new(KnowledgeBundle::default().with_prediction(BaselineForecast {
            target_date: None,
            unit: Some("MW".to_string()),
            hourly: vec![HourlyPrediction {
                hour: 7,
                value: 100.0,
                lower: None,
                upper: None,
            }],
        }))
    }

    #[tokio::test]
    async fn test_access_stores_payload() {
        let mut state = state();
        access(&mut state, &source(), KnowledgeDomain::Prediction)
            .await
            .unwrap();
        assert!(state.is_visited(KnowledgeDomain::Prediction));
        assert_eq!(state.prediction().and_then(|p| p.value_at(7)), Some(100.0));
        assert!(state.errors().is_empty());
    }

    #[tokio::test]
    async fn test_access_failure_marks_visited_and_logs() {
        let mut state = state();
        access(&mut state, &source(), KnowledgeDomain::Model)
            .await
            .unwrap();
        assert!(state.is_visited(KnowledgeDomain::Model));
        assert!(state.model().is_none());
        assert!(state.domain_error(KnowledgeDomain::Model).is_some());
        assert_eq!(state.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_access_twice_is_ordering_violation() {
        let mut state = state();
        let source = source();
        access(&mut state, &source, KnowledgeDomain::Context).await.unwrap();
        let err = access(&mut state, &source, KnowledgeDomain::Context)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::OrderingViolation { .. }));
        assert_eq!(state.visited_count(), 1);
    }
}
