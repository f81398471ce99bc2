use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    Action, AdjustmentPlan, AnalysisResult, DecisionStrategy, EntryStatus, GapDraft, Insight,
    InsightDraft, KnowledgeGap, Question, QuestionDraft, SessionOutput, ThinkingRecord,
};
use crate::error::{StepError, StepResult};
use crate::knowledge::{
    BaselineForecast, ContextualInformation, DataAnalysisInformation, DomainPayload,
    KnowledgeDomain, ModelInterpretabilityInformation,
};

/// Where a session stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "visited")]
pub enum SessionPhase {
    Initial,
    Collecting(usize),
    Analyzed,
    Decided,
    Executed,
    AbortedByLimit,
}

/// What one call to [`BeliefState::record_round`] appended.
#[derive(Debug, Clone, Default)]
pub struct RoundDelta {
    pub new_insights: Vec<Insight>,
    pub new_questions: Vec<Question>,
    pub new_gaps: Vec<KnowledgeGap>,
}

/// Working memory of one advisory session.
///
/// Mutated only by the step functions, one round at a time. Setters that
/// would break ordering (analysis before any evidence, decision before
/// analysis, plan before decision) return [`StepError::OrderingViolation`]
/// and leave the state untouched.
#[derive(Debug, Clone)]
pub struct BeliefState {
    pub session_id: String,
    pub intent: String,
    pub reasoning: String,
    pub max_iterations: u32,
    pub wall_clock: Duration,
    pub started_at: DateTime<Utc>,

    round: u32,
    visited: [bool; 4],
    payloads: BTreeMap<KnowledgeDomain, DomainPayload>,
    domain_errors: BTreeMap<KnowledgeDomain, String>,

    insights: Vec<Insight>,
    questions: Vec<Question>,
    gaps: Vec<KnowledgeGap>,
    transcript: Vec<ThinkingRecord>,

    analysis: Option<AnalysisResult>,
    decision: Option<DecisionStrategy>,
    plan: Option<AdjustmentPlan>,

    confidence: f64,
    complete: bool,
    stopped_by_limit: bool,
    recommendations: Vec<String>,
    justification: String,
    errors: Vec<String>,
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl BeliefState {
    /// Create the state for a new session.
    pub fn initialize(
        session_id: impl Into<String>,
        intent: impl Into<String>,
        reasoning: impl Into<String>,
        max_iterations: u32,
        wall_clock: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            intent: intent.into(),
            reasoning: reasoning.into(),
            max_iterations,
            wall_clock,
            started_at: Utc::now(),
            round: 0,
            visited: [false; 4],
            payloads: BTreeMap::new(),
            domain_errors: BTreeMap::new(),
            insights: Vec::new(),
            questions: Vec::new(),
            gaps: Vec::new(),
            transcript: Vec::new(),
            analysis: None,
            decision: None,
            plan: None,
            confidence: 0.5,
            complete: false,
            stopped_by_limit: false,
            recommendations: Vec::new(),
            justification: String::new(),
            errors: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append one round of advisor output and advance the round counter.
    ///
    /// The round's action is recorded separately with [`Self::record_action`]
    /// once routing has seen the merged questions.
    ///
    /// Duplicate questions and gaps (same text, ignoring case and spacing)
    /// are skipped. Entries that only point at already-visited domains are
    /// recorded as retired.
    pub fn record_round(
        &mut self,
        thinking: impl Into<String>,
        insights: Vec<InsightDraft>,
        questions: Vec<QuestionDraft>,
        gaps: Vec<GapDraft>,
        confidence: f64,
    ) -> RoundDelta {
        self.round += 1;
        let round = self.round;
        let mut delta = RoundDelta::default();

        for draft in insights {
            if draft.content.trim().is_empty() {
                continue;
            }
            let key = normalize(&draft.content);
            if self.insights.iter().any(|i| normalize(&i.content) == key) {
                continue;
            }
            let insight = Insight {
                id: format!("i{}", self.insights.len() + 1),
                content: draft.content.trim().to_string(),
                confidence: draft.confidence.clamp(0.0, 1.0),
                related_question_ids: draft.related_question_ids,
                round,
            };
            delta.new_insights.push(insight.clone());
            self.insights.push(insight);
        }

        for draft in questions {
            if draft.content.trim().is_empty() {
                continue;
            }
            let key = normalize(&draft.content);
            if self.questions.iter().any(|q| normalize(&q.content) == key) {
                continue;
            }
            let status = match draft.target_domain {
                Some(domain) if self.is_visited(domain) => EntryStatus::Retired,
                _ => EntryStatus::Open,
            };
            let question = Question {
                id: format!("q{}", self.questions.len() + 1),
                content: draft.content.trim().to_string(),
                target_domain: draft.target_domain,
                priority: draft.priority.clamp(0.0, 1.0),
                status,
                round,
            };
            delta.new_questions.push(question.clone());
            self.questions.push(question);
        }

        for draft in gaps {
            if draft.description.trim().is_empty() {
                continue;
            }
            let key = normalize(&draft.description);
            if self.gaps.iter().any(|g| normalize(&g.description) == key) {
                continue;
            }
            let mut gap = KnowledgeGap {
                id: format!("g{}", self.gaps.len() + 1),
                description: draft.description.trim().to_string(),
                importance: draft.importance.clamp(0.0, 1.0),
                candidate_domains: draft.candidate_domains,
                status: EntryStatus::Open,
                round,
            };
            if self.gap_exhausted(&gap) {
                gap.status = EntryStatus::Retired;
            }
            delta.new_gaps.push(gap.clone());
            self.gaps.push(gap);
        }

        self.transcript.push(ThinkingRecord {
            round,
            content: thinking.into(),
            action: None,
            confidence: confidence.clamp(0.0, 1.0),
        });
        self.confidence = confidence.clamp(0.0, 1.0);

        delta
    }

    /// Record the action chosen for the current round.
    pub fn record_action(&mut self, action: Action) {
        if let Some(record) = self.transcript.last_mut() {
            if record.round == self.round {
                record.action = Some(action);
            }
        }
    }

    /// Mark `domain` as visited, retiring the questions and gaps it answers.
    pub fn mark_domain_visited(&mut self, domain: KnowledgeDomain) -> StepResult<()> {
        if self.is_visited(domain) {
            return Err(StepError::ordering(
                "visit",
                format!("domain {} was already visited", domain),
            ));
        }
        self.visited[domain.index()] = true;

        for question in &mut self.questions {
            if question.status == EntryStatus::Open && question.target_domain == Some(domain) {
                question.status = EntryStatus::Retired;
            }
        }
        let visited = self.visited;
        for gap in &mut self.gaps {
            if gap.status == EntryStatus::Open
                && !gap.candidate_domains.is_empty()
                && gap.candidate_domains.iter().all(|d| visited[d.index()])
            {
                gap.status = EntryStatus::Retired;
            }
        }
        Ok(())
    }

    /// Store a retrieved payload in its domain slot.
    pub fn store_payload(&mut self, payload: DomainPayload) {
        self.payloads.insert(payload.domain(), payload);
    }

    /// Remember that retrieving `domain` failed.
    pub fn record_domain_error(&mut self, domain: KnowledgeDomain, message: impl Into<String>) {
        let message = message.into();
        self.log_error(format!("knowledge domain {} unavailable: {}", domain, message));
        self.domain_errors.insert(domain, message);
    }

    /// Set the analysis slot. Requires at least one visited domain.
    pub fn set_analysis(&mut self, result: AnalysisResult) -> StepResult<()> {
        if self.visited_count() == 0 {
            return Err(StepError::ordering("analyze", "no knowledge domain visited"));
        }
        if self.analysis.is_some() {
            return Err(StepError::ordering("analyze", "analysis already produced"));
        }
        self.analysis = Some(result);
        Ok(())
    }

    /// Set the decision slot. Requires a prior analysis.
    pub fn set_decision(&mut self, strategy: DecisionStrategy) -> StepResult<()> {
        if self.analysis.is_none() {
            return Err(StepError::ordering("decide", "analysis has not run"));
        }
        if self.decision.is_some() {
            return Err(StepError::ordering("decide", "decision already produced"));
        }
        self.decision = Some(strategy);
        Ok(())
    }

    /// Set the plan slot. Requires a prior decision.
    pub fn set_plan(&mut self, plan: AdjustmentPlan) -> StepResult<()> {
        if self.decision.is_none() {
            return Err(StepError::ordering("execute", "decision has not run"));
        }
        if self.plan.is_some() {
            return Err(StepError::ordering("execute", "plan already produced"));
        }
        self.plan = Some(plan);
        Ok(())
    }

    /// Record the final justification and recommendations and complete the session.
    pub fn finalize(
        &mut self,
        justification: impl Into<String>,
        recommendations: Vec<String>,
        confidence: f64,
    ) {
        self.justification = justification.into();
        self.recommendations = recommendations;
        self.confidence = confidence.clamp(0.0, 1.0);
        self.complete = true;
    }

    /// Stop the session early, keeping whatever was produced.
    pub fn force_complete(&mut self, note: impl Into<String>) {
        self.log_error(note);
        self.stopped_by_limit = true;
        self.complete = true;
    }

    /// Append to the error log.
    pub fn log_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Number of thinking rounds so far
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Whether the session has reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether a ceiling or outage ended the session
    pub fn stopped_by_limit(&self) -> bool {
        self.stopped_by_limit
    }

    /// Latest confidence
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Whether `domain` has been visited (successfully or not)
    pub fn is_visited(&self, domain: KnowledgeDomain) -> bool {
        self.visited[domain.index()]
    }

    /// Number of visited domains
    pub fn visited_count(&self) -> usize {
        self.visited.iter().filter(|v| **v).count()
    }

    /// Visited domains in default order
    pub fn visited_domains(&self) -> Vec<KnowledgeDomain> {
        KnowledgeDomain::ALL
            .into_iter()
            .filter(|d| self.is_visited(*d))
            .collect()
    }

    /// First domain in default order that has not been visited
    pub fn first_unvisited(&self) -> Option<KnowledgeDomain> {
        KnowledgeDomain::ALL
            .into_iter()
            .find(|d| !self.is_visited(*d))
    }

    /// Error message recorded for `domain`, if retrieval failed
    pub fn domain_error(&self, domain: KnowledgeDomain) -> Option<&str> {
        self.domain_errors.get(&domain).map(String::as_str)
    }

    /// Payload stored for `domain`
    pub fn payload(&self, domain: KnowledgeDomain) -> Option<&DomainPayload> {
        self.payloads.get(&domain)
    }

    /// Historical context, if visited successfully
    pub fn context(&self) -> Option<&ContextualInformation> {
        match self.payloads.get(&KnowledgeDomain::Context) {
            Some(DomainPayload::Context(c)) => Some(c),
            _ => None,
        }
    }

    /// Time-series statistics, if visited successfully
    pub fn data(&self) -> Option<&DataAnalysisInformation> {
        match self.payloads.get(&KnowledgeDomain::Data) {
            Some(DomainPayload::Data(d)) => Some(d),
            _ => None,
        }
    }

    /// Interpretability findings, if visited successfully
    pub fn model(&self) -> Option<&ModelInterpretabilityInformation> {
        match self.payloads.get(&KnowledgeDomain::Model) {
            Some(DomainPayload::Model(m)) => Some(m),
            _ => None,
        }
    }

    /// Baseline forecast, if visited successfully
    pub fn prediction(&self) -> Option<&BaselineForecast> {
        match self.payloads.get(&KnowledgeDomain::Prediction) {
            Some(DomainPayload::Prediction(p)) => Some(p),
            _ => None,
        }
    }

    /// Number of domains whose payload was retrieved
    pub fn successful_domains(&self) -> usize {
        self.payloads.len()
    }

    pub fn insights(&self) -> &[Insight] {
        &self.insights
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn knowledge_gaps(&self) -> &[KnowledgeGap] {
        &self.gaps
    }

    pub fn transcript(&self) -> &[ThinkingRecord] {
        &self.transcript
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn decision(&self) -> Option<&DecisionStrategy> {
        self.decision.as_ref()
    }

    pub fn plan(&self) -> Option<&AdjustmentPlan> {
        self.plan.as_ref()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Open questions, highest priority first; ties keep insertion order.
    pub fn open_questions_ranked(&self) -> Vec<&Question> {
        let mut open: Vec<&Question> = self
            .questions
            .iter()
            .filter(|q| q.status == EntryStatus::Open)
            .collect();
        open.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        open
    }

    /// Open knowledge gaps, most important first; ties keep insertion order.
    pub fn open_gaps_ranked(&self) -> Vec<&KnowledgeGap> {
        let mut open: Vec<&KnowledgeGap> = self
            .gaps
            .iter()
            .filter(|g| g.status == EntryStatus::Open)
            .collect();
        open.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        open
    }

    /// Unvisited domain targeted by the highest-priority open question or gap.
    ///
    /// Questions rank ahead of gaps with equal priority; among equals the
    /// earliest entry wins.
    pub fn routing_target(&self) -> Option<(KnowledgeDomain, f64)> {
        let mut candidates: Vec<(KnowledgeDomain, f64)> = Vec::new();
        for question in &self.questions {
            if question.status != EntryStatus::Open {
                continue;
            }
            if let Some(domain) = question.target_domain {
                if !self.is_visited(domain) {
                    candidates.push((domain, question.priority));
                }
            }
        }
        for gap in &self.gaps {
            if gap.status != EntryStatus::Open {
                continue;
            }
            if let Some(domain) = gap
                .candidate_domains
                .iter()
                .copied()
                .find(|d| !self.is_visited(*d))
            {
                candidates.push((domain, gap.importance));
            }
        }
        // Stable sort keeps insertion order among equal priorities.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.into_iter().next()
    }

    /// Whether `action` can be dispatched from the current state.
    pub fn action_available(&self, action: Action) -> bool {
        if self.complete {
            return false;
        }
        match action {
            Action::VisitContext
            | Action::VisitData
            | Action::VisitModel
            | Action::VisitPrediction => {
                self.analysis.is_none() && action.domain().is_some_and(|d| !self.is_visited(d))
            }
            Action::Analyze => self.visited_count() > 0 && self.analysis.is_none(),
            Action::Decide => self.analysis.is_some() && self.decision.is_none(),
            Action::Execute => self.decision.is_some() && self.plan.is_none(),
            Action::Complete => self.plan.is_some(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        if self.stopped_by_limit {
            SessionPhase::AbortedByLimit
        } else if self.plan.is_some() {
            SessionPhase::Executed
        } else if self.decision.is_some() {
            SessionPhase::Decided
        } else if self.analysis.is_some() {
            SessionPhase::Analyzed
        } else if self.round == 0 && self.visited_count() == 0 {
            SessionPhase::Initial
        } else {
            SessionPhase::Collecting(self.visited_count())
        }
    }

    /// Snapshot the state as the caller-facing result.
    pub fn to_output(&self) -> SessionOutput {
        SessionOutput {
            session_id: self.session_id.clone(),
            complete: self.complete,
            stopped_by_limit: self.stopped_by_limit,
            round_count: self.round,
            visited_domains: self.visited_domains(),
            insights: self.insights.clone(),
            questions: self.questions.clone(),
            knowledge_gaps: self.gaps.clone(),
            analysis: self.analysis.clone(),
            decision: self.decision.clone(),
            adjustment_plan: self.plan.clone().unwrap_or_default(),
            justification: self.justification.clone(),
            recommendations: self.recommendations.clone(),
            confidence: self.confidence,
            errors: self.errors.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn gap_exhausted(&self, gap: &KnowledgeGap) -> bool {
        !gap.candidate_domains.is_empty()
            && gap.candidate_domains.iter().all(|d| self.is_visited(*d))
    }
}
