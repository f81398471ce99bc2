//! # Forecast Advisor
//!
//! An advisory loop that helps a human adjust a short-term electricity-demand
//! forecast. Given an adjustment intent and the human's reasoning, it
//! repeatedly asks an external reasoning service what to do next, pulls
//! evidence from four knowledge domains, analyzes it, decides on a strategy
//! and produces a per-hour adjustment plan.
//!
//! ## Features
//!
//! - **Bounded loop**: iteration and wall-clock ceilings, cancellation
//! - **Tolerant parsing**: JSON or sectioned-text advisor replies, never fatal
//! - **Priority routing**: open questions steer which domain is visited next
//! - **Graceful degradation**: failing domains and advisor outages still end
//!   in a completed, explained result
//! - **Round events**: optional per-round progress stream
//!
//! ## Architecture
//!
//! ```text
//! Caller → Orchestrator ─┬→ ThinkingStep → ReasoningService (Langbase pipe, HTTP)
//!                        ├→ access       → KnowledgeSource (context, data, model, prediction)
//!                        └→ analyze → decide → execute
//!                              ↓
//!                         BeliefState (per session)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use forecast_advisor::{Config, Orchestrator, PipeAdvisor, SessionParams, StaticKnowledgeSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let advisor = PipeAdvisor::new(&config.advisor, config.request.clone())?;
//!     let knowledge = StaticKnowledgeSource::from_file(&config.knowledge.path).await?;
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(advisor),
//!         Arc::new(knowledge),
//!         config.session.clone(),
//!         &config.request,
//!     );
//!     let output = orchestrator
//!         .run(SessionParams::new("Raise the morning peak", "Cold snap expected"))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Reasoning service trait and the Langbase pipe client.
pub mod advisor;
/// Belief state, actions and session input/output types.
pub mod belief;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Knowledge domains, payloads and sources.
pub mod knowledge;
/// Session orchestrator.
pub mod orchestrator;
/// Tolerant parser for advisor replies.
pub mod parser;
/// System prompt for the advisor pipe.
pub mod prompts;
/// Step functions of the advisory loop.
pub mod steps;

pub use advisor::{PipeAdvisor, ReasoningService};
pub use belief::{BeliefState, RoundEvent, SessionOutput, SessionParams};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use knowledge::{KnowledgeBundle, KnowledgeDomain, KnowledgeSource, StaticKnowledgeSource};
pub use orchestrator::Orchestrator;
