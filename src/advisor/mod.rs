//! Reasoning service client.
//!
//! The advisor is an external text-completion collaborator. This module
//! exposes it through the [`ReasoningService`] trait so the orchestrator can
//! be driven by the HTTP-backed [`PipeAdvisor`] in production and by scripted
//! in-process advisors in tests.

mod client;
mod types;


pub use client::PipeAdvisor;
pub use types::*;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdvisorResult;

/// A free-text reasoning collaborator.
///
/// Implementations hold no per-session state and must be safe to share
/// across concurrently running sessions. The returned text is opaque; it is
/// never interpreted here.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Produce a completion for `prompt`, bounding each attempt by `timeout`.
    ///
    /// Fails with [`crate::error::AdvisorError::Unavailable`] once retries
    /// are exhausted.
    async fn generate(&self, prompt: &str, timeout: Duration) -> AdvisorResult<String>;
}
