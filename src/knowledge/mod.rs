//! Knowledge source adapter.
//!
//! Read-only access to the four information domains the advisor can ask for:
//! historical context, time-series statistics, model interpretability
//! findings, and the baseline forecast. Retrieval only; nothing here reasons
//! about the payloads.

mod bundle;

pub use bundle::{KnowledgeBundle, StaticKnowledgeSource};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::KnowledgeResult;

/// One of the four named knowledge domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeDomain {
    /// Historical events, similar days, past manual adjustments.
    Context,
    /// Per-hour demand statistics and recent trend.
    Data,
    /// Feature importances and per-hour model error.
    Model,
    /// Baseline hourly forecast.
    Prediction,
}

impl KnowledgeDomain {
    /// Fixed default visiting order.
    pub const ALL: [KnowledgeDomain; 4] = [
        KnowledgeDomain::Context,
        KnowledgeDomain::Data,
        KnowledgeDomain::Model,
        KnowledgeDomain::Prediction,
    ];

    /// Get the domain name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeDomain::Context => "context",
            KnowledgeDomain::Data => "data",
            KnowledgeDomain::Model => "model",
            KnowledgeDomain::Prediction => "prediction",
        }
    }

    /// Human-readable description used in prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            KnowledgeDomain::Context => "historical context (past events and adjustments)",
            KnowledgeDomain::Data => "time-series statistics (hourly means, spread, trend)",
            KnowledgeDomain::Model => "model interpretability (feature importances, hourly error)",
            KnowledgeDomain::Prediction => "baseline forecast (hourly predicted demand)",
        }
    }

    /// Position in [`Self::ALL`].
    pub fn index(&self) -> usize {
        match self {
            KnowledgeDomain::Context => 0,
            KnowledgeDomain::Data => 1,
            KnowledgeDomain::Model => 2,
            KnowledgeDomain::Prediction => 3,
        }
    }
}

impl std::fmt::Display for KnowledgeDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for KnowledgeDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "context" | "historical_context" | "history" | "contextual" => {
                Ok(KnowledgeDomain::Context)
            }
            "data" | "data_analysis" | "statistics" | "time_series" => Ok(KnowledgeDomain::Data),
            "model" | "model_interpretability" | "interpretability" | "explanation"
            | "explanations" => Ok(KnowledgeDomain::Model),
            "prediction" | "predictions" | "baseline" | "baseline_forecast" | "forecast" => {
                Ok(KnowledgeDomain::Prediction)
            }
            _ => Err(format!("Unknown knowledge domain: {}", s)),
        }
    }
}

// ============================================================================
// Domain payloads
// ============================================================================

/// A past event relevant to the forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub description: String,
    /// Free-form category such as "weather", "holiday", "adjustment".
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Observed demand deviation from forecast, in percent.
    #[serde(default)]
    pub demand_impact_pct: Option<f64>,
    #[serde(default)]
    pub hours: Vec<u8>,
}

/// Historical context domain payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextualInformation {
    #[serde(default)]
    pub events: Vec<HistoricalEvent>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Demand statistics for one hour of the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyStatistics {
    pub hour: u8,
    pub mean: f64,
    pub std_dev: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl HourlyStatistics {
    /// Coefficient of variation; zero when the mean is zero.
    pub fn variation(&self) -> f64 {
        if self.mean.abs() < f64::EPSILON {
            0.0
        } else {
            (self.std_dev / self.mean).abs()
        }
    }
}

/// Time-series statistics domain payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataAnalysisInformation {
    #[serde(default)]
    pub hourly: Vec<HourlyStatistics>,
    #[serde(default)]
    pub recent_trend_pct: Option<f64>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Global importance of one model feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    /// "positive" or "negative" effect on predicted demand, when known.
    #[serde(default)]
    pub direction: Option<String>,
}

/// Backtest error of the model at one hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyError {
    pub hour: u8,
    /// Mean absolute percentage error.
    pub mape: f64,
}

/// Model interpretability domain payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInterpretabilityInformation {
    #[serde(default)]
    pub feature_importances: Vec<FeatureImportance>,
    #[serde(default)]
    pub hourly_error: Vec<HourlyError>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Baseline prediction for one hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPrediction {
    pub hour: u8,
    pub value: f64,
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
}

impl HourlyPrediction {
    /// Interval width relative to the point value, if an interval is known.
    pub fn relative_spread(&self) -> Option<f64> {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) if self.value.abs() > f64::EPSILON => {
                Some(((hi - lo) / self.value).abs())
            }
            _ => None,
        }
    }
}

/// Baseline forecast domain payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineForecast {
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub hourly: Vec<HourlyPrediction>,
}

impl BaselineForecast {
    /// Predicted value at `hour`, if the payload carries it.
    pub fn value_at(&self, hour: u8) -> Option<f64> {
        self.hourly.iter().find(|p| p.hour == hour).map(|p| p.value)
    }
}

/// Highest valid hour of day.
pub const LAST_HOUR: u8 = 23;

fn retain_hours<T>(entries: &mut Vec<T>, hour: impl Fn(&T) -> u8) -> usize {
    let before = entries.len();
    entries.retain(|e| hour(e) <= LAST_HOUR);
    before - entries.len()
}

impl ContextualInformation {
    /// Drop event hours outside 0-23; returns how many were dropped.
    pub fn drop_invalid_hours(&mut self) -> usize {
        self.events
            .iter_mut()
            .map(|e| retain_hours(&mut e.hours, |h| *h))
            .sum()
    }
}

impl DataAnalysisInformation {
    /// Drop statistics for hours outside 0-23; returns how many were dropped.
    pub fn drop_invalid_hours(&mut self) -> usize {
        retain_hours(&mut self.hourly, |h| h.hour)
    }
}

impl ModelInterpretabilityInformation {
    /// Drop error entries for hours outside 0-23; returns how many were dropped.
    pub fn drop_invalid_hours(&mut self) -> usize {
        retain_hours(&mut self.hourly_error, |h| h.hour)
    }
}

impl BaselineForecast {
    /// Drop predictions for hours outside 0-23; returns how many were dropped.
    pub fn drop_invalid_hours(&mut self) -> usize {
        retain_hours(&mut self.hourly, |h| h.hour)
    }
}

/// A retrieved payload tagged with its domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "payload", rename_all = "snake_case")]
pub enum DomainPayload {
    Context(ContextualInformation),
    Data(DataAnalysisInformation),
    Model(ModelInterpretabilityInformation),
    Prediction(BaselineForecast),
}

impl DomainPayload {
    /// Domain this payload belongs to.
    pub fn domain(&self) -> KnowledgeDomain {
        match self {
            DomainPayload::Context(_) => KnowledgeDomain::Context,
            DomainPayload::Data(_) => KnowledgeDomain::Data,
            DomainPayload::Model(_) => KnowledgeDomain::Model,
            DomainPayload::Prediction(_) => KnowledgeDomain::Prediction,
        }
    }

    /// Drop every entry whose hour is outside 0-23.
    pub fn drop_invalid_hours(&mut self) -> usize {
        match self {
            DomainPayload::Context(c) => c.drop_invalid_hours(),
            DomainPayload::Data(d) => d.drop_invalid_hours(),
            DomainPayload::Model(m) => m.drop_invalid_hours(),
            DomainPayload::Prediction(p) => p.drop_invalid_hours(),
        }
    }

    /// Short digest handed to the advisor in later rounds.
    pub fn summary(&self) -> String {
        match self {
            DomainPayload::Context(c) => {
                let mut parts: Vec<String> = c
                    .events
                    .iter()
                    .take(5)
                    .map(|e| match e.demand_impact_pct {
                        Some(pct) => format!("{} ({:+.1}%)", e.description, pct),
                        None => e.description.clone(),
                    })
                    .collect();
                parts.extend(c.notes.iter().take(3).cloned());
                if parts.is_empty() {
                    "no historical events recorded".to_string()
                } else {
                    parts.join("; ")
                }
            }
            DomainPayload::Data(d) => {
                let peak = d
                    .hourly
                    .iter()
                    .max_by(|a, b| a.mean.total_cmp(&b.mean))
                    .map(|h| format!("peak mean at hour {:02} ({:.1})", h.hour, h.mean));
                let trend = d
                    .recent_trend_pct
                    .map(|t| format!("recent trend {:+.1}%", t));
                let parts: Vec<String> = [Some(format!("{} hours profiled", d.hourly.len())), peak, trend]
                    .into_iter()
                    .flatten()
                    .collect();
                parts.join(", ")
            }
            DomainPayload::Model(m) => {
                let top: Vec<String> = m
                    .feature_importances
                    .iter()
                    .take(3)
                    .map(|f| format!("{} ({:.2})", f.feature, f.importance))
                    .collect();
                let worst = m
                    .hourly_error
                    .iter()
                    .max_by(|a, b| a.mape.total_cmp(&b.mape))
                    .map(|e| format!("; worst error at hour {:02} ({:.1}% MAPE)", e.hour, e.mape))
                    .unwrap_or_default();
                format!("top features: {}{}", top.join(", "), worst)
            }
            DomainPayload::Prediction(p) => {
                let peak = p
                    .hourly
                    .iter()
                    .max_by(|a, b| a.value.total_cmp(&b.value))
                    .map(|h| format!(", peak {:.1} at hour {:02}", h.value, h.hour))
                    .unwrap_or_default();
                format!(
                    "{} hourly predictions{}{}",
                    p.hourly.len(),
                    p.unit.as_ref().map(|u| format!(" in {}", u)).unwrap_or_default(),
                    peak
                )
            }
        }
    }
}

/// Read-only facade over the four knowledge domains.
///
/// Implementations hold no per-session state; they are shared by every
/// concurrently running session. Each operation either returns its payload
/// or fails with [`crate::error::KnowledgeError::NotFound`].
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Historical context.
    async fn contextual_information(&self) -> KnowledgeResult<ContextualInformation>;
    /// Time-series statistics.
    async fn data_analysis_information(&self) -> KnowledgeResult<DataAnalysisInformation>;
    /// Model interpretability findings.
    async fn model_interpretability_information(
        &self,
    ) -> KnowledgeResult<ModelInterpretabilityInformation>;
    /// Baseline forecast.
    async fn baseline_forecast_information(&self) -> KnowledgeResult<BaselineForecast>;
}

/// Retrieve the payload of `domain` from `source`.
///
/// Sources are not trusted to stay within the day: entries with an hour
/// outside 0-23 are dropped before the payload reaches any step.
pub async fn fetch_domain(
    source: &dyn KnowledgeSource,
    domain: KnowledgeDomain,
) -> KnowledgeResult<DomainPayload> {
    let mut payload = match domain {
        KnowledgeDomain::Context => DomainPayload::Context(source.contextual_information().await?),
        KnowledgeDomain::Data => DomainPayload::Data(source.data_analysis_information().await?),
        KnowledgeDomain::Model => {
            DomainPayload::Model(source.model_interpretability_information().await?)
        }
        KnowledgeDomain::Prediction => {
            DomainPayload::Prediction(source.baseline_forecast_information().await?)
        }
    };
    let dropped = payload.drop_invalid_hours();
    if dropped > 0 {
        warn!(%domain, dropped, "Dropped knowledge entries with hour outside 0-23");
    }
    Ok(payload)
}
