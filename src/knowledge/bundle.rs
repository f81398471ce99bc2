use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    BaselineForecast, ContextualInformation, DataAnalysisInformation, KnowledgeDomain,
    KnowledgeSource, ModelInterpretabilityInformation,
};
use crate::error::{KnowledgeError, KnowledgeResult};

/// All four domain payloads, any of which may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBundle {
    #[serde(default)]
    pub context: Option<ContextualInformation>,
    #[serde(default)]
    pub data: Option<DataAnalysisInformation>,
    #[serde(default)]
    pub model: Option<ModelInterpretabilityInformation>,
    #[serde(default)]
    pub prediction: Option<BaselineForecast>,
}

impl KnowledgeBundle {
    /// Parse a bundle from JSON, dropping entries whose hour is outside 0-23.
    pub fn from_json(json: &str) -> KnowledgeResult<Self> {
        let mut bundle: KnowledgeBundle = serde_json::from_str(json)?;
        bundle.drop_invalid_hours();
        Ok(bundle)
    }

    /// Read and parse a bundle file.
    pub async fn load(path: impl AsRef<Path>) -> KnowledgeResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let bundle = Self::from_json(&text)?;
        debug!(
            path = %path.display(),
            context = bundle.context.is_some(),
            data = bundle.data.is_some(),
            model = bundle.model.is_some(),
            prediction = bundle.prediction.is_some(),
            "Knowledge bundle loaded"
        );
        Ok(bundle)
    }

    /// Set the historical context payload
    pub fn with_context(mut self, context: ContextualInformation) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the statistics payload
    pub fn with_data(mut self, data: DataAnalysisInformation) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the interpretability payload
    pub fn with_model(mut self, model: ModelInterpretabilityInformation) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the baseline forecast payload
    pub fn with_prediction(mut self, prediction: BaselineForecast) -> Self {
        self.prediction = Some(prediction);
        self
    }

    fn drop_invalid_hours(&mut self) {
        let dropped = self.context.as_mut().map_or(0, |c| c.drop_invalid_hours())
            + self.data.as_mut().map_or(0, |d| d.drop_invalid_hours())
            + self.model.as_mut().map_or(0, |m| m.drop_invalid_hours())
            + self.prediction.as_mut().map_or(0, |p| p.drop_invalid_hours());
        if dropped > 0 {
            warn!(dropped, "Dropped knowledge entries with hour outside 0-23");
        }
    }
}

/// Knowledge source serving a fixed, shared [`KnowledgeBundle`].
#[derive(Debug, Clone, Default)]
pub struct StaticKnowledgeSource {
    bundle: Arc<KnowledgeBundle>,
}

impl StaticKnowledgeSource {
    /// Serve `bundle`
    pub fn new(bundle: KnowledgeBundle) -> Self {
        Self {
            bundle: Arc::new(bundle),
        }
    }

    /// Load a bundle file and serve it
    pub async fn from_file(path: impl AsRef<Path>) -> KnowledgeResult<Self> {
        Ok(Self::new(KnowledgeBundle::load(path).await?))
    }

    /// The served bundle
    pub fn bundle(&self) -> &KnowledgeBundle {
        &self.bundle
    }
}

fn present<T: Clone>(slot: &Option<T>, domain: KnowledgeDomain) -> KnowledgeResult<T> {
    slot.clone().ok_or_else(|| KnowledgeError::NotFound {
        domain: domain.to_string(),
    })
}

#[async_trait]
impl KnowledgeSource for StaticKnowledgeSource {
    async fn contextual_information(&self) -> KnowledgeResult<ContextualInformation> {
        present(&self.bundle.context, KnowledgeDomain::Context)
    }

    async fn data_analysis_information(&self) -> KnowledgeResult<DataAnalysisInformation> {
        present(&self.bundle.data, KnowledgeDomain::Data)
    }

    async fn model_interpretability_information(
        &self,
    ) -> KnowledgeResult<ModelInterpretabilityInformation> {
        present(&self.bundle.model, KnowledgeDomain::Model)
    }

    async fn baseline_forecast_information(&self) -> KnowledgeResult<BaselineForecast> {
        present(&self.bundle.prediction, KnowledgeDomain::Prediction)
    }
}
