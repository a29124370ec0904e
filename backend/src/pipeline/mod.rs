pub mod classifier;
pub mod error;
pub mod labels;
pub mod normalizer;
pub mod staging;

use std::sync::Arc;
use std::time::Duration;

use shared::Label;
use uuid::Uuid;

use classifier::{Classifier, PredictionVector};
use error::PipelineError;
use labels::{LabelRegistry, argmax};
use normalizer::{ImageNormalizer, ImageTensor};
use staging::UploadStager;

/// One uploaded file as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Normalized,
    Scored,
    Resolved,
    Completed,
}

/// Validates, normalizes, scores and labels a single upload.
///
/// Holds only read-only shared state, so one instance is cloned into every
/// worker and runs concurrently without coordination.
#[derive(Clone)]
pub struct InferencePipeline {
    normalizer: Arc<ImageNormalizer>,
    classifier: Arc<dyn Classifier>,
    labels: Arc<LabelRegistry>,
    stager: Option<UploadStager>,
    timeout: Option<Duration>,
}

impl InferencePipeline {
    pub fn new(
        normalizer: ImageNormalizer,
        classifier: Arc<dyn Classifier>,
        labels: LabelRegistry,
    ) -> Self {
        Self {
            normalizer: Arc::new(normalizer),
            classifier,
            labels: Arc::new(labels),
            stager: None,
            timeout: None,
        }
    }

    /// Decode from a per-request file instead of memory.
    pub fn with_staging(mut self, stager: UploadStager) -> Self {
        self.stager = Some(stager);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn labels(&self) -> &LabelRegistry {
        &self.labels
    }

    pub async fn run(
        &self,
        request_id: Uuid,
        upload: Option<RawUpload>,
    ) -> Result<Label, PipelineError> {
        let mut stage = Stage::Received;
        let result = self.execute(request_id, upload, &mut stage).await;
        match &result {
            Ok(label) => log::info!("[{}] predicted label: {}", request_id, label),
            Err(PipelineError::Validation(msg)) => {
                log::warn!("[{}] rejected upload: {}", request_id, msg)
            }
            Err(e) => log::error!("[{}] failed after {:?}: {}", request_id, stage, e),
        }
        result
    }

    async fn execute(
        &self,
        request_id: Uuid,
        upload: Option<RawUpload>,
        stage: &mut Stage,
    ) -> Result<Label, PipelineError> {
        let upload = validate(upload)?;
        *stage = Stage::Validated;

        // Dropped on every return below, removing the staged file.
        let staged = match &self.stager {
            Some(stager) => Some(stager.stage(
                request_id,
                upload.filename.as_deref(),
                &upload.bytes,
            )?),
            None => None,
        };
        let tensor = match &staged {
            Some(file) => self.normalizer.normalize_file(file.path())?,
            None => self.normalizer.normalize(&upload.bytes)?,
        };
        *stage = Stage::Normalized;
        log::debug!("[{}] normalized to {:?}", request_id, tensor.shape());

        let scores = self.score(tensor).await?;
        *stage = Stage::Scored;

        let index = argmax(&scores).ok_or_else(|| {
            PipelineError::Inference("classifier returned no usable scores".to_string())
        })?;
        let label = self.labels.resolve(index)?.clone();
        *stage = Stage::Resolved;
        log::debug!("[{}] predicted label index: {} ({})", request_id, index, label);

        *stage = Stage::Completed;
        Ok(label)
    }

    async fn score(&self, tensor: ImageTensor) -> Result<PredictionVector, PipelineError> {
        let classifier = Arc::clone(&self.classifier);
        let task = tokio::task::spawn_blocking(move || classifier.predict(&tensor));
        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                log::warn!(
                    "Classifier exceeded {:?}; its forward pass keeps running in the background",
                    limit
                );
                PipelineError::Timeout(limit)
            })?,
            None => task.await,
        };
        joined
            .map_err(|e| PipelineError::Inference(format!("classifier task failed: {}", e)))?
            .map_err(|e| PipelineError::Inference(e.to_string()))
    }
}

fn validate(upload: Option<RawUpload>) -> Result<RawUpload, PipelineError> {
    let upload = upload.ok_or_else(|| PipelineError::validation("No image part in the request"))?;
    if upload.filename.as_deref() == Some("") {
        return Err(PipelineError::validation("No selected file"));
    }
    if upload.bytes.is_empty() {
        return Err(PipelineError::validation("Uploaded file is empty"));
    }
    Ok(upload)
}
