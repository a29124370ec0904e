use std::path::PathBuf;

use super::normalizer::ImageTensor;
use crate::config::ModelConfig;

/// Raw per-class scores, one entry per registered label.
pub type PredictionVector = Vec<f32>;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ClassifierError(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model file not found at {0}")]
    Missing(PathBuf),
    #[error("Error loading model: {0}")]
    #[cfg_attr(not(feature = "torch"), allow(dead_code))]
    Backend(String),
    #[error("No model backend compiled in; rebuild with the `torch` feature")]
    BackendUnavailable,
}

/// Pre-trained model mapping a tensor to class scores.
/// Loaded once at startup and shared read-only between requests.
pub trait Classifier: Send + Sync {
    fn predict(&self, tensor: &ImageTensor) -> Result<PredictionVector, ClassifierError>;
}

pub fn load_classifier(config: &ModelConfig) -> Result<Box<dyn Classifier>, ModelLoadError> {
    if !config.path.exists() {
        return Err(ModelLoadError::Missing(config.path.clone()));
    }
    load_backend(config)
}

#[cfg(feature = "torch")]
fn load_backend(config: &ModelConfig) -> Result<Box<dyn Classifier>, ModelLoadError> {
    Ok(Box::new(torch::TorchClassifier::load(config)?))
}

#[cfg(not(feature = "torch"))]
fn load_backend(_config: &ModelConfig) -> Result<Box<dyn Classifier>, ModelLoadError> {
    Err(ModelLoadError::BackendUnavailable)
}

#[cfg(feature = "torch")]
mod torch {
    use std::sync::Mutex;

    use tch::{CModule, Device, Kind, Tensor};

    use super::{Classifier, ClassifierError, ModelLoadError, PredictionVector};
    use crate::config::ModelConfig;
    use crate::pipeline::normalizer::ImageTensor;

    pub struct TorchClassifier {
        model: Mutex<CModule>,
        device: Device,
    }

    impl TorchClassifier {
        pub fn load(config: &ModelConfig) -> Result<Self, ModelLoadError> {
            let device = if config.use_cuda {
                Device::cuda_if_available()
            } else {
                Device::Cpu
            };
            let mut model = CModule::load_on_device(&config.path, device)
                .map_err(|e| ModelLoadError::Backend(e.to_string()))?;
            model.set_eval();
            log::info!("Loaded TorchScript model from {} on {:?}", config.path.display(), device);
            Ok(Self {
                model: Mutex::new(model),
                device,
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn predict(&self, tensor: &ImageTensor) -> Result<PredictionVector, ClassifierError> {
            let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
            let values: Vec<f32> = tensor.as_array().iter().copied().collect();
            let input = Tensor::from_slice(&values)
                .view(shape.as_slice())
                .to_device(self.device);

            let model = self
                .model
                .lock()
                .map_err(|_| ClassifierError("model lock poisoned".to_string()))?;
            let output = tch::no_grad(|| model.forward_ts(&[&input]))
                .map_err(|e| ClassifierError(e.to_string()))?;
            let output_flat = output.to_kind(Kind::Float).to_device(Device::Cpu).reshape([-1]);
            Vec::<f32>::try_from(&output_flat).map_err(|e| ClassifierError(e.to_string()))
        }
    }
}
