use std::sync::Mutex;

use candle_core::{Device, Tensor};
use pylate_rs::ColBERT;

use crate::{
    embedding::{Embedder, normalize},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "lightonai/GTE-ModernColBERT-v1";

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

/// Manages the ColBERT model lifecycle, supporting lazy loading on first use.
pub struct ModelManager {
    model: Option<ColBERT>,
    model_id: String,
}

impl ModelManager {
    /// Creates a `ModelManager` for a HuggingFace model ID or local path.
    ///
    /// The model is not loaded until the first call to
    /// [`ModelManager::encode`].
    pub fn new(model_id: String) -> Self {
        Self {
            model: None,
            model_id,
        }
    }

    #[cfg(test)]
    fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Ensures the model is loaded, downloading from HuggingFace Hub if needed.
    fn ensure_loaded(&mut self) -> Result<&mut ColBERT> {
        if self.model.is_none() {
            tracing::info!(model = %self.model_id, "loading ColBERT model");
            let colbert: ColBERT = ColBERT::from(&self.model_id)
                .with_device(default_device())
                .try_into()
                .map_err(|e| {
                    Error::Embedding(format!(
                        "failed to load model {}: {e}",
                        self.model_id
                    ))
                })?;
            self.model = Some(colbert);
        }

        self.model.as_mut().ok_or_else(|| {
            Error::Embedding("model failed to initialize".to_string())
        })
    }

    /// Encodes one text into token-level embeddings of shape `[T, D]`.
    pub fn encode(&mut self, text: &str) -> Result<Tensor> {
        let model = self.ensure_loaded()?;
        let embeddings = model
            .encode(&[text.to_string()], false)
            .map_err(|e| Error::Embedding(format!("encoding failed: {e}")))?;
        // [1, T, D] -> [T, D]
        embeddings.squeeze(0).map_err(map_candle_err)
    }
}

/// An [`Embedder`] producing one vector per text from a ColBERT model.
///
/// Token embeddings are mean-pooled and L2-normalized. Texts are encoded one
/// at a time, so padding never depends on what else is in a batch.
pub struct ColbertEmbedder {
    model: Mutex<ModelManager>,
}

impl ColbertEmbedder {
    pub fn new(model_id: String) -> Self {
        Self {
            model: Mutex::new(ModelManager::new(model_id)),
        }
    }
}

impl Embedder for ColbertEmbedder {
    fn name(&self) -> &str {
        "colbert"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("model lock poisoned".to_string()))?;
        let tokens = model.encode(text)?;
        mean_pool(&tokens)
    }
}

/// Average a `[T, D]` tensor over its tokens into a unit-length `D` vector.
fn mean_pool(tokens: &Tensor) -> Result<Vec<f32>> {
    let mut pooled = tokens
        .mean(0)
        .map_err(map_candle_err)?
        .to_dtype(candle_core::DType::F32)
        .map_err(map_candle_err)?
        .to_vec1::<f32>()
        .map_err(map_candle_err)?;
    normalize(&mut pooled);
    Ok(pooled)
}

fn map_candle_err(e: candle_core::Error) -> Error {
    Error::Embedding(format!("tensor computation error: {e}"))
}
