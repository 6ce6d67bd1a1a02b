//! Backend selection and out-of-band loading.
//!
//! The process picks one [`ModelBackend`] at startup. Loading a real model can
//! take a while, so the chosen backend is installed into a [`BackendSlot`] once
//! it is ready; until then the slot reports not-ready and rejects requests.

use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use vscan_media::Frame;

use crate::backend::InferenceBackend;
use crate::config::{BackendConfig, BackendKind};
use crate::error::{InferenceError, InferenceResult};
use crate::mock::MockBackend;
use crate::onnx::OnnxBackend;

/// The closed set of backends the service can run.
#[derive(Debug)]
pub enum ModelBackend {
    Onnx(OnnxBackend),
    Mock(MockBackend),
}

impl ModelBackend {
    fn inner(&self) -> &dyn InferenceBackend {
        match self {
            ModelBackend::Onnx(b) => b,
            ModelBackend::Mock(b) => b,
        }
    }
}

#[async_trait]
impl InferenceBackend for ModelBackend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn is_ready(&self) -> bool {
        self.inner().is_ready()
    }

    fn supports_cancellation(&self) -> bool {
        self.inner().supports_cancellation()
    }

    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
        self.inner().predict_batch(frames).await
    }
}

/// Build the backend named by `config`. Blocking.
pub fn select_backend(config: &BackendConfig) -> InferenceResult<ModelBackend> {
    let model_file = config.model_file();

    match config.kind {
        BackendKind::Mock => {
            info!("Using mock inference backend");
            Ok(ModelBackend::Mock(MockBackend::new()))
        }
        BackendKind::Onnx => OnnxBackend::load(&model_file, config.input_size, &config.output_name)
            .map(ModelBackend::Onnx),
        BackendKind::Auto => {
            if !model_file.exists() {
                warn!(
                    model = %model_file.display(),
                    "No model file found, using mock inference backend"
                );
                return Ok(ModelBackend::Mock(MockBackend::new()));
            }

            match OnnxBackend::load(&model_file, config.input_size, &config.output_name) {
                Ok(backend) => Ok(ModelBackend::Onnx(backend)),
                Err(e) => {
                    warn!("Failed to load model, falling back to mock backend: {}", e);
                    Ok(ModelBackend::Mock(MockBackend::new()))
                }
            }
        }
    }
}

/// Holds the process backend once loading finishes.
#[derive(Default)]
pub struct BackendSlot {
    backend: OnceLock<Arc<dyn InferenceBackend>>,
}

impl BackendSlot {
    /// An empty slot, not ready until [`install`](Self::install) is called.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A slot that is ready immediately.
    pub fn ready(backend: Arc<dyn InferenceBackend>) -> Self {
        let slot = Self::empty();
        slot.install(backend);
        slot
    }

    /// Install the backend. Later installs are ignored; returns whether this one took.
    pub fn install(&self, backend: Arc<dyn InferenceBackend>) -> bool {
        let name = backend.name();
        let installed = self.backend.set(backend).is_ok();
        if installed {
            info!(backend = name, "Inference backend ready");
        }
        installed
    }

    /// Load the configured backend on a blocking thread and install it.
    pub async fn load(self: Arc<Self>, config: BackendConfig) -> InferenceResult<()> {
        let backend = tokio::task::spawn_blocking(move || select_backend(&config))
            .await
            .map_err(|e| InferenceError::internal(format!("Backend loader panicked: {}", e)))??;
        self.install(Arc::new(backend));
        Ok(())
    }

    pub fn get(&self) -> Option<Arc<dyn InferenceBackend>> {
        self.backend.get().cloned()
    }

    /// Name of the installed backend, if any.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.get().map(|b| b.name())
    }
}

impl std::fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSlot")
            .field("backend", &self.backend_name())
            .finish()
    }
}

#[async_trait]
impl InferenceBackend for BackendSlot {
    fn name(&self) -> &'static str {
        self.backend_name().unwrap_or("unloaded")
    }

    fn is_ready(&self) -> bool {
        self.backend.get().is_some_and(|b| b.is_ready())
    }

    fn supports_cancellation(&self) -> bool {
        self.backend
            .get()
            .is_some_and(|b| b.supports_cancellation())
    }

    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
        match self.backend.get() {
            Some(backend) if backend.is_ready() => backend.predict_batch(frames).await,
            _ => Err(InferenceError::NotReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn frame() -> Frame {
        Frame {
            data: vec![1, 2, 3],
            width: 1,
            height: 1,
            timestamp_seconds: 0.0,
            frame_number: 0,
        }
    }

    #[tokio::test]
    async fn test_empty_slot_is_not_ready() {
        let slot = BackendSlot::empty();
        assert!(!slot.is_ready());
        assert_eq!(slot.name(), "unloaded");

        let err = slot.predict_batch(vec![frame()]).await.unwrap_err();
        assert!(matches!(err, InferenceError::NotReady));
        assert_eq!(err.kind(), vscan_models::ErrorKind::BackendNotReady);
    }

    #[tokio::test]
    async fn test_install_once() {
        let slot = BackendSlot::empty();
        assert!(slot.install(Arc::new(MockBackend::new())));
        assert!(!slot.install(Arc::new(MockBackend::new())));
        assert!(slot.is_ready());
        assert!(slot.supports_cancellation());

        let scores = slot.predict_batch(vec![frame()]).await.unwrap();
        assert_eq!(scores, vec![MockBackend::score_bytes(&[1, 2, 3])]);
    }

    #[tokio::test]
    async fn test_auto_without_model_uses_mock() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig {
            model_path: dir.path().to_path_buf(),
            ..Default::default()
        };

        let slot = Arc::new(BackendSlot::empty());
        slot.clone().load(config).await.unwrap();
        assert_eq!(slot.backend_name(), Some("mock"));
    }

    #[test]
    fn test_onnx_without_model_fails() {
        let config = BackendConfig {
            kind: BackendKind::Onnx,
            model_path: PathBuf::from("/nonexistent"),
            ..Default::default()
        };
        assert!(matches!(
            select_backend(&config),
            Err(InferenceError::ModelNotFound(_))
        ));
    }
}
