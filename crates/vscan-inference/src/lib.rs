//! Violence scoring backends.
//!
//! All backends implement [`InferenceBackend`]. The process selects one
//! [`ModelBackend`] variant at startup and loads it into a [`BackendSlot`],
//! which gates readiness for the pipeline.

pub mod backend;
pub mod config;
pub mod error;
pub mod mock;
pub mod onnx;
pub mod slot;

pub use backend::InferenceBackend;
pub use config::{BackendConfig, BackendKind};
pub use error::{InferenceError, InferenceResult};
pub use mock::MockBackend;
pub use onnx::OnnxBackend;
pub use slot::{select_backend, BackendSlot, ModelBackend};
