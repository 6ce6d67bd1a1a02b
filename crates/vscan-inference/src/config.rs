//! Backend configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::onnx::DEFAULT_INPUT_SIZE;

/// Which backend to load at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// ONNX model if it loads, otherwise the mock
    #[default]
    Auto,
    /// ONNX model only
    Onnx,
    /// Deterministic mock only
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Auto => "auto",
            BackendKind::Onnx => "onnx",
            BackendKind::Mock => "mock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BackendKind::Auto),
            "onnx" => Ok(BackendKind::Onnx),
            "mock" => Ok(BackendKind::Mock),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Model location and backend choice.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Directory holding model files
    pub model_path: PathBuf,
    /// Model file stem; the backend loads `<model_path>/<model_name>.onnx`
    pub model_name: String,
    /// Output tensor to read
    pub output_name: String,
    /// Square input edge in pixels
    pub input_size: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Auto,
            model_path: PathBuf::from("./models"),
            model_name: "violence_detection".to_string(),
            output_name: "output".to_string(),
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

impl BackendConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            kind: std::env::var("INFERENCE_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.kind),
            model_path: std::env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            model_name: std::env::var("MODEL_NAME").unwrap_or(defaults.model_name),
            output_name: std::env::var("MODEL_OUTPUT_NAME").unwrap_or(defaults.output_name),
            input_size: std::env::var("MODEL_INPUT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.input_size),
        }
    }

    /// Full path of the ONNX model file.
    pub fn model_file(&self) -> PathBuf {
        self.model_path.join(format!("{}.onnx", self.model_name))
    }
}
