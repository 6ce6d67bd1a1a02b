//! ONNX Runtime backend for a binary violence classifier.
//!
//! Input: `[N, 3, S, S]` float tensor, ImageNet-normalized RGB.
//! Output: `[N, 1]` violence probability or `[N, 2]` class probabilities
//! where index 1 is the violent class.

use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use vscan_media::Frame;

use crate::backend::{to_probability, InferenceBackend};
use crate::error::{InferenceError, InferenceResult};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Square model input edge in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Output tensor names tried after the configured one.
const FALLBACK_OUTPUT_NAMES: &[&str] = &["output", "predictions", "logits", "output0"];

pub struct OnnxBackend {
    session: Arc<Mutex<Session>>,
    input_size: u32,
    output_name: String,
    model_path: PathBuf,
}

impl std::fmt::Debug for OnnxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxBackend")
            .field("model_path", &self.model_path)
            .field("input_size", &self.input_size)
            .field("output_name", &self.output_name)
            .finish()
    }
}

impl OnnxBackend {
    /// Load a model from disk. Blocking.
    ///
    /// `output_name` is the tensor read from the session outputs; common
    /// classifier output names are tried when it is absent.
    pub fn load(
        model_path: impl AsRef<Path>,
        input_size: u32,
        output_name: impl Into<String>,
    ) -> InferenceResult<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(InferenceError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = create_session(model_path)?;
        let output_name = output_name.into();

        info!(
            model = %model_path.display(),
            input_size,
            output = %output_name,
            "Loaded ONNX violence model"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_size,
            output_name,
            model_path: model_path.to_path_buf(),
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

#[async_trait]
impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn predict_batch(&self, frames: Vec<Frame>) -> InferenceResult<Vec<f64>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let input_size = self.input_size;
        let output_name = self.output_name.clone();

        tokio::task::spawn_blocking(move || {
            let batch = frames.len();
            let input = preprocess(&frames, input_size)?;
            let raw = run_inference(&session, input, &output_name)?;
            postprocess(&raw, batch)
        })
        .await
        .map_err(|e| InferenceError::internal(format!("Inference task panicked: {}", e)))?
    }
}

/// Resize, normalize and pack frames into an NCHW tensor.
fn preprocess(frames: &[Frame], input_size: u32) -> InferenceResult<Value> {
    let side = input_size as usize;
    let plane = side * side;
    let mut nchw: Vec<f32> = vec![0.0; frames.len() * 3 * plane];

    for (n, frame) in frames.iter().enumerate() {
        let rgb = to_rgb(frame, input_size)?;
        let base = n * 3 * plane;

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let offset = y as usize * side + x as usize;
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                nchw[base + c * plane + offset] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }
    }

    let shape = vec![frames.len(), 3, side, side];
    Tensor::from_array((shape, nchw.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| InferenceError::internal(format!("Failed to create tensor: {}", e)))
}

fn to_rgb(frame: &Frame, input_size: u32) -> InferenceResult<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    let expected_len = (frame.width * frame.height * 3) as usize;
    if frame.data.len() != expected_len {
        return Err(InferenceError::InvalidInput(format!(
            "frame {}: expected {} bytes, got {}",
            frame.frame_number,
            expected_len,
            frame.data.len()
        )));
    }

    let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| InferenceError::InvalidInput("Failed to create image buffer".into()))?;

    if frame.width == input_size && frame.height == input_size {
        return Ok(buffer);
    }

    Ok(DynamicImage::ImageRgb8(buffer)
        .resize_exact(input_size, input_size, FilterType::Triangle)
        .to_rgb8())
}

fn run_inference(
    session: &Mutex<Session>,
    input: Value,
    output_name: &str,
) -> InferenceResult<Vec<f32>> {
    let mut session = session
        .lock()
        .map_err(|_| InferenceError::internal("Session lock poisoned"))?;

    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| InferenceError::inference(format!("ONNX inference failed: {}", e)))?;

    let output = std::iter::once(output_name)
        .chain(FALLBACK_OUTPUT_NAMES.iter().copied())
        .find_map(|name| outputs.get(name))
        .ok_or_else(|| InferenceError::inference(format!("Missing {} tensor", output_name)))?;

    let tensor = output
        .try_extract_tensor::<f32>()
        .map_err(|e| InferenceError::inference(format!("Failed to extract tensor: {}", e)))?;

    Ok(tensor.1.iter().copied().collect())
}

/// Map raw output values to one probability per frame.
fn postprocess(raw: &[f32], batch: usize) -> InferenceResult<Vec<f64>> {
    if batch == 0 || raw.len() % batch != 0 {
        return Err(InferenceError::OutputMismatch {
            expected: batch,
            got: raw.len(),
        });
    }

    let per_frame = raw.len() / batch;
    let scores = match per_frame {
        1 => raw.iter().map(|v| to_probability(*v)).collect(),
        2 => raw.chunks_exact(2).map(|pair| to_probability(pair[1])).collect(),
        other => {
            return Err(InferenceError::inference(format!(
                "Unsupported output width {}",
                other
            )))
        }
    };

    debug!(batch, "Scored batch");
    Ok(scores)
}

/// Create an ONNX Runtime session on the CPU provider.
fn create_session(model_path: &Path) -> InferenceResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| InferenceError::model_load(format!("Failed to read model file: {}", e)))?;

    Session::builder()
        .map_err(|e| InferenceError::model_load(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| InferenceError::model_load(format!("Failed to set optimization level: {}", e)))?
        .commit_from_memory(&model_bytes)
        .map_err(|e| InferenceError::model_load(format!("Failed to load ONNX model: {}", e)))
}
