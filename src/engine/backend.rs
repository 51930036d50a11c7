//! Inference backend
//!
//! The emotion network itself runs in an external runtime. This module holds
//! the seam (`InferenceBackend` / `ModelLoader`) and the OpenVINO
//! implementation used by the server binary.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{ArrayD, IxDyn};
use openvino::{CompiledModel, Core, ElementType, Shape, Tensor};
use parking_lot::Mutex;
use tracing::info;
use anyhow::{Context, Result};

/// Runs one preprocessed tensor through the model and returns the raw output,
/// shaped as the model declares it (class scores on the last axis)
pub trait InferenceBackend: Send + Sync {
    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>>;
}

/// Where a model lives and which device should run it
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub model_path: PathBuf,
    pub device: String,
}

/// Builds a backend for a model, once per process
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn InferenceBackend>>;
}

/// Wrapper for OpenVINO Core that implements Send
struct SafeCore(Core);
unsafe impl Send for SafeCore {}

/// Wrapper for OpenVINO CompiledModel that implements Send
struct SafeCompiledModel(CompiledModel);
unsafe impl Send for SafeCompiledModel {}

/// OpenVINO compiled model.
/// Creating an infer request needs `&mut`, so the model sits behind a mutex.
pub struct OpenVinoBackend {
    _core: Mutex<SafeCore>,
    model: Mutex<SafeCompiledModel>,
}

impl InferenceBackend for OpenVinoBackend {
    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let input_shape = Shape::new(&dims)?;
        let mut tensor = Tensor::new(ElementType::F32, &input_shape)?;

        let contiguous = input.as_standard_layout();
        let values = contiguous
            .as_slice()
            .context("Input tensor is not contiguous")?;
        let raw = tensor.get_raw_data_mut()?;
        if raw.len() != values.len() * 4 {
            anyhow::bail!("Tensor buffer holds {} bytes, expected {}", raw.len(), values.len() * 4);
        }
        for (dst, v) in raw.chunks_exact_mut(4).zip(values) {
            dst.copy_from_slice(&v.to_ne_bytes());
        }

        let mut request = self.model.lock().0.create_infer_request()?;
        request.set_input_tensor(&tensor)?;
        request.infer()?;

        let output = request.get_output_tensor()?;
        let output_dims: Vec<usize> = output
            .get_shape()?
            .get_dimensions()
            .iter()
            .map(|&d| d.max(0) as usize)
            .collect();
        let output_len: usize = output_dims.iter().product();
        let raw = output.get_raw_data()?;

        let scores: Vec<f32> = raw
            .chunks_exact(4)
            .take(output_len)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        tracing::debug!("Emotion model raw output {:?}: {:?}", output_dims, scores);

        ArrayD::from_shape_vec(IxDyn(&output_dims), scores)
            .context("Model output is shorter than its declared shape")
    }
}

/// Loads ONNX or OpenVINO IR models
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenVinoLoader;

impl OpenVinoLoader {
    /// IR models keep their weights in a sibling `.bin`; ONNX needs none
    fn weights_path(model_path: &Path) -> String {
        match model_path.extension().and_then(|e| e.to_str()) {
            Some("xml") => model_path.with_extension("bin").to_string_lossy().into_owned(),
            _ => String::new(),
        }
    }
}

impl ModelLoader for OpenVinoLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn InferenceBackend>> {
        info!("Loading model from {} on {}", spec.model_path.display(), spec.device);
        let start = Instant::now();

        let model_path = spec
            .model_path
            .to_str()
            .context("Model path is not valid UTF-8")?;
        let weights = Self::weights_path(&spec.model_path);

        let mut core = Core::new()?;
        let model = core
            .read_model_from_file(model_path, &weights)
            .with_context(|| format!("Failed to read model {}", model_path))?;
        let compiled = core.compile_model(&model, spec.device.as_str().into())?;

        info!("Model loaded in {:?}", start.elapsed());

        Ok(Box::new(OpenVinoBackend {
            _core: Mutex::new(SafeCore(core)),
            model: Mutex::new(SafeCompiledModel(compiled)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_path_for_ir() {
        let path = Path::new("model/fer.xml");
        assert_eq!(OpenVinoLoader::weights_path(path), "model/fer.bin");
    }

    #[test]
    fn test_weights_path_for_onnx() {
        assert_eq!(OpenVinoLoader::weights_path(Path::new("model/fer.onnx")), "");
    }
}
