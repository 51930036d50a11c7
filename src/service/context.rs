//! Host context and model signature
//!
//! The model directory carries `signature.json` (input names and shapes) and
//! optionally `synset.txt` (one class label per line).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::engine::ModelSpec;

pub const SIGNATURE_FILE: &str = "signature.json";
pub const SYNSET_FILE: &str = "synset.txt";

/// Execution context handed to the service by the host
#[derive(Debug, Clone)]
pub struct Context {
    pub model_name: String,
    pub model_dir: PathBuf,
    pub model_file: String,
    pub device: String,
    pub batch_size: usize,
    /// Labels used when the model directory has no synset file
    pub default_labels: Vec<String>,
}

impl Context {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            model_name: config.name.clone(),
            model_dir: config.dir.clone(),
            model_file: config.file.clone(),
            device: config.device.clone(),
            batch_size: config.batch_size.max(1),
            default_labels: config.labels.clone(),
        }
    }

    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec {
            model_path: self.model_dir.join(&self.model_file),
            device: self.device.clone(),
        }
    }

    /// Labels from the synset file, or the configured defaults
    pub fn labels(&self) -> Result<Vec<String>> {
        let synset = self.model_dir.join(SYNSET_FILE);
        if synset.is_file() {
            load_labels(&synset)
        } else {
            tracing::info!("No {} in {}, using configured labels", SYNSET_FILE, self.model_dir.display());
            Ok(self.default_labels.clone())
        }
    }
}

/// Name and shape of one model tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub data_name: String,
    pub data_shape: Vec<usize>,
}

/// Model signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub inputs: Vec<TensorSpec>,
    #[serde(default)]
    pub outputs: Vec<TensorSpec>,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub output_type: Option<String>,
}

impl Signature {
    /// Read `signature.json` from a model directory
    pub fn load(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join(SIGNATURE_FILE);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let signature: Signature = serde_json::from_str(&content)
            .with_context(|| format!("Invalid signature {}", path.display()))?;
        if signature.inputs.is_empty() {
            anyhow::bail!("Signature {} declares no inputs", path.display());
        }
        Ok(signature)
    }

    /// Pin the batch dimension to `batch_size` and turn unknown (0) dimensions into 1
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        for input in &mut self.inputs {
            if let Some(batch) = input.data_shape.first_mut() {
                *batch = batch_size;
            }
            for dim in input.data_shape.iter_mut() {
                if *dim == 0 {
                    *dim = 1;
                }
            }
        }
        self
    }

    /// The input every request item is fed to
    pub fn primary_input(&self) -> Result<&TensorSpec> {
        self.inputs.first().context("Signature declares no inputs")
    }
}

/// Load class labels, one per line
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut labels = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SIGNATURE: &str = r#"{
        "inputs": [{"data_name": "data", "data_shape": [0, 1, 64, 64]}],
        "input_type": "image/jpeg",
        "outputs": [{"data_name": "softmax", "data_shape": [0, 8]}],
        "output_type": "application/json"
    }"#;

    fn context(dir: &Path) -> Context {
        Context {
            model_name: "fer".to_string(),
            model_dir: dir.to_path_buf(),
            model_file: "fer.onnx".to_string(),
            device: "CPU".to_string(),
            batch_size: 1,
            default_labels: vec!["fallback".to_string()],
        }
    }

    #[test]
    fn test_signature_batch_and_zero_dims() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SIGNATURE_FILE), SIGNATURE).unwrap();

        let signature = Signature::load(dir.path()).unwrap().with_batch_size(1);
        let input = signature.primary_input().unwrap();
        assert_eq!(input.data_name, "data");
        assert_eq!(input.data_shape, vec![1, 1, 64, 64]);
        assert_eq!(signature.outputs[0].data_shape, vec![0, 8]);
    }

    #[test]
    fn test_signature_missing() {
        let dir = tempdir().unwrap();
        assert!(Signature::load(dir.path()).is_err());
    }

    #[test]
    fn test_signature_without_inputs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SIGNATURE_FILE), r#"{"inputs": []}"#).unwrap();
        assert!(Signature::load(dir.path()).is_err());
    }

    #[test]
    fn test_labels_from_synset() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SYNSET_FILE), "happy\n  sad \n\nneutral\n").unwrap();

        let labels = context(dir.path()).labels().unwrap();
        assert_eq!(labels, vec!["happy", "sad", "neutral"]);
    }

    #[test]
    fn test_labels_default_without_synset() {
        let dir = tempdir().unwrap();
        let labels = context(dir.path()).labels().unwrap();
        assert_eq!(labels, vec!["fallback"]);
    }

    #[test]
    fn test_model_spec_path() {
        let ctx = context(Path::new("/srv/model"));
        assert_eq!(ctx.model_spec().model_path, PathBuf::from("/srv/model/fer.onnx"));
    }
}
