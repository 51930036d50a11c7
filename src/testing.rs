//! Test doubles and fixtures shared by the unit tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};
use tempfile::TempDir;

use crate::engine::backend::{InferenceBackend, ModelLoader, ModelSpec};
use crate::engine::detector::{FaceLocator, FaceRegion};
use crate::service::context::{Context, SIGNATURE_FILE, SYNSET_FILE};
use crate::utils::image::encode_png;

/// Locator that always reports the same region (clamped to the image), or none
pub struct StubLocator {
    region: Option<FaceRegion>,
}

impl StubLocator {
    pub fn found(region: FaceRegion) -> Self {
        Self { region: Some(region) }
    }

    pub fn missing() -> Self {
        Self { region: None }
    }
}

impl FaceLocator for StubLocator {
    fn locate(&self, gray: &GrayImage) -> Result<Option<FaceRegion>> {
        let (w, h) = gray.dimensions();
        Ok(self.region.and_then(|r| FaceRegion::clamped(r.x as i32, r.y as i32, r.width, r.height, w, h)))
    }
}

#[derive(Clone)]
enum StubScores {
    Fixed(ArrayD<f32>),
    MeanIntensity,
    Fail,
}

struct StubBackend {
    mode: StubScores,
}

impl InferenceBackend for StubBackend {
    fn infer(&self, input: &ArrayD<f32>) -> Result<ArrayD<f32>> {
        match &self.mode {
            StubScores::Fixed(output) => Ok(output.clone()),
            StubScores::MeanIntensity => {
                let mean = input.mean().unwrap_or(0.0);
                let scores = if mean > 0.5 { vec![5.0, 0.0, 0.0] } else { vec![0.0, 0.0, 5.0] };
                Ok(ArrayD::from_shape_vec(IxDyn(&[3]), scores)?)
            }
            StubScores::Fail => anyhow::bail!("stub backend failure"),
        }
    }
}

/// Loader producing stub backends; counts how often it was asked to load
#[derive(Clone)]
pub struct StubLoader {
    mode: StubScores,
    loads: Arc<AtomicUsize>,
}

impl StubLoader {
    /// Every inference returns `scores` as a flat output
    pub fn fixed(scores: Vec<f32>) -> Self {
        let len = scores.len();
        Self::shaped(&[len], scores)
    }

    /// Every inference returns `scores` laid out in `shape`
    pub fn shaped(shape: &[usize], scores: Vec<f32>) -> Self {
        let output = ArrayD::from_shape_vec(IxDyn(shape), scores).unwrap();
        Self::with_mode(StubScores::Fixed(output))
    }

    /// Bright inputs score class 0, dark inputs class 2
    pub fn by_mean_intensity() -> Self {
        Self::with_mode(StubScores::MeanIntensity)
    }

    /// Every inference fails
    pub fn failing() -> Self {
        Self::with_mode(StubScores::Fail)
    }

    fn with_mode(mode: StubScores) -> Self {
        Self {
            mode,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for StubLoader {
    fn load(&self, _spec: &ModelSpec) -> Result<Box<dyn InferenceBackend>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubBackend {
            mode: self.mode.clone(),
        }))
    }
}

/// Model directory with a signature declaring input `image` of `shape`
pub fn model_dir(shape: &[usize], labels: Option<&[&str]>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let signature = serde_json::json!({
        "inputs": [{"data_name": "image", "data_shape": shape}],
        "input_type": "image/png",
        "outputs": [{"data_name": "softmax", "data_shape": [0, 3]}],
        "output_type": "application/json"
    });
    std::fs::write(dir.path().join(SIGNATURE_FILE), signature.to_string()).unwrap();
    if let Some(labels) = labels {
        std::fs::write(dir.path().join(SYNSET_FILE), labels.join("\n")).unwrap();
    }
    dir
}

pub fn test_context(dir: &Path) -> Context {
    Context {
        model_name: "fer".to_string(),
        model_dir: dir.to_path_buf(),
        model_file: "fer.onnx".to_string(),
        device: "CPU".to_string(),
        batch_size: 1,
        default_labels: vec!["happy".to_string(), "sad".to_string(), "neutral".to_string()],
    }
}

/// PNG with a bright square on a dark background
pub fn face_image_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        if x > width / 4 && x < width * 3 / 4 && y > height / 4 && y < height * 3 / 4 {
            Rgb([220, 200, 180])
        } else {
            Rgb([30, 30, 30])
        }
    });
    encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
}

/// PNG of a single gray level
pub fn flat_image_png(width: u32, height: u32, level: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([level, level, level]));
    encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
}
