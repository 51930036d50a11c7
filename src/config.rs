//! FER service configuration

use serde::Deserialize;
use std::path::PathBuf;

use crate::engine::postprocess::Emotion;
use crate::engine::preprocess::PixelRange;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub detector: DetectorConfig,
    pub preprocess: PreprocessConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Name the model is served under (`/predictions/{name}`)
    pub name: String,
    /// Directory holding `signature.json`, `synset.txt` and the model file
    pub dir: PathBuf,
    pub file: String,
    pub device: String,
    pub batch_size: usize,
    /// Used when the model directory has no synset file
    pub labels: Vec<String>,
}

/// Face detection engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// SeetaFace funnel cascade (pure Rust)
    #[default]
    Funnel,
    /// OpenCV Haar cascade, needs the `haar` feature
    Haar,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub backend: DetectorBackend,
    /// Funnel cascade model
    pub model_path: PathBuf,
    /// Haar cascade XML
    #[serde(default = "default_cascade_path")]
    pub cascade_path: PathBuf,
    /// Size ratio between consecutive pyramid levels (> 1.0)
    pub scale_factor: f32,
    /// Haar only: overlapping detections needed to keep a face
    #[serde(default = "default_min_neighbors")]
    pub min_neighbors: i32,
    pub min_face_size: u32,
    /// Funnel only
    pub score_threshold: f64,
    /// Funnel only
    pub slide_window_step: u32,
}

fn default_cascade_path() -> PathBuf {
    PathBuf::from("models/haarcascade_frontalface_default.xml")
}

fn default_min_neighbors() -> i32 {
    5
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Funnel,
            model_path: PathBuf::from("models/seeta_fd_frontal_v1.0.bin"),
            cascade_path: default_cascade_path(),
            scale_factor: 1.3,
            min_neighbors: default_min_neighbors(),
            min_face_size: 20,
            score_threshold: 2.0,
            slide_window_step: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessConfig {
    pub pixel_range: PixelRange,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { port: 8080 },
            model: ModelConfig {
                name: "fer".to_string(),
                dir: PathBuf::from("model"),
                file: "fer.onnx".to_string(),
                device: "CPU".to_string(),
                batch_size: 1,
                labels: Emotion::ALL.iter().map(|e| e.as_str().to_string()).collect(),
            },
            detector: DetectorConfig::default(),
            preprocess: PreprocessConfig {
                pixel_range: PixelRange::Unit,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            [server]
            port = 9000

            [model]
            name = "emotion"
            dir = "/srv/model"
            file = "fer.xml"
            device = "GPU"
            batch_size = 1
            labels = ["happy", "sad", "neutral"]

            [detector]
            model_path = "cascade.bin"
            scale_factor = 1.3
            min_face_size = 24
            score_threshold = 2.5
            slide_window_step = 4

            [preprocess]
            pixel_range = "raw"
        "#;

        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.model.name, "emotion");
        assert_eq!(config.model.labels.len(), 3);
        assert_eq!(config.detector.min_face_size, 24);
        assert_eq!(config.detector.backend, DetectorBackend::Funnel);
        assert_eq!(config.detector.min_neighbors, 5);
        assert_eq!(config.preprocess.pixel_range, PixelRange::Raw);
    }

    #[test]
    fn test_default_labels_follow_ferplus_order() {
        let config = Config::default();
        assert_eq!(config.model.labels.len(), 8);
        assert_eq!(config.model.labels[0], "neutral");
        assert_eq!(config.model.labels[7], "contempt");
        assert!((config.detector.scale_factor - 1.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_haar_detector() {
        let text = r#"
            backend = "haar"
            model_path = "unused.bin"
            cascade_path = "haarcascade_frontalface_default.xml"
            scale_factor = 1.3
            min_neighbors = 5
            min_face_size = 30
            score_threshold = 2.0
            slide_window_step = 4
        "#;

        let detector: DetectorConfig = toml::from_str(text).unwrap();
        assert_eq!(detector.backend, DetectorBackend::Haar);
        assert_eq!(detector.cascade_path, PathBuf::from("haarcascade_frontalface_default.xml"));
        assert_eq!(detector.min_neighbors, 5);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load("/nonexistent/fer-config.toml").is_err());
    }
}
