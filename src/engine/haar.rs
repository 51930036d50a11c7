//! Haar cascade face locator (OpenCV)
//!
//! Multi-scale sliding-window detection with neighbor grouping, the classic
//! `detectMultiScale` behavior: a face is kept only when at least
//! `min_neighbors` overlapping windows agree on it.

use anyhow::{Context, Result};
use image::GrayImage;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use parking_lot::Mutex;

use crate::config::DetectorConfig;

use super::detector::{FaceLocator, FaceRegion};

pub struct HaarFaceLocator {
    // detect_multi_scale needs `&mut`
    classifier: Mutex<CascadeClassifier>,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: i32,
}

impl HaarFaceLocator {
    /// Load the cascade XML named by `cascade_path`
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        if config.scale_factor.is_nan() || config.scale_factor <= 1.0 {
            anyhow::bail!("Detector scale factor must be greater than 1.0, got {}", config.scale_factor);
        }

        let path = config
            .cascade_path
            .to_str()
            .context("Cascade path is not valid UTF-8")?;
        let classifier = CascadeClassifier::new(path)
            .with_context(|| format!("Failed to load Haar cascade {}", path))?;
        if classifier.empty()? {
            anyhow::bail!("Haar cascade {} is empty", path);
        }

        tracing::info!(
            "Haar cascade loaded from {} (scale {}, min neighbors {})",
            path,
            config.scale_factor,
            config.min_neighbors
        );

        Ok(Self {
            classifier: Mutex::new(classifier),
            scale_factor: config.scale_factor as f64,
            min_neighbors: config.min_neighbors.max(0),
            min_size: i32::try_from(config.min_face_size).unwrap_or(i32::MAX),
        })
    }
}

impl FaceLocator for HaarFaceLocator {
    fn locate(&self, gray: &GrayImage) -> Result<Option<FaceRegion>> {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }

        let rows = i32::try_from(height).context("Image too tall for OpenCV")?;
        let mat = Mat::from_slice(gray.as_raw())?.reshape(1, rows)?.try_clone()?;

        let mut faces = Vector::<Rect>::new();
        self.classifier.lock().detect_multi_scale(
            &mat,
            &mut faces,
            self.scale_factor,
            self.min_neighbors,
            0,
            Size::new(self.min_size, self.min_size),
            Size::new(0, 0),
        )?;
        tracing::debug!("Haar cascade found {} faces", faces.len());

        Ok(faces.iter().next().and_then(|r| {
            FaceRegion::clamped(r.x, r.y, r.width.max(0) as u32, r.height.max(0) as u32, width, height)
        }))
    }
}
