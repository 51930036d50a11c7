//! Cascade Face Locator
//!
//! Finds the first frontal face in an image with a pretrained funnel
//! cascade (SeetaFace model via `rustface`). The model file is read once and
//! shared; every call builds a fresh detector from it.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage};

use crate::config::{DetectorBackend, DetectorConfig};

/// Face region in grayscale image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    /// Clamp a raw detector box to the image bounds.
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamped(x: i32, y: i32, width: u32, height: u32, img_w: u32, img_h: u32) -> Option<Self> {
        let x1 = (x as i64).clamp(0, img_w as i64);
        let y1 = (y as i64).clamp(0, img_h as i64);
        let x2 = (x as i64 + width as i64).clamp(0, img_w as i64);
        let y2 = (y as i64 + height as i64).clamp(0, img_h as i64);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(Self {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// Pluggable face locator
pub trait FaceLocator: Send + Sync {
    /// Locate the first face in a grayscale image
    fn locate(&self, gray: &GrayImage) -> Result<Option<FaceRegion>>;
}

/// Search parameters of the funnel cascade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunnelSettings {
    pub pyramid_scale: f32,
    pub min_face_size: u32,
    pub score_threshold: f64,
    pub window_step: u32,
}

impl FunnelSettings {
    /// The cascade cannot search windows below 20px or with a zero step
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            pyramid_scale: pyramid_scale(config.scale_factor)?,
            min_face_size: config.min_face_size.max(20),
            score_threshold: config.score_threshold,
            window_step: config.slide_window_step.max(1),
        })
    }

    /// Whether an image of this size can hold a face at all
    pub fn admits(&self, width: u32, height: u32) -> bool {
        width >= self.min_face_size && height >= self.min_face_size
    }
}

/// Face locator backed by a pretrained SeetaFace cascade model
pub struct CascadeFaceLocator {
    model: rustface::Model,
    settings: FunnelSettings,
}

impl CascadeFaceLocator {
    /// Load the cascade model from disk
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        let file = File::open(&config.model_path)
            .with_context(|| format!("Failed to open face model {}", config.model_path.display()))?;
        let model = rustface::read_model(BufReader::new(file))
            .with_context(|| format!("Failed to parse face model {}", config.model_path.display()))?;

        tracing::info!("Face cascade loaded from {}", config.model_path.display());

        Self::with_model(model, config)
    }

    /// Build a locator from an already parsed model
    pub fn with_model(model: rustface::Model, config: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            model,
            settings: FunnelSettings::from_config(config)?,
        })
    }

    pub fn settings(&self) -> &FunnelSettings {
        &self.settings
    }
}

impl FaceLocator for CascadeFaceLocator {
    fn locate(&self, gray: &GrayImage) -> Result<Option<FaceRegion>> {
        let (width, height) = gray.dimensions();

        // Images smaller than the minimum face leave an empty pyramid
        if !self.settings.admits(width, height) {
            return Ok(None);
        }

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.settings.min_face_size);
        detector.set_score_thresh(self.settings.score_threshold);
        detector.set_pyramid_scale_factor(self.settings.pyramid_scale);
        detector.set_slide_window_step(self.settings.window_step, self.settings.window_step);

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));
        tracing::debug!("Cascade found {} candidate faces", faces.len());

        Ok(faces.first().and_then(|face| {
            let bbox = face.bbox();
            FaceRegion::clamped(bbox.x(), bbox.y(), bbox.width(), bbox.height(), width, height)
        }))
    }
}

/// Build the locator selected by `[detector] backend`
pub fn load_locator(config: &DetectorConfig) -> Result<Arc<dyn FaceLocator>> {
    match config.backend {
        DetectorBackend::Funnel => Ok(Arc::new(CascadeFaceLocator::load(config)?)),
        #[cfg(feature = "haar")]
        DetectorBackend::Haar => Ok(Arc::new(super::haar::HaarFaceLocator::load(config)?)),
        #[cfg(not(feature = "haar"))]
        DetectorBackend::Haar => anyhow::bail!("Haar cascade detection requires the `haar` feature"),
    }
}

/// Convert an OpenCV-style scale factor (> 1, image shrinks by it per level)
/// into the pyramid ratio the funnel cascade expects (in (0, 1)).
fn pyramid_scale(scale_factor: f32) -> Result<f32> {
    if scale_factor.is_nan() || scale_factor <= 1.0 {
        anyhow::bail!("Detector scale factor must be greater than 1.0, got {}", scale_factor);
    }
    Ok((1.0 / scale_factor).clamp(0.01, 0.99))
}

/// Attempt to find a face in a color image.
///
/// Converts to grayscale and returns the cropped face region of the
/// grayscale image, or `None` if no face is found.
pub fn crop_face(locator: &dyn FaceLocator, image: &DynamicImage) -> Result<Option<GrayImage>> {
    let gray = image.to_luma8();
    let region = locator.locate(&gray)?;

    Ok(region.map(|r| {
        tracing::debug!("Face region at ({}, {}) size {}x{}", r.x, r.y, r.width, r.height);
        image::imageops::crop_imm(&gray, r.x, r.y, r.width, r.height).to_image()
    }))
}
