//! Image preprocessing for the emotion model
//!
//! Turns a decoded image into a grayscale face tensor with exactly the
//! model's declared NCHW input shape.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;
use thiserror::Error;
use anyhow::{Context, Result};

use super::detector::{crop_face, FaceLocator};

/// Request input that cannot be turned into a tensor.
/// Either kind rejects the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Empty image input")]
    Empty,
    #[error("Corrupted image input")]
    Corrupted,
}

/// Value range of the pixels written into the tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelRange {
    /// Intensities scaled to [0, 1]
    Unit,
    /// Raw intensities [0, 255]
    Raw,
}

impl PixelRange {
    fn scale(self, value: u8) -> f32 {
        match self {
            PixelRange::Unit => value as f32 / 255.0,
            PixelRange::Raw => value as f32,
        }
    }
}

/// Decode image from bytes with EXIF orientation handling
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(data)?;

    let oriented_image = apply_exif_orientation(data, image);

    Ok(oriented_image)
}

/// Apply EXIF orientation to correct image rotation
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    };

    // See: https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Target (height, width) of an NCHW input shape
pub fn target_size(shape: &[usize]) -> Result<(u32, u32)> {
    if shape.len() < 4 {
        anyhow::bail!("Expected a 4-dimensional NCHW input shape, got {:?}", shape);
    }
    let h = shape[shape.len() - 2];
    let w = shape[shape.len() - 1];
    if h == 0 || w == 0 {
        anyhow::bail!("Input shape {:?} has an empty spatial dimension", shape);
    }
    let height = u32::try_from(h).with_context(|| format!("Input height {} is out of range", h))?;
    let width = u32::try_from(w).with_context(|| format!("Input width {} is out of range", w))?;
    Ok((height, width))
}

/// Grayscale plane of size (height, width) for the model.
///
/// Crops the detected face when there is one, otherwise uses the whole
/// image. Both branches are resized to the target size.
pub fn face_plane(locator: &dyn FaceLocator, image: &DynamicImage, (height, width): (u32, u32)) -> Result<GrayImage> {
    let plane = match crop_face(locator, image)? {
        Some(face) => face,
        None => {
            tracing::debug!("No face found, using the full {}x{} image", image.width(), image.height());
            image.to_luma8()
        }
    };

    if plane.dimensions() == (width, height) {
        return Ok(plane);
    }

    Ok(image::imageops::resize(&plane, width, height, FilterType::Triangle))
}

/// Fill a tensor of `shape` from a grayscale plane.
///
/// Pixels are taken in row-major order and repeated cyclically when the shape
/// holds more elements than the plane (e.g. several channels), truncated when
/// it holds fewer. An empty plane yields zeros.
pub fn fill_shape(plane: &GrayImage, shape: &[usize], range: PixelRange) -> Result<ArrayD<f32>> {
    let total: usize = shape.iter().product();
    let pixels = plane.as_raw();

    let data: Vec<f32> = if pixels.is_empty() {
        vec![0.0; total]
    } else {
        pixels.iter().cycle().take(total).map(|&p| range.scale(p)).collect()
    };

    Ok(ArrayD::from_shape_vec(IxDyn(shape), data)?)
}

/// Full preprocessing of one decoded image into a model-ready tensor
pub fn image_to_tensor(
    locator: &dyn FaceLocator,
    image: &DynamicImage,
    shape: &[usize],
    range: PixelRange,
) -> Result<ArrayD<f32>> {
    let size = target_size(shape)?;
    let plane = face_plane(locator, image, size)?;
    fill_shape(&plane, shape, range)
}
