//! FER Service - request pipeline
//!
//! A `FerService` only exists once its signature, labels and model are
//! loaded, so every stage below runs against a ready model.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use ndarray::ArrayD;
use tracing::{info, warn};

use crate::engine::backend::{InferenceBackend, ModelLoader};
use crate::engine::detector::FaceLocator;
use crate::engine::postprocess::{self, Prediction};
use crate::engine::preprocess::{decode_image, image_to_tensor, InputError, PixelRange};

use super::context::{Context, Signature};
use super::types::RequestItem;

/// Facial emotion recognition service
pub struct FerService {
    signature: Signature,
    labels: Vec<String>,
    locator: Arc<dyn FaceLocator>,
    backend: Box<dyn InferenceBackend>,
    pixel_range: PixelRange,
}

impl FerService {
    /// Load signature, labels and model for the context
    pub fn initialize(
        context: &Context,
        locator: Arc<dyn FaceLocator>,
        loader: &dyn ModelLoader,
        pixel_range: PixelRange,
    ) -> Result<Self> {
        let signature = Signature::load(&context.model_dir)?.with_batch_size(context.batch_size);
        let labels = context.labels()?;
        let backend = loader.load(&context.model_spec())?;

        info!(
            "Model {} initialized: input {:?}, {} labels",
            context.model_name,
            signature.primary_input()?.data_shape,
            labels.len()
        );

        Ok(Self {
            signature,
            labels,
            locator,
            backend,
            pixel_range,
        })
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Turn each request item into a tensor of the declared input shape.
    ///
    /// A missing/empty payload or an undecodable image rejects the whole
    /// batch with an [`InputError`]. Other failures propagate as is.
    pub fn preprocess(&self, request: &[RequestItem]) -> Result<Vec<ArrayD<f32>>> {
        let input = self.signature.primary_input()?;
        let mut tensors = Vec::with_capacity(request.len());

        for item in request {
            let payload = item.payload(&input.data_name)?;

            let image = match decode_image(payload) {
                Ok(image) => image,
                Err(e) => {
                    warn!("Failed to decode image input: {:#}", e);
                    return Err(InputError::Corrupted.into());
                }
            };

            let tensor = image_to_tensor(self.locator.as_ref(), &image, &input.data_shape, self.pixel_range)?;
            tensors.push(tensor);
        }

        Ok(tensors)
    }

    /// Run every tensor through the model, keeping the class scores of the
    /// first batch row of each output
    pub fn inference(&self, tensors: &[ArrayD<f32>]) -> Result<Vec<Vec<f32>>> {
        let expected = &self.signature.primary_input()?.data_shape;
        let batch = expected.first().copied().unwrap_or(1);

        tensors
            .iter()
            .map(|tensor| {
                if tensor.shape() != expected.as_slice() {
                    anyhow::bail!(
                        "Input shape mismatch: expected {:?}, got {:?}",
                        expected,
                        tensor.shape()
                    );
                }
                let output = self.backend.infer(tensor)?;
                Ok(postprocess::first_row(&output, batch))
            })
            .collect()
    }

    /// Softmax and label each item's scores
    pub fn postprocess(&self, scores: &[Vec<f32>]) -> Vec<Prediction> {
        postprocess::postprocess(scores, &self.labels)
    }

    /// Full pipeline with per-stage timings
    pub fn handle(&self, request: &[RequestItem]) -> Result<Vec<Prediction>> {
        let preprocess_start = Instant::now();
        let tensors = self.preprocess(request)?;

        let inference_start = Instant::now();
        let scores = self.inference(&tensors)?;

        let postprocess_start = Instant::now();
        let predictions = self.postprocess(&scores);
        let end = Instant::now();

        info!(
            PreprocessTime = (inference_start - preprocess_start).as_secs_f64() * 1000.0,
            InferenceTime = (postprocess_start - inference_start).as_secs_f64() * 1000.0,
            PostprocessTime = (end - postprocess_start).as_secs_f64() * 1000.0,
            "Handled batch of {} items",
            request.len()
        );

        Ok(predictions)
    }
}
