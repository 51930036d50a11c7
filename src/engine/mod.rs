//! Emotion inference engine
//!
//! Provides the pieces the FER service chains together:
//! - Cascade face location and cropping (funnel, or Haar with `haar`)
//! - Tensor preprocessing to the model's declared shape
//! - Pluggable inference backend (OpenVINO)
//! - Softmax and label postprocessing

pub mod backend;
pub mod detector;
#[cfg(feature = "haar")]
pub mod haar;
pub mod postprocess;
pub mod preprocess;

pub use backend::{InferenceBackend, ModelLoader, ModelSpec, OpenVinoLoader};
pub use detector::{load_locator, CascadeFaceLocator, FaceLocator, FaceRegion, FunnelSettings};
pub use postprocess::{LabelProbability, Prediction};
pub use preprocess::{InputError, PixelRange};
