//! Emotion postprocessing
//!
//! Converts raw per-item class scores into labeled probabilities.

use ndarray::ArrayD;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::utils::math::{argmax, softmax};

/// Emotion classes of the FER+ model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Neutral,
    Happy,
    Surprise,
    Sad,
    Angry,
    Disgust,
    Fear,
    Contempt,
}

impl Emotion {
    /// FER+ output order
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Surprise,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Contempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Surprise => "surprise",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Contempt => "contempt",
        }
    }
}

/// One label with its probability, serialized as `{"<label>": <probability>}`
#[derive(Debug, Clone, PartialEq)]
pub struct LabelProbability {
    pub label: String,
    pub probability: f32,
}

impl Serialize for LabelProbability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.label, &self.probability)?;
        map.end()
    }
}

/// Labeled probabilities of one request item, in label order
pub type Prediction = Vec<LabelProbability>;

/// Pair probabilities with labels by index.
/// Pairs stop at the shorter of the two lists.
pub fn label_probabilities(probabilities: &[f32], labels: &[String]) -> Prediction {
    labels
        .iter()
        .zip(probabilities)
        .map(|(label, &probability)| LabelProbability {
            label: label.clone(),
            probability,
        })
        .collect()
}

/// Class scores of the first batch row of a model output.
///
/// Classes run along the last axis. A flat output holding `batch` rows is
/// split into equal rows.
pub fn first_row(output: &ArrayD<f32>, batch: usize) -> Vec<f32> {
    let classes = match output.shape() {
        [] => 1,
        [len] if batch > 1 && len % batch == 0 => len / batch,
        [len] => *len,
        shape => shape[shape.len() - 1],
    };
    output.iter().take(classes).copied().collect()
}

/// Softmax each item's scores and label them.
/// Every item is paired with its own scores; output order follows input order.
pub fn postprocess(scores: &[Vec<f32>], labels: &[String]) -> Vec<Prediction> {
    scores
        .iter()
        .map(|item| {
            let probabilities = softmax(item);
            if let Some(label) = labels.get(argmax(&probabilities)) {
                tracing::debug!("Top emotion: {}", label);
            }
            label_probabilities(&probabilities, labels)
        })
        .collect()
}
