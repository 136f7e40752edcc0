//! The embedding provider seam.
//!
//! Face detection, alignment, and embedding extraction are produced by an
//! external model stack. This crate only defines the contract: given an
//! image, return zero or more (box, landmarks, embedding) tuples.

use crate::types::{BoundingBox, Embedding};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Face detection model file expected under the model directory.
pub const DETECTOR_MODEL: &str = "face_detection_yunet_2023mar.onnx";
/// Face embedding model file expected under the model directory.
pub const ENCODER_MODEL: &str = "MobileFaceNet.onnx";

/// Default model directory for system installs.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/tally/models")
}

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// One detected face with its embedding, as produced by the model stack.
#[derive(Debug, Clone)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub embedding: Embedding,
}

/// Contract for the external detector/aligner/encoder pipeline.
///
/// Implementations are stateless with respect to the caller: every call
/// is a pure image → detections mapping.
pub trait EmbeddingProvider {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>, ProviderError>;
}

/// No-op provider used when the model stack is unavailable.
///
/// Returns empty detections so recognition degrades to "no event this
/// cycle" instead of crashing the host process.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<Detection>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Resolve the embedding provider for a deployment.
///
/// The detector/aligner/encoder pipeline is an external component
/// attached by the integrator; missing model files (or a build with no
/// inference backend linked) disable the face pipeline loudly instead
/// of crashing the kiosk. Ledger, roster, and sync keep running.
pub fn resolve_provider(model_dir: &Path) -> Box<dyn EmbeddingProvider + Send> {
    let detector = model_dir.join(DETECTOR_MODEL);
    let encoder = model_dir.join(ENCODER_MODEL);
    if !detector.is_file() || !encoder.is_file() {
        tracing::error!(
            detector = %detector.display(),
            encoder = %encoder.display(),
            "model files not found; face pipeline disabled"
        );
        return Box::new(DisabledProvider);
    }
    // TODO: construct the ONNX pipeline here once the inference backend
    // crate ships; until then model presence alone cannot enable it.
    tracing::error!("no inference backend linked in this build; face pipeline disabled");
    Box::new(DisabledProvider)
}

/// Pick the largest-area detection. Ties break toward the first seen.
pub fn largest_face(detections: &[Detection]) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    let mut best_area = 0.0f32;
    for det in detections {
        let area = det.bounding_box.area();
        if best.is_none() || area > best_area {
            best_area = area;
            best = Some(det);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_detection(w: f32, h: f32, tag: f32) -> Detection {
        Detection {
            bounding_box: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: w,
                height: h,
                confidence: 0.9,
                landmarks: None,
            },
            embedding: Embedding { values: vec![tag] },
        }
    }

    #[test]
    fn test_largest_face_picks_biggest() {
        let dets = vec![
            make_detection(10.0, 10.0, 1.0),
            make_detection(50.0, 50.0, 2.0),
            make_detection(20.0, 20.0, 3.0),
        ];
        let best = largest_face(&dets).unwrap();
        assert_eq!(best.embedding.values, vec![2.0]);
    }

    #[test]
    fn test_largest_face_tie_breaks_first_seen() {
        let dets = vec![
            make_detection(30.0, 30.0, 1.0),
            make_detection(30.0, 30.0, 2.0),
        ];
        let best = largest_face(&dets).unwrap();
        assert_eq!(best.embedding.values, vec![1.0]);
    }

    #[test]
    fn test_largest_face_empty() {
        assert!(largest_face(&[]).is_none());
    }

    #[test]
    fn test_disabled_provider_returns_nothing() {
        let mut provider = DisabledProvider;
        let image = DynamicImage::new_rgb8(4, 4);
        let dets = provider.detect(&image).unwrap();
        assert!(dets.is_empty());
    }
}
