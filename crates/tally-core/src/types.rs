use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box area in square pixels. Degenerate boxes clamp to zero.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Clip the box to the bounds of a `width` × `height` image.
    pub fn clipped(&self, width: u32, height: u32) -> BoundingBox {
        let x = self.x.clamp(0.0, width as f32);
        let y = self.y.clamp(0.0, height as f32);
        BoundingBox {
            x,
            y,
            width: self.width.min(width as f32 - x).max(0.0),
            height: self.height.min(height as f32 - y).max(0.0),
            confidence: self.confidence,
            landmarks: self.landmarks,
        }
    }
}

/// Face embedding vector, unit-normalized by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Both sides are
    /// unit-norm in practice, but the full cosine form keeps the result
    /// correct for vectors that are not.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// An enrolled person. Derived from the enrollment directory key
/// (`"12_Alice"` → id `"12"`, name `"Alice"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub identity_id: String,
    pub display_name: String,
}

/// One gallery row: an enrolled identity and one of its embeddings.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity_id: String,
    pub display_name: String,
    pub embedding: Embedding,
}
