//! Per-frame identity matching against the enrolled gallery.

use crate::types::{Embedding, GalleryEntry};

/// Result of matching a probe embedding against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best gallery row, in [-1, 1].
    pub similarity: f32,
    pub identity_id: Option<String>,
    pub display_name: Option<String>,
}

impl MatchResult {
    fn unknown(similarity: f32) -> MatchResult {
        MatchResult {
            matched: false,
            similarity,
            identity_id: None,
            display_name: None,
        }
    }
}

/// Strategy for comparing a probe embedding against the gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchResult;
}

/// Cosine similarity arg-max over every gallery row.
///
/// Ties break toward the first-seen row (scanning order), and a score
/// must strictly exceed the threshold to count as a match. An empty
/// gallery matches nothing.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let sim = probe.similarity(&entry.embedding);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim > threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                identity_id: Some(gallery[idx].identity_id.clone()),
                display_name: Some(gallery[idx].display_name.clone()),
            },
            Some(_) => MatchResult::unknown(best_sim),
            None => MatchResult::unknown(0.0),
        }
    }
}
