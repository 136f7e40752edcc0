//! tally-core — Domain logic for the attendance kiosk.
//!
//! Embedding and detection types, the per-frame cosine matcher, and the
//! temporal debounce that turns noisy frame-by-frame decisions into a
//! single confirmed attendance event per person.

pub mod debounce;
pub mod matcher;
pub mod provider;
pub mod source;
pub mod types;

pub use debounce::{ConfirmedEvent, DebounceConfig, DebounceTracker, Sighting};
pub use matcher::{CosineMatcher, MatchResult, Matcher};
pub use provider::{Detection, DisabledProvider, EmbeddingProvider, ProviderError};
pub use source::{FrameSource, IdleSource, SourceError};
pub use types::{BoundingBox, Embedding, GalleryEntry, Identity};
