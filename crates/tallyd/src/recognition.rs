//! The recognition actor.
//!
//! Runs on a dedicated OS thread because frame acquisition and inference
//! both block. Each processed frame flows match → debounce → ledger; the
//! debounce state never leaves this thread. Galleries arrive over a
//! watch channel whenever an enrollment scan changes the store.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tally_core::{
    CosineMatcher, DebounceConfig, DebounceTracker, EmbeddingProvider, FrameSource, GalleryEntry,
    Matcher, Sighting,
};
use tally_store::Store;
use tokio::sync::watch;

/// How long to idle when the source has no frame ready.
const NO_FRAME_BACKOFF: Duration = Duration::from_millis(100);
/// How long to back off after a source error.
const SOURCE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct RecognitionConfig {
    pub threshold: f32,
    pub frame_skip: u32,
    pub debounce: DebounceConfig,
}

/// Spawn the recognition loop on its own thread.
pub fn spawn_recognition(
    store: Arc<Store>,
    device_id: String,
    mut source: Box<dyn FrameSource + Send>,
    mut provider: Box<dyn EmbeddingProvider + Send>,
    mut gallery_rx: watch::Receiver<Arc<Vec<GalleryEntry>>>,
    config: RecognitionConfig,
    shutdown: watch::Receiver<bool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("tally-recognition".into())
        .spawn(move || {
            tracing::info!("recognition thread started");
            let matcher = CosineMatcher;
            let mut tracker = DebounceTracker::new(config.debounce);
            let mut gallery = gallery_rx.borrow().clone();
            let mut frame_counter: u64 = 0;

            while !*shutdown.borrow() {
                if gallery_rx.has_changed().unwrap_or(false) {
                    gallery = gallery_rx.borrow_and_update().clone();
                    tracing::info!(entries = gallery.len(), "gallery reloaded");
                }

                let frame = match source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        std::thread::sleep(NO_FRAME_BACKOFF);
                        continue;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "frame acquisition failed");
                        std::thread::sleep(SOURCE_ERROR_BACKOFF);
                        continue;
                    }
                };

                // Inference throttle: trade recognition latency for CPU.
                frame_counter += 1;
                if config.frame_skip > 1 && frame_counter % config.frame_skip as u64 != 0 {
                    continue;
                }

                let detections = match provider.detect(&frame) {
                    Ok(detections) => detections,
                    Err(err) => {
                        tracing::warn!(error = %err, "inference failed, no event this frame");
                        continue;
                    }
                };

                let mut sightings = Vec::new();
                for detection in &detections {
                    let result = matcher.compare(&detection.embedding, &gallery, config.threshold);
                    if result.matched {
                        if let (Some(identity_id), Some(display_name)) =
                            (result.identity_id, result.display_name)
                        {
                            sightings.push(Sighting {
                                identity_id,
                                display_name,
                                score: result.similarity,
                            });
                        }
                    }
                }

                for event in tracker.observe(&sightings, Instant::now()) {
                    let now = chrono::Local::now().naive_local();
                    if let Err(err) = store.record_punch(
                        &event.identity_id,
                        &event.display_name,
                        &device_id,
                        now,
                        event.confidence,
                    ) {
                        tracing::warn!(
                            identity = %event.identity_id,
                            error = %err,
                            "failed to record punch"
                        );
                    }
                }
            }
            tracing::info!("recognition thread exiting");
        })
        .expect("failed to spawn recognition thread")
}
