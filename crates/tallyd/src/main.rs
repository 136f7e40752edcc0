use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tally_core::provider::resolve_provider;
use tally_core::{DebounceConfig, EmbeddingProvider, GalleryEntry, IdleSource};
use tally_store::{Store, StoreError};
use tally_sync::{run_roster_listener, spawn_broker, BrokerConfig, SyncConfig, SyncEngine};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod recognition;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(device_id = %config.device_id, "tallyd starting");

    let store = Arc::new(Store::open(&config.db_path)?);
    tracing::info!(path = %config.db_path.display(), "store opened");

    // Startup enrollment scan: reconcile deletions, pick up new images.
    let mut scan_provider = resolve_provider(&config.model_dir);
    run_scan(&store, &config.enrollment_dir, scan_provider.as_mut());

    let gallery = Arc::new(store.load_gallery()?);
    tracing::info!(entries = gallery.len(), "gallery loaded");

    let (gallery_tx, gallery_rx) = watch::channel(gallery);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Recognition runs on its own thread; frame acquisition blocks.
    let recognition_thread = recognition::spawn_recognition(
        store.clone(),
        config.device_id.clone(),
        Box::new(IdleSource),
        resolve_provider(&config.model_dir),
        gallery_rx,
        recognition::RecognitionConfig {
            threshold: config.recognition_threshold,
            frame_skip: config.frame_skip,
            debounce: DebounceConfig {
                verification_frames: config.verification_frames,
                cooldown: Duration::from_secs(config.cooldown_secs),
            },
        },
        shutdown_rx.clone(),
    );

    // Broker session plus the two sync-side actors.
    let (broker, roster_rx) = spawn_broker(
        BrokerConfig {
            device_id: config.device_id.clone(),
            host: config.broker_host.clone(),
            port: config.broker_port,
            username: config.broker_username.clone(),
            password: config.broker_password.clone(),
            topic_prefix: config.device_topic_prefix(),
            keep_alive: Duration::from_secs(60),
        },
        shutdown_rx.clone(),
    );

    let roster_task = tokio::spawn(run_roster_listener(
        store.clone(),
        roster_rx,
        shutdown_rx.clone(),
    ));

    let sync_engine = SyncEngine::new(
        store.clone(),
        broker,
        SyncConfig {
            interval: Duration::from_secs(config.sync_interval_secs),
            retry_interval: Duration::from_secs(config.retry_interval_secs),
            batch_limit: config.sync_batch_limit,
            publish_timeout: Duration::from_secs(config.publish_timeout_secs),
            probe_addr: config.probe_addr.clone(),
            probe_timeout: Duration::from_secs(3),
        },
    );
    let sync_task = tokio::spawn(sync_engine.run(shutdown_rx.clone()));

    // Periodic incremental enrollment scan feeding gallery refreshes.
    let watcher_task = tokio::spawn(enrollment_watcher(
        store.clone(),
        config.enrollment_dir.clone(),
        Duration::from_secs(config.scan_interval_secs),
        resolve_provider(&config.model_dir),
        gallery_tx,
        shutdown_rx,
    ));

    tracing::info!("tallyd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("tallyd shutting down");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(roster_task, sync_task, watcher_task);
    let _ = tokio::task::spawn_blocking(move || recognition_thread.join()).await;

    tracing::info!("tallyd stopped");
    Ok(())
}

fn run_scan(store: &Store, source_root: &Path, provider: &mut dyn EmbeddingProvider) {
    match store.scan_and_update(source_root, provider) {
        Ok(summary) => tracing::info!(
            added = summary.added,
            removed = summary.removed,
            skipped = summary.skipped,
            "enrollment scan complete"
        ),
        Err(StoreError::SourceMissing(path)) => {
            tracing::warn!(path = %path.display(), "enrollment source missing, scan skipped");
        }
        Err(err) => tracing::warn!(error = %err, "enrollment scan failed"),
    }
}

/// Re-scan the enrollment source on an interval and publish a fresh
/// gallery whenever the store changed.
async fn enrollment_watcher(
    store: Arc<Store>,
    source_root: PathBuf,
    interval: Duration,
    mut provider: Box<dyn EmbeddingProvider + Send>,
    gallery_tx: watch::Sender<Arc<Vec<GalleryEntry>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("enrollment watcher stopping");
                    break;
                }
                continue;
            }
        }

        match store.scan_and_update(&source_root, provider.as_mut()) {
            Ok(summary) if summary.changed() => match store.load_gallery() {
                Ok(gallery) => {
                    tracing::info!(entries = gallery.len(), "gallery refreshed");
                    let _ = gallery_tx.send(Arc::new(gallery));
                }
                Err(err) => tracing::warn!(error = %err, "gallery reload failed"),
            },
            Ok(_) => {}
            Err(StoreError::SourceMissing(path)) => {
                tracing::debug!(path = %path.display(), "enrollment source missing");
            }
            Err(err) => tracing::warn!(error = %err, "enrollment scan failed"),
        }
    }
}
