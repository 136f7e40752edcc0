//! The identity store: incremental enrollment, garbage collection, and
//! gallery persistence.
//!
//! Enrollment sources live under a directory tree of
//! `<source_root>/<id>_<name>/*.{jpg,jpeg,png}`. A scan is one SQLite
//! transaction: reconcile deleted identities, enroll unprocessed images,
//! extend the processed-path ledger, commit once. A crash can therefore
//! never leave the gallery and the ledger disagreeing.

use crate::{Store, StoreError};
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tally_core::provider::{largest_face, EmbeddingProvider, ProviderError};
use tally_core::types::{Embedding, GalleryEntry, Identity};

/// Outcome of one enrollment scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanSummary {
    /// Embeddings added from newly-processed images.
    pub added: usize,
    /// Embeddings removed by garbage collection.
    pub removed: usize,
    /// Images skipped this run (unreadable, no face); retried next scan.
    pub skipped: usize,
}

impl ScanSummary {
    /// True when the persisted gallery changed and callers should reload.
    pub fn changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Parse an enrollment group key: `"12_Alice"` → id `"12"`, name
/// `"Alice"`; a key without an underscore is both id and name.
pub fn identity_from_group(group: &str) -> Identity {
    match group.split_once('_') {
        Some((id, name)) if !id.is_empty() && !name.is_empty() => Identity {
            identity_id: id.to_string(),
            display_name: name.to_string(),
        },
        _ => Identity {
            identity_id: group.to_string(),
            display_name: group.to_string(),
        },
    }
}

/// Identity for an enrollment image, from its enclosing directory name.
/// `None` for files sitting directly under the source root.
pub fn identity_for_path(path: &Path) -> Option<Identity> {
    let group = path.parent()?.file_name()?.to_str()?;
    Some(identity_from_group(group))
}

/// Encode an embedding as little-endian f32 bytes for BLOB storage.
pub fn embedding_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB back into an embedding vector.
pub fn bytes_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
}

/// Collect enrollment images under `root`, sorted for deterministic
/// insertion (and therefore matching) order.
fn collect_images(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_image(&path) {
                images.push(path);
            }
        }
    }
    images.sort();
    Ok(images)
}

/// Identity ids of the groups currently present under `root`.
fn enrollment_groups(root: &Path) -> std::io::Result<HashSet<String>> {
    let mut groups = HashSet::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                groups.insert(identity_from_group(name).identity_id);
            }
        }
    }
    Ok(groups)
}

/// Delete every embedding, ledger entry, and roster row whose identity
/// is not in `valid`. Returns the number of embeddings removed.
fn reconcile_conn(conn: &Connection, valid: &HashSet<String>) -> Result<usize, rusqlite::Error> {
    let mut stale: HashSet<String> = HashSet::new();
    for sql in [
        "SELECT DISTINCT identity_id FROM embeddings",
        "SELECT DISTINCT identity_id FROM processed_paths",
        "SELECT identity_id FROM roster",
    ] {
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for id in ids {
            let id = id?;
            if !valid.contains(&id) {
                stale.insert(id);
            }
        }
    }

    let mut removed = 0;
    for id in &stale {
        removed += conn.execute("DELETE FROM embeddings WHERE identity_id = ?1", [id])?;
        conn.execute("DELETE FROM processed_paths WHERE identity_id = ?1", [id])?;
        conn.execute("DELETE FROM roster WHERE identity_id = ?1", [id])?;
        tracing::info!(identity = %id, "garbage-collected identity");
    }
    Ok(removed)
}

impl Store {
    /// Load the full match gallery, oldest enrollment first.
    pub fn load_gallery(&self) -> Result<Vec<GalleryEntry>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT identity_id, display_name, vector FROM embeddings ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(2)?;
                Ok(GalleryEntry {
                    identity_id: row.get(0)?,
                    display_name: row.get(1)?,
                    embedding: Embedding {
                        values: bytes_to_embedding(&blob),
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Garbage-collect identities outside `valid` in one transaction.
    pub fn reconcile(&self, valid: &HashSet<String>) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = reconcile_conn(&tx, valid)?;
        tx.commit()?;
        Ok(removed)
    }

    /// Incremental enrollment scan over `source_root`.
    ///
    /// Runs as a single transaction: cold-start ledger check, reconcile
    /// against the groups on disk, enroll every unprocessed image, then
    /// commit, and only if something actually changed, so a no-change
    /// scan performs no write at all. Individual bad images are skipped;
    /// a missing model stack aborts the scan with nothing committed.
    pub fn scan_and_update(
        &self,
        source_root: &Path,
        provider: &mut dyn EmbeddingProvider,
    ) -> Result<ScanSummary, StoreError> {
        if !source_root.is_dir() {
            return Err(StoreError::SourceMissing(source_root.to_path_buf()));
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        // Cold-start check: a non-empty ledger with an empty gallery
        // means the store was lost; the ledger must not suppress
        // re-enrollment of images that no longer have embeddings.
        let embeddings: i64 = tx.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
        let ledger: i64 = tx.query_row("SELECT COUNT(*) FROM processed_paths", [], |r| r.get(0))?;
        let mut cleared = 0;
        if embeddings == 0 && ledger > 0 {
            tracing::warn!(
                ledger_entries = ledger,
                "embedding store empty but ledger is not; discarding ledger and re-scanning everything"
            );
            cleared = tx.execute("DELETE FROM processed_paths", [])?;
        }

        let valid = enrollment_groups(source_root)?;
        let removed = reconcile_conn(&tx, &valid)?;

        let processed: HashSet<String> = {
            let mut stmt = tx.prepare("SELECT path FROM processed_paths")?;
            let paths = stmt.query_map([], |row| row.get::<_, String>(0))?;
            paths.collect::<Result<_, _>>()?
        };

        let mut added = 0;
        let mut skipped = 0;

        for path in collect_images(source_root)? {
            let key = path.to_string_lossy().into_owned();
            if processed.contains(&key) {
                continue;
            }

            let Some(identity) = identity_for_path(&path) else {
                tracing::warn!(path = %path.display(), "image outside an identity group, skipping");
                skipped += 1;
                continue;
            };

            let image = match image::open(&path) {
                Ok(image) => image,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "unreadable image, skipping");
                    skipped += 1;
                    continue;
                }
            };

            let detections = match provider.detect(&image) {
                Ok(detections) => detections,
                Err(err @ ProviderError::ModelNotFound(_)) => {
                    // Model absence is fatal to the whole scan, not a
                    // per-image skip; nothing is committed.
                    return Err(err.into());
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "inference failed, skipping");
                    skipped += 1;
                    continue;
                }
            };

            let Some(face) = largest_face(&detections) else {
                tracing::warn!(path = %path.display(), "no face detected, skipping");
                skipped += 1;
                continue;
            };
            if face.bounding_box.area() <= 0.0 {
                tracing::warn!(path = %path.display(), "zero-area face crop, skipping");
                skipped += 1;
                continue;
            }

            tx.execute(
                "INSERT INTO embeddings (identity_id, display_name, source_path, vector)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    identity.identity_id,
                    identity.display_name,
                    key,
                    embedding_to_bytes(&face.embedding.values)
                ],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO processed_paths (path, identity_id) VALUES (?1, ?2)",
                params![key, identity.identity_id],
            )?;
            added += 1;
        }

        let summary = ScanSummary { added, removed, skipped };
        if added > 0 || removed > 0 || cleared > 0 {
            tx.commit()?;
            tracing::info!(added, removed, skipped, "enrollment scan committed");
        } else {
            // Nothing changed; dropping the transaction writes nothing.
            tracing::debug!(skipped, "enrollment scan: no changes");
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tally_core::provider::Detection;
    use tally_core::types::BoundingBox;
    use tempfile::TempDir;

    /// Derives a deterministic embedding from the top-left pixel, so each
    /// uniformly-colored test image maps to a stable vector. Black images
    /// produce no detections.
    struct StubProvider;

    impl EmbeddingProvider for StubProvider {
        fn detect(
            &mut self,
            image: &image::DynamicImage,
        ) -> Result<Vec<Detection>, ProviderError> {
            let rgb = image.to_rgb8();
            let px = rgb.get_pixel(0, 0);
            if px[0] == 0 && px[1] == 0 && px[2] == 0 {
                return Ok(Vec::new());
            }
            let raw = [px[0] as f32, px[1] as f32, px[2] as f32];
            let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
            Ok(vec![Detection {
                bounding_box: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: rgb.width() as f32,
                    height: rgb.height() as f32,
                    confidence: 0.99,
                    landmarks: None,
                },
                embedding: Embedding {
                    values: raw.iter().map(|v| v / norm).collect(),
                },
            }])
        }
    }

    fn write_face(root: &Path, group: &str, file: &str, color: [u8; 3]) {
        let dir = root.join(group);
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(8, 8, Rgb(color))
            .save(dir.join(file))
            .unwrap();
    }

    fn setup() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&dir.path().join("kiosk.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_identity_parsing() {
        assert_eq!(
            identity_from_group("12_Alice"),
            Identity { identity_id: "12".into(), display_name: "Alice".into() }
        );
        assert_eq!(
            identity_from_group("Bob"),
            Identity { identity_id: "Bob".into(), display_name: "Bob".into() }
        );
        assert_eq!(
            identity_from_group("7_Mary_Ann"),
            Identity { identity_id: "7".into(), display_name: "Mary_Ann".into() }
        );
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let values = vec![0.25f32, -1.5, 0.0, 3.75];
        assert_eq!(bytes_to_embedding(&embedding_to_bytes(&values)), values);
    }

    #[test]
    fn test_scan_enrolls_new_images() {
        let (dir, store) = setup();
        let faces = dir.path().join("faces");
        write_face(&faces, "1_Alice", "a.png", [200, 10, 10]);
        write_face(&faces, "2_Bob", "b.png", [10, 200, 10]);

        let summary = store.scan_and_update(&faces, &mut StubProvider).unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(summary.removed, 0);

        let gallery = store.load_gallery().unwrap();
        assert_eq!(gallery.len(), 2);
        let mut names: Vec<_> = gallery.iter().map(|e| e.display_name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_rescan_is_noop() {
        let (dir, store) = setup();
        let faces = dir.path().join("faces");
        write_face(&faces, "1_Alice", "a.png", [200, 10, 10]);

        let first = store.scan_and_update(&faces, &mut StubProvider).unwrap();
        assert!(first.changed());

        let second = store.scan_and_update(&faces, &mut StubProvider).unwrap();
        assert!(!second.changed());
        assert_eq!(second.added, 0);
        assert_eq!(second.skipped, 0);
        assert_eq!(store.load_gallery().unwrap().len(), 1);
    }

    #[test]
    fn test_gc_removes_deleted_identity_everywhere() {
        let (dir, store) = setup();
        let faces = dir.path().join("faces");
        write_face(&faces, "1_Alice", "a.png", [200, 10, 10]);
        write_face(&faces, "2_Bob", "b.png", [10, 200, 10]);
        store.scan_and_update(&faces, &mut StubProvider).unwrap();
        store
            .upsert_roster(&[
                crate::RosterEntry { identity_id: "1".into(), display_name: "Alice".into() },
                crate::RosterEntry { identity_id: "2".into(), display_name: "Bob".into() },
            ])
            .unwrap();

        std::fs::remove_dir_all(faces.join("2_Bob")).unwrap();
        let summary = store.scan_and_update(&faces, &mut StubProvider).unwrap();
        assert_eq!(summary.removed, 1);

        let gallery = store.load_gallery().unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].identity_id, "1");

        let roster = store.roster().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].identity_id, "1");

        // Pairing invariant: every remaining row has both a vector and a name.
        let conn = store.lock();
        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM embeddings WHERE display_name = '' OR length(vector) = 0",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_cold_start_recovery_rescans_everything() {
        let (dir, store) = setup();
        let faces = dir.path().join("faces");
        write_face(&faces, "1_Alice", "a.png", [200, 10, 10]);
        write_face(&faces, "2_Bob", "b.png", [10, 200, 10]);
        store.scan_and_update(&faces, &mut StubProvider).unwrap();

        // Simulate gallery loss with the ledger left behind.
        store.lock().execute("DELETE FROM embeddings", []).unwrap();

        let summary = store.scan_and_update(&faces, &mut StubProvider).unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(store.load_gallery().unwrap().len(), 2);
    }

    #[test]
    fn test_bad_images_skipped_not_fatal() {
        let (dir, store) = setup();
        let faces = dir.path().join("faces");
        write_face(&faces, "1_Alice", "a.png", [200, 10, 10]);
        // No face (stub treats black as zero detections).
        write_face(&faces, "1_Alice", "dark.png", [0, 0, 0]);
        // Unreadable image bytes.
        std::fs::write(faces.join("1_Alice").join("junk.jpg"), b"not an image").unwrap();

        let summary = store.scan_and_update(&faces, &mut StubProvider).unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.skipped, 2);

        // Failures stay out of the ledger and are retried next run.
        let retry = store.scan_and_update(&faces, &mut StubProvider).unwrap();
        assert_eq!(retry.added, 0);
        assert_eq!(retry.skipped, 2);
    }

    #[test]
    fn test_missing_model_aborts_scan() {
        struct NoModel;
        impl EmbeddingProvider for NoModel {
            fn detect(
                &mut self,
                _image: &image::DynamicImage,
            ) -> Result<Vec<Detection>, ProviderError> {
                Err(ProviderError::ModelNotFound("det.onnx".into()))
            }
        }

        let (dir, store) = setup();
        let faces = dir.path().join("faces");
        write_face(&faces, "1_Alice", "a.png", [200, 10, 10]);

        let err = store.scan_and_update(&faces, &mut NoModel).unwrap_err();
        assert!(matches!(err, StoreError::Provider(_)));
        // Nothing committed.
        assert!(store.load_gallery().unwrap().is_empty());
    }

    #[test]
    fn test_missing_source_root_is_an_error() {
        let (dir, store) = setup();
        let missing = dir.path().join("nowhere");
        let err = store.scan_and_update(&missing, &mut StubProvider).unwrap_err();
        assert!(matches!(err, StoreError::SourceMissing(_)));
    }
}
