//! Inbound roster handling.
//!
//! The dashboard may answer a roster request with a bare array, a
//! `{"users": [...]}` wrapper, or a single object; all normalize to
//! `{identity_id, display_name}` pairs and upsert into the local roster
//! table. A malformed payload is logged and discarded; bad input never
//! wipes the roster.

use std::sync::Arc;
use tally_store::{RosterEntry, Store};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Error, Debug)]
pub enum RosterParseError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected roster payload shape")]
    Shape,
}

/// Normalize a roster payload to entries.
pub fn parse_roster(payload: &[u8]) -> Result<Vec<RosterEntry>, RosterParseError> {
    let value: serde_json::Value = serde_json::from_slice(payload)?;
    match value {
        serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
        serde_json::Value::Object(ref map) => {
            if map.contains_key("users") {
                Ok(serde_json::from_value(map["users"].clone())?)
            } else {
                // A single user object.
                Ok(vec![serde_json::from_value(value)?])
            }
        }
        _ => Err(RosterParseError::Shape),
    }
}

/// Apply inbound roster updates to the store until shutdown.
pub async fn run_roster_listener(
    store: Arc<Store>,
    mut updates: mpsc::Receiver<Vec<RosterEntry>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("roster listener stopping");
                    break;
                }
            }
            update = updates.recv() => {
                let Some(entries) = update else { break };
                match store.upsert_roster(&entries) {
                    Ok(count) => tracing::info!(count, "roster upserted"),
                    Err(err) => tracing::warn!(error = %err, "roster upsert failed"),
                }
            }
        }
    }
}
