//! The identity roster pulled from the central dashboard.
//!
//! Upsert-only: an inbound roster message may carry a subset of
//! identities and must never clobber rows absent from it. Row removal
//! happens only through identity-store reconciliation.

use crate::{Store, StoreError};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// One roster row. The wire aliases accept the legacy dashboard field
/// names (`user_id` / `name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    #[serde(alias = "user_id")]
    pub identity_id: String,
    #[serde(alias = "name")]
    pub display_name: String,
}

impl Store {
    /// Insert-or-update roster rows. Returns the number of entries applied.
    pub fn upsert_roster(&self, entries: &[RosterEntry]) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT INTO roster (identity_id, display_name) VALUES (?1, ?2)
                 ON CONFLICT (identity_id) DO UPDATE SET display_name = excluded.display_name",
                params![entry.identity_id, entry.display_name],
            )?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    /// All roster rows, ordered by identity id.
    pub fn roster(&self) -> Result<Vec<RosterEntry>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT identity_id, display_name FROM roster ORDER BY identity_id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RosterEntry {
                    identity_id: row.get(0)?,
                    display_name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> RosterEntry {
        RosterEntry {
            identity_id: id.into(),
            display_name: name.into(),
        }
    }

    #[test]
    fn test_upsert_inserts_and_updates() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_roster(&[entry("1", "Alice"), entry("2", "Bob")]).unwrap();
        store.upsert_roster(&[entry("2", "Robert")]).unwrap();

        let roster = store.roster().unwrap();
        assert_eq!(roster, vec![entry("1", "Alice"), entry("2", "Robert")]);
    }

    #[test]
    fn test_subset_message_does_not_delete() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_roster(&[entry("1", "Alice"), entry("2", "Bob")]).unwrap();

        // A later message naming only Bob must leave Alice alone.
        store.upsert_roster(&[entry("2", "Bob")]).unwrap();
        assert_eq!(store.roster().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_message_is_noop() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_roster(&[entry("1", "Alice")]).unwrap();
        assert_eq!(store.upsert_roster(&[]).unwrap(), 0);
        assert_eq!(store.roster().unwrap().len(), 1);
    }

    #[test]
    fn test_wire_aliases_accepted() {
        let legacy: RosterEntry =
            serde_json::from_str(r#"{"user_id": "7", "name": "Mary"}"#).unwrap();
        assert_eq!(legacy, entry("7", "Mary"));
    }
}
