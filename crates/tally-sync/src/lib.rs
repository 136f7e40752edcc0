//! tally-sync — Moves buffered attendance records to the central broker
//! and pulls the authoritative identity roster back.
//!
//! Outbound delivery is at-least-once: a record is only marked synced
//! after the broker acknowledges its publish, so duplicates are possible
//! downstream but loss is not. Connectivity loss pauses publishing;
//! records wait indefinitely.

pub mod broker;
pub mod engine;
pub mod netcheck;
pub mod roster;

pub use broker::{spawn_broker, BrokerConfig, BrokerError, BrokerHandle, Topics};
pub use engine::{record_payload, AckPublisher, SyncConfig, SyncEngine};
pub use roster::{parse_roster, run_roster_listener};
