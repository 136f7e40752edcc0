//! The attendance ledger: punch recording and the sync queue.
//!
//! Records are append-only. The only mutation after insert is the
//! one-way `synced` flag flip performed by the sync engine.

use crate::shift::{evaluate_punch, PunchStatus, PunchType, Shift};
use crate::{Store, StoreError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, Row};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// One row of the attendance log.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: i64,
    pub identity_id: String,
    pub display_name: String,
    pub device_id: String,
    pub punch_time: NaiveDateTime,
    pub punch_date: NaiveDate,
    pub punch_clock: NaiveTime,
    pub punch_type: PunchType,
    pub shift_id: i64,
    pub status: PunchStatus,
    pub late_minutes: i64,
    pub early_departure_minutes: i64,
    pub overtime_minutes: i64,
    pub confidence: f32,
    pub synced: bool,
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let punch_time: String = row.get(4)?;
    let punch_date: String = row.get(5)?;
    let punch_clock: String = row.get(6)?;
    let punch_type: String = row.get(7)?;
    let status: String = row.get(9)?;

    let parse_fail = |msg: &str| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            msg.to_string().into(),
        )
    };

    Ok(AttendanceRecord {
        id: row.get(0)?,
        identity_id: row.get(1)?,
        display_name: row.get(2)?,
        device_id: row.get(3)?,
        punch_time: NaiveDateTime::parse_from_str(&punch_time, DATETIME_FMT)
            .map_err(|_| parse_fail("punch_time"))?,
        punch_date: NaiveDate::parse_from_str(&punch_date, DATE_FMT)
            .map_err(|_| parse_fail("punch_date"))?,
        punch_clock: NaiveTime::parse_from_str(&punch_clock, TIME_FMT)
            .map_err(|_| parse_fail("punch_clock"))?,
        punch_type: PunchType::from_str(&punch_type).ok_or_else(|| parse_fail("punch_type"))?,
        shift_id: row.get(8)?,
        status: PunchStatus::from_str(&status).ok_or_else(|| parse_fail("status"))?,
        late_minutes: row.get(10)?,
        early_departure_minutes: row.get(11)?,
        overtime_minutes: row.get(12)?,
        confidence: row.get(13)?,
        synced: row.get::<_, i64>(14)? != 0,
    })
}

const RECORD_COLUMNS: &str = "id, identity_id, display_name, device_id, punch_time, punch_date, \
     punch_clock, punch_type, shift_id, status, late_minutes, early_departure_minutes, \
     overtime_minutes, confidence, synced";

fn last_punch_type_today(
    conn: &Connection,
    identity_id: &str,
    date: &str,
) -> rusqlite::Result<Option<PunchType>> {
    let result = conn.query_row(
        "SELECT punch_type FROM attendance_log
         WHERE identity_id = ?1 AND punch_date = ?2
         ORDER BY id DESC LIMIT 1",
        params![identity_id, date],
        |row| row.get::<_, String>(0),
    );
    match result {
        Ok(s) => Ok(PunchType::from_str(&s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

impl Store {
    /// The shift a punch is evaluated against. Single-shift policy: the
    /// first configured shift applies to everyone; an empty shift table
    /// falls back to the built-in General shift rather than failing the
    /// punch.
    pub fn default_shift(&self) -> Result<Shift, StoreError> {
        let conn = self.lock();
        let result = conn.query_row(
            "SELECT id, name, start_time, end_time, late_grace_minutes,
                    half_day_late_minutes, early_half_day_minutes, overtime_start_minutes
             FROM shifts ORDER BY id LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            },
        );

        match result {
            Ok((id, name, start, end, grace, half_day, early_half, overtime)) => {
                let parsed = (
                    NaiveTime::parse_from_str(&start, TIME_FMT),
                    NaiveTime::parse_from_str(&end, TIME_FMT),
                );
                match parsed {
                    (Ok(start_time), Ok(end_time)) => Ok(Shift {
                        id,
                        name,
                        start_time,
                        end_time,
                        late_grace_minutes: grace,
                        half_day_late_minutes: half_day,
                        early_half_day_minutes: early_half,
                        overtime_start_minutes: overtime,
                    }),
                    _ => {
                        tracing::warn!(shift = %name, "unparseable shift times, using General");
                        Ok(Shift::general())
                    }
                }
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                tracing::warn!("shift table empty, using built-in General shift");
                Ok(Shift::general())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record a confirmed recognition event as a punch.
    ///
    /// Punch type alternates per identity per calendar day (IN, OUT, IN,
    /// …, unlimited pairs); status and minute fields come from
    /// [`evaluate_punch`]. The record is inserted unsynced.
    pub fn record_punch(
        &self,
        identity_id: &str,
        display_name: &str,
        device_id: &str,
        at: NaiveDateTime,
        confidence: f32,
    ) -> Result<AttendanceRecord, StoreError> {
        let shift = self.default_shift()?;
        let date = at.date();
        let date_str = date.format(DATE_FMT).to_string();

        let conn = self.lock();
        let punch_type = match last_punch_type_today(&conn, identity_id, &date_str)? {
            Some(last) => last.alternate(),
            None => PunchType::In,
        };
        let outcome = evaluate_punch(&shift, punch_type, at);

        conn.execute(
            "INSERT INTO attendance_log
                (identity_id, display_name, device_id, punch_time, punch_date, punch_clock,
                 punch_type, shift_id, status, late_minutes, early_departure_minutes,
                 overtime_minutes, confidence, synced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0)",
            params![
                identity_id,
                display_name,
                device_id,
                at.format(DATETIME_FMT).to_string(),
                date_str,
                at.time().format(TIME_FMT).to_string(),
                punch_type.as_str(),
                shift.id,
                outcome.status.as_str(),
                outcome.late_minutes,
                outcome.early_departure_minutes,
                outcome.overtime_minutes,
                confidence as f64,
            ],
        )?;
        let id = conn.last_insert_rowid();

        tracing::info!(
            identity = identity_id,
            name = display_name,
            punch_type = punch_type.as_str(),
            status = outcome.status.as_str(),
            "punch recorded"
        );

        Ok(AttendanceRecord {
            id,
            identity_id: identity_id.to_string(),
            display_name: display_name.to_string(),
            device_id: device_id.to_string(),
            punch_time: at,
            punch_date: date,
            punch_clock: at.time(),
            punch_type,
            shift_id: shift.id,
            status: outcome.status,
            late_minutes: outcome.late_minutes,
            early_departure_minutes: outcome.early_departure_minutes,
            overtime_minutes: outcome.overtime_minutes,
            confidence,
            synced: false,
        })
    }

    /// Unsynced records, oldest first. The `synced` flag is the whole
    /// sync cursor; no separate offset exists.
    pub fn unsynced_records(&self, limit: usize) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_log WHERE synced = 0 ORDER BY id LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn unsynced_count(&self) -> Result<i64, StoreError> {
        let conn = self.lock();
        let count =
            conn.query_row("SELECT COUNT(*) FROM attendance_log WHERE synced = 0", [], |r| {
                r.get(0)
            })?;
        Ok(count)
    }

    /// Flip `synced` for confirmed-delivered records. One-way; re-marking
    /// an already-synced id is a no-op.
    pub fn mark_synced(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.lock();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("UPDATE attendance_log SET synced = 1 WHERE id IN ({placeholders})");
        conn.execute(&sql, rusqlite::params_from_iter(ids))?;
        tracing::debug!(count = ids.len(), "records marked synced");
        Ok(())
    }

    /// Records for one calendar date, newest first. Operator queries.
    pub fn records_for_date(
        &self,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_log
             WHERE punch_date = ?1 ORDER BY id DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![date.format(DATE_FMT).to_string(), limit as i64],
                row_to_record,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn test_punch_alternation_same_day() {
        let store = store();
        let a = store.record_punch("emp1", "Emp One", "dev1", at(11, 9, 5), 0.9).unwrap();
        let b = store.record_punch("emp1", "Emp One", "dev1", at(11, 13, 0), 0.9).unwrap();
        let c = store.record_punch("emp1", "Emp One", "dev1", at(11, 14, 0), 0.9).unwrap();

        assert_eq!(a.punch_type, PunchType::In);
        assert_eq!(b.punch_type, PunchType::Out);
        assert_eq!(c.punch_type, PunchType::In);
    }

    #[test]
    fn test_alternation_resets_across_days() {
        let store = store();
        let a = store.record_punch("emp1", "Emp One", "dev1", at(11, 9, 0), 0.9).unwrap();
        let b = store.record_punch("emp1", "Emp One", "dev1", at(12, 9, 0), 0.9).unwrap();
        assert_eq!(a.punch_type, PunchType::In);
        assert_eq!(b.punch_type, PunchType::In);
    }

    #[test]
    fn test_alternation_is_per_identity() {
        let store = store();
        store.record_punch("emp1", "Emp One", "dev1", at(11, 9, 0), 0.9).unwrap();
        let other = store.record_punch("emp2", "Emp Two", "dev1", at(11, 9, 30), 0.9).unwrap();
        assert_eq!(other.punch_type, PunchType::In);
    }

    #[test]
    fn test_status_fields_persisted() {
        let store = store();
        let rec = store.record_punch("emp1", "Emp One", "dev1", at(11, 9, 16), 0.87).unwrap();
        assert_eq!(rec.status, PunchStatus::Late);
        assert_eq!(rec.late_minutes, 16);

        let fetched = store.unsynced_records(10).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].status, PunchStatus::Late);
        assert_eq!(fetched[0].late_minutes, 16);
        assert!((fetched[0].confidence - 0.87).abs() < 1e-6);
        assert!(!fetched[0].synced);
    }

    #[test]
    fn test_unsynced_oldest_first_with_limit() {
        let store = store();
        for i in 0..5 {
            store
                .record_punch("emp1", "Emp One", "dev1", at(11, 9, i), 0.9)
                .unwrap();
        }
        let batch = store.unsynced_records(3).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_mark_synced_removes_from_queue() {
        let store = store();
        let a = store.record_punch("emp1", "Emp One", "dev1", at(11, 9, 0), 0.9).unwrap();
        let b = store.record_punch("emp1", "Emp One", "dev1", at(11, 17, 0), 0.9).unwrap();

        store.mark_synced(&[a.id]).unwrap();
        let remaining = store.unsynced_records(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
        assert_eq!(store.unsynced_count().unwrap(), 1);

        // Re-marking is harmless.
        store.mark_synced(&[a.id]).unwrap();
        assert_eq!(store.unsynced_count().unwrap(), 1);
    }

    #[test]
    fn test_records_for_date_filters() {
        let store = store();
        store.record_punch("emp1", "Emp One", "dev1", at(11, 9, 0), 0.9).unwrap();
        store.record_punch("emp1", "Emp One", "dev1", at(12, 9, 0), 0.9).unwrap();

        let day = store
            .records_for_date(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(), 10)
            .unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].punch_date, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
    }
}
