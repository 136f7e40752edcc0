//! Shift definitions and punch status evaluation.
//!
//! `evaluate_punch` is a pure function of (shift, punch type, timestamp);
//! the IN/OUT alternation decision lives in the attendance module where
//! the "last punch today" lookup is.

use chrono::{Duration, NaiveDateTime, NaiveTime};

/// A work shift. Times are re-based onto the punch's calendar date at
/// evaluation; shifts crossing midnight are unsupported.
#[derive(Debug, Clone)]
pub struct Shift {
    pub id: i64,
    pub name: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub late_grace_minutes: i64,
    /// Lateness beyond this many minutes escalates Late to Half Day.
    pub half_day_late_minutes: i64,
    /// Leaving earlier than this many minutes escalates Early Departure
    /// to Half Day (Early).
    pub early_half_day_minutes: i64,
    /// Minutes past end-of-shift before an OUT counts as Overtime.
    pub overtime_start_minutes: i64,
}

impl Shift {
    /// Built-in fallback matching the seeded "General" shift. Used when
    /// the shift table is empty so a punch never fails on lookup.
    pub fn general() -> Shift {
        Shift {
            id: 1,
            name: "General".into(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            late_grace_minutes: 15,
            half_day_late_minutes: 120,
            early_half_day_minutes: 60,
            overtime_start_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchType {
    In,
    Out,
}

impl PunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchType::In => "IN",
            PunchType::Out => "OUT",
        }
    }

    pub fn from_str(s: &str) -> Option<PunchType> {
        match s {
            "IN" => Some(PunchType::In),
            "OUT" => Some(PunchType::Out),
            _ => None,
        }
    }

    /// The type of the punch following this one on the same day.
    pub fn alternate(&self) -> PunchType {
        match self {
            PunchType::In => PunchType::Out,
            PunchType::Out => PunchType::In,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchStatus {
    Present,
    Late,
    HalfDay,
    HalfDayEarly,
    EarlyDeparture,
    Overtime,
}

impl PunchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchStatus::Present => "Present",
            PunchStatus::Late => "Late",
            PunchStatus::HalfDay => "Half Day",
            PunchStatus::HalfDayEarly => "Half Day (Early)",
            PunchStatus::EarlyDeparture => "Early Departure",
            PunchStatus::Overtime => "Overtime",
        }
    }

    pub fn from_str(s: &str) -> Option<PunchStatus> {
        match s {
            "Present" => Some(PunchStatus::Present),
            "Late" => Some(PunchStatus::Late),
            "Half Day" => Some(PunchStatus::HalfDay),
            "Half Day (Early)" => Some(PunchStatus::HalfDayEarly),
            "Early Departure" => Some(PunchStatus::EarlyDeparture),
            "Overtime" => Some(PunchStatus::Overtime),
            _ => None,
        }
    }
}

/// Computed status and minute fields for one punch.
#[derive(Debug, Clone, PartialEq)]
pub struct PunchOutcome {
    pub status: PunchStatus,
    pub late_minutes: i64,
    pub early_departure_minutes: i64,
    pub overtime_minutes: i64,
}

impl PunchOutcome {
    fn present() -> PunchOutcome {
        PunchOutcome {
            status: PunchStatus::Present,
            late_minutes: 0,
            early_departure_minutes: 0,
            overtime_minutes: 0,
        }
    }
}

/// Evaluate a punch against a shift, both re-based onto the punch date.
pub fn evaluate_punch(shift: &Shift, punch_type: PunchType, at: NaiveDateTime) -> PunchOutcome {
    let date = at.date();
    let start = date.and_time(shift.start_time);
    let end = date.and_time(shift.end_time);

    match punch_type {
        PunchType::In => {
            let grace_end = start + Duration::minutes(shift.late_grace_minutes);
            if at <= grace_end {
                return PunchOutcome::present();
            }
            let late_minutes = (at - start).num_minutes();
            let status = if late_minutes > shift.half_day_late_minutes {
                PunchStatus::HalfDay
            } else {
                PunchStatus::Late
            };
            PunchOutcome {
                status,
                late_minutes,
                early_departure_minutes: 0,
                overtime_minutes: 0,
            }
        }
        PunchType::Out => {
            if at < end {
                let early = (end - at).num_minutes();
                let status = if early > shift.early_half_day_minutes {
                    PunchStatus::HalfDayEarly
                } else {
                    PunchStatus::EarlyDeparture
                };
                return PunchOutcome {
                    status,
                    late_minutes: 0,
                    early_departure_minutes: early,
                    overtime_minutes: 0,
                };
            }
            if at > end + Duration::minutes(shift.overtime_start_minutes) {
                return PunchOutcome {
                    status: PunchStatus::Overtime,
                    late_minutes: 0,
                    early_departure_minutes: 0,
                    overtime_minutes: (at - end).num_minutes(),
                };
            }
            PunchOutcome::present()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 11)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_in_within_grace_is_present() {
        let out = evaluate_punch(&Shift::general(), PunchType::In, at(9, 14));
        assert_eq!(out.status, PunchStatus::Present);
        assert_eq!(out.late_minutes, 0);
    }

    #[test]
    fn test_in_at_grace_boundary_is_present() {
        let out = evaluate_punch(&Shift::general(), PunchType::In, at(9, 15));
        assert_eq!(out.status, PunchStatus::Present);
    }

    #[test]
    fn test_in_past_grace_is_late() {
        let out = evaluate_punch(&Shift::general(), PunchType::In, at(9, 16));
        assert_eq!(out.status, PunchStatus::Late);
        assert_eq!(out.late_minutes, 16);
    }

    #[test]
    fn test_in_very_late_is_half_day() {
        let out = evaluate_punch(&Shift::general(), PunchType::In, at(11, 30));
        assert_eq!(out.status, PunchStatus::HalfDay);
        assert_eq!(out.late_minutes, 150);
    }

    #[test]
    fn test_out_slightly_early_is_early_departure() {
        let out = evaluate_punch(&Shift::general(), PunchType::Out, at(17, 50));
        assert_eq!(out.status, PunchStatus::EarlyDeparture);
        assert_eq!(out.early_departure_minutes, 10);
    }

    #[test]
    fn test_out_very_early_is_half_day_early() {
        let out = evaluate_punch(&Shift::general(), PunchType::Out, at(16, 30));
        assert_eq!(out.status, PunchStatus::HalfDayEarly);
        assert_eq!(out.early_departure_minutes, 90);
    }

    #[test]
    fn test_out_at_end_is_present() {
        let out = evaluate_punch(&Shift::general(), PunchType::Out, at(18, 0));
        assert_eq!(out.status, PunchStatus::Present);
    }

    #[test]
    fn test_out_within_overtime_buffer_is_present() {
        let out = evaluate_punch(&Shift::general(), PunchType::Out, at(18, 20));
        assert_eq!(out.status, PunchStatus::Present);
        assert_eq!(out.overtime_minutes, 0);
    }

    #[test]
    fn test_out_past_overtime_start_is_overtime() {
        let out = evaluate_punch(&Shift::general(), PunchType::Out, at(18, 45));
        assert_eq!(out.status, PunchStatus::Overtime);
        assert_eq!(out.overtime_minutes, 45);
    }

    #[test]
    fn test_punch_type_alternates() {
        assert_eq!(PunchType::In.alternate(), PunchType::Out);
        assert_eq!(PunchType::Out.alternate(), PunchType::In);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            PunchStatus::Present,
            PunchStatus::Late,
            PunchStatus::HalfDay,
            PunchStatus::HalfDayEarly,
            PunchStatus::EarlyDeparture,
            PunchStatus::Overtime,
        ] {
            assert_eq!(PunchStatus::from_str(status.as_str()), Some(status));
        }
    }
}
