//! Weekly opening hours and the open/closed status derived from them.

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl DayHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHours {
    /// Store-local offset from UTC in minutes; Brasília is `-180`.
    pub utc_offset_minutes: i32,
    /// Monday first. `None` is a day the store stays closed.
    pub week: [Option<DayHours>; 7],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReopenDay {
    Today,
    Tomorrow,
    On(Weekday),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reopening {
    pub day: ReopenDay,
    pub at: NaiveTime,
}

impl Reopening {
    /// `today at 08:00`, `tomorrow at 08:00`, `on Monday at 08:00`.
    pub fn describe(&self) -> String {
        let at = self.at.format("%H:%M");
        match self.day {
            ReopenDay::Today => format!("today at {at}"),
            ReopenDay::Tomorrow => format!("tomorrow at {at}"),
            ReopenDay::On(weekday) => format!("on {} at {at}", day_name(weekday)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreStatus {
    Open { closes_at: NaiveTime },
    /// `reopens` is `None` when no day of the week has hours.
    Closed { reopens: Option<Reopening> },
}

impl StoreStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

impl BusinessHours {
    /// Same hours every day of the week.
    pub fn every_day(utc_offset_minutes: i32, hours: DayHours) -> Self {
        Self { utc_offset_minutes, week: [Some(hours); 7] }
    }

    pub fn day(&self, weekday: Weekday) -> Option<DayHours> {
        self.week[weekday.num_days_from_monday() as usize]
    }

    /// Open from `open` (inclusive) until `close` (exclusive), in store-local time.
    pub fn status_at(&self, now: DateTime<Utc>) -> StoreStatus {
        let local = now.with_timezone(&self.offset());
        let today = local.weekday();
        let time = local.time();

        if let Some(hours) = self.day(today) {
            if time >= hours.open && time < hours.close {
                return StoreStatus::Open { closes_at: hours.close };
            }
            if time < hours.open {
                return StoreStatus::Closed {
                    reopens: Some(Reopening { day: ReopenDay::Today, at: hours.open }),
                };
            }
        }
        StoreStatus::Closed { reopens: self.next_open_day(today) }
    }

    /// One line per weekday: `Monday: 08:00 to 18:00` or `Sunday: closed`.
    pub fn weekly_lines(&self) -> Vec<String> {
        WEEK.iter()
            .map(|&weekday| match self.day(weekday) {
                Some(hours) => format!(
                    "{}: {} to {}",
                    day_name(weekday),
                    hours.open.format("%H:%M"),
                    hours.close.format("%H:%M")
                ),
                None => format!("{}: closed", day_name(weekday)),
            })
            .collect()
    }

    fn next_open_day(&self, today: Weekday) -> Option<Reopening> {
        let mut day = today;
        for ahead in 1..=7 {
            day = day.succ();
            if let Some(hours) = self.day(day) {
                let day = if ahead == 1 { ReopenDay::Tomorrow } else { ReopenDay::On(day) };
                return Some(Reopening { day, at: hours.open });
            }
        }
        None
    }

    /// Offsets beyond a day fall back to UTC.
    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Utc};

    use super::{BusinessHours, DayHours, ReopenDay, Reopening, StoreStatus};

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
    }

    /// Monday to Friday 08:00-18:00, Saturday 08:00-12:00, closed on Sunday. Brasília time.
    fn pharmacy() -> BusinessHours {
        let weekday = Some(DayHours::new(at(8, 0), at(18, 0)));
        BusinessHours {
            utc_offset_minutes: -180,
            week: [
                weekday,
                weekday,
                weekday,
                weekday,
                weekday,
                Some(DayHours::new(at(8, 0), at(12, 0))),
                None,
            ],
        }
    }

    #[test]
    fn open_hours_are_read_in_store_local_time() {
        // Wednesday 2026-10-14 13:30 UTC is 10:30 in Brasília.
        let status = pharmacy().status_at(Utc.with_ymd_and_hms(2026, 10, 14, 13, 30, 0).unwrap());
        assert_eq!(status, StoreStatus::Open { closes_at: at(18, 0) });

        // 21:30 UTC is 18:30 local: closing time is exclusive.
        let status = pharmacy().status_at(Utc.with_ymd_and_hms(2026, 10, 14, 21, 30, 0).unwrap());
        assert_eq!(
            status,
            StoreStatus::Closed {
                reopens: Some(Reopening { day: ReopenDay::Tomorrow, at: at(8, 0) })
            }
        );
    }

    #[test]
    fn early_morning_reopens_the_same_day() {
        // 09:00 UTC is 06:00 local on Thursday.
        let status = pharmacy().status_at(Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap());
        let StoreStatus::Closed { reopens: Some(reopening) } = status else {
            panic!("expected closed, got {status:?}")
        };
        assert_eq!(reopening.describe(), "today at 08:00");
    }

    #[test]
    fn closed_days_are_skipped_when_looking_for_the_next_opening() {
        // Saturday 2026-10-17 16:00 UTC is 13:00 local, after the half day.
        let status = pharmacy().status_at(Utc.with_ymd_and_hms(2026, 10, 17, 16, 0, 0).unwrap());
        let StoreStatus::Closed { reopens: Some(reopening) } = status else {
            panic!("expected closed, got {status:?}")
        };
        assert_eq!(reopening.day, ReopenDay::On(chrono::Weekday::Mon));
        assert_eq!(reopening.describe(), "on Monday at 08:00");
    }

    #[test]
    fn a_week_without_hours_never_reopens() {
        let hours = BusinessHours { utc_offset_minutes: 0, week: [None; 7] };
        let status = hours.status_at(Utc::now());
        assert_eq!(status, StoreStatus::Closed { reopens: None });
        assert!(!status.is_open());
    }

    #[test]
    fn weekly_lines_cover_every_day() {
        let lines = pharmacy().weekly_lines();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "Monday: 08:00 to 18:00");
        assert_eq!(lines[5], "Saturday: 08:00 to 12:00");
        assert_eq!(lines[6], "Sunday: closed");
    }
}
