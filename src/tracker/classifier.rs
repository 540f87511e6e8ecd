use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

/// Work-time boundaries for a single user. Boundary values use the "HH:MM" form,
/// but only the hour component matters because activity is bucketed per hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkTimeConfig {
    #[serde(default = "default_work_start")]
    pub work_start: String,
    #[serde(default = "default_work_end")]
    pub work_end: String,
    #[serde(default = "default_lunch_start")]
    pub lunch_start: String,
    #[serde(default = "default_lunch_end")]
    pub lunch_end: String,
    #[serde(default = "default_weekend_overtime")]
    pub weekend_is_overtime: bool,
}

fn default_work_start() -> String {
    "09:00".into()
}

fn default_work_end() -> String {
    "18:00".into()
}

fn default_lunch_start() -> String {
    "12:00".into()
}

fn default_lunch_end() -> String {
    "14:00".into()
}

fn default_weekend_overtime() -> bool {
    true
}

impl Default for WorkTimeConfig {
    fn default() -> Self {
        Self {
            work_start: default_work_start(),
            work_end: default_work_end(),
            lunch_start: default_lunch_start(),
            lunch_end: default_lunch_end(),
            weekend_is_overtime: default_weekend_overtime(),
        }
    }
}

impl WorkTimeConfig {
    pub fn work_start_hour(&self) -> u32 {
        hour_of(&self.work_start, 9)
    }

    pub fn work_end_hour(&self) -> u32 {
        hour_of(&self.work_end, 18)
    }

    pub fn lunch_start_hour(&self) -> u32 {
        hour_of(&self.lunch_start, 12)
    }

    pub fn lunch_end_hour(&self) -> u32 {
        hour_of(&self.lunch_end, 14)
    }
}

/// Minutes are truncated on purpose, a boundary of "09:30" still opens the 9 o'clock hour.
fn hour_of(value: &str, fallback: u32) -> u32 {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map(|v| v.hour())
        .unwrap_or(fallback)
}

/// How a single hour of a day is treated for reporting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HourKind {
    /// Ordinary work hour inside the configured window.
    Regular,
    /// Weekend or outside of the work window.
    Overtime,
    /// Lunch break. Neither work nor overtime.
    Break,
}

/// Classifies an hour of a local day. Rules apply in a fixed order: weekend first,
/// then lunch break, then the work window.
pub fn classify_hour(config: &WorkTimeConfig, date: NaiveDate, hour: u32) -> HourKind {
    let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
    if weekend && config.weekend_is_overtime {
        return HourKind::Overtime;
    }
    if hour >= config.lunch_start_hour() && hour < config.lunch_end_hour() {
        return HourKind::Break;
    }
    if hour < config.work_start_hour() || hour >= config.work_end_hour() {
        return HourKind::Overtime;
    }
    HourKind::Regular
}

pub fn is_overtime_hour(config: &WorkTimeConfig, date: NaiveDate, hour: u32) -> bool {
    classify_hour(config, date, hour) == HourKind::Overtime
}
