use anyhow::Context;
use chrono::{Local, NaiveTime};

/// Time-of-day window outside of which queued downloads are held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ScheduleWindow {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }

    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            enabled: true,
            start,
            end,
        }
    }

    pub fn from_hhmm(enabled: bool, start: &str, end: &str) -> anyhow::Result<Self> {
        Ok(Self {
            enabled,
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        })
    }

    /// Both ends are inclusive. `start > end` means the window spans midnight.
    pub fn is_within_schedule(&self, now: NaiveTime) -> bool {
        if !self.enabled {
            return true;
        }
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self::disabled()
    }
}

pub fn parse_hhmm(value: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("invalid time of day '{}'", value))
}

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}
