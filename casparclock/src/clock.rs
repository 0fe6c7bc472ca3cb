//! Wall clock access and the time formats shown on air

use chrono::{DateTime, Local, Timelike};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Zero-padded 24-hour `HH:MM`
pub fn format_hhmm<T: Timelike>(time: &T) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// `HH:MM:SS`, used for the next scheduled update
pub fn format_hms<T: Timelike>(time: &T) -> String {
    format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second())
}

#[cfg(test)]
pub use test_support::FixedClock;
