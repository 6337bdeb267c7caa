//! Deployment windows per environment class.
//!
//! A window is a set of weekdays and an hour range `[start_hour, end_hour)`
//! evaluated in one fixed UTC offset. Classes without a window are always
//! open.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc, Weekday};
use sdp_types::EnvironmentClass;
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// How far ahead `next_window` searches.
const SEARCH_HORIZON_HOURS: i64 = 8 * 24;

/// Allowed days and hours for one environment class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentWindow {
    pub days: Vec<Weekday>,
    pub start_hour: u32,
    /// Exclusive; 24 means "until midnight".
    pub end_hour: u32,
}

impl DeploymentWindow {
    pub fn new(days: Vec<Weekday>, start_hour: u32, end_hour: u32) -> Self {
        Self {
            days,
            start_hour,
            end_hour,
        }
    }

    pub fn weekdays(start_hour: u32, end_hour: u32) -> Self {
        use Weekday::*;
        Self::new(vec![Mon, Tue, Wed, Thu, Fri], start_hour, end_hour)
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_hour > 24 || self.start_hour >= self.end_hour {
            return Err(GuardError::InvalidConfig(format!(
                "window hours must satisfy start < end <= 24 (got {}..{})",
                self.start_hour, self.end_hour
            )));
        }
        Ok(())
    }

    fn contains(&self, local: &DateTime<FixedOffset>) -> bool {
        self.days.contains(&local.weekday())
            && local.hour() >= self.start_hour
            && local.hour() < self.end_hour
    }
}

/// Windows for every environment class, in one reference offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentWindows {
    /// Offset of the reference timezone from UTC, in minutes.
    pub utc_offset_minutes: i32,
    pub development: Option<DeploymentWindow>,
    pub uat: Option<DeploymentWindow>,
    pub production: Option<DeploymentWindow>,
}

impl Default for DeploymentWindows {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            development: None,
            uat: Some(DeploymentWindow::weekdays(6, 22)),
            production: Some(DeploymentWindow::new(vec![Weekday::Sat, Weekday::Sun], 2, 6)),
        }
    }
}

impl DeploymentWindows {
    /// No restrictions for any class.
    pub fn always_open() -> Self {
        Self {
            utc_offset_minutes: 0,
            development: None,
            uat: None,
            production: None,
        }
    }

    pub fn with_window(mut self, class: EnvironmentClass, window: DeploymentWindow) -> Self {
        match class {
            EnvironmentClass::Development => self.development = Some(window),
            EnvironmentClass::Uat => self.uat = Some(window),
            EnvironmentClass::Production => self.production = Some(window),
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if FixedOffset::east_opt(self.utc_offset_minutes * 60).is_none() {
            return Err(GuardError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        for window in [&self.development, &self.uat, &self.production]
            .into_iter()
            .flatten()
        {
            window.validate()?;
        }
        Ok(())
    }

    pub fn window_for(&self, class: EnvironmentClass) -> Option<&DeploymentWindow> {
        match class {
            EnvironmentClass::Development => self.development.as_ref(),
            EnvironmentClass::Uat => self.uat.as_ref(),
            EnvironmentClass::Production => self.production.as_ref(),
        }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn is_within_window(&self, at: DateTime<Utc>, class: EnvironmentClass) -> bool {
        match self.window_for(class) {
            Some(window) => window.contains(&at.with_timezone(&self.offset())),
            None => true,
        }
    }

    /// Earliest instant at or after `after` inside the class's window.
    /// `None` if the window never opens.
    pub fn next_window(&self, after: DateTime<Utc>, class: EnvironmentClass) -> Option<DateTime<Utc>> {
        let window = match self.window_for(class) {
            Some(window) => window,
            None => return Some(after),
        };

        let local = after.with_timezone(&self.offset());
        if window.contains(&local) {
            return Some(after);
        }

        let into_hour = Duration::seconds(i64::from(local.minute() * 60 + local.second()))
            + Duration::nanoseconds(i64::from(local.nanosecond()));
        let mut candidate = local - into_hour;
        for _ in 0..SEARCH_HORIZON_HOURS {
            candidate += Duration::hours(1);
            if window.contains(&candidate) {
                return Some(candidate.with_timezone(&Utc));
            }
        }
        None
    }
}
