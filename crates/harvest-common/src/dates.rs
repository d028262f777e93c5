//! Flexible date parsing and acceptance windows for tile timestamps.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, HarvestResult};

/// Date formats accepted from upstream metadata, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y"];

/// Parse a calendar date in any of the upstream conventions
/// (`YYYY-MM-DD`, `DD-MM-YYYY`, `DD.MM.YYYY`).
pub fn parse_flexible_date(s: &str) -> HarvestResult<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }
    Err(HarvestError::Format(format!(
        "unrecognized date string: {s}"
    )))
}

/// Acceptance window for tile timestamps.
///
/// With `yearly_end` set, the window repeats annually: one sub-interval per
/// year from `begin`'s year through the current year, each running from
/// `begin`'s month/day to `yearly_end`'s month/day of that year. A timestamp
/// is admitted when it falls in any sub-interval; an absolute `end` still
/// caps the whole range. Without `yearly_end`, the window is a plain
/// (half-open when one bound is missing) interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateWindow {
    pub begin: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// `(month, day)` closing the window in each year of the recurring range.
    pub yearly_end: Option<(u32, u32)>,
}

impl DateWindow {
    /// Unbounded window admitting everything.
    pub fn open() -> Self {
        Self::default()
    }

    /// Whether a timestamp is admitted. Unknown recency (`None`) always is.
    pub fn admits(&self, timestamp: Option<NaiveDate>) -> bool {
        self.admits_at(timestamp, Utc::now().date_naive())
    }

    /// Like [`admits`](Self::admits) with an explicit "today", which bounds
    /// the recurring-yearly expansion.
    pub fn admits_at(&self, timestamp: Option<NaiveDate>, today: NaiveDate) -> bool {
        let Some(ts) = timestamp else {
            return true;
        };

        if let (Some(begin), Some((month, day))) = (self.begin, self.yearly_end) {
            // An absolute end bound caps the recurring range.
            if let Some(end) = self.end {
                if ts > end {
                    return false;
                }
            }
            for year in begin.year()..=today.year() {
                let lo = NaiveDate::from_ymd_opt(year, begin.month(), begin.day());
                let hi = NaiveDate::from_ymd_opt(year, month, day);
                if let (Some(lo), Some(hi)) = (lo, hi) {
                    if ts >= lo && ts <= hi {
                        return true;
                    }
                }
            }
            return false;
        }

        if let Some(begin) = self.begin {
            if ts < begin {
                return false;
            }
        }
        if let Some(end) = self.end {
            if ts > end {
                return false;
            }
        }
        true
    }
}
