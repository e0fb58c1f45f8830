// Time ranges and per-PV queries
use crate::domain::error::PipelineError;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("relative range '{0}' must look like 15m, 6h or 7d")]
    BadRelative(String),

    #[error("timestamp '{0}' is not RFC 3339")]
    BadTimestamp(String),
}

impl From<RangeError> for PipelineError {
    fn from(err: RangeError) -> Self {
        PipelineError::InvalidRange(err.to_string())
    }
}

/// A half-open span `[from, to)` with `to > from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, PipelineError> {
        if to <= from {
            return Err(PipelineError::InvalidRange(format!(
                "end {} is not after start {}",
                to.to_rfc3339(),
                from.to_rfc3339()
            )));
        }
        Ok(Self { from, to })
    }

    /// The trailing window ending at `now`.
    pub fn trailing(now: DateTime<Utc>, window: Duration) -> Result<Self, PipelineError> {
        let from = now.checked_sub_signed(window).ok_or_else(|| {
            PipelineError::InvalidRange(format!("window of {}s is out of range", window.num_seconds()))
        })?;
        Self::new(from, now)
    }

    /// Parses `<n>m`, `<n>h` or `<n>d` into a window ending at `now`.
    pub fn parse_relative(window: &str, now: DateTime<Utc>) -> Result<Self, PipelineError> {
        let window = window.trim();
        let bad = || PipelineError::from(RangeError::BadRelative(window.to_string()));

        let unit = window.chars().last().ok_or_else(bad)?;
        let amount: i64 = window[..window.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| bad())?;
        if amount <= 0 {
            return Err(bad());
        }

        let span = match unit {
            'm' => Duration::try_minutes(amount),
            'h' => Duration::try_hours(amount),
            'd' => Duration::try_days(amount),
            _ => return Err(bad()),
        }
        .ok_or_else(bad)?;

        Self::trailing(now, span)
    }

    pub fn parse_absolute(from: &str, to: &str) -> Result<Self, PipelineError> {
        let parse = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| RangeError::BadTimestamp(s.to_string()))
        };
        Self::new(parse(from)?, parse(to)?)
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    /// Whole seconds covered by the range.
    pub fn duration_secs(&self) -> i64 {
        (self.to - self.from).num_seconds()
    }
}

/// One PV over one range at one display width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pv: String,
    range: TimeRange,
    target_width: u32,
}

impl Query {
    pub fn new(pv: String, range: TimeRange, target_width: u32) -> Result<Self, PipelineError> {
        if target_width < 1 {
            return Err(PipelineError::InvalidRange(
                "target width must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            pv,
            range,
            target_width,
        })
    }

    pub fn pv(&self) -> &str {
        &self.pv
    }

    pub fn range(&self) -> &TimeRange {
        &self.range
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }
}
