// Bin size and operator selection for a requested range and display width
use crate::domain::operator::Operator;
use crate::domain::time_range::TimeRange;
use serde::{Deserialize, Serialize};

/// Canonical bin sizes in seconds, ascending.
pub const DEFAULT_BIN_LADDER: [u64; 12] = [
    1, 5, 10, 30, 60, 300, 900, 1800, 3600, 7200, 14400, 86400,
];

/// Ranges at or below this many seconds are fetched as raw samples.
pub const DEFAULT_RAW_CUTOFF_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningStrategy {
    /// Snap to the nearest ladder bin size.
    #[default]
    Ladder,
    /// Let the archive reduce to `optimized_<width>`.
    ServerOptimized,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResolvedBinning {
    Raw,
    Binned { operator: Operator, bin_size_secs: u64 },
    Delegated { operator: Operator },
}

impl ResolvedBinning {
    /// The PV expression sent to the archive for this binning.
    pub fn pv_expression(&self, pv: &str) -> String {
        match self {
            ResolvedBinning::Raw => pv.to_string(),
            ResolvedBinning::Binned {
                operator,
                bin_size_secs,
            } => operator.expression(pv, Some(*bin_size_secs)),
            ResolvedBinning::Delegated { operator } => operator.expression(pv, None),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, ResolvedBinning::Raw)
    }
}

#[derive(Debug, Clone)]
pub struct TimeSpecResolver {
    strategy: BinningStrategy,
    ladder: Vec<u64>,
    raw_cutoff_secs: i64,
}

impl Default for TimeSpecResolver {
    fn default() -> Self {
        Self::new(
            BinningStrategy::Ladder,
            DEFAULT_BIN_LADDER.to_vec(),
            DEFAULT_RAW_CUTOFF_SECS,
        )
    }
}

impl TimeSpecResolver {
    pub fn new(strategy: BinningStrategy, ladder: Vec<u64>, raw_cutoff_secs: i64) -> Self {
        let mut ladder: Vec<u64> = ladder.into_iter().filter(|b| *b >= 1).collect();
        ladder.sort_unstable();
        ladder.dedup();
        if ladder.is_empty() {
            tracing::warn!("Empty bin ladder configured, falling back to defaults");
            ladder = DEFAULT_BIN_LADDER.to_vec();
        }

        Self {
            strategy,
            ladder,
            raw_cutoff_secs,
        }
    }

    /// Decide between raw samples and `operator` applied over a bin size.
    /// Short ranges always come back raw, whatever operator was asked for.
    pub fn resolve(&self, range: &TimeRange, target_width: u32, operator: Operator) -> ResolvedBinning {
        let duration = range.duration_secs();
        if duration <= self.raw_cutoff_secs {
            return ResolvedBinning::Raw;
        }

        match self.strategy {
            BinningStrategy::Ladder => ResolvedBinning::Binned {
                operator,
                bin_size_secs: self.snap(Self::raw_bin_size(duration, target_width)),
            },
            BinningStrategy::ServerOptimized => ResolvedBinning::Delegated {
                operator: Operator::Optimized {
                    points: target_width.max(1),
                },
            },
        }
    }

    /// About two seconds of data per rendered pixel; one bin per two pixels.
    fn raw_bin_size(duration_secs: i64, target_width: u32) -> u64 {
        let half_width = u64::from((target_width / 2).max(1));
        let duration = duration_secs.max(0) as u64;
        duration.div_ceil(half_width).max(1)
    }

    /// First ladder entry at or above `raw`, else the largest.
    fn snap(&self, raw: u64) -> u64 {
        self.ladder
            .iter()
            .copied()
            .find(|bin| *bin >= raw)
            .or_else(|| self.ladder.last().copied())
            .unwrap_or(raw)
    }
}
