use crate::application::batched_fetcher::DEFAULT_BATCH_SIZE;
use crate::application::live_poller::LiveSettings;
use crate::application::pipeline::TimeoutTiers;
use crate::domain::binning::{
    BinningStrategy, DEFAULT_BIN_LADDER, DEFAULT_RAW_CUTOFF_SECS, TimeSpecResolver,
};
use crate::domain::operator::{Operator, OperatorError};
use chrono::FixedOffset;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ArchiverConfig {
    pub server: ServerSettings,
    pub archive: ArchiveSettings,
    pub timeouts: TimeoutSettings,
    pub fetch: FetchSettings,
    pub target_points: TargetPoints,
    pub binning: BinningSettings,
    pub live: LiveConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ArchiveSettings {
    pub base_url: String,
    /// Offset written into archive timestamps, in minutes east of UTC.
    pub utc_offset_minutes: i32,
    pub do_not_chunk: bool,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            base_url: "http://lcls-archapp.slac.stanford.edu/retrieval/data".to_string(),
            utc_offset_minutes: 0,
            do_not_chunk: false,
        }
    }
}

impl ArchiveSettings {
    pub fn utc_offset(&self) -> anyhow::Result<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                anyhow::anyhow!("utc_offset_minutes {} is out of range", self.utc_offset_minutes)
            })
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeoutSettings {
    pub default_ms: u64,
    pub long_ms: u64,
    pub extended_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_ms: 30_000,
            long_ms: 60_000,
            extended_ms: 120_000,
        }
    }
}

impl TimeoutSettings {
    pub fn tiers(&self) -> TimeoutTiers {
        TimeoutTiers {
            default: Duration::from_millis(self.default_ms),
            long: Duration::from_millis(self.long_ms),
            extended: Duration::from_millis(self.extended_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FetchSettings {
    pub batch_size: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TargetPoints {
    pub default: u32,
    pub high: u32,
    pub low: u32,
}

impl Default for TargetPoints {
    fn default() -> Self {
        Self {
            default: 1000,
            high: 2000,
            low: 500,
        }
    }
}

impl TargetPoints {
    /// Width for a named resolution preset.
    pub fn for_resolution(&self, resolution: &str) -> Option<u32> {
        match resolution {
            "low" => Some(self.low),
            "default" => Some(self.default),
            "high" => Some(self.high),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BinningSettings {
    pub strategy: BinningStrategy,
    pub raw_cutoff_secs: i64,
    pub ladder: Vec<u64>,
    pub default_operator: String,
}

impl Default for BinningSettings {
    fn default() -> Self {
        Self {
            strategy: BinningStrategy::Ladder,
            raw_cutoff_secs: DEFAULT_RAW_CUTOFF_SECS,
            ladder: DEFAULT_BIN_LADDER.to_vec(),
            default_operator: "mean".to_string(),
        }
    }
}

impl BinningSettings {
    pub fn resolver(&self) -> TimeSpecResolver {
        TimeSpecResolver::new(self.strategy, self.ladder.clone(), self.raw_cutoff_secs)
    }

    pub fn default_operator(&self) -> Result<Operator, OperatorError> {
        self.default_operator.parse()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LiveConfig {
    pub interval_secs: u64,
    pub window_secs: i64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            window_secs: 300,
        }
    }
}

impl LiveConfig {
    pub fn window(&self) -> anyhow::Result<chrono::Duration> {
        chrono::Duration::try_seconds(self.window_secs.max(1))
            .ok_or_else(|| anyhow::anyhow!("live window_secs {} is out of range", self.window_secs))
    }

    /// An unrepresentable window saturates; the poller then reports it as an invalid range.
    pub fn settings(&self, target_width: u32, operator: Option<Operator>) -> LiveSettings {
        LiveSettings {
            interval: Duration::from_secs(self.interval_secs.max(1)),
            window: self.window().unwrap_or(chrono::Duration::MAX),
            target_width,
            operator,
        }
    }
}

impl ArchiverConfig {
    /// Rejects values that would only fail later, at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.archive.utc_offset()?;
        self.live.window()?;
        self.binning
            .default_operator()
            .map_err(|e| anyhow::anyhow!("binning.default_operator: {}", e))?;
        Ok(())
    }
}

/// `config/archiver.*` if present, overridden by `ARCHIVER__SECTION__KEY` variables.
pub fn load_archiver_config() -> anyhow::Result<ArchiverConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/archiver").required(false))
        .add_source(
            config::Environment::with_prefix("ARCHIVER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("binning.ladder"),
        )
        .build()?;

    let config: ArchiverConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> ArchiverConfig {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("");
        assert_eq!(config, ArchiverConfig::default());
        assert_eq!(config.fetch.batch_size, 5);
        assert_eq!(config.timeouts.tiers(), TimeoutTiers::default());
        assert_eq!(config.binning.default_operator(), Ok(Operator::Mean));
        assert_eq!(config.archive.utc_offset().unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn test_partial_override() {
        let config = from_toml(
            r#"
            [archive]
            base_url = "http://localhost:17665/retrieval/data"
            utc_offset_minutes = -480

            [fetch]
            batch_size = 10

            [binning]
            strategy = "server_optimized"
            ladder = [60, 600]
            default_operator = "firstSample"
            "#,
        );

        assert_eq!(config.archive.base_url, "http://localhost:17665/retrieval/data");
        assert_eq!(config.archive.utc_offset().unwrap().local_minus_utc(), -8 * 3600);
        assert!(!config.archive.do_not_chunk);
        assert_eq!(config.fetch.batch_size, 10);
        assert_eq!(config.binning.strategy, BinningStrategy::ServerOptimized);
        assert_eq!(config.binning.ladder, vec![60, 600]);
        assert_eq!(config.binning.raw_cutoff_secs, 3600);
        assert_eq!(config.binning.default_operator(), Ok(Operator::FirstSample));
        assert_eq!(config.timeouts.default_ms, 30_000);
    }

    #[test]
    fn test_bad_offset_and_operator_are_reported() {
        let mut config = ArchiverConfig::default();
        config.archive.utc_offset_minutes = 24 * 60;
        assert!(config.archive.utc_offset().is_err());

        config.binning.default_operator = "nth".to_string();
        assert!(config.binning.default_operator().is_err());
    }

    #[test]
    fn test_overflowing_values_fail_validation() {
        assert!(ArchiverConfig::default().validate().is_ok());

        let mut config = ArchiverConfig::default();
        config.archive.utc_offset_minutes = i32::MAX;
        assert!(config.archive.utc_offset().is_err());
        assert!(config.validate().is_err());

        let mut config = ArchiverConfig::default();
        config.live.window_secs = i64::MAX;
        assert!(config.live.window().is_err());
        assert!(config.validate().is_err());
        assert_eq!(config.live.settings(100, None).window, chrono::Duration::MAX);
    }

    #[test]
    fn test_resolution_presets() {
        let points = TargetPoints::default();
        assert_eq!(points.for_resolution("low"), Some(500));
        assert_eq!(points.for_resolution("high"), Some(2000));
        assert_eq!(points.for_resolution("ultra"), None);
    }

    #[test]
    fn test_live_settings() {
        let live = LiveConfig::default().settings(800, None);
        assert_eq!(live.interval, Duration::from_secs(5));
        assert_eq!(live.window.num_seconds(), 300);
        assert_eq!(live.target_width, 800);
    }
}
