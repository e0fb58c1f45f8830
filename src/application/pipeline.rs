// Archive pipeline - resolve, build, fetch, normalize and assemble for one user action
use crate::application::archive_client::{ArchiveClient, ArchiveRequest};
use crate::application::assembler::assemble;
use crate::application::batched_fetcher::BatchedFetcher;
use crate::application::normalizer::{normalize, normalize_snapshot, parse_payload};
use crate::application::observer::{PipelineEvent, PipelineObserver, TracingObserver};
use crate::application::request_builder::RequestBuilder;
use crate::domain::binning::{ResolvedBinning, TimeSpecResolver};
use crate::domain::error::{FetchError, PipelineError};
use crate::domain::operator::Operator;
use crate::domain::series::{NormalizedPoint, NormalizedSeries, SeriesMatrix};
use crate::domain::time_range::{Query, TimeRange};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

const DAY_SECS: i64 = 86_400;
const WEEK_SECS: i64 = 7 * DAY_SECS;

/// Request deadlines picked by the span being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutTiers {
    pub default: Duration,
    pub long: Duration,
    pub extended: Duration,
}

impl Default for TimeoutTiers {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(30),
            long: Duration::from_secs(60),
            extended: Duration::from_secs(120),
        }
    }
}

impl TimeoutTiers {
    pub fn for_span(&self, span_secs: i64) -> Duration {
        if span_secs <= DAY_SECS {
            self.default
        } else if span_secs <= WEEK_SECS {
            self.long
        } else {
            self.extended
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeriesRequest {
    pub pvs: Vec<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub target_width: u32,
    /// Falls back to the pipeline's default operator.
    pub operator: Option<Operator>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PvOutcome {
    pub pv: String,
    pub unit: String,
    pub points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FetchError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub binning: ResolvedBinning,
    pub matrix: SeriesMatrix,
    pub series: Vec<NormalizedSeries>,
    pub outcomes: Vec<PvOutcome>,
}

pub struct ArchivePipeline {
    resolver: TimeSpecResolver,
    builder: RequestBuilder,
    fetcher: BatchedFetcher,
    default_operator: Operator,
    timeouts: TimeoutTiers,
    observer: Arc<dyn PipelineObserver>,
    last_matrix: RwLock<Option<SeriesMatrix>>,
}

impl ArchivePipeline {
    pub fn new(
        client: Arc<dyn ArchiveClient>,
        resolver: TimeSpecResolver,
        builder: RequestBuilder,
        batch_size: usize,
        default_operator: Operator,
        timeouts: TimeoutTiers,
    ) -> Self {
        Self {
            resolver,
            builder,
            fetcher: BatchedFetcher::new(client, batch_size),
            default_operator,
            timeouts,
            observer: Arc::new(TracingObserver),
            last_matrix: RwLock::new(None),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fetches every PV and assembles the matrix. Only invalid input fails the
    /// call; per-PV failures are reported in `outcomes` with an empty series.
    pub async fn run(&self, request: &SeriesRequest) -> Result<PipelineOutcome, PipelineError> {
        let pvs = unique_pvs(&request.pvs);
        if pvs.is_empty() {
            return Err(PipelineError::NoPvs);
        }

        let range = TimeRange::new(request.from, request.to)?;
        let queries = pvs
            .iter()
            .map(|pv| Query::new(pv.clone(), range, request.target_width))
            .collect::<Result<Vec<_>, _>>()?;

        let operator = request.operator.unwrap_or(self.default_operator);
        let binning = self.resolver.resolve(&range, request.target_width, operator);
        self.observer.on_event(&PipelineEvent::BinningResolved {
            binning,
            span_secs: range.duration_secs(),
        });

        let requests: Vec<ArchiveRequest> = queries
            .iter()
            .map(|q| self.builder.build(q.pv(), q.range().from(), q.range().to(), &binning))
            .collect();
        let timeout = self.timeouts.for_span(range.duration_secs());
        let responses = self
            .fetcher
            .fetch_all(&requests, timeout, self.observer.as_ref())
            .await;

        let mut series = Vec::with_capacity(queries.len());
        let mut outcomes = Vec::with_capacity(queries.len());
        for (query, response) in queries.iter().zip(responses) {
            let pv = query.pv();
            let parsed = response.and_then(|body| {
                parse_payload(pv, &body).map(|payload| normalize(pv, payload.unit, payload.data))
            });
            let (normalized, error) = match parsed {
                Ok(normalized) => (normalized, None),
                Err(error) => {
                    self.observer.on_event(&PipelineEvent::RequestFailed {
                        pv: pv.to_string(),
                        error: error.clone(),
                    });
                    (NormalizedSeries::empty(pv.to_string(), String::new()), Some(error))
                }
            };

            self.observer.on_event(&PipelineEvent::SeriesNormalized {
                pv: pv.to_string(),
                points: normalized.len(),
            });
            outcomes.push(PvOutcome {
                pv: pv.to_string(),
                unit: normalized.unit.clone(),
                points: normalized.len(),
                error,
            });
            series.push(normalized);
        }

        let matrix = assemble(&pvs, &series);
        self.observer.on_event(&PipelineEvent::MatrixAssembled {
            timestamps: matrix.timestamps.len(),
            columns: matrix.columns.len(),
        });

        if outcomes.iter().any(|o| o.error.is_none()) {
            self.store_matrix(matrix.clone());
        }

        Ok(PipelineOutcome {
            binning,
            matrix,
            series,
            outcomes,
        })
    }

    /// Latest value of each PV via the point-in-time endpoint.
    pub async fn current(
        &self,
        pvs: &[String],
        at: DateTime<Utc>,
    ) -> Result<BTreeMap<String, Option<NormalizedPoint>>, PipelineError> {
        let pvs = unique_pvs(pvs);
        if pvs.is_empty() {
            return Err(PipelineError::NoPvs);
        }

        let request = self.builder.build_at_time(&pvs, at);
        let response = self
            .fetcher
            .fetch_all(std::slice::from_ref(&request), self.timeouts.default, self.observer.as_ref())
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| Err(FetchError::malformed("no response")));

        let snapshot = response.and_then(|body| normalize_snapshot(&pvs, &body))?;
        Ok(snapshot)
    }

    /// The matrix of the last run where at least one PV succeeded.
    pub fn last_matrix(&self) -> Option<SeriesMatrix> {
        match self.last_matrix.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_matrix(&self, matrix: SeriesMatrix) {
        let mut guard = match self.last_matrix.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(matrix);
    }
}

/// Trimmed, non-empty, first occurrence wins.
fn unique_pvs(pvs: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    pvs.iter()
        .map(|pv| pv.trim())
        .filter(|pv| !pv.is_empty() && seen.insert(pv.to_string()))
        .map(str::to_string)
        .collect()
}
