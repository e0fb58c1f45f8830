// Archive samples and the normalized series handed to renderers
use serde::Serialize;

/// The `val` of an archive sample, decided once when the sample is parsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Raw(f64),
    Statistical {
        mean: f64,
        stddev: f64,
        min: f64,
        max: f64,
        count: u64,
    },
}

/// A validated archive sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub secs: i64,
    pub nanos: u32,
    pub value: SampleValue,
    pub severity: i32,
    pub status: i32,
}

impl RawPoint {
    pub fn timestamp_ms(&self) -> i64 {
        self.secs * 1000 + i64::from(self.nanos / 1_000_000)
    }

    pub fn normalize(&self) -> NormalizedPoint {
        let (value, min, max, stddev, count) = match self.value {
            SampleValue::Raw(v) => (v, v, v, 0.0, 1),
            SampleValue::Statistical {
                mean,
                stddev,
                min,
                max,
                count,
            } => (mean, min, max, stddev, count),
        };

        NormalizedPoint {
            timestamp_ms: self.timestamp_ms(),
            value,
            min,
            max,
            stddev,
            count,
            severity: self.severity,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPoint {
    pub timestamp_ms: i64,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
    pub count: u64,
    pub severity: i32,
    pub status: i32,
}

/// One PV's points, strictly ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSeries {
    pub name: String,
    pub unit: String,
    pub points: Vec<NormalizedPoint>,
}

impl NormalizedSeries {
    pub fn empty(name: String, unit: String) -> Self {
        Self {
            name,
            unit,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesColumn {
    pub name: String,
    pub unit: String,
    /// Aligned to `SeriesMatrix::timestamps`; `None` means no sample there.
    pub values: Vec<Option<f64>>,
}

/// All series on one shared timestamp axis. Columns keep request order.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SeriesMatrix {
    pub timestamps: Vec<i64>,
    pub columns: Vec<SeriesColumn>,
}

impl SeriesMatrix {
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }
}
