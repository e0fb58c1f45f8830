// Archive aggregation operators and their expression syntax
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperatorError {
    #[error("unknown operator '{0}'")]
    Unknown(String),

    #[error("operator '{operator}' requires parameter '{param}'")]
    MissingParameter {
        operator: &'static str,
        param: &'static str,
    },

    #[error("operator '{operator}' has invalid parameter '{value}'")]
    InvalidParameter { operator: &'static str, value: String },

    #[error("operator '{0}' takes no parameter")]
    UnexpectedParameter(&'static str),
}

/// A server-side operator applied per bin by the archive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operator {
    FirstSample,
    LastSample,
    FirstFill,
    LastFill,
    Mean,
    Min,
    Max,
    Count,
    Ncount,
    Nth { n: u32 },
    Median,
    Std,
    Jitter,
    Variance,
    PopVariance,
    Kurtosis,
    Skewness,
    IgnoreFlyers { num_deviations: f64 },
    Flyers { num_deviations: f64 },
    Linear,
    Loess,
    Optimized { points: u32 },
    ErrorBar,
}

/// Registry entry describing one operator for UIs.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OperatorInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
}

pub const REGISTRY: &[OperatorInfo] = &[
    OperatorInfo { name: "firstSample", description: "Returns the first sample in a bin", params: &[] },
    OperatorInfo { name: "lastSample", description: "Returns the last sample in a bin", params: &[] },
    OperatorInfo { name: "firstFill", description: "Like firstSample but fills empty bins with the previous value", params: &[] },
    OperatorInfo { name: "lastFill", description: "Like lastSample but fills empty bins with the previous value", params: &[] },
    OperatorInfo { name: "mean", description: "Average value of the samples in a bin", params: &[] },
    OperatorInfo { name: "min", description: "Minimum value in a bin", params: &[] },
    OperatorInfo { name: "max", description: "Maximum value in a bin", params: &[] },
    OperatorInfo { name: "count", description: "Number of samples in a bin", params: &[] },
    OperatorInfo { name: "ncount", description: "Total number of samples in the selected time span", params: &[] },
    OperatorInfo { name: "nth", description: "Every n-th value", params: &["n"] },
    OperatorInfo { name: "median", description: "Median (50th percentile) of a bin", params: &[] },
    OperatorInfo { name: "std", description: "Standard deviation of the samples in a bin", params: &[] },
    OperatorInfo { name: "jitter", description: "Standard deviation divided by mean of a bin", params: &[] },
    OperatorInfo { name: "variance", description: "Variance of the samples in a bin", params: &[] },
    OperatorInfo { name: "popvariance", description: "Population variance of the samples in a bin", params: &[] },
    OperatorInfo { name: "kurtosis", description: "Kurtosis of the samples in a bin", params: &[] },
    OperatorInfo { name: "skewness", description: "Skewness of the samples in a bin", params: &[] },
    OperatorInfo { name: "ignoreflyers", description: "Drops samples more than N standard deviations from the mean", params: &["binSize", "numDeviations"] },
    OperatorInfo { name: "flyers", description: "Keeps only samples more than N standard deviations from the mean", params: &["binSize", "numDeviations"] },
    OperatorInfo { name: "linear", description: "Linear arithmetic mean across the interval", params: &[] },
    OperatorInfo { name: "loess", description: "Loess arithmetic mean across the interval", params: &[] },
    OperatorInfo { name: "optimized", description: "Server-side reduction to the requested number of points", params: &["points"] },
    OperatorInfo { name: "errorbar", description: "Mean with an additional standard deviation column", params: &[] },
];

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::FirstSample => "firstSample",
            Operator::LastSample => "lastSample",
            Operator::FirstFill => "firstFill",
            Operator::LastFill => "lastFill",
            Operator::Mean => "mean",
            Operator::Min => "min",
            Operator::Max => "max",
            Operator::Count => "count",
            Operator::Ncount => "ncount",
            Operator::Nth { .. } => "nth",
            Operator::Median => "median",
            Operator::Std => "std",
            Operator::Jitter => "jitter",
            Operator::Variance => "variance",
            Operator::PopVariance => "popvariance",
            Operator::Kurtosis => "kurtosis",
            Operator::Skewness => "skewness",
            Operator::IgnoreFlyers { .. } => "ignoreflyers",
            Operator::Flyers { .. } => "flyers",
            Operator::Linear => "linear",
            Operator::Loess => "loess",
            Operator::Optimized { .. } => "optimized",
            Operator::ErrorBar => "errorbar",
        }
    }

    /// Operator prefix as it appears in a PV expression, e.g. `mean_900`.
    pub fn prefix(&self, bin_size_secs: Option<u64>) -> String {
        let name = self.name();
        match (self, bin_size_secs) {
            (Operator::Nth { n }, _) => format!("{}_{}", name, n),
            (Operator::Optimized { points }, _) => format!("{}_{}", name, points),
            (Operator::IgnoreFlyers { num_deviations }, Some(bin))
            | (Operator::Flyers { num_deviations }, Some(bin)) => {
                format!("{}_{}_{}", name, bin, num_deviations)
            }
            (_, Some(bin)) => format!("{}_{}", name, bin),
            (_, None) => name.to_string(),
        }
    }

    /// Wrap a PV name: `operator(pv)` or `operator_binSize(pv)`.
    pub fn expression(&self, pv: &str, bin_size_secs: Option<u64>) -> String {
        format!("{}({})", self.prefix(bin_size_secs), pv)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Nth { n } => write!(f, "nth_{}", n),
            Operator::Optimized { points } => write!(f, "optimized_{}", points),
            Operator::IgnoreFlyers { num_deviations } => write!(f, "ignoreflyers_{}", num_deviations),
            Operator::Flyers { num_deviations } => write!(f, "flyers_{}", num_deviations),
            other => f.write_str(other.name()),
        }
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Operator {
    type Err = OperatorError;

    /// Parses `name` or `name_param`, e.g. `mean`, `nth_5`, `flyers_2.5`.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (name, param) = match token.split_once('_') {
            Some((name, param)) => (name, Some(param)),
            None => (token, None),
        };

        let plain = match name {
            "firstSample" => Some(Operator::FirstSample),
            "lastSample" => Some(Operator::LastSample),
            "firstFill" => Some(Operator::FirstFill),
            "lastFill" => Some(Operator::LastFill),
            "mean" => Some(Operator::Mean),
            "min" => Some(Operator::Min),
            "max" => Some(Operator::Max),
            "count" => Some(Operator::Count),
            "ncount" => Some(Operator::Ncount),
            "median" => Some(Operator::Median),
            "std" => Some(Operator::Std),
            "jitter" => Some(Operator::Jitter),
            "variance" => Some(Operator::Variance),
            "popvariance" => Some(Operator::PopVariance),
            "kurtosis" => Some(Operator::Kurtosis),
            "skewness" => Some(Operator::Skewness),
            "linear" => Some(Operator::Linear),
            "loess" => Some(Operator::Loess),
            "errorbar" => Some(Operator::ErrorBar),
            _ => None,
        };

        if let Some(op) = plain {
            return match param {
                None => Ok(op),
                Some(_) => Err(OperatorError::UnexpectedParameter(op.name())),
            };
        }

        match name {
            "nth" => parse_count("nth", "n", param).map(|n| Operator::Nth { n }),
            "optimized" => {
                parse_count("optimized", "points", param).map(|points| Operator::Optimized { points })
            }
            "ignoreflyers" => parse_deviations("ignoreflyers", param)
                .map(|num_deviations| Operator::IgnoreFlyers { num_deviations }),
            "flyers" => parse_deviations("flyers", param)
                .map(|num_deviations| Operator::Flyers { num_deviations }),
            _ => Err(OperatorError::Unknown(token.to_string())),
        }
    }
}

fn parse_count(
    operator: &'static str,
    param_name: &'static str,
    param: Option<&str>,
) -> Result<u32, OperatorError> {
    let raw = param.ok_or(OperatorError::MissingParameter {
        operator,
        param: param_name,
    })?;
    match raw.parse::<u32>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(OperatorError::InvalidParameter {
            operator,
            value: raw.to_string(),
        }),
    }
}

fn parse_deviations(operator: &'static str, param: Option<&str>) -> Result<f64, OperatorError> {
    let raw = param.ok_or(OperatorError::MissingParameter {
        operator,
        param: "numDeviations",
    })?;
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Ok(value),
        _ => Err(OperatorError::InvalidParameter {
            operator,
            value: raw.to_string(),
        }),
    }
}
