// Response normalizer - tolerant parsing of archive payloads into uniform series
use crate::domain::error::FetchError;
use crate::domain::series::{NormalizedPoint, NormalizedSeries, RawPoint, SampleValue};
use serde_json::Value;
use std::collections::BTreeMap;

/// One PV's entry in a `getData.json` response, borrowed from the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PvPayload<'a> {
    pub name: &'a str,
    pub unit: &'a str,
    pub data: &'a [Value],
}

/// Picks the entry for `pv` out of a range response body. Falls back to the
/// first entry when no `meta.name` matches, since one request carries one PV.
pub fn parse_payload<'a>(pv: &'a str, body: &'a Value) -> Result<PvPayload<'a>, FetchError> {
    let entries = body
        .as_array()
        .ok_or_else(|| FetchError::malformed("response body is not an array"))?;

    let Some(entry) = entries
        .iter()
        .find(|e| meta_str(e, "name") == Some(pv))
        .or_else(|| entries.first())
    else {
        tracing::debug!(pv = %pv, "Archive returned no entries");
        return Ok(PvPayload {
            name: pv,
            unit: "",
            data: &[],
        });
    };

    let data = entry
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::malformed(format!("'data' of {} is missing or not a list", pv)))?;

    Ok(PvPayload {
        name: meta_str(entry, "name").unwrap_or(pv),
        unit: meta_str(entry, "EGU").unwrap_or_default(),
        data: data.as_slice(),
    })
}

fn meta_str<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get("meta")?.get(key)?.as_str()
}

/// Builds a strictly ascending series, silently dropping samples that fail
/// validation. On equal timestamps the first arrival wins.
pub fn normalize(pv: &str, unit: &str, raw_points: &[Value]) -> NormalizedSeries {
    let mut points: Vec<NormalizedPoint> = raw_points
        .iter()
        .filter_map(parse_point)
        .map(|p| p.normalize())
        .collect();

    // stable: ties keep arrival order before dedup
    points.sort_by_key(|p| p.timestamp_ms);
    points.dedup_by_key(|p| p.timestamp_ms);

    if points.len() < raw_points.len() {
        tracing::trace!(
            pv = %pv,
            dropped = raw_points.len() - points.len(),
            "Dropped invalid or duplicate samples"
        );
    }

    NormalizedSeries {
        name: pv.to_string(),
        unit: unit.to_string(),
        points,
    }
}

/// Validates one archive sample, deciding its value shape once.
pub fn parse_point(raw: &Value) -> Option<RawPoint> {
    let secs = whole_number(raw.get("secs")?)?;
    // the millisecond timestamp must fit
    secs.checked_mul(1000)?.checked_add(999)?;

    let nanos = match raw.get("nanos") {
        None | Some(Value::Null) => 0,
        Some(n) => {
            let n = whole_number(n)?;
            if !(0..1_000_000_000).contains(&n) {
                return None;
            }
            n as u32
        }
    };

    let value = parse_value(raw.get("val")?)?;

    Some(RawPoint {
        secs,
        nanos,
        value,
        severity: small_int(raw.get("severity")),
        status: small_int(raw.get("status")),
    })
}

fn parse_value(val: &Value) -> Option<SampleValue> {
    if let Value::Array(items) = val {
        if items.len() != 5 {
            return None;
        }
        let numbers: Vec<f64> = items.iter().map(finite).collect::<Option<_>>()?;
        let &[mean, stddev, min, max, count] = numbers.as_slice() else {
            return None;
        };
        if !(min <= mean && mean <= max) || stddev < 0.0 || count < 0.0 {
            return None;
        }
        return Some(SampleValue::Statistical {
            mean,
            stddev,
            min,
            max,
            count: count.round() as u64,
        });
    }

    finite(val).map(SampleValue::Raw)
}

fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

fn whole_number(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = finite(value)?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
}

fn small_int(value: Option<&Value>) -> i32 {
    value
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(0)
}

/// Normalizes a `getDataAtTime` response: PV name to its latest sample, `None`
/// when the archive has nothing valid for a requested PV.
pub fn normalize_snapshot(
    pvs: &[String],
    body: &Value,
) -> Result<BTreeMap<String, Option<NormalizedPoint>>, FetchError> {
    let entries = body
        .as_object()
        .ok_or_else(|| FetchError::malformed("point-in-time body is not an object"))?;

    Ok(pvs
        .iter()
        .map(|pv| {
            let point = entries
                .get(pv)
                .and_then(parse_point)
                .map(|p| p.normalize());
            (pv.clone(), point)
        })
        .collect())
}
