// Series assembler - aligns per-PV series on a shared timestamp axis
use crate::domain::series::{NormalizedPoint, NormalizedSeries, SeriesColumn, SeriesMatrix};
use std::collections::BTreeSet;

/// One column per requested PV, in request order. PVs without a series come
/// back as all-null columns; series for PVs that were not requested are ignored.
pub fn assemble(requested: &[String], series: &[NormalizedSeries]) -> SeriesMatrix {
    let lookup = |pv: &str| series.iter().find(|s| s.name == pv);

    let timestamps: Vec<i64> = requested
        .iter()
        .filter_map(|pv| lookup(pv.as_str()))
        .flat_map(|s| s.points.iter().map(|p| p.timestamp_ms))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let columns = requested
        .iter()
        .map(|pv| match lookup(pv.as_str()) {
            Some(s) => SeriesColumn {
                name: pv.clone(),
                unit: s.unit.clone(),
                values: align(&timestamps, &s.points),
            },
            None => SeriesColumn {
                name: pv.clone(),
                unit: String::new(),
                values: vec![None; timestamps.len()],
            },
        })
        .collect();

    SeriesMatrix {
        timestamps,
        columns,
    }
}

/// Walks the axis and the ascending points together; exact matches only.
fn align(axis: &[i64], points: &[NormalizedPoint]) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(axis.len());
    let mut cursor = points.iter().peekable();

    for ts in axis {
        while cursor.next_if(|p| p.timestamp_ms < *ts).is_some() {}
        values.push(cursor.next_if(|p| p.timestamp_ms == *ts).map(|p| p.value));
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(name: &str, samples: &[(i64, f64)]) -> NormalizedSeries {
        NormalizedSeries {
            name: name.to_string(),
            unit: "mm".to_string(),
            points: samples
                .iter()
                .map(|&(ts, v)| NormalizedPoint {
                    timestamp_ms: ts,
                    value: v,
                    min: v,
                    max: v,
                    stddev: 0.0,
                    count: 1,
                    severity: 0,
                    status: 0,
                })
                .collect(),
        }
    }

    fn names(pvs: &[&str]) -> Vec<String> {
        pvs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_union_axis_with_nulls() {
        let a = series("A", &[(1, 10.0), (3, 30.0)]);
        let b = series("B", &[(2, 20.0), (3, 31.0)]);

        let matrix = assemble(&names(&["A", "B"]), &[a, b]);
        assert_eq!(matrix.timestamps, vec![1, 2, 3]);
        assert_eq!(matrix.column("A").unwrap(), &[Some(10.0), None, Some(30.0)]);
        assert_eq!(matrix.column("B").unwrap(), &[None, Some(20.0), Some(31.0)]);
    }

    #[test]
    fn test_absent_pv_is_all_null_column() {
        let a = series("A", &[(5, 1.0), (6, 2.0)]);
        let matrix = assemble(&names(&["A", "MISSING"]), &[a]);

        assert_eq!(matrix.columns.len(), 2);
        assert_eq!(matrix.columns[1].name, "MISSING");
        assert_eq!(matrix.column("MISSING").unwrap(), &[None, None]);
    }

    #[test]
    fn test_columns_follow_request_order_and_lengths_match() {
        let a = series("A", &[(1, 1.0)]);
        let b = series("B", &[(7, 7.0), (9, 9.0)]);
        let c = series("C", &[]);

        let matrix = assemble(&names(&["C", "B", "A"]), &[a, b, c]);
        let order: Vec<&str> = matrix.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
        for column in &matrix.columns {
            assert_eq!(column.values.len(), matrix.timestamps.len());
        }
        assert_eq!(matrix.columns[0].unit, "mm");
    }

    #[test]
    fn test_unrequested_series_do_not_widen_axis() {
        let a = series("A", &[(1, 1.0)]);
        let stray = series("STRAY", &[(2, 2.0)]);

        let matrix = assemble(&names(&["A"]), &[a, stray]);
        assert_eq!(matrix.timestamps, vec![1]);
        assert_eq!(matrix.columns.len(), 1);
    }

    #[test]
    fn test_nothing_requested() {
        let matrix = assemble(&[], &[]);
        assert!(matrix.timestamps.is_empty());
        assert!(matrix.columns.is_empty());
    }
}
