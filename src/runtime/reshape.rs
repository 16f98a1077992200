//! Long `(time, metric, value)` streams pivoted into one column per metric.

use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet};

use crate::{Metric, MetricSample, Stamped};

/// All cells observed at one relative time. Metrics not logged at that time are absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideRow {
    pub relative_time: f64,
    pub cells: BTreeMap<Metric, f64>,
}

/// Rows strictly increasing in relative time, at most one cell per metric per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideTable {
    rows: Vec<WideRow>,
    collisions: usize,
}

impl WideTable {
    pub fn rows(&self) -> &[WideRow] {
        &self.rows
    }

    /// Samples that were overwritten by a later sample at the same `(time, metric)`.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn metrics(&self) -> BTreeSet<Metric> {
        self.rows
            .iter()
            .flat_map(|row| row.cells.keys().copied())
            .collect()
    }

    pub fn row_at(&self, relative_time: f64) -> Option<&WideRow> {
        self.rows
            .binary_search_by(|row| row.relative_time.total_cmp(&relative_time))
            .ok()
            .map(|idx| &self.rows[idx])
    }

    /// Present cells of `metric` in time order; `None` when the metric has no column.
    pub fn column(&self, metric: Metric) -> Option<Vec<(f64, f64)>> {
        let points: Vec<(f64, f64)> = self
            .rows
            .iter()
            .filter_map(|row| row.cells.get(&metric).map(|v| (row.relative_time, *v)))
            .collect();
        if points.is_empty() { None } else { Some(points) }
    }

    pub fn max_relative_time(&self) -> Option<f64> {
        self.rows.last().map(|row| row.relative_time)
    }
}

/// Pivots time-sorted samples into a [`WideTable`].
///
/// When several samples share a `(relative_time, metric)` pair the last one in
/// input order wins. Columns of `cumulative` metrics are replaced by their
/// running sum over increasing time.
pub fn reshape(samples: &[Stamped<MetricSample>], cumulative: &BTreeSet<Metric>) -> WideTable {
    let mut rows: Vec<WideRow> = Vec::new();
    let mut collided: BTreeMap<Metric, usize> = BTreeMap::new();

    for sample in samples {
        let start_row = match rows.last() {
            Some(row) => row.relative_time.total_cmp(&sample.relative_time).is_ne(),
            None => true,
        };
        if start_row {
            rows.push(WideRow {
                relative_time: sample.relative_time,
                cells: BTreeMap::new(),
            });
        }
        let Some(row) = rows.last_mut() else {
            continue;
        };
        if row
            .cells
            .insert(sample.record.metric, sample.record.value)
            .is_some()
        {
            *collided.entry(sample.record.metric).or_default() += 1;
        }
    }

    let collisions: usize = collided.values().sum();
    if collisions > 0 {
        let per_metric: Vec<String> = collided.iter().map(|(m, n)| format!("{m}={n}")).collect();
        tracing::debug!(
            collisions,
            metrics = %per_metric.join(","),
            "duplicate (time, metric) samples resolved last-wins"
        );
    }

    for metric in cumulative {
        let mut running = 0.0;
        for row in &mut rows {
            if let Some(cell) = row.cells.get_mut(metric) {
                running += *cell;
                *cell = running;
            }
        }
    }

    WideTable { rows, collisions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogKind, normalize};

    fn stamped(raw: &[(f64, Metric, f64)]) -> Vec<Stamped<MetricSample>> {
        let samples = raw
            .iter()
            .map(|&(time, metric, value)| MetricSample {
                time,
                metric,
                value,
            })
            .collect();
        normalize("p", LogKind::Metrics, samples, |s| s.time)
            .expect("timeline")
            .entries()
            .to_vec()
    }

    #[test]
    fn duplicate_time_and_metric_keeps_last_value() {
        let samples = stamped(&[
            (0.0, Metric::Inflight, 1.0),
            (5.0, Metric::Latency, 3.0),
            (5.0, Metric::Latency, 7.0),
        ]);
        let table = reshape(&samples, &BTreeSet::new());
        let row = table.row_at(5.0).expect("row");
        assert_eq!(row.cells.get(&Metric::Latency), Some(&7.0));
        assert_eq!(row.cells.len(), 1);
        assert_eq!(table.collisions(), 1);
    }

    #[test]
    fn reshape_is_deterministic() {
        let samples = stamped(&[
            (2.0, Metric::Latency, 4.0),
            (1.0, Metric::Inflight, 2.0),
            (2.0, Metric::Latency, 1.0),
            (2.0, Metric::Inflight, 9.0),
        ]);
        let cumulative = BTreeSet::from([Metric::Inflight]);
        assert_eq!(reshape(&samples, &cumulative), reshape(&samples, &cumulative));
    }

    #[test]
    fn absent_cells_stay_absent() {
        let samples = stamped(&[(0.0, Metric::Latency, 1.0), (1.0, Metric::Inflight, 2.0)]);
        let table = reshape(&samples, &BTreeSet::new());
        assert_eq!(table.rows().len(), 2);
        assert!(!table.rows()[0].cells.contains_key(&Metric::Inflight));
        assert_eq!(table.column(Metric::Latency), Some(vec![(0.0, 1.0)]));
        assert_eq!(table.column(Metric::Throughput), None);
    }

    #[test]
    fn cumulative_column_is_running_sum() {
        let samples = stamped(&[
            (0.0, Metric::Wait, 1.0),
            (1.0, Metric::Latency, 5.0),
            (2.0, Metric::Wait, 0.0),
            (3.0, Metric::Wait, 1.0),
        ]);
        let table = reshape(&samples, &BTreeSet::from([Metric::Wait]));
        let values: Vec<f64> = table
            .column(Metric::Wait)
            .expect("wait column")
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![1.0, 1.0, 2.0]);
        assert_eq!(table.column(Metric::Latency), Some(vec![(1.0, 5.0)]));
    }

    #[test]
    fn same_tick_wait_entries_count_once() {
        let samples = stamped(&[
            (102.0, Metric::Wait, 1.0),
            (102.0, Metric::Wait, 1.0),
            (103.0, Metric::Wait, 0.0),
            (103.0, Metric::Wait, 0.0),
        ]);
        let table = reshape(&samples, &BTreeSet::from([Metric::Wait]));
        assert_eq!(
            table.column(Metric::Wait),
            Some(vec![(0.0, 1.0), (1.0, 1.0)])
        );
        assert_eq!(table.collisions(), 2);
    }

    #[test]
    fn rows_are_strictly_increasing() {
        let samples = stamped(&[
            (3.0, Metric::Latency, 1.0),
            (1.0, Metric::Latency, 1.0),
            (3.0, Metric::Inflight, 1.0),
            (2.0, Metric::Inflight, 1.0),
        ]);
        let table = reshape(&samples, &BTreeSet::new());
        let times: Vec<f64> = table.rows().iter().map(|r| r.relative_time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(
            table.metrics(),
            BTreeSet::from([Metric::Latency, Metric::Inflight])
        );
    }
}
