//! Relative-time normalization for one run's records.

use serde::Serialize;

use crate::{LogKind, TraceGridError, TraceGridResult};

/// A record placed on its run's relative timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stamped<T> {
    pub time: f64,
    pub relative_time: f64,
    pub record: T,
}

/// Records sorted by time and rebased onto a run-local zero-point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline<T> {
    zero: f64,
    entries: Vec<Stamped<T>>,
}

impl<T> Timeline<T> {
    pub fn zero(&self) -> f64 {
        self.zero
    }

    pub fn entries(&self) -> &[Stamped<T>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_relative_time(&self) -> Option<f64> {
        self.entries.last().map(|e| e.relative_time)
    }
}

/// Smallest timestamp, which becomes relative time zero.
pub fn zero_point(
    run: &str,
    kind: LogKind,
    timestamps: impl IntoIterator<Item = f64>,
) -> TraceGridResult<f64> {
    timestamps
        .into_iter()
        .min_by(f64::total_cmp)
        .ok_or_else(|| TraceGridError::EmptyInput {
            run: run.to_string(),
            kind,
        })
}

/// Sorts `records` by `time_of` and rebases them on their own minimum.
pub fn normalize<T>(
    run: &str,
    kind: LogKind,
    records: Vec<T>,
    time_of: impl Fn(&T) -> f64,
) -> TraceGridResult<Timeline<T>> {
    let zero = zero_point(run, kind, records.iter().map(&time_of))?;
    Ok(rebase(records, zero, time_of))
}

/// Sorts `records` by `time_of` and rebases them on a zero-point chosen by the caller.
///
/// The sort is stable, so records sharing a timestamp keep their log order.
pub fn rebase<T>(records: Vec<T>, zero: f64, time_of: impl Fn(&T) -> f64) -> Timeline<T> {
    let mut entries: Vec<Stamped<T>> = records
        .into_iter()
        .map(|record| {
            let time = time_of(&record);
            Stamped {
                time,
                relative_time: time - zero,
                record,
            }
        })
        .collect();
    entries.sort_by(|a, b| a.time.total_cmp(&b.time));
    Timeline { zero, entries }
}
