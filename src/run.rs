//! One version's logs, normalized and memoized.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::{
    Completion, Consumption, FieldDecoder, LogKind, LogSource, Metric, MetricGroup, MetricSample,
    OccupancyTable, TickDomain, Timeline, TraceGridError, TraceGridResult, WaitInterval,
    WaitPoint, WaitSeries, WideTable, normalize, reshape, step_events, zero_point,
};

/// Which set of logs a run was captured with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLayout {
    /// `completion_log_*`, `consumption_log_*` and `wait_log_*` with start/end intervals.
    #[default]
    Split,
    /// `metric_log_*` triples, plus an optional `wait_log_*` of start/length waits.
    Unified,
}

impl RunLayout {
    pub fn log_kinds(self) -> &'static [LogKind] {
        match self {
            RunLayout::Split => &[LogKind::Completions, LogKind::Consumptions, LogKind::Waits],
            RunLayout::Unified => &[LogKind::Metrics, LogKind::Waits],
        }
    }
}

impl fmt::Display for RunLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunLayout::Split => f.write_str("split"),
            RunLayout::Unified => f.write_str("unified"),
        }
    }
}

impl clap::ValueEnum for RunLayout {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Split, Self::Unified]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Split => clap::builder::PossibleValue::new("split"),
            Self::Unified => clap::builder::PossibleValue::new("unified"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Line,
    FilledArea,
    /// Value holds until the next point.
    Step,
}

/// One metric of one run on the run's relative timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub metric: Metric,
    pub kind: SeriesKind,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn max_value(&self) -> Option<f64> {
        self.points.iter().map(|p| p.1).max_by(f64::total_cmp)
    }
}

/// Completions and consumptions of a split-layout run. Both are built together
/// because together they fix the run's tick domain.
///
/// Each table is rebased on its own earliest timestamp; occupancy ticks are
/// rebased on the domain's first tick.
#[derive(Debug, Clone)]
struct SplitTables {
    ticks: TickDomain,
    completions: Timeline<Completion>,
    consumptions: Timeline<Consumption>,
}

#[derive(Debug, Clone)]
struct UnifiedTables {
    zero: f64,
    metrics: WideTable,
    waits: WaitSeries,
}

/// A labeled run whose derived tables are computed on first access and then
/// returned unchanged for the run's lifetime.
pub struct Run {
    version: String,
    layout: RunLayout,
    source: Arc<dyn LogSource>,
    cumulative: BTreeSet<Metric>,
    split: OnceLock<SplitTables>,
    split_waits: OnceLock<WaitSeries>,
    unified: OnceLock<UnifiedTables>,
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("version", &self.version)
            .field("layout", &self.layout)
            .field("cumulative", &self.cumulative)
            .finish_non_exhaustive()
    }
}

fn memo<T>(cell: &OnceLock<T>, init: impl FnOnce() -> TraceGridResult<T>) -> TraceGridResult<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

impl Run {
    pub fn new(version: impl Into<String>, layout: RunLayout, source: Arc<dyn LogSource>) -> Self {
        Self {
            version: version.into(),
            layout,
            source,
            cumulative: BTreeSet::from([Metric::Wait]),
            split: OnceLock::new(),
            split_waits: OnceLock::new(),
            unified: OnceLock::new(),
        }
    }

    /// Metrics whose unified-log column is replaced by its running sum.
    pub fn with_cumulative(mut self, cumulative: impl IntoIterator<Item = Metric>) -> Self {
        self.cumulative = cumulative.into_iter().collect();
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn layout(&self) -> RunLayout {
        self.layout
    }

    pub fn source(&self) -> &dyn LogSource {
        self.source.as_ref()
    }

    pub fn completions(&self) -> TraceGridResult<&Timeline<Completion>> {
        Ok(&self.split_tables()?.completions)
    }

    pub fn consumptions(&self) -> TraceGridResult<&Timeline<Consumption>> {
        Ok(&self.split_tables()?.consumptions)
    }

    /// Occupancy table for split runs, entry/exit steps for unified runs.
    pub fn waits(&self) -> TraceGridResult<&WaitSeries> {
        match self.layout {
            RunLayout::Split => memo(&self.split_waits, || self.build_split_waits()),
            RunLayout::Unified => Ok(&self.unified_tables()?.waits),
        }
    }

    pub fn metrics(&self) -> TraceGridResult<&WideTable> {
        Ok(&self.unified_tables()?.metrics)
    }

    /// Absolute timestamp mapped to relative time zero in the run's primary
    /// table (completions for split runs, the metric log for unified runs).
    pub fn zero_point(&self) -> TraceGridResult<f64> {
        match self.layout {
            RunLayout::Split => Ok(self.split_tables()?.completions.zero()),
            RunLayout::Unified => Ok(self.unified_tables()?.zero),
        }
    }

    /// `(min, max)` relative time over everything this run plots.
    pub fn relative_time_bounds(&self) -> TraceGridResult<(f64, f64)> {
        let times: Vec<f64> = match self.layout {
            RunLayout::Split => {
                let tables = self.split_tables()?;
                let mut times: Vec<f64> = (0..tables.ticks.len()).map(|t| t as f64).collect();
                times.extend(tables.completions.entries().iter().map(|e| e.relative_time));
                times.extend(tables.consumptions.entries().iter().map(|e| e.relative_time));
                times
            }
            RunLayout::Unified => self
                .metrics()?
                .rows()
                .iter()
                .map(|row| row.relative_time)
                .collect(),
        };
        let min = times.iter().copied().min_by(f64::total_cmp);
        let max = times.iter().copied().max_by(f64::total_cmp);
        match (min, max) {
            (Some(min), Some(max)) => Ok((min, max)),
            _ => Err(TraceGridError::EmptyInput {
                run: self.version.clone(),
                kind: self.primary_kind(),
            }),
        }
    }

    /// Aligned series for one metric, treated as a single-metric group.
    pub fn series(&self, metric: Metric) -> TraceGridResult<Series> {
        self.lookup_series(metric)?
            .ok_or_else(|| TraceGridError::MissingMetric {
                run: self.version.clone(),
                group: metric.name().to_string(),
                metric,
            })
    }

    /// Aligned series for every metric of `group`, in group order.
    pub fn group_series(&self, group: &MetricGroup) -> TraceGridResult<Vec<Series>> {
        group
            .metrics
            .iter()
            .map(|metric| {
                self.lookup_series(*metric)?
                    .ok_or_else(|| TraceGridError::MissingMetric {
                        run: self.version.clone(),
                        group: group.name.clone(),
                        metric: *metric,
                    })
            })
            .collect()
    }

    /// Largest value of any metric in `group`, ignoring absent cells.
    pub fn max_for_metric_group(&self, group: &MetricGroup) -> TraceGridResult<f64> {
        let empty = || TraceGridError::EmptyMetricGroup {
            run: self.version.clone(),
            group: group.name.clone(),
        };
        if group.metrics.is_empty() {
            return Err(empty());
        }
        self.group_series(group)?
            .iter()
            .filter_map(Series::max_value)
            .max_by(f64::total_cmp)
            .ok_or_else(empty)
    }

    fn primary_kind(&self) -> LogKind {
        match self.layout {
            RunLayout::Split => LogKind::Completions,
            RunLayout::Unified => LogKind::Metrics,
        }
    }

    fn require_layout(&self, layout: RunLayout, what: &str) -> TraceGridResult<()> {
        if self.layout == layout {
            return Ok(());
        }
        Err(TraceGridError::InvalidArgument(format!(
            "run {:?} uses the {} layout and has no {what} (needs {layout})",
            self.version, self.layout
        )))
    }

    fn lookup_series(&self, metric: Metric) -> TraceGridResult<Option<Series>> {
        let series = match self.layout {
            RunLayout::Split => self.split_series(metric)?,
            RunLayout::Unified => self.metrics()?.column(metric).map(|points| Series {
                metric,
                kind: if metric == Metric::Wait {
                    SeriesKind::Step
                } else {
                    SeriesKind::Line
                },
                points,
            }),
        };
        Ok(series.filter(|s| !s.points.is_empty()))
    }

    fn split_series(&self, metric: Metric) -> TraceGridResult<Option<Series>> {
        let line = |points: Vec<(f64, f64)>| Series {
            metric,
            kind: SeriesKind::Line,
            points,
        };
        match metric {
            Metric::Wait => {
                let WaitSeries::Occupancy(table) = self.waits()? else {
                    return Ok(None);
                };
                let origin = table.domain().start;
                let points = table
                    .iter()
                    .map(|(tick, v)| ((tick - origin) as f64, f64::from(v)))
                    .collect();
                Ok(Some(Series {
                    metric,
                    kind: SeriesKind::FilledArea,
                    points,
                }))
            }
            Metric::Throughput => Ok(Some(line(
                self.consumptions()?
                    .entries()
                    .iter()
                    .filter_map(|e| e.record.avg_tput.map(|v| (e.relative_time, v)))
                    .collect(),
            ))),
            _ => Ok(Some(line(
                self.completions()?
                    .entries()
                    .iter()
                    .filter_map(|e| e.record.value(metric).map(|v| (e.relative_time, v)))
                    .collect(),
            ))),
        }
    }

    fn split_tables(&self) -> TraceGridResult<&SplitTables> {
        self.require_layout(RunLayout::Split, "completion/consumption tables")?;
        memo(&self.split, || {
            let run = self.version.as_str();
            let completions = self.decode(LogKind::Completions, Completion::decode)?;
            let consumptions = self.decode(LogKind::Consumptions, Consumption::decode)?;
            for (kind, len) in [
                (LogKind::Completions, completions.len()),
                (LogKind::Consumptions, consumptions.len()),
            ] {
                if len == 0 {
                    return Err(TraceGridError::EmptyInput {
                        run: run.to_string(),
                        kind,
                    });
                }
            }

            // occupancy spans from the first submission to the last completion or consumption
            let first_submission = zero_point(
                run,
                LogKind::Completions,
                completions.iter().map(|c| c.submission_time),
            )?;
            let max_time = completions
                .iter()
                .map(|c| c.completion_time)
                .chain(consumptions.iter().map(|c| c.consumption_time))
                .max_by(f64::total_cmp)
                .unwrap_or(first_submission);
            let ticks = TickDomain::covering(first_submission, max_time);

            let completions =
                normalize(run, LogKind::Completions, completions, |c| c.completion_time)?;
            let consumptions =
                normalize(run, LogKind::Consumptions, consumptions, |c| c.consumption_time)?;
            tracing::debug!(
                run,
                completions_zero = completions.zero(),
                consumptions_zero = consumptions.zero(),
                ticks = ticks.len(),
                completions = completions.len(),
                consumptions = consumptions.len(),
                "normalized split run"
            );
            Ok(SplitTables {
                ticks,
                completions,
                consumptions,
            })
        })
    }

    fn build_split_waits(&self) -> TraceGridResult<WaitSeries> {
        let ticks = self.split_tables()?.ticks;
        let intervals = self.decode(LogKind::Waits, WaitInterval::decode)?;
        let table = OccupancyTable::from_intervals(ticks, &intervals);
        tracing::debug!(
            run = self.version.as_str(),
            intervals = intervals.len(),
            occupied = table.occupied(),
            "materialized wait occupancy"
        );
        Ok(WaitSeries::Occupancy(table))
    }

    fn unified_tables(&self) -> TraceGridResult<&UnifiedTables> {
        self.require_layout(RunLayout::Unified, "metric table")?;
        memo(&self.unified, || {
            let run = self.version.as_str();
            let mut samples = self.decode(LogKind::Metrics, MetricSample::decode)?;

            let events = if self.source.exists(run, LogKind::Waits) {
                step_events(&self.decode(LogKind::Waits, WaitPoint::decode)?)
            } else {
                Vec::new()
            };
            samples.extend(events.iter().map(|e| MetricSample {
                time: e.tick as f64,
                metric: Metric::Wait,
                value: f64::from(e.value),
            }));

            let timeline = normalize(run, LogKind::Metrics, samples, |s| s.time)?;
            let metrics = reshape(timeline.entries(), &self.cumulative);
            tracing::debug!(
                run,
                zero = timeline.zero(),
                samples = timeline.len(),
                rows = metrics.rows().len(),
                wait_events = events.len(),
                "normalized unified run"
            );
            Ok(UnifiedTables {
                zero: timeline.zero(),
                metrics,
                waits: WaitSeries::Steps { events },
            })
        })
    }

    fn decode<T>(
        &self,
        kind: LogKind,
        decode: impl Fn(&FieldDecoder<'_>, &crate::Record) -> TraceGridResult<T>,
    ) -> TraceGridResult<Vec<T>> {
        let records = self.source.load(&self.version, kind)?;
        FieldDecoder::new(&self.version, kind).decode_all(&records, decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLogSource;

    const COMPLETION_HEADER: &str =
        "latency,submission_time,completion_time,prefetch_distance,cnc,inflight,max_prefetch_distance\n";

    fn split_source(run: &str, span: (f64, f64), waits: &[(f64, f64)]) -> MemoryLogSource {
        let mut completions = COMPLETION_HEADER.to_string();
        completions.push_str(&format!("0.2,{},{},4,0,7,128\n", span.0, span.0 + 0.5));
        completions.push_str(&format!("0.9,{},{},6,2,3,128\n", span.1 - 1.0, span.1));
        let consumptions = format!(
            "consumption_time,avg_tput\n{},10\n{},25\n",
            span.0 + 1.0,
            span.1 - 2.0
        );
        let mut wait_log = "wait_start,wait_end,wait_length\n".to_string();
        for (start, end) in waits {
            wait_log.push_str(&format!("{start},{end},{}\n", end - start));
        }
        MemoryLogSource::new()
            .with_csv(run, LogKind::Completions, &completions)
            .with_csv(run, LogKind::Consumptions, &consumptions)
            .with_csv(run, LogKind::Waits, &wait_log)
    }

    fn split_run(run: &str, span: (f64, f64), waits: &[(f64, f64)]) -> Run {
        Run::new(run, RunLayout::Split, Arc::new(split_source(run, span, waits)))
    }

    #[test]
    fn tables_are_computed_once() {
        let run = split_run("patched", (0.0, 20.0), &[(10.0, 10.5)]);
        let a = run.completions().expect("completions") as *const Timeline<Completion>;
        let b = run.completions().expect("completions") as *const Timeline<Completion>;
        assert_eq!(a, b);
        let w1 = run.waits().expect("waits") as *const WaitSeries;
        let w2 = run.waits().expect("waits") as *const WaitSeries;
        assert_eq!(w1, w2);
    }

    #[test]
    fn split_run_starts_at_zero() {
        let run = split_run("og", (853224700.4, 853224715.0), &[]);
        assert_eq!(run.zero_point().expect("zero"), 853224700.4 + 0.5);

        let completions = run.completions().expect("completions");
        assert_eq!(completions.entries()[0].relative_time, 0.0);
        let consumptions = run.consumptions().expect("consumptions");
        assert_eq!(consumptions.zero(), 853224700.4 + 1.0);
        assert_eq!(consumptions.entries()[0].relative_time, 0.0);

        let latency = run.series(Metric::Latency).expect("latency");
        assert_eq!(latency.points[0], (0.0, 0.2));
        let wait = run.series(Metric::Wait).expect("wait");
        assert_eq!(wait.points[0].0, 0.0);

        // occupancy runs from floor(first submission) to ceil(last completion)
        let (min, max) = run.relative_time_bounds().expect("bounds");
        assert_eq!(min, 0.0);
        assert_eq!(max, 15.0);
    }

    #[test]
    fn fractional_start_keeps_first_rows_at_zero() {
        let run = split_run("patched", (100.4, 120.0), &[(110.0, 110.5)]);
        let latency = run.series(Metric::Latency).expect("latency");
        assert_eq!(latency.points[0], (0.0, 0.2));
        let tput = run.series(Metric::Throughput).expect("throughput");
        assert_eq!(tput.points[0], (0.0, 10.0));

        let wait = run.series(Metric::Wait).expect("wait");
        let occupied: Vec<f64> = wait
            .points
            .iter()
            .filter(|p| p.1 == 1.0)
            .map(|p| p.0)
            .collect();
        assert_eq!(occupied, vec![10.0, 11.0]);
    }

    #[test]
    fn split_waits_are_dense_occupancy() {
        let run = split_run("patched", (0.0, 20.0), &[(10.0, 10.5)]);
        let WaitSeries::Occupancy(table) = run.waits().expect("waits") else {
            panic!("split runs materialize occupancy");
        };
        assert_eq!(table.domain(), TickDomain::new(0, 20));
        let occupied: Vec<i64> = table.iter().filter(|(_, v)| *v == 1).map(|(t, _)| t).collect();
        assert_eq!(occupied, vec![10, 11]);

        let series = run.series(Metric::Wait).expect("wait series");
        assert_eq!(series.kind, SeriesKind::FilledArea);
        assert_eq!(series.points.len(), 21);
    }

    #[test]
    fn group_max_spans_all_metrics() {
        let run = split_run("og", (0.0, 15.0), &[]);
        let nios = MetricGroup::new(
            "nios",
            vec![
                Metric::Inflight,
                Metric::CompletedNotConsumed,
                Metric::PrefetchDistance,
            ],
        );
        assert_eq!(run.max_for_metric_group(&nios).expect("max"), 7.0);
        let tput = MetricGroup::new("throughput", vec![Metric::Throughput]);
        assert_eq!(run.max_for_metric_group(&tput).expect("max"), 25.0);
    }

    #[test]
    fn empty_group_is_an_error() {
        let run = split_run("og", (0.0, 15.0), &[]);
        let err = run
            .max_for_metric_group(&MetricGroup::new("none", Vec::new()))
            .expect_err("empty");
        assert!(matches!(err, TraceGridError::EmptyMetricGroup { .. }));
    }

    #[test]
    fn absent_optional_column_is_missing_metric() {
        let source = MemoryLogSource::new()
            .with_csv(
                "og",
                LogKind::Completions,
                "latency,submission_time,completion_time,prefetch_distance,cnc,inflight\n1,0,1,1,1,1\n",
            )
            .with_csv("og", LogKind::Consumptions, "consumption_time\n1\n");
        let run = Run::new("og", RunLayout::Split, Arc::new(source));
        let group = MetricGroup::new("throughput", vec![Metric::Throughput]);
        let err = run.max_for_metric_group(&group).expect_err("missing");
        match err {
            TraceGridError::MissingMetric { run, group, metric } => {
                assert_eq!(run, "og");
                assert_eq!(group, "throughput");
                assert_eq!(metric, Metric::Throughput);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_completions_has_no_zero_point() {
        let source = MemoryLogSource::new()
            .with_csv("og", LogKind::Completions, COMPLETION_HEADER)
            .with_csv("og", LogKind::Consumptions, "consumption_time\n1\n");
        let run = Run::new("og", RunLayout::Split, Arc::new(source));
        assert!(matches!(
            run.zero_point(),
            Err(TraceGridError::EmptyInput {
                kind: LogKind::Completions,
                ..
            })
        ));
    }

    #[test]
    fn layout_mismatch_is_rejected() {
        let run = split_run("og", (0.0, 15.0), &[]);
        assert!(matches!(
            run.metrics(),
            Err(TraceGridError::InvalidArgument(_))
        ));
    }

    fn unified_run() -> Run {
        let metrics = "time,metric,value\n\
                       100.0,0,3\n\
                       105.0,0,3\n\
                       105.0,0,7\n\
                       103.0,3,4\n\
                       104.0,avg_tput,12\n";
        let waits = "wait_start,wait_end,wait_length\n101.2,101.5,0.3\n106.0,108.0,2.0\n";
        let source = MemoryLogSource::new()
            .with_csv("v2", LogKind::Metrics, metrics)
            .with_csv("v2", LogKind::Waits, waits);
        Run::new("v2", RunLayout::Unified, Arc::new(source))
    }

    #[test]
    fn unified_run_reshapes_with_last_wins() {
        let run = unified_run();
        assert_eq!(run.zero_point().expect("zero"), 100.0);
        let latency = run.series(Metric::Latency).expect("latency");
        assert_eq!(latency.points, vec![(0.0, 3.0), (5.0, 7.0)]);
        assert_eq!(run.metrics().expect("metrics").collisions(), 1);
        assert_eq!(run.relative_time_bounds().expect("bounds"), (0.0, 8.0));
    }

    #[test]
    fn unified_waits_accumulate_as_steps() {
        let run = unified_run();
        let WaitSeries::Steps { events } = run.waits().expect("waits") else {
            panic!("unified runs materialize steps");
        };
        assert_eq!(events.len(), 4);
        let wait = run.series(Metric::Wait).expect("wait");
        assert_eq!(wait.kind, SeriesKind::Step);
        assert_eq!(
            serde_json::to_value(wait.kind).expect("serialize"),
            serde_json::json!("step")
        );
        let values: Vec<f64> = wait.points.iter().map(|p| p.1).collect();
        assert_eq!(values, vec![1.0, 1.0, 2.0, 2.0]);
    }
}
