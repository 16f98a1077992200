//! Run log files: kinds, records, sources and the typed rows decoded from them.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{Metric, TraceGridError, TraceGridResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Completions,
    Consumptions,
    Waits,
    Metrics,
}

impl LogKind {
    pub const ALL: [LogKind; 4] = [
        LogKind::Completions,
        LogKind::Consumptions,
        LogKind::Waits,
        LogKind::Metrics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LogKind::Completions => "completions",
            LogKind::Consumptions => "consumptions",
            LogKind::Waits => "waits",
            LogKind::Metrics => "metrics",
        }
    }

    /// File name prefix written by the instrumented process; the version label follows.
    pub fn file_prefix(self) -> &'static str {
        match self {
            LogKind::Completions => "completion_log_",
            LogKind::Consumptions => "consumption_log_",
            LogKind::Waits => "wait_log_",
            LogKind::Metrics => "metric_log_",
        }
    }

    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            LogKind::Completions => &[
                "latency",
                "submission_time",
                "completion_time",
                "prefetch_distance",
                "cnc",
                "inflight",
            ],
            LogKind::Consumptions => &["consumption_time"],
            LogKind::Waits => &["wait_start"],
            LogKind::Metrics => &["time", "metric", "value"],
        }
    }

    pub fn optional_fields(self) -> &'static [&'static str] {
        match self {
            LogKind::Completions => &["max_prefetch_distance"],
            LogKind::Consumptions => &["avg_tput"],
            LogKind::Waits => &["wait_end", "wait_length"],
            LogKind::Metrics => &[],
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of a log, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Record {
    header: Arc<[String]>,
    cells: Vec<String>,
    line: u64,
}

impl Record {
    pub fn new(header: Arc<[String]>, cells: Vec<String>, line: u64) -> Self {
        Self {
            header,
            cells,
            line,
        }
    }

    /// 1-based line in the source log.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Raw cell for `field`; `None` when the column is missing or the cell is empty.
    pub fn get(&self, field: &str) -> Option<&str> {
        let idx = self.header.iter().position(|h| h == field)?;
        self.cells
            .get(idx)
            .map(String::as_str)
            .filter(|cell| !cell.is_empty())
    }
}

/// Decodes numeric fields with enough context to name the offending run and log.
#[derive(Debug, Clone, Copy)]
pub struct FieldDecoder<'a> {
    pub run: &'a str,
    pub kind: LogKind,
}

impl<'a> FieldDecoder<'a> {
    pub fn new(run: &'a str, kind: LogKind) -> Self {
        Self { run, kind }
    }

    pub fn malformed(&self, line: u64, reason: impl Into<String>) -> TraceGridError {
        TraceGridError::MalformedRecord {
            run: self.run.to_string(),
            kind: self.kind,
            line,
            reason: reason.into(),
        }
    }

    pub fn require(&self, record: &Record, field: &str) -> TraceGridResult<f64> {
        self.optional(record, field)?
            .ok_or_else(|| self.malformed(record.line(), format!("missing field {field:?}")))
    }

    pub fn optional(&self, record: &Record, field: &str) -> TraceGridResult<Option<f64>> {
        let Some(raw) = record.get(field) else {
            return Ok(None);
        };
        let value = raw.parse::<f64>().map_err(|_| {
            self.malformed(record.line(), format!("field {field:?} is not numeric: {raw:?}"))
        })?;
        if !value.is_finite() {
            return Err(self.malformed(
                record.line(),
                format!("field {field:?} is not finite: {raw:?}"),
            ));
        }
        Ok(Some(value))
    }

    pub fn metric(&self, record: &Record, field: &str) -> TraceGridResult<Metric> {
        let raw = record
            .get(field)
            .ok_or_else(|| self.malformed(record.line(), format!("missing field {field:?}")))?;
        raw.parse::<Metric>().map_err(|_| {
            self.malformed(record.line(), format!("field {field:?} is not a known metric: {raw:?}"))
        })
    }

    pub fn decode_all<T>(
        &self,
        records: &[Record],
        decode: impl Fn(&Self, &Record) -> TraceGridResult<T>,
    ) -> TraceGridResult<Vec<T>> {
        records.iter().map(|r| decode(self, r)).collect()
    }
}

/// Provides the records of one log of one run.
pub trait LogSource: Send + Sync {
    fn load(&self, run: &str, kind: LogKind) -> TraceGridResult<Vec<Record>>;

    fn exists(&self, run: &str, kind: LogKind) -> bool;

    /// Human-readable locator for reports and errors.
    fn locate(&self, run: &str, kind: LogKind) -> String;

    /// Content digest of the log, when the source can compute one.
    fn fingerprint(&self, _run: &str, _kind: LogKind) -> TraceGridResult<Option<String>> {
        Ok(None)
    }
}

/// Reads `<prefix><version>` CSV files from a log directory.
#[derive(Debug, Clone)]
pub struct CsvLogSource {
    log_dir: PathBuf,
}

impl CsvLogSource {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn path_for(&self, run: &str, kind: LogKind) -> PathBuf {
        self.log_dir.join(format!("{}{run}", kind.file_prefix()))
    }
}

impl LogSource for CsvLogSource {
    fn load(&self, run: &str, kind: LogKind) -> TraceGridResult<Vec<Record>> {
        let path = self.path_for(run, kind);
        let file = std::fs::File::open(&path).map_err(|e| {
            TraceGridError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", path.display()),
            ))
        })?;
        let records = read_csv_records(file, run, kind)?;
        tracing::debug!(run, %kind, path = %path.display(), rows = records.len(), "loaded log");
        Ok(records)
    }

    fn exists(&self, run: &str, kind: LogKind) -> bool {
        self.path_for(run, kind).is_file()
    }

    fn locate(&self, run: &str, kind: LogKind) -> String {
        self.path_for(run, kind).display().to_string()
    }

    fn fingerprint(&self, run: &str, kind: LogKind) -> TraceGridResult<Option<String>> {
        let path = self.path_for(run, kind);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        Ok(Some(blake3::hash(&bytes).to_hex().to_string()))
    }
}

/// CSV text held in memory, keyed by run and log kind.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSource {
    logs: BTreeMap<(String, LogKind), String>,
}

impl MemoryLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_csv(mut self, run: &str, kind: LogKind, csv_text: &str) -> Self {
        self.insert(run, kind, csv_text);
        self
    }

    pub fn insert(&mut self, run: &str, kind: LogKind, csv_text: &str) {
        self.logs
            .insert((run.to_string(), kind), csv_text.to_string());
    }
}

impl LogSource for MemoryLogSource {
    fn load(&self, run: &str, kind: LogKind) -> TraceGridResult<Vec<Record>> {
        let text = self.logs.get(&(run.to_string(), kind)).ok_or_else(|| {
            TraceGridError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no {kind} log for run {run:?}"),
            ))
        })?;
        read_csv_records(text.as_bytes(), run, kind)
    }

    fn exists(&self, run: &str, kind: LogKind) -> bool {
        self.logs.contains_key(&(run.to_string(), kind))
    }

    fn locate(&self, run: &str, kind: LogKind) -> String {
        format!("memory:{}{run}", kind.file_prefix())
    }

    fn fingerprint(&self, run: &str, kind: LogKind) -> TraceGridResult<Option<String>> {
        Ok(self
            .logs
            .get(&(run.to_string(), kind))
            .map(|text| blake3::hash(text.as_bytes()).to_hex().to_string()))
    }
}

/// Parses a headed CSV stream. Cells are trimmed; short rows leave trailing fields absent.
pub fn read_csv_records<R: Read>(reader: R, run: &str, kind: LogKind) -> TraceGridResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let header: Arc<[String]> = reader
        .headers()?
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .into();
    let decoder = FieldDecoder::new(run, kind);

    let mut out = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            decoder.malformed(line, e.to_string())
        })?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        out.push(Record::new(
            header.clone(),
            row.iter().map(ToString::to_string).collect(),
            line,
        ));
    }
    Ok(out)
}

/// One completed prefetch I/O.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub latency: f64,
    pub submission_time: f64,
    pub completion_time: f64,
    pub prefetch_distance: f64,
    pub cnc: f64,
    pub inflight: f64,
    pub max_prefetch_distance: Option<f64>,
}

impl Completion {
    pub fn decode(d: &FieldDecoder<'_>, r: &Record) -> TraceGridResult<Self> {
        Ok(Self {
            latency: d.require(r, "latency")?,
            submission_time: d.require(r, "submission_time")?,
            completion_time: d.require(r, "completion_time")?,
            prefetch_distance: d.require(r, "prefetch_distance")?,
            cnc: d.require(r, "cnc")?,
            inflight: d.require(r, "inflight")?,
            max_prefetch_distance: d.optional(r, "max_prefetch_distance")?,
        })
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Latency => Some(self.latency),
            Metric::PrefetchDistance => Some(self.prefetch_distance),
            Metric::MaxPrefetchDistance => self.max_prefetch_distance,
            Metric::Inflight => Some(self.inflight),
            Metric::CompletedNotConsumed => Some(self.cnc),
            Metric::Throughput | Metric::Wait => None,
        }
    }
}

/// One buffer handed to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consumption {
    pub consumption_time: f64,
    pub avg_tput: Option<f64>,
}

impl Consumption {
    pub fn decode(d: &FieldDecoder<'_>, r: &Record) -> TraceGridResult<Self> {
        Ok(Self {
            consumption_time: d.require(r, "consumption_time")?,
            avg_tput: d.optional(r, "avg_tput")?,
        })
    }
}

/// A consumer wait with both edges known (`wait_start`, `wait_end`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaitInterval {
    pub start: f64,
    pub end: f64,
}

impl WaitInterval {
    pub fn decode(d: &FieldDecoder<'_>, r: &Record) -> TraceGridResult<Self> {
        let start = d.require(r, "wait_start")?;
        let end = d.require(r, "wait_end")?;
        if end < start {
            return Err(d.malformed(
                r.line(),
                format!("wait_end {end} precedes wait_start {start}"),
            ));
        }
        Ok(Self { start, end })
    }
}

/// A consumer wait given as a start point and a duration (`wait_start`, `wait_length`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaitPoint {
    pub start: f64,
    pub duration: f64,
}

impl WaitPoint {
    pub fn decode(d: &FieldDecoder<'_>, r: &Record) -> TraceGridResult<Self> {
        let start = d.require(r, "wait_start")?;
        let duration = d.require(r, "wait_length")?;
        if duration < 0.0 {
            return Err(d.malformed(r.line(), format!("negative wait_length {duration}")));
        }
        Ok(Self { start, duration })
    }
}

/// One `(time, metric, value)` row of the unified metric log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSample {
    pub time: f64,
    pub metric: Metric,
    pub value: f64,
}

impl MetricSample {
    pub fn decode(d: &FieldDecoder<'_>, r: &Record) -> TraceGridResult<Self> {
        Ok(Self {
            time: d.require(r, "time")?,
            metric: d.metric(r, "metric")?,
            value: d.require(r, "value")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETIONS: &str = "\
latency,submission_time,completion_time,prefetch_distance,cnc,inflight,max_prefetch_distance
0.243057,853224700.1,853224700.3,4,0,7,128
0.5,853224700.2,853224700.7,5,1,6,
";

    #[test]
    fn csv_records_decode_into_completions() {
        let records =
            read_csv_records(COMPLETIONS.as_bytes(), "og", LogKind::Completions).expect("records");
        assert_eq!(records.len(), 2);
        let d = FieldDecoder::new("og", LogKind::Completions);
        let rows = d.decode_all(&records, Completion::decode).expect("decode");
        assert_eq!(rows[0].max_prefetch_distance, Some(128.0));
        assert_eq!(rows[1].max_prefetch_distance, None);
        assert_eq!(rows[1].value(Metric::CompletedNotConsumed), Some(1.0));
    }

    #[test]
    fn non_numeric_field_is_malformed_with_line() {
        let text = "consumption_time,avg_tput\n1.0,fast\n";
        let records =
            read_csv_records(text.as_bytes(), "og", LogKind::Consumptions).expect("records");
        let d = FieldDecoder::new("og", LogKind::Consumptions);
        let err = d
            .decode_all(&records, Consumption::decode)
            .expect_err("non-numeric");
        match err {
            TraceGridError::MalformedRecord {
                run, kind, line, ..
            } => {
                assert_eq!(run, "og");
                assert_eq!(kind, LogKind::Consumptions);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_finite_and_missing_fields_are_malformed() {
        let text = "time,metric,value\nNaN,0,1\n1,0,\n";
        let records = read_csv_records(text.as_bytes(), "p", LogKind::Metrics).expect("records");
        let d = FieldDecoder::new("p", LogKind::Metrics);
        assert!(MetricSample::decode(&d, &records[0]).is_err());
        assert!(MetricSample::decode(&d, &records[1]).is_err());
    }

    #[test]
    fn metric_column_accepts_codes_and_names() {
        let text = "time,metric,value\n1,0,3\n2,avg_tput,9\n3,42,1\n";
        let records = read_csv_records(text.as_bytes(), "p", LogKind::Metrics).expect("records");
        let d = FieldDecoder::new("p", LogKind::Metrics);
        assert_eq!(
            MetricSample::decode(&d, &records[0]).expect("code").metric,
            Metric::Latency
        );
        assert_eq!(
            MetricSample::decode(&d, &records[1]).expect("name").metric,
            Metric::Throughput
        );
        assert!(MetricSample::decode(&d, &records[2]).is_err());
    }

    #[test]
    fn inverted_wait_interval_is_rejected() {
        let text = "wait_start,wait_end,wait_length\n10.5,10.0,0.5\n";
        let records = read_csv_records(text.as_bytes(), "p", LogKind::Waits).expect("records");
        let d = FieldDecoder::new("p", LogKind::Waits);
        assert!(WaitInterval::decode(&d, &records[0]).is_err());
    }

    #[test]
    fn csv_source_reads_named_files_and_fingerprints_them() {
        let dir = std::env::temp_dir().join(format!("tracegrid-logfile-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("dir");
        std::fs::write(dir.join("consumption_log_og"), "consumption_time,avg_tput\n1,2\n")
            .expect("write");

        let source = CsvLogSource::new(&dir);
        assert!(source.exists("og", LogKind::Consumptions));
        assert!(!source.exists("og", LogKind::Waits));
        let records = source.load("og", LogKind::Consumptions).expect("load");
        assert_eq!(records[0].get("avg_tput"), Some("2"));
        let digest = source
            .fingerprint("og", LogKind::Consumptions)
            .expect("fingerprint")
            .expect("present");
        assert_eq!(digest.len(), 64);
        assert!(matches!(
            source.load("og", LogKind::Waits),
            Err(TraceGridError::Io(_))
        ));
    }
}
