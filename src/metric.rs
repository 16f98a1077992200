//! Metric identifiers and panel groupings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt;
use std::str::FromStr;

use crate::{TraceGridError, TraceGridResult};

/// Closed set of metrics the instrumented process logs.
///
/// The integer code is what the unified metric log carries in its `metric`
/// column; the name is what configs, CLI flags and chart labels use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Latency,
    PrefetchDistance,
    MaxPrefetchDistance,
    Inflight,
    CompletedNotConsumed,
    Throughput,
    Wait,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Latency,
        Metric::PrefetchDistance,
        Metric::MaxPrefetchDistance,
        Metric::Inflight,
        Metric::CompletedNotConsumed,
        Metric::Throughput,
        Metric::Wait,
    ];

    pub fn code(self) -> i64 {
        match self {
            Metric::Latency => 0,
            Metric::PrefetchDistance => 1,
            Metric::MaxPrefetchDistance => 2,
            Metric::Inflight => 3,
            Metric::CompletedNotConsumed => 4,
            Metric::Throughput => 5,
            Metric::Wait => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Metric::Latency => "latency",
            Metric::PrefetchDistance => "prefetch_distance",
            Metric::MaxPrefetchDistance => "max_prefetch_distance",
            Metric::Inflight => "inflight",
            Metric::CompletedNotConsumed => "cnc",
            Metric::Throughput => "avg_tput",
            Metric::Wait => "wait",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Metric::Latency => "completion latency",
            Metric::PrefetchDistance => "current prefetch distance",
            Metric::MaxPrefetchDistance => "configured maximum prefetch distance",
            Metric::Inflight => "I/Os in flight",
            Metric::CompletedNotConsumed => "completed but not yet consumed I/Os",
            Metric::Throughput => "consumer average throughput",
            Metric::Wait => "consumer wait occupancy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = TraceGridError;

    /// Accepts a metric name (case-insensitive) or its integer code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return Metric::from_code(code).ok_or_else(|| {
                TraceGridError::InvalidArgument(format!("unknown metric code {code}"))
            });
        }
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TraceGridError::InvalidArgument(format!("unknown metric {s:?}")))
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl clap::ValueEnum for Metric {
    fn value_variants<'a>() -> &'a [Self] {
        &Self::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.name()))
    }
}

/// Metrics drawn together on one panel row, sharing a y-axis scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricGroup {
    pub name: String,
    pub metrics: Vec<Metric>,
}

impl MetricGroup {
    pub fn new(name: impl Into<String>, metrics: Vec<Metric>) -> Self {
        Self {
            name: name.into(),
            metrics,
        }
    }

    /// Parses the `NAME=metric,metric` form used by `--group`.
    pub fn parse_spec(spec: &str) -> TraceGridResult<Self> {
        let Some((name, list)) = spec.split_once('=') else {
            return Err(TraceGridError::InvalidArgument(format!(
                "metric group {spec:?} must look like NAME=metric[,metric...]"
            )));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(TraceGridError::InvalidArgument(format!(
                "metric group {spec:?} has an empty name"
            )));
        }
        let metrics = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Metric::from_str)
            .collect::<TraceGridResult<Vec<_>>>()?;
        Ok(Self::new(name, metrics))
    }

    /// The four panel rows of the prefetcher comparison chart.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("waits", vec![Metric::Wait]),
            Self::new(
                "nios",
                vec![
                    Metric::Inflight,
                    Metric::CompletedNotConsumed,
                    Metric::PrefetchDistance,
                ],
            ),
            Self::new("latency", vec![Metric::Latency]),
            Self::new("throughput", vec![Metric::Throughput]),
        ]
    }
}
