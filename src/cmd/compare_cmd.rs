//! Comparison commands (`tracegrid compare|bounds|series|discover`).

use clap::Args;
use serde::Serialize;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::{
    ComparisonGrid, Config, CsvLogSource, GridBounds, ImageFormat, LogKind, LogSource, Metric,
    MetricGroup, PlotterSink, RecordingSink, RenderSink, RenderSummary, Run, RunLayout, Series,
    TraceGridError, TraceGridResult, discover_versions, write_json,
};

/// Which runs to load and how to group their metrics. Unset flags fall back to the config.
#[derive(Debug, Clone, Default, Args)]
pub struct RunSelection {
    /// Versions to compare, left to right (default: config `versions`, then every version found)
    #[arg(value_name = "VERSION")]
    pub versions: Vec<String>,
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub layout: Option<RunLayout>,
    /// Panel row as NAME=metric[,metric...]; repeat for more rows
    #[arg(long = "group", value_name = "NAME=METRICS")]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct CompareArgs {
    #[command(flatten)]
    pub selection: RunSelection,
    /// Image to write (.png or .svg)
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Also dump every rendered series as JSON
    #[arg(long)]
    pub series_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFingerprint {
    pub kind: LogKind,
    pub location: String,
    pub blake3: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub version: String,
    pub zero_point: f64,
    pub relative_time: (f64, f64),
    pub sources: Vec<SourceFingerprint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareReport {
    pub schema_version: String,
    pub generated_at: String,
    pub layout: RunLayout,
    pub groups: Vec<MetricGroup>,
    pub bounds: GridBounds,
    pub runs: Vec<RunReport>,
    pub render: Option<RenderSummary>,
    pub series_json: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesOutput {
    pub version: String,
    pub zero_point: f64,
    pub series: Series,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredVersion {
    pub version: String,
    pub kinds: BTreeSet<LogKind>,
    pub layouts: Vec<RunLayout>,
}

/// Runs, groups and settings resolved from flags and config.
#[derive(Debug)]
pub struct Comparison {
    pub layout: RunLayout,
    pub runs: Vec<Run>,
    pub groups: Vec<MetricGroup>,
}

impl Comparison {
    pub fn resolve(config: &Config, selection: &RunSelection) -> TraceGridResult<Self> {
        let log_dir = selection.log_dir.as_deref().unwrap_or(&config.log_dir);
        let layout = selection.layout.unwrap_or(config.layout);
        let source: Arc<dyn LogSource> = Arc::new(CsvLogSource::new(log_dir));

        let versions = if !selection.versions.is_empty() {
            selection.versions.clone()
        } else if !config.versions.is_empty() {
            config.versions.clone()
        } else {
            discover_for_layout(log_dir, layout)?
        };
        if versions.is_empty() {
            return Err(TraceGridError::InvalidArgument(format!(
                "no {layout}-layout runs found in {}",
                log_dir.display()
            )));
        }

        let groups = if selection.groups.is_empty() {
            config.groups.clone()
        } else {
            selection
                .groups
                .iter()
                .map(|spec| MetricGroup::parse_spec(spec))
                .collect::<TraceGridResult<Vec<_>>>()?
        };

        let runs = versions
            .into_iter()
            .map(|v| {
                Run::new(v, layout, Arc::clone(&source))
                    .with_cumulative(config.cumulative.iter().copied())
            })
            .collect();
        Ok(Self {
            layout,
            runs,
            groups,
        })
    }

    pub fn grid(&self, config: &Config) -> TraceGridResult<ComparisonGrid<'_>> {
        Ok(ComparisonGrid::new(&self.runs, &self.groups)?.with_headroom(config.headroom))
    }

    fn report(&self, bounds: GridBounds) -> TraceGridResult<CompareReport> {
        let runs = self
            .runs
            .iter()
            .map(run_report)
            .collect::<TraceGridResult<Vec<_>>>()?;
        Ok(CompareReport {
            schema_version: "tracegrid.compare.v1".to_string(),
            generated_at: now_rfc3339(),
            layout: self.layout,
            groups: self.groups.clone(),
            bounds,
            runs,
            render: None,
            series_json: None,
        })
    }
}

pub fn compare_command(config: &Config, args: &CompareArgs) -> TraceGridResult<serde_json::Value> {
    let out = args.out.clone().unwrap_or_else(|| config.output.clone());
    ImageFormat::from_path(&out)?;

    let report = if let Some(series_path) = &args.series_json {
        let mut recording = RecordingSink::default();
        let mut report = compare_with_sink(config, &args.selection, &mut recording, &out)?;
        write_json(series_path, &recording)?;
        recording.replay(&mut PlotterSink::new(), &out)?;
        report.series_json = Some(series_path.display().to_string());
        report
    } else {
        compare_with_sink(config, &args.selection, &mut PlotterSink::new(), &out)?
    };
    Ok(serde_json::to_value(report)?)
}

/// Full pipeline against any sink: resolve runs, compute shared bounds, render.
pub fn compare_with_sink(
    config: &Config,
    selection: &RunSelection,
    sink: &mut dyn RenderSink,
    out: &Path,
) -> TraceGridResult<CompareReport> {
    let comparison = Comparison::resolve(config, selection)?;
    let grid = comparison.grid(config)?;
    let bounds = grid.compute_bounds()?;
    let summary = grid.render(&bounds, sink, out)?;
    let mut report = comparison.report(bounds)?;
    report.render = Some(summary);
    Ok(report)
}

pub fn bounds_command(config: &Config, selection: &RunSelection) -> TraceGridResult<serde_json::Value> {
    let comparison = Comparison::resolve(config, selection)?;
    let bounds = comparison.grid(config)?.compute_bounds()?;
    Ok(serde_json::to_value(comparison.report(bounds)?)?)
}

pub fn series_command(
    config: &Config,
    version: &str,
    metric: Metric,
    selection: &RunSelection,
    out: Option<&Path>,
) -> TraceGridResult<serde_json::Value> {
    let selection = RunSelection {
        versions: vec![version.to_string()],
        ..selection.clone()
    };
    let comparison = Comparison::resolve(config, &selection)?;
    let Some(run) = comparison.runs.first() else {
        return Err(TraceGridError::InvalidArgument(format!(
            "run {version:?} could not be resolved"
        )));
    };
    let payload = SeriesOutput {
        version: version.to_string(),
        zero_point: run.zero_point()?,
        series: run.series(metric)?,
    };
    if let Some(path) = out {
        write_json(path, &payload)?;
    }
    Ok(serde_json::to_value(payload)?)
}

pub fn discover_command(config: &Config, log_dir: Option<&Path>) -> TraceGridResult<serde_json::Value> {
    let log_dir = log_dir.unwrap_or(&config.log_dir);
    let found: Vec<DiscoveredVersion> = discover_versions(log_dir)?
        .into_iter()
        .map(|(version, kinds)| {
            let layouts = [RunLayout::Split, RunLayout::Unified]
                .into_iter()
                .filter(|layout| has_layout(&kinds, *layout))
                .collect();
            DiscoveredVersion {
                version,
                kinds,
                layouts,
            }
        })
        .collect();
    Ok(serde_json::json!({
        "logDir": log_dir.display().to_string(),
        "versions": found,
    }))
}

fn has_layout(kinds: &BTreeSet<LogKind>, layout: RunLayout) -> bool {
    match layout {
        RunLayout::Split => [LogKind::Completions, LogKind::Consumptions, LogKind::Waits]
            .iter()
            .all(|k| kinds.contains(k)),
        RunLayout::Unified => kinds.contains(&LogKind::Metrics),
    }
}

fn discover_for_layout(log_dir: &Path, layout: RunLayout) -> TraceGridResult<Vec<String>> {
    Ok(discover_versions(log_dir)?
        .into_iter()
        .filter(|(_, kinds)| has_layout(kinds, layout))
        .map(|(version, _)| version)
        .collect())
}

fn run_report(run: &Run) -> TraceGridResult<RunReport> {
    let mut sources = Vec::new();
    for kind in run.layout().log_kinds() {
        if !run.source().exists(run.version(), *kind) {
            continue;
        }
        sources.push(SourceFingerprint {
            kind: *kind,
            location: run.source().locate(run.version(), *kind),
            blake3: run.source().fingerprint(run.version(), *kind)?,
        });
    }
    Ok(RunReport {
        version: run.version().to_string(),
        zero_point: run.zero_point()?,
        relative_time: run.relative_time_bounds()?,
        sources,
    })
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
