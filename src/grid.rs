//! Cross-run axis synchronization and the grid render pass.
//!
//! Rows are metric groups, columns are runs. Every panel in a row shares one
//! y range and every panel shares one x range, so differences between runs
//! are visible at a glance instead of hidden by per-panel autoscaling.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{MetricGroup, RenderSink, Run, TraceGridError, TraceGridResult};

/// Multipliers applied to the raw maxima before they become axis limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Headroom {
    #[serde(default = "default_headroom_x")]
    pub x: f64,
    #[serde(default = "default_headroom_y")]
    pub y: f64,
}

fn default_headroom_x() -> f64 {
    1.01
}

fn default_headroom_y() -> f64 {
    1.2
}

impl Default for Headroom {
    fn default() -> Self {
        Self {
            x: default_headroom_x(),
            y: default_headroom_y(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBound {
    pub group: String,
    pub raw_ymax: f64,
    pub ymax: f64,
}

/// Axis limits shared by every panel of one render pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridBounds {
    pub raw_xmax: f64,
    pub xmax: f64,
    pub groups: Vec<GroupBound>,
    pub headroom: Headroom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PanelPosition {
    pub row: usize,
    pub column: usize,
}

/// Everything a sink needs to lay out the grid before series arrive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub x_range: (f64, f64),
    pub y_ranges: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSummary {
    pub panels: usize,
    pub series: usize,
    pub output: String,
}

/// Runs and metric groups compared side by side. Borrows the runs; never mutates them.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonGrid<'a> {
    runs: &'a [Run],
    groups: &'a [MetricGroup],
    headroom: Headroom,
}

impl<'a> ComparisonGrid<'a> {
    pub fn new(runs: &'a [Run], groups: &'a [MetricGroup]) -> TraceGridResult<Self> {
        if runs.is_empty() {
            return Err(TraceGridError::InvalidArgument(
                "comparison needs at least one run".to_string(),
            ));
        }
        if groups.is_empty() {
            return Err(TraceGridError::InvalidArgument(
                "comparison needs at least one metric group".to_string(),
            ));
        }
        Ok(Self {
            runs,
            groups,
            headroom: Headroom::default(),
        })
    }

    pub fn with_headroom(mut self, headroom: Headroom) -> Self {
        self.headroom = headroom;
        self
    }

    pub fn runs(&self) -> &'a [Run] {
        self.runs
    }

    pub fn groups(&self) -> &'a [MetricGroup] {
        self.groups
    }

    /// Global x max over all runs and, per group, global y max over all runs.
    pub fn compute_bounds(&self) -> TraceGridResult<GridBounds> {
        let mut raw_xmax = 0.0f64;
        for run in self.runs {
            let (_, run_xmax) = run.relative_time_bounds()?;
            raw_xmax = raw_xmax.max(run_xmax);
        }

        let mut groups = Vec::with_capacity(self.groups.len());
        for group in self.groups {
            let mut raw_ymax = 0.0f64;
            for run in self.runs {
                raw_ymax = raw_ymax.max(run.max_for_metric_group(group)?);
            }
            groups.push(GroupBound {
                group: group.name.clone(),
                raw_ymax,
                ymax: raw_ymax * self.headroom.y,
            });
        }

        let bounds = GridBounds {
            raw_xmax,
            xmax: raw_xmax * self.headroom.x,
            groups,
            headroom: self.headroom,
        };
        tracing::debug!(
            runs = self.runs.len(),
            groups = self.groups.len(),
            xmax = bounds.xmax,
            "computed grid bounds"
        );
        Ok(bounds)
    }

    pub fn layout(&self, bounds: &GridBounds) -> TraceGridResult<GridLayout> {
        if bounds.groups.len() != self.groups.len()
            || bounds
                .groups
                .iter()
                .zip(self.groups)
                .any(|(b, g)| b.group != g.name)
        {
            return Err(TraceGridError::InvalidArgument(
                "bounds were computed for a different set of metric groups".to_string(),
            ));
        }
        Ok(GridLayout {
            rows: self.groups.iter().map(|g| g.name.clone()).collect(),
            columns: self.runs.iter().map(|r| r.version().to_string()).collect(),
            x_range: (0.0, bounds.xmax),
            y_ranges: bounds.groups.iter().map(|g| (0.0, g.ymax)).collect(),
        })
    }

    /// Pushes every run's series for every group into `sink`, then saves to `output`.
    pub fn render(
        &self,
        bounds: &GridBounds,
        sink: &mut dyn RenderSink,
        output: &Path,
    ) -> TraceGridResult<RenderSummary> {
        let layout = self.layout(bounds)?;
        sink.configure(&layout)?;

        let mut series_count = 0usize;
        for (row, group) in self.groups.iter().enumerate() {
            for (column, run) in self.runs.iter().enumerate() {
                let panel = PanelPosition { row, column };
                for series in run.group_series(group)? {
                    sink.plot(panel, &series, series.kind, series.metric.name())?;
                    series_count += 1;
                }
            }
        }
        sink.save(output)?;

        tracing::info!(
            output = %output.display(),
            panels = self.groups.len() * self.runs.len(),
            series = series_count,
            "rendered comparison grid"
        );
        Ok(RenderSummary {
            panels: self.groups.len() * self.runs.len(),
            series: series_count,
            output: output.display().to_string(),
        })
    }
}
