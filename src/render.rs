//! Rendering sinks fed by the comparison grid.

use plotters::coord::Shift;
use plotters::prelude::*;
use serde::Serialize;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{GridLayout, PanelPosition, Series, SeriesKind, TraceGridError, TraceGridResult};

/// Per-panel size in pixels (11in x 5in at 100 dpi).
pub const PANEL_SIZE: (u32, u32) = (1100, 500);

/// Accepts already-aligned series for grid panels. Never computes bounds itself.
pub trait RenderSink {
    fn configure(&mut self, layout: &GridLayout) -> TraceGridResult<()>;

    fn plot(
        &mut self,
        panel: PanelPosition,
        series: &Series,
        kind: SeriesKind,
        label: &str,
    ) -> TraceGridResult<()>;

    fn save(&mut self, output: &Path) -> TraceGridResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotCall {
    pub panel: PanelPosition,
    pub label: String,
    pub kind: SeriesKind,
    pub series: Series,
}

/// Keeps every call it receives; can replay them into another sink.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordingSink {
    layout: Option<GridLayout>,
    plots: Vec<PlotCall>,
    saved: Vec<PathBuf>,
}

impl RecordingSink {
    pub fn layout(&self) -> Option<&GridLayout> {
        self.layout.as_ref()
    }

    pub fn plots(&self) -> &[PlotCall] {
        &self.plots
    }

    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    pub fn replay(&self, sink: &mut dyn RenderSink, output: &Path) -> TraceGridResult<()> {
        let layout = self.layout.as_ref().ok_or_else(|| {
            TraceGridError::Render("nothing recorded: sink was never configured".to_string())
        })?;
        sink.configure(layout)?;
        for call in &self.plots {
            sink.plot(call.panel, &call.series, call.kind, &call.label)?;
        }
        sink.save(output)
    }
}

impl RenderSink for RecordingSink {
    fn configure(&mut self, layout: &GridLayout) -> TraceGridResult<()> {
        self.layout = Some(layout.clone());
        self.plots.clear();
        Ok(())
    }

    fn plot(
        &mut self,
        panel: PanelPosition,
        series: &Series,
        kind: SeriesKind,
        label: &str,
    ) -> TraceGridResult<()> {
        self.plots.push(PlotCall {
            panel,
            label: label.to_string(),
            kind,
            series: series.clone(),
        });
        Ok(())
    }

    fn save(&mut self, output: &Path) -> TraceGridResult<()> {
        self.saved.push(output.to_path_buf());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn from_path(path: &Path) -> TraceGridResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("png") => Ok(Self::Png),
            Some("svg") => Ok(Self::Svg),
            _ => Err(TraceGridError::InvalidArgument(format!(
                "unsupported image output {} (use .png or .svg)",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct PanelSeries {
    label: String,
    kind: SeriesKind,
    points: Vec<(f64, f64)>,
}

/// Draws the grid with plotters once `save` is called.
#[derive(Debug, Clone, Default)]
pub struct PlotterSink {
    layout: Option<GridLayout>,
    panels: BTreeMap<PanelPosition, Vec<PanelSeries>>,
}

impl PlotterSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderSink for PlotterSink {
    fn configure(&mut self, layout: &GridLayout) -> TraceGridResult<()> {
        if layout.rows.is_empty() || layout.columns.is_empty() {
            return Err(TraceGridError::Render("grid has no panels".to_string()));
        }
        if layout.y_ranges.len() != layout.rows.len() {
            return Err(TraceGridError::Render(format!(
                "{} y ranges for {} rows",
                layout.y_ranges.len(),
                layout.rows.len()
            )));
        }
        self.layout = Some(layout.clone());
        self.panels.clear();
        Ok(())
    }

    fn plot(
        &mut self,
        panel: PanelPosition,
        series: &Series,
        kind: SeriesKind,
        label: &str,
    ) -> TraceGridResult<()> {
        let Some(layout) = &self.layout else {
            return Err(TraceGridError::Render("plot before configure".to_string()));
        };
        if panel.row >= layout.rows.len() || panel.column >= layout.columns.len() {
            return Err(TraceGridError::Render(format!(
                "panel ({}, {}) is outside the {}x{} grid",
                panel.row,
                panel.column,
                layout.rows.len(),
                layout.columns.len()
            )));
        }
        self.panels.entry(panel).or_default().push(PanelSeries {
            label: label.to_string(),
            kind,
            points: series.points.clone(),
        });
        Ok(())
    }

    fn save(&mut self, output: &Path) -> TraceGridResult<()> {
        let Some(layout) = &self.layout else {
            return Err(TraceGridError::Render("save before configure".to_string()));
        };
        let format = ImageFormat::from_path(output)?;
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let size = (
            PANEL_SIZE.0 * layout.columns.len() as u32,
            PANEL_SIZE.1 * layout.rows.len() as u32,
        );
        match format {
            ImageFormat::Png => {
                let root = BitMapBackend::new(output, size).into_drawing_area();
                draw_grid(root, layout, &self.panels)
            }
            ImageFormat::Svg => {
                let root = SVGBackend::new(output, size).into_drawing_area();
                draw_grid(root, layout, &self.panels)
            }
        }
    }
}

fn render_error(err: impl std::fmt::Display) -> TraceGridError {
    TraceGridError::Render(err.to_string())
}

/// Guards against a zero-width axis when every value in a row is zero.
fn axis(range: (f64, f64)) -> std::ops::Range<f64> {
    let (lo, hi) = range;
    if hi > lo { lo..hi } else { lo..lo + 1.0 }
}

/// Holds each value flat until the next x, then jumps.
fn step_points(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(points.len() * 2);
    for (i, &(x, y)) in points.iter().enumerate() {
        if i > 0 {
            out.push((x, points[i - 1].1));
        }
        out.push((x, y));
    }
    out
}

fn draw_grid<DB>(
    root: DrawingArea<DB, Shift>,
    layout: &GridLayout,
    panels: &BTreeMap<PanelPosition, Vec<PanelSeries>>,
) -> TraceGridResult<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(render_error)?;
    let columns = layout.columns.len();
    let areas = root.split_evenly((layout.rows.len(), columns));

    for (idx, area) in areas.iter().enumerate() {
        let position = PanelPosition {
            row: idx / columns,
            column: idx % columns,
        };
        let mut builder = ChartBuilder::on(area);
        builder
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(60);
        if position.row == 0 {
            builder.caption(&layout.columns[position.column], ("sans-serif", 22));
        }
        let mut chart = builder
            .build_cartesian_2d(axis(layout.x_range), axis(layout.y_ranges[position.row]))
            .map_err(render_error)?;
        chart
            .configure_mesh()
            .x_desc("relative time")
            .y_desc(layout.rows[position.row].as_str())
            .draw()
            .map_err(render_error)?;

        let Some(series) = panels.get(&position) else {
            continue;
        };
        for (i, s) in series.iter().enumerate() {
            let color = Palette99::pick(i).mix(0.9);
            let points = s.points.iter().copied();
            let drawn = match s.kind {
                SeriesKind::Line => chart
                    .draw_series(LineSeries::new(points, &color))
                    .map_err(render_error)?,
                SeriesKind::FilledArea => chart
                    .draw_series(
                        AreaSeries::new(points, 0.0, color.mix(0.3)).border_style(&color),
                    )
                    .map_err(render_error)?,
                SeriesKind::Step => chart
                    .draw_series(LineSeries::new(step_points(&s.points), &color))
                    .map_err(render_error)?,
            };
            drawn
                .label(s.label.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_error)?;
    }

    root.present().map_err(render_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metric;

    fn layout() -> GridLayout {
        GridLayout {
            rows: vec!["latency".to_string()],
            columns: vec!["patched".to_string(), "og".to_string()],
            x_range: (0.0, 20.2),
            y_ranges: vec![(0.0, 1.2)],
        }
    }

    fn series() -> Series {
        Series {
            metric: Metric::Latency,
            kind: SeriesKind::Line,
            points: vec![(0.0, 0.2), (1.0, 0.9)],
        }
    }

    #[test]
    fn recording_replays_into_another_sink() {
        let mut recording = RecordingSink::default();
        recording.configure(&layout()).expect("configure");
        recording
            .plot(PanelPosition { row: 0, column: 1 }, &series(), SeriesKind::Line, "latency")
            .expect("plot");

        let mut copy = RecordingSink::default();
        recording
            .replay(&mut copy, Path::new("out.svg"))
            .expect("replay");
        assert_eq!(copy.plots(), recording.plots());
        assert_eq!(copy.layout(), Some(&layout()));
        assert_eq!(copy.saved(), &[PathBuf::from("out.svg")]);
    }

    #[test]
    fn plotter_sink_rejects_out_of_grid_panels() {
        let mut sink = PlotterSink::new();
        assert!(sink
            .plot(PanelPosition { row: 0, column: 0 }, &series(), SeriesKind::Line, "latency")
            .is_err());
        sink.configure(&layout()).expect("configure");
        assert!(sink
            .plot(PanelPosition { row: 1, column: 0 }, &series(), SeriesKind::Line, "latency")
            .is_err());
        assert!(sink
            .plot(PanelPosition { row: 0, column: 1 }, &series(), SeriesKind::Line, "latency")
            .is_ok());
    }

    #[test]
    fn image_format_follows_extension() {
        assert_eq!(
            ImageFormat::from_path(Path::new("current.PNG")).expect("png"),
            ImageFormat::Png
        );
        assert_eq!(
            ImageFormat::from_path(Path::new("grid.svg")).expect("svg"),
            ImageFormat::Svg
        );
        assert!(ImageFormat::from_path(Path::new("grid.pdf")).is_err());
    }

    fn temp_workspace(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tracegrid-render-{name}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn two_by_two(y_max: f64) -> GridLayout {
        GridLayout {
            rows: vec!["waits".to_string(), "latency".to_string()],
            columns: vec!["patched".to_string(), "og".to_string()],
            x_range: (0.0, 20.2),
            y_ranges: vec![(0.0, y_max), (0.0, y_max)],
        }
    }

    #[test]
    fn plotter_sink_writes_svg_grid() {
        let dir = temp_workspace("svg");
        let out = dir.join("grid.svg");
        let mut sink = PlotterSink::new();
        sink.configure(&two_by_two(1.2)).expect("configure");
        let occupancy = Series {
            metric: Metric::Wait,
            kind: SeriesKind::FilledArea,
            points: vec![(0.0, 0.0), (10.0, 1.0), (11.0, 1.0), (12.0, 0.0)],
        };
        sink.plot(PanelPosition { row: 0, column: 0 }, &occupancy, SeriesKind::FilledArea, "wait")
            .expect("plot area");
        sink.plot(PanelPosition { row: 1, column: 1 }, &series(), SeriesKind::Line, "latency")
            .expect("plot line");
        let steps = Series {
            metric: Metric::Wait,
            kind: SeriesKind::Step,
            points: vec![(0.0, 1.0), (3.0, 2.0), (4.0, 2.0)],
        };
        sink.plot(PanelPosition { row: 0, column: 1 }, &steps, SeriesKind::Step, "wait")
            .expect("plot steps");
        sink.save(&out).expect("save");

        let svg = std::fs::read_to_string(&out).expect("read svg");
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn plotter_sink_draws_flat_rows() {
        let dir = temp_workspace("flat");
        let out = dir.join("nested").join("grid.svg");
        let mut sink = PlotterSink::new();
        sink.configure(&two_by_two(0.0)).expect("configure");
        let zeros = Series {
            metric: Metric::Latency,
            kind: SeriesKind::Line,
            points: vec![(0.0, 0.0), (5.0, 0.0)],
        };
        sink.plot(PanelPosition { row: 1, column: 0 }, &zeros, SeriesKind::Line, "latency")
            .expect("plot");
        sink.save(&out).expect("save");
        assert!(out.exists());
    }

    #[test]
    fn step_points_hold_until_next_x() {
        assert_eq!(
            step_points(&[(0.0, 1.0), (3.0, 2.0), (4.0, 0.0)]),
            vec![(0.0, 1.0), (3.0, 1.0), (3.0, 2.0), (4.0, 2.0), (4.0, 0.0)]
        );
        assert!(step_points(&[]).is_empty());
    }

    #[test]
    fn flat_rows_get_a_unit_axis() {
        assert_eq!(axis((0.0, 0.0)), 0.0..1.0);
        assert_eq!(axis((0.0, 2.4)), 0.0..2.4);
    }
}
