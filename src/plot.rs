//! Grid-of-panels charts rendered to SVG.
//!
//! A [`Figure`] is a `rows × cols` grid of optional [`Panel`]s. Each panel
//! holds line and scatter [`Series`] plus axis and decoration settings.
//! Nothing touches the filesystem until [`Figure::save`].

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::{Error, Result};

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const BLACK_RGB: Rgb = Rgb(0, 0, 0);
pub const BLUE_RGB: Rgb = Rgb(0, 0, 255);
pub const RED_RGB: Rgb = Rgb(255, 0, 0);

impl From<Rgb> for RGBColor {
    fn from(c: Rgb) -> Self {
        RGBColor(c.0, c.1, c.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Line,
    Scatter,
}

/// A labelled set of points.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub kind: SeriesKind,
    pub color: Rgb,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn line(label: &str, color: Rgb, points: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.to_owned(),
            kind: SeriesKind::Line,
            color,
            points,
        }
    }

    pub fn scatter(label: &str, color: Rgb, points: Vec<(f64, f64)>) -> Self {
        Self {
            label: label.to_owned(),
            kind: SeriesKind::Scatter,
            color,
            points,
        }
    }

    /// Line through `values` plotted against their indices.
    pub fn indexed(label: &str, color: Rgb, values: &[f32]) -> Self {
        let points = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as f64, f64::from(v)))
            .collect();
        Self::line(label, color, points)
    }
}

/// One chart of a figure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    pub title: String,
    pub series: Vec<Series>,
    /// Fixed x limits; derived from the data when `None`.
    pub x_range: Option<(f64, f64)>,
    /// Fixed y limits; derived from the data when `None`.
    pub y_range: Option<(f64, f64)>,
    pub grid: bool,
    pub legend: bool,
    /// Draw the axes through the origin.
    pub zero_axes: bool,
}

impl Panel {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_limits(mut self, x: (f64, f64), y: (f64, f64)) -> Self {
        self.x_range = Some(x);
        self.y_range = Some(y);
        self
    }

    pub fn with_grid(mut self) -> Self {
        self.grid = true;
        self
    }

    pub fn with_legend(mut self) -> Self {
        self.legend = true;
        self
    }

    pub fn with_zero_axes(mut self) -> Self {
        self.zero_axes = true;
        self
    }

    /// Axis limits: the fixed ones, or the data extent padded by 5%.
    pub fn bounds(&self) -> ((f64, f64), (f64, f64)) {
        let points = self.series.iter().flat_map(|s| s.points.iter());
        let x = self
            .x_range
            .unwrap_or_else(|| padded(points.clone().map(|p| p.0)));
        let y = self.y_range.unwrap_or_else(|| padded(points.map(|p| p.1)));
        (x, y)
    }
}

fn padded(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return (-1.0, 1.0);
    }
    if lo == hi {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// A grid of panels.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    rows: usize,
    cols: usize,
    size: (u32, u32),
    panels: Vec<Option<Panel>>,
}

impl Figure {
    /// An empty `rows × cols` figure of `size` pixels.
    pub fn new(rows: usize, cols: usize, size: (u32, u32)) -> Self {
        Self {
            rows,
            cols,
            size,
            panels: vec![None; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Places `panel` at `(row, col)`, replacing any previous one.
    pub fn set(&mut self, row: usize, col: usize, panel: Panel) -> Result<()> {
        if !self.contains(row, col) {
            return Err(Error::Plot(format!(
                "panel ({row}, {col}) is outside the {}x{} grid",
                self.rows, self.cols
            )));
        }
        self.panels[row * self.cols + col] = Some(panel);
        Ok(())
    }

    pub fn panel(&self, row: usize, col: usize) -> Option<&Panel> {
        if !self.contains(row, col) {
            return None;
        }
        self.panels[row * self.cols + col].as_ref()
    }

    /// Number of occupied cells.
    pub fn panel_count(&self) -> usize {
        self.panels.iter().filter(|p| p.is_some()).count()
    }

    /// Renders the figure as SVG to `path`, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let root = SVGBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        let areas = root.split_evenly((self.rows, self.cols));
        for (slot, area) in self.panels.iter().zip(&areas) {
            if let Some(panel) = slot {
                draw_panel(area, panel)?;
            }
        }
        root.present().map_err(plot_err)?;
        log::info!("saved {}-panel figure to {}", self.panel_count(), path.display());
        Ok(())
    }
}

fn plot_err(e: impl std::fmt::Display) -> Error {
    Error::Plot(e.to_string())
}

fn draw_panel(area: &DrawingArea<SVGBackend<'_>, Shift>, panel: &Panel) -> Result<()> {
    let ((x0, x1), (y0, y1)) = panel.bounds();
    let mut chart = ChartBuilder::on(area)
        .caption(panel.title.as_str(), ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x0..x1, y0..y1)
        .map_err(plot_err)?;

    let mut mesh = chart.configure_mesh();
    if !panel.grid {
        mesh.disable_mesh();
    }
    mesh.draw().map_err(plot_err)?;

    if panel.zero_axes {
        let axis = RGBColor::from(BLACK_RGB);
        if y0 <= 0.0 && 0.0 <= y1 {
            chart
                .draw_series(LineSeries::new(vec![(x0, 0.0), (x1, 0.0)], &axis))
                .map_err(plot_err)?;
        }
        if x0 <= 0.0 && 0.0 <= x1 {
            chart
                .draw_series(LineSeries::new(vec![(0.0, y0), (0.0, y1)], &axis))
                .map_err(plot_err)?;
        }
    }

    for series in &panel.series {
        let color = RGBColor::from(series.color);
        match series.kind {
            SeriesKind::Line => {
                chart
                    .draw_series(LineSeries::new(series.points.iter().copied(), &color))
                    .map_err(plot_err)?
                    .label(series.label.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            SeriesKind::Scatter => {
                chart
                    .draw_series(
                        series
                            .points
                            .iter()
                            .map(|&p| Circle::new(p, 3, color.filled())),
                    )
                    .map_err(plot_err)?
                    .label(series.label.as_str())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
            }
        }
    }

    if panel.legend && !panel.series.is_empty() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(plot_err)?;
    }
    Ok(())
}
