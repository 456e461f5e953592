use std::io::Write;

use base::defs::{IntoResult, Result};

use crate::catalog::ViewCatalog;
use crate::curve::{ErrorDistanceCurve, ViewCurve};
use crate::selection::{RankedEntry, RankedSelection};

/// Tab-separated report, flushed after every section and selection row so
/// that long runs can be followed (and survive interruption).
pub struct TsvReport<W: Write> {
    writer: W,
}

fn join<I: Iterator<Item = f64>>(values: I) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join("\t")
}

impl<W: Write> TsvReport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        for line in lines {
            writeln!(self.writer, "{}", line)
                .res(|| "failed to write report".to_string())?;
        }
        self.writer
            .flush()
            .res(|| "failed to flush report".to_string())
    }

    pub fn write_baselines(
        &mut self,
        catalog: &ViewCatalog,
        baselines: &[f64],
    ) -> Result<()> {
        let mut lines = vec![
            "#baselines".to_string(),
            "view\timage\tbaseline".to_string(),
        ];
        for (i, baseline) in baselines.iter().enumerate() {
            let image = &catalog.view(i).image;
            lines.push(format!("{}\t{}\t{}", i, image, baseline));
        }
        self.write_lines(&lines)
    }

    pub fn write_curves(
        &mut self,
        catalog: &ViewCatalog,
        curves: &[ViewCurve],
    ) -> Result<()> {
        let header = "view\timage\tkind\tslope\tpeak\tpeak_distance\tsamples";
        let mut lines = vec!["#curves".to_string(), header.to_string()];

        for (i, view_curve) in curves.iter().enumerate() {
            let parameters = match &view_curve.curve {
                ErrorDistanceCurve::Quadratic(model) => format!(
                    "{}\t{}\t{}",
                    model.slope,
                    model.peak,
                    model.peak_distance()
                ),
                ErrorDistanceCurve::Spline(_) => "-\t-\t-".to_string(),
            };
            lines.push(format!(
                "{}\t{}\t{}\t{}\t{}",
                i,
                catalog.view(i).image,
                view_curve.curve.kind(),
                parameters,
                view_curve.samples.len()
            ));
        }

        for (i, view_curve) in curves.iter().enumerate() {
            let samples = &view_curve.samples;
            lines.push(format!(
                "distances\t{}\t{}",
                i,
                join(samples.iter().map(|s| s.0))
            ));
            lines.push(format!(
                "errors\t{}\t{}",
                i,
                join(samples.iter().map(|s| s.1))
            ));
        }

        self.write_lines(&lines)
    }

    pub fn begin_selection(&mut self) -> Result<()> {
        self.write_lines(&[
            "#selection".to_string(),
            "rank\tview\timage\tmarginal\ttotal".to_string(),
        ])
    }

    pub fn end_selection(
        &mut self,
        selection: &RankedSelection,
    ) -> Result<()> {
        self.write_lines(&[
            "#summary".to_string(),
            format!("initial_total\t{}", selection.initial_total_error),
            format!("termination\t{}", selection.termination.name()),
        ])
    }

    pub fn write_selection_entry(
        &mut self,
        catalog: &ViewCatalog,
        rank: usize,
        entry: &RankedEntry,
    ) -> Result<()> {
        self.write_lines(&[format!(
            "{}\t{}\t{}\t{}\t{}",
            rank,
            entry.view,
            catalog.view(entry.view).image,
            entry.marginal_contribution,
            entry.total_error
        )])
    }

    pub fn write_target_fidelity(
        &mut self,
        errors: &[f64],
        metric: f64,
    ) -> Result<()> {
        let mut lines = vec![
            "#target-fidelity".to_string(),
            format!("metric\t{}", metric),
            "target\terror".to_string(),
        ];
        for (i, error) in errors.iter().enumerate() {
            lines.push(format!("{}\t{}", i, error));
        }
        self.write_lines(&lines)
    }
}

pub fn write_selection_json<W: Write>(
    writer: W,
    selection: &RankedSelection,
) -> Result<()> {
    serde_json::to_writer_pretty(writer, selection)
        .res(|| "failed to write selection JSON".to_string())
}
