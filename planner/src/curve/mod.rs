mod quadratic;
mod spline;

use std::f64::consts::FRAC_PI_2;

use log::info;
use rayon::prelude::*;

use crate::catalog::ViewCatalog;
use crate::technique::FidelityTechnique;
pub use crate::curve::{quadratic::*, spline::*};

/// Predicted error as a function of the angular distance to the nearest
/// basis view. Passes through `(0, baseline)` and never decreases.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorDistanceCurve {
    Quadratic(QuadraticModel),
    Spline(MonotoneSpline),
}

impl ErrorDistanceCurve {
    /// Spline through the raw samples when the technique guarantees
    /// monotonic errors, clamped quadratic otherwise.
    pub fn fit(
        samples: &[(f64, f64)],
        baseline: f64,
        monotonic: bool,
        params: &QuadraticFitParams,
    ) -> Self {
        if monotonic {
            let points: Vec<(f64, f64)> = std::iter::once((0.0, baseline))
                .chain(samples.iter().copied().filter(|s| s.0 > 0.0))
                .collect();
            if let Some(spline) = MonotoneSpline::new(&points) {
                return ErrorDistanceCurve::Spline(spline);
            }
        }
        ErrorDistanceCurve::Quadratic(fit_quadratic_or_linear(
            samples, baseline, params,
        ))
    }

    pub fn predict(&self, distance: f64) -> f64 {
        match self {
            ErrorDistanceCurve::Quadratic(model) => model.predict(distance),
            ErrorDistanceCurve::Spline(spline) => {
                spline.evaluate(distance.max(0.0))
            }
        }
    }

    pub fn baseline(&self) -> f64 {
        match self {
            ErrorDistanceCurve::Quadratic(model) => model.baseline,
            ErrorDistanceCurve::Spline(spline) => spline.first().1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ErrorDistanceCurve::Quadratic(model) if model.is_linear() => {
                "linear"
            }
            ErrorDistanceCurve::Quadratic(_) => "quadratic",
            ErrorDistanceCurve::Spline(_) => "spline",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CurveParams {
    /// Sampling stops once the nearest basis view is this far away.
    pub max_distance: f64,
    /// Minimum sample count before a settled fit may end sampling early.
    pub stable_samples: usize,
    pub stable_tolerance: f64,
    pub fit: QuadraticFitParams,
}

impl Default for CurveParams {
    fn default() -> Self {
        Self {
            max_distance: FRAC_PI_2,
            stable_samples: 10,
            stable_tolerance: 1e-6,
            fit: QuadraticFitParams::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ViewCurve {
    pub samples: Vec<(f64, f64)>,
    pub curve: ErrorDistanceCurve,
}

/// Samples `(distance to nearest basis view, error)` for `target` by
/// repeatedly dropping the nearest remaining basis views.
pub fn collect_samples(
    catalog: &ViewCatalog,
    technique: &dyn FidelityTechnique,
    target: usize,
    baseline: f64,
    params: &CurveParams,
) -> Vec<(f64, f64)> {
    let distances = catalog.distances_from(target);
    let monotonic = technique.is_guaranteed_monotonic();

    let mut samples = Vec::new();
    let mut last_distance = 0.0;
    let mut previous_peak_distance: Option<f64> = None;

    loop {
        let active: Vec<usize> = (0..catalog.len())
            .filter(|&j| j != target && distances[j] > last_distance)
            .collect();
        if active.is_empty() {
            break;
        }

        let min_distance = active
            .iter()
            .map(|&j| distances[j])
            .fold(f64::INFINITY, f64::min);
        let error = technique.evaluate_error_with(target, &active);
        if !error.is_finite() {
            break;
        }

        samples.push((min_distance, error));
        if min_distance >= params.max_distance {
            break;
        }
        last_distance = min_distance;

        if !monotonic && samples.len() >= params.stable_samples {
            let peak_distance = fit_quadratic(&samples, baseline, &params.fit)
                .ok()
                .filter(|m| !m.is_linear())
                .map(|m| m.peak_distance());

            if let (Some(current), Some(previous)) =
                (peak_distance, previous_peak_distance)
            {
                let settled = (current - previous).abs()
                    <= params.stable_tolerance * previous;
                if settled && min_distance > current {
                    break;
                }
            }
            previous_peak_distance = peak_distance;
        }
    }

    samples
}

pub fn build_curves(
    catalog: &ViewCatalog,
    technique: &dyn FidelityTechnique,
    baselines: &[f64],
    params: &CurveParams,
) -> Vec<ViewCurve> {
    info!(
        "  constructing error-distance curves for {} views...",
        catalog.len()
    );
    let monotonic = technique.is_guaranteed_monotonic();

    let curves: Vec<ViewCurve> = (0..catalog.len())
        .into_par_iter()
        .map(|i| {
            let baseline = if baselines[i].is_finite() {
                baselines[i]
            } else {
                0.0
            };
            let samples =
                collect_samples(catalog, technique, i, baseline, params);
            let curve = ErrorDistanceCurve::fit(
                &samples, baseline, monotonic, &params.fit,
            );
            ViewCurve { samples, curve }
        })
        .collect();

    let splines = curves
        .iter()
        .filter(|c| matches!(c.curve, ErrorDistanceCurve::Spline(_)))
        .count();
    info!(
        "  fitted {} spline and {} parametric curves",
        splines,
        curves.len() - splines
    );

    curves
}
