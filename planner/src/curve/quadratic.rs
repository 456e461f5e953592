use log::warn;

use base::defs::{Error, ErrorKind::*, Result};

/// Error growth with angular distance: quadratic up to the peak distance
/// `2 * peak / slope`, flat at `baseline + peak` beyond it. A zero peak means
/// unbounded linear growth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadraticModel {
    pub baseline: f64,
    pub slope: f64,
    pub peak: f64,
}

impl QuadraticModel {
    pub fn linear(baseline: f64, slope: f64) -> Self {
        let slope = if slope.is_finite() { slope.max(0.0) } else { 0.0 };
        Self {
            baseline,
            slope,
            peak: 0.0,
        }
    }

    pub fn is_linear(&self) -> bool {
        !(self.peak > 0.0)
    }

    pub fn peak_distance(&self) -> f64 {
        if self.peak > 0.0 && self.slope > 0.0 {
            2.0 * self.peak / self.slope
        } else {
            f64::INFINITY
        }
    }

    pub fn predict(&self, distance: f64) -> f64 {
        let (slope, peak) = (self.slope, self.peak);
        if !(slope > 0.0) {
            return self.baseline;
        }

        let d = distance.max(0.0);
        if peak > 0.0 {
            if d >= self.peak_distance() {
                self.baseline + peak
            } else {
                self.baseline + slope * d - slope * slope * d * d / (4.0 * peak)
            }
        } else {
            self.baseline + slope * d
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct QuadraticFitParams {
    pub max_iterations: usize,
    /// Fewer samples below the peak distance than this rule out a quadratic.
    pub min_quadratic_samples: usize,
}

impl Default for QuadraticFitParams {
    fn default() -> Self {
        Self {
            max_iterations: 64,
            min_quadratic_samples: 5,
        }
    }
}

#[derive(Default)]
struct Sums {
    d2: f64,
    d3: f64,
    d4: f64,
    ed: f64,
    ed2: f64,
}

impl Sums {
    fn add(&mut self, d: f64, e: f64) {
        let d2 = d * d;
        self.d2 += d2;
        self.d3 += d2 * d;
        self.d4 += d2 * d2;
        self.ed += e * d;
        self.ed2 += e * d2;
    }

    /// Least squares `e ≈ a * d^2 + slope * d`, returns `(a, slope)`.
    fn solve(&self) -> Option<(f64, f64)> {
        let det = self.d4 * self.d2 - self.d3 * self.d3;
        if !(det.abs() > 0.0) {
            return None;
        }
        let a = (self.d2 * self.ed2 - self.d3 * self.ed) / det;
        let slope = (self.d4 * self.ed - self.d3 * self.ed2) / det;
        Some((a, slope))
    }
}

fn relative_samples(samples: &[(f64, f64)], baseline: f64) -> Vec<(f64, f64)> {
    samples
        .iter()
        .filter(|(d, e)| d.is_finite() && e.is_finite() && *d > 0.0)
        .map(|&(d, e)| (d, e - baseline))
        .collect()
}

/// Least-squares line through `(0, baseline)`.
pub fn fit_linear(samples: &[(f64, f64)], baseline: f64) -> QuadraticModel {
    let mut sums = Sums::default();
    for (d, e) in relative_samples(samples, baseline) {
        sums.add(d, e);
    }
    QuadraticModel::linear(baseline, sums.ed / sums.d2)
}

/// Fits the clamped quadratic by fixed-point iteration on the peak distance:
/// samples at or beyond the current peak distance leave the quadratic term
/// and are blended into the peak instead. Data with no usable quadratic
/// yields the linear fit; exceeding the iteration bound is
/// `FitNonConvergence`.
pub fn fit_quadratic(
    samples: &[(f64, f64)],
    baseline: f64,
    params: &QuadraticFitParams,
) -> Result<QuadraticModel> {
    let samples = relative_samples(samples, baseline);
    let n = samples.len();

    let mut max_distance = f64::INFINITY;
    let mut previous: Option<QuadraticModel> = None;

    for _ in 0..params.max_iterations {
        let mut sums = Sums::default();
        let (mut high_sum, mut high_count) = (0.0, 0);
        for &(d, e) in &samples {
            if d < max_distance {
                sums.add(d, e);
            } else {
                high_sum += e;
                high_count += 1;
            }
        }
        let low_count = n - high_count;

        let estimate = sums
            .solve()
            .filter(|_| low_count >= params.min_quadratic_samples)
            .and_then(|(a, slope)| {
                if !(slope > 0.0) || !slope.is_finite() {
                    return None;
                }
                let ls_peak = -slope * slope / (4.0 * a);
                if !(ls_peak > 0.0) || !ls_peak.is_finite() {
                    return None;
                }

                let peak = if high_count == 0 {
                    ls_peak
                } else {
                    let mean_high = high_sum / high_count as f64;
                    ((2.0 * mean_high).min(ls_peak) * low_count as f64
                        + high_sum)
                        / n as f64
                };

                if peak > 0.0 && peak.is_finite() {
                    Some(QuadraticModel {
                        baseline,
                        slope,
                        peak,
                    })
                } else {
                    None
                }
            });

        let model = match (estimate, previous) {
            (Some(model), _) => model,
            (None, Some(previous)) => return Ok(previous),
            (None, None) => {
                let mut sums = Sums::default();
                for &(d, e) in &samples {
                    sums.add(d, e);
                }
                return Ok(QuadraticModel::linear(baseline, sums.ed / sums.d2));
            }
        };

        let peak_distance = model.peak_distance();
        if !(peak_distance < max_distance) {
            return Ok(model);
        }
        max_distance = peak_distance;
        previous = Some(model);
    }

    let desc = format!(
        "peak distance did not settle within {} iterations",
        params.max_iterations
    );
    Err(Error::new(FitNonConvergence, desc))
}

pub fn fit_quadratic_or_linear(
    samples: &[(f64, f64)],
    baseline: f64,
    params: &QuadraticFitParams,
) -> QuadraticModel {
    match fit_quadratic(samples, baseline, params) {
        Ok(model) => model,
        Err(err) => {
            warn!("  {}, falling back to linear fit", err);
            fit_linear(samples, baseline)
        }
    }
}
