/// Monotone (non-decreasing) cubic Hermite interpolation with Fritsch-Carlson
/// tangents. Extrapolates flat on both sides.
#[derive(Clone, Debug, PartialEq)]
pub struct MonotoneSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    tangents: Vec<f64>,
}

impl MonotoneSpline {
    /// Non-finite points are dropped, duplicate abscissas keep the largest
    /// value and ordinates are clamped to be non-decreasing. Returns `None`
    /// if no point is left.
    pub fn new(points: &[(f64, f64)]) -> Option<Self> {
        let mut sorted: Vec<(f64, f64)> = points
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut xs: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut ys: Vec<f64> = Vec::with_capacity(sorted.len());
        for (x, y) in sorted {
            if let (Some(&last_x), Some(last_y)) = (xs.last(), ys.last_mut()) {
                if last_x == x {
                    *last_y = last_y.max(y);
                    continue;
                }
            }
            let floor = ys.last().copied().unwrap_or(y);
            xs.push(x);
            ys.push(y.max(floor));
        }

        if xs.is_empty() {
            return None;
        }

        let n = xs.len();
        let secants: Vec<f64> = (0..n - 1)
            .map(|k| (ys[k + 1] - ys[k]) / (xs[k + 1] - xs[k]))
            .collect();

        let mut tangents = vec![0.0; n];
        if n > 1 {
            tangents[0] = secants[0];
            tangents[n - 1] = secants[n - 2];
            for k in 1..n - 1 {
                if secants[k - 1] > 0.0 && secants[k] > 0.0 {
                    tangents[k] = 0.5 * (secants[k - 1] + secants[k]);
                }
            }

            for k in 0..n - 1 {
                if secants[k] == 0.0 {
                    tangents[k] = 0.0;
                    tangents[k + 1] = 0.0;
                    continue;
                }
                let alpha = tangents[k] / secants[k];
                let beta = tangents[k + 1] / secants[k];
                let norm = alpha * alpha + beta * beta;
                if norm > 9.0 {
                    let tau = 3.0 / norm.sqrt();
                    tangents[k] = tau * alpha * secants[k];
                    tangents[k + 1] = tau * beta * secants[k];
                }
            }
        }

        Some(Self { xs, ys, tangents })
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x.is_nan() {
            return f64::NAN;
        }
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }

        let k = self.xs.partition_point(|&v| v <= x) - 1;
        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let (t2, t3) = (t * t, t * t * t);

        let value = (2.0 * t3 - 3.0 * t2 + 1.0) * self.ys[k]
            + (t3 - 2.0 * t2 + t) * h * self.tangents[k]
            + (-2.0 * t3 + 3.0 * t2) * self.ys[k + 1]
            + (t3 - t2) * h * self.tangents[k + 1];

        // Rounding must not leak outside the monotone envelope.
        value.clamp(self.ys[k], self.ys[k + 1])
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    pub fn first(&self) -> (f64, f64) {
        (self.xs[0], self.ys[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::assert_eq_f64;

    #[test]
    fn test_interpolates_control_points() {
        let points = [(0.0, 0.0), (1.0, 0.5), (2.0, 0.6), (4.0, 2.0)];
        let spline = MonotoneSpline::new(&points).unwrap();
        for &(x, y) in &points {
            assert_eq_f64!(spline.evaluate(x), y);
        }
        assert_eq_f64!(spline.evaluate(-1.0), 0.0);
        assert_eq_f64!(spline.evaluate(10.0), 2.0);
    }

    #[test]
    fn test_monotone_on_noisy_samples() {
        let points = [
            (0.3, 0.2),
            (0.0, 0.1),
            (0.5, 0.15),
            (0.5, 0.25),
            (0.9, 0.9),
            (1.0, 0.91),
            (1.4, 0.3),
            (f64::NAN, 5.0),
            (2.0, f64::INFINITY),
        ];
        let spline = MonotoneSpline::new(&points).unwrap();
        assert_eq!(spline.points().count(), 6);

        let mut previous = f64::NEG_INFINITY;
        for i in 0..=300 {
            let value = spline.evaluate(i as f64 * 0.01 - 0.5);
            assert!(value >= previous, "{} < {} at {}", value, previous, i);
            previous = value;
        }
        assert_eq_f64!(spline.evaluate(1.4), 0.91);
        assert_eq_f64!(spline.evaluate(0.5), 0.25);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(MonotoneSpline::new(&[]).is_none());
        assert!(MonotoneSpline::new(&[(f64::NAN, 1.0)]).is_none());

        let spline = MonotoneSpline::new(&[(1.0, 3.0)]).unwrap();
        assert_eq_f64!(spline.evaluate(0.0), 3.0);
        assert_eq_f64!(spline.evaluate(5.0), 3.0);
    }
}
