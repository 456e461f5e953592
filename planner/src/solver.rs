use nalgebra::{DMatrix, DVector};

/// Gradient tolerance relative to the largest entry of `Aᵀb`.
pub const DEFAULT_NNLS_TOLERANCE: f64 = 1e-10;

fn solve_free(
    ata: &DMatrix<f64>,
    atb: &DVector<f64>,
    free: &[usize],
) -> Option<DVector<f64>> {
    let k = free.len();
    let lhs = DMatrix::from_fn(k, k, |r, c| ata[(free[r], free[c])]);
    let rhs = DVector::from_fn(k, |r, _| atb[free[r]]);

    let solution = match lhs.clone().cholesky() {
        Some(cholesky) => cholesky.solve(&rhs),
        None => lhs.lu().solve(&rhs)?,
    };
    if solution.iter().all(|v| v.is_finite()) {
        Some(solution)
    } else {
        None
    }
}

/// Non-negative least squares `min ‖Ax - b‖, x ≥ 0` given `AᵀA` and `Aᵀb`
/// (Lawson-Hanson active set). A singular subsystem stops the solve with the
/// last feasible solution. Returns `None` only for non-finite input.
pub fn solve_premultiplied(
    ata: &DMatrix<f64>,
    atb: &DVector<f64>,
    tolerance: f64,
) -> Option<DVector<f64>> {
    let n = atb.len();
    let mut x = DVector::zeros(n);
    if n == 0 {
        return Some(x);
    }
    if ata.iter().chain(atb.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    let epsilon = tolerance * atb.amax().max(f64::MIN_POSITIVE);
    let mut free = vec![false; n];

    'outer: for _ in 0..3 * n + 10 {
        let w = atb - ata * &x;

        // Lowest index wins among equal gradients.
        let mut candidate: Option<usize> = None;
        for i in (0..n).filter(|&i| !free[i] && w[i] > epsilon) {
            if candidate.map_or(true, |c| w[i] > w[c]) {
                candidate = Some(i);
            }
        }
        let k = match candidate {
            Some(k) => k,
            None => break,
        };
        free[k] = true;

        loop {
            let indices: Vec<usize> = (0..n).filter(|&i| free[i]).collect();
            if indices.is_empty() {
                break;
            }

            let s = match solve_free(ata, atb, &indices) {
                Some(s) => s,
                None => {
                    free[k] = false;
                    break 'outer;
                }
            };

            if s.iter().all(|&v| v > 0.0) {
                for (r, &i) in indices.iter().enumerate() {
                    x[i] = s[r];
                }
                break;
            }

            // Step from x towards s until the first free variable hits zero.
            let (mut alpha, mut blocking) = (f64::INFINITY, indices[0]);
            for (r, &i) in indices.iter().enumerate() {
                if s[r] <= 0.0 {
                    let step = x[i] / (x[i] - s[r]);
                    if step < alpha {
                        alpha = step;
                        blocking = i;
                    }
                }
            }

            for (r, &i) in indices.iter().enumerate() {
                x[i] += alpha * (s[r] - x[i]);
                if i == blocking || x[i] <= 0.0 {
                    x[i] = 0.0;
                    free[i] = false;
                }
            }
        }
    }

    Some(x)
}
