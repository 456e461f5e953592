use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use base::defs::Result;

use crate::catalog::ViewCatalog;
use crate::sampler::{AppearanceSampler, SampledView};
use crate::solver::solve_premultiplied;
use crate::technique::{
    check_capabilities, residual_error, sample_all, FidelitySettings,
    FidelityTechnique, Reconstruction, ResidualNorm,
};

/// Normal equations of one target against every catalog view.
struct GramCache {
    ata: DMatrix<f64>,
    atb: DVector<f64>,
    btb: f64,
    rows: usize,
}

impl GramCache {
    /// Rows are the weighted pixel channels of the target. A basis view only
    /// contributes where it has a sample itself.
    fn build(views: &[SampledView], target: usize) -> Self {
        let truth = &views[target];
        let pixels: Vec<usize> =
            (0..truth.len()).filter(|&p| truth.weights[p] > 0.0).collect();
        let rows = 3 * pixels.len();

        let mut a = DMatrix::zeros(rows, views.len());
        for (j, view) in views.iter().enumerate() {
            for (r, &p) in pixels.iter().enumerate() {
                if view.weights[p] > 0.0 {
                    let w = truth.weights[p] as f64;
                    for c in 0..3 {
                        a[(3 * r + c, j)] = w * view.radiance[p][c] as f64;
                    }
                }
            }
        }

        let b = DVector::from_fn(rows, |row, _| {
            let p = pixels[row / 3];
            truth.weights[p] as f64 * truth.radiance[p][row % 3] as f64
        });

        debug!("  gram cache of view {} has {} rows", target, rows);
        Self {
            ata: a.tr_mul(&a),
            atb: a.tr_mul(&b),
            btb: b.dot(&b),
            rows,
        }
    }
}

struct Solution {
    indices: Vec<usize>,
    weights: DVector<f64>,
    error: f64,
}

/// Reconstructs the target as a non-negative blend of the basis views.
pub struct LinearSystemTechnique {
    views: Vec<SampledView>,
    caches: Vec<GramCache>,
    active: Vec<usize>,
    residual: ResidualNorm,
    tolerance: f64,
}

impl LinearSystemTechnique {
    pub fn new() -> Self {
        let settings = FidelitySettings::default();
        Self {
            views: vec![],
            caches: vec![],
            active: vec![],
            residual: settings.residual,
            tolerance: settings.nnls_tolerance,
        }
    }

    fn solve(&self, target: usize, active: &[usize]) -> Option<Solution> {
        let cache = self.caches.get(target)?;
        let indices: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&j| j < self.caches.len())
            .collect();
        let k = indices.len();

        let ata = DMatrix::from_fn(k, k, |r, c| {
            cache.ata[(indices[r], indices[c])]
        });
        let atb = DVector::from_fn(k, |r, _| cache.atb[indices[r]]);

        let weights = solve_premultiplied(&ata, &atb, self.tolerance)?;
        if weights.iter().any(|x| !x.is_finite()) {
            return None;
        }

        let residual_sq = weights.dot(&(&ata * &weights))
            - 2.0 * weights.dot(&atb)
            + cache.btb;
        let error =
            residual_error(self.residual, residual_sq, cache.btb, cache.rows);

        Some(Solution {
            indices,
            weights,
            error,
        })
    }
}

impl Default for LinearSystemTechnique {
    fn default() -> Self {
        Self::new()
    }
}

impl FidelityTechnique for LinearSystemTechnique {
    fn initialize(
        &mut self,
        catalog: &ViewCatalog,
        sampler: &mut dyn AppearanceSampler,
        settings: &FidelitySettings,
        resolution: u32,
    ) -> Result<()> {
        check_capabilities("linear-system", settings, true, sampler)?;
        self.close();

        self.residual = settings.residual;
        self.tolerance = settings.nnls_tolerance;
        self.views = sample_all(catalog, sampler, settings, resolution)?;

        info!("  building Gram matrices for {} views...", self.views.len());
        let views = &self.views;
        self.caches = (0..views.len())
            .into_par_iter()
            .map(|t| GramCache::build(views, t))
            .collect();

        Ok(())
    }

    fn set_active_views(&mut self, views: &[usize]) {
        self.active = views.to_vec();
    }

    fn active_views(&self) -> &[usize] {
        &self.active
    }

    fn evaluate_baseline_error(&self, _target: usize) -> f64 {
        0.0
    }

    fn evaluate_error_with(&self, target: usize, active: &[usize]) -> f64 {
        self.solve(target, active).map_or(f64::NAN, |s| s.error)
    }

    fn is_guaranteed_monotonic(&self) -> bool {
        true
    }

    fn is_guaranteed_interpolating(&self) -> bool {
        true
    }

    fn reconstruct(
        &self,
        target: usize,
        active: &[usize],
    ) -> Option<Reconstruction> {
        let solution = self.solve(target, active)?;
        let truth = &self.views[target];

        let mut recon = vec![[0.0f32; 3]; truth.len()];
        for (r, &j) in solution.indices.iter().enumerate() {
            let (view, x) = (&self.views[j], solution.weights[r]);
            for (p, value) in recon.iter_mut().enumerate() {
                if view.weights[p] > 0.0 {
                    for c in 0..3 {
                        value[c] += (x * view.radiance[p][c] as f64) as f32;
                    }
                }
            }
        }

        Some(Reconstruction {
            width: truth.width,
            height: truth.height,
            truth: truth.radiance.clone(),
            recon,
            weights: truth.weights.clone(),
        })
    }

    fn close(&mut self) {
        self.views = vec![];
        self.caches = vec![];
        self.active.clear();
    }
}
