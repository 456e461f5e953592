use base::defs::Result;

use crate::catalog::ViewCatalog;
use crate::sampler::{AppearanceSampler, SampledView};
use crate::technique::{
    check_capabilities, residual_error, sample_all, FidelitySettings,
    FidelityTechnique, Reconstruction, ResidualNorm,
};

/// Fits a per-pixel Lambertian albedo to the basis views and measures how
/// well it explains the target.
pub struct MaterialFitTechnique {
    views: Vec<SampledView>,
    all_views: Vec<usize>,
    active: Vec<usize>,
    residual: ResidualNorm,
}

impl MaterialFitTechnique {
    pub fn new() -> Self {
        Self {
            views: vec![],
            all_views: vec![],
            active: vec![],
            residual: FidelitySettings::default().residual,
        }
    }

    /// Weight-averaged basis radiance, black where no basis view has a
    /// sample.
    fn albedo(&self, p: usize, basis: &[usize]) -> [f64; 3] {
        let mut sum = [0.0; 3];
        let mut weight = 0.0;
        for view in basis.iter().filter_map(|&j| self.views.get(j)) {
            let w = view.weights[p] as f64;
            if w > 0.0 {
                weight += w;
                for c in 0..3 {
                    sum[c] += w * view.radiance[p][c] as f64;
                }
            }
        }

        if weight > 0.0 {
            sum.map(|s| s / weight)
        } else {
            [0.0; 3]
        }
    }
}

impl Default for MaterialFitTechnique {
    fn default() -> Self {
        Self::new()
    }
}

impl FidelityTechnique for MaterialFitTechnique {
    fn initialize(
        &mut self,
        catalog: &ViewCatalog,
        sampler: &mut dyn AppearanceSampler,
        settings: &FidelitySettings,
        resolution: u32,
    ) -> Result<()> {
        check_capabilities("material-fit", settings, true, sampler)?;
        self.close();

        self.residual = settings.residual;
        self.views = sample_all(catalog, sampler, settings, resolution)?;
        self.all_views = (0..self.views.len()).collect();

        Ok(())
    }

    fn set_active_views(&mut self, views: &[usize]) {
        self.active = views.to_vec();
    }

    fn active_views(&self) -> &[usize] {
        &self.active
    }

    fn evaluate_baseline_error(&self, target: usize) -> f64 {
        self.evaluate_error_with(target, &self.all_views)
    }

    fn evaluate_error_with(&self, target: usize, active: &[usize]) -> f64 {
        let truth = match self.views.get(target) {
            Some(truth) => truth,
            None => return f64::NAN,
        };

        let (mut residual_sq, mut btb, mut rows) = (0.0, 0.0, 0);
        for p in (0..truth.len()).filter(|&p| truth.weights[p] > 0.0) {
            let w = truth.weights[p] as f64;
            let albedo = self.albedo(p, active);
            for c in 0..3 {
                let value = truth.radiance[p][c] as f64;
                residual_sq += (w * (value - albedo[c])).powi(2);
                btb += (w * value).powi(2);
            }
            rows += 3;
        }

        residual_error(self.residual, residual_sq, btb, rows)
    }

    fn is_guaranteed_monotonic(&self) -> bool {
        false
    }

    fn is_guaranteed_interpolating(&self) -> bool {
        false
    }

    fn reconstruct(
        &self,
        target: usize,
        active: &[usize],
    ) -> Option<Reconstruction> {
        let truth = self.views.get(target)?;
        let recon = (0..truth.len())
            .map(|p| self.albedo(p, active).map(|c| c as f32))
            .collect();

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
        self.all_views = vec![];
        self.active.clear();
    }
}
