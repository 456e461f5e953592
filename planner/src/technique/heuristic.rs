use nalgebra::{Matrix2, Vector2};

use base::defs::Result;

use crate::catalog::ViewCatalog;
use crate::sampler::{AppearanceSampler, SampledView};
use crate::technique::{
    check_capabilities, sample_all, FidelitySettings, FidelityTechnique,
    Reconstruction,
};

/// Weighted covariance of pixel positions in `[-1, 1]²`.
struct Moments {
    sum: f64,
    first: Vector2<f64>,
    second: Matrix2<f64>,
}

impl Moments {
    fn new() -> Self {
        Self {
            sum: 0.0,
            first: Vector2::zeros(),
            second: Matrix2::zeros(),
        }
    }

    fn add(&mut self, position: Vector2<f64>, weight: f64) {
        self.sum += weight;
        self.first += position * weight;
        self.second += position * position.transpose() * weight;
    }

    fn covariance_det(&self) -> f64 {
        if !(self.sum > 0.0) {
            return 0.0;
        }
        let mean = self.first / self.sum;
        (self.second / self.sum - mean * mean.transpose()).determinant()
    }
}

fn pixel_position(view: &SampledView, p: usize) -> Vector2<f64> {
    let (w, h) = (view.width as usize, view.height as usize);
    let (x, y) = ((p % w) as f64, (p / w) as f64);
    Vector2::new(
        2.0 * (x + 0.5) / w as f64 - 1.0,
        2.0 * (y + 0.5) / h as f64 - 1.0,
    )
}

/// Estimates how much of the target's specular peak the basis views miss.
///
/// A peak pixel is one where the target's weighted intensity exceeds every
/// basis view. The error is the unexplained share of peak energy, reduced
/// when the unexplained energy is spread over the view (diffuse rather
/// than a concentrated highlight).
pub struct HeuristicTechnique {
    views: Vec<SampledView>,
    intensities: Vec<Vec<f64>>,
    active: Vec<usize>,
}

impl HeuristicTechnique {
    pub fn new() -> Self {
        Self {
            views: vec![],
            intensities: vec![],
            active: vec![],
        }
    }

    fn explained(&self, p: usize, active: &[usize]) -> f64 {
        active
            .iter()
            .filter_map(|&j| self.intensities.get(j))
            .map(|intensities| intensities[p])
            .fold(0.0, f64::max)
    }
}

impl Default for HeuristicTechnique {
    fn default() -> Self {
        Self::new()
    }
}

impl FidelityTechnique for HeuristicTechnique {
    fn initialize(
        &mut self,
        catalog: &ViewCatalog,
        sampler: &mut dyn AppearanceSampler,
        settings: &FidelitySettings,
        resolution: u32,
    ) -> Result<()> {
        check_capabilities("heuristic", settings, false, sampler)?;
        self.close();

        self.views = sample_all(catalog, sampler, settings, resolution)?;
        self.intensities = self
            .views
            .iter()
            .map(|view| {
                (0..view.len())
                    .map(|p| {
                        view.weights[p] as f64 * view.intensity(p).max(0.0)
                    })
                    .collect()
            })
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
        let (view, intensities) =
            match (self.views.get(target), self.intensities.get(target)) {
                (Some(view), Some(intensities)) => (view, intensities),
                _ => return f64::NAN,
            };

        let total: f64 = intensities.iter().sum();
        if !(total > 0.0) {
            return f64::NAN;
        }
        if active.contains(&target) {
            return 0.0;
        }

        let (mut peak, mut diff) = (0.0, 0.0);
        let (mut peak_moments, mut all_moments) =
            (Moments::new(), Moments::new());

        for (p, &value) in intensities.iter().enumerate() {
            let position = pixel_position(view, p);
            all_moments.add(position, view.weights[p] as f64);

            let explained = self.explained(p, active);
            if value > explained {
                peak += value;
                diff += value - explained;
                peak_moments.add(position, value - explained);
            }
        }

        if peak == 0.0 {
            return 0.0;
        }

        let spread = (peak_moments.covariance_det()
            / all_moments.covariance_det())
        .sqrt();
        let spread = if spread.is_finite() { spread } else { 0.0 };

        (diff / peak - (1.0 - diff / total) * spread).clamp(0.0, 1.0)
    }

    fn is_guaranteed_monotonic(&self) -> bool {
        false
    }

    fn is_guaranteed_interpolating(&self) -> bool {
        true
    }

    fn reconstruct(
        &self,
        target: usize,
        active: &[usize],
    ) -> Option<Reconstruction> {
        let truth = self.views.get(target)?;

        // Brightest basis sample per pixel.
        let recon = (0..truth.len())
            .map(|p| {
                active
                    .iter()
                    .filter_map(|&j| self.views.get(j))
                    .filter(|view| view.weights[p] > 0.0)
                    .map(|view| view.radiance[p])
                    .fold([0.0f32; 3], |best, color| {
                        let sum = |c: [f32; 3]| c[0] + c[1] + c[2];
                        if sum(color) > sum(best) {
                            color
                        } else {
                            best
                        }
                    })
            })
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
        self.intensities = vec![];
        self.active.clear();
    }
}
