mod heuristic;
mod linear_system;
mod material_fit;

use std::str::FromStr;

use log::info;

use base::defs::{Error, ErrorKind::*, Result};

use crate::catalog::ViewCatalog;
use crate::sampler::{AppearanceSampler, SampledView};
use crate::solver::DEFAULT_NNLS_TOLERANCE;
pub use crate::technique::{heuristic::*, linear_system::*, material_fit::*};

/// How squared residuals turn into a scalar error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResidualNorm {
    /// `‖Ax - b‖ / ‖b‖`
    Relative,
    /// Root mean squared residual over every weighted pixel channel.
    Rms,
}

impl FromStr for ResidualNorm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relative" => Ok(ResidualNorm::Relative),
            "rms" => Ok(ResidualNorm::Rms),
            _ => {
                let desc = format!("unknown residual norm '{}'", s);
                Err(Error::new(MalformedData, desc))
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct FidelitySettings {
    pub residual: ResidualNorm,
    /// Multiplied into the weights of every sampled view.
    pub mask: Option<Vec<f32>>,
    pub occlusion: bool,
    pub nnls_tolerance: f64,
}

impl Default for FidelitySettings {
    fn default() -> Self {
        Self {
            residual: ResidualNorm::Relative,
            mask: None,
            occlusion: false,
            nnls_tolerance: DEFAULT_NNLS_TOLERANCE,
        }
    }
}

/// Per-pixel ground truth and reconstruction of a target view.
#[derive(Clone, Debug)]
pub struct Reconstruction {
    pub width: u32,
    pub height: u32,
    pub truth: Vec<[f32; 3]>,
    pub recon: Vec<[f32; 3]>,
    pub weights: Vec<f32>,
}

/// Scores how well a set of basis views reconstructs a target view.
///
/// Evaluations return `f64` errors where a non-finite value marks a
/// degenerate problem (nothing to reconstruct, singular system). Errors are
/// pure functions of the sampled data and the given basis, so concurrent
/// evaluations of different hypotheses are safe.
pub trait FidelityTechnique: Send + Sync {
    fn initialize(
        &mut self,
        catalog: &ViewCatalog,
        sampler: &mut dyn AppearanceSampler,
        settings: &FidelitySettings,
        resolution: u32,
    ) -> Result<()>;

    fn set_active_views(&mut self, views: &[usize]);

    fn active_views(&self) -> &[usize];

    /// Error of the technique's own predictor, independent of any basis.
    fn evaluate_baseline_error(&self, target: usize) -> f64;

    fn evaluate_error(&self, target: usize) -> f64 {
        self.evaluate_error_with(target, self.active_views())
    }

    fn evaluate_error_with(&self, target: usize, active: &[usize]) -> f64;

    /// Adding a basis view never increases any error.
    fn is_guaranteed_monotonic(&self) -> bool;

    /// The error drops to zero once the target itself is a basis view.
    fn is_guaranteed_interpolating(&self) -> bool;

    fn reconstruct(
        &self,
        _target: usize,
        _active: &[usize],
    ) -> Option<Reconstruction> {
        None
    }

    /// Releases sampled views and caches.
    fn close(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TechniqueKind {
    LinearSystem,
    Heuristic,
    MaterialFit,
}

impl TechniqueKind {
    pub fn create(self) -> Box<dyn FidelityTechnique> {
        match self {
            TechniqueKind::LinearSystem => {
                Box::new(LinearSystemTechnique::new())
            }
            TechniqueKind::Heuristic => Box::new(HeuristicTechnique::new()),
            TechniqueKind::MaterialFit => Box::new(MaterialFitTechnique::new()),
        }
    }
}

impl FromStr for TechniqueKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(TechniqueKind::LinearSystem),
            "heuristic" => Ok(TechniqueKind::Heuristic),
            "material-fit" => Ok(TechniqueKind::MaterialFit),
            _ => {
                let desc = format!("unknown fidelity technique '{}'", s);
                Err(Error::new(MalformedData, desc))
            }
        }
    }
}

pub(crate) fn check_capabilities(
    technique: &str,
    settings: &FidelitySettings,
    supports_mask: bool,
    sampler: &dyn AppearanceSampler,
) -> Result<()> {
    if settings.mask.is_some() && !supports_mask {
        let desc = format!("{} technique doesn't support masks", technique);
        return Err(Error::new(UnsupportedFormat, desc));
    }
    if settings.occlusion && !sampler.supports_occlusion() {
        let desc = "sampler can't test occlusion".to_string();
        return Err(Error::new(UnsupportedFormat, desc));
    }
    Ok(())
}

/// Samples every catalog view at `resolution` and applies the mask.
pub(crate) fn sample_all(
    catalog: &ViewCatalog,
    sampler: &mut dyn AppearanceSampler,
    settings: &FidelitySettings,
    resolution: u32,
) -> Result<Vec<SampledView>> {
    info!(
        "  sampling {} views at {}x{}...",
        catalog.len(),
        resolution,
        resolution
    );

    let size = (resolution * resolution) as usize;
    let mut views = Vec::with_capacity(catalog.len());

    for i in 0..catalog.len() {
        let mut view = sampler.sample_view(catalog, i, resolution)?;
        if view.len() != size {
            let desc = format!(
                "view '{}' has {} samples instead of {}",
                catalog.view(i).image,
                view.len(),
                size
            );
            return Err(Error::new(MalformedData, desc));
        }
        if let Some(mask) = &settings.mask {
            view.apply_mask(mask)?;
        }
        views.push(view);
    }

    Ok(views)
}

/// Converts a squared residual over `rows` weighted pixel channels into an
/// error. NaN when there is nothing to reconstruct.
pub(crate) fn residual_error(
    norm: ResidualNorm,
    residual_sq: f64,
    btb: f64,
    rows: usize,
) -> f64 {
    if rows == 0 || !(btb > 0.0) || !residual_sq.is_finite() {
        return f64::NAN;
    }

    let residual_sq = residual_sq.max(0.0);
    match norm {
        ResidualNorm::Relative => (residual_sq / btb).sqrt(),
        ResidualNorm::Rms => (residual_sq / rows as f64).sqrt(),
    }
}
