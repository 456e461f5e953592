mod files;
mod luminance;

use base::defs::{Error, ErrorKind::*, Result};

use crate::catalog::ViewCatalog;
pub use crate::sampler::{files::*, luminance::*};

/// Per-pixel linear radiance and confidence weight of one view, resampled to
/// a square working resolution. Row-major, top row first. A zero weight
/// masks the pixel out.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledView {
    pub width: u32,
    pub height: u32,
    pub radiance: Vec<[f32; 3]>,
    pub weights: Vec<f32>,
}

impl SampledView {
    pub fn new(width: u32, height: u32) -> Self {
        let size = (width * height) as usize;
        Self {
            width,
            height,
            radiance: vec![[0.0; 3]; size],
            weights: vec![0.0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn intensity(&self, p: usize) -> f64 {
        let [r, g, b] = self.radiance[p];
        luminance([r as f64, g as f64, b as f64])
    }

    pub fn apply_mask(&mut self, mask: &[f32]) -> Result<()> {
        if mask.len() != self.weights.len() {
            let desc = format!(
                "mask has {} pixels while views have {}",
                mask.len(),
                self.weights.len()
            );
            return Err(Error::new(MalformedData, desc));
        }
        for (weight, m) in self.weights.iter_mut().zip(mask) {
            *weight *= m.clamp(0.0, 1.0);
        }
        Ok(())
    }
}

/// Produces the per-view sampled appearance consumed by fidelity techniques.
pub trait AppearanceSampler {
    fn sample_view(
        &mut self,
        catalog: &ViewCatalog,
        index: usize,
        resolution: u32,
    ) -> Result<SampledView>;

    /// Whether weights already exclude pixels occluded from the view.
    fn supports_occlusion(&self) -> bool {
        false
    }
}

/// Serves views that were sampled elsewhere.
pub struct MemorySampler {
    views: Vec<SampledView>,
    occlusion: bool,
}

impl MemorySampler {
    pub fn new(views: Vec<SampledView>) -> Self {
        Self {
            views,
            occlusion: false,
        }
    }

    pub fn with_occlusion(mut self, occlusion: bool) -> Self {
        self.occlusion = occlusion;
        self
    }
}

impl AppearanceSampler for MemorySampler {
    fn sample_view(
        &mut self,
        _catalog: &ViewCatalog,
        index: usize,
        resolution: u32,
    ) -> Result<SampledView> {
        let view = self.views.get(index).ok_or_else(|| {
            let desc = format!("no sampled appearance for view {}", index);
            Error::new(MalformedData, desc)
        })?;

        if view.width != resolution || view.height != resolution {
            let desc = format!(
                "view {} is sampled at {}x{} instead of {}x{}",
                index, view.width, view.height, resolution, resolution
            );
            return Err(Error::new(MalformedData, desc));
        }

        Ok(view.clone())
    }

    fn supports_occlusion(&self) -> bool {
        self.occlusion
    }
}
