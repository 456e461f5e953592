use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use base::defs::Result;
use base::util::test::MethodMock;
use base::vset::{Light, Projection};

use crate::catalog::{Matrix4, Point3, Vector3, View, ViewCatalog};
use crate::sampler::{AppearanceSampler, SampledView};
use crate::technique::{FidelitySettings, FidelityTechnique};

pub fn new_view(position: [f64; 3], image: &str) -> View {
    let position = Vector3::from(position);
    View {
        pose: Matrix4::new_translation(&-position),
        pose_inverse: Matrix4::new_translation(&position),
        projection: 0,
        light: 0,
        image: image.to_string(),
    }
}

pub fn new_projection() -> Projection {
    Projection::Fov {
        aspect: 1.0,
        fovy: PI / 4.0,
    }
}

pub fn new_light() -> Light {
    Light {
        position: Vector3::zeros(),
        intensity: Vector3::new(1.0, 1.0, 1.0),
    }
}

pub fn new_catalog(positions: &[[f64; 3]]) -> ViewCatalog {
    let views = positions
        .iter()
        .enumerate()
        .map(|(i, &p)| new_view(p, &format!("view_{}.png", i)))
        .collect();
    let projections = vec![new_projection()];
    ViewCatalog::new(views, projections, vec![new_light()], Point3::origin())
        .unwrap()
}

/// Cameras at the given angles (in degrees) on a circle of radius 2 around
/// the origin.
pub fn new_arc_catalog(degrees: &[f64]) -> ViewCatalog {
    let positions: Vec<[f64; 3]> = degrees
        .iter()
        .map(|d| {
            let a = d.to_radians();
            [2.0 * a.cos(), 2.0 * a.sin(), 0.0]
        })
        .collect();
    new_catalog(&positions)
}

/// `n` cameras evenly spread on a circle of radius 2 around the origin.
pub fn new_ring_catalog(n: usize) -> ViewCatalog {
    let positions: Vec<[f64; 3]> = (0..n)
        .map(|k| {
            let a = 2.0 * PI * k as f64 / n as f64;
            [2.0 * a.cos(), 2.0 * a.sin(), 0.0]
        })
        .collect();
    new_catalog(&positions)
}

pub fn new_flat_view(size: u32, color: [f32; 3]) -> SampledView {
    let mut view = SampledView::new(size, size);
    view.radiance = vec![color; view.len()];
    view.weights = vec![1.0; view.len()];
    view
}

pub fn new_random_views(
    count: usize,
    size: u32,
    seed: u64,
) -> Vec<SampledView> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut view = SampledView::new(size, size);
            for p in 0..view.len() {
                view.radiance[p] = [
                    rng.gen_range(0.05..1.0),
                    rng.gen_range(0.05..1.0),
                    rng.gen_range(0.05..1.0),
                ];
                view.weights[p] = rng.gen_range(0.5..1.0);
            }
            view
        })
        .collect()
}

pub struct MockSampler {
    pub sample_view: MethodMock<(usize, u32), Result<SampledView>>,
}

impl MockSampler {
    pub fn new() -> Self {
        Self {
            sample_view: MethodMock::new(),
        }
    }
}

impl AppearanceSampler for MockSampler {
    fn sample_view(
        &mut self,
        _catalog: &ViewCatalog,
        index: usize,
        resolution: u32,
    ) -> Result<SampledView> {
        self.sample_view.call((index, resolution))
    }
}

/// Error grows with the angle to the nearest basis view, reaching 1 at π.
pub struct DistanceTechnique {
    distances: Vec<Vec<f64>>,
    active: Vec<usize>,
    monotonic: bool,
    /// Errors become NaN for bases larger than this.
    pub max_basis: usize,
}

impl DistanceTechnique {
    pub fn new(catalog: &ViewCatalog, monotonic: bool) -> Self {
        Self {
            distances: (0..catalog.len())
                .map(|i| catalog.distances_from(i).to_vec())
                .collect(),
            active: vec![],
            monotonic,
            max_basis: usize::MAX,
        }
    }

    pub fn error_at(&self, distance: f64) -> f64 {
        (1.0 - distance.min(PI).cos()) / 2.0
    }
}

impl FidelityTechnique for DistanceTechnique {
    fn initialize(
        &mut self,
        _catalog: &ViewCatalog,
        _sampler: &mut dyn AppearanceSampler,
        _settings: &FidelitySettings,
        _resolution: u32,
    ) -> Result<()> {
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
        if active.len() > self.max_basis {
            return f64::NAN;
        }
        let nearest = active
            .iter()
            .map(|&j| self.distances[target][j])
            .fold(PI, f64::min);
        self.error_at(nearest)
    }

    fn is_guaranteed_monotonic(&self) -> bool {
        self.monotonic
    }

    fn is_guaranteed_interpolating(&self) -> bool {
        true
    }

    fn close(&mut self) {
        self.active.clear();
    }
}
