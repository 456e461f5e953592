use std::f64::consts::FRAC_PI_2;
use std::path::PathBuf;

use structopt::StructOpt;

use base::defs::Result;
use base::util::cli::{Array, VsetInput};
use base::vset::ViewSet;

use crate::catalog::{Point3, ViewCatalog};
use crate::curve::{CurveParams, QuadraticFitParams};
use crate::sampler::{load_mask, ImageSampler, LuminanceEncoding};
use crate::technique::{
    FidelitySettings, FidelityTechnique, ResidualNorm, TechniqueKind,
};

#[derive(StructOpt)]
pub struct SessionParams {
    #[structopt(flatten)]
    pub input: VsetInput,

    #[structopt(
        help = "Directory with view images (view set image path if omitted)",
        long
    )]
    pub images_dir: Option<PathBuf>,

    #[structopt(
        help = "Working resolution views are resampled to",
        long,
        default_value = "128"
    )]
    pub resolution: u32,

    #[structopt(
        help = "Fidelity technique (linear, heuristic or material-fit)",
        long,
        default_value = "linear"
    )]
    pub technique: TechniqueKind,

    #[structopt(
        help = "Residual norm (relative or rms)",
        long,
        default_value = "relative"
    )]
    pub residual: ResidualNorm,

    #[structopt(
        help = "Scene centroid view directions are measured from",
        long,
        default_value = "0,0,0"
    )]
    pub centroid: Array<f64, 3>,

    #[structopt(help = "Grayscale mask image applied to every view", long)]
    pub mask: Option<PathBuf>,

    #[structopt(help = "Exclude pixels occluded from each view", long)]
    pub occlusion: bool,

    #[structopt(
        help = "Normalize radiance by light intensity and distance",
        long
    )]
    pub light_compensation: bool,

    #[structopt(help = "Compare encoded instead of linear values", long)]
    pub perceptual: bool,
}

#[derive(StructOpt)]
pub struct CurveOptions {
    #[structopt(
        help = "Nearest-view distance (radians) that ends curve sampling",
        long,
        default_value = "1.5707963267948966"
    )]
    pub max_curve_distance: f64,

    #[structopt(
        help = "Iteration bound of quadratic curve fits",
        long,
        default_value = "64"
    )]
    pub max_fit_iterations: usize,
}

impl CurveOptions {
    pub fn params(&self) -> CurveParams {
        let max_distance = if self.max_curve_distance > 0.0 {
            self.max_curve_distance
        } else {
            FRAC_PI_2
        };
        CurveParams {
            max_distance,
            fit: QuadraticFitParams {
                max_iterations: self.max_fit_iterations.max(1),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// A loaded view set with its catalog and an initialized technique.
pub struct Session {
    pub view_set: ViewSet,
    pub catalog: ViewCatalog,
    pub technique: Box<dyn FidelityTechnique>,
}

impl Session {
    pub fn open(params: &SessionParams) -> Result<Self> {
        let view_set = params.input.read()?;
        let centroid = Point3::from(params.centroid.0);
        let catalog = ViewCatalog::from_view_set(&view_set, centroid)?;

        let images_dir = params.images_dir.clone().unwrap_or_else(|| {
            let base_dir = params.input.base_dir();
            match &view_set.image_path {
                Some(path) => base_dir.join(path),
                None => base_dir,
            }
        });

        let mut sampler = ImageSampler::new(
            images_dir,
            LuminanceEncoding::from_view_set(&view_set),
        )
        .perceptual(params.perceptual)
        .light_compensation(params.light_compensation);

        let mask = match &params.mask {
            Some(path) => Some(load_mask(path, params.resolution)?),
            None => None,
        };
        let settings = FidelitySettings {
            residual: params.residual,
            mask,
            occlusion: params.occlusion,
            ..Default::default()
        };

        let mut technique = params.technique.create();
        technique.initialize(
            &catalog,
            &mut sampler,
            &settings,
            params.resolution,
        )?;

        Ok(Self {
            view_set,
            catalog,
            technique,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_options() {
        let options = CurveOptions::from_iter(&[
            "test",
            "--max-curve-distance",
            "1.0",
            "--max-fit-iterations",
            "0",
        ]);
        let params = options.params();
        assert_eq!(params.max_distance, 1.0);
        assert_eq!(params.fit.max_iterations, 1);
        let stable_samples = CurveParams::default().stable_samples;
        assert_eq!(params.stable_samples, stable_samples);

        let params = CurveOptions::from_iter(&["test"]).params();
        assert_eq!(params.max_distance, FRAC_PI_2);
        assert_eq!(params.fit.max_iterations, 64);
    }
}
