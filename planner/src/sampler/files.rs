use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};

use base::defs::{Error, ErrorKind::*, Result};

use crate::catalog::ViewCatalog;
use crate::sampler::{
    luminance, AppearanceSampler, LuminanceEncoding, SampledView,
};

fn load_image(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).map_err(|e| {
        let desc = format!("failed to load image '{}'", path.display());
        Error::with_source(ImageError, desc, e)
    })
}

/// Loads a grayscale mask resampled to `resolution`, white meaning fully
/// included.
pub fn load_mask<P: AsRef<Path>>(path: P, resolution: u32) -> Result<Vec<f32>> {
    let mask = load_image(path.as_ref())?.into_luma8();
    let mask =
        imageops::resize(&mask, resolution, resolution, FilterType::Triangle);
    Ok(mask.pixels().map(|p| p[0] as f32 / 255.0).collect())
}

/// Samples views from image files that already share one parameterization
/// (e.g. texture space). The alpha channel is the confidence weight.
pub struct ImageSampler {
    dir: PathBuf,
    encoding: LuminanceEncoding,
    perceptual: bool,
    light_compensation: bool,
}

impl ImageSampler {
    pub fn new(dir: PathBuf, encoding: LuminanceEncoding) -> Self {
        Self {
            dir,
            encoding,
            perceptual: false,
            light_compensation: false,
        }
    }

    /// Keeps encoded values instead of decoding them to linear radiance.
    pub fn perceptual(mut self, perceptual: bool) -> Self {
        self.perceptual = perceptual;
        self
    }

    /// Normalizes radiance by light intensity and squared light distance.
    pub fn light_compensation(mut self, enabled: bool) -> Self {
        self.light_compensation = enabled;
        self
    }

    fn light_scale(&self, catalog: &ViewCatalog, index: usize) -> f64 {
        if !self.light_compensation {
            return 1.0;
        }

        let light = catalog.light(index);
        let (i, view) = (&light.intensity, catalog.view(index));
        let intensity = luminance([i.x, i.y, i.z]);
        let centroid = view.pose.transform_point(catalog.centroid());
        let distance = (centroid.coords - light.position).norm();

        let scale = distance * distance / intensity;
        if scale > 0.0 && scale.is_finite() {
            scale
        } else {
            1.0
        }
    }
}

impl AppearanceSampler for ImageSampler {
    fn sample_view(
        &mut self,
        catalog: &ViewCatalog,
        index: usize,
        resolution: u32,
    ) -> Result<SampledView> {
        let path = self.dir.join(&catalog.view(index).image);
        let image = load_image(&path)?.into_rgba8();
        let filter = FilterType::Triangle;
        let image = imageops::resize(&image, resolution, resolution, filter);

        let scale = self.light_scale(catalog, index) as f32;
        let mut view = SampledView::new(resolution, resolution);

        for (x, y, pixel) in image.enumerate_pixels() {
            let p = (y * resolution + x) as usize;
            let [r, g, b, a] = pixel.0;
            let color = if self.perceptual {
                [r, g, b].map(|c| c as f32 / 255.0)
            } else {
                self.encoding.decode_color([r, g, b])
            };
            view.radiance[p] = color.map(|c| c * scale);
            view.weights[p] = a as f32 / 255.0;
        }

        Ok(view)
    }
}
