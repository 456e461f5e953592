use std::path::Path;

use image::{Rgb, RgbImage};
use log::warn;

use base::defs::{Error, ErrorKind::*, Result};
use base::util::fs;

use crate::technique::Reconstruction;

fn encode(value: f32, gamma: f64) -> u8 {
    let value = (value as f64).max(0.0).powf(1.0 / gamma);
    (value.min(1.0) * 255.0).round() as u8
}

fn to_image(
    recon: &Reconstruction,
    gamma: f64,
    pixel: impl Fn(usize) -> [f32; 3],
) -> RgbImage {
    RgbImage::from_fn(recon.width, recon.height, |x, y| {
        let p = (y * recon.width + x) as usize;
        if recon.weights[p] > 0.0 {
            Rgb(pixel(p).map(|c| encode(c, gamma)))
        } else {
            Rgb([0, 0, 0])
        }
    })
}

fn save(image: &RgbImage, path: &Path) -> Result<()> {
    image.save(path).map_err(|e| {
        let desc = format!("failed to save debug image '{}'", path.display());
        Error::with_source(ImageError, desc, e)
    })
}

fn try_write(
    dir: &Path,
    name: &str,
    recon: &Reconstruction,
    gamma: f64,
) -> Result<()> {
    fs::create_dir(dir)?;

    let truth = to_image(recon, gamma, |p| recon.truth[p]);
    save(&truth, &dir.join(format!("{}_truth.png", name)))?;

    let reconstructed = to_image(recon, gamma, |p| recon.recon[p]);
    save(&reconstructed, &dir.join(format!("{}_recon.png", name)))?;

    let error = to_image(recon, gamma, |p| {
        let [t, r] = [recon.truth[p], recon.recon[p]];
        [0, 1, 2].map(|c| (t[c] - r[c]).abs())
    });
    save(&error, &dir.join(format!("{}_error.png", name)))
}

/// Dumps ground truth, reconstruction and absolute error of a target view.
/// Failures are only logged.
pub fn write_debug_images(
    dir: &Path,
    image_name: &str,
    recon: &Reconstruction,
    gamma: f64,
) {
    let name = Path::new(image_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(image_name);

    if let Err(err) = try_write(dir, name, recon, gamma) {
        warn!("skipping debug images for '{}': {}", image_name, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_reconstruction() -> Reconstruction {
        Reconstruction {
            width: 2,
            height: 1,
            truth: vec![[1.0, 0.25, 0.0], [0.5; 3]],
            recon: vec![[0.75, 0.25, 0.0], [0.5; 3]],
            weights: vec![1.0, 0.0],
        }
    }

    #[test]
    fn test_write_debug_images() {
        let dir = std::env::temp_dir()
            .join(format!("planner-debug-{}", std::process::id()));
        let recon = new_reconstruction();
        write_debug_images(&dir, "images/view_3.png", &recon, 1.0);

        let open =
            |name: &str| image::open(dir.join(name)).unwrap().into_rgb8();
        let truth = open("view_3_truth.png");
        assert_eq!(truth.get_pixel(0, 0), &Rgb([255, 64, 0]));
        assert_eq!(truth.get_pixel(1, 0), &Rgb([0, 0, 0]));

        let error = open("view_3_error.png");
        assert_eq!(error.get_pixel(0, 0), &Rgb([64, 0, 0]));
        assert!(dir.join("view_3_recon.png").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failures_are_swallowed() {
        let file = std::env::temp_dir()
            .join(format!("planner-debug-file-{}", std::process::id()));
        std::fs::write(&file, b"not a directory").unwrap();

        write_debug_images(&file, "view.png", &new_reconstruction(), 2.2);
        assert!(!file.join("view_truth.png").exists());

        std::fs::remove_file(&file).unwrap();
    }
}
