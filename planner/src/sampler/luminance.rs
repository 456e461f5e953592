use base::vset::{TonemapSample, ViewSet};

use crate::curve::MonotoneSpline;

const LUMINANCE_WEIGHTS: [f64; 3] = [0.2126, 0.7152, 0.0722];

pub fn luminance(rgb: [f64; 3]) -> f64 {
    rgb.iter().zip(LUMINANCE_WEIGHTS).map(|(c, w)| c * w).sum()
}

/// Maps encoded (tonemapped) 8-bit values to linear radiance, using gamma
/// alone or the calibration samples when there are any.
#[derive(Clone, Debug)]
pub struct LuminanceEncoding {
    gamma: f64,
    decode_curve: Option<MonotoneSpline>,
}

impl LuminanceEncoding {
    pub fn new(gamma: f64, samples: &[TonemapSample]) -> Self {
        let decode_curve = if samples.is_empty() {
            None
        } else {
            let mut points = vec![(0.0, 0.0)];
            points.extend(
                samples
                    .iter()
                    .map(|s| (s.encoded, s.linear.max(0.0).powf(1.0 / gamma))),
            );

            // Extrapolates linearly in gamma-corrected space.
            let last = samples
                .iter()
                .max_by(|a, b| a.encoded.total_cmp(&b.encoded))
                .map(|s| (s.encoded, s.linear.max(0.0).powf(1.0 / gamma)));
            if let Some((encoded, corrected)) = last {
                if encoded > 0.0 && encoded < 255.0 {
                    points.push((255.0, corrected * 255.0 / encoded));
                }
            }

            MonotoneSpline::new(&points)
        };

        Self {
            gamma,
            decode_curve,
        }
    }

    pub fn from_view_set(view_set: &ViewSet) -> Self {
        Self::new(view_set.gamma, &view_set.tonemap)
    }

    pub fn decode(&self, encoded: f64) -> f64 {
        match &self.decode_curve {
            Some(curve) => curve.evaluate(encoded).max(0.0).powf(self.gamma),
            None => (encoded / 255.0).max(0.0).powf(self.gamma),
        }
    }

    pub fn decode_color(&self, rgb: [u8; 3]) -> [f32; 3] {
        let linear = rgb.map(|c| (c as f64 / 255.0).powf(self.gamma));
        if self.decode_curve.is_none() {
            return linear.map(|c| c as f32);
        }

        let y = luminance(linear);
        if !(y > 0.0) {
            return [0.0; 3];
        }
        let scale = self.decode(255.0 * y.powf(1.0 / self.gamma)) / y;
        linear.map(|c| (c * scale) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base::assert_eq_f64;

    #[test]
    fn test_gamma_only_decoding() {
        let encoding = LuminanceEncoding::new(2.2, &[]);
        assert_eq_f64!(encoding.decode(0.0), 0.0);
        assert_eq_f64!(encoding.decode(255.0), 1.0);
        assert_eq_f64!(encoding.decode(128.0), (128.0f64 / 255.0).powf(2.2));

        let color = encoding.decode_color([255, 0, 51]);
        assert_eq!(color[0], 1.0);
        assert_eq!(color[1], 0.0);
        assert_eq_f64!(color[2] as f64, 0.2f64.powf(2.2), 1e-6);
    }

    #[test]
    fn test_calibrated_decoding() {
        let samples = [
            TonemapSample {
                linear: 0.031,
                encoded: 20.0,
            },
            TonemapSample {
                linear: 0.09,
                encoded: 80.0,
            },
            TonemapSample {
                linear: 0.36,
                encoded: 160.0,
            },
        ];
        let encoding = LuminanceEncoding::new(2.2, &samples);

        for sample in &samples {
            assert_eq_f64!(encoding.decode(sample.encoded), sample.linear);
        }

        let mut previous = encoding.decode(0.0);
        for v in 1..=255 {
            let value = encoding.decode(v as f64);
            assert!(value >= previous);
            previous = value;
        }

        // Gray stays gray and lands on the calibrated luminance.
        let color = encoding.decode_color([80, 80, 80]);
        assert_eq_f64!(color[0] as f64, 0.09, 1e-5);
        assert_eq_f64!(color[1] as f64, color[2] as f64, 1e-7);
    }
}
