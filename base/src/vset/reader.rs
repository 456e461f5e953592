use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;

use nalgebra::{Quaternion, UnitQuaternion};

use crate::defs::{Error, ErrorKind::*, IntoResult, Result};
use crate::vset::data::*;

struct Tokens<'a> {
    rest: &'a str,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str, line: usize) -> Self {
        Self { rest: text, line }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let s = self.rest.trim_start();
        if s.is_empty() {
            return None;
        }
        let end = s.find(char::is_whitespace).unwrap_or(s.len());
        let (token, rest) = s.split_at(end);
        self.rest = rest;
        Some(token)
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let line = self.line;
        let token = self.next_token().ok_or_else(|| {
            let desc = format!("missing {} at .vset line {}", what, line);
            Error::new(MalformedData, desc)
        })?;
        token.parse::<T>().map_err(|_| {
            let desc = format!(
                "malformed {} '{}' at .vset line {}",
                what, token, line
            );
            Error::new(MalformedData, desc)
        })
    }

    fn skip(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.next::<f64>("value")?;
        }
        Ok(())
    }

    fn vector3(&mut self, what: &str) -> Result<Vector3> {
        Ok(Vector3::new(
            self.next(what)?,
            self.next(what)?,
            self.next(what)?,
        ))
    }

    fn remainder(&mut self, what: &str) -> Result<String> {
        let rest = self.rest.trim();
        if rest.is_empty() {
            let desc = format!("missing {} at .vset line {}", what, self.line);
            return Err(Error::new(MalformedData, desc));
        }
        self.rest = "";
        Ok(rest.to_string())
    }
}

struct ViewRef {
    pose: usize,
    projection: usize,
    light: usize,
    image_file: String,
    line: usize,
}

fn read_quaternion_pose(tokens: &mut Tokens) -> Result<(Matrix4, Matrix4)> {
    let translation = tokens.vector3("pose translation")?;
    let (i, j, k, w): (f64, f64, f64, f64) = (
        tokens.next("quaternion")?,
        tokens.next("quaternion")?,
        tokens.next("quaternion")?,
        tokens.next("quaternion")?,
    );

    let quat = Quaternion::new(w, i, j, k);
    if !(quat.norm() > f64::EPSILON) {
        let desc =
            format!("degenerate quaternion at .vset line {}", tokens.line);
        return Err(Error::new(MalformedData, desc));
    }

    let orientation = UnitQuaternion::from_quaternion(quat).to_homogeneous();
    let pose = orientation * Matrix4::new_translation(&-translation);
    let inverse =
        Matrix4::new_translation(&translation) * orientation.transpose();
    Ok((pose, inverse))
}

fn read_matrix_pose(tokens: &mut Tokens) -> Result<(Matrix4, Matrix4)> {
    let mut values = [0.0; 16];
    for value in values.iter_mut() {
        *value = tokens.next("pose matrix entry")?;
    }

    let pose = Matrix4::from_row_slice(&values);
    let line = tokens.line;
    let inverse = pose.try_inverse().ok_or_else(|| {
        let desc = format!("singular pose matrix at .vset line {}", line);
        Error::new(MalformedData, desc)
    })?;
    Ok((pose, inverse))
}

/// Reads a view set in the line-based .vset text format.
pub fn read_view_set<R: Read>(reader: R) -> Result<ViewSet> {
    let mut view_set = ViewSet::default();
    let mut poses = Vec::new();
    let mut view_refs = Vec::new();

    for (n, line) in BufReader::new(reader).lines().enumerate() {
        let line_no = n + 1;
        let line =
            line.res(|| format!("failed to read .vset line {}", line_no))?;
        let mut tokens = Tokens::new(&line, line_no);

        let code = match tokens.next_token() {
            Some(code) => code,
            None => continue,
        };

        match code {
            "c" => {
                view_set.near_plane = tokens.next("near plane")?;
                view_set.far_plane = tokens.next("far plane")?;
            }
            "m" => view_set.geometry_file = Some(tokens.remainder("geometry")?),
            "i" => view_set.image_path = Some(tokens.remainder("image path")?),
            "I" => {
                view_set.full_res_image_path =
                    Some(tokens.remainder("image path")?)
            }
            "p" => poses.push(read_quaternion_pose(&mut tokens)?),
            "P" => poses.push(read_matrix_pose(&mut tokens)?),
            "d" | "D" => {
                tokens.skip(2)?;
                let aspect = tokens.next("aspect")?;
                let focal_length = tokens.next("focal length")?;

                let projection = if code == "D" {
                    Projection::Distortion {
                        aspect,
                        focal_length,
                        sensor_width: tokens.next("sensor width")?,
                        k1: tokens.next("distortion")?,
                        k2: tokens.next("distortion")?,
                        k3: tokens.next("distortion")?,
                    }
                } else {
                    Projection::Distortion {
                        aspect,
                        focal_length,
                        sensor_width: DEFAULT_SENSOR_WIDTH,
                        k1: tokens.next("distortion")?,
                        k2: 0.0,
                        k3: 0.0,
                    }
                };
                view_set.projections.push(projection);
            }
            "f" => {
                tokens.skip(2)?;
                let aspect = tokens.next("aspect")?;
                let fovy: f64 = tokens.next("field of view")?;
                view_set.projections.push(Projection::Fov {
                    aspect,
                    fovy: fovy.to_radians(),
                });
            }
            "e" => view_set.tonemap.push(TonemapSample {
                linear: tokens.next("linear luminance")?,
                encoded: tokens.next("encoded luminance")?,
            }),
            "g" => view_set.gamma = tokens.next("gamma")?,
            "l" => view_set.lights.push(Light {
                position: tokens.vector3("light position")?,
                intensity: tokens.vector3("light intensity")?,
            }),
            "v" => view_refs.push(ViewRef {
                pose: tokens.next("pose index")?,
                projection: tokens.next("projection index")?,
                light: tokens.next("light index")?,
                image_file: tokens.remainder("image file")?,
                line: line_no,
            }),
            _ => continue,
        }
    }

    // Views may reference unlit lights past the declared ones, at most one
    // new light per view.
    let light_limit = view_set.lights.len() + view_refs.len();
    if let Some(view_ref) =
        view_refs.iter().find(|v| v.light >= light_limit)
    {
        let desc = format!(
            "light index {} is out of range at .vset line {}",
            view_ref.light, view_ref.line
        );
        return Err(Error::new(MalformedData, desc));
    }

    if let Some(max_light) = view_refs.iter().map(|v| v.light).max() {
        while view_set.lights.len() <= max_light {
            view_set.lights.push(Light::unlit());
        }
    }

    for view_ref in view_refs {
        let (pose, pose_inverse) =
            poses.get(view_ref.pose).cloned().ok_or_else(|| {
                let desc = format!(
                    "pose index {} is out of range at .vset line {}",
                    view_ref.pose, view_ref.line
                );
                Error::new(MalformedData, desc)
            })?;

        if view_ref.projection >= view_set.projections.len() {
            let desc = format!(
                "projection index {} is out of range at .vset line {}",
                view_ref.projection, view_ref.line
            );
            return Err(Error::new(MalformedData, desc));
        }

        view_set.views.push(ViewRecord {
            pose,
            pose_inverse,
            projection: view_ref.projection,
            light: view_ref.light,
            image_file: view_ref.image_file,
        });
    }

    Ok(view_set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_eq_f64;

    const SAMPLE_VSET: &str = "\
# Created by hand
c 0.1 20
m cup.obj
i images/preview
I images/full
f 0 0 1.5 45
D 0 0 1.25 35 36 0.01 0.02 0.03
d 0 0 1 50 -0.05
e 0.031 20
e 0.5 186
g 2.4
l 0 0 0 1 1 1
z ignored record
p 0 0 5 0 0 0 1
P 1 0 0 0 0 1 0 0 0 0 1 -3 0 0 0 1
v 1 0 0 front.png
v 0 2 2 side view.png
";

    #[test]
    fn test_read_view_set_sanity() {
        let view_set = read_view_set(SAMPLE_VSET.as_bytes()).unwrap();

        assert_eq_f64!(view_set.near_plane, 0.1);
        assert_eq_f64!(view_set.far_plane, 20.0);
        assert_eq!(view_set.geometry_file.as_deref(), Some("cup.obj"));
        assert_eq!(view_set.image_path.as_deref(), Some("images/preview"));
        let full_res = view_set.full_res_image_path.as_deref();
        assert_eq!(full_res, Some("images/full"));
        assert_eq_f64!(view_set.gamma, 2.4);
        assert_eq!(view_set.tonemap.len(), 2);
        assert_eq_f64!(view_set.tonemap[1].encoded, 186.0);

        assert_eq!(view_set.projections.len(), 3);
        assert_eq!(
            view_set.projections[0],
            Projection::Fov {
                aspect: 1.5,
                fovy: 45f64.to_radians()
            }
        );
        assert_eq!(
            view_set.projections[2],
            Projection::Distortion {
                aspect: 1.0,
                focal_length: 50.0,
                sensor_width: DEFAULT_SENSOR_WIDTH,
                k1: -0.05,
                k2: 0.0,
                k3: 0.0,
            }
        );

        // Padded up to the highest referenced light.
        assert_eq!(view_set.lights.len(), 3);
        assert_eq!(view_set.lights[2], Light::unlit());

        assert_eq!(view_set.views.len(), 2);
        assert_eq!(view_set.views[0].image_file, "front.png");
        assert_eq!(view_set.views[1].image_file, "side view.png");
        assert_eq!(view_set.views[1].projection, 2);

        let camera = view_set.views[1].pose_inverse.column(3);
        assert_eq_f64!(camera[2], 5.0);
        let camera = view_set.views[0].pose_inverse.column(3);
        assert_eq_f64!(camera[2], 3.0);
    }

    #[test]
    fn test_quaternion_pose_is_rigid() {
        let text = "p 1 2 3 0.2 0.3 0.1 0.9\n";
        let mut tokens = Tokens::new(&text[1..], 1);
        let (pose, inverse) = read_quaternion_pose(&mut tokens).unwrap();

        let identity = pose * inverse;
        for r in 0..4 {
            for c in 0..4 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert_eq_f64!(identity[(r, c)], expected, 1e-12);
            }
        }

        let camera = inverse.column(3);
        assert_eq_f64!(camera[0], 1.0, 1e-12);
        assert_eq_f64!(camera[1], 2.0, 1e-12);
        assert_eq_f64!(camera[2], 3.0, 1e-12);
    }

    #[test]
    fn test_read_view_set_errors() {
        let err = read_view_set("f 0 0 1 45\nv 3 0 0 a.png\n".as_bytes())
            .unwrap_err();
        assert_eq!(err.kind, MalformedData);

        let err = read_view_set("p 0 0 0 0 0 0 1\nv 0 0 0 a.png\n".as_bytes())
            .unwrap_err();
        assert_eq!(err.kind, MalformedData);

        let err = read_view_set("c 0.1 far\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind, MalformedData);
        assert_eq!(
            err.description,
            "malformed far plane 'far' at .vset line 1"
        );

        let line = "P 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0\n";
        let err = read_view_set(line.as_bytes()).unwrap_err();
        assert_eq!(err.kind, MalformedData);

        let err = read_view_set("p 0 0 0 0 0 0 0\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind, MalformedData);
    }

    #[test]
    fn test_light_index_far_past_declared_lights() {
        let vset = "f 0 0 1 45\np 0 0 5 0 0 0 1\nv 0 0 4000000000 a.png\n";
        let err = read_view_set(vset.as_bytes()).unwrap_err();
        assert_eq!(err.kind, MalformedData);
        assert_eq!(
            err.description,
            "light index 4000000000 is out of range at .vset line 3"
        );

        let vset = "f 0 0 1 45\np 0 0 5 0 0 0 1\nv 0 0 1 a.png\n";
        let err = read_view_set(vset.as_bytes()).unwrap_err();
        assert_eq!(err.kind, MalformedData);

        let vset = "l 0 0 0 1 1 1\nf 0 0 1 45\np 0 0 5 0 0 0 1\n\
            v 0 0 1 a.png\n";
        let view_set = read_view_set(vset.as_bytes()).unwrap();
        assert_eq!(view_set.lights.len(), 2);
    }
}
