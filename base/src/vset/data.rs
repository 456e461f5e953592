use crate::defs::{Error, ErrorKind::*, Result};

pub type Matrix4 = nalgebra::Matrix4<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;

pub const DEFAULT_GAMMA: f64 = 2.2;
pub const DEFAULT_SENSOR_WIDTH: f64 = 32.0;
pub const DEFAULT_NEAR_PLANE: f64 = 0.01;
pub const DEFAULT_FAR_PLANE: f64 = 100.0;

#[derive(Clone, Debug, PartialEq)]
pub enum Projection {
    /// Vertical field of view in radians.
    Fov { aspect: f64, fovy: f64 },
    Distortion {
        aspect: f64,
        focal_length: f64,
        sensor_width: f64,
        k1: f64,
        k2: f64,
        k3: f64,
    },
}

impl Projection {
    pub fn aspect(&self) -> f64 {
        match self {
            Projection::Fov { aspect, .. }
            | Projection::Distortion { aspect, .. } => *aspect,
        }
    }

    pub fn vertical_fov(&self) -> f64 {
        match self {
            Projection::Fov { fovy, .. } => *fovy,
            Projection::Distortion {
                aspect,
                focal_length,
                sensor_width,
                ..
            } => {
                let sensor_height = sensor_width / aspect;
                2.0 * (sensor_height / (2.0 * focal_length)).atan()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    /// Position in camera space.
    pub position: Vector3,
    pub intensity: Vector3,
}

impl Light {
    pub fn unlit() -> Self {
        Self {
            position: Vector3::zeros(),
            intensity: Vector3::zeros(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TonemapSample {
    pub linear: f64,
    pub encoded: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewRecord {
    pub pose: Matrix4,
    pub pose_inverse: Matrix4,
    pub projection: usize,
    pub light: usize,
    pub image_file: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewSet {
    pub near_plane: f64,
    pub far_plane: f64,
    pub geometry_file: Option<String>,
    pub image_path: Option<String>,
    pub full_res_image_path: Option<String>,
    pub gamma: f64,
    pub tonemap: Vec<TonemapSample>,
    pub projections: Vec<Projection>,
    pub lights: Vec<Light>,
    pub views: Vec<ViewRecord>,
}

impl Default for ViewSet {
    fn default() -> Self {
        Self {
            near_plane: DEFAULT_NEAR_PLANE,
            far_plane: DEFAULT_FAR_PLANE,
            geometry_file: None,
            image_path: None,
            full_res_image_path: None,
            gamma: DEFAULT_GAMMA,
            tonemap: vec![],
            projections: vec![],
            lights: vec![],
            views: vec![],
        }
    }
}

impl ViewSet {
    /// Keeps only the given views (in the given order). Projections and
    /// lights are shared, so they are carried over untouched.
    pub fn subset(&self, indices: &[usize]) -> Result<ViewSet> {
        let mut views = Vec::with_capacity(indices.len());
        for &i in indices {
            let view = self.views.get(i).ok_or_else(|| {
                let desc = format!(
                    "view index {} is out of range ({} views)",
                    i,
                    self.views.len()
                );
                Error::new(MalformedData, desc)
            })?;
            views.push(view.clone());
        }

        Ok(ViewSet {
            views,
            ..self.clone()
        })
    }
}
