use indexmap::IndexMap;
use kiddo::distance::squared_euclidean;
use kiddo::KdTree;

use base::defs::{Error, ErrorKind::*, Result};
use base::vset::{Light, Projection, ViewSet};

pub type Vector3 = nalgebra::Vector3<f64>;
pub type Point3 = nalgebra::Point3<f64>;
pub type Matrix4 = nalgebra::Matrix4<f64>;

/// Largest entry-wise deviation of `pose * pose_inverse` from identity.
pub const POSE_TOLERANCE: f64 = 2e-3;

#[derive(Clone, Debug)]
pub struct View {
    pub pose: Matrix4,
    pub pose_inverse: Matrix4,
    pub projection: usize,
    pub light: usize,
    pub image: String,
}

impl View {
    pub fn camera_position(&self) -> Point3 {
        let m = &self.pose_inverse;
        Point3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
    }
}

pub fn angle_between(a: &Vector3, b: &Vector3) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

/// Calibrated views with cached directions (from the centroid to each
/// camera) and pairwise angular distances. Immutable once built; a different
/// centroid means a new catalog.
pub struct ViewCatalog {
    views: Vec<View>,
    projections: Vec<Projection>,
    lights: Vec<Light>,
    centroid: Point3,
    directions: Vec<Vector3>,
    distances: Vec<f64>,
    names: IndexMap<String, usize>,
    kdtree: KdTree<f64, usize, 3>,
}

impl ViewCatalog {
    pub fn new(
        views: Vec<View>,
        projections: Vec<Projection>,
        lights: Vec<Light>,
        centroid: Point3,
    ) -> Result<Self> {
        let mut directions = Vec::with_capacity(views.len());
        let mut names = IndexMap::with_capacity(views.len());
        let mut kdtree = KdTree::new();

        for (i, view) in views.iter().enumerate() {
            if view.projection >= projections.len() {
                let desc = format!(
                    "view {} references missing projection {}",
                    i, view.projection
                );
                return Err(Error::new(MalformedData, desc));
            }
            if view.light >= lights.len() {
                let desc = format!(
                    "view {} references missing light {}",
                    i, view.light
                );
                return Err(Error::new(MalformedData, desc));
            }

            let deviation =
                (view.pose * view.pose_inverse - Matrix4::identity()).amax();
            if !(deviation <= POSE_TOLERANCE) {
                let desc = format!(
                    "pose of view {} does not match its inverse (deviation {})",
                    i, deviation
                );
                return Err(Error::new(MalformedData, desc));
            }

            let offset = view.camera_position() - centroid;
            let length = offset.norm();
            if !(length > f64::EPSILON) || !length.is_finite() {
                let desc =
                    format!("camera of view {} coincides with centroid", i);
                return Err(Error::new(MalformedData, desc));
            }
            let direction = offset / length;

            kdtree.add(direction.as_ref(), i).map_err(|e| {
                let desc = format!(
                    "failed to index direction of view {}: {:?}",
                    i, e
                );
                Error::new(KdTreeError, desc)
            })?;
            names.entry(view.image.clone()).or_insert(i);
            directions.push(direction);
        }

        let n = views.len();
        let mut distances = vec![0.0; n * n];
        for i in 0..n {
            for j in i + 1..n {
                let distance = angle_between(&directions[i], &directions[j]);
                distances[i * n + j] = distance;
                distances[j * n + i] = distance;
            }
        }

        Ok(Self {
            views,
            projections,
            lights,
            centroid,
            directions,
            distances,
            names,
            kdtree,
        })
    }

    pub fn from_view_set(view_set: &ViewSet, centroid: Point3) -> Result<Self> {
        let views = view_set
            .views
            .iter()
            .map(|v| View {
                pose: v.pose,
                pose_inverse: v.pose_inverse,
                projection: v.projection,
                light: v.light,
                image: v.image_file.clone(),
            })
            .collect();

        Self::new(
            views,
            view_set.projections.clone(),
            view_set.lights.clone(),
            centroid,
        )
    }

    pub fn with_centroid(&self, centroid: Point3) -> Result<Self> {
        Self::new(
            self.views.clone(),
            self.projections.clone(),
            self.lights.clone(),
            centroid,
        )
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn view(&self, i: usize) -> &View {
        &self.views[i]
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn light(&self, i: usize) -> &Light {
        &self.lights[self.views[i].light]
    }

    pub fn centroid(&self) -> &Point3 {
        &self.centroid
    }

    pub fn direction(&self, i: usize) -> &Vector3 {
        &self.directions[i]
    }

    pub fn angular_distance(&self, i: usize, j: usize) -> f64 {
        self.distances[i * self.views.len() + j]
    }

    pub fn distances_from(&self, i: usize) -> &[f64] {
        let n = self.views.len();
        &self.distances[i * n..(i + 1) * n]
    }

    pub fn camera_distance(&self, i: usize) -> f64 {
        (self.views[i].camera_position() - self.centroid).norm()
    }

    pub fn index_of(&self, image: &str) -> Option<usize> {
        self.names.get(image).copied()
    }

    /// Up to `count` views closest to `direction` that lie within
    /// `max_distance` radians, nearest first, with their angular distances.
    pub fn nearest(
        &self,
        direction: &Vector3,
        count: usize,
        max_distance: f64,
    ) -> Result<Vec<(usize, f64)>> {
        if self.views.is_empty() || count == 0 {
            return Ok(vec![]);
        }

        let found = self
            .kdtree
            .nearest(direction.as_ref(), count, &squared_euclidean)
            .map_err(|e| {
                let desc = format!("failed to query view directions: {:?}", e);
                Error::new(KdTreeError, desc)
            })?;

        // Chord length grows with angle, so the order carries over.
        Ok(found
            .into_iter()
            .map(|(_, &i)| (i, angle_between(direction, &self.directions[i])))
            .filter(|&(_, distance)| distance <= max_distance)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use base::assert_eq_f64;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_angular_distance_symmetry() {
        let catalog = new_catalog(&[
            [1.0, 0.0, 0.0],
            [0.3, 2.0, 0.1],
            [-1.0, -0.2, 0.5],
            [0.0, 0.0, 4.0],
        ]);

        for i in 0..catalog.len() {
            assert_eq!(catalog.angular_distance(i, i), 0.0);
            for j in 0..catalog.len() {
                let d = catalog.angular_distance(i, j);
                assert_eq!(d, catalog.angular_distance(j, i));
                assert!((0.0..=PI).contains(&d));
            }
        }

        assert_eq_f64!(catalog.angular_distance(0, 3), FRAC_PI_2);
        assert_eq_f64!(catalog.direction(3).norm(), 1.0);
    }

    #[test]
    fn test_directions_follow_centroid() {
        let catalog = new_catalog(&[[2.0, 0.0, 0.0], [0.0, 2.0, 0.0]]);
        assert_eq_f64!(catalog.angular_distance(0, 1), FRAC_PI_2);

        let moved = catalog.with_centroid(Point3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq_f64!(moved.direction(0).x, 1.0);
        assert_eq_f64!(
            moved.angular_distance(0, 1),
            (-1.0 / 5f64.sqrt()).acos()
        );
        assert_eq_f64!(moved.camera_distance(1), 5f64.sqrt());

        let err = catalog
            .with_centroid(Point3::new(0.0, 2.0, 0.0))
            .err()
            .unwrap();
        assert_eq!(err.kind, MalformedData);
    }

    #[test]
    fn test_pose_inverse_mismatch() {
        let mut view = new_view([0.0, 0.0, 3.0], "a.png");
        view.pose_inverse[(0, 3)] += 0.1;

        let err = ViewCatalog::new(
            vec![view],
            vec![new_projection()],
            vec![new_light()],
            Point3::origin(),
        )
        .err()
        .unwrap();
        assert_eq!(err.kind, MalformedData);
    }

    #[test]
    fn test_missing_shared_references() {
        let mut view = new_view([0.0, 0.0, 3.0], "a.png");
        view.light = 1;

        let res = ViewCatalog::new(
            vec![view],
            vec![new_projection()],
            vec![new_light()],
            Point3::origin(),
        );
        assert_eq!(res.err().unwrap().kind, MalformedData);
    }

    #[test]
    fn test_nearest_and_names() {
        let catalog = new_ring_catalog(8);

        let direction = Vector3::new(1.0, 0.1, 0.0).normalize();
        let found = catalog.nearest(&direction, 3, FRAC_PI_2).unwrap();
        let indices: Vec<usize> = found.iter().map(|v| v.0).collect();
        assert_eq!(indices, vec![0, 1, 7]);
        assert_eq_f64!(found[0].1, 0.1f64.atan());

        let found = catalog.nearest(&direction, 8, 0.5).unwrap();
        assert_eq!(found.len(), 1);

        assert_eq!(catalog.index_of("view_5.png"), Some(5));
        assert_eq!(catalog.index_of("missing.png"), None);
    }
}
