use std::f64::consts::{FRAC_PI_2, PI};

use base::defs::Result;
use base::vset::ViewSet;

use crate::catalog::{angle_between, Point3, Vector3, ViewCatalog};
use crate::curve::ViewCurve;

/// Catalog views blended into one estimate.
pub const ESTIMATE_NEIGHBOURS: usize = 5;

/// Unit directions from `centroid` to the cameras of another view set.
pub fn target_directions(
    view_set: &ViewSet,
    centroid: Point3,
) -> Result<Vec<Vector3>> {
    let targets = ViewCatalog::from_view_set(view_set, centroid)?;
    Ok((0..targets.len()).map(|i| *targets.direction(i)).collect())
}

/// Predicted error of a view looking from `direction` once `active` views
/// are available, blended from the curves of nearby catalog views with
/// Buehler weights. NaN when no catalog view lies within a right angle.
pub fn estimate_error(
    catalog: &ViewCatalog,
    curves: &[ViewCurve],
    active: &[usize],
    direction: &Vector3,
) -> Result<f64> {
    let neighbours =
        catalog.nearest(direction, ESTIMATE_NEIGHBOURS, FRAC_PI_2)?;

    let active_distance = active
        .iter()
        .map(|&j| angle_between(direction, catalog.direction(j)))
        .fold(PI, f64::min);
    let predict = |i: usize| curves[i].curve.predict(active_distance);

    let (nearest, nearest_distance) = match neighbours.first() {
        Some(&first) => first,
        None => return Ok(f64::NAN),
    };
    if neighbours.len() < 2 || nearest_distance == 0.0 {
        return Ok(predict(nearest));
    }

    let max_distance = neighbours
        .iter()
        .map(|n| n.1)
        .fold(0.0, f64::max);
    let (mut sum, mut weight_sum) = (0.0, 0.0);
    for &(i, distance) in &neighbours {
        let weight = 1.0 / distance - 1.0 / max_distance;
        sum += weight * predict(i);
        weight_sum += weight;
    }

    if weight_sum > 0.0 {
        Ok(sum / weight_sum)
    } else {
        // Equidistant neighbours.
        let count = neighbours.len() as f64;
        Ok(neighbours.iter().map(|&(i, _)| predict(i)).sum::<f64>() / count)
    }
}

/// Estimated errors per direction and the fidelity metric
/// `1 - mean(finite errors)`.
pub fn estimate_fidelity(
    catalog: &ViewCatalog,
    curves: &[ViewCurve],
    active: &[usize],
    directions: &[Vector3],
) -> Result<(Vec<f64>, f64)> {
    let errors = directions
        .iter()
        .map(|d| estimate_error(catalog, curves, active, d))
        .collect::<Result<Vec<f64>>>()?;

    let finite: Vec<f64> =
        errors.iter().copied().filter(|e| e.is_finite()).collect();
    let metric = if finite.is_empty() {
        f64::NAN
    } else {
        1.0 - finite.iter().sum::<f64>() / finite.len() as f64
    };

    Ok((errors, metric))
}
