use std::error::Error as StdError;
use std::f64::consts::PI;
use std::fmt;
use std::ops::ControlFlow;

use log::info;
use rayon::prelude::*;
use serde::Serialize;

use base::defs::{Error, ErrorKind};

use crate::catalog::ViewCatalog;
use crate::curve::ViewCurve;
use crate::technique::FidelityTechnique;

#[derive(Clone, Debug)]
pub struct SelectionParams {
    /// Views that are scored as targets but never ranked.
    pub held_out: Vec<usize>,
    /// Relative margin a total must beat the best one by to replace it.
    pub tie_tolerance: f64,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            held_out: vec![],
            tie_tolerance: 1e-12,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// Every candidate is ranked.
    Exhausted,
    /// No remaining candidate lowers the total error.
    NoImprovement,
    /// The observer asked to stop.
    Interrupted,
    /// Every remaining hypothesis is degenerate.
    Stalled,
}

impl Termination {
    pub fn name(&self) -> &'static str {
        match self {
            Termination::Exhausted => "exhausted",
            Termination::NoImprovement => "no-improvement",
            Termination::Interrupted => "interrupted",
            Termination::Stalled => "stalled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedEntry {
    pub view: usize,
    pub marginal_contribution: f64,
    pub total_error: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedSelection {
    pub entries: Vec<RankedEntry>,
    pub initial_total_error: f64,
    pub termination: Termination,
}

impl RankedSelection {
    pub fn views(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.view).collect()
    }
}

/// No hypothesis produced a finite total error. Carries what was ranked
/// before that.
#[derive(Debug)]
pub struct SelectionStalledError {
    pub partial: RankedSelection,
}

impl fmt::Display for SelectionStalledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "selection stalled after {} views: \
            no candidate yields a finite error",
            self.partial.entries.len()
        )
    }
}

impl StdError for SelectionStalledError {}

impl From<SelectionStalledError> for Error {
    fn from(err: SelectionStalledError) -> Self {
        Error::new(ErrorKind::SelectionStalled, err.to_string())
    }
}

pub fn evaluate_baselines(
    catalog: &ViewCatalog,
    technique: &dyn FidelityTechnique,
) -> Vec<f64> {
    info!("  evaluating baseline errors...");
    (0..catalog.len())
        .into_par_iter()
        .map(|i| technique.evaluate_baseline_error(i))
        .collect()
}

/// Total error of `targets` once `candidate` joins the ranked views.
/// Predicted totals use each target's curve at the distance to its nearest
/// basis view. An interpolating technique has no error on basis views, so
/// the candidate itself is skipped.
fn hypothesis_total(
    catalog: &ViewCatalog,
    technique: &dyn FidelityTechnique,
    curves: Option<&[ViewCurve]>,
    ranked: &[usize],
    nearest: &[f64],
    targets: &[usize],
    candidate: usize,
) -> f64 {
    let interpolating = technique.is_guaranteed_interpolating();
    let targets = targets
        .iter()
        .copied()
        .filter(|&t| !interpolating || t != candidate);
    match curves {
        Some(curves) => targets
            .map(|t| {
                let distance =
                    nearest[t].min(catalog.angular_distance(t, candidate));
                curves[t].curve.predict(distance)
            })
            .fold(0.0, |total, error| total + error),
        None => {
            let mut active = ranked.to_vec();
            active.push(candidate);
            targets
                .map(|t| technique.evaluate_error_with(t, &active))
                .fold(0.0, |total, error| total + error)
        }
    }
}

/// Greedily ranks views by how much each lowers the total error of the
/// views not yet ranked.
///
/// With `curves` the errors are predicted from the error-distance curves
/// instead of being evaluated. Every accepted view becomes active on
/// `technique` and is passed to `observer`, which may stop the ranking.
pub fn select_views<F>(
    catalog: &ViewCatalog,
    technique: &mut dyn FidelityTechnique,
    curves: Option<&[ViewCurve]>,
    params: &SelectionParams,
    mut observer: F,
) -> Result<RankedSelection, SelectionStalledError>
where
    F: FnMut(&RankedEntry) -> ControlFlow<()>,
{
    let n = catalog.len();
    let all_views: Vec<usize> = (0..n).collect();
    let mut unranked = all_views.clone();
    let mut ranked: Vec<usize> = vec![];
    let mut nearest = vec![PI; n];

    technique.set_active_views(&ranked);
    let interpolating = technique.is_guaranteed_interpolating();
    let initial_total_error = match curves {
        Some(curves) => (0..n)
            .map(|t| curves[t].curve.predict(PI))
            .fold(0.0, |total, error| total + error),
        None => (0..n)
            .map(|t| technique.evaluate_error_with(t, &[]))
            .fold(0.0, |total, error| total + error),
    };

    let mut selection = RankedSelection {
        entries: vec![],
        initial_total_error,
        termination: Termination::Exhausted,
    };
    let mut previous = initial_total_error;
    let mut flow = ControlFlow::Continue(());

    loop {
        if flow.is_break() {
            selection.termination = Termination::Interrupted;
            break;
        }

        let candidates: Vec<usize> = unranked
            .iter()
            .copied()
            .filter(|c| !params.held_out.contains(c))
            .collect();
        if candidates.is_empty() {
            selection.termination = Termination::Exhausted;
            break;
        }

        // Ranked views keep an error unless the technique interpolates.
        let targets = if interpolating { &unranked } else { &all_views };
        let shared: &dyn FidelityTechnique = &*technique;
        let totals: Vec<f64> = candidates
            .par_iter()
            .map(|&c| {
                hypothesis_total(
                    catalog, shared, curves, &ranked, &nearest, targets, c,
                )
            })
            .collect();

        let mut best: Option<(usize, f64)> = None;
        for (&c, &total) in candidates.iter().zip(&totals) {
            if !total.is_finite() {
                continue;
            }
            let beats = match best {
                Some((_, best_total)) => {
                    let margin = params.tie_tolerance * best_total.abs();
                    total < best_total - margin
                }
                None => true,
            };
            if beats {
                best = Some((c, total));
            }
        }

        let (view, total) = match best {
            Some(best) => best,
            None => {
                selection.termination = Termination::Stalled;
                return Err(SelectionStalledError { partial: selection });
            }
        };
        if previous.is_finite() && !(total < previous) {
            selection.termination = Termination::NoImprovement;
            break;
        }

        let entry = RankedEntry {
            view,
            marginal_contribution: previous - total,
            total_error: total,
        };
        info!(
            "  ranked view {} '{}' with total error {:.6}",
            selection.entries.len() + 1,
            catalog.view(view).image,
            total
        );

        ranked.push(view);
        unranked.retain(|&t| t != view);
        for (t, distance) in nearest.iter_mut().enumerate() {
            *distance = distance.min(catalog.angular_distance(t, view));
        }
        technique.set_active_views(&ranked);

        flow = observer(&entry);
        selection.entries.push(entry);
        previous = total;
    }

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{build_curves, CurveParams};
    use crate::sampler::MemorySampler;
    use crate::technique::{
        FidelitySettings, LinearSystemTechnique, MaterialFitTechnique,
    };
    use crate::testing::*;
    use base::assert_eq_f64;

    fn continue_always(_: &RankedEntry) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    #[test]
    fn test_symmetric_tie_breaks_to_lowest_index() {
        let catalog = new_ring_catalog(3);
        let mut technique = DistanceTechnique::new(&catalog, true);
        let params = SelectionParams {
            held_out: vec![0],
            ..Default::default()
        };

        let selection = select_views(
            &catalog,
            &mut technique,
            None,
            &params,
            continue_always,
        )
        .unwrap();

        assert_eq!(selection.views(), vec![1, 2]);
        assert_eq!(selection.termination, Termination::Exhausted);
        assert_eq_f64!(selection.initial_total_error, 3.0);

        let far = technique.error_at(2.0 * PI / 3.0);
        assert_eq_f64!(selection.entries[0].total_error, 2.0 * far);
        let first = &selection.entries[0];
        assert_eq_f64!(first.marginal_contribution, 3.0 - 2.0 * far);
        assert_eq_f64!(selection.entries[1].total_error, far);
        assert_eq!(technique.active_views(), &[1, 2]);
    }

    #[test]
    fn test_totals_decrease_until_termination() {
        let catalog = new_ring_catalog(6);
        let views = new_random_views(6, 4, 31);
        let mut technique = LinearSystemTechnique::new();
        technique
            .initialize(
                &catalog,
                &mut MemorySampler::new(views),
                &FidelitySettings::default(),
                4,
            )
            .unwrap();

        let mut observed = vec![];
        let selection = select_views(
            &catalog,
            &mut technique,
            None,
            &Default::default(),
            |entry| {
                observed.push(entry.clone());
                ControlFlow::Continue(())
            },
        )
        .unwrap();

        assert!(!selection.entries.is_empty());
        assert!(selection.entries.len() <= 6);
        assert_eq!(observed, selection.entries);

        let mut previous = selection.initial_total_error;
        for entry in &selection.entries {
            assert!(entry.total_error < previous);
            let marginal = previous - entry.total_error;
            assert_eq_f64!(entry.marginal_contribution, marginal);
            previous = entry.total_error;
        }

        let mut views = selection.views();
        views.sort_unstable();
        views.dedup();
        assert_eq!(views.len(), selection.entries.len());
    }

    #[test]
    fn test_last_view_leaves_zero_total() {
        let catalog = new_ring_catalog(2);
        let mut technique = DistanceTechnique::new(&catalog, true);

        let selection = select_views(
            &catalog,
            &mut technique,
            None,
            &Default::default(),
            continue_always,
        )
        .unwrap();

        assert_eq!(selection.views(), vec![0, 1]);
        assert_eq!(selection.termination, Termination::Exhausted);
        let last = selection.entries[1].total_error;
        assert_eq!(last, 0.0);
        assert!(last.is_sign_positive());
    }

    #[test]
    fn test_ranked_views_count_without_interpolation() {
        let catalog = new_ring_catalog(3);
        let views = vec![
            new_flat_view(2, [0.2; 3]),
            new_flat_view(2, [0.6; 3]),
            new_flat_view(2, [0.4; 3]),
        ];
        let mut technique = MaterialFitTechnique::new();
        technique
            .initialize(
                &catalog,
                &mut MemorySampler::new(views),
                &FidelitySettings::default(),
                2,
            )
            .unwrap();
        assert!(!technique.is_guaranteed_interpolating());

        let selection = select_views(
            &catalog,
            &mut technique,
            None,
            &Default::default(),
            continue_always,
        )
        .unwrap();

        // With view 0 ranked every view keeps an error: 0, 2/3 and 1/2.
        // Adding view 1 (1.0 + 1/3 + 0) or view 2 (1/2 + 1/2 + 1/4) raises
        // the total over all views.
        assert_eq_f64!(selection.initial_total_error, 3.0, 1e-6);
        assert_eq!(selection.views(), vec![0]);
        assert_eq_f64!(selection.entries[0].total_error, 7.0 / 6.0, 1e-6);
        assert_eq_f64!(
            selection.entries[0].marginal_contribution,
            3.0 - 7.0 / 6.0,
            1e-6
        );
        assert_eq!(selection.termination, Termination::NoImprovement);
    }

    #[test]
    fn test_no_improvement() {
        let catalog =
            new_catalog(&[[2.0, 0.0, 0.0], [2.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        let mut technique = DistanceTechnique::new(&catalog, true);

        let selection = select_views(
            &catalog,
            &mut technique,
            None,
            &Default::default(),
            continue_always,
        )
        .unwrap();

        assert_eq!(selection.views(), vec![0]);
        assert_eq!(selection.termination, Termination::NoImprovement);
        assert_eq!(selection.entries[0].total_error, 0.0);
    }

    #[test]
    fn test_interrupted_by_observer() {
        let catalog = new_ring_catalog(5);
        let mut technique = DistanceTechnique::new(&catalog, true);

        let selection = select_views(
            &catalog,
            &mut technique,
            None,
            &Default::default(),
            |_| ControlFlow::Break(()),
        )
        .unwrap();

        assert_eq!(selection.views(), vec![0]);
        assert_eq!(selection.termination, Termination::Interrupted);
    }

    #[test]
    fn test_stalled_selection_keeps_partial_ranking() {
        let catalog = new_ring_catalog(4);
        let mut technique = DistanceTechnique::new(&catalog, true);
        technique.max_basis = 1;

        let err = select_views(
            &catalog,
            &mut technique,
            None,
            &Default::default(),
            continue_always,
        )
        .unwrap_err();

        assert_eq!(err.partial.views(), vec![0]);
        assert_eq!(err.partial.termination, Termination::Stalled);

        let err: Error = err.into();
        assert_eq!(err.kind, ErrorKind::SelectionStalled);
    }

    #[test]
    fn test_predicted_selection() {
        let catalog = new_ring_catalog(12);
        let mut technique = DistanceTechnique::new(&catalog, true);
        let baselines = evaluate_baselines(&catalog, &technique);
        assert_eq!(baselines, vec![0.0; 12]);

        let params = CurveParams::default();
        let curves = build_curves(&catalog, &technique, &baselines, &params);
        let selection = select_views(
            &catalog,
            &mut technique,
            Some(&curves),
            &Default::default(),
            continue_always,
        )
        .unwrap();

        assert_eq!(selection.entries[0].view, 0);
        let expected: f64 = curves.iter().map(|c| c.curve.predict(PI)).sum();
        assert_eq_f64!(selection.initial_total_error, expected);

        let mut previous = selection.initial_total_error;
        for entry in &selection.entries {
            assert!(entry.total_error < previous);
            previous = entry.total_error;
        }
        assert_eq!(technique.active_views(), selection.views().as_slice());
    }
}
