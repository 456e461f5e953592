use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use log::{info, warn};
use structopt::StructOpt;

use base::defs::{Error, ErrorKind::*, Result};
use base::util::cli::TsvOutput;
use base::util::fs;
use base::vset::{read_view_set, write_view_set, ViewSet};

use crate::catalog::ViewCatalog;
use crate::curve::ViewCurve;
use crate::debug_image::write_debug_images;
use crate::estimate::{estimate_fidelity, target_directions};
use crate::fit_curves::fit_curves;
use crate::misc::{CurveOptions, Session, SessionParams};
use crate::report::{write_selection_json, TsvReport};
use crate::selection::{
    evaluate_baselines, select_views, RankedSelection, SelectionParams,
    SelectionStalledError, Termination,
};
use crate::technique::FidelityTechnique;

#[derive(StructOpt)]
#[structopt(about = "Rank views by their importance for reconstructing others")]
pub struct RankViewsParams {
    #[structopt(flatten)]
    session: SessionParams,

    #[structopt(
        help = "Predict errors from error-distance curves instead of \
            evaluating every hypothesis",
        long
    )]
    predict: bool,

    #[structopt(
        help = "Image name of a view that is scored but never ranked",
        long,
        number_of_values = 1
    )]
    held_out: Vec<String>,

    #[structopt(
        help = "Directory for truth, reconstruction and error images",
        long
    )]
    debug_dir: Option<PathBuf>,

    #[structopt(help = "Output .json file with the ranked selection", long)]
    json: Option<PathBuf>,

    #[structopt(
        help = "Output .vset file with the top ranked views",
        long,
        requires = "keep"
    )]
    reduced_vset: Option<PathBuf>,

    #[structopt(help = "Number of views kept in the reduced view set", long)]
    keep: Option<usize>,

    #[structopt(
        help = "Input .vset file with views to estimate fidelity for",
        long
    )]
    target_vset: Option<PathBuf>,

    #[structopt(flatten)]
    curve: CurveOptions,

    #[structopt(flatten)]
    output: TsvOutput,
}

fn held_out_indices(
    catalog: &ViewCatalog,
    names: &[String],
) -> Result<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            catalog.index_of(name).ok_or_else(|| {
                let desc = format!("unknown held-out view '{}'", name);
                Error::new(MalformedData, desc)
            })
        })
        .collect()
}

pub fn rank_views_with_params(params: &RankViewsParams) -> Result<()> {
    let mut session = Session::open(&params.session)?;
    let catalog = &session.catalog;
    let mut report = TsvReport::new(params.output.get()?);

    let held_out = held_out_indices(catalog, &params.held_out)?;
    let curves = if params.predict || params.target_vset.is_some() {
        let curve_params = params.curve.params();
        let technique = session.technique.as_ref();
        Some(fit_curves(catalog, technique, &curve_params, &mut report)?.1)
    } else {
        let baselines = evaluate_baselines(catalog, session.technique.as_ref());
        report.write_baselines(catalog, &baselines)?;
        None
    };

    let selection_params = SelectionParams {
        held_out,
        ..Default::default()
    };
    let prediction = if params.predict {
        curves.as_deref()
    } else {
        None
    };
    let selection = rank_views(
        catalog,
        session.technique.as_mut(),
        prediction,
        &selection_params,
        &mut report,
    )?;
    let ranked = selection.views();

    if let Some(dir) = &params.debug_dir {
        let gamma = if params.session.perceptual {
            1.0
        } else {
            session.view_set.gamma
        };
        let technique = session.technique.as_ref();
        dump_debug_images(dir, catalog, technique, &ranked, gamma);
    }

    if let Some(path) = &params.json {
        let writer = BufWriter::new(fs::create_file(path)?);
        write_selection_json(writer, &selection)?;
    }

    if let (Some(path), Some(keep)) = (&params.reduced_vset, params.keep) {
        write_reduced_view_set(path, &session.view_set, &ranked, keep)?;
    }

    if let (Some(path), Some(curves)) = (&params.target_vset, &curves) {
        let targets = read_view_set(fs::open_file(path)?)?;
        let directions = target_directions(&targets, *catalog.centroid())?;
        let (errors, metric) =
            estimate_fidelity(catalog, curves, &ranked, &directions)?;
        info!("  estimated target fidelity: {:.6}", metric);
        report.write_target_fidelity(&errors, metric)?;
    }

    session.technique.close();

    if selection.termination == Termination::Stalled {
        return Err(SelectionStalledError { partial: selection }.into());
    }
    Ok(())
}

/// Runs the selection and writes each ranked view to `report` as soon as it
/// is accepted. A stalled selection is returned with its partial ranking.
pub fn rank_views<W: Write>(
    catalog: &ViewCatalog,
    technique: &mut dyn FidelityTechnique,
    curves: Option<&[ViewCurve]>,
    params: &SelectionParams,
    report: &mut TsvReport<W>,
) -> Result<RankedSelection> {
    report.begin_selection()?;

    let mut rank = 0;
    let mut write_err = None;
    let res = select_views(catalog, technique, curves, params, |entry| {
        rank += 1;
        match report.write_selection_entry(catalog, rank, entry) {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                write_err = Some(err);
                ControlFlow::Break(())
            }
        }
    });
    if let Some(err) = write_err {
        return Err(err);
    }

    let selection = match res {
        Ok(selection) => selection,
        Err(stalled) => {
            warn!("{}", stalled);
            stalled.partial
        }
    };
    report.end_selection(&selection)?;

    Ok(selection)
}

fn dump_debug_images(
    dir: &Path,
    catalog: &ViewCatalog,
    technique: &dyn FidelityTechnique,
    ranked: &[usize],
    gamma: f64,
) {
    info!("  writing debug images to '{}'...", dir.display());
    for target in 0..catalog.len() {
        let active: Vec<usize> =
            ranked.iter().copied().filter(|&j| j != target).collect();
        if let Some(recon) = technique.reconstruct(target, &active) {
            let image = &catalog.view(target).image;
            write_debug_images(dir, image, &recon, gamma);
        }
    }
}

/// Writes the `keep` top ranked views, the most important one first.
pub fn write_reduced_view_set(
    path: &Path,
    view_set: &ViewSet,
    ranked: &[usize],
    keep: usize,
) -> Result<()> {
    let reduced = view_set.subset(&ranked[..keep.min(ranked.len())])?;
    let mut writer = BufWriter::new(fs::create_file(path)?);
    write_view_set(&mut writer, &reduced, 0)?;
    writer.flush().map_err(|e| {
        let desc = format!("failed to write '{}'", path.display());
        Error::with_source(IoError, desc, e)
    })
}
