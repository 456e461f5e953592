use std::io::Write;

use structopt::StructOpt;

use base::defs::Result;
use base::util::cli::TsvOutput;

use crate::catalog::ViewCatalog;
use crate::curve::{build_curves, CurveParams, ViewCurve};
use crate::misc::{CurveOptions, Session, SessionParams};
use crate::report::TsvReport;
use crate::selection::evaluate_baselines;
use crate::technique::FidelityTechnique;

#[derive(StructOpt)]
#[structopt(about = "Fit per-view error-distance curves")]
pub struct FitCurvesParams {
    #[structopt(flatten)]
    session: SessionParams,

    #[structopt(flatten)]
    curve: CurveOptions,

    #[structopt(flatten)]
    output: TsvOutput,
}

pub fn fit_curves_with_params(params: &FitCurvesParams) -> Result<()> {
    let session = Session::open(&params.session)?;
    let mut report = TsvReport::new(params.output.get()?);

    fit_curves(
        &session.catalog,
        session.technique.as_ref(),
        &params.curve.params(),
        &mut report,
    )?;

    Ok(())
}

/// Writes the baselines and fitted curves of every view to `report`.
pub fn fit_curves<W: Write>(
    catalog: &ViewCatalog,
    technique: &dyn FidelityTechnique,
    params: &CurveParams,
    report: &mut TsvReport<W>,
) -> Result<(Vec<f64>, Vec<ViewCurve>)> {
    let baselines = evaluate_baselines(catalog, technique);
    report.write_baselines(catalog, &baselines)?;

    let curves = build_curves(catalog, technique, &baselines, params);
    report.write_curves(catalog, &curves)?;

    Ok((baselines, curves))
}
