use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use structopt::StructOpt;

use planner::{fit_curves, rank_views};

#[derive(StructOpt)]
#[structopt(about = "View importance planner")]
struct Opts {
    #[structopt(
        help = "Log level (off, error, warn, info, debug or trace)",
        long,
        default_value = "info"
    )]
    log_level: LevelFilter,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    FitCurves(fit_curves::FitCurvesParams),
    RankViews(rank_views::RankViewsParams),
}

fn main() {
    let opts = Opts::from_args();

    TermLogger::init(
        opts.log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .ok();

    let res = match opts.command {
        Command::FitCurves(params) => {
            fit_curves::fit_curves_with_params(&params)
        }
        Command::RankViews(params) => {
            rank_views::rank_views_with_params(&params)
        }
    };

    if let Err(err) = res {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
