//! Command-line front end: runs a 2D foil polar or a 3D wing polar and
//! prints (or writes) the converged points as a table.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use polars::prelude::*;

use aerolab_calc::foil::Airfoil;
use aerolab_calc::metrics::PolarMetrics;
use aerolab_calc::mesh::FoilLibrary;
use aerolab_calc::polar::{Polar, PolarType, SweepVariable};
use aerolab_calc::progress::{CancelToken, LogSink, RunContext};
use aerolab_calc::section_polar::{FoilPolars, SectionPolar};
use aerolab_calc::sweep::{PointSolver, run_sweep, sequence};
use aerolab_calc::{
    FoilPolarSpec, FoilResult, FoilSettings, FoilSolver, LiftingLineSolver, Plane, SweepOptions, VERSION, Wing,
    WingMethod, WingPolarSpec, WingResult, WingSettings, WingSolver,
};

#[derive(Parser, Debug)]
#[command(name = "aerolab", version = VERSION, about = "Airfoil and wing polar analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Angle-of-attack polar of a NACA 4-digit airfoil
    Foil(FoilArgs),
    /// Angle-of-attack polar of a trapezoidal wing
    Wing(WingArgs),
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Sweep as start:end:step, degrees
    #[arg(long, default_value = "-4:12:1", value_parser = parse_range, allow_hyphen_values = true)]
    alpha: (f64, f64, f64),
    /// JSON file with solver settings; missing keys keep their defaults
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Write the converged points to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Drop points computed outside the section polars or left unconverged
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct FoilArgs {
    /// NACA 4-digit code
    #[arg(long, default_value = "2412")]
    naca: String,
    /// Panels per side
    #[arg(long, default_value_t = 80)]
    panels: usize,
    #[arg(long, default_value_t = 200_000.0)]
    re: f64,
    #[arg(long, default_value_t = 0.0)]
    mach: f64,
    #[arg(long, default_value_t = 9.0)]
    ncrit: f64,
    #[arg(long)]
    inviscid: bool,
    #[command(flatten)]
    sweep: SweepArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Method {
    LiftingLine,
    Horseshoe,
    VortexRing,
    Panel,
}

impl From<Method> for WingMethod {
    fn from(m: Method) -> Self {
        match m {
            Method::LiftingLine => WingMethod::LiftingLine,
            Method::Horseshoe => WingMethod::Horseshoe,
            Method::VortexRing => WingMethod::VortexRing,
            Method::Panel => WingMethod::Panel,
        }
    }
}

#[derive(Args, Debug)]
struct WingArgs {
    #[arg(long, default_value = "2412")]
    naca: String,
    /// Tip-to-tip span (m)
    #[arg(long, default_value_t = 2.0)]
    span: f64,
    #[arg(long, default_value_t = 0.3)]
    root_chord: f64,
    #[arg(long, default_value_t = 0.2)]
    tip_chord: f64,
    /// Leading-edge sweep, degrees
    #[arg(long, default_value_t = 0.0)]
    sweep_angle: f64,
    /// Mass (kg); enables the fixed-lift polar
    #[arg(long)]
    mass: Option<f64>,
    /// Free-stream speed (m/s)
    #[arg(long, default_value_t = 15.0)]
    speed: f64,
    #[arg(long, value_enum, default_value_t = Method::VortexRing)]
    method: Method,
    /// Skip the section polars and the viscous drag
    #[arg(long)]
    inviscid: bool,
    /// Relax the wake towards the local flow
    #[arg(long)]
    relax_wake: bool,
    #[command(flatten)]
    sweep: SweepArgs,
}

fn parse_range(s: &str) -> Result<(f64, f64, f64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [start, end, step] = parts.as_slice() else {
        return Err(format!("expected start:end:step, got {}", s));
    };
    let num = |v: &str| v.trim().parse::<f64>().map_err(|e| format!("{}: {}", v, e));
    Ok((num(start)?, num(end)?, num(step)?))
}

#[derive(serde::Deserialize, Default)]
#[serde(default)]
struct SettingsFile {
    foil: FoilSettings,
    wing: WingSettings,
}

fn load_settings(path: Option<&Path>) -> Result<SettingsFile> {
    match path {
        None => Ok(SettingsFile::default()),
        Some(p) => {
            let file = File::open(p).with_context(|| format!("opening {}", p.display()))?;
            serde_json::from_reader(file).with_context(|| format!("parsing {}", p.display()))
        }
    }
}

fn sweep_options(args: &SweepArgs, base: SweepOptions) -> SweepOptions {
    SweepOptions {
        keep_out_points: !args.strict,
        ..base
    }
}

fn run<S: PointSolver>(solver: &mut S, args: &SweepArgs, options: SweepOptions, name: &str) -> Result<Polar<S::Output>> {
    let (start, end, step) = args.alpha;
    let targets = sequence(start, end, step);
    let mut polar = Polar::new(name, solver.polar_type(), solver.variable());
    let mut sink = LogSink;
    let mut ctx = RunContext::new(&mut sink, CancelToken::new());
    let summary = run_sweep(solver, &targets, &options, &mut polar, &mut ctx)?;
    log::info!(
        "{}: {} converged, {} unconverged, {} skipped, {} failed",
        name,
        summary.converged,
        summary.unconverged,
        summary.skipped,
        summary.failed
    );
    Ok(polar)
}

fn foil_frame(polar: &Polar<FoilResult>) -> PolarsResult<DataFrame> {
    let rows: Vec<&FoilResult> = polar.converged().collect();
    DataFrame::new(vec![
        Series::new("alpha", rows.iter().map(|r| r.alpha).collect::<Vec<_>>()),
        Series::new("cl", rows.iter().map(|r| r.cl).collect::<Vec<_>>()),
        Series::new("cd", rows.iter().map(|r| r.cd).collect::<Vec<_>>()),
        Series::new("cdp", rows.iter().map(|r| r.cdp).collect::<Vec<_>>()),
        Series::new("cm", rows.iter().map(|r| r.cm).collect::<Vec<_>>()),
        Series::new("xtr_top", rows.iter().map(|r| r.xtr_top).collect::<Vec<_>>()),
        Series::new("xtr_bot", rows.iter().map(|r| r.xtr_bot).collect::<Vec<_>>()),
    ])
}

fn wing_frame(polar: &Polar<WingResult>) -> PolarsResult<DataFrame> {
    let rows: Vec<&WingResult> = polar.converged().collect();
    DataFrame::new(vec![
        Series::new("alpha", rows.iter().map(|r| r.alpha).collect::<Vec<_>>()),
        Series::new("speed", rows.iter().map(|r| r.speed).collect::<Vec<_>>()),
        Series::new("cl", rows.iter().map(|r| r.cl).collect::<Vec<_>>()),
        Series::new("cdi", rows.iter().map(|r| r.cdi).collect::<Vec<_>>()),
        Series::new("cdv", rows.iter().map(|r| r.cdv).collect::<Vec<_>>()),
        Series::new("cm", rows.iter().map(|r| r.cm).collect::<Vec<_>>()),
        Series::new("x_cp", rows.iter().map(|r| r.x_cp).collect::<Vec<_>>()),
        Series::new("e", rows.iter().map(|r| r.efficiency.unwrap_or(f64::NAN)).collect::<Vec<_>>()),
    ])
}

fn report(mut df: DataFrame, metrics: Option<PolarMetrics>, csv: Option<&Path>) -> Result<()> {
    println!("{}", df);
    if let Some(m) = metrics {
        let mut summary: Vec<_> = m.get_summary().into_iter().collect();
        summary.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in summary {
            println!("  {:<20} {:>12.5}", k, v);
        }
    }
    if let Some(path) = csv {
        let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        CsvWriter::new(&mut file).has_header(true).finish(&mut df)?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

fn naca(code: &str, per_side: usize) -> Result<Airfoil> {
    Airfoil::naca4(code, per_side).with_context(|| format!("building NACA {}", code))
}

fn run_foil(args: &FoilArgs) -> Result<()> {
    let settings = load_settings(args.sweep.settings.as_deref())?;
    let spec = FoilPolarSpec {
        reynolds: args.re,
        mach: args.mach,
        ncrit: args.ncrit,
        viscous: !args.inviscid,
        ..FoilPolarSpec::default()
    };
    let mut solver = FoilSolver::new(naca(&args.naca, args.panels)?, spec, settings.foil);
    let options = sweep_options(&args.sweep, SweepOptions::foil());
    let polar = run(&mut solver, &args.sweep, options, &format!("NACA {}", args.naca))?;
    report(foil_frame(&polar)?, PolarMetrics::from_polar(&polar).ok(), args.sweep.csv.as_deref())
}

/// Section polar of the wing foil at the mean chord Reynolds number.
fn section_polars(args: &WingArgs, foil: &Airfoil, foil_settings: FoilSettings, reynolds: f64) -> Result<FoilPolars> {
    let spec = FoilPolarSpec {
        reynolds,
        ..FoilPolarSpec::default()
    };
    let mut solver = FoilSolver::new(foil.clone(), spec, foil_settings);
    let sweep = SweepArgs {
        alpha: (-6.0, 14.0, 1.0),
        settings: None,
        csv: None,
        strict: true,
    };
    log::info!("computing the section polar of NACA {} at Re = {:.0}", args.naca, reynolds);
    let polar = run(&mut solver, &sweep, SweepOptions::foil(), &args.naca)?;
    let mut polars = FoilPolars::new();
    polars.insert(args.naca.clone(), SectionPolar::from_polar(&polar)?);
    Ok(polars)
}

fn run_wing(args: &WingArgs) -> Result<()> {
    let settings = load_settings(args.sweep.settings.as_deref())?;
    if !(args.speed > 0.0) {
        bail!("speed must be positive, got {}", args.speed);
    }
    let foil = naca(&args.naca, 60)?;
    let wing = Wing::tapered(
        format!("NACA {} wing", args.naca),
        args.span,
        args.root_chord,
        args.tip_chord,
        args.sweep_angle,
        &args.naca,
    );
    let plane = Plane::from_wing(wing, args.mass.unwrap_or(1.0));
    let mut wing_settings = settings.wing;
    wing_settings.wake_relaxation |= args.relax_wake;

    let spec = WingPolarSpec {
        method: args.method.into(),
        polar_type: if args.mass.is_some() { PolarType::FixedLift } else { PolarType::FixedSpeed },
        variable: SweepVariable::Alpha,
        speed: args.speed,
        viscous: !args.inviscid,
        ..WingPolarSpec::default()
    };
    let needs_polars = spec.viscous || spec.method == WingMethod::LiftingLine;
    let polars = if needs_polars {
        let mac = plane.reference_chord();
        section_polars(args, &foil, settings.foil, spec.fluid.reynolds(args.speed, mac))?
    } else {
        FoilPolars::new()
    };

    let options = sweep_options(&args.sweep, SweepOptions::wing());
    let name = plane.name.clone();
    let polar = if spec.method == WingMethod::LiftingLine {
        let mut solver =
            LiftingLineSolver::new(plane, polars, spec, wing_settings).with_sweep_options(&options);
        run(&mut solver, &args.sweep, options, &name)?
    } else {
        let mut library = FoilLibrary::new();
        library.insert(args.naca.clone(), foil);
        let mut solver = WingSolver::new(plane, library, polars, spec, wing_settings).with_sweep_options(&options);
        run(&mut solver, &args.sweep, options, &name)?
    };
    report(wing_frame(&polar)?, PolarMetrics::from_polar(&polar).ok(), args.sweep.csv.as_deref())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match &cli.command {
        Command::Foil(args) => run_foil(args),
        Command::Wing(args) => run_wing(args),
    }
}
