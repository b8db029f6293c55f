//! Aerodynamic analysis engines for airfoils, wings and planes.
//!
//! This library provides:
//! - a row-equilibrated nalgebra LU kernel shared by every engine
//! - a 2D panel method coupled with an integral boundary layer
//! - 3D horseshoe, vortex-ring and source/doublet panel methods with wake relaxation
//! - a nonlinear lifting line driven by section polars
//! - a polar sweep driver with per-point failure classification and cancellation
//!
//! # Features
//!
//! - **Typed failures**: every operating point ends converged, unconverged,
//!   skipped or failed, with an [`AnalysisError`] describing why
//! - **Pluggable linear algebra**: the `lapack` feature adds a LAPACK backend
//!   behind the same [`linalg::LinearSolver`] trait

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(clippy::doc_markdown)]
#![allow(clippy::tabs_in_doc_comments)]
#![allow(clippy::inconsistent_struct_constructor)]
#![allow(clippy::useless_format)]

pub mod error;
pub mod vector;
pub mod ode;
pub mod constants;
pub mod progress;
pub mod linalg;
pub mod settings;
pub mod aerodynamics;
pub mod polar;
pub mod sweep;
pub mod metrics;

// 2D
pub mod foil;
pub mod panel2d;
pub mod boundary_layer;
pub mod foil_solver;
pub mod section_polar;

// 3D
pub mod wing;
pub mod plane;
pub mod mesh;
pub mod influence;
pub mod panel3d;
pub mod lifting_line;

pub use constants::Fluid;
pub use error::{AnalysisError, AnalysisResult, FailureKind};
pub use foil::Airfoil;
pub use foil_solver::{FoilPolarSpec, FoilResult, FoilSolver};
pub use lifting_line::LiftingLineSolver;
pub use linalg::{DenseLu, LinearSolver, SharedSolver};
pub use metrics::{PolarMetrics, compute_polar_metrics};
pub use panel3d::{WingMethod, WingPolarSpec, WingResult, WingSolver};
pub use plane::{PlacedWing, Plane};
pub use polar::{AeroCoefficients, OpPoint, Polar, PointStatus, PolarType, SweepVariable};
pub use progress::{CancelToken, LogSink, ProgressSink, RunContext};
pub use section_polar::{FoilPolars, SectionPolar};
pub use settings::{FoilSettings, SweepOptions, WingSettings};
pub use sweep::{PointSolver, SweepSummary, run_sweep, sequence};
pub use vector::{Vec2, Vec3};
pub use wing::{Wing, WingSection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
