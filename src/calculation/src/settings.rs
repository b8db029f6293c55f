//! Numerical settings for the three engines and the sweep driver.
//!
//! Every struct deserializes with `#[serde(default)]`, so a settings file
//! only needs the values it changes.

use serde::{Deserialize, Serialize};

use crate::constants::limits;
use crate::error::{AnalysisError, AnalysisResult};

/// Settings of the 2D coupled solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoilSettings {
    /// Newton iteration cap
    pub max_iterations: usize,
    /// Rms edge-velocity residual accepted as converged
    pub tolerance: f64,
    /// Largest Newton update, fraction of V∞
    pub max_step: f64,
    /// Panel ceiling on either side of the leading edge
    pub max_panels_per_side: usize,
    /// Largest turning angle between adjacent panels (degrees)
    pub max_panel_angle_deg: f64,
    /// Secant iterations on alpha for a Cl target
    pub lift_iterations: usize,
    /// Cl error accepted by the secant
    pub lift_tolerance: f64,
    /// RK4 substeps per surface panel
    pub rk_substeps: usize,
}

impl Default for FoilSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-4,
            max_step: 0.25,
            max_panels_per_side: limits::MAX_FOIL_PANELS_PER_SIDE,
            max_panel_angle_deg: limits::MAX_FOIL_PANEL_ANGLE_DEG,
            lift_iterations: 20,
            lift_tolerance: 1e-4,
            rk_substeps: 4,
        }
    }
}

impl FoilSettings {
    /// Reject non-positive caps and tolerances.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.max_iterations == 0 {
            return Err(AnalysisError::geometry("foil settings: max_iterations must be positive"));
        }
        if !(self.tolerance > 0.0) || !(self.max_step > 0.0) {
            return Err(AnalysisError::geometry(
                "foil settings: tolerance and max_step must be positive",
            ));
        }
        if self.max_panels_per_side < 4 {
            return Err(AnalysisError::geometry("foil settings: panel ceiling below 4"));
        }
        if !(self.max_panel_angle_deg > 0.0 && self.max_panel_angle_deg < 180.0) {
            return Err(AnalysisError::geometry(format!(
                "foil settings: panel angle ceiling {} out of (0, 180)",
                self.max_panel_angle_deg
            )));
        }
        Ok(())
    }
}

/// Settings of the wing engines (lifting line and 3D panels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WingSettings {
    /// Lifting-line stations across the span
    pub llt_stations: usize,
    /// Convergence threshold on the induced angle (degrees)
    pub llt_alpha_precision: f64,
    /// Under-relaxation divisor of the circulation update
    pub llt_relaxation: f64,
    /// Lifting-line iteration cap
    pub llt_max_iterations: usize,

    /// Wake roll-up passes
    pub max_wake_iterations: usize,
    /// Vortex core radius (m)
    pub core_size: f64,
    /// Spanwise strips narrower than this are skipped (m)
    pub min_panel_size: f64,
    /// Control point, fraction of panel chord
    pub control_position: f64,
    /// Bound vortex, fraction of panel chord
    pub vortex_position: f64,
    /// Panel ceiling of the 3D mesh
    pub max_panels: usize,

    /// Wake panels per strip
    pub wake_panels: usize,
    /// Wake length, multiple of the mean aerodynamic chord
    pub wake_length: f64,
    /// Length ratio between successive wake panels
    pub wake_panel_factor: f64,
    /// Relax the wake towards the local flow
    pub wake_relaxation: bool,
}

impl Default for WingSettings {
    fn default() -> Self {
        Self {
            llt_stations: 20,
            llt_alpha_precision: 0.01,
            llt_relaxation: 20.0,
            llt_max_iterations: 100,
            max_wake_iterations: 5,
            core_size: 1e-5,
            min_panel_size: 0.001,
            control_position: 0.75,
            vortex_position: 0.25,
            max_panels: limits::MAX_WING_PANELS,
            wake_panels: 1,
            wake_length: 1.0,
            wake_panel_factor: 1.1,
            wake_relaxation: false,
        }
    }
}

impl WingSettings {
    /// Reject settings the wing engines cannot run with.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.llt_stations < 4 {
            return Err(AnalysisError::geometry("wing settings: fewer than 4 lifting-line stations"));
        }
        if !(self.llt_relaxation >= 1.0) {
            return Err(AnalysisError::geometry("wing settings: relaxation divisor below 1"));
        }
        if !(0.0..=1.0).contains(&self.control_position)
            || !(0.0..=1.0).contains(&self.vortex_position)
            || self.vortex_position >= self.control_position
        {
            return Err(AnalysisError::geometry(
                "wing settings: vortex position must lie before the control point within the panel",
            ));
        }
        if self.wake_panels == 0 || !(self.wake_length > 0.0) || !(self.wake_panel_factor > 0.0) {
            return Err(AnalysisError::geometry("wing settings: invalid wake discretization"));
        }
        if self.max_panels == 0 {
            return Err(AnalysisError::geometry("wing settings: panel ceiling is zero"));
        }
        Ok(())
    }
}

/// Behaviour of the sweep driver between operating points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepOptions {
    /// Discard carried boundary-layer or wake state before every point
    pub reset_state_between_points: bool,
    /// Keep points computed outside the section polar envelope, and the
    /// partial data of unconverged points
    pub keep_out_points: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self::foil()
    }
}

impl SweepOptions {
    /// Boundary-layer state is carried from point to point.
    pub fn foil() -> Self {
        Self {
            reset_state_between_points: false,
            keep_out_points: true,
        }
    }

    /// Wake geometry is rebuilt for every point.
    pub fn wing() -> Self {
        Self {
            reset_state_between_points: true,
            keep_out_points: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(FoilSettings::default().validate().is_ok());
        assert!(WingSettings::default().validate().is_ok());
        assert_eq!(WingSettings::default().llt_stations, 20);
        assert_eq!(FoilSettings::default().max_panels_per_side, 300);
    }

    #[test]
    fn test_invalid_positions() {
        let s = WingSettings {
            vortex_position: 0.8,
            ..Default::default()
        };
        assert!(matches!(s.validate(), Err(AnalysisError::GeometryInvalid { .. })));
    }

    #[test]
    fn test_partial_json() {
        let s: FoilSettings = serde_json::from_str(r#"{"max_iterations": 40}"#).unwrap();
        assert_eq!(s.max_iterations, 40);
        assert_eq!(s.tolerance, 1e-4);
        let w: WingSettings = serde_json::from_str(r#"{"wake_relaxation": true}"#).unwrap();
        assert!(w.wake_relaxation);
        assert_eq!(w.max_wake_iterations, 5);
    }

    #[test]
    fn test_sweep_option_presets() {
        assert!(!SweepOptions::foil().reset_state_between_points);
        assert!(SweepOptions::wing().reset_state_between_points);
        assert!(SweepOptions::default().keep_out_points);
    }
}
