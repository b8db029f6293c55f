//! Plane assembly: main wing plus optional second wing, elevator and fin.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};
use crate::vector::Vec3;
use crate::wing::Wing;

/// Position of a lifting surface on the plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceRole {
    /// Main wing, the reference surface
    MainWing,
    /// Second (tandem) wing
    SecondWing,
    /// Horizontal tail
    Elevator,
    /// Vertical tail
    Fin,
}

/// A wing with its placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedWing {
    /// The surface
    pub wing: Wing,
    /// Root leading-edge position (m)
    pub position: Vec3,
    /// Incidence about the root leading edge, degrees, positive nose up
    #[serde(default)]
    pub tilt: f64,
}

impl PlacedWing {
    /// Wing at the origin without incidence.
    pub fn at_origin(wing: Wing) -> Self {
        Self {
            wing,
            position: Vec3::zero(),
            tilt: 0.0,
        }
    }
}

/// Control deflection law of a control polar: each flap angle grows by
/// `gain × control` on the corresponding half.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlGain {
    /// Surface carrying the flap
    pub role: SurfaceRole,
    /// Flap index on that surface
    pub flap: usize,
    /// Degrees per unit control, right half
    pub right: f64,
    /// Degrees per unit control, left half
    pub left: f64,
}

/// Outcome of the symmetry classification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymmetryReport {
    /// True when a half-model is valid
    pub symmetric: bool,
    /// One line per element that breaks the symmetry
    pub reasons: Vec<String>,
}

/// Aircraft made of up to four lifting surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Display name
    pub name: String,
    /// Main wing
    pub wing: PlacedWing,
    /// Optional second wing
    #[serde(default)]
    pub wing2: Option<PlacedWing>,
    /// Optional elevator
    #[serde(default)]
    pub elevator: Option<PlacedWing>,
    /// Optional fin
    #[serde(default)]
    pub fin: Option<PlacedWing>,
    /// Moment reference point (m)
    #[serde(default)]
    pub cog: Vec3,
    /// kg, for fixed-lift polars
    pub mass: f64,
}

impl Plane {
    /// A plane made of one wing at the origin.
    pub fn from_wing(wing: Wing, mass: f64) -> Self {
        Self {
            name: wing.name.clone(),
            wing: PlacedWing::at_origin(wing),
            wing2: None,
            elevator: None,
            fin: None,
            cog: Vec3::zero(),
            mass,
        }
    }

    /// Lifting surfaces in mesh order.
    pub fn surfaces(&self) -> Vec<(SurfaceRole, &PlacedWing)> {
        let mut out = vec![(SurfaceRole::MainWing, &self.wing)];
        if let Some(w) = &self.wing2 {
            out.push((SurfaceRole::SecondWing, w));
        }
        if let Some(w) = &self.elevator {
            out.push((SurfaceRole::Elevator, w));
        }
        if let Some(w) = &self.fin {
            out.push((SurfaceRole::Fin, w));
        }
        out
    }

    /// Surface of a given role, when present.
    fn surface_mut(&mut self, role: SurfaceRole) -> Option<&mut PlacedWing> {
        match role {
            SurfaceRole::MainWing => Some(&mut self.wing),
            SurfaceRole::SecondWing => self.wing2.as_mut(),
            SurfaceRole::Elevator => self.elevator.as_mut(),
            SurfaceRole::Fin => self.fin.as_mut(),
        }
    }

    /// Main wing area (m²).
    pub fn reference_area(&self) -> f64 {
        self.wing.wing.area()
    }

    /// Main wing span (m).
    pub fn reference_span(&self) -> f64 {
        self.wing.wing.span()
    }

    /// Main wing mean aerodynamic chord (m).
    pub fn reference_chord(&self) -> f64 {
        self.wing.wing.mac()
    }

    /// Check every surface, its placement and the main wing area.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.wing.wing.is_fin {
            return Err(AnalysisError::geometry("main wing cannot be a fin"));
        }
        for (role, placed) in self.surfaces() {
            placed.wing.validate()?;
            if (role == SurfaceRole::Fin) != placed.wing.is_fin {
                return Err(AnalysisError::geometry(format!(
                    "{}: fin flag does not match its position on the plane",
                    placed.wing.name
                )));
            }
            if !placed.position.is_finite() || !placed.tilt.is_finite() {
                return Err(AnalysisError::geometry(format!("{}: invalid placement", placed.wing.name)));
            }
        }
        if !(self.reference_area() > 0.0) {
            return Err(AnalysisError::geometry("main wing has no area"));
        }
        Ok(())
    }

    /// Copy with flap angles offset by `gains × control`.
    pub fn with_controls(&self, gains: &[ControlGain], control: f64) -> AnalysisResult<Self> {
        let mut plane = self.clone();
        for g in gains {
            let placed = plane
                .surface_mut(g.role)
                .ok_or_else(|| AnalysisError::geometry(format!("control on missing surface {:?}", g.role)))?;
            let flap = placed.wing.flaps.get_mut(g.flap).ok_or_else(|| {
                AnalysisError::geometry(format!("control on missing flap {} of {:?}", g.flap, g.role))
            })?;
            flap.right_angle += g.right * control;
            flap.left_angle += g.left * control;
        }
        Ok(plane)
    }

    /// Classify the configuration at sideslip `beta` (degrees). Every
    /// element that prevents a half-span solve adds one reason.
    pub fn symmetry(&self, beta: f64) -> SymmetryReport {
        let mut reasons = vec![];
        if beta.abs() > 1e-9 {
            reasons.push(format!("sideslip angle is {:.3}°", beta));
        }
        for (role, placed) in self.surfaces() {
            let name = &placed.wing.name;
            if role == SurfaceRole::Fin {
                if placed.position.y.abs() > 1e-9 {
                    reasons.push(format!("fin {} is off the plane of symmetry", name));
                }
            } else {
                if placed.position.y.abs() > 1e-9 {
                    reasons.push(format!("{} is not centred on the plane of symmetry", name));
                }
                if !placed.wing.is_symmetric() {
                    reasons.push(format!("{} has different left and right halves", name));
                }
            }
            for (i, flap) in placed.wing.flaps.iter().enumerate() {
                if !role_is_fin(role) && !flap.is_symmetric() {
                    reasons.push(format!(
                        "flap {} of {} is deflected asymmetrically ({:.2}° / {:.2}°)",
                        i, name, flap.left_angle, flap.right_angle
                    ));
                }
                if role_is_fin(role) && flap.right_angle.abs() > 1e-9 {
                    reasons.push(format!("rudder {} of {} is deflected", i, name));
                }
            }
        }
        SymmetryReport {
            symmetric: reasons.is_empty(),
            reasons,
        }
    }
}

/// True for the fin role.
fn role_is_fin(role: SurfaceRole) -> bool {
    role == SurfaceRole::Fin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wing::WingFlap;

    fn plane() -> Plane {
        let mut p = Plane::from_wing(Wing::rectangular("main", 2.0, 0.2, "f", 4, 6), 1.0);
        let mut elev = Wing::rectangular("elev", 0.6, 0.1, "f", 2, 3);
        elev.flaps.push(WingFlap {
            panel: 0,
            hinge: 0.7,
            right_angle: 0.0,
            left_angle: 0.0,
        });
        p.elevator = Some(PlacedWing {
            wing: elev,
            position: Vec3::new(0.8, 0.0, 0.05),
            tilt: -2.0,
        });
        p.fin = Some(PlacedWing {
            wing: Wing::rectangular("fin", 0.4, 0.1, "f", 2, 3).as_fin(),
            position: Vec3::new(0.8, 0.0, 0.0),
            tilt: 0.0,
        });
        p
    }

    #[test]
    fn test_symmetric_plane() {
        let p = plane();
        assert!(p.validate().is_ok());
        let r = p.symmetry(0.0);
        assert!(r.symmetric);
        assert!(r.reasons.is_empty());
    }

    #[test]
    fn test_each_asymmetry_is_reported() {
        let mut p = plane();
        p.wing.wing.left_sections = Some(vec![
            p.wing.wing.sections[0].clone(),
            crate::wing::WingSection::new(0.9, 0.2, "f"),
        ]);
        let p = p
            .with_controls(
                &[ControlGain {
                    role: SurfaceRole::Elevator,
                    flap: 0,
                    right: 1.0,
                    left: -1.0,
                }],
                5.0,
            )
            .unwrap();
        let r = p.symmetry(3.0);
        assert!(!r.symmetric);
        assert_eq!(r.reasons.len(), 3);
        assert!(r.reasons[0].contains("sideslip"));
    }

    #[test]
    fn test_symmetric_control_keeps_symmetry() {
        let p = plane()
            .with_controls(
                &[ControlGain {
                    role: SurfaceRole::Elevator,
                    flap: 0,
                    right: 1.0,
                    left: 1.0,
                }],
                4.0,
            )
            .unwrap();
        assert!(p.symmetry(0.0).symmetric);
        assert!(plane().with_controls(&[ControlGain { role: SurfaceRole::SecondWing, flap: 0, right: 1.0, left: 1.0 }], 1.0).is_err());
    }
}
