//! Wing planform definition.
//!
//! A wing is a list of sections from the root outwards. The panel between
//! section `i` and `i + 1` takes the dihedral of section `i` and the mesh
//! counts of section `i`. Chord, offset and twist vary linearly between
//! sections; the airfoil is blended linearly from one section foil to the
//! next. A left half different from the right one makes the wing
//! asymmetric. Fins have a single half pointing up.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// Spacing law of panel edges along a wing panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Distribution {
    /// Evenly spaced
    #[default]
    Uniform,
    /// Refined at both ends
    Cosine,
    /// Refined at the end
    Sine,
    /// Refined at the start
    InverseSine,
}

impl Distribution {
    /// `n + 1` fractions from 0 to 1.
    pub fn fractions(&self, n: usize) -> Vec<f64> {
        let n = n.max(1);
        (0..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                match self {
                    Distribution::Uniform => t,
                    Distribution::Cosine => 0.5 * (1.0 - (std::f64::consts::PI * t).cos()),
                    Distribution::Sine => (0.5 * std::f64::consts::PI * t).sin(),
                    Distribution::InverseSine => 1.0 - (0.5 * std::f64::consts::PI * (1.0 - t)).sin(),
                }
            })
            .collect()
    }
}

/// One spanwise station of the planform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WingSection {
    /// Spanwise position from the root (m)
    pub y: f64,
    /// Chord (m)
    pub chord: f64,
    /// Leading-edge x offset (m)
    pub offset: f64,
    /// Dihedral of the panel outboard of this section (degrees)
    pub dihedral: f64,
    /// Degrees, positive nose up
    pub twist: f64,
    /// Airfoil name
    pub foil: String,
    /// Chordwise panels
    pub nx: usize,
    /// Spanwise panels up to the next section
    pub ny: usize,
    /// Chordwise spacing law
    pub x_distribution: Distribution,
    /// Spanwise spacing law up to the next section
    pub y_distribution: Distribution,
}

impl WingSection {
    /// Section with 8 cosine-spaced chordwise and 10 uniform spanwise panels.
    pub fn new(y: f64, chord: f64, foil: impl Into<String>) -> Self {
        Self {
            y,
            chord,
            offset: 0.0,
            dihedral: 0.0,
            twist: 0.0,
            foil: foil.into(),
            nx: 8,
            ny: 10,
            x_distribution: Distribution::Cosine,
            y_distribution: Distribution::Uniform,
        }
    }

    /// Override the panel counts.
    pub fn with_mesh(mut self, nx: usize, ny: usize) -> Self {
        self.nx = nx;
        self.ny = ny;
        self
    }
}

/// Trailing-edge flap on one wing panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WingFlap {
    /// Index of the inboard section of the panel
    pub panel: usize,
    /// Hinge chord fraction
    pub hinge: f64,
    /// Deflection on the right half, degrees, positive trailing edge down
    pub right_angle: f64,
    /// Deflection on the left half, degrees
    pub left_angle: f64,
}

impl WingFlap {
    /// True when both halves deflect alike.
    pub fn is_symmetric(&self) -> bool {
        (self.right_angle - self.left_angle).abs() < 1e-9
    }
}

/// Planform quantities at one spanwise position.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanStation {
    /// Chord (m)
    pub chord: f64,
    /// Leading-edge x offset (m)
    pub offset: f64,
    /// Degrees
    pub twist: f64,
    /// Height of the leading edge from dihedral
    pub z: f64,
    /// Dihedral of the panel containing the station, degrees
    pub dihedral: f64,
    /// Inboard section foil
    pub foil_a: String,
    /// Outboard section foil
    pub foil_b: String,
    /// Fraction from `foil_a` to `foil_b`
    pub blend: f64,
}

/// Lifting surface described by its right-half sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wing {
    /// Display name
    pub name: String,
    /// Right half, root first
    pub sections: Vec<WingSection>,
    /// Left half when it differs from the right one
    #[serde(default)]
    pub left_sections: Option<Vec<WingSection>>,
    /// Vertical surface, meshed as a single half
    #[serde(default)]
    pub is_fin: bool,
    /// Trailing-edge flaps
    #[serde(default)]
    pub flaps: Vec<WingFlap>,
}

impl Wing {
    /// Symmetric wing from its right-half sections.
    pub fn new(name: impl Into<String>, sections: Vec<WingSection>) -> Self {
        Self {
            name: name.into(),
            sections,
            left_sections: None,
            is_fin: false,
            flaps: vec![],
        }
    }

    /// Straight untwisted wing of constant chord.
    pub fn rectangular(name: impl Into<String>, span: f64, chord: f64, foil: &str, nx: usize, ny: usize) -> Self {
        Self::new(
            name,
            vec![
                WingSection::new(0.0, chord, foil).with_mesh(nx, ny),
                WingSection::new(0.5 * span, chord, foil).with_mesh(nx, ny),
            ],
        )
    }

    /// Single-panel trapezoid, `sweep` being the leading-edge sweep in degrees.
    pub fn tapered(
        name: impl Into<String>,
        span: f64,
        root_chord: f64,
        tip_chord: f64,
        sweep: f64,
        foil: &str,
    ) -> Self {
        let half = 0.5 * span;
        let mut tip = WingSection::new(half, tip_chord, foil);
        tip.offset = half * sweep.to_radians().tan();
        Self::new(name, vec![WingSection::new(0.0, root_chord, foil), tip])
    }

    /// Mark the wing as a fin.
    pub fn as_fin(mut self) -> Self {
        self.is_fin = true;
        self
    }

    /// Check section ordering, chords, mesh counts and flaps.
    pub fn validate(&self) -> AnalysisResult<()> {
        let halves = std::iter::once(&self.sections).chain(self.left_sections.as_ref());
        for sections in halves {
            if sections.len() < 2 {
                return Err(AnalysisError::geometry(format!("wing {}: fewer than two sections", self.name)));
            }
            if sections[0].y < 0.0 {
                return Err(AnalysisError::geometry(format!("wing {}: negative root position", self.name)));
            }
            for s in sections {
                if !(s.chord > 0.0) || !s.chord.is_finite() {
                    return Err(AnalysisError::geometry(format!(
                        "wing {}: non-positive chord at y = {:.4}",
                        self.name, s.y
                    )));
                }
            }
            for (i, w) in sections.windows(2).enumerate() {
                if !(w[1].y > w[0].y) {
                    return Err(AnalysisError::geometry(format!(
                        "wing {}: sections {} and {} are not in increasing span order",
                        self.name,
                        i,
                        i + 1
                    )));
                }
                if w[0].nx == 0 || w[0].ny == 0 {
                    return Err(AnalysisError::geometry(format!("wing {}: panel {} has no mesh", self.name, i)));
                }
            }
        }
        for flap in &self.flaps {
            if flap.panel + 1 >= self.sections.len() || !(0.0..1.0).contains(&flap.hinge) {
                return Err(AnalysisError::geometry(format!(
                    "wing {}: flap on panel {} is outside the planform",
                    self.name, flap.panel
                )));
            }
        }
        Ok(())
    }

    /// Sections of one half.
    pub fn half(&self, right: bool) -> &[WingSection] {
        if right {
            &self.sections
        } else {
            self.left_sections.as_deref().unwrap_or(&self.sections)
        }
    }

    /// True unless the wing is a fin.
    pub fn has_left_half(&self) -> bool {
        !self.is_fin
    }

    /// Area of one half.
    fn half_area(sections: &[WingSection]) -> f64 {
        sections
            .windows(2)
            .map(|w| 0.5 * (w[0].chord + w[1].chord) * (w[1].y - w[0].y))
            .sum()
    }

    /// Integral of c² over one half, trapezoid panels integrated exactly.
    fn half_chord_sq(sections: &[WingSection]) -> f64 {
        sections
            .windows(2)
            .map(|w| {
                let (a, b) = (w[0].chord, w[1].chord);
                (w[1].y - w[0].y) * (a * a + a * b + b * b) / 3.0
            })
            .sum()
    }

    /// Span of one half.
    fn half_span_of(sections: &[WingSection]) -> f64 {
        sections.last().map_or(0.0, |s| s.y)
    }

    /// Planform span (tip to tip, or root to tip for a fin).
    pub fn span(&self) -> f64 {
        if self.is_fin {
            Self::half_span_of(&self.sections)
        } else {
            Self::half_span_of(self.half(true)) + Self::half_span_of(self.half(false))
        }
    }

    /// Planform area, both halves unless a fin (m²).
    pub fn area(&self) -> f64 {
        if self.is_fin {
            Self::half_area(&self.sections)
        } else {
            Self::half_area(self.half(true)) + Self::half_area(self.half(false))
        }
    }

    /// Mean aerodynamic chord, ∫c² dy / ∫c dy.
    pub fn mac(&self) -> f64 {
        let (sq, area) = if self.is_fin {
            (Self::half_chord_sq(&self.sections), Self::half_area(&self.sections))
        } else {
            (
                Self::half_chord_sq(self.half(true)) + Self::half_chord_sq(self.half(false)),
                self.area(),
            )
        };
        if area > 0.0 { sq / area } else { 0.0 }
    }

    /// Span squared over area.
    pub fn aspect_ratio(&self) -> f64 {
        let area = self.area();
        if area > 0.0 { self.span() * self.span() / area } else { 0.0 }
    }

    /// Tip chord over root chord.
    pub fn taper_ratio(&self) -> f64 {
        let root = self.sections[0].chord;
        self.sections.last().map_or(1.0, |tip| tip.chord / root)
    }

    /// True when the left half mirrors the right one.
    pub fn is_symmetric(&self) -> bool {
        self.is_fin
            || self
                .left_sections
                .as_ref()
                .is_none_or(|left| left == &self.sections)
    }

    /// Planform at `y` (absolute spanwise distance from the root) on one half.
    pub fn station(&self, right: bool, y: f64) -> SpanStation {
        let sections = self.half(right);
        let mut z = 0.0;
        for (i, w) in sections.windows(2).enumerate() {
            let (a, b) = (&w[0], &w[1]);
            let last = i + 2 == sections.len();
            if y <= b.y || last {
                let t = ((y - a.y) / (b.y - a.y)).clamp(0.0, 1.0);
                let dy = t * (b.y - a.y);
                return SpanStation {
                    chord: a.chord + t * (b.chord - a.chord),
                    offset: a.offset + t * (b.offset - a.offset),
                    twist: a.twist + t * (b.twist - a.twist),
                    z: z + dy * a.dihedral.to_radians().tan(),
                    dihedral: a.dihedral,
                    foil_a: a.foil.clone(),
                    foil_b: b.foil.clone(),
                    blend: t,
                };
            }
            z += (b.y - a.y) * a.dihedral.to_radians().tan();
        }
        let s = &sections[0];
        SpanStation {
            chord: s.chord,
            offset: s.offset,
            twist: s.twist,
            z: 0.0,
            dihedral: s.dihedral,
            foil_a: s.foil.clone(),
            foil_b: s.foil.clone(),
            blend: 0.0,
        }
    }

    /// Names of all section foils, without repetition.
    pub fn foil_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![];
        let halves = std::iter::once(&self.sections).chain(self.left_sections.as_ref());
        for s in halves.flatten() {
            if !names.contains(&s.foil.as_str()) {
                names.push(&s.foil);
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rectangular_planform() {
        let w = Wing::rectangular("w", 8.0, 1.0, "naca0012", 4, 10);
        assert!(w.validate().is_ok());
        assert_relative_eq!(w.span(), 8.0);
        assert_relative_eq!(w.area(), 8.0);
        assert_relative_eq!(w.mac(), 1.0);
        assert_relative_eq!(w.aspect_ratio(), 8.0);
        assert!(w.is_symmetric());
    }

    #[test]
    fn test_tapered_mac() {
        let w = Wing::tapered("w", 2.0, 1.0, 0.5, 0.0, "f");
        // trapezoid MAC = 2/3 cr (1 + λ + λ²)/(1 + λ)
        assert_relative_eq!(w.mac(), 2.0 / 3.0 * 1.75 / 1.5, epsilon = 1e-12);
        assert_relative_eq!(w.taper_ratio(), 0.5);
    }

    #[test]
    fn test_station_interpolation() {
        let mut w = Wing::tapered("w", 4.0, 1.0, 0.6, 10.0, "root");
        w.sections[1].foil = "tip".into();
        w.sections[0].dihedral = 5.0;
        let s = w.station(true, 1.0);
        assert_relative_eq!(s.chord, 0.8);
        assert_relative_eq!(s.blend, 0.5);
        assert_relative_eq!(s.z, 1.0 * 5f64.to_radians().tan(), epsilon = 1e-12);
        assert_eq!(s.foil_b, "tip");
    }

    #[test]
    fn test_asymmetric_left_half() {
        let mut w = Wing::rectangular("w", 4.0, 1.0, "f", 4, 4);
        let mut left = w.sections.clone();
        left[1].twist = 2.0;
        w.left_sections = Some(left);
        assert!(!w.is_symmetric());
        assert!(w.validate().is_ok());
    }

    #[test]
    fn test_invalid_sections_rejected() {
        let mut w = Wing::rectangular("w", 4.0, 1.0, "f", 4, 4);
        w.sections[1].y = 0.0;
        assert!(matches!(w.validate(), Err(AnalysisError::GeometryInvalid { .. })));
    }

    #[test]
    fn test_distributions_span_unit_interval() {
        for d in [Distribution::Uniform, Distribution::Cosine, Distribution::Sine, Distribution::InverseSine] {
            let f = d.fractions(6);
            assert_eq!(f.len(), 7);
            assert_relative_eq!(f[0], 0.0, epsilon = 1e-12);
            assert_relative_eq!(f[6], 1.0, epsilon = 1e-12);
            assert!(f.windows(2).all(|w| w[1] > w[0]));
        }
    }
}
