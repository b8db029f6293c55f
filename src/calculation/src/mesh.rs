//! Panel mesh of a plane and of its wake.
//!
//! Panels are quadrilaterals whose corners run counterclockwise about the
//! outward normal. For thin surfaces the corners are, in order, leading
//! left, trailing left, trailing right, leading right, so that the normal
//! points up. Thick surfaces carry a bottom row (trailing edge to leading
//! edge), a top row (leading edge to trailing edge) and one tip patch per
//! chordwise panel at each free tip.
//!
//! Strips are ordered left tip to right tip on each surface. When both
//! halves have the same mesh every strip and panel records its mirror
//! image, which the solver uses for half-span solves.

use std::collections::HashMap;
use std::ops::Range;

use crate::error::{AnalysisError, AnalysisResult};
use crate::foil::Airfoil;
use crate::plane::{Plane, PlacedWing, SurfaceRole};
use crate::settings::WingSettings;
use crate::vector::{Vec3, directions};
use crate::wing::{SpanStation, Wing};

/// Airfoils by name, as referenced by wing sections.
pub type FoilLibrary = HashMap<String, Airfoil>;

/// Role of a panel on its surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    /// Mean camber surface
    Thin,
    /// Lower skin of a thick surface
    Bottom,
    /// Upper skin of a thick surface
    Top,
    /// Closure at a free tip of a thick surface
    Tip,
}

/// Quadrilateral surface panel.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel3 {
    /// Corners, leading-edge left first
    pub corners: [Vec3; 4],
    /// Outward geometric normal
    pub normal: Vec3,
    /// Normal used in the boundary condition, rotated by flap deflection
    pub bc_normal: Vec3,
    /// Centroid
    pub center: Vec3,
    /// Collocation point: panel center when thick, control point when thin
    pub control: Vec3,
    /// Area
    pub area: f64,
    /// Skin the panel belongs to
    pub kind: PanelKind,
    /// Index of the owning surface
    pub surface: usize,
    /// Index of the owning strip
    pub strip: usize,
    /// Chordwise index from the leading edge
    pub chord_index: usize,
    /// Sheds into the wake
    pub trailing: bool,
    /// Mirror image on the other half, when the halves pair up
    pub mirror: Option<usize>,
    /// Vortex ring of a thin panel, from its bound vortex line to the next one
    pub ring: [Vec3; 4],
}

impl Panel3 {
    /// Geometry of a panel from its corners; ring and control default to the corners and center.
    fn new(corners: [Vec3; 4], kind: PanelKind, surface: usize, strip: usize, chord_index: usize) -> Self {
        let d1 = corners[2] - corners[0];
        let d2 = corners[3] - corners[1];
        let cross = d1.cross(&d2);
        let area = 0.5 * cross.magnitude();
        let normal = cross.normalized().unwrap_or(directions::Z);
        let center = (corners[0] + corners[1] + corners[2] + corners[3]) * 0.25;
        Self {
            corners,
            normal,
            bc_normal: normal,
            center,
            control: center,
            area,
            kind,
            surface,
            strip,
            chord_index,
            trailing: false,
            mirror: None,
            ring: corners,
        }
    }

    /// True for a mean-camber panel.
    pub fn is_thin(&self) -> bool {
        self.kind == PanelKind::Thin
    }

    /// Bound vortex endpoints of a thin panel (left to right).
    pub fn bound_vortex(&self) -> (Vec3, Vec3) {
        (self.ring[0], self.ring[3])
    }
}

/// Chordwise column of panels between two span stations.
#[derive(Debug, Clone, PartialEq)]
pub struct Strip {
    /// Index of the owning surface
    pub surface: usize,
    /// True on the right half and on fins
    pub right: bool,
    /// Mirror strip on the other half
    pub mirror: Option<usize>,
    /// Leading edge, left end
    pub le_a: Vec3,
    /// Leading edge, right end
    pub le_b: Vec3,
    /// Trailing edge, left end
    pub te_a: Vec3,
    /// Trailing edge, right end
    pub te_b: Vec3,
    /// Mean chord
    pub chord: f64,
    /// Spanwise width
    pub width: f64,
    /// Quarter-chord midpoint
    pub quarter_chord: Vec3,
    /// Section foil at the left end
    pub foil_a: String,
    /// Section foil at the right end
    pub foil_b: String,
    /// Fraction from `foil_a` to `foil_b` at the strip middle
    pub blend: f64,
    /// Panels of the strip, chordwise order
    pub panels: Vec<usize>,
    /// Trailing panel (upper one on thick surfaces)
    pub te_top: usize,
    /// Lower trailing panel on thick surfaces
    pub te_bottom: Option<usize>,
    /// Wake starting line, left and right points
    pub wake_a: Vec3,
    pub wake_b: Vec3,
}

impl Strip {
    /// Unit normal of the strip in the Trefftz plane and its width there.
    pub fn trefftz_normal(&self) -> (Vec3, f64) {
        let d = Vec3::new(0.0, self.te_b.y - self.te_a.y, self.te_b.z - self.te_a.z);
        let width = d.magnitude();
        let n = directions::X.cross(&d).normalized().unwrap_or(directions::Z);
        (n, width)
    }
}

/// Strip and panel ranges of one lifting surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceMesh {
    /// Surface name
    pub name: String,
    /// Role on the plane
    pub role: SurfaceRole,
    /// Vertical surface
    pub is_fin: bool,
    /// Meshed with both skins
    pub thick: bool,
    /// Strips of the surface
    pub strips: Range<usize>,
    /// Panels of the surface
    pub panels: Range<usize>,
}

/// Meshing choices taken from the wing settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshOptions {
    /// Mesh main and second wings with thickness
    pub thick_wings: bool,
    /// Chord fraction of the bound vortex in a thin panel
    pub vortex_position: f64,
    /// Chord fraction of the control point in a thin panel
    pub control_position: f64,
    /// Spanwise strips narrower than this (m) are skipped
    pub min_panel_size: f64,
}

impl MeshOptions {
    /// Options from `settings`, with thick main and second wings when `thick_wings` is set.
    pub fn new(settings: &WingSettings, thick_wings: bool) -> Self {
        Self {
            thick_wings,
            vortex_position: settings.vortex_position,
            control_position: settings.control_position,
            min_panel_size: settings.min_panel_size,
        }
    }

    /// True when surfaces of this role get both skins.
    fn is_thick(&self, role: SurfaceRole) -> bool {
        self.thick_wings && matches!(role, SurfaceRole::MainWing | SurfaceRole::SecondWing)
    }
}

/// Panels, strips and surfaces of a whole plane.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// All panels
    pub panels: Vec<Panel3>,
    /// All strips
    pub strips: Vec<Strip>,
    /// All surfaces
    pub surfaces: Vec<SurfaceMesh>,
}

/// Upper bound of the panel count, computed from the planform alone.
pub fn count_panels(plane: &Plane, options: &MeshOptions) -> usize {
    plane
        .surfaces()
        .into_iter()
        .map(|(role, placed)| {
            let thick = options.is_thick(role);
            let halves: Vec<bool> = if placed.wing.is_fin { vec![true] } else { vec![true, false] };
            halves
                .into_iter()
                .map(|right| {
                    let sections = placed.wing.half(right);
                    let body: usize = sections.windows(2).map(|w| w[0].nx * w[0].ny).sum();
                    let tip = sections.len().checked_sub(2).map_or(0, |i| sections[i].nx);
                    if thick { 2 * body + tip } else { body }
                })
                .sum::<usize>()
        })
        .sum()
}

/// Which line of a section profile to sample.
#[derive(Clone, Copy)]
enum Profile {
    /// Mean camber line
    Camber,
    /// Upper surface
    Upper,
    /// Lower surface
    Lower,
}

/// Profile height at chord fraction `xc` of a span station, blended between its foils, per unit chord.
fn profile_value(lib: &FoilLibrary, st: &SpanStation, xc: f64, profile: Profile) -> AnalysisResult<f64> {
    let eval = |name: &str| -> AnalysisResult<f64> {
        let foil = lib
            .get(name)
            .ok_or_else(|| AnalysisError::geometry(format!("foil {} is not loaded", name)))?;
        let y = match profile {
            Profile::Camber => foil.camber(xc),
            Profile::Upper => foil.upper_y(xc),
            Profile::Lower => foil.lower_y(xc),
        };
        Ok(y / foil.chord())
    };
    let a = eval(&st.foil_a)?;
    let b = if st.blend > 0.0 { eval(&st.foil_b)? } else { a };
    Ok(a + st.blend * (b - a))
}

/// Point of the local (unplaced, right-hand) wing at span `y`, chord
/// fraction `xc` and normal offset `zc` (chord fraction).
fn local_point(st: &SpanStation, y: f64, xc: f64, zc: f64) -> Vec3 {
    let d = st.dihedral.to_radians();
    let up = Vec3::new(0.0, -d.sin(), d.cos());
    let span_dir = Vec3::new(0.0, d.cos(), d.sin());
    let le = Vec3::new(st.offset, y, st.z);
    let p = le + directions::X * (xc * st.chord) + up * (zc * st.chord);
    let pivot = le + directions::X * (0.25 * st.chord);
    p.rotate_around(&pivot, &span_dir, st.twist.to_radians()).unwrap_or(p)
}

/// Maps local wing coordinates to plane coordinates.
struct Placement {
    /// Surface origin on the plane
    position: Vec3,
    /// Tilt about the y axis, degrees
    tilt: f64,
    /// Rotate the local frame into a vertical fin
    fin: bool,
    /// Place the left half
    mirror: bool,
}

impl Placement {
    /// Plane coordinates of local point `p`.
    fn apply(&self, p: Vec3) -> Vec3 {
        let mut q = if self.mirror { p.mirror_y() } else { p };
        if self.fin {
            q = Vec3::new(q.x, -q.z, q.y);
        }
        let q = q
            .rotate_around(&Vec3::zero(), &directions::Y, self.tilt.to_radians())
            .unwrap_or(q);
        q + self.position
    }

    /// Corner order is reversed by mirroring.
    fn quad(&self, c: [Vec3; 4]) -> [Vec3; 4] {
        let q = c.map(|p| self.apply(p));
        if self.mirror { [q[3], q[2], q[1], q[0]] } else { q }
    }
}

/// Strip built on one half before mirror pairing.
struct HalfStrip {
    /// Strip data without its panel indices
    strip: Strip,
    /// Panels of the strip, chordwise
    panels: Vec<Panel3>,
}

/// Summed deflection, degrees, of the flaps covering `xc_mid` on span interval `interval`.
fn flap_angle(wing: &Wing, interval: usize, right: bool, xc_mid: f64) -> f64 {
    wing.flaps
        .iter()
        .filter(|f| f.panel == interval && xc_mid > f.hinge)
        .map(|f| if right { f.right_angle } else { f.left_angle })
        .sum()
}

/// Strips and panels of one half of a surface, root to tip.
fn mesh_half(
    lib: &FoilLibrary,
    placed: &PlacedWing,
    surface: usize,
    right: bool,
    thick: bool,
    options: &MeshOptions,
) -> AnalysisResult<Vec<HalfStrip>> {
    let wing = &placed.wing;
    let sections = wing.half(right);
    let place = Placement {
        position: placed.position,
        tilt: placed.tilt,
        fin: wing.is_fin,
        mirror: !right,
    };
    let mut out = vec![];
    let tip_interval = sections.len() - 2;

    for (interval, w) in sections.windows(2).enumerate() {
        let (inner, outer) = (&w[0], &w[1]);
        let xs = inner.x_distribution.fractions(inner.nx);
        let ys: Vec<f64> = inner
            .y_distribution
            .fractions(inner.ny)
            .iter()
            .map(|f| inner.y + f * (outer.y - inner.y))
            .collect();

        for (j, yw) in ys.windows(2).enumerate() {
            let (ya, yb) = (yw[0], yw[1]);
            if (yb - ya) < options.min_panel_size {
                log::debug!("{}: strip at y = {:.4} narrower than the minimum, skipped", wing.name, ya);
                continue;
            }
            let sa = wing.station(right, ya);
            let sb = wing.station(right, yb);
            let line = |st: &SpanStation, y: f64, profile: Profile| -> AnalysisResult<Vec<Vec3>> {
                xs.iter()
                    .map(|&xc| Ok(local_point(st, y, xc, profile_value(lib, st, xc, profile)?)))
                    .collect()
            };
            let camber_a = line(&sa, ya, Profile::Camber)?;
            let camber_b = line(&sb, yb, Profile::Camber)?;
            let n = xs.len() - 1;

            let mut panels = vec![];
            let deflect = |p: &mut Panel3, thin_order: &[Vec3; 4], xc_mid: f64| {
                let delta = flap_angle(wing, interval, right, xc_mid);
                if delta != 0.0 {
                    if let Some(axis) = (thin_order[3] - thin_order[0]).normalized() {
                        p.bc_normal = p
                            .normal
                            .rotate_around(&Vec3::zero(), &axis, delta.to_radians())
                            .unwrap_or(p.normal);
                    }
                }
            };

            if thick {
                let upper_a = line(&sa, ya, Profile::Upper)?;
                let upper_b = line(&sb, yb, Profile::Upper)?;
                let lower_a = line(&sa, ya, Profile::Lower)?;
                let lower_b = line(&sb, yb, Profile::Lower)?;
                for k in (0..n).rev() {
                    let c = place.quad([lower_a[k], lower_b[k], lower_b[k + 1], lower_a[k + 1]]);
                    let mut p = Panel3::new(c, PanelKind::Bottom, surface, 0, k);
                    p.trailing = k + 1 == n;
                    // hinge axis taken in thin-surface corner order
                    let thin_order = place.quad([lower_a[k], lower_a[k + 1], lower_b[k + 1], lower_b[k]]);
                    deflect(&mut p, &thin_order, 0.5 * (xs[k] + xs[k + 1]));
                    panels.push(p);
                }
                for k in 0..n {
                    let c = place.quad([upper_a[k], upper_a[k + 1], upper_b[k + 1], upper_b[k]]);
                    let mut p = Panel3::new(c, PanelKind::Top, surface, 0, k);
                    p.trailing = k + 1 == n;
                    deflect(&mut p, &c, 0.5 * (xs[k] + xs[k + 1]));
                    panels.push(p);
                }
                let last_strip = interval == tip_interval && j + 1 == ys.len() - 1;
                if last_strip {
                    for k in 0..n {
                        let c = place.quad([lower_b[k], upper_b[k], upper_b[k + 1], lower_b[k + 1]]);
                        if c[0].distance(&c[1]) + c[2].distance(&c[3]) > 1e-9 {
                            panels.push(Panel3::new(c, PanelKind::Tip, surface, 0, k));
                        }
                    }
                }
            } else {
                let quads: Vec<[Vec3; 4]> = (0..n)
                    .map(|k| place.quad([camber_a[k], camber_a[k + 1], camber_b[k + 1], camber_b[k]]))
                    .collect();
                let bound = |c: &[Vec3; 4]| {
                    (
                        c[0].lerp(&c[1], options.vortex_position),
                        c[3].lerp(&c[2], options.vortex_position),
                    )
                };
                for (k, c) in quads.iter().copied().enumerate() {
                    let mut p = Panel3::new(c, PanelKind::Thin, surface, 0, k);
                    p.trailing = k + 1 == n;
                    let (la, ta, tb, lb) = (c[0], c[1], c[2], c[3]);
                    let (va, vb) = bound(&c);
                    // rings close on the next bound vortex, the last one
                    // the same fraction of a panel behind the trailing edge
                    let (wa, wb) = match quads.get(k + 1) {
                        Some(next) => bound(next),
                        None => (
                            ta + (ta - la) * options.vortex_position,
                            tb + (tb - lb) * options.vortex_position,
                        ),
                    };
                    p.ring = [va, wa, wb, vb];
                    let ca = la.lerp(&ta, options.control_position);
                    let cb = lb.lerp(&tb, options.control_position);
                    p.control = (ca + cb) * 0.5;
                    deflect(&mut p, &c, 0.5 * (xs[k] + xs[k + 1]));
                    panels.push(p);
                }
            }

            let [le_a, te_a, te_b, le_b] =
                place.quad([camber_a[0], camber_a[n], camber_b[n], camber_b[0]]);
            let chord = 0.5 * (le_a.distance(&te_a) + le_b.distance(&te_b));
            let width = Vec3::new(0.0, le_b.y - le_a.y, le_b.z - le_a.z).magnitude();
            let quarter_chord = (le_a.lerp(&te_a, 0.25) + le_b.lerp(&te_b, 0.25)) * 0.5;
            let (wake_a, wake_b) = if thick {
                (te_a, te_b)
            } else {
                let last = &panels[n - 1];
                (last.ring[1], last.ring[2])
            };
            let blend = (0.5 * (ya + yb) - inner.y) / (outer.y - inner.y);
            out.push(HalfStrip {
                strip: Strip {
                    surface,
                    right,
                    mirror: None,
                    le_a,
                    le_b,
                    te_a,
                    te_b,
                    chord,
                    width,
                    quarter_chord,
                    foil_a: inner.foil.clone(),
                    foil_b: outer.foil.clone(),
                    blend,
                    panels: vec![],
                    te_top: 0,
                    te_bottom: None,
                    wake_a,
                    wake_b,
                },
                panels,
            });
        }
    }
    Ok(out)
}

impl Mesh {
    /// Mesh every surface of `plane`, pairing mirror strips and panels when both halves match.
    pub fn build(plane: &Plane, lib: &FoilLibrary, options: &MeshOptions) -> AnalysisResult<Self> {
        let mut mesh = Mesh::default();
        for (surface, (role, placed)) in plane.surfaces().into_iter().enumerate() {
            let thick = options.is_thick(role);
            let strip_start = mesh.strips.len();
            let panel_start = mesh.panels.len();

            let right = mesh_half(lib, placed, surface, true, thick, options)?;
            if placed.wing.is_fin {
                for hs in right {
                    mesh.push_strip(hs);
                }
            } else {
                let left = mesh_half(lib, placed, surface, false, thick, options)?;
                let paired = left.len() == right.len()
                    && left.iter().zip(&right).all(|(l, r)| l.panels.len() == r.panels.len());
                let first_left = mesh.strips.len();
                let n_left = left.len();
                for hs in left.into_iter().rev() {
                    mesh.push_strip(hs);
                }
                let first_right = mesh.strips.len();
                for hs in right {
                    mesh.push_strip(hs);
                }
                if paired {
                    for k in 0..n_left {
                        // left strips run tip to root
                        let l = first_left + n_left - 1 - k;
                        let r = first_right + k;
                        mesh.strips[l].mirror = Some(r);
                        mesh.strips[r].mirror = Some(l);
                        let (lp, rp) = (mesh.strips[l].panels.clone(), mesh.strips[r].panels.clone());
                        for (a, b) in lp.into_iter().zip(rp) {
                            mesh.panels[a].mirror = Some(b);
                            mesh.panels[b].mirror = Some(a);
                        }
                    }
                }
            }

            mesh.surfaces.push(SurfaceMesh {
                name: placed.wing.name.clone(),
                role,
                is_fin: placed.wing.is_fin,
                thick,
                strips: strip_start..mesh.strips.len(),
                panels: panel_start..mesh.panels.len(),
            });
        }
        if mesh.panels.iter().any(|p| !p.center.is_finite()) {
            return Err(AnalysisError::geometry("non-finite panel coordinates"));
        }
        Ok(mesh)
    }

    /// Append a strip, assigning panel and trailing-edge indices.
    fn push_strip(&mut self, hs: HalfStrip) {
        let index = self.strips.len();
        let mut strip = hs.strip;
        for mut p in hs.panels {
            p.strip = index;
            let id = self.panels.len();
            if p.trailing {
                match p.kind {
                    PanelKind::Bottom => strip.te_bottom = Some(id),
                    PanelKind::Top | PanelKind::Thin => strip.te_top = id,
                    PanelKind::Tip => {}
                }
            }
            strip.panels.push(id);
            self.panels.push(p);
        }
        self.strips.push(strip);
    }

    /// Number of panels.
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    /// True when there are no panels.
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Chordwise neighbours of a thick panel within its strip, skipping tips.
    pub fn chordwise_neighbours(&self, panel: usize) -> (Option<usize>, Option<usize>) {
        let strip = &self.strips[self.panels[panel].strip];
        let chain: Vec<usize> = strip
            .panels
            .iter()
            .copied()
            .filter(|&i| self.panels[i].kind != PanelKind::Tip)
            .collect();
        match chain.iter().position(|&i| i == panel) {
            Some(k) => (
                k.checked_sub(1).map(|k| chain[k]),
                chain.get(k + 1).copied(),
            ),
            None => (None, None),
        }
    }

    /// Panel at the same chordwise place in the neighbouring strips of the surface.
    pub fn spanwise_neighbours(&self, panel: usize) -> (Option<usize>, Option<usize>) {
        let p = &self.panels[panel];
        let range = &self.surfaces[p.surface].strips;
        let strip = &self.strips[p.strip];
        let slot = strip.panels.iter().position(|&i| i == panel);
        let find = |s: usize| -> Option<usize> {
            let other = &self.strips[s];
            let slot = slot?;
            if other.panels.len() != strip.panels.len() {
                return None;
            }
            let candidate = other.panels[slot];
            (self.panels[candidate].kind == p.kind).then_some(candidate)
        };
        let left = (p.strip > range.start).then(|| find(p.strip - 1)).flatten();
        let right = (p.strip + 1 < range.end).then(|| find(p.strip + 1)).flatten();
        (left, right)
    }

    /// Groups of contiguous strips whose trailing edges join, per surface.
    pub fn trailing_groups(&self) -> Vec<Vec<usize>> {
        let mut groups: Vec<Vec<usize>> = vec![];
        for surface in &self.surfaces {
            let mut current: Vec<usize> = vec![];
            for s in surface.strips.clone() {
                if let Some(&prev) = current.last() {
                    if self.strips[prev].te_b.distance(&self.strips[s].te_a) > 1e-9 {
                        groups.push(std::mem::take(&mut current));
                    }
                }
                current.push(s);
            }
            if !current.is_empty() {
                groups.push(current);
            }
        }
        groups
    }
}

/// Wake behind every strip, as columns of quadrilateral panels.
#[derive(Debug, Clone, PartialEq)]
pub struct Wake {
    /// Node lines trailing from strip edges, trailing edge first
    pub lines: Vec<Vec<Vec3>>,
    /// Left and right line of each strip
    pub columns: Vec<(usize, usize)>,
    /// Length of each wake panel before the far-field one
    pub lengths: Vec<f64>,
    /// Free-stream direction the wake was laid along
    pub direction: Vec3,
    /// Length of the far-field panel's end from the trailing edge
    pub far_distance: f64,
}

impl Wake {
    /// Straight wake along `direction`. The first `panels - 1` panels grow
    /// geometrically by `factor` over `length`; the last reaches `far_distance`.
    pub fn new(mesh: &Mesh, direction: Vec3, panels: usize, length: f64, factor: f64, far_distance: f64) -> Self {
        let panels = panels.max(1);
        let near = panels - 1;
        let lengths: Vec<f64> = if near == 0 {
            vec![]
        } else if (factor - 1.0).abs() < 1e-9 {
            vec![length / near as f64; near]
        } else {
            let first = length * (1.0 - factor) / (1.0 - factor.powi(near as i32));
            (0..near).map(|k| first * factor.powi(k as i32)).collect()
        };

        let mut lines = vec![];
        let mut columns = vec![];
        for group in mesh.trailing_groups() {
            let mut starts: Vec<Vec3> = vec![];
            for (k, &s) in group.iter().enumerate() {
                if k == 0 {
                    starts.push(mesh.strips[s].wake_a);
                }
                starts.push(mesh.strips[s].wake_b);
            }
            let base = lines.len();
            for start in starts {
                lines.push(Self::straight_line(start, direction, &lengths, far_distance));
            }
            for (k, &s) in group.iter().enumerate() {
                columns.push((s, base + k, base + k + 1));
            }
        }
        columns.sort_by_key(|c| c.0);
        Self {
            lines,
            columns: columns.into_iter().map(|(_, l, r)| (l, r)).collect(),
            lengths,
            direction,
            far_distance,
        }
    }

    /// Node line from `start` along `direction`, ending at `far`.
    fn straight_line(start: Vec3, direction: Vec3, lengths: &[f64], far: f64) -> Vec<Vec3> {
        let mut line = vec![start];
        let mut p = start;
        for l in lengths {
            p = p + direction * *l;
            line.push(p);
        }
        line.push(start + direction * far);
        line
    }

    /// Wake panels behind each strip.
    pub fn panels_per_column(&self) -> usize {
        self.lengths.len() + 1
    }

    /// Corners of wake panel `k` behind strip `strip`, thin-surface order.
    pub fn panel(&self, strip: usize, k: usize) -> [Vec3; 4] {
        let (l, r) = self.columns[strip];
        let (a, b) = (&self.lines[l], &self.lines[r]);
        [a[k], a[k + 1], b[k + 1], b[k]]
    }

    /// Re-lay every line as a streamline of `velocity`, keeping the panel lengths.
    pub fn relax(&mut self, velocity: impl Fn(&Vec3) -> Vec3) -> AnalysisResult<()> {
        let near_total: f64 = self.lengths.iter().sum();
        for line in &mut self.lines {
            let mut next = vec![line[0]];
            for l in &self.lengths {
                let p = next[next.len() - 1];
                let v = velocity(&p);
                let dir = v
                    .normalized()
                    .filter(|d| d.is_finite())
                    .ok_or_else(|| AnalysisError::wake("stagnant or non-finite velocity at a wake node"))?;
                next.push(p + dir * *l);
            }
            let last = next[next.len() - 1];
            next.push(last + self.direction * (self.far_distance - near_total));
            *line = next;
        }
        Ok(())
    }
}
