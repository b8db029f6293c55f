//! Fixed-step ODE integration used by the boundary-layer march.
//!
//! The integral boundary-layer equations are marched in arc length `s`
//! rather than time, but the structure is the same: dy/ds = f(s, y).
//! RK4 is the workhorse; the march takes a few substeps per surface panel.

/// Trait representing an ODE system: dy/ds = f(s, y)
pub trait OdeSystem {
    /// The state type, typically a small `[f64; N]`
    type State: StateAddMul + Copy;

    /// Compute the right-hand side of the ODE system
    fn rhs(&self, s: f64, state: &Self::State) -> Self::State;
}

/// Trait for adding states with different weights.
pub trait StateAddMul {
    /// `self + scalar * other`
    fn add_mul(&self, other: &Self, scalar: f64) -> Self;

    /// True when every component is finite.
    fn is_finite(&self) -> bool;
}

impl<const N: usize> StateAddMul for [f64; N] {
    #[inline(always)]
    fn add_mul(&self, other: &Self, scalar: f64) -> Self {
        let mut out = *self;
        for (o, b) in out.iter_mut().zip(other.iter()) {
            *o += b * scalar;
        }
        out
    }

    #[inline(always)]
    fn is_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

/// Single RK4 step.
#[inline(always)]
pub fn rk4_step<S: OdeSystem>(system: &S, s: f64, state: &S::State, h: f64) -> S::State {
    let h2 = 0.5 * h;

    // k1 = f(s, y)
    let k1 = system.rhs(s, state);

    // k2 = f(s + h/2, y + h/2 * k1)
    let state2 = state.add_mul(&k1, h2);
    let k2 = system.rhs(s + h2, &state2);

    // k3 = f(s + h/2, y + h/2 * k2)
    let state3 = state.add_mul(&k2, h2);
    let k3 = system.rhs(s + h2, &state3);

    // k4 = f(s + h, y + h * k3)
    let state4 = state.add_mul(&k3, h);
    let k4 = system.rhs(s + h, &state4);

    // y_new = y + h/6 * (k1 + 2*k2 + 2*k3 + k4)
    let sum = k1.add_mul(&k2, 2.0).add_mul(&k3, 2.0).add_mul(&k4, 1.0);
    state.add_mul(&sum, h / 6.0)
}

/// Fixed-step RK4 integrator splitting each interval into `substeps`.
#[derive(Debug, Clone, Copy)]
pub struct RK4Integrator {
    /// RK4 steps per integration interval
    pub substeps: usize,
}

impl Default for RK4Integrator {
    fn default() -> Self {
        Self { substeps: 4 }
    }
}

impl RK4Integrator {
    /// Integrator with at least one substep.
    pub fn new(substeps: usize) -> Self {
        Self { substeps: substeps.max(1) }
    }

    /// Integrate from `s0` to `s1`, returning the final state, or `None`
    /// as soon as a non-finite component appears.
    pub fn integrate<S: OdeSystem>(
        &self,
        system: &S,
        s0: f64,
        s1: f64,
        state0: S::State,
    ) -> Option<S::State> {
        let n = self.substeps.max(1);
        let h = (s1 - s0) / n as f64;
        let mut state = state0;
        let mut s = s0;
        for _ in 0..n {
            state = rk4_step(system, s, &state, h);
            if !state.is_finite() {
                return None;
            }
            s += h;
        }
        Some(state)
    }

    /// Integrate through a sequence of stations, returning one state per
    /// station (the first entry is `state0`).
    pub fn integrate_stations<S: OdeSystem>(
        &self,
        system: &S,
        stations: &[f64],
        state0: S::State,
    ) -> Option<Vec<S::State>> {
        let mut states = Vec::with_capacity(stations.len());
        states.push(state0);
        for w in stations.windows(2) {
            let prev = states[states.len() - 1];
            states.push(self.integrate(system, w[0], w[1], prev)?);
        }
        Some(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Simple harmonic oscillator for testing
    struct HarmonicOscillator {
        k: f64, // spring constant
        m: f64, // mass
    }

    impl OdeSystem for HarmonicOscillator {
        type State = [f64; 2];

        fn rhs(&self, _s: f64, state: &[f64; 2]) -> [f64; 2] {
            [state[1], -self.k / self.m * state[0]]
        }
    }

    struct Blowup;

    impl OdeSystem for Blowup {
        type State = [f64; 1];

        fn rhs(&self, _s: f64, state: &[f64; 1]) -> [f64; 1] {
            [state[0] * state[0] * 1e200]
        }
    }

    #[test]
    fn test_rk4_harmonic_period() {
        let system = HarmonicOscillator { k: 1.0, m: 1.0 };
        let rk = RK4Integrator::new(200);
        let end = rk
            .integrate(&system, 0.0, 2.0 * std::f64::consts::PI, [1.0, 0.0])
            .unwrap();
        assert_relative_eq!(end[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(end[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_integrate_stations() {
        let system = HarmonicOscillator { k: 1.0, m: 1.0 };
        let stations: Vec<f64> = (0..=10).map(|i| i as f64 * 0.1).collect();
        let states = RK4Integrator::default()
            .integrate_stations(&system, &stations, [1.0, 0.0])
            .unwrap();
        assert_eq!(states.len(), stations.len());
        assert_relative_eq!(states[10][0], 1.0_f64.cos(), epsilon = 1e-8);
    }

    #[test]
    fn test_non_finite_detected() {
        let rk = RK4Integrator::new(4);
        assert!(rk.integrate(&Blowup, 0.0, 1.0, [1e200]).is_none());
    }
}
