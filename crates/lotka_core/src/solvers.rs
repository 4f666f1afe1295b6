//! Adaptive integrators sampled on a fixed output grid.
//!
//! `DOP853` and `RK45` are delegated to `ode_solvers`. `RK23` (Bogacki-Shampine)
//! is not offered there, so it lives here.

use crate::error::SimulationError;
use log::{debug, warn};
use ode_solvers::dop_shared::OutputType;
use ode_solvers::{SVector, System};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Steps between stiffness checks in the `ode_solvers` methods.
const STIFFNESS_TEST_INTERVAL: u32 = 1000;

/// Selectable integration algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Adaptive Dormand–Prince 8(5,3). High accuracy per step, the default.
    #[default]
    #[serde(rename = "DOP853")]
    Dop853,
    /// Adaptive Dormand–Prince 5(4).
    #[serde(rename = "RK45")]
    Rk45,
    /// Adaptive Bogacki–Shampine 3(2). Cheap steps, loose tolerances.
    #[serde(rename = "RK23")]
    Rk23,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Dop853, Method::Rk45, Method::Rk23];

    pub fn name(self) -> &'static str {
        match self {
            Method::Dop853 => "DOP853",
            Method::Rk45 => "RK45",
            Method::Rk23 => "RK23",
        }
    }

    /// Order of the propagated solution.
    pub fn order(self) -> u32 {
        match self {
            Method::Dop853 => 8,
            Method::Rk45 => 5,
            Method::Rk23 => 3,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Method::ALL
            .into_iter()
            .find(|method| method.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| SimulationError::UnknownMethod(s.to_string()))
    }
}

/// Local error tolerances for the adaptive step control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub rel_tol: f64,
    pub abs_tol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            rel_tol: 1e-6,
            abs_tol: 1e-9,
        }
    }
}

/// Work counters reported by a solver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolverStats {
    pub evaluations: u32,
    pub accepted_steps: u32,
    pub rejected_steps: u32,
}

/// Integrates `derivative` from `y0` at `grid[0]` and returns the state at every
/// grid time. `grid` must be evenly spaced, strictly increasing, with at least
/// two points.
pub(crate) fn solve_on_grid<F, const N: usize>(
    method: Method,
    derivative: &F,
    y0: [f64; N],
    grid: &[f64],
    tolerances: Tolerances,
    max_steps: usize,
) -> Result<(Vec<[f64; N]>, SolverStats), SimulationError>
where
    F: Fn(f64, [f64; N]) -> [f64; N],
{
    match method {
        Method::Dop853 | Method::Rk45 => {
            solve_dense(method, derivative, y0, grid, tolerances, max_steps)
        }
        Method::Rk23 => {
            let mut stepper = BogackiShampine::<N>::new(tolerances, max_steps);
            let mut state = y0;
            let mut states = Vec::with_capacity(grid.len());
            states.push(state);
            for window in grid.windows(2) {
                stepper.advance(derivative, window[0], window[1], &mut state)?;
                states.push(state);
            }
            Ok((states, stepper.stats()))
        }
    }
}

/// Adapts a plain derivative closure to the `ode_solvers` system trait.
struct ClosureSystem<'a, F> {
    derivative: &'a F,
}

impl<F, const N: usize> System<f64, SVector<f64, N>> for ClosureSystem<'_, F>
where
    F: Fn(f64, [f64; N]) -> [f64; N],
{
    fn system(&self, x: f64, y: &SVector<f64, N>, dy: &mut SVector<f64, N>) {
        let rates = (self.derivative)(x, (*y).into());
        *dy = SVector::from(rates);
    }
}

fn solve_dense<F, const N: usize>(
    method: Method,
    derivative: &F,
    y0: [f64; N],
    grid: &[f64],
    tolerances: Tolerances,
    max_steps: usize,
) -> Result<(Vec<[f64; N]>, SolverStats), SimulationError>
where
    F: Fn(f64, [f64; N]) -> [f64; N],
{
    let x_start = grid[0];
    let x_last = grid[grid.len() - 1];
    let dx = grid[1] - grid[0];
    // Run half a sample past the last grid time so it is never lost to the
    // rounding of the dense-output cursor.
    let x_end = x_last + 0.5 * dx;
    let system = ClosureSystem { derivative };
    let y_start = SVector::<f64, N>::from(y0);
    let Tolerances { rel_tol, abs_tol } = tolerances;
    let n_max = u32::try_from(max_steps).unwrap_or(u32::MAX);
    let h_max = x_end - x_start;

    // Step-control constants are the `ode_solvers` defaults of each method;
    // only the step budget differs.
    let integrated = match method {
        Method::Dop853 => {
            let mut stepper = ode_solvers::Dop853::from_param(
                system,
                x_start,
                x_end,
                dx,
                y_start,
                rel_tol,
                abs_tol,
                0.9,
                0.0,
                0.333,
                6.0,
                h_max,
                0.0,
                n_max,
                STIFFNESS_TEST_INTERVAL,
                OutputType::Dense,
            );
            let result = stepper.integrate();
            let reached = stepper.x_out().last().copied().unwrap_or(x_start);
            result
                .map(|stats| (stats, stepper.x_out().clone(), stepper.y_out().clone()))
                .map_err(|err| (reached, err.to_string()))
        }
        _ => {
            let mut stepper = ode_solvers::Dopri5::from_param(
                system,
                x_start,
                x_end,
                dx,
                y_start,
                rel_tol,
                abs_tol,
                0.9,
                0.04,
                0.2,
                10.0,
                h_max,
                0.0,
                n_max,
                STIFFNESS_TEST_INTERVAL,
                OutputType::Dense,
            );
            let result = stepper.integrate();
            let reached = stepper.x_out().last().copied().unwrap_or(x_start);
            result
                .map(|stats| (stats, stepper.x_out().clone(), stepper.y_out().clone()))
                .map_err(|err| (reached, err.to_string()))
        }
    };

    let (stats, x_out, y_out) = integrated.map_err(|(time, reason)| {
        warn!("{method} stopped near t = {time}: {reason}");
        SimulationError::IntegrationFailed { time, reason }
    })?;

    let stats = SolverStats {
        evaluations: stats.num_eval,
        accepted_steps: stats.accepted_steps,
        rejected_steps: stats.rejected_steps,
    };
    debug!(
        "{method} produced {} dense samples ({} evaluations)",
        x_out.len(),
        stats.evaluations
    );

    let states = match_grid(&x_out, &y_out, grid)?;
    Ok((states, stats))
}

/// Picks, for each grid time, the solver sample sitting on it. Samples off the
/// grid (a repeated initial point, for instance) are skipped.
fn match_grid<const N: usize>(
    x_out: &[f64],
    y_out: &[SVector<f64, N>],
    grid: &[f64],
) -> Result<Vec<[f64; N]>, SimulationError> {
    let span = grid[grid.len() - 1] - grid[0];
    let tolerance = 1e-9 * (1.0 + span.abs());
    let mut states = Vec::with_capacity(grid.len());

    for (&x, y) in x_out.iter().zip(y_out) {
        let Some(&target) = grid.get(states.len()) else {
            break;
        };
        if (x - target).abs() > tolerance {
            continue;
        }
        let state: [f64; N] = (*y).into();
        if state.iter().any(|value| !value.is_finite()) {
            return Err(SimulationError::IntegrationFailed {
                time: x,
                reason: "state became non-finite".to_string(),
            });
        }
        states.push(state);
    }

    if states.len() < grid.len() {
        return Err(SimulationError::IncompleteTrajectory {
            expected: grid.len(),
            produced: states.len(),
        });
    }
    Ok(states)
}

/// Bogacki–Shampine 3(2) with FSAL and a standard step-size controller.
///
/// The step is clipped so every call to [`BogackiShampine::advance`] lands
/// exactly on its target time; the step size carries over between calls.
pub struct BogackiShampine<const N: usize> {
    tolerances: Tolerances,
    max_steps: usize,
    h: f64,
    fsal: Option<[f64; N]>,
    stats: SolverStats,
}

impl<const N: usize> BogackiShampine<N> {
    const SAFETY: f64 = 0.9;
    const MIN_FACTOR: f64 = 0.2;
    const MAX_FACTOR: f64 = 10.0;

    pub fn new(tolerances: Tolerances, max_steps: usize) -> Self {
        Self {
            tolerances,
            max_steps,
            h: 0.0,
            fsal: None,
            stats: SolverStats::default(),
        }
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    fn eval<F>(&mut self, f: &F, t: f64, y: [f64; N]) -> [f64; N]
    where
        F: Fn(f64, [f64; N]) -> [f64; N],
    {
        self.stats.evaluations += 1;
        f(t, y)
    }

    fn scaled_norm(&self, values: &[f64; N], y: &[f64; N], y_new: &[f64; N]) -> f64 {
        let Tolerances { rel_tol, abs_tol } = self.tolerances;
        let mut sum = 0.0;
        for i in 0..N {
            let sc = abs_tol + rel_tol * y[i].abs().max(y_new[i].abs());
            sum += (values[i] / sc).powi(2);
        }
        (sum / N as f64).sqrt()
    }

    fn initial_step(&self, y: &[f64; N], k1: &[f64; N], span: f64) -> f64 {
        let d0 = self.scaled_norm(y, y, y);
        let d1 = self.scaled_norm(k1, y, y);
        let h = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        h.min(span)
    }

    /// Advances `y` from `t0` to `t1`.
    pub fn advance<F>(
        &mut self,
        f: &F,
        t0: f64,
        t1: f64,
        y: &mut [f64; N],
    ) -> Result<(), SimulationError>
    where
        F: Fn(f64, [f64; N]) -> [f64; N],
    {
        let mut t = t0;
        let mut k1 = match self.fsal {
            Some(k) => k,
            None => self.eval(f, t, *y),
        };
        if self.h <= 0.0 {
            self.h = self.initial_step(y, &k1, t1 - t0);
        }

        while t < t1 {
            let total = (self.stats.accepted_steps + self.stats.rejected_steps) as usize;
            if total >= self.max_steps {
                return Err(SimulationError::IntegrationFailed {
                    time: t,
                    reason: format!("exceeded {} steps", self.max_steps),
                });
            }
            if self.h < 1e-14 * t.abs().max(1.0) {
                return Err(SimulationError::IntegrationFailed {
                    time: t,
                    reason: "step size underflow".to_string(),
                });
            }

            let remaining = t1 - t;
            let lands = 1.01 * self.h >= remaining;
            let h = if lands { remaining } else { self.h };

            let mut tmp = [0.0; N];
            for i in 0..N {
                tmp[i] = y[i] + h * 0.5 * k1[i];
            }
            let k2 = self.eval(f, t + 0.5 * h, tmp);

            for i in 0..N {
                tmp[i] = y[i] + h * 0.75 * k2[i];
            }
            let k3 = self.eval(f, t + 0.75 * h, tmp);

            let mut y_new = [0.0; N];
            for i in 0..N {
                y_new[i] = y[i] + h * (2.0 / 9.0 * k1[i] + 1.0 / 3.0 * k2[i] + 4.0 / 9.0 * k3[i]);
            }
            let k4 = self.eval(f, t + h, y_new);

            // Difference between the 3rd- and embedded 2nd-order solutions.
            let mut err = [0.0; N];
            for i in 0..N {
                err[i] = h
                    * (-5.0 / 72.0 * k1[i] + 1.0 / 12.0 * k2[i] + 1.0 / 9.0 * k3[i]
                        - 1.0 / 8.0 * k4[i]);
            }
            let err_norm = self.scaled_norm(&err, y, &y_new);
            let finite = err_norm.is_finite() && y_new.iter().all(|v| v.is_finite());

            if finite && err_norm <= 1.0 {
                t = if lands { t1 } else { t + h };
                *y = y_new;
                k1 = k4;
                self.stats.accepted_steps += 1;
            } else {
                self.stats.rejected_steps += 1;
            }

            let factor = if !finite {
                Self::MIN_FACTOR
            } else if err_norm == 0.0 {
                Self::MAX_FACTOR
            } else {
                (Self::SAFETY * err_norm.powf(-1.0 / 3.0)).clamp(Self::MIN_FACTOR, Self::MAX_FACTOR)
            };
            self.h = h * factor;
        }

        self.fsal = Some(k1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(end: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| end * i as f64 / (n - 1) as f64).collect()
    }

    fn decay(_t: f64, y: [f64; 1]) -> [f64; 1] {
        [-y[0]]
    }

    fn rotation(_t: f64, y: [f64; 2]) -> [f64; 2] {
        [-y[1], y[0]]
    }

    #[test]
    fn method_names_round_trip_case_insensitively() {
        for method in Method::ALL {
            assert_eq!(method.name().parse::<Method>().unwrap(), method);
            assert_eq!(
                method.name().to_lowercase().parse::<Method>().unwrap(),
                method
            );
            assert_eq!(method.to_string(), method.name());
        }
        assert!(matches!(
            "LSODA".parse::<Method>(),
            Err(SimulationError::UnknownMethod(name)) if name == "LSODA"
        ));
        assert_eq!(Method::default(), Method::Dop853);
        assert!(Method::Dop853.order() > Method::Rk45.order());
        assert!(Method::Rk45.order() > Method::Rk23.order());
    }

    #[test]
    fn every_method_tracks_exponential_decay_on_grid() {
        let grid = linspace(5.0, 51);
        for method in Method::ALL {
            let (states, stats) =
                solve_on_grid(method, &decay, [1.0], &grid, Tolerances::default(), 100_000)
                    .expect("decay should integrate");
            assert_eq!(states.len(), grid.len(), "{method}");
            for (state, &t) in states.iter().zip(&grid) {
                let exact = (-t).exp();
                assert!(
                    (state[0] - exact).abs() < 1e-5,
                    "{method} at t={t}: {} vs {exact}",
                    state[0]
                );
            }
            assert!(stats.accepted_steps > 0, "{method}");
        }
    }

    #[test]
    fn every_method_keeps_rotation_on_unit_circle() {
        let grid = linspace(2.0 * std::f64::consts::PI, 101);
        for method in Method::ALL {
            let (states, _) =
                solve_on_grid(method, &rotation, [1.0, 0.0], &grid, Tolerances::default(), 100_000)
                    .expect("rotation should integrate");
            let last = states.last().expect("non-empty");
            assert!((last[0] - 1.0).abs() < 1e-4, "{method}: {last:?}");
            assert!(last[1].abs() < 1e-4, "{method}: {last:?}");
        }
    }

    #[test]
    fn bogacki_shampine_lands_exactly_and_reuses_step_size() {
        let mut stepper = BogackiShampine::<1>::new(Tolerances::default(), 10_000);
        let mut y = [1.0];
        stepper
            .advance(&decay, 0.0, 0.3, &mut y)
            .expect("first window");
        let after_first = stepper.stats();
        stepper
            .advance(&decay, 0.3, 0.6, &mut y)
            .expect("second window");
        assert!((y[0] - (-0.6f64).exp()).abs() < 1e-6);
        assert!(stepper.stats().evaluations > after_first.evaluations);
    }

    #[test]
    fn bogacki_shampine_reports_step_budget_exhaustion() {
        let mut stepper = BogackiShampine::<1>::new(Tolerances::default(), 3);
        let mut y = [1.0];
        let err = stepper
            .advance(&decay, 0.0, 100.0, &mut y)
            .expect_err("three steps cannot cover the window");
        assert!(err.is_integration_failure());
        assert!(err.to_string().contains("exceeded 3 steps"), "{err}");
    }

    #[test]
    fn blow_up_is_an_integration_failure() {
        // y' = y^2 from y(0) = 1 escapes to infinity at t = 1.
        let blow_up = |_t: f64, y: [f64; 1]| [y[0] * y[0]];
        let grid = linspace(2.0, 21);
        for method in Method::ALL {
            let err = solve_on_grid(method, &blow_up, [1.0], &grid, Tolerances::default(), 100_000)
                .expect_err("finite-time blow-up cannot be integrated");
            assert!(err.is_integration_failure(), "{method}: {err}");
        }
    }

    #[test]
    fn match_grid_skips_repeated_points_and_flags_short_output() {
        let grid = [0.0, 1.0, 2.0];
        let xs = [0.0, 0.0, 1.0, 2.0];
        let ys: Vec<SVector<f64, 1>> = [1.0, 1.0, 2.0, 3.0]
            .iter()
            .map(|&v| SVector::<f64, 1>::new(v))
            .collect();
        let states = match_grid(&xs, &ys, &grid).expect("all grid points present");
        assert_eq!(states, vec![[1.0], [2.0], [3.0]]);

        let err = match_grid(&xs[..3], &ys[..3], &grid).expect_err("last point missing");
        assert_eq!(
            err,
            SimulationError::IncompleteTrajectory {
                expected: 3,
                produced: 2
            }
        );
    }
}
