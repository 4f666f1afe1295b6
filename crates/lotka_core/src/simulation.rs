//! Sampled integration of a population model over `[0, T]`.

use crate::error::{require_positive, SimulationError};
use crate::models::{Model, STATE_DIM};
use crate::solvers::{solve_on_grid, Method, SolverStats, Tolerances};
use crate::trajectory::Trajectory;
use log::debug;
use serde::{Deserialize, Serialize};

/// Starting prey and predator counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialPopulations {
    pub prey: f64,
    pub predator: f64,
}

impl InitialPopulations {
    pub fn new(prey: f64, predator: f64) -> Self {
        Self { prey, predator }
    }

    fn validate(&self) -> Result<[f64; STATE_DIM], SimulationError> {
        require_positive("initial prey", self.prey)?;
        require_positive("initial predator", self.predator)?;
        Ok([self.prey, self.predator])
    }
}

impl Default for InitialPopulations {
    fn default() -> Self {
        Self::new(10.0, 5.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Time horizon `T`.
    pub horizon: f64,
    /// Samples per unit time.
    pub resolution: u32,
    pub method: Method,
    pub tolerances: Tolerances,
    /// Step budget, accepted and rejected steps together, for every method.
    pub max_steps: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            horizon: 50.0,
            resolution: 5,
            method: Method::Dop853,
            tolerances: Tolerances::default(),
            max_steps: 100_000,
        }
    }
}

impl SimulationSettings {
    /// Number of output samples: `trunc(T × resolution)`.
    pub fn sample_count(&self) -> usize {
        (self.horizon * f64::from(self.resolution)).trunc() as usize
    }

    /// Evenly spaced sample times over `[0, T]`, both ends included.
    pub fn time_grid(&self) -> Vec<f64> {
        let n = self.sample_count();
        match n {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => {
                let last = (n - 1) as f64;
                (0..n)
                    .map(|i| self.horizon * i as f64 / last)
                    .collect()
            }
        }
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        require_positive("horizon", self.horizon)?;
        if self.resolution == 0 {
            return Err(SimulationError::InvalidParameter {
                name: "resolution",
                value: 0.0,
                reason: "must be at least one sample per unit time",
            });
        }
        if self.sample_count() < 2 {
            return Err(SimulationError::InvalidParameter {
                name: "horizon",
                value: self.horizon,
                reason: "horizon × resolution must give at least two samples",
            });
        }
        require_positive("rel_tol", self.tolerances.rel_tol)?;
        require_positive("abs_tol", self.tolerances.abs_tol)?;
        if self.max_steps == 0 {
            return Err(SimulationError::InvalidParameter {
                name: "max_steps",
                value: 0.0,
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// Integrates an explicit derivative closure `(t, [V, P]) -> [dV, dP]`.
///
/// Returns exactly [`SimulationSettings::sample_count`] samples or an
/// integration error; a partial trajectory is never returned.
pub fn integrate<F>(
    derivative: F,
    initial: InitialPopulations,
    settings: &SimulationSettings,
) -> Result<Trajectory, SimulationError>
where
    F: Fn(f64, [f64; STATE_DIM]) -> [f64; STATE_DIM],
{
    integrate_with_stats(derivative, initial, settings).map(|(trajectory, _)| trajectory)
}

/// Same as [`integrate`], also returning the solver's work counters.
pub fn integrate_with_stats<F>(
    derivative: F,
    initial: InitialPopulations,
    settings: &SimulationSettings,
) -> Result<(Trajectory, SolverStats), SimulationError>
where
    F: Fn(f64, [f64; STATE_DIM]) -> [f64; STATE_DIM],
{
    let y0 = initial.validate()?;
    settings.validate()?;

    let grid = settings.time_grid();
    debug!(
        "integrating to T = {} with {} (order {}, {} samples)",
        settings.horizon,
        settings.method,
        settings.method.order(),
        grid.len()
    );

    let (states, stats) = solve_on_grid(
        settings.method,
        &derivative,
        y0,
        &grid,
        settings.tolerances,
        settings.max_steps,
    )?;

    if states.len() != grid.len() {
        return Err(SimulationError::IncompleteTrajectory {
            expected: grid.len(),
            produced: states.len(),
        });
    }
    debug!(
        "{}: {} evaluations, {} accepted / {} rejected steps",
        settings.method, stats.evaluations, stats.accepted_steps, stats.rejected_steps
    );

    let (prey, predator): (Vec<f64>, Vec<f64>) = states.into_iter().map(|[v, p]| (v, p)).unzip();
    Ok((Trajectory::from_samples(grid, prey, predator), stats))
}

/// Integrates `model` from `initial`.
pub fn simulate(
    model: &Model,
    initial: InitialPopulations,
    settings: &SimulationSettings,
) -> Result<Trajectory, SimulationError> {
    integrate(move |_t, state| model.derivative(state), initial, settings)
}
