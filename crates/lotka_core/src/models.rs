//! Lotka-Volterra model variants.
//!
//! A [`Model`] wraps one of a closed set of parameter records ([`ModelParams`])
//! and exposes two operations: the derivative at a state and the analytically
//! known stability points.

use crate::error::{require_non_negative, require_positive, SimulationError};
use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of state variables: prey `V` and predator `P`.
pub const STATE_DIM: usize = 2;

/// Coefficients shared by every variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    /// `r`: prey reproduction rate.
    pub reproduction: f64,
    /// `a`: predation rate.
    pub predation: f64,
    /// `b`: conversion of predation into predator reproduction.
    pub conversion: f64,
    /// `m`: predator mortality.
    pub mortality: f64,
}

impl Rates {
    pub fn new(reproduction: f64, predation: f64, conversion: f64, mortality: f64) -> Self {
        Self {
            reproduction,
            predation,
            conversion,
            mortality,
        }
    }

    fn validate(&self) -> Result<(), SimulationError> {
        require_positive("reproduction", self.reproduction)?;
        require_positive("predation", self.predation)?;
        require_positive("conversion", self.conversion)?;
        require_positive("mortality", self.mortality)?;
        Ok(())
    }

    /// Prey level at which predators neither grow nor decline: `m / (a b)`.
    fn predator_nullcline(&self) -> f64 {
        self.mortality / (self.predation * self.conversion)
    }
}

impl Default for Rates {
    fn default() -> Self {
        Self::new(0.6, 0.4, 0.1, 0.4)
    }
}

/// Parameter record selecting a model variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    /// Classic predator-prey equations.
    Base { rates: Rates },
    /// Logistic prey growth bounded by environment `capacity` (`k`).
    LimitedEnvironment { rates: Rates, capacity: f64 },
    /// `shelters` (`s`) prey are out of the predators' reach.
    PreyShelters { rates: Rates, shelters: f64 },
}

impl ModelParams {
    pub fn rates(&self) -> &Rates {
        match self {
            ModelParams::Base { rates }
            | ModelParams::LimitedEnvironment { rates, .. }
            | ModelParams::PreyShelters { rates, .. } => rates,
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelParams::Base { .. } => ModelKind::Base,
            ModelParams::LimitedEnvironment { .. } => ModelKind::LimitedEnvironment,
            ModelParams::PreyShelters { .. } => ModelKind::PreyShelters,
        }
    }

    fn validate(&self) -> Result<(), SimulationError> {
        self.rates().validate()?;
        match *self {
            ModelParams::Base { .. } => Ok(()),
            ModelParams::LimitedEnvironment { capacity, .. } => {
                require_positive("capacity", capacity)
            }
            ModelParams::PreyShelters { shelters, .. } => {
                require_non_negative("shelters", shelters)
            }
        }
    }
}

/// Variant tag without parameters, used to pick a model by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Base,
    LimitedEnvironment,
    PreyShelters,
}

impl ModelKind {
    /// Builds the parameter record for this kind. `extra` is the capacity for
    /// the limited environment and the shelter count for prey shelters; the
    /// base model ignores it.
    pub fn with_rates(self, rates: Rates, extra: f64) -> ModelParams {
        match self {
            ModelKind::Base => ModelParams::Base { rates },
            ModelKind::LimitedEnvironment => ModelParams::LimitedEnvironment {
                rates,
                capacity: extra,
            },
            ModelKind::PreyShelters => ModelParams::PreyShelters {
                rates,
                shelters: extra,
            },
        }
    }
}

impl FromStr for ModelKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "base" | "base_model" => Ok(ModelKind::Base),
            "limited_environment" | "limited" => Ok(ModelKind::LimitedEnvironment),
            "prey_shelters" | "shelters" => Ok(ModelKind::PreyShelters),
            _ => Err(SimulationError::UnknownModel(s.to_string())),
        }
    }
}

/// An analytically derived state where the derivative vanishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityPoint {
    pub prey: f64,
    pub predator: f64,
    pub label: String,
}

impl StabilityPoint {
    fn new(prey: f64, predator: f64, label: &str) -> Self {
        Self {
            prey,
            predator,
            label: label.to_string(),
        }
    }

    pub fn state(&self) -> [f64; STATE_DIM] {
        [self.prey, self.predator]
    }
}

/// A validated model variant. Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Model {
    params: ModelParams,
}

impl Model {
    /// Validates the parameters and builds the model.
    pub fn new(params: ModelParams) -> Result<Self, SimulationError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn kind(&self) -> ModelKind {
        self.params.kind()
    }

    /// `(dV/dt, dP/dt)` at `state = [V, P]`.
    pub fn derivative(&self, state: [f64; STATE_DIM]) -> [f64; STATE_DIM] {
        let (dv, dp) = self.rates_at(state[0], state[1]);
        [dv, dp]
    }

    fn rates_at<T: Scalar>(&self, v: T, p: T) -> (T, T) {
        let c = |x: f64| T::from_f64(x).unwrap_or_else(T::nan);
        let rates = self.params.rates();
        let r = c(rates.reproduction);
        let a = c(rates.predation);
        let b = c(rates.conversion);
        let m = c(rates.mortality);

        match self.params {
            ModelParams::Base { .. } => (r * v - a * v * p, -m * p + a * b * v * p),
            ModelParams::LimitedEnvironment { capacity, .. } => {
                let k = c(capacity);
                (
                    r * v * (T::one() - v / k) - a * v * p,
                    -m * p + a * b * v * p,
                )
            }
            ModelParams::PreyShelters { shelters, .. } => {
                // Below `s` the catchable pool is negative; kept as the model states it.
                let exposed = v - c(shelters);
                (r * v - a * exposed * p, -m * p + a * b * exposed * p)
            }
        }
    }

    /// Row-major Jacobian `[dV'/dV, dV'/dP, dP'/dV, dP'/dP]` at `state`.
    pub fn jacobian(&self, state: [f64; STATE_DIM]) -> [f64; 4] {
        let [v, p] = state;
        let Rates {
            reproduction: r,
            predation: a,
            conversion: b,
            mortality: m,
        } = *self.params.rates();

        match self.params {
            ModelParams::Base { .. } => [r - a * p, -a * v, a * b * p, -m + a * b * v],
            ModelParams::LimitedEnvironment { capacity: k, .. } => [
                r * (1.0 - 2.0 * v / k) - a * p,
                -a * v,
                a * b * p,
                -m + a * b * v,
            ],
            ModelParams::PreyShelters { shelters: s, .. } => [
                r - a * p,
                -a * (v - s),
                a * b * p,
                -m + a * b * (v - s),
            ],
        }
    }

    /// Origin first, then the variant-specific equilibria.
    pub fn stability_points(&self) -> Vec<StabilityPoint> {
        let rates = self.params.rates();
        let r = rates.reproduction;
        let a = rates.predation;
        let b = rates.conversion;
        let m = rates.mortality;
        let prey_star = rates.predator_nullcline();

        let mut points = vec![StabilityPoint::new(0.0, 0.0, "origin")];
        match self.params {
            ModelParams::Base { .. } => {
                points.push(StabilityPoint::new(prey_star, r / a, "coexistence"));
            }
            ModelParams::LimitedEnvironment { capacity: k, .. } => {
                points.push(StabilityPoint::new(k, 0.0, "full environment"));
                points.push(StabilityPoint::new(
                    prey_star,
                    (r / a) * (1.0 - prey_star / k),
                    "coexistence",
                ));
            }
            ModelParams::PreyShelters { shelters: s, .. } => {
                points.push(StabilityPoint::new(
                    s + prey_star,
                    r * (1.0 / a + b * s / m),
                    "coexistence",
                ));
            }
        }
        points
    }
}

impl<T: Scalar> DynamicalSystem<T> for Model {
    fn dimension(&self) -> usize {
        STATE_DIM
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let (dv, dp) = self.rates_at(x[0], x[1]);
        out[0] = dv;
        out[1] = dp;
    }
}
