//! The `lotka_core` crate is the numerical engine of the predator-prey simulator.
//!
//! Key components:
//! - **Models**: the base, limited-environment and prey-shelter Lotka-Volterra
//!   variants with their analytic stability points and Jacobians.
//! - **Simulation**: sampling of `[0, T]` on an exact time grid with the
//!   `DOP853`, `RK45` or `RK23` integrators.
//! - **Analysis**: peak-based period, per-cycle average and maximum, and
//!   stabilization detection.
//! - **Equilibrium**: linear stability classification of the stability points.
pub mod analysis;
pub mod equilibrium;
pub mod error;
pub mod models;
pub mod simulation;
pub mod solvers;
pub mod traits;
pub mod trajectory;

pub use error::SimulationError;
pub use models::{Model, ModelKind, ModelParams, Rates, StabilityPoint};
pub use simulation::{integrate, simulate, InitialPopulations, SimulationSettings};
pub use solvers::{Method, Tolerances};
pub use trajectory::Trajectory;
