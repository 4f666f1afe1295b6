//! WASM bindings for the predator-prey simulator.
//!
//! `WasmPredatorPrey` holds one validated model and a solver choice. Its
//! methods are split by concern: trajectories in `system`, cycle statistics in
//! `analysis`, and stability points in `equilibrium`. Every method returns a
//! serde-serialized payload or a `JsValue` error string.

mod analysis;
mod equilibrium;
mod system;

pub use system::WasmPredatorPrey;
