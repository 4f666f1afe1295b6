//! Combined simulation and cycle analysis.

use crate::system::{run_simulation, serialize, to_js_error, WasmPredatorPrey};
use anyhow::Result;
use lotka_core::analysis::{analyze, AnalysisSettings, CycleReport};
use lotka_core::{InitialPopulations, Method, Model, Trajectory};
use serde::Serialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzedRun {
    pub trajectory: Trajectory,
    pub report: CycleReport,
}

pub(crate) fn simulate_and_analyze_run(
    model: &Model,
    method: Method,
    initial: InitialPopulations,
    horizon: f64,
    resolution: u32,
    settings: AnalysisSettings,
) -> Result<AnalyzedRun> {
    let trajectory = run_simulation(model, method, initial, horizon, resolution)?;
    let report = analyze(&trajectory, &settings);
    Ok(AnalyzedRun { trajectory, report })
}

#[wasm_bindgen]
impl WasmPredatorPrey {
    /// Simulates and attaches the cycle report. Non-positive thresholds fall
    /// back to the defaults.
    pub fn simulate_and_analyze(
        &self,
        prey: f64,
        predator: f64,
        horizon: f64,
        resolution: u32,
        relative_epsilon: f64,
        absolute_epsilon: f64,
    ) -> Result<JsValue, JsValue> {
        let defaults = AnalysisSettings::default();
        let settings = AnalysisSettings {
            relative_epsilon: positive_or(relative_epsilon, defaults.relative_epsilon),
            absolute_epsilon: positive_or(absolute_epsilon, defaults.absolute_epsilon),
        };
        let run = simulate_and_analyze_run(
            &self.model,
            self.method,
            InitialPopulations::new(prey, predator),
            horizon,
            resolution,
            settings,
        )
        .map_err(to_js_error)?;
        serialize(&run)
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        fallback
    }
}
