//! Model construction and trajectory sampling.

use anyhow::{anyhow, Context, Result};
use js_sys::Float64Array;
use lotka_core::simulation::simulate;
use lotka_core::{
    InitialPopulations, Method, Model, ModelKind, Rates, SimulationSettings, Trajectory,
};
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmPredatorPrey {
    pub(crate) model: Model,
    pub(crate) method: Method,
}

/// Builds a validated model from a variant name, `[r, a, b, m]` and the
/// variant's extra parameter (capacity or shelters; ignored by `base`).
pub(crate) fn build_model(model_kind: &str, rates: &[f64], extra: f64) -> Result<Model> {
    let kind: ModelKind = model_kind.parse()?;
    let [reproduction, predation, conversion, mortality] = <[f64; 4]>::try_from(rates)
        .map_err(|_| anyhow!("Expected 4 rates (r, a, b, m), got {}.", rates.len()))?;
    let rates = Rates::new(reproduction, predation, conversion, mortality);
    Model::new(kind.with_rates(rates, extra))
        .with_context(|| format!("Invalid parameters for the {model_kind} model."))
}

pub(crate) fn run_simulation(
    model: &Model,
    method: Method,
    initial: InitialPopulations,
    horizon: f64,
    resolution: u32,
) -> Result<Trajectory> {
    let settings = SimulationSettings {
        horizon,
        resolution,
        method,
        ..SimulationSettings::default()
    };
    simulate(model, initial, &settings).with_context(|| format!("{method} integration failed."))
}

/// Interleaved `[dV₀, dP₀, dV₁, dP₁, ...]` at the given phase-plane points.
pub(crate) fn vector_field_values(
    model: &Model,
    prey: &[f64],
    predator: &[f64],
) -> Result<Vec<f64>> {
    if prey.len() != predator.len() {
        return Err(anyhow!(
            "Prey and predator grids differ in length ({} vs {}).",
            prey.len(),
            predator.len()
        ));
    }
    Ok(prey
        .iter()
        .zip(predator)
        .flat_map(|(&v, &p)| model.derivative([v, p]))
        .collect())
}

pub(crate) fn to_js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{err:#}"))
}

pub(crate) fn serialize<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
impl WasmPredatorPrey {
    #[wasm_bindgen(constructor)]
    pub fn new(
        model_kind: &str,
        rates: Vec<f64>,
        extra: f64,
        solver_name: &str,
    ) -> Result<WasmPredatorPrey, JsValue> {
        console_error_panic_hook::set_once();

        let model = build_model(model_kind, &rates, extra).map_err(to_js_error)?;
        let method: Method = solver_name
            .parse()
            .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
        Ok(WasmPredatorPrey { model, method })
    }

    pub fn solver_name(&self) -> String {
        self.method.name().to_string()
    }

    pub fn set_solver(&mut self, solver_name: &str) -> Result<(), JsValue> {
        self.method = solver_name
            .parse()
            .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
        Ok(())
    }

    /// Samples `[0, horizon]` at `resolution` points per unit time.
    pub fn simulate(
        &self,
        prey: f64,
        predator: f64,
        horizon: f64,
        resolution: u32,
    ) -> Result<JsValue, JsValue> {
        let trajectory = run_simulation(
            &self.model,
            self.method,
            InitialPopulations::new(prey, predator),
            horizon,
            resolution,
        )
        .map_err(to_js_error)?;
        serialize(&trajectory)
    }

    pub fn vector_field(&self, prey: &[f64], predator: &[f64]) -> Result<Float64Array, JsValue> {
        let values = vector_field_values(&self.model, prey, predator).map_err(to_js_error)?;
        Ok(Float64Array::from(values.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected an error");
        let message = format!("{err:#}");
        assert!(
            message.contains(needle),
            "expected error containing {needle:?}, got {message:?}"
        );
    }

    #[test]
    fn builds_each_variant_by_name() {
        let rates = [0.6, 0.4, 0.1, 0.4];
        for (name, points) in [("base", 2), ("limited_environment", 3), ("prey_shelters", 2)] {
            let model = build_model(name, &rates, 100.0).expect("valid model");
            assert_eq!(model.stability_points().len(), points, "{name}");
        }
    }

    #[test]
    fn rejects_bad_names_rate_counts_and_values() {
        let rates = [0.6, 0.4, 0.1, 0.4];
        assert_err_contains(build_model("logistic", &rates, 0.0), "logistic");
        assert_err_contains(build_model("base", &rates[..3], 0.0), "Expected 4 rates");
        assert_err_contains(build_model("limited_environment", &rates, 0.0), "capacity");
        assert_err_contains(build_model("base", &[0.6, -0.4, 0.1, 0.4], 0.0), "predation");
    }

    #[test]
    fn simulation_returns_requested_sample_count() {
        let model = build_model("base", &[0.6, 0.4, 0.1, 0.4], 0.0).expect("valid model");
        for method in Method::ALL {
            let trajectory = run_simulation(&model, method, InitialPopulations::default(), 50.0, 5)
                .expect("integration succeeds");
            assert_eq!(trajectory.len(), 250);
        }
        assert_err_contains(
            run_simulation(&model, Method::Rk23, InitialPopulations::new(-1.0, 5.0), 50.0, 5),
            "initial prey",
        );
    }

    #[test]
    fn vector_field_interleaves_derivatives() {
        let model = build_model("base", &[0.6, 0.4, 0.1, 0.4], 0.0).expect("valid model");
        let values = vector_field_values(&model, &[10.0, 0.0], &[1.5, 2.0]).expect("matched grids");
        assert_eq!(values.len(), 4);
        assert!(values[0].abs() < 1e-12 && values[1].abs() < 1e-12);
        assert_eq!(values[2], 0.0);
        assert!((values[3] + 0.8).abs() < 1e-12);
        assert_err_contains(vector_field_values(&model, &[1.0], &[]), "differ in length");
    }
}
