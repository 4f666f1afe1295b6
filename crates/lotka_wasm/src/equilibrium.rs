//! Stability points and their linear classification.

use crate::system::{serialize, WasmPredatorPrey};
use lotka_core::equilibrium::classify_stability_points;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
impl WasmPredatorPrey {
    pub fn stability_points(&self) -> Result<JsValue, JsValue> {
        serialize(&self.model.stability_points())
    }

    pub fn equilibria(&self) -> Result<JsValue, JsValue> {
        let reports = classify_stability_points(&self.model).map_err(|e| {
            JsValue::from_str(&format!("Equilibrium classification failed: {:#}", e))
        })?;
        serialize(&reports)
    }
}
