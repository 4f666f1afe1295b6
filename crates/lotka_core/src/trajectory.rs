use serde::Serialize;

/// Sampled output of one integration run.
///
/// Times are strictly increasing and the three series always have equal
/// length. Built only by the integrator, so the invariants hold for every value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    time: Vec<f64>,
    prey: Vec<f64>,
    predator: Vec<f64>,
}

impl Trajectory {
    pub(crate) fn from_samples(time: Vec<f64>, prey: Vec<f64>, predator: Vec<f64>) -> Self {
        debug_assert_eq!(time.len(), prey.len());
        debug_assert_eq!(time.len(), predator.len());
        debug_assert!(time.windows(2).all(|w| w[0] < w[1]));
        Self {
            time,
            prey,
            predator,
        }
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn prey(&self) -> &[f64] {
        &self.prey
    }

    pub fn predator(&self) -> &[f64] {
        &self.predator
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// `(t, V, P)` triples in time order.
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.time
            .iter()
            .zip(&self.prey)
            .zip(&self.predator)
            .map(|((&t, &v), &p)| (t, v, p))
    }

    /// The last sample, if any.
    pub fn final_state(&self) -> Option<(f64, f64, f64)> {
        self.samples().last()
    }
}
