use crate::models::{Model, StabilityPoint, STATE_DIM};
use crate::traits::DynamicalSystem;
use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use nalgebra::linalg::SVD;
use nalgebra::DMatrix;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Relative threshold below which a real part counts as zero.
const HYPERBOLIC_TOLERANCE: f64 = 1e-9;

/// Linear stability of an equilibrium, read off the Jacobian spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Saddle,
    /// Purely imaginary pair: closed orbits around the point.
    Center,
    StableNode,
    StableFocus,
    UnstableNode,
    UnstableFocus,
    /// A zero eigenvalue; linearization decides nothing.
    NonHyperbolic,
}

impl Stability {
    fn classify(eigenvalues: &[Complex<f64>]) -> Self {
        let scale = 1.0 + eigenvalues.iter().map(|l| l.norm()).fold(0.0, f64::max);
        let tol = HYPERBOLIC_TOLERANCE * scale;
        let on_axis = |l: &Complex<f64>| l.re.abs() <= tol;
        let oscillating = eigenvalues.iter().any(|l| l.im.abs() > tol);

        if eigenvalues.iter().any(on_axis) {
            return if oscillating && eigenvalues.iter().all(on_axis) {
                Stability::Center
            } else {
                Stability::NonHyperbolic
            };
        }

        let stable = eigenvalues.iter().filter(|l| l.re < 0.0).count();
        match (stable, oscillating) {
            (n, _) if n != 0 && n != eigenvalues.len() => Stability::Saddle,
            (0, true) => Stability::UnstableFocus,
            (0, false) => Stability::UnstableNode,
            (_, true) => Stability::StableFocus,
            (_, false) => Stability::StableNode,
        }
    }

    pub fn is_stable(self) -> bool {
        matches!(self, Stability::StableNode | Stability::StableFocus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexNumber {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f64>> for ComplexNumber {
    fn from(value: Complex<f64>) -> Self {
        Self {
            re: value.re,
            im: value.im,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenPair {
    pub value: ComplexNumber,
    /// Unit-norm eigenvector.
    pub vector: Vec<ComplexNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumReport {
    pub point: StabilityPoint,
    /// `‖f(V*, P*)‖₂`; zero up to rounding for every analytic point.
    pub residual_norm: f64,
    /// Row-major 2×2 Jacobian at the point.
    pub jacobian: Vec<f64>,
    pub eigenpairs: Vec<EigenPair>,
    pub stability: Stability,
    /// Nearby trajectories converge to the point.
    pub stable: bool,
}

/// Linearizes `model` at each of its stability points.
pub fn classify_stability_points(model: &Model) -> Result<Vec<EquilibriumReport>> {
    model
        .stability_points()
        .into_iter()
        .map(|point| {
            let label = point.label.clone();
            classify_point(model, point)
                .with_context(|| format!("Failed to classify the {label} equilibrium."))
        })
        .collect()
}

/// Linearizes `model` at an arbitrary state.
pub fn classify_point(model: &Model, point: StabilityPoint) -> Result<EquilibriumReport> {
    let state = point.state();
    if state.iter().any(|x| !x.is_finite()) {
        bail!("Equilibrium state {state:?} is not finite.");
    }

    let mut residual = [0.0; STATE_DIM];
    DynamicalSystem::<f64>::apply(model, 0.0, &state, &mut residual);
    let residual_norm = residual.iter().map(|r| r * r).sum::<f64>().sqrt();

    let jacobian = model.jacobian(state).to_vec();
    let eigenpairs = compute_eigenpairs(STATE_DIM, &jacobian)
        .context("Failed to compute eigenvalues/eigenvectors of Jacobian.")?;
    let eigenvalues: Vec<Complex<f64>> = eigenpairs
        .iter()
        .map(|pair| Complex::new(pair.value.re, pair.value.im))
        .collect();
    let stability = Stability::classify(&eigenvalues);

    debug!(
        "{} equilibrium at ({}, {}) is {:?}",
        point.label, point.prey, point.predator, stability
    );

    Ok(EquilibriumReport {
        point,
        residual_norm,
        jacobian,
        eigenpairs,
        stability,
        stable: stability.is_stable(),
    })
}

fn compute_eigenpairs(dim: usize, jacobian: &[f64]) -> Result<Vec<EigenPair>> {
    let matrix = DMatrix::from_row_slice(dim, dim, jacobian);
    let eigenvalues = matrix.complex_eigenvalues();
    if eigenvalues.iter().any(|l| !l.re.is_finite() || !l.im.is_finite()) {
        bail!("Jacobian spectrum is not finite.");
    }
    let complex_matrix = matrix.map(|v| Complex::new(v, 0.0));

    eigenvalues
        .iter()
        .enumerate()
        .map(|(idx, &lambda)| {
            let mut shifted = complex_matrix.clone();
            for i in 0..dim {
                shifted[(i, i)] -= lambda;
            }

            // The null direction of `J - λI` is the right singular vector of
            // the smallest singular value.
            let svd = SVD::new(shifted, true, true);
            let null_index = svd
                .singular_values
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map_or(0, |(i, _)| i);
            let v_t = svd
                .v_t
                .ok_or_else(|| anyhow!("No eigenvector for eigenvalue index {idx}."))?;
            let row = v_t.row(null_index);
            let mut vector: Vec<Complex<f64>> = row.iter().map(|c| c.conj()).collect();
            normalize(&mut vector);

            Ok(EigenPair {
                value: lambda.into(),
                vector: vector.into_iter().map(ComplexNumber::from).collect(),
            })
        })
        .collect()
}

fn normalize(vector: &mut [Complex<f64>]) {
    let norm = vector.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        for entry in vector {
            *entry /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelParams, Rates};

    fn reports(params: ModelParams) -> Vec<EquilibriumReport> {
        let model = Model::new(params).expect("valid model");
        classify_stability_points(&model).expect("classification succeeds")
    }

    fn by_label<'a>(reports: &'a [EquilibriumReport], label: &str) -> &'a EquilibriumReport {
        reports
            .iter()
            .find(|r| r.point.label == label)
            .unwrap_or_else(|| panic!("missing {label}"))
    }

    fn assert_eigenvectors(report: &EquilibriumReport) {
        let j = &report.jacobian;
        for pair in &report.eigenpairs {
            let lambda = Complex::new(pair.value.re, pair.value.im);
            let v: Vec<Complex<f64>> = pair
                .vector
                .iter()
                .map(|c| Complex::new(c.re, c.im))
                .collect();
            for row in 0..2 {
                let jv = v[0] * j[row * 2] + v[1] * j[row * 2 + 1];
                assert!((jv - lambda * v[row]).norm() < 1e-8, "{report:?}");
            }
        }
    }

    #[test]
    fn base_model_has_saddle_origin_and_center_coexistence() {
        let reports = reports(ModelParams::Base {
            rates: Rates::default(),
        });
        assert_eq!(reports.len(), 2);

        let origin = by_label(&reports, "origin");
        assert_eq!(origin.stability, Stability::Saddle);
        assert_eq!(origin.residual_norm, 0.0);

        let coexistence = by_label(&reports, "coexistence");
        assert_eq!(coexistence.stability, Stability::Center);
        assert!(coexistence.residual_norm < 1e-12);
        // Eigenvalues ±i√(r m).
        let omega = (0.6f64 * 0.4).sqrt();
        for pair in &coexistence.eigenpairs {
            assert!(pair.value.re.abs() < 1e-9);
            assert!((pair.value.im.abs() - omega).abs() < 1e-9);
        }
        for report in &reports {
            assert_eigenvectors(report);
        }
    }

    #[test]
    fn limited_environment_reference_classification() {
        let reports = reports(ModelParams::LimitedEnvironment {
            rates: Rates::default(),
            capacity: 100.0,
        });
        assert_eq!(reports.len(), 3);
        assert_eq!(by_label(&reports, "origin").stability, Stability::Saddle);
        assert_eq!(
            by_label(&reports, "full environment").stability,
            Stability::Saddle
        );

        let coexistence = by_label(&reports, "coexistence");
        assert_eq!(coexistence.stability, Stability::StableFocus);
        assert!(coexistence.stable);
        assert!(!by_label(&reports, "full environment").stable);
        let j = &coexistence.jacobian;
        assert!((j[0] + j[3] + 0.06).abs() < 1e-12);
        assert!((j[0] * j[3] - j[1] * j[2] - 0.216).abs() < 1e-12);
        for report in &reports {
            assert!(report.residual_norm < 1e-12);
            assert_eigenvectors(report);
        }
    }

    #[test]
    fn full_environment_is_stable_when_predators_cannot_persist() {
        // a b k = 0.2 < m: prey saturates and predators die out.
        let reports = reports(ModelParams::LimitedEnvironment {
            rates: Rates::default(),
            capacity: 5.0,
        });
        assert_eq!(
            by_label(&reports, "full environment").stability,
            Stability::StableNode
        );
    }

    #[test]
    fn shelter_coexistence_is_a_stable_focus() {
        let reports = reports(ModelParams::PreyShelters {
            rates: Rates::default(),
            shelters: 2.0,
        });
        assert_eq!(by_label(&reports, "origin").stability, Stability::Saddle);
        let coexistence = by_label(&reports, "coexistence");
        assert_eq!(coexistence.stability, Stability::StableFocus);
        assert!(coexistence.residual_norm < 1e-12);
    }

    #[test]
    fn spectrum_classification_covers_every_case() {
        let c = |re: f64, im: f64| Complex::new(re, im);
        assert_eq!(
            Stability::classify(&[c(1.0, 0.0), c(-1.0, 0.0)]),
            Stability::Saddle
        );
        assert_eq!(
            Stability::classify(&[c(0.0, 2.0), c(0.0, -2.0)]),
            Stability::Center
        );
        assert_eq!(
            Stability::classify(&[c(-1.0, 0.0), c(-2.0, 0.0)]),
            Stability::StableNode
        );
        assert_eq!(
            Stability::classify(&[c(-0.1, 1.0), c(-0.1, -1.0)]),
            Stability::StableFocus
        );
        assert_eq!(
            Stability::classify(&[c(1.0, 0.0), c(2.0, 0.0)]),
            Stability::UnstableNode
        );
        assert_eq!(
            Stability::classify(&[c(0.1, 1.0), c(0.1, -1.0)]),
            Stability::UnstableFocus
        );
        assert_eq!(
            Stability::classify(&[c(0.0, 0.0), c(-1.0, 0.0)]),
            Stability::NonHyperbolic
        );
    }

    #[test]
    fn report_serializes_stability_in_snake_case() {
        let reports = reports(ModelParams::Base {
            rates: Rates::default(),
        });
        let json = serde_json::to_value(&reports).expect("serializable");
        assert_eq!(json[0]["stability"], "saddle");
        assert_eq!(json[0]["stable"], false);
        assert_eq!(json[1]["stable"], false);
        assert_eq!(json[1]["point"]["label"], "coexistence");
    }
}
