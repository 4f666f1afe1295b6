use thiserror::Error;

/// Failures raised while building a model or integrating a trajectory.
///
/// Too-short signals are not errors: the cycle analyzer reports them as `None`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// A coefficient or setting lies outside its domain. Raised before any
    /// integration is attempted.
    #[error("Invalid parameter `{name}` = {value}: {reason}.")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Unknown integration method \"{0}\". Expected one of DOP853, RK45, RK23.")]
    UnknownMethod(String),

    #[error("Unknown model \"{0}\". Expected one of base, limited_environment, prey_shelters.")]
    UnknownModel(String),

    /// The solver stopped or produced a non-finite state.
    #[error("Integration failed at t = {time}: {reason}")]
    IntegrationFailed { time: f64, reason: String },

    /// The solver finished but did not cover every requested sample.
    #[error("Integration produced {produced} samples, expected {expected}.")]
    IncompleteTrajectory { expected: usize, produced: usize },
}

impl SimulationError {
    /// True for failures that come from the solver rather than from the inputs.
    pub fn is_integration_failure(&self) -> bool {
        matches!(
            self,
            SimulationError::IntegrationFailed { .. } | SimulationError::IncompleteTrajectory { .. }
        )
    }
}

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<(), SimulationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SimulationError::InvalidParameter {
            name,
            value,
            reason: "must be finite and strictly positive",
        });
    }
    Ok(())
}

pub(crate) fn require_non_negative(name: &'static str, value: f64) -> Result<(), SimulationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SimulationError::InvalidParameter {
            name,
            value,
            reason: "must be finite and non-negative",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_check_rejects_zero_negative_and_nan() {
        assert!(require_positive("r", 0.5).is_ok());
        assert!(require_positive("r", 0.0).is_err());
        assert!(require_positive("r", -1.0).is_err());
        assert!(require_positive("r", f64::NAN).is_err());
        assert!(require_positive("r", f64::INFINITY).is_err());
    }

    #[test]
    fn non_negative_check_accepts_zero() {
        assert!(require_non_negative("s", 0.0).is_ok());
        assert!(require_non_negative("s", -0.1).is_err());
    }

    #[test]
    fn integration_failures_are_distinguishable() {
        let failed = SimulationError::IntegrationFailed {
            time: 1.0,
            reason: "step size underflow".into(),
        };
        let short = SimulationError::IncompleteTrajectory {
            expected: 10,
            produced: 3,
        };
        let invalid = SimulationError::InvalidParameter {
            name: "k",
            value: 0.0,
            reason: "must be finite and strictly positive",
        };
        assert!(failed.is_integration_failure());
        assert!(short.is_integration_failure());
        assert!(!invalid.is_integration_failure());
        assert_eq!(
            invalid.to_string(),
            "Invalid parameter `k` = 0: must be finite and strictly positive."
        );
    }
}
