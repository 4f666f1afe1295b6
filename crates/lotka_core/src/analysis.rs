//! Peak-based cycle statistics for oscillating population signals.
//!
//! Lotka-Volterra trajectories are periodic or quasi-periodic, so statistics
//! are taken per cycle, with cycle boundaries anchored on signal peaks.
//! Too few peaks is an expected outcome and is reported as `None`.
//!
//! Every function receives the signal whose peaks define the cycles as an
//! explicit argument. [`Cycles`] cuts any signal on a peak set computed from
//! another one, which is how prey and predator statistics are kept aligned.

use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};

/// Floor for the reference maximum in relative-change tests.
const RELATIVE_FLOOR: f64 = 1e-8;

/// Sample indices of strict local maxima, in increasing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeakSet {
    indices: Vec<usize>,
}

impl PeakSet {
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of complete peak-to-peak cycles.
    pub fn cycle_count(&self) -> usize {
        self.indices.len().saturating_sub(1)
    }

    /// Times at which the peaks occur. `None` when `t` is too short to hold
    /// every peak index.
    pub fn times(&self, t: &[f64]) -> Option<Vec<f64>> {
        self.indices.iter().map(|&i| t.get(i).copied()).collect()
    }

    /// Whether every index addresses a sample of a series of length `len`.
    fn fits(&self, len: usize) -> bool {
        self.indices.last().map_or(true, |&i| i < len)
    }
}

/// Finds samples strictly greater than both neighbours.
///
/// Endpoints are never peaks and flat tops are not reported.
pub fn find_peaks(signal: &[f64]) -> PeakSet {
    let indices = signal
        .windows(3)
        .enumerate()
        .filter(|(_, w)| w[1] > w[0] && w[1] > w[2])
        .map(|(i, _)| i + 1)
        .collect();
    PeakSet { indices }
}

/// Which inter-peak intervals enter the period estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodPolicy {
    /// Mean over every consecutive inter-peak interval. Needs two peaks.
    #[default]
    AllCycles,
    /// Drops the first interval as start-up transient and averages the next
    /// five. Needs seven peaks.
    ExcludeTransient,
}

impl PeriodPolicy {
    const TRANSIENT_SKIP: usize = 1;
    const TRANSIENT_WINDOW: usize = 5;

    fn estimate(self, peak_times: &[f64]) -> Option<f64> {
        let deltas: Vec<f64> = peak_times.windows(2).map(|w| w[1] - w[0]).collect();
        let window = match self {
            PeriodPolicy::AllCycles => &deltas[..],
            PeriodPolicy::ExcludeTransient => {
                let end = Self::TRANSIENT_SKIP + Self::TRANSIENT_WINDOW;
                if deltas.len() < end {
                    return None;
                }
                &deltas[Self::TRANSIENT_SKIP..end]
            }
        };
        mean(window)
    }
}

/// Mean time between consecutive peaks of `signal`.
pub fn estimate_period(t: &[f64], signal: &[f64], policy: PeriodPolicy) -> Option<f64> {
    if t.len() != signal.len() {
        return None;
    }
    let peaks = find_peaks(signal);
    period_from_peaks(t, &peaks, policy)
}

/// Period estimate over an already detected peak set.
pub fn period_from_peaks(t: &[f64], peaks: &PeakSet, policy: PeriodPolicy) -> Option<f64> {
    if peaks.len() < 2 {
        return None;
    }
    policy.estimate(&peaks.times(t)?)
}

/// Peak-to-peak partition of a time axis.
///
/// Cycle `i` spans peaks `i` and `i + 1`. Statistics use the closed sample
/// range of a cycle, so the boundary peak is shared by adjacent cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycles<'a> {
    t: &'a [f64],
    peaks: &'a PeakSet,
}

impl<'a> Cycles<'a> {
    /// `None` when `peaks` holds fewer than two peaks or indexes past `t`.
    pub fn from_peaks(t: &'a [f64], peaks: &'a PeakSet) -> Option<Self> {
        if peaks.len() < 2 || !peaks.fits(t.len()) {
            return None;
        }
        Some(Self { t, peaks })
    }

    pub fn len(&self) -> usize {
        self.peaks.cycle_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[t_start, t_end]` of every cycle.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.peaks
            .indices()
            .windows(2)
            .map(|w| (self.t[w[0]], self.t[w[1]]))
            .collect()
    }

    /// Samples of `signal` whose time lies in the closed cycle interval.
    /// `signal` must be sampled on the same time axis.
    fn segments<'s>(
        &'s self,
        signal: &'s [f64],
    ) -> Option<impl Iterator<Item = &'s [f64]> + 's> {
        if signal.len() != self.t.len() {
            return None;
        }
        let segments = self.peaks.indices().windows(2).map(move |w| {
            let (t_start, t_end) = (self.t[w[0]], self.t[w[1]]);
            let start = self.t.partition_point(|&x| x < t_start);
            let end = self.t.partition_point(|&x| x <= t_end);
            &signal[start..end]
        });
        Some(segments)
    }

    /// Arithmetic mean of `signal` per cycle. `None` when `signal` is not
    /// sampled on this time axis.
    pub fn averages(&self, signal: &[f64]) -> Option<Vec<f64>> {
        let averages = self
            .segments(signal)?
            .map(|segment| mean(segment).unwrap_or(f64::NAN))
            .collect();
        Some(averages)
    }

    /// Maximum of `signal` per cycle. `None` when `signal` is not sampled on
    /// this time axis.
    pub fn maxima(&self, signal: &[f64]) -> Option<Vec<f64>> {
        let maxima = self
            .segments(signal)?
            .map(|segment| segment.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .collect();
        Some(maxima)
    }
}

/// Per-cycle mean of `signal`, cycles cut on `signal`'s own peaks.
pub fn average_populations(t: &[f64], signal: &[f64]) -> Option<Vec<f64>> {
    let peaks = find_peaks(signal);
    Cycles::from_peaks(t, &peaks)?.averages(signal)
}

/// Per-cycle maximum of `signal`, cycles cut on `signal`'s own peaks.
pub fn max_population(t: &[f64], signal: &[f64]) -> Option<Vec<f64>> {
    let peaks = find_peaks(signal);
    Cycles::from_peaks(t, &peaks)?.maxima(signal)
}

/// First cycle whose maximum changed by less than `epsilon` relative to the
/// previous cycle's maximum.
pub fn stabilization_cycles(t: &[f64], signal: &[f64], epsilon: f64) -> Option<usize> {
    let maxima = max_population(t, signal)?;
    stabilization_index(&maxima, epsilon)
}

/// Index `i >= 1` of the first entry with
/// `|x[i] - x[i-1]| / max(|x[i-1]|, 1e-8) < epsilon`.
pub fn stabilization_index(maxima: &[f64], epsilon: f64) -> Option<usize> {
    maxima
        .windows(2)
        .position(|w| {
            let reference = w[0].abs().max(RELATIVE_FLOOR);
            (w[1] - w[0]).abs() / reference < epsilon
        })
        .map(|i| i + 1)
}

/// Time at which two adjacent prey-delimited cycles first agree in both
/// signals to within `epsilon` (absolute).
///
/// Cycles are half-open sample ranges `[p_j, p_{j+1})` over prey peaks. Adjacent
/// cycles are compared sample by sample after truncating both to the shorter
/// one, so the tail of the longer cycle is never looked at. The returned time
/// is that of the peak opening the earlier cycle of the matching pair.
pub fn stabilization_time(
    t: &[f64],
    prey: &[f64],
    predator: &[f64],
    epsilon: f64,
) -> Option<f64> {
    let peaks = find_peaks(prey);
    stabilization_time_on_peaks(t, prey, predator, &peaks, epsilon)
}

/// [`stabilization_time`] over a caller-supplied peak set.
///
/// `None` when the three series differ in length or `peaks` indexes past them.
pub fn stabilization_time_on_peaks(
    t: &[f64],
    prey: &[f64],
    predator: &[f64],
    peaks: &PeakSet,
    epsilon: f64,
) -> Option<f64> {
    if prey.len() != t.len() || predator.len() != t.len() || !peaks.fits(t.len()) {
        return None;
    }
    let idx = peaks.indices();
    if idx.len() < 3 {
        return None;
    }

    idx.windows(3).find_map(|w| {
        let (previous, current) = (w[0]..w[1], w[1]..w[2]);
        let n = previous.len().min(current.len());
        let prey_gap = max_abs_difference(&prey[previous.clone()], &prey[current.clone()], n);
        let predator_gap = max_abs_difference(&predator[previous], &predator[current], n);
        (prey_gap < epsilon && predator_gap < epsilon).then(|| t[w[0]])
    })
}

fn max_abs_difference(a: &[f64], b: &[f64], n: usize) -> f64 {
    a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Threshold for [`stabilization_cycles`].
    pub relative_epsilon: f64,
    /// Threshold for [`stabilization_time`].
    pub absolute_epsilon: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            relative_epsilon: 0.01,
            absolute_epsilon: 0.1,
        }
    }
}

/// Cycle statistics of one trajectory, all cut on prey peaks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub prey_peaks: PeakSet,
    pub predator_peaks: PeakSet,
    /// `[t_start, t_end]` of every prey cycle.
    pub cycle_bounds: Option<Vec<(f64, f64)>>,
    pub period: Option<f64>,
    pub period_excluding_transient: Option<f64>,
    pub prey_averages: Option<Vec<f64>>,
    pub predator_averages: Option<Vec<f64>>,
    pub prey_maxima: Option<Vec<f64>>,
    pub predator_maxima: Option<Vec<f64>>,
    pub stabilization_cycle: Option<usize>,
    pub stabilization_time: Option<f64>,
}

/// Runs every cycle statistic on `trajectory`.
pub fn analyze(trajectory: &Trajectory, settings: &AnalysisSettings) -> CycleReport {
    let t = trajectory.time();
    let prey = trajectory.prey();
    let predator = trajectory.predator();

    let prey_peaks = find_peaks(prey);
    let predator_peaks = find_peaks(predator);
    let cycles = Cycles::from_peaks(t, &prey_peaks);
    let prey_maxima = cycles.as_ref().and_then(|c| c.maxima(prey));

    CycleReport {
        cycle_bounds: cycles.as_ref().map(Cycles::bounds),
        period: period_from_peaks(t, &prey_peaks, PeriodPolicy::AllCycles),
        period_excluding_transient: period_from_peaks(
            t,
            &prey_peaks,
            PeriodPolicy::ExcludeTransient,
        ),
        prey_averages: cycles.as_ref().and_then(|c| c.averages(prey)),
        predator_averages: cycles.as_ref().and_then(|c| c.averages(predator)),
        predator_maxima: cycles.as_ref().and_then(|c| c.maxima(predator)),
        stabilization_cycle: prey_maxima
            .as_deref()
            .and_then(|maxima| stabilization_index(maxima, settings.relative_epsilon)),
        stabilization_time: stabilization_time_on_peaks(
            t,
            prey,
            predator,
            &prey_peaks,
            settings.absolute_epsilon,
        ),
        prey_maxima,
        prey_peaks,
        predator_peaks,
    }
}
