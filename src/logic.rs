// src/logic.rs
// Numerical integration of the pendulum equations of motion.
// Uses the Dormand-Prince 5(4) embedded Runge-Kutta pair with adaptive step control and its
// 4th-order continuous extension, so the solver steps freely but reports exactly at the requested grid.
// The grid is linspace(t0, t1, n_points); the first sample is the initial state, the last is exactly t1.

use crate::error::{PendulumError, Result};
use crate::math::Dynamics;
use serde::{Deserialize, Serialize};
use tracing::debug;

// Butcher tableau (c, a) of the Dormand-Prince pair.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
// 5th-order weights (also the 7th stage row, FSAL).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// Difference between the 5th- and 4th-order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

// Continuous extension (Hairer, Norsett & Wanner, dense output of DOPRI5).
const D1: f64 = -12715105075.0 / 11282082432.0;
const D3: f64 = 87487479700.0 / 32700410799.0;
const D4: f64 = -10690763975.0 / 1880347072.0;
const D5: f64 = 701980252875.0 / 199316789632.0;
const D6: f64 = -1453857185.0 / 822651844.0;
const D7: f64 = 69997945.0 / 29380423.0;

// Step-size controller.
const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

/// Tolerances and budget for the adaptive solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Maximum number of attempted steps (accepted + rejected) per solve.
    pub max_steps: usize,
    /// Initial step; picked automatically when `None`.
    pub first_step: Option<f64>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            max_steps: 100_000,
            first_step: None,
        }
    }
}

impl SolverOptions {
    fn validate(&self) -> Result<()> {
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return Err(PendulumError::invalid("rtol", self.rtol, "must be > 0"));
        }
        if !(self.atol.is_finite() && self.atol > 0.0) {
            return Err(PendulumError::invalid("atol", self.atol, "must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(PendulumError::invalid("max_steps", 0.0, "must be > 0"));
        }
        if let Some(h) = self.first_step {
            if !(h.is_finite() && h > 0.0) {
                return Err(PendulumError::invalid("first_step", h, "must be > 0"));
            }
        }
        Ok(())
    }
}

/// Work counters for one solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolverStats {
    pub accepted_steps: usize,
    pub rejected_steps: usize,
    pub evaluations: usize,
}

/// Sampled solution: `states[i]` is the state at `t[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub t: Vec<f64>,
    pub states: Vec<Vec<f64>>,
    pub stats: SolverStats,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn last_state(&self) -> Option<&[f64]> {
        self.states.last().map(Vec::as_slice)
    }
}

/// Largest sample grid a single solve will allocate.
pub const MAX_SAMPLES: usize = 100_000;

/// `n` evenly spaced points over `[t0, t1]`; the last point is exactly `t1`.
pub fn linspace(t0: f64, t1: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![t0],
        _ => {
            let step = (t1 - t0) / (n - 1) as f64;
            let mut grid: Vec<f64> = (0..n).map(|i| t0 + step * i as f64).collect();
            grid[n - 1] = t1;
            grid
        }
    }
}

fn rms_norm(values: &[f64], scale: &[f64]) -> f64 {
    let sum: f64 = values
        .iter()
        .zip(scale)
        .map(|(v, s)| (v / s) * (v / s))
        .sum();
    (sum / values.len() as f64).sqrt()
}

/// Adaptive Dormand-Prince integrator reporting on a fixed grid.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    pub options: SolverOptions,
}

/// Scratch space for one Dormand-Prince step.
struct Stages {
    k: [Vec<f64>; 7],
    y_stage: Vec<f64>,
    y_new: Vec<f64>,
    error: Vec<f64>,
    scale: Vec<f64>,
}

impl Stages {
    fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![0.0; dim]),
            y_stage: vec![0.0; dim],
            y_new: vec![0.0; dim],
            error: vec![0.0; dim],
            scale: vec![0.0; dim],
        }
    }

    /// One trial step of size `h` from `(t, y)`; `k[0]` must already hold f(t, y).
    /// Leaves the candidate in `y_new`, f(t + h, y_new) in `k[6]`, and returns the scaled error norm.
    fn attempt<D: Dynamics + ?Sized>(&mut self, model: &D, t: f64, y: &[f64], h: f64, options: &SolverOptions) -> f64 {
        let dim = y.len();
        let rows: [(f64, &[f64]); 5] = [
            (C2, &[A21]),
            (C3, &[A31, A32]),
            (C4, &[A41, A42, A43]),
            (C5, &[A51, A52, A53, A54]),
            (1.0, &[A61, A62, A63, A64, A65]),
        ];
        for (stage, (c, a)) in rows.iter().enumerate() {
            for i in 0..dim {
                let increment: f64 = a.iter().enumerate().map(|(j, aj)| aj * self.k[j][i]).sum();
                self.y_stage[i] = y[i] + h * increment;
            }
            model.derivative(t + c * h, &self.y_stage, &mut self.k[stage + 1]);
        }

        let k = &self.k;
        for i in 0..dim {
            self.y_new[i] = y[i] + h * (B1 * k[0][i] + B3 * k[2][i] + B4 * k[3][i] + B5 * k[4][i] + B6 * k[5][i]);
        }
        model.derivative(t + h, &self.y_new, &mut self.k[6]);

        let k = &self.k;
        for i in 0..dim {
            self.error[i] = h
                * (E1 * k[0][i] + E3 * k[2][i] + E4 * k[3][i] + E5 * k[4][i] + E6 * k[5][i] + E7 * k[6][i]);
            self.scale[i] = options.atol + options.rtol * y[i].abs().max(self.y_new[i].abs());
        }
        if self.y_new.iter().chain(&self.k[6]).any(|v| !v.is_finite()) {
            return f64::INFINITY;
        }
        rms_norm(&self.error, &self.scale)
    }

    /// Evaluates the continuous extension of the accepted step `[t, t + h]` at `t + theta * h`.
    fn interpolate(&self, y: &[f64], h: f64, theta: f64) -> Vec<f64> {
        let k = &self.k;
        let theta1 = 1.0 - theta;
        (0..y.len())
            .map(|i| {
                let diff = self.y_new[i] - y[i];
                let bspl = h * k[0][i] - diff;
                let r4 = diff - h * k[6][i] - bspl;
                let r5 = h
                    * (D1 * k[0][i] + D3 * k[2][i] + D4 * k[3][i] + D5 * k[4][i] + D6 * k[5][i] + D7 * k[6][i]);
                y[i] + theta * (diff + theta1 * (bspl + theta * (r4 + theta1 * r5)))
            })
            .collect()
    }
}

impl Solver {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    /// Integrates `model` from `y0` over `t_span` and samples the solution at `n_points`
    /// evenly spaced times, both endpoints included.
    pub fn solve<D: Dynamics + ?Sized>(
        &self,
        model: &D,
        y0: &[f64],
        t_span: (f64, f64),
        n_points: usize,
    ) -> Result<Trajectory> {
        let options = &self.options;
        options.validate()?;
        let (t0, t1) = t_span;
        if !(t0.is_finite() && t1.is_finite()) || t1 <= t0 {
            return Err(PendulumError::invalid("t_end", t1, "time span must be finite with t_end > t_start"));
        }
        if n_points < 2 {
            return Err(PendulumError::invalid("n_points", n_points as f64, "at least 2 samples required"));
        }
        if n_points > MAX_SAMPLES {
            return Err(PendulumError::invalid("n_points", n_points as f64, "too many samples requested"));
        }
        let dim = model.dimension();
        if y0.len() != dim {
            return Err(PendulumError::invalid("initial_state", y0.len() as f64, "wrong state dimension"));
        }
        if let Some(bad) = y0.iter().find(|v| !v.is_finite()) {
            return Err(PendulumError::invalid("initial_state", *bad, "must be finite"));
        }

        let grid = linspace(t0, t1, n_points);
        let mut stages = Stages::new(dim);
        let mut stats = SolverStats::default();

        let mut t = t0;
        let mut y = y0.to_vec();
        model.derivative(t, &y, &mut stages.k[0]);
        stats.evaluations += 1;

        let mut h = match options.first_step {
            Some(h) => h,
            None => {
                stats.evaluations += 1;
                initial_step(model, t, &y, &stages.k[0], t1 - t0, options)
            }
        };

        let mut times = Vec::with_capacity(n_points);
        let mut states = Vec::with_capacity(n_points);
        times.push(t0);
        states.push(y.clone());
        let mut next = 1;
        let mut previous_rejected = false;

        while next < n_points {
            if stats.accepted_steps + stats.rejected_steps >= options.max_steps {
                return Err(PendulumError::diverged(
                    t,
                    format!("step budget of {} exhausted", options.max_steps),
                ));
            }
            let min_step = 10.0 * f64::EPSILON * t.abs().max(1.0);
            let remaining = t1 - t;
            h = h.min(remaining);
            if h < min_step {
                return Err(PendulumError::diverged(t, format!("step size underflow (h = {h:e})")));
            }

            let err = stages.attempt(model, t, &y, h, options);
            stats.evaluations += 6;

            if err <= 1.0 {
                let t_new = if h >= remaining { t1 } else { t + h };
                while next < n_points && grid[next] <= t_new {
                    times.push(grid[next]);
                    if grid[next] == t_new {
                        states.push(stages.y_new.clone());
                    } else {
                        states.push(stages.interpolate(&y, h, (grid[next] - t) / h));
                    }
                    next += 1;
                }

                let mut factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(ERROR_EXPONENT)).min(MAX_FACTOR)
                };
                if previous_rejected {
                    factor = factor.min(1.0);
                }
                h *= factor;
                t = t_new;
                std::mem::swap(&mut y, &mut stages.y_new);
                stages.k.swap(0, 6);
                stats.accepted_steps += 1;
                previous_rejected = false;
            } else {
                let factor = if err.is_finite() {
                    (SAFETY * err.powf(ERROR_EXPONENT)).max(MIN_FACTOR)
                } else {
                    MIN_FACTOR
                };
                h *= factor;
                stats.rejected_steps += 1;
                previous_rejected = true;
            }
        }

        debug!(
            accepted = stats.accepted_steps,
            rejected = stats.rejected_steps,
            evaluations = stats.evaluations,
            "Integration finished"
        );

        Ok(Trajectory {
            t: times,
            states,
            stats,
        })
    }
}

/// Starting step from the local scale of the solution and its derivatives.
fn initial_step<D: Dynamics + ?Sized>(
    model: &D,
    t0: f64,
    y0: &[f64],
    f0: &[f64],
    span: f64,
    options: &SolverOptions,
) -> f64 {
    let scale: Vec<f64> = y0.iter().map(|v| options.atol + v.abs() * options.rtol).collect();
    let d0 = rms_norm(y0, &scale);
    let d1 = rms_norm(f0, &scale);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };

    let y1: Vec<f64> = y0.iter().zip(f0).map(|(y, f)| y + h0 * f).collect();
    let mut f1 = vec![0.0; y0.len()];
    model.derivative(t0 + h0, &y1, &mut f1);
    let df: Vec<f64> = f1.iter().zip(f0).map(|(a, b)| a - b).collect();
    let d2 = rms_norm(&df, &scale) / h0;

    let h1 = if d1.max(d2) <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / 5.0)
    };
    (100.0 * h0).min(h1).min(span)
}
