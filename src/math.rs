// src/math.rs
// Equations of motion for the single (optionally damped) and the damped double pendulum.
// State layout: single = [θ, ω]; double = [θ1, ω1, θ2, ω2]. Angles in radians, measured from the downward vertical.
// The double pendulum solves the 2x2 Lagrangian system M α = F in closed form (Cramer's rule), so D below is det(M).

use crate::error::{PendulumError, Result};
use serde::{Deserialize, Serialize};

/// Standard gravity used by every preset (m/s^2).
pub const GRAVITY: f64 = 9.81;

/// Smallest admissible lower bound of the mass-matrix determinant.
pub const DETERMINANT_EPSILON: f64 = 1e-12;

fn default_gravity() -> f64 {
    GRAVITY
}

/// Names one editable physical constant.
///
/// The `*1` keys address the only arm of a single pendulum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKey {
    #[serde(rename = "m1")]
    Mass1,
    #[serde(rename = "l1")]
    Length1,
    #[serde(rename = "c1")]
    Damping1,
    #[serde(rename = "m2")]
    Mass2,
    #[serde(rename = "l2")]
    Length2,
    #[serde(rename = "c2")]
    Damping2,
}

impl ParamKey {
    pub const SINGLE: [ParamKey; 3] = [ParamKey::Mass1, ParamKey::Length1, ParamKey::Damping1];
    pub const DOUBLE: [ParamKey; 6] = [
        ParamKey::Mass1,
        ParamKey::Length1,
        ParamKey::Damping1,
        ParamKey::Mass2,
        ParamKey::Length2,
        ParamKey::Damping2,
    ];

    /// Short symbol, also the wire name.
    pub fn name(self) -> &'static str {
        match self {
            ParamKey::Mass1 => "m1",
            ParamKey::Length1 => "l1",
            ParamKey::Damping1 => "c1",
            ParamKey::Mass2 => "m2",
            ParamKey::Length2 => "l2",
            ParamKey::Damping2 => "c2",
        }
    }

    pub fn is_damping(self) -> bool {
        matches!(self, ParamKey::Damping1 | ParamKey::Damping2)
    }

    /// Clamp range enforced on every edit.
    pub fn range(self) -> ParamRange {
        if self.is_damping() {
            ParamRange { min: 0.0, max: 1.0 }
        } else {
            ParamRange { min: 0.01, max: 10.0 }
        }
    }

    /// Checks the physical domain of a value for this key (not the clamp range).
    pub fn check(self, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(PendulumError::invalid(self.name(), value, "must be finite"));
        }
        if self.is_damping() {
            if value < 0.0 {
                return Err(PendulumError::invalid(self.name(), value, "must be >= 0"));
            }
        } else if value <= 0.0 {
            return Err(PendulumError::invalid(self.name(), value, "must be > 0"));
        }
        Ok(())
    }
}

/// Inclusive `[min, max]` interval for an editable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Physical constants for one solve. Replaced, never edited in place, by the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ParameterSet {
    /// Single pendulum; `b = 0` is the undamped case.
    Single {
        m: f64,
        l: f64,
        #[serde(default)]
        b: f64,
        #[serde(default = "default_gravity")]
        g: f64,
    },
    /// Damped double pendulum.
    Double {
        m1: f64,
        m2: f64,
        l1: f64,
        l2: f64,
        #[serde(default)]
        c1: f64,
        #[serde(default)]
        c2: f64,
        #[serde(default = "default_gravity")]
        g: f64,
    },
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::double(1.0, 1.0, 1.0, 1.0, 0.0, 0.0)
    }
}

impl ParameterSet {
    pub fn single(m: f64, l: f64, b: f64) -> Self {
        Self::Single { m, l, b, g: GRAVITY }
    }

    pub fn double(m1: f64, m2: f64, l1: f64, l2: f64, c1: f64, c2: f64) -> Self {
        Self::Double {
            m1,
            m2,
            l1,
            l2,
            c1,
            c2,
            g: GRAVITY,
        }
    }

    /// Keys that address a value of this variant.
    pub fn keys(&self) -> &'static [ParamKey] {
        match self {
            Self::Single { .. } => &ParamKey::SINGLE,
            Self::Double { .. } => &ParamKey::DOUBLE,
        }
    }

    /// Length of the state vector.
    pub fn dimension(&self) -> usize {
        match self {
            Self::Single { .. } => 2,
            Self::Double { .. } => 4,
        }
    }

    pub fn gravity(&self) -> f64 {
        match *self {
            Self::Single { g, .. } | Self::Double { g, .. } => g,
        }
    }

    /// Arm lengths from the pivot outward.
    pub fn lengths(&self) -> Vec<f64> {
        match *self {
            Self::Single { l, .. } => vec![l],
            Self::Double { l1, l2, .. } => vec![l1, l2],
        }
    }

    pub fn get(&self, key: ParamKey) -> Option<f64> {
        match (*self, key) {
            (Self::Single { m, .. }, ParamKey::Mass1) => Some(m),
            (Self::Single { l, .. }, ParamKey::Length1) => Some(l),
            (Self::Single { b, .. }, ParamKey::Damping1) => Some(b),
            (Self::Single { .. }, _) => None,
            (Self::Double { m1, .. }, ParamKey::Mass1) => Some(m1),
            (Self::Double { l1, .. }, ParamKey::Length1) => Some(l1),
            (Self::Double { c1, .. }, ParamKey::Damping1) => Some(c1),
            (Self::Double { m2, .. }, ParamKey::Mass2) => Some(m2),
            (Self::Double { l2, .. }, ParamKey::Length2) => Some(l2),
            (Self::Double { c2, .. }, ParamKey::Damping2) => Some(c2),
        }
    }

    /// Returns a copy with `key` set to `value`.
    ///
    /// Rejects keys the variant does not have, values outside the physical
    /// domain, and values outside the key's clamp range. The receiver is never
    /// modified, so a rejected edit leaves the previous value in place.
    pub fn with_value(&self, key: ParamKey, value: f64) -> Result<Self> {
        let mut next = *self;
        let slot = next
            .slot_mut(key)
            .ok_or_else(|| PendulumError::invalid(key.name(), value, "not defined for this variant"))?;
        key.check(value)?;
        if !key.range().contains(value) {
            return Err(PendulumError::invalid(key.name(), value, "outside the allowed range"));
        }
        *slot = value;
        next.validate()?;
        Ok(next)
    }

    fn slot_mut(&mut self, key: ParamKey) -> Option<&mut f64> {
        match (self, key) {
            (Self::Single { m, .. }, ParamKey::Mass1) => Some(m),
            (Self::Single { l, .. }, ParamKey::Length1) => Some(l),
            (Self::Single { b, .. }, ParamKey::Damping1) => Some(b),
            (Self::Single { .. }, _) => None,
            (Self::Double { m1, .. }, ParamKey::Mass1) => Some(m1),
            (Self::Double { l1, .. }, ParamKey::Length1) => Some(l1),
            (Self::Double { c1, .. }, ParamKey::Damping1) => Some(c1),
            (Self::Double { m2, .. }, ParamKey::Mass2) => Some(m2),
            (Self::Double { l2, .. }, ParamKey::Length2) => Some(l2),
            (Self::Double { c2, .. }, ParamKey::Damping2) => Some(c2),
        }
    }

    /// Checks every value against its physical domain and the determinant bound.
    pub fn validate(&self) -> Result<()> {
        for &key in self.keys() {
            if let Some(value) = self.get(key) {
                key.check(value)?;
            }
        }
        let g = self.gravity();
        if !g.is_finite() {
            return Err(PendulumError::invalid("g", g, "must be finite"));
        }
        if let Self::Double { m1, m2, l1, l2, .. } = *self {
            // D = m2 l1^2 l2^2 (m1 + m2 sin^2 Δθ), so m1 m2 l1^2 l2^2 bounds it from below.
            let bound = m1 * m2 * l1 * l1 * l2 * l2;
            if bound < DETERMINANT_EPSILON {
                return Err(PendulumError::invalid("det(M)", bound, "mass matrix is near singular"));
            }
        }
        Ok(())
    }

    /// Checks that every editable value lies in its clamp range.
    pub fn check_ranges(&self) -> Result<()> {
        for &key in self.keys() {
            if let Some(value) = self.get(key) {
                if !key.range().contains(value) {
                    return Err(PendulumError::invalid(key.name(), value, "outside the allowed range"));
                }
            }
        }
        Ok(())
    }

    /// Builds the equations of motion for these constants.
    pub fn model(&self) -> Result<Model> {
        self.validate()?;
        Ok(match *self {
            Self::Single { m, l, b, g } => Model::Single(SinglePendulum { m, l, b, g }),
            Self::Double {
                m1,
                m2,
                l1,
                l2,
                c1,
                c2,
                g,
            } => Model::Double(DoublePendulum {
                m1,
                m2,
                l1,
                l2,
                c1,
                c2,
                g,
            }),
        })
    }
}

/// Right-hand side of an autonomous ODE y' = f(t, y).
pub trait Dynamics {
    /// Length of the state vector.
    fn dimension(&self) -> usize;

    /// Writes f(t, y) into `dydt`.
    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]);

    /// Total mechanical energy, zero at the hanging rest position.
    fn energy(&self, y: &[f64]) -> f64;
}

/// θ'' = -(b / (m l^2)) θ' - (g / l) sin θ
#[derive(Debug, Clone, Copy)]
pub struct SinglePendulum {
    m: f64,
    l: f64,
    b: f64,
    g: f64,
}

impl Dynamics for SinglePendulum {
    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let (theta, omega) = (y[0], y[1]);
        dydt[0] = omega;
        dydt[1] = -(self.b / (self.m * self.l * self.l)) * omega - (self.g / self.l) * theta.sin();
    }

    fn energy(&self, y: &[f64]) -> f64 {
        let (theta, omega) = (y[0], y[1]);
        let kinetic = 0.5 * self.m * self.l * self.l * omega * omega;
        let potential = self.m * self.g * self.l * (1.0 - theta.cos());
        kinetic + potential
    }
}

/// Damped double pendulum with point masses on massless rods.
#[derive(Debug, Clone, Copy)]
pub struct DoublePendulum {
    m1: f64,
    m2: f64,
    l1: f64,
    l2: f64,
    c1: f64,
    c2: f64,
    g: f64,
}

impl DoublePendulum {
    /// det(M) for the angle difference Δθ = θ1 - θ2.
    pub fn determinant(&self, delta: f64) -> f64 {
        let coupling = self.m2 * self.l1 * self.l2 * delta.cos();
        (self.m1 + self.m2) * self.l1 * self.l1 * self.m2 * self.l2 * self.l2 - coupling * coupling
    }
}

impl Dynamics for DoublePendulum {
    fn dimension(&self) -> usize {
        4
    }

    fn derivative(&self, _t: f64, y: &[f64], dydt: &mut [f64]) {
        let (theta1, omega1, theta2, omega2) = (y[0], y[1], y[2], y[3]);
        let (m1, m2, l1, l2, g) = (self.m1, self.m2, self.l1, self.l2, self.g);

        let delta = theta1 - theta2;
        let (sin_d, cos_d) = delta.sin_cos();
        let denominator = self.determinant(delta);
        let m12 = m2 * l1 * l2;

        // Generalised forces on each arm (Coriolis, gravity, damping).
        let a = -m12 * omega2 * omega2 * sin_d - (m1 + m2) * g * l1 * theta1.sin() - self.c1 * omega1;
        let b = m12 * omega1 * omega1 * sin_d - m2 * g * l2 * theta2.sin() - self.c2 * omega2;

        dydt[0] = omega1;
        dydt[1] = (m2 * l2 * l2 * a - m12 * cos_d * b) / denominator;
        dydt[2] = omega2;
        dydt[3] = (-m12 * cos_d * a + (m1 + m2) * l1 * l1 * b) / denominator;
    }

    fn energy(&self, y: &[f64]) -> f64 {
        let (theta1, omega1, theta2, omega2) = (y[0], y[1], y[2], y[3]);
        let (m1, m2, l1, l2, g) = (self.m1, self.m2, self.l1, self.l2, self.g);
        let kinetic = 0.5 * (m1 + m2) * l1 * l1 * omega1 * omega1
            + 0.5 * m2 * l2 * l2 * omega2 * omega2
            + m2 * l1 * l2 * omega1 * omega2 * (theta1 - theta2).cos();
        let potential = (m1 + m2) * g * l1 * (1.0 - theta1.cos()) + m2 * g * l2 * (1.0 - theta2.cos());
        kinetic + potential
    }
}

/// Either variant, dispatched at runtime so the session can swap variants freely.
#[derive(Debug, Clone, Copy)]
pub enum Model {
    Single(SinglePendulum),
    Double(DoublePendulum),
}

impl Dynamics for Model {
    fn dimension(&self) -> usize {
        match self {
            Model::Single(p) => p.dimension(),
            Model::Double(p) => p.dimension(),
        }
    }

    fn derivative(&self, t: f64, y: &[f64], dydt: &mut [f64]) {
        match self {
            Model::Single(p) => p.derivative(t, y, dydt),
            Model::Double(p) => p.derivative(t, y, dydt),
        }
    }

    fn energy(&self, y: &[f64]) -> f64 {
        match self {
            Model::Single(p) => p.energy(y),
            Model::Double(p) => p.energy(y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn eval(model: &Model, y: &[f64]) -> Vec<f64> {
        let mut dydt = vec![0.0; y.len()];
        model.derivative(0.0, y, &mut dydt);
        dydt
    }

    #[test]
    fn single_pendulum_at_horizontal() {
        let model = ParameterSet::single(1.0, 2.0, 0.0).model().unwrap();
        let d = eval(&model, &[FRAC_PI_2, 0.0]);
        assert_eq!(d[0], 0.0);
        assert!((d[1] + GRAVITY / 2.0).abs() < 1e-12);
    }

    #[test]
    fn single_pendulum_damping_opposes_motion() {
        let model = ParameterSet::single(5.0, 5.0, 0.8).model().unwrap();
        let d = eval(&model, &[0.0, 1.0]);
        assert!((d[1] + 0.8 / 125.0).abs() < 1e-12);
    }

    #[test]
    fn double_pendulum_hanging_at_rest_is_equilibrium() {
        let model = ParameterSet::default().model().unwrap();
        let d = eval(&model, &[0.0, 0.0, 0.0, 0.0]);
        assert!(d.iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn double_pendulum_both_horizontal() {
        // Δθ = 0, cos = 1: D = 2 - 1 = 1, A = -2g, B = -g.
        let model = ParameterSet::default().model().unwrap();
        let d = eval(&model, &[FRAC_PI_2, 0.0, FRAC_PI_2, 0.0]);
        assert!((d[1] - (-2.0 * GRAVITY + GRAVITY)).abs() < 1e-12);
        assert!((d[3] - (2.0 * GRAVITY - 2.0 * GRAVITY)).abs() < 1e-12);
    }

    #[test]
    fn double_pendulum_derivative_is_finite_over_parameter_grid() {
        let values = [0.01, 0.5, 1.0, 5.0, 10.0];
        let states = [
            [0.0, 0.0, 0.0, 0.0],
            [FRAC_PI_2, 3.0, -FRAC_PI_2, -2.0],
            [PI, 10.0, 0.0, 0.0],
            [0.3, -7.0, PI - 0.3, 5.0],
        ];
        for &m in &values {
            for &l in &values {
                let model = ParameterSet::double(m, 1.0 / m.max(1.0), l, 1.0, 0.5, 0.1)
                    .model()
                    .unwrap();
                for y in &states {
                    assert!(eval(&model, y).iter().all(|v| v.is_finite()));
                }
            }
        }
    }

    #[test]
    fn determinant_never_below_lower_bound() {
        let p = DoublePendulum {
            m1: 0.3,
            m2: 2.0,
            l1: 1.5,
            l2: 0.7,
            c1: 0.0,
            c2: 0.0,
            g: GRAVITY,
        };
        let bound = p.m1 * p.m2 * p.l1 * p.l1 * p.l2 * p.l2;
        for i in 0..64 {
            let delta = i as f64 * PI / 16.0;
            assert!(p.determinant(delta) >= bound - 1e-12);
        }
    }

    #[test]
    fn zero_length_is_rejected() {
        let params = ParameterSet::default();
        let err = params.with_value(ParamKey::Length1, 0.0).unwrap_err();
        assert!(matches!(err, PendulumError::InvalidParameter { name: "l1", .. }));
        assert_eq!(params.get(ParamKey::Length1), Some(1.0));
    }

    #[test]
    fn negative_damping_and_nan_are_rejected() {
        let params = ParameterSet::default();
        assert!(params.with_value(ParamKey::Damping2, -0.1).is_err());
        assert!(params.with_value(ParamKey::Mass2, f64::NAN).is_err());
        assert!(params.with_value(ParamKey::Mass2, 11.0).is_err());
    }

    #[test]
    fn single_variant_has_no_second_arm() {
        let params = ParameterSet::single(1.0, 1.0, 0.0);
        assert_eq!(params.get(ParamKey::Mass2), None);
        assert!(params.with_value(ParamKey::Mass2, 1.0).is_err());
        let edited = params.with_value(ParamKey::Damping1, 0.25).unwrap();
        assert_eq!(edited.get(ParamKey::Damping1), Some(0.25));
    }

    #[test]
    fn near_singular_mass_matrix_is_rejected() {
        let params = ParameterSet::double(1e-5, 1e-5, 1e-2, 1e-2, 0.0, 0.0);
        assert!(params.model().is_err());
    }

    #[test]
    fn energy_is_zero_at_rest_and_positive_elsewhere() {
        let model = ParameterSet::default().model().unwrap();
        assert!(model.energy(&[0.0, 0.0, 0.0, 0.0]).abs() < 1e-15);
        assert!(model.energy(&[FRAC_PI_2, 0.0, FRAC_PI_2, 0.0]) > 0.0);
        // Both arms horizontal: (m1 + m2) g l1 + m2 g l2 = 3g.
        assert!((model.energy(&[FRAC_PI_2, 0.0, FRAC_PI_2, 0.0]) - 3.0 * GRAVITY).abs() < 1e-12);
    }

    #[test]
    fn parameter_set_json_shape() {
        let params: ParameterSet =
            serde_json::from_str(r#"{"variant":"single","m":5.0,"l":5.0,"b":0.8}"#).unwrap();
        assert_eq!(params, ParameterSet::single(5.0, 5.0, 0.8));
        let key: ParamKey = serde_json::from_str(r#""l2""#).unwrap();
        assert_eq!(key, ParamKey::Length2);
    }
}
