// src/mapper.rs
// Converts angular states into Cartesian bob positions. The pivot sits at the origin.
// The sign of the vertical term depends on who draws the frame: plots use y pointing up (bobs hang at negative y),
// screens use y pointing down (bobs hang at positive y). Both go through the same code with a VerticalAxis switch.

use crate::logic::Trajectory;
use crate::math::ParameterSet;
use serde::{Deserialize, Serialize};

/// Direction of the positive y axis of the target surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAxis {
    /// Mathematical plot axes: y = -l cos θ.
    #[default]
    Up,
    /// Screen coordinates: y = +l cos θ.
    Down,
}

impl VerticalAxis {
    fn sign(self) -> f64 {
        match self {
            VerticalAxis::Up => -1.0,
            VerticalAxis::Down => 1.0,
        }
    }
}

/// Bob positions for one sample, flattened as `[x1, y1, x2, y2, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionFrame {
    coords: Vec<f64>,
}

impl PositionFrame {
    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn bob_count(&self) -> usize {
        self.coords.len() / 2
    }

    /// Position of bob `i` (0-based, counted from the pivot).
    pub fn bob(&self, i: usize) -> (f64, f64) {
        (self.coords[2 * i], self.coords[2 * i + 1])
    }

    /// Pivot followed by every bob, ready to draw as a polyline.
    pub fn polyline(&self) -> Vec<(f64, f64)> {
        std::iter::once((0.0, 0.0))
            .chain((0..self.bob_count()).map(|i| self.bob(i)))
            .collect()
    }
}

/// Stateless transform from angles to positions for a fixed set of arm lengths.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMapper {
    lengths: Vec<f64>,
    axis: VerticalAxis,
}

impl CoordinateMapper {
    pub fn new(params: &ParameterSet, axis: VerticalAxis) -> Self {
        Self {
            lengths: params.lengths(),
            axis,
        }
    }

    /// Distance from the pivot to the outermost bob when fully extended.
    pub fn reach(&self) -> f64 {
        self.lengths.iter().sum()
    }

    /// Maps one state (`[θ1, ω1, θ2, ω2, ...]`) to a frame.
    pub fn map_state(&self, state: &[f64]) -> PositionFrame {
        let sign = self.axis.sign();
        let mut coords = Vec::with_capacity(2 * self.lengths.len());
        let mut curr_x = 0.0;
        let mut curr_y = 0.0;
        for (arm, &length) in self.lengths.iter().enumerate() {
            let theta = state[2 * arm];
            curr_x += length * theta.sin();
            curr_y += sign * length * theta.cos();
            coords.push(curr_x);
            coords.push(curr_y);
        }
        PositionFrame { coords }
    }

    pub fn map_trajectory(&self, trajectory: &Trajectory) -> Vec<PositionFrame> {
        trajectory.states.iter().map(|s| self.map_state(s)).collect()
    }

    /// Recovers the arm angles from a frame, each in `(-π, π]`.
    pub fn angles(&self, frame: &PositionFrame) -> Vec<f64> {
        let sign = self.axis.sign();
        let mut prev = (0.0, 0.0);
        (0..frame.bob_count())
            .map(|i| {
                let (x, y) = frame.bob(i);
                let theta = (x - prev.0).atan2(sign * (y - prev.1));
                prev = (x, y);
                theta
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    fn wrapped_diff(a: f64, b: f64) -> f64 {
        let d = (a - b).rem_euclid(TAU);
        d.min(TAU - d)
    }

    #[test]
    fn hanging_pendulum_points_down_on_plots() {
        let mapper = CoordinateMapper::new(&ParameterSet::double(1.0, 1.0, 1.0, 2.0, 0.0, 0.0), VerticalAxis::Up);
        let frame = mapper.map_state(&[0.0, 0.0, 0.0, 0.0]);
        assert_eq!(frame.coords(), &[0.0, -1.0, 0.0, -3.0]);
        assert_eq!(mapper.reach(), 3.0);
    }

    #[test]
    fn screen_axis_flips_vertical_only() {
        let params = ParameterSet::double(1.0, 1.0, 1.0, 1.0, 0.0, 0.0);
        let up = CoordinateMapper::new(&params, VerticalAxis::Up).map_state(&[0.4, 0.0, -1.1, 0.0]);
        let down = CoordinateMapper::new(&params, VerticalAxis::Down).map_state(&[0.4, 0.0, -1.1, 0.0]);
        for i in 0..2 {
            assert_eq!(up.bob(i).0, down.bob(i).0);
            assert!((up.bob(i).1 + down.bob(i).1).abs() < 1e-15);
        }
    }

    #[test]
    fn horizontal_arms() {
        let mapper = CoordinateMapper::new(&ParameterSet::single(1.0, 5.0, 0.0), VerticalAxis::Up);
        let frame = mapper.map_state(&[FRAC_PI_2, 0.0]);
        assert_eq!(frame.bob_count(), 1);
        let (x, y) = frame.bob(0);
        assert!((x - 5.0).abs() < 1e-12);
        assert!(y.abs() < 1e-12);
        assert_eq!(frame.polyline().len(), 2);
    }

    #[test]
    fn angles_round_trip_modulo_two_pi() {
        let params = ParameterSet::double(2.0, 1.0, 0.7, 1.3, 0.0, 0.0);
        for axis in [VerticalAxis::Up, VerticalAxis::Down] {
            let mapper = CoordinateMapper::new(&params, axis);
            for &(t1, t2) in &[(0.0, 0.0), (FRAC_PI_2, -FRAC_PI_2), (3.0, 7.5), (-12.0, PI), (100.0, -0.2)] {
                let frame = mapper.map_state(&[t1, 1.0, t2, -1.0]);
                let angles = mapper.angles(&frame);
                assert!(wrapped_diff(angles[0], t1) < 1e-9, "{axis:?} θ1 {t1}");
                assert!(wrapped_diff(angles[1], t2) < 1e-9, "{axis:?} θ2 {t2}");
            }
        }
    }
}
