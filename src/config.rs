// src/config.rs
// Scenario configuration: the pendulum variant plus optional overrides for its physical constants,
// initial state, time span and solver tolerances. Every field has a default, so an empty JSON
// object is a valid scenario (the undamped double pendulum released from horizontal).
//
// {
//   "variant": "damped",
//   "parameters": { "variant": "single", "m": 5.0, "l": 5.0, "b": 0.8 },
//   "initial_state": [1.5707963267948966, 0.0],
//   "t_end": 50.0,
//   "samples": 500,
//   "fps": 30,
//   "solver": { "rtol": 1e-6, "atol": 1e-9 }
// }

use crate::error::{PendulumError, Result};
use crate::logic::SolverOptions;
use crate::mapper::VerticalAxis;
use crate::math::ParameterSet;
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which of the pendulum systems to simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Undamped single pendulum.
    Simple,
    /// Single pendulum with viscous damping.
    Damped,
    /// Damped double pendulum (undamped by default).
    #[default]
    Double,
}

impl Variant {
    /// Constants of the preset for this variant.
    pub fn default_parameters(self) -> ParameterSet {
        match self {
            Variant::Simple => ParameterSet::single(1.0, 5.0, 0.0),
            Variant::Damped => ParameterSet::single(5.0, 5.0, 0.8),
            Variant::Double => ParameterSet::default(),
        }
    }

    /// Starting constants of the interactive viewer, where every slider begins inside its range.
    pub fn interactive_parameters(self) -> ParameterSet {
        match self {
            Variant::Simple => ParameterSet::single(1.0, 1.0, 0.0),
            Variant::Damped | Variant::Double => self.default_parameters(),
        }
    }

    pub fn default_t_end(self) -> f64 {
        match self {
            Variant::Simple => 10.0,
            Variant::Damped | Variant::Double => 50.0,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Variant::Simple => "Simple Pendulum Animation",
            Variant::Damped => "Damped Pendulum Animation",
            Variant::Double => "Double Pendulum Animation",
        }
    }

    /// Default file name for an exported animation.
    pub fn file_name(self) -> &'static str {
        match self {
            Variant::Simple => "simple_pendulum.gif",
            Variant::Damped => "damped_pendulum.gif",
            Variant::Double => "double_pendulum.gif",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::Simple => "simple",
            Variant::Damped => "damped",
            Variant::Double => "double",
        };
        f.write_str(name)
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Variant::Simple),
            "damped" => Ok(Variant::Damped),
            "double" => Ok(Variant::Double),
            other => Err(format!("unknown variant `{other}` (expected simple, damped or double)")),
        }
    }
}

/// A complete, non-interactive run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub variant: Variant,
    /// Overrides the variant's preset constants.
    pub parameters: Option<ParameterSet>,
    /// Overrides the default release from horizontal at rest.
    pub initial_state: Option<Vec<f64>>,
    /// Overrides the variant's default end time; the start time is always 0.
    pub t_end: Option<f64>,
    pub samples: usize,
    pub fps: u32,
    pub solver: SolverOptions,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::preset(Variant::default())
    }
}

impl Scenario {
    pub fn preset(variant: Variant) -> Self {
        Self {
            variant,
            parameters: None,
            initial_state: None,
            t_end: None,
            samples: 500,
            fps: 30,
            solver: SolverOptions::default(),
        }
    }

    /// Loads a scenario from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config_err = |source: Box<dyn std::error::Error + Send + Sync>| PendulumError::Config {
            path: path.to_path_buf(),
            source,
        };
        let text = std::fs::read_to_string(path).map_err(|e| config_err(Box::new(e)))?;
        let scenario: Scenario = serde_json::from_str(&text).map_err(|e| config_err(Box::new(e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn parameters(&self) -> ParameterSet {
        self.parameters
            .unwrap_or_else(|| self.variant.default_parameters())
    }

    pub fn initial_state(&self) -> Vec<f64> {
        match &self.initial_state {
            Some(state) => state.clone(),
            None => (0..self.parameters().dimension())
                .map(|i| if i % 2 == 0 { FRAC_PI_2 } else { 0.0 })
                .collect(),
        }
    }

    pub fn t_end(&self) -> f64 {
        self.t_end.unwrap_or_else(|| self.variant.default_t_end())
    }

    /// Checks the effective constants and that the initial state fits them.
    pub fn validate(&self) -> Result<()> {
        let params = self.parameters();
        params.validate()?;
        let state = self.initial_state();
        if state.len() != params.dimension() {
            return Err(PendulumError::invalid(
                "initial_state",
                state.len() as f64,
                "length does not match the pendulum variant",
            ));
        }
        if self.samples < 2 {
            return Err(PendulumError::invalid("samples", self.samples as f64, "at least 2 samples required"));
        }
        Ok(())
    }

    /// Solve settings for this scenario in the given drawing convention.
    pub fn session_config(&self, axis: VerticalAxis) -> SessionConfig {
        SessionConfig {
            initial_state: self.initial_state(),
            t_span: (0.0, self.t_end()),
            n_points: self.samples,
            axis,
            solver: self.solver,
        }
    }
}
