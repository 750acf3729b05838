// src/lib.rs
// Single and double pendulum simulation: closed-form dynamics, an adaptive Dormand-Prince integrator,
// screen/plot coordinate mapping, an interactive slider session, and plot/GIF rendering.

pub mod config;
pub mod error;
pub mod logic;
pub mod mapper;
pub mod math;
pub mod render;
pub mod session;
pub mod ui;

pub use config::{Scenario, Variant};
pub use error::{PendulumError, Result};
pub use logic::{Solver, SolverOptions, Trajectory};
pub use mapper::{CoordinateMapper, PositionFrame, VerticalAxis};
pub use math::{Dynamics, Model, ParamKey, ParameterSet, GRAVITY};
pub use session::{Point, Session, SessionConfig, Solution, SolveTicket};
