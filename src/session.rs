// src/session.rs
// Interactive session: owns the current parameters, the slider layout and the playback cursor,
// and re-solves the trajectory when a slider drag ends.
//
// Phases: Idle (playback advances on tick) -> Dragging (value follows the pointer, playback frozen)
// -> Recomputing (one solve with the released parameters) -> Idle with a fresh trajectory at frame 0.
//
// A solve is described by a SolveTicket stamped with a generation number. Only the result of the
// newest ticket is installed; older results are dropped. The synchronous path (on_pointer_up) runs
// the ticket inline, the web front-end runs it on a worker thread.

use crate::error::Result;
use crate::logic::{Solver, SolverOptions, Trajectory};
use crate::mapper::{CoordinateMapper, PositionFrame, VerticalAxis};
use crate::math::{ParamKey, ParamRange, ParameterSet};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use tracing::{debug, info, warn};

/// Pointer position in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in screen pixels; the right and bottom edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }
}

/// A horizontal slider bound to one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slider {
    pub key: ParamKey,
    pub label: String,
    pub rect: Rect,
    /// Value at the right edge before clamping.
    pub scale: f64,
    pub range: ParamRange,
}

impl Slider {
    /// Value selected by a pointer at screen x, clamped to the slider's range.
    pub fn value_at(&self, x: f64) -> f64 {
        self.range.clamp((x - self.rect.x) / self.rect.width * self.scale)
    }

    /// Screen x of the handle for `value`.
    pub fn handle_x(&self, value: f64) -> f64 {
        self.rect.x + (value - self.range.min) / (self.range.max - self.range.min) * self.rect.width
    }
}

const SLIDER_WIDTH: f64 = 300.0;
const SLIDER_HEIGHT: f64 = 20.0;
const SLIDER_Y_START: f64 = 650.0;
const SLIDER_SPACING: f64 = 50.0;

/// Slider layout of the 800x800 viewer: one column for the single pendulum, two for the double.
pub fn default_sliders(params: &ParameterSet) -> Vec<Slider> {
    let single = matches!(params, ParameterSet::Single { .. });
    params
        .keys()
        .iter()
        .enumerate()
        .map(|(i, &key)| {
            let column = i / 3;
            let row = i % 3;
            let (label, scale) = match (single, key) {
                (true, ParamKey::Mass1) => ("Mass (m)".to_string(), 10.0),
                (true, ParamKey::Length1) => ("Length (l)".to_string(), 10.0),
                (true, _) => ("Damping (b)".to_string(), 1.0),
                (false, k) if k.is_damping() => (format!("Damping {} ({})", column + 1, k.name()), 1.0),
                (false, ParamKey::Mass1 | ParamKey::Mass2) => (format!("Mass {} ({})", column + 1, key.name()), 5.0),
                (false, _) => (format!("Length {} ({})", column + 1, key.name()), 5.0),
            };
            Slider {
                key,
                label,
                rect: Rect::new(
                    50.0 + 400.0 * column as f64,
                    SLIDER_Y_START + SLIDER_SPACING * row as f64,
                    SLIDER_WIDTH,
                    SLIDER_HEIGHT,
                ),
                scale,
                range: key.range(),
            }
        })
        .collect()
}

/// What the controller is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "key", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Dragging(ParamKey),
    Recomputing,
}

/// Everything besides the physical constants that a solve needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub initial_state: Vec<f64>,
    pub t_span: (f64, f64),
    pub n_points: usize,
    pub axis: VerticalAxis,
    pub solver: SolverOptions,
}

impl SessionConfig {
    /// Defaults of the interactive viewers: every arm released from horizontal at rest,
    /// 100 s / 1000 samples for the double pendulum, 50 s / 500 samples for the single one.
    pub fn for_params(params: &ParameterSet) -> Self {
        let (t_end, n_points) = match params {
            ParameterSet::Single { .. } => (50.0, 500),
            ParameterSet::Double { .. } => (100.0, 1000),
        };
        let initial_state = (0..params.dimension())
            .map(|i| if i % 2 == 0 { FRAC_PI_2 } else { 0.0 })
            .collect();
        Self {
            initial_state,
            t_span: (0.0, t_end),
            n_points,
            axis: VerticalAxis::Down,
            solver: SolverOptions::default(),
        }
    }
}

/// A solved trajectory together with the constants it was solved for.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub params: ParameterSet,
    pub trajectory: Trajectory,
    pub frames: Vec<PositionFrame>,
}

/// A pending solve. Cheap to move to another thread.
#[derive(Debug, Clone)]
pub struct SolveTicket {
    generation: u64,
    params: ParameterSet,
    config: SessionConfig,
}

impl SolveTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs the solve. Does not touch the session.
    pub fn run(&self) -> Result<Solution> {
        solve(&self.params, &self.config)
    }
}

/// Integrates `params` under `config` and maps every sample to a frame.
pub fn solve(params: &ParameterSet, config: &SessionConfig) -> Result<Solution> {
    let model = params.model()?;
    let trajectory = Solver::new(config.solver).solve(
        &model,
        &config.initial_state,
        config.t_span,
        config.n_points,
    )?;
    let frames = CoordinateMapper::new(params, config.axis).map_trajectory(&trajectory);
    info!(
        samples = trajectory.len(),
        steps = trajectory.stats.accepted_steps,
        rejected = trajectory.stats.rejected_steps,
        "Trajectory solved"
    );
    Ok(Solution {
        params: *params,
        trajectory,
        frames,
    })
}

/// State of one interactive viewer.
#[derive(Debug, Clone)]
pub struct Session {
    params: ParameterSet,
    config: SessionConfig,
    sliders: Vec<Slider>,
    solution: Solution,
    frame: usize,
    phase: Phase,
    last_solve_failed: bool,
    last_error: Option<String>,
    generation: u64,
    solve_count: u64,
}

impl Session {
    /// Creates a session and solves the initial trajectory.
    pub fn new(params: ParameterSet, config: SessionConfig) -> Result<Self> {
        params.check_ranges()?;
        let solution = solve(&params, &config)?;
        Ok(Self {
            sliders: default_sliders(&params),
            params,
            config,
            solution,
            frame: 0,
            phase: Phase::Idle,
            last_solve_failed: false,
            last_error: None,
            generation: 0,
            solve_count: 1,
        })
    }

    /// Session with the default configuration for the variant of `params`.
    pub fn with_defaults(params: ParameterSet) -> Result<Self> {
        let config = SessionConfig::for_params(&params);
        Self::new(params, config)
    }

    pub fn current_parameters(&self) -> ParameterSet {
        self.params
    }

    /// Positions to draw this tick.
    pub fn current_frame(&self) -> &PositionFrame {
        &self.solution.frames[self.frame]
    }

    pub fn frame_index(&self) -> usize {
        self.frame
    }

    pub fn frame_count(&self) -> usize {
        self.solution.frames.len()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sliders(&self) -> &[Slider] {
        &self.sliders
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of solves started, the initial one included.
    pub fn solve_count(&self) -> u64 {
        self.solve_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True when the displayed trajectory does not reflect the current parameters.
    pub fn is_stale(&self) -> bool {
        self.last_solve_failed || !matches!(self.phase, Phase::Idle) || self.solution.params != self.params
    }

    /// Advances playback by one frame, holding on the last one. Only moves while idle.
    pub fn tick(&mut self) {
        if self.phase == Phase::Idle && self.frame + 1 < self.solution.frames.len() {
            self.frame += 1;
        }
    }

    /// Starts a drag if `pos` hits a slider. Returns whether a drag started.
    pub fn on_pointer_down(&mut self, pos: Point) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        match self.sliders.iter().find(|s| s.rect.contains(pos)) {
            Some(slider) => {
                debug!(key = slider.key.name(), "Drag started");
                self.phase = Phase::Dragging(slider.key);
                true
            }
            None => false,
        }
    }

    /// Updates the dragged value from the pointer x. Returns whether a value changed.
    pub fn on_pointer_move(&mut self, pos: Point) -> bool {
        let Phase::Dragging(key) = self.phase else {
            return false;
        };
        let Some(slider) = self.sliders.iter().find(|s| s.key == key) else {
            return false;
        };
        let value = slider.value_at(pos.x);
        match self.params.with_value(key, value) {
            Ok(next) => {
                let changed = next != self.params;
                self.params = next;
                changed
            }
            Err(err) => {
                warn!(%err, "Rejected slider value");
                false
            }
        }
    }

    /// Ends a drag and re-solves with the released parameters. Returns whether a solve ran.
    pub fn on_pointer_up(&mut self) -> bool {
        match self.release() {
            Some(ticket) => {
                let result = ticket.run();
                self.finish_solve(&ticket, result);
                true
            }
            None => false,
        }
    }

    /// Ends a drag and hands out the solve for the released parameters without running it.
    pub fn release(&mut self) -> Option<SolveTicket> {
        if let Phase::Dragging(key) = self.phase {
            debug!(key = key.name(), value = self.params.get(key), "Drag released");
            Some(self.begin_solve())
        } else {
            None
        }
    }

    /// Sets one value directly. Invalid values are rejected and the previous value is kept.
    /// Outside a drag the trajectory is re-solved right away; during a drag the release does it.
    pub fn set_parameter(&mut self, key: ParamKey, value: f64) -> Result<()> {
        if let Some(ticket) = self.edit(key, value)? {
            let result = ticket.run();
            self.finish_solve(&ticket, result);
        }
        Ok(())
    }

    /// Like [`Session::set_parameter`], but hands out the solve instead of running it.
    pub fn edit(&mut self, key: ParamKey, value: f64) -> Result<Option<SolveTicket>> {
        let next = self.params.with_value(key, value).inspect_err(|err| {
            warn!(%err, "Rejected parameter edit");
        })?;
        self.params = next;
        if matches!(self.phase, Phase::Dragging(_)) {
            Ok(None)
        } else {
            Ok(Some(self.begin_solve()))
        }
    }

    /// Snapshots the current parameters into a new ticket, superseding any outstanding one.
    pub fn begin_solve(&mut self) -> SolveTicket {
        self.generation += 1;
        self.solve_count += 1;
        self.phase = Phase::Recomputing;
        SolveTicket {
            generation: self.generation,
            params: self.params,
            config: self.config.clone(),
        }
    }

    /// Installs the outcome of `ticket` if it is still the newest one. Returns whether it was used.
    ///
    /// A failed solve keeps the previous trajectory on screen and marks the session stale.
    pub fn finish_solve(&mut self, ticket: &SolveTicket, result: Result<Solution>) -> bool {
        if ticket.generation != self.generation {
            warn!(
                ticket = ticket.generation,
                current = self.generation,
                "Discarding superseded solve"
            );
            return false;
        }
        match result {
            Ok(solution) => {
                self.solution = solution;
                self.frame = 0;
                self.last_solve_failed = false;
                self.last_error = None;
            }
            Err(err) => {
                warn!(%err, "Solve failed, keeping previous trajectory");
                self.last_solve_failed = true;
                self.last_error = Some(err.to_string());
            }
        }
        self.phase = Phase::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PendulumError;

    fn quick_config(params: &ParameterSet) -> SessionConfig {
        SessionConfig {
            t_span: (0.0, 5.0),
            n_points: 50,
            ..SessionConfig::for_params(params)
        }
    }

    fn double_session() -> Session {
        let params = ParameterSet::default();
        Session::new(params, quick_config(&params)).unwrap()
    }

    fn slider_point(session: &Session, key: ParamKey, value: f64) -> Point {
        let slider = session.sliders().iter().find(|s| s.key == key).unwrap();
        Point::new(
            slider.rect.x + value / slider.scale * slider.rect.width,
            slider.rect.y + slider.rect.height / 2.0,
        )
    }

    #[test]
    fn default_layout_matches_viewer() {
        let sliders = default_sliders(&ParameterSet::default());
        assert_eq!(sliders.len(), 6);
        assert_eq!(sliders[0].key, ParamKey::Mass1);
        assert_eq!(sliders[0].rect, Rect::new(50.0, 650.0, 300.0, 20.0));
        assert_eq!(sliders[2].label, "Damping 1 (c1)");
        assert_eq!(sliders[4].rect, Rect::new(450.0, 700.0, 300.0, 20.0));
        assert_eq!(sliders[4].label, "Length 2 (l2)");

        let single = default_sliders(&ParameterSet::single(1.0, 1.0, 0.0));
        assert_eq!(single.len(), 3);
        assert_eq!(single[1].scale, 10.0);
        assert_eq!(single[2].label, "Damping (b)");
    }

    #[test]
    fn slider_value_is_clamped() {
        let slider = &default_sliders(&ParameterSet::default())[0];
        assert_eq!(slider.value_at(50.0), 0.01);
        assert_eq!(slider.value_at(2000.0), 10.0);
        assert!((slider.value_at(110.0) - 1.0).abs() < 1e-12);
        assert!((slider.handle_x(10.0) - 350.0).abs() < 1e-12);
    }

    #[test]
    fn playback_advances_and_holds() {
        let mut session = double_session();
        assert_eq!(session.frame_index(), 0);
        for _ in 0..200 {
            session.tick();
        }
        assert_eq!(session.frame_index(), session.frame_count() - 1);
    }

    #[test]
    fn drag_and_release_triggers_exactly_one_solve() {
        let mut session = double_session();
        for _ in 0..10 {
            session.tick();
        }
        let solves = session.solve_count();

        assert!(session.on_pointer_down(slider_point(&session, ParamKey::Mass1, 1.0)));
        assert_eq!(session.phase(), Phase::Dragging(ParamKey::Mass1));
        for value in [2.0, 3.0, 4.0, 5.0] {
            session.on_pointer_move(slider_point(&session, ParamKey::Mass1, value));
            session.tick();
        }
        // Frozen while dragging, no solve yet.
        assert_eq!(session.frame_index(), 10);
        assert_eq!(session.solve_count(), solves);
        assert!(session.is_stale());
        assert_eq!(session.solution().params.get(ParamKey::Mass1), Some(1.0));

        assert!(session.on_pointer_up());
        assert_eq!(session.solve_count(), solves + 1);
        assert_eq!(session.frame_index(), 0);
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.is_stale());
        let m1 = session.current_parameters().get(ParamKey::Mass1).unwrap();
        assert!((m1 - 5.0).abs() < 1e-9);
        assert_eq!(session.solution().params, session.current_parameters());
    }

    #[test]
    fn pointer_events_outside_sliders_are_ignored() {
        let mut session = double_session();
        assert!(!session.on_pointer_down(Point::new(400.0, 100.0)));
        assert!(!session.on_pointer_move(Point::new(200.0, 660.0)));
        assert!(!session.on_pointer_up());
        assert_eq!(session.solve_count(), 1);
    }

    #[test]
    fn zero_length_edit_is_rejected() {
        let mut session = double_session();
        let err = session.set_parameter(ParamKey::Length1, 0.0).unwrap_err();
        assert!(matches!(err, PendulumError::InvalidParameter { .. }));
        assert_eq!(session.current_parameters().get(ParamKey::Length1), Some(1.0));
        assert_eq!(session.solve_count(), 1);
    }

    #[test]
    fn valid_edit_resolves() {
        let mut session = double_session();
        session.set_parameter(ParamKey::Damping2, 0.3).unwrap();
        assert_eq!(session.solve_count(), 2);
        assert_eq!(session.solution().params.get(ParamKey::Damping2), Some(0.3));
    }

    #[test]
    fn superseded_ticket_is_discarded() {
        let mut session = double_session();
        session.on_pointer_down(slider_point(&session, ParamKey::Length2, 1.0));
        session.on_pointer_move(slider_point(&session, ParamKey::Length2, 2.0));
        let old = session.release().unwrap();
        let newer = session.begin_solve();
        assert!(newer.generation() > old.generation());

        let old_result = old.run();
        assert!(!session.finish_solve(&old, old_result));
        assert_eq!(session.phase(), Phase::Recomputing);

        let result = newer.run();
        assert!(session.finish_solve(&newer, result));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn failed_solve_keeps_previous_trajectory() {
        let mut session = double_session();
        for _ in 0..5 {
            session.tick();
        }
        let before = session.solution().clone();
        let ticket = session.begin_solve();
        assert!(session.finish_solve(&ticket, Err(PendulumError::diverged(1.0, "step budget exhausted"))));
        assert_eq!(session.solution(), &before);
        assert_eq!(session.frame_index(), 5);
        assert!(session.is_stale());
        assert!(session.last_error().unwrap().contains("step budget"));
        // Playback continues on the old trajectory.
        session.tick();
        assert_eq!(session.frame_index(), 6);
    }

    #[test]
    fn out_of_range_initial_parameters_are_rejected() {
        let params = ParameterSet::single(1.0, 20.0, 0.0);
        assert!(Session::with_defaults(params).is_err());
    }
}
