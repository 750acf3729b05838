// src/ui.rs
use crate::config::Variant; // Preset constants per pendulum variant
use crate::error::PendulumError; // Library error type, mapped to JSON bodies here
use crate::mapper::{CoordinateMapper, PositionFrame, VerticalAxis}; // Angle -> position transform
use crate::math::{ParamKey, ParameterSet}; // Physical constants
use crate::render::{plot_limit, trajectory_png}; // Static trajectory plot
use crate::session::{self, Phase, Point, Rect, Session, SessionConfig, SolveTicket}; // Interactive controller
use crate::logic::SolverOptions; // Solver tolerances
use actix_web::{web, HttpResponse, Result}; // Actix-web types for request handling and HTTP responses
use base64::{engine::general_purpose, Engine as _}; // Base64 encoder for embedding image data
use serde::{Deserialize, Serialize}; // Serde traits for JSON (de)serialization
use tokio::sync::Mutex; // Session lock shared by all workers
use tracing::warn;

/// Session shared between request handlers.
pub type SharedSession = web::Data<Mutex<Session>>;

/// Trajectory plot size in pixels.
const PLOT_SIZE: (u32, u32) = (500, 500);

#[derive(Deserialize)]
pub struct SimParams {
    #[serde(default)]
    variant: Variant,              // Which pendulum to simulate
    parameters: Option<ParameterSet>, // Overrides the variant's preset constants
    #[serde(default)]
    initial_angles: String,        // Comma-separated initial angles (degrees); empty = 90 each
    t_max: f64,                    // Maximum simulation time
    n_points: usize,               // Number of samples
}

#[derive(Serialize)]
struct SimResponse {
    success: bool,                 // Whether the simulation succeeded
    error: Option<String>,         // Why it failed, if it did
    trajectory_image: String,      // Base64-encoded PNG image of trajectories
    animation_data: AnimationData, // Raw position data for frontend animation
}

impl SimResponse {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            error: Some(message),
            trajectory_image: String::new(),
            animation_data: AnimationData {
                positions: vec![],
                bobs: 0,
                limit: 0.0,
            },
        }
    }
}

#[derive(Serialize)]
struct AnimationData {
    positions: Vec<PositionFrame>, // Positions over time: [x1, y1, x2, y2]
    bobs: usize,                   // Number of bobs per frame
    limit: f64,                    // Plot boundary limit for consistent scaling
}

/// Parses comma-separated degrees into radians, skipping entries that do not parse.
fn parse_angles(text: &str) -> Vec<f64> {
    text.split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .map(f64::to_radians)
        .collect()
}

fn run_simulation(request: &SimParams) -> crate::Result<SimResponse> {
    let params = request
        .parameters
        .unwrap_or_else(|| request.variant.default_parameters());
    let arms = params.dimension() / 2;

    let mut angles = parse_angles(&request.initial_angles);
    if angles.is_empty() {
        angles = vec![std::f64::consts::FRAC_PI_2; arms];
    }
    if angles.len() != arms {
        return Err(PendulumError::invalid(
            "initial_angles",
            angles.len() as f64,
            "one angle per arm required",
        ));
    }

    // Interleave as [θ1, ω1, θ2, ω2] with every arm at rest.
    let initial_state = angles.iter().flat_map(|&theta| [theta, 0.0]).collect();
    let config = SessionConfig {
        initial_state,
        t_span: (0.0, request.t_max),
        n_points: request.n_points,
        axis: VerticalAxis::Up,
        solver: SolverOptions::default(),
    };
    let solution = session::solve(&params, &config)?;

    let limit = plot_limit(CoordinateMapper::new(&params, VerticalAxis::Up).reach());
    let png = trajectory_png(&solution.frames, limit, None, PLOT_SIZE)?;

    // Convert PNG bytes into a Base64 data URL
    let plot_url = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&png));

    Ok(SimResponse {
        success: true,
        error: None,
        trajectory_image: plot_url,
        animation_data: AnimationData {
            bobs: arms,
            positions: solution.frames,
            limit,
        },
    })
}

/// One-shot simulation: solves, plots, and returns positions for the page to animate.
pub async fn simulate_handler(params: web::Json<SimParams>) -> Result<HttpResponse> {
    let request = params.into_inner();
    // Integration and plotting are CPU bound; keep them off the async workers.
    let outcome = web::block(move || run_simulation(&request)).await?;
    match outcome {
        Ok(response) => Ok(HttpResponse::Ok().json(response)),
        Err(err) => {
            warn!(%err, "Simulation request failed");
            Ok(HttpResponse::Ok().json(SimResponse::failure(err.to_string())))
        }
    }
}

#[derive(Serialize)]
struct SliderView {
    key: ParamKey,
    label: String,
    rect: Rect,
    value: f64,
    handle_x: f64,
}

#[derive(Serialize)]
struct SessionView {
    parameters: ParameterSet,
    sliders: Vec<SliderView>,
    #[serde(flatten)]
    phase: Phase,
    stale: bool,
    error: Option<String>,
    solves: u64,
    frame_index: usize,
    frame_count: usize,
    frame: PositionFrame,
    reach: f64,
}

impl SessionView {
    fn of(session: &Session) -> Self {
        let params = session.current_parameters();
        let sliders = session
            .sliders()
            .iter()
            .map(|s| {
                let value = params.get(s.key).unwrap_or(s.range.min);
                SliderView {
                    key: s.key,
                    label: s.label.clone(),
                    rect: s.rect,
                    value,
                    handle_x: s.handle_x(value),
                }
            })
            .collect();
        Self {
            parameters: params,
            sliders,
            phase: session.phase(),
            stale: session.is_stale(),
            error: session.last_error().map(str::to_string),
            solves: session.solve_count(),
            frame_index: session.frame_index(),
            frame_count: session.frame_count(),
            frame: session.current_frame().clone(),
            reach: CoordinateMapper::new(&session.solution().params, session.config().axis).reach(),
        }
    }
}

async fn view(state: &SharedSession) -> HttpResponse {
    let session = state.lock().await;
    HttpResponse::Ok().json(SessionView::of(&session))
}

/// Runs a ticket on the blocking pool and hands the outcome back to the session.
///
/// The solve lives in its own task: the session leaves Recomputing even if the request is dropped.
async fn complete(state: &SharedSession, ticket: SolveTicket) -> Result<()> {
    let state = state.clone();
    let task = actix_web::rt::spawn(async move {
        let job = ticket.clone();
        let result = web::block(move || job.run())
            .await
            .unwrap_or_else(|err| Err(PendulumError::Aborted(err.to_string())));
        state.lock().await.finish_solve(&ticket, result);
    });
    task.await.map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(())
}

pub async fn session_handler(state: SharedSession) -> HttpResponse {
    view(&state).await
}

pub async fn pointer_down_handler(state: SharedSession, pos: web::Json<Point>) -> HttpResponse {
    state.lock().await.on_pointer_down(pos.into_inner());
    view(&state).await
}

pub async fn pointer_move_handler(state: SharedSession, pos: web::Json<Point>) -> HttpResponse {
    state.lock().await.on_pointer_move(pos.into_inner());
    view(&state).await
}

pub async fn pointer_up_handler(state: SharedSession) -> Result<HttpResponse> {
    let ticket = state.lock().await.release();
    if let Some(ticket) = ticket {
        complete(&state, ticket).await?;
    }
    Ok(view(&state).await)
}

pub async fn tick_handler(state: SharedSession) -> HttpResponse {
    state.lock().await.tick();
    view(&state).await
}

#[derive(Deserialize)]
pub struct ParamEdit {
    key: ParamKey,
    value: f64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn parameter_handler(state: SharedSession, edit: web::Json<ParamEdit>) -> Result<HttpResponse> {
    let edit = edit.into_inner();
    let ticket = state.lock().await.edit(edit.key, edit.value);
    match ticket {
        Ok(Some(ticket)) => complete(&state, ticket).await?,
        Ok(None) => {}
        Err(err) => {
            return Ok(HttpResponse::BadRequest().json(ErrorBody {
                error: err.to_string(),
            }))
        }
    }
    Ok(view(&state).await)
}

/// Registers the JSON API.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/simulate", web::post().to(simulate_handler))
        .service(
            web::scope("/api/session")
                .route("", web::get().to(session_handler))
                .route("/pointer-down", web::post().to(pointer_down_handler))
                .route("/pointer-move", web::post().to(pointer_move_handler))
                .route("/pointer-up", web::post().to(pointer_up_handler))
                .route("/tick", web::post().to(tick_handler))
                .route("/parameter", web::put().to(parameter_handler)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test as actix_test, App};
    use std::time::Duration;
    use serde_json::{json, Value};

    fn shared_session() -> SharedSession {
        let params = ParameterSet::default();
        let config = SessionConfig {
            t_span: (0.0, 5.0),
            n_points: 50,
            ..SessionConfig::for_params(&params)
        };
        web::Data::new(Mutex::new(Session::new(params, config).unwrap()))
    }

    #[test]
    fn angles_are_parsed_in_degrees() {
        let angles = parse_angles("90, 180,junk,");
        assert_eq!(angles.len(), 2);
        assert!((angles[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((angles[1] - std::f64::consts::PI).abs() < 1e-12);
    }

    #[actix_web::test]
    async fn simulate_returns_positions_and_image() {
        let app = actix_test::init_service(App::new().configure(configure)).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/simulate")
            .set_json(json!({
                "variant": "double",
                "initial_angles": "90,90",
                "t_max": 5.0,
                "n_points": 40
            }))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert!(body["trajectory_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        let positions = body["animation_data"]["positions"].as_array().unwrap();
        assert_eq!(positions.len(), 40);
        assert_eq!(positions[0].as_array().unwrap().len(), 4);
        // Both arms horizontal at t = 0, y axis up.
        assert!((positions[0][2].as_f64().unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(body["animation_data"]["limit"], 3.0);
    }

    #[actix_web::test]
    async fn simulate_reports_invalid_request() {
        let app = actix_test::init_service(App::new().configure(configure)).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/simulate")
            .set_json(json!({
                "parameters": {"variant": "double", "m1": 1.0, "m2": 1.0, "l1": 0.0, "l2": 1.0},
                "t_max": 5.0,
                "n_points": 40
            }))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("l1"));
    }

    #[actix_web::test]
    async fn drag_over_http_resolves_once() {
        let state = shared_session();
        let app = actix_test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = actix_test::TestRequest::post().uri("/api/session/tick").to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["frame_index"], 1);

        let req = actix_test::TestRequest::post()
            .uri("/api/session/pointer-down")
            .set_json(json!({"x": 110.0, "y": 660.0}))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["phase"], "dragging");
        assert_eq!(body["key"], "m1");

        let req = actix_test::TestRequest::post()
            .uri("/api/session/pointer-move")
            .set_json(json!({"x": 350.0, "y": 660.0}))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["parameters"]["m1"], 5.0);
        assert_eq!(body["stale"], true);

        let req = actix_test::TestRequest::post().uri("/api/session/pointer-up").to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["phase"], "idle");
        assert_eq!(body["solves"], 2);
        assert_eq!(body["frame_index"], 0);
        assert_eq!(body["stale"], false);
    }

    #[actix_web::test]
    async fn invalid_edit_is_a_bad_request() {
        let state = shared_session();
        let app = actix_test::init_service(App::new().app_data(state.clone()).configure(configure)).await;
        let req = actix_test::TestRequest::put()
            .uri("/api/session/parameter")
            .set_json(json!({"key": "l1", "value": 0.0}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.lock().await.current_parameters().get(ParamKey::Length1), Some(1.0));

        let req = actix_test::TestRequest::put()
            .uri("/api/session/parameter")
            .set_json(json!({"key": "c1", "value": 0.2}))
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["parameters"]["c1"], 0.2);
        assert_eq!(body["solves"], 2);
    }

    #[actix_web::test]
    async fn simulate_rejects_oversized_grid() {
        let app = actix_test::init_service(App::new().configure(configure)).await;
        let req = actix_test::TestRequest::post()
            .uri("/api/simulate")
            .set_json(json!({
                "variant": "simple",
                "t_max": 1.0,
                "n_points": 4_000_000_000_000_000_000u64
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("n_points"));
    }

    #[actix_web::test]
    async fn dropped_release_still_returns_to_idle() {
        let state = shared_session();
        {
            let mut session = state.lock().await;
            assert!(session.on_pointer_down(Point::new(110.0, 660.0)));
            session.on_pointer_move(Point::new(350.0, 660.0));
        }

        // Give up on the request almost immediately, as a disconnecting client would.
        let _ = tokio::time::timeout(Duration::from_millis(1), pointer_up_handler(state.clone())).await;

        for _ in 0..200 {
            if state.lock().await.phase() == Phase::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let mut session = state.lock().await;
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.solve_count(), 2);
        assert!(!session.is_stale());
        assert_eq!(session.solution().params.get(ParamKey::Mass1), Some(5.0));
        assert!(session.on_pointer_down(Point::new(110.0, 660.0)));
    }
}
