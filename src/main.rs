use pendulum_sim::render::{export_gif, plot_limit, GifOptions};
use pendulum_sim::session::{self, Session};
use pendulum_sim::ui;
use pendulum_sim::{CoordinateMapper, Scenario, Variant, VerticalAxis};

use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Single and double pendulum simulator")]
struct Args {
    /// Log solver and session details.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the interactive viewer and JSON API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
        #[arg(long, default_value_t = Variant::Double)]
        variant: Variant,
        /// Directory with the viewer page.
        #[arg(long, default_value = "static")]
        static_dir: PathBuf,
    },
    /// Solve a scenario and write it out as an animated GIF.
    Export {
        /// JSON scenario file; flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        variant: Option<Variant>,
        /// Defaults to the variant's file name in the working directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        t_end: Option<f64>,
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        fps: Option<u32>,
        /// Draw every n-th sample.
        #[arg(long, default_value_t = 1)]
        stride: usize,
    },
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing::subscriber::set_global_default(FmtSubscriber::builder().with_max_level(level).finish())
        .context("failed to install tracing subscriber")
}

#[allow(clippy::too_many_arguments)]
fn export(
    config: Option<PathBuf>,
    variant: Option<Variant>,
    output: Option<PathBuf>,
    t_end: Option<f64>,
    samples: Option<usize>,
    fps: Option<u32>,
    stride: usize,
) -> Result<()> {
    let mut scenario = match &config {
        Some(path) => Scenario::from_json_file(path)?,
        None => Scenario::preset(variant.unwrap_or_default()),
    };
    if let Some(variant) = variant {
        if scenario.variant != variant {
            // Switching variants drops constants and state meant for the other one.
            scenario.parameters = None;
            scenario.initial_state = None;
        }
        scenario.variant = variant;
    }
    if t_end.is_some() {
        scenario.t_end = t_end;
    }
    if let Some(samples) = samples {
        scenario.samples = samples;
    }
    if let Some(fps) = fps {
        scenario.fps = fps;
    }
    scenario.validate()?;

    let output = output.unwrap_or_else(|| PathBuf::from(scenario.variant.file_name()));
    // Fail before integrating if the file cannot be written.
    pendulum_sim::render::check_target(&output)?;

    let params = scenario.parameters();
    let solution = session::solve(&params, &scenario.session_config(VerticalAxis::Up))?;
    let limit = plot_limit(CoordinateMapper::new(&params, VerticalAxis::Up).reach());
    let options = GifOptions {
        fps: scenario.fps,
        stride,
        title: Some(scenario.variant.title().to_string()),
        ..Default::default()
    };
    export_gif(&output, &solution.frames, limit, &options)?;
    Ok(())
}

async fn serve(addr: String, variant: Variant, static_dir: PathBuf) -> Result<()> {
    let session = Session::with_defaults(variant.interactive_parameters())
        .context("failed to solve the initial trajectory")?;
    let state = web::Data::new(Mutex::new(session));

    info!(%addr, %variant, "Starting server");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(ui::configure)
            .service(Files::new("/", static_dir.clone()).index_file("index.html"))
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {addr}"))?
    .run()
    .await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    match args.command {
        Command::Serve {
            addr,
            variant,
            static_dir,
        } => serve(addr, variant, static_dir).await,
        Command::Export {
            config,
            variant,
            output,
            t_end,
            samples,
            fps,
            stride,
        } => export(config, variant, output, t_end, samples, fps, stride),
    }
}
