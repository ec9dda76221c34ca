use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use romi_nav_runtime::button::ButtonLatch;
use romi_nav_runtime::config::NavConfig;
use romi_nav_runtime::imu_calibration;
use romi_nav_runtime::keyboard::KeyboardInput;
use romi_nav_runtime::runtime::{self, RunOptions, Runtime, RuntimeError};
use romi_nav_runtime::sim::{Course, SimWorld};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CourseKind {
    /// Line and finish bar only
    Straight,
    /// Box on the line halfway to the finish bar
    Obstacle,
}

/// Line-following navigation runtime on a simulated Romi chassis
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON file overriding periods, gains and maneuver geometry
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the effective config as JSON and exit
    #[arg(long)]
    print_config: bool,

    #[arg(long, value_enum, default_value = "obstacle")]
    course: CourseKind,

    /// Distance from the start to the finish bar (m)
    #[arg(long, default_value_t = 2.0)]
    course_length: f64,

    /// Stop after this many seconds
    #[arg(long, default_value = "90", value_parser = parse_seconds)]
    duration_s: Duration,

    /// Pace the loop against the wall clock instead of running as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Read the button and bumper from the keyboard (implies --realtime)
    #[arg(long)]
    interactive: bool,

    /// Scripted button press time when not interactive (s)
    #[arg(long, default_value = "0.5", value_parser = parse_seconds)]
    press_at_s: Duration,

    /// Restore heading sensor calibration from this file at boot
    #[arg(long)]
    imu_cal: Option<PathBuf>,

    /// Save the heading sensor calibration to this file on exit
    #[arg(long)]
    save_imu_cal: Option<PathBuf>,
}

/// Non-negative, finite seconds
fn parse_seconds(text: &str) -> Result<Duration, String> {
    let seconds: f64 = text
        .parse()
        .map_err(|e| format!("'{}' is not a number: {}", text, e))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("'{}' is not a usable time: {}", text, e))
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug for wheel references)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), RuntimeError> {
    let config = match &args.config {
        Some(path) => NavConfig::load(path)?,
        None => NavConfig::default(),
    };

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let course = match args.course {
        CourseKind::Straight => Course::straight(args.course_length),
        CourseKind::Obstacle => Course::with_obstacle(args.course_length, args.course_length / 2.0),
    };

    let button = ButtonLatch::new();
    let mut world = SimWorld::new(course, button.clone());
    if !args.interactive {
        world = world.press_button_at(args.press_at_s);
    }

    let mut devices = world.devices();
    if let Some(path) = &args.imu_cal {
        imu_calibration::restore(devices.imu.as_mut(), path)?;
    }

    let mut nav = Runtime::new(&config, devices, button.clone())?;

    let quit = Arc::new(AtomicBool::new(false));
    let keyboard = if args.interactive {
        Some(KeyboardInput::start(button, world.bump_request(), quit.clone())?)
    } else {
        None
    };

    let options = RunOptions {
        duration: Some(args.duration_s),
        realtime: args.realtime || args.interactive,
        stop_after_maneuvers: (!args.interactive).then_some(1),
        quit: Some(quit),
    };
    let summary = runtime::run(&mut nav, &mut world, options).await;
    drop(keyboard);
    let summary = summary?;

    if let Some(path) = &args.save_imu_cal {
        imu_calibration::save(nav.imu_mut(), path)?;
    }

    info!(
        "Run finished: {} ticks, {:.2}s, state {}, {} maneuver(s) completed",
        summary.ticks, summary.elapsed_s, summary.final_state, summary.maneuvers_completed
    );
    if let Some(pose) = summary.pose {
        info!(
            "Final pose: x {:.3} m, y {:.3} m, heading {:.1} deg",
            pose.x, pose.y, pose.heading
        );
    }
    info!("Summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}
