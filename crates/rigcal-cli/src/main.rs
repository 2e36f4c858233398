use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::info;
use rigcal_core::LocalizationResult;
use rigcal_pipeline::{JsonFileSink, RigCalibration, RigCalibrationConfig, RigCalibrationExport};

/// Multi-camera rig calibration from per-camera localization tracks.
#[derive(Debug, Parser)]
#[command(author, version, about = "Rig extrinsic calibration pipeline")]
struct Args {
    /// Directory with one subfolder per camera, each holding `localization.json`.
    #[arg(long)]
    media_dir: PathBuf,

    /// Number of cameras; subfolders are named `0` .. `N-1`.
    #[arg(long, default_value_t = 3)]
    num_cameras: usize,

    /// Optional path to a JSON `RigCalibrationConfig`. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the calibration export.
    #[arg(long, default_value = "trackedcameras.json")]
    export: PathBuf,

    /// Optional path for the full session checkpoint.
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

/// Per-camera load statistics.
#[derive(Debug, Clone, PartialEq)]
struct TrackStats {
    frames: usize,
    localized: usize,
    load_sum: Duration,
    load_min: Duration,
    load_max: Duration,
}

impl TrackStats {
    fn load_mean(&self) -> Duration {
        match u32::try_from(self.frames) {
            Ok(n) if n > 0 => self.load_sum / n,
            _ => Duration::ZERO,
        }
    }
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load `DIR/<camera>/localization.json`, timing each frame's decoding.
fn load_track(media_dir: &Path, camera: usize) -> Result<(Vec<LocalizationResult>, TrackStats)> {
    let path = media_dir
        .join(camera.to_string())
        .join("localization.json");
    let raw: Vec<serde_json::Value> = load_json_file(&path)?;

    let mut track = Vec::with_capacity(raw.len());
    let mut stats = TrackStats {
        frames: raw.len(),
        localized: 0,
        load_sum: Duration::ZERO,
        load_min: Duration::MAX,
        load_max: Duration::ZERO,
    };
    for (frame, value) in raw.into_iter().enumerate() {
        let start = Instant::now();
        let result: LocalizationResult = serde_json::from_value(value).with_context(|| {
            format!("camera {}: malformed localization for frame {}", camera, frame)
        })?;
        let elapsed = start.elapsed();
        stats.load_sum += elapsed;
        stats.load_min = stats.load_min.min(elapsed);
        stats.load_max = stats.load_max.max(elapsed);
        if result.is_valid() {
            stats.localized += 1;
        }
        track.push(result);
    }
    if track.is_empty() {
        stats.load_min = Duration::ZERO;
    }
    Ok((track, stats))
}

fn run(args: &Args) -> Result<RigCalibrationExport> {
    ensure!(args.num_cameras > 0, "--num-cameras must be at least 1");
    let config = match &args.config {
        Some(path) => load_json_file::<RigCalibrationConfig>(path)?,
        None => RigCalibrationConfig::default(),
    };
    let mut calib = RigCalibration::with_config(config)?;

    for camera in 0..args.num_cameras {
        let (track, stats) = load_track(&args.media_dir, camera)?;
        info!(
            "camera {}: {} frames, {} localized, load time sum {:?} mean {:?} min {:?} max {:?}",
            camera,
            stats.frames,
            stats.localized,
            stats.load_sum,
            stats.load_mean(),
            stats.load_min,
            stats.load_max
        );
        calib.set_tracking_result(track, camera)?;
    }

    let start = Instant::now();
    let init = calib.initialize_calibration()?;
    info!(
        "initialization took {:?}: cameras {:?} initialized, {:?} failed",
        start.elapsed(),
        init.initialized_cameras(),
        init.failed_cameras()
    );

    let start = Instant::now();
    let refined = calib.optimize_calibration()?;
    info!(
        "refinement took {:?}: {}",
        start.elapsed(),
        match refined.warning() {
            Some(w) => format!("rejected ({})", w),
            None => format!("{:?}", refined.summary.report.termination),
        }
    );

    let mut sink = JsonFileSink::new(&args.export);
    calib.export_to(&mut sink)?;
    info!("export written to {}", sink.path().display());

    if let Some(path) = &args.checkpoint {
        let json = calib.to_json()?;
        fs::write(path, json)
            .with_context(|| format!("failed to write checkpoint {}", path.display()))?;
        info!("checkpoint written to {}", path.display());
    }

    Ok(calib.export())
}

fn main() {
    env_logger::init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let export = run(&args)?;
    for camera in &export.cameras {
        println!("camera {}: {:?}", camera.camera, camera.status);
    }
    Ok(())
}
