//! camcal CLI: checkerboard detection, mono/stereo calibration and hand-eye.

use camcal::core::{BoardSpec, CalibErr, Pose};
use camcal::logging::{init_logging, level_from_verbosity};
use camcal::detect::{load_gray, BoardDetector, ImageFileDetector};
use camcal::solve::{estimate_board_pose, HandEyeSample};
use camcal::{
    io, robot, CalibrationSession, CornerDetector, DetectorKind, HandEyeMethod, HandEyeOptions,
    ImageState, JsonFileStore, MotionPairing, SessionCalibration, SessionConfig,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "camcal")]
#[command(about = "Checkerboard camera calibration: mono, stereo and robot hand-eye")]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write log events and span timings to stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect board corners in images and print them as JSON.
    Detect(DetectArgs),
    /// Calibrate one camera.
    Mono(MonoArgs),
    /// Calibrate a synchronized camera pair.
    Stereo(StereoArgs),
    /// Solve AX = XB from robot poses and board images.
    Handeye(HandEyeArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetectorArg {
    Chess,
    Saddle,
}

impl DetectorArg {
    fn to_core(self) -> DetectorKind {
        match self {
            Self::Chess => DetectorKind::Chess,
            Self::Saddle => DetectorKind::Saddle,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Tsai,
    Park,
    Horaud,
    Andreff,
    Daniilidis,
}

impl MethodArg {
    fn to_core(self) -> HandEyeMethod {
        match self {
            Self::Tsai => HandEyeMethod::Tsai,
            Self::Park => HandEyeMethod::Park,
            Self::Horaud => HandEyeMethod::Horaud,
            Self::Andreff => HandEyeMethod::Andreff,
            Self::Daniilidis => HandEyeMethod::Daniilidis,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PairingArg {
    Consecutive,
    AllPairs,
}

impl PairingArg {
    fn to_core(self) -> MotionPairing {
        match self {
            Self::Consecutive => MotionPairing::Consecutive,
            Self::AllPairs => MotionPairing::AllPairs,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct BoardArgs {
    /// JSON session config; command-line board options override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inner corners per column.
    #[arg(long)]
    rows: Option<u32>,

    /// Inner corners per row.
    #[arg(long)]
    cols: Option<u32>,

    /// Square size in millimetres.
    #[arg(long)]
    cell_size: Option<f64>,

    /// Raw corner front end.
    #[arg(long, value_enum)]
    detector: Option<DetectorArg>,

    /// Detect one image at a time.
    #[arg(long)]
    sequential: bool,
}

impl BoardArgs {
    fn resolve(&self) -> CliResult<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_json(path)?,
            None => {
                let (Some(rows), Some(cols), Some(cell_size)) = (self.rows, self.cols, self.cell_size)
                else {
                    return Err("either --config or all of --rows --cols --cell-size are required".into());
                };
                SessionConfig::new(BoardSpec {
                    rows,
                    cols,
                    cell_size,
                })
            }
        };
        if let Some(rows) = self.rows {
            config.board.rows = rows;
        }
        if let Some(cols) = self.cols {
            config.board.cols = cols;
        }
        if let Some(cell_size) = self.cell_size {
            config.board.cell_size = cell_size;
        }
        if let Some(kind) = self.detector {
            config.detector.kind = kind.to_core();
        }
        if self.sequential {
            config.parallel = false;
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    #[command(flatten)]
    board: BoardArgs,

    /// Images to search.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Write the JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct OutputArgs {
    /// Camera parameter JSON to write.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Serial number stored in the output file.
    #[arg(long, default_value = "")]
    sn: String,

    /// Per-image records (JSON store) to write after calibrating.
    #[arg(long)]
    records: Option<PathBuf>,

    /// Reject the worst image and recalibrate while its RMS error exceeds this.
    #[arg(long)]
    max_image_error: Option<f64>,

    /// Never drop below this many images while rejecting.
    #[arg(long, default_value = "3")]
    min_images: usize,
}

#[derive(Debug, Clone, Args)]
struct MonoArgs {
    #[command(flatten)]
    board: BoardArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Board images.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct StereoArgs {
    #[command(flatten)]
    board: BoardArgs,

    #[command(flatten)]
    output: OutputArgs,

    /// Left images, index-aligned with --right.
    #[arg(long, num_args = 1.., required = true)]
    left: Vec<PathBuf>,

    /// Right images, index-aligned with --left.
    #[arg(long, num_args = 1.., required = true)]
    right: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct HandEyeArgs {
    #[command(flatten)]
    board: BoardArgs,

    /// Gripper poses: quaternion `.csv` or Rodrigues `.txt`.
    #[arg(long)]
    robot: PathBuf,

    /// Translations in the Rodrigues txt are metres.
    #[arg(long)]
    robot_meters: bool,

    /// Camera parameter JSON for the board images.
    #[arg(long)]
    camera: PathBuf,

    /// Board images, one per robot pose.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = MethodArg::Tsai)]
    method: MethodArg,

    #[arg(long, value_enum, default_value_t = PairingArg::Consecutive)]
    pairing: PairingArg,

    /// Trust only the robot rotations.
    #[arg(long)]
    rotation_only: bool,

    /// Hand-eye JSON to write.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the translation in metres.
    #[arg(long)]
    out_meters: bool,

    #[arg(long, default_value = "")]
    sn: String,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(level_from_verbosity(cli.verbose), cli.log_json)?;

    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Mono(args) => run_mono(&args),
        Commands::Stereo(args) => run_stereo(&args),
        Commands::Handeye(args) => run_hand_eye(&args),
    }
}

fn write_or_print<T: Serialize>(value: &T, out: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => std::fs::write(path, json + "\n")?,
        None => println!("{json}"),
    }
    Ok(())
}

// ── detect ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DetectReport {
    image: PathBuf,
    image_size: Option<(u32, u32)>,
    corners: Option<Vec<[f64; 2]>>,
}

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let config = args.board.resolve()?;
    let board = config.board()?;
    let detector = ImageFileDetector::new(config.detector.clone());

    let detect = |path: &PathBuf| match detector.detect(&board, path) {
        Ok(d) => DetectReport {
            image: path.clone(),
            image_size: Some(d.image_size),
            corners: d.corners.map(|c| c.iter().map(|p| [p.x, p.y]).collect()),
        },
        Err(err) => {
            log::warn!("{err}");
            DetectReport {
                image: path.clone(),
                image_size: None,
                corners: None,
            }
        }
    };
    let reports: Vec<DetectReport> = if config.parallel {
        args.images.par_iter().map(detect).collect()
    } else {
        args.images.iter().map(detect).collect()
    };

    let found = reports.iter().filter(|r| r.corners.is_some()).count();
    log::info!("board found in {found} of {} images", reports.len());
    write_or_print(&reports, args.out.as_deref())
}

// ── mono / stereo ──────────────────────────────────────────────────────

fn calibrate_session(
    session: &mut CalibrationSession,
    parallel: bool,
    output: &OutputArgs,
) -> CliResult<SessionCalibration> {
    let summary = session.detect_all(parallel);
    if summary.detected == 0 {
        return Err(CalibErr::NoCorners.into());
    }

    let mut result = session.calibrate()?;
    if let Some(limit) = output.max_image_error {
        while let Some(worst) = session.worst_image() {
            let err = session
                .record(worst)
                .and_then(|r| r.reprojection_error)
                .unwrap_or(0.0);
            if err <= limit || session.count(ImageState::Calibrated) <= output.min_images {
                break;
            }
            log::info!("rejecting image {worst} with rms {err:.4} px");
            result = session.reject_and_recalibrate(worst)?;
        }
    }

    if let Some(path) = &output.records {
        let mut store = JsonFileStore::create(path)?;
        session.persist(&mut store)?;
    }

    for record in session.records() {
        match (record.state, record.reprojection_error) {
            (ImageState::Calibrated, Some(e)) => {
                eprintln!("{:>10}  {:.4} px  {}", "calibrated", e, record.path.display())
            }
            (state, _) => eprintln!("{:>10}  {:>9}  {}", format!("{state:?}").to_lowercase(), "-", record.path.display()),
        }
    }
    eprintln!("rms reprojection error: {:.4} px", result.rms_error());
    Ok(result)
}

fn run_mono(args: &MonoArgs) -> CliResult<()> {
    let config = args.board.resolve()?;
    let mut session = CalibrationSession::from_config(&config)?;
    session.register_images(args.images.iter().cloned());

    let SessionCalibration::Mono(result) = calibrate_session(&mut session, config.parallel, &args.output)? else {
        return Err("expected a mono calibration".into());
    };
    match &args.output.out {
        Some(path) => io::write_camera_parameters(path, &result, &args.output.sn)?,
        None => println!("{}", serde_json::to_string_pretty(&io::camera_parameters_json(&result, &args.output.sn))?),
    }
    Ok(())
}

fn run_stereo(args: &StereoArgs) -> CliResult<()> {
    if args.left.len() != args.right.len() {
        return Err(CalibErr::SizeMismatch {
            expected: args.left.len(),
            got: args.right.len(),
        }
        .into());
    }
    let config = args.board.resolve()?;
    let mut session = CalibrationSession::from_config(&config)?;
    session.register_stereo_pairs(args.left.iter().cloned().zip(args.right.iter().cloned()));

    let SessionCalibration::Stereo(result) = calibrate_session(&mut session, config.parallel, &args.output)? else {
        return Err("expected a stereo calibration".into());
    };
    let t = result.relative_translation;
    eprintln!("baseline: [{:.3}, {:.3}, {:.3}] mm", t.x, t.y, t.z);
    match &args.output.out {
        Some(path) => io::write_stereo_parameters(path, &result, &args.output.sn)?,
        None => println!("{}", serde_json::to_string_pretty(&io::stereo_parameters_json(&result, &args.output.sn))?),
    }
    Ok(())
}

// ── hand-eye ───────────────────────────────────────────────────────────

fn board_pose(
    detector: &CornerDetector,
    board: &camcal::CalibrationBoard,
    camera: &camcal::CameraModel,
    path: &Path,
) -> Option<Pose> {
    let img = match load_gray(path) {
        Ok(img) => img,
        Err(err) => {
            log::warn!("{err}");
            return None;
        }
    };
    let corners = detector.detect(&img).corners?;
    match estimate_board_pose(board, camera, &corners) {
        Ok(p) => {
            log::debug!("{}: board pose rms {:.4} px", path.display(), p.rms_error);
            Some(p.pose)
        }
        Err(err) => {
            log::warn!("{}: {err}", path.display());
            None
        }
    }
}

fn run_hand_eye(args: &HandEyeArgs) -> CliResult<()> {
    let config = args.board.resolve()?;
    let board = config.board()?;
    let camera = io::read_camera_parameters(&args.camera)?.camera;

    let mut gripper = robot::load_robot_poses(&args.robot, args.robot_meters)?;
    if args.rotation_only {
        robot::sensor_only_rotation(&mut gripper);
    }
    if gripper.len() != args.images.len() {
        return Err(CalibErr::SizeMismatch {
            expected: gripper.len(),
            got: args.images.len(),
        }
        .into());
    }

    let detector = CornerDetector::new(&board, config.detector.clone());
    let poses: Vec<Option<Pose>> = args
        .images
        .par_iter()
        .map(|path| board_pose(&detector, &board, &camera, path))
        .collect();

    // Captures without a board pose are dropped together with their robot pose.
    let samples: Vec<HandEyeSample> = gripper
        .iter()
        .zip(&poses)
        .zip(&args.images)
        .filter_map(|((g, b), path)| match b {
            Some(b) => Some(HandEyeSample {
                gripper: *g,
                board_to_camera: *b,
            }),
            None => {
                eprintln!("skipping {}: no board pose", path.display());
                None
            }
        })
        .collect();

    let options = HandEyeOptions {
        method: args.method.to_core(),
        pairing: args.pairing.to_core(),
    };
    let result = camcal::calibrate_hand_eye(&samples, &options)?;
    eprintln!(
        "{} from {} captures: rotation err {:.4} deg, translation err {:.4} mm",
        result.method,
        samples.len(),
        result.rotation_error_deg,
        result.translation_error_mm
    );

    match &args.out {
        Some(path) => io::write_hand_eye(path, &result, &args.sn, args.out_meters)?,
        None => println!(
            "{}",
            serde_json::to_string_pretty(&io::hand_eye_json(&result, &args.sn, args.out_meters))?
        ),
    }
    Ok(())
}
