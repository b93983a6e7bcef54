//! Standalone enrollment CLI: drives the camera directly (no running `doorlockd` required),
//! showing an ASCII live preview over SSH while samples are collected, then persists straight
//! to the gallery file.

use clap::Parser;
use doorlock_core::camera::Camera;
use doorlock_core::cli::ascii_preview::{check_for_escape, clear_screen, AsciiRenderer};
use doorlock_core::config::Config;
use doorlock_core::detector::FaceDetector;
use doorlock_core::aligner::LandmarkAligner;
use doorlock_core::embedder::Embedder;
use doorlock_core::enrollment::{EnrollmentOutcome, EnrollmentPipeline};
use doorlock_core::error::Result;
use doorlock_core::gallery::Gallery;
use doorlock_core::paths::Paths;
use doorlock_core::quality::QualityGate;

#[derive(Parser, Debug)]
#[command(name = "doorlock-enroll", about = "Enroll a new face into the door lock gallery")]
struct Args {
    /// Name to enroll under.
    name: String,

    /// Run against a local directory instead of the system config/gallery locations.
    #[arg(long)]
    dev_root: Option<std::path::PathBuf>,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    if let Err(e) = run(args) {
        eprintln!("enrollment failed: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let paths = match args.dev_root {
        Some(root) => Paths::dev(root),
        None => Paths::system(),
    };

    let config = Config::load_from_path(&paths.config_file())?;
    config.validate()?;

    let detector = FaceDetector::new(&config)?;
    let aligner = LandmarkAligner::new(&config);
    let quality = QualityGate::new(&config);
    let embedder = Embedder::new(&config)?;
    let mut gallery = Gallery::load(&config)?;

    if let Some(existing) = gallery.find_by_name(&args.name) {
        eprintln!("'{}' is already enrolled (id={})", args.name, existing.id);
        std::process::exit(1);
    }

    let mut pipeline = EnrollmentPipeline::new(&config);
    pipeline.begin(args.name.clone());

    let mut camera = Camera::new(&config)?;
    let mut session = camera.start_session()?;
    let renderer = AsciiRenderer::new(None, None);

    println!("Enrolling '{}'. Press Esc to cancel.", args.name);

    let result = loop {
        if check_for_escape() {
            break None;
        }
        if pipeline.is_timed_out() {
            println!("\nenrollment timed out");
            break None;
        }

        let frame = match session.capture_frame() {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("capture failed: {e}");
                continue;
            }
        };

        let detection = detector.detect_best(&frame)?;

        match pipeline.feed_frame(&frame, &detector, &aligner, &quality, &embedder, &gallery) {
            Ok(EnrollmentOutcome::SampleAccepted { collected, required }) => {
                clear_screen();
                println!(
                    "{}",
                    renderer.render_frame_with_progress(&frame, detection.as_ref(), collected, required)
                );
                if pipeline.is_ready_to_finalize() {
                    break pipeline.finalize(&mut gallery)?;
                }
            }
            Ok(EnrollmentOutcome::DuplicateDetected { existing_id, existing_name, similarity }) => {
                println!(
                    "\nthis face already matches '{existing_name}' (id={existing_id}, similarity={similarity:.3})"
                );
                break None;
            }
            Ok(EnrollmentOutcome::NoUsableFace(reason)) => {
                clear_screen();
                println!(
                    "{}",
                    renderer.render_frame_with_progress(
                        &frame,
                        detection.as_ref(),
                        0,
                        config.enrollment.samples_required
                    )
                );
                if let Some(reason) = reason {
                    println!("waiting for a usable frame ({reason:?})");
                }
            }
            Err(e) => {
                tracing::warn!("enrollment frame error: {e}");
            }
        }
    };

    match result {
        Some((id, name)) => {
            println!("\nenrolled '{name}' as id {id}");
            Ok(())
        }
        None => {
            pipeline.cancel();
            println!("\nenrollment cancelled");
            std::process::exit(1);
        }
    }
}
