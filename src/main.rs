use clap::Parser;
use doorlock_core::config::Config;
use doorlock_core::error::Result;
use doorlock_core::frame_source::{CaptureThread, FrameSource};
use doorlock_core::hw::gpio::{NullGpio, ReedDriver, RelayDriver};
use doorlock_core::hw::{DoorController, ReedSensor, UltrasonicSensor};
use doorlock_core::persistence::PersistenceLog;
use doorlock_core::events::EventBus;
use doorlock_core::paths::Paths;
use doorlock_core::service::RecognitionService;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "doorlockd", about = "Face recognition door lock controller")]
struct Args {
    /// Run against a local directory instead of the system config/gallery/db locations.
    #[arg(long)]
    dev_root: Option<std::path::PathBuf>,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt::init();

    if let Err(e) = run(args) {
        tracing::error!("fatal startup error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let paths = match args.dev_root {
        Some(root) => Paths::dev(root),
        None => Paths::system(),
    };

    let mut config = Config::load_from_path(&paths.config_file())?;
    // A config file that doesn't override these leaves the bare relative defaults; resolve them
    // against the runtime's actual data directory instead of whatever the process's cwd happens
    // to be.
    if config.gallery.path == std::path::Path::new("gallery.json") {
        config.gallery.path = paths.gallery_path();
    }
    if config.persistence.db_path == std::path::Path::new("doorlock.db") {
        config.persistence.db_path = paths.db_path();
    }
    config.validate()?;

    tracing::info!(dev = paths.is_dev(), "starting doorlockd");

    let (relay, reed_driver): (Box<dyn RelayDriver>, Box<dyn ReedDriver>) = build_gpio(&config);
    let door = Arc::new(Mutex::new(DoorController::new(relay)));
    let reed = Arc::new(ReedSensor::new(reed_driver));

    let mut ultrasonic = UltrasonicSensor::new();
    start_ultrasonic(&mut ultrasonic, &config);

    let frame_source = FrameSource::new();
    let _capture = CaptureThread::spawn(config.clone(), frame_source.clone());

    let (events, rx) = EventBus::new(64);
    std::thread::spawn(move || {
        for event in rx {
            tracing::info!(?event, "recognition event");
        }
    });

    let persistence = match PersistenceLog::open(&config) {
        Ok(log) => Some(log),
        Err(e) => {
            tracing::warn!("persistence log unavailable: {e}");
            None
        }
    };

    let mut service = RecognitionService::new(config, frame_source, door, reed, events, persistence)?;
    service.start();

    tracing::info!("entering recognition loop");
    loop {
        service.tick();
        std::thread::sleep(Duration::from_millis(33));
    }
}

#[cfg(feature = "hardware")]
fn build_gpio(config: &Config) -> (Box<dyn RelayDriver>, Box<dyn ReedDriver>) {
    use doorlock_core::hw::gpio::rppal_gpio::{RppalRelay, RppalReed};

    let relay: Box<dyn RelayDriver> = match RppalRelay::new(config.door.relay_pin) {
        Ok(r) => Box::new(r),
        Err(e) => {
            tracing::error!("failed to init relay pin {}: {e}; falling back to null gpio", config.door.relay_pin);
            Box::new(NullGpio::new("relay"))
        }
    };
    let reed: Box<dyn ReedDriver> = match RppalReed::new(config.door.reed_pin) {
        Ok(r) => Box::new(r),
        Err(e) => {
            tracing::error!("failed to init reed pin {}: {e}; falling back to null gpio", config.door.reed_pin);
            Box::new(NullGpio::new("reed"))
        }
    };
    (relay, reed)
}

#[cfg(not(feature = "hardware"))]
fn build_gpio(_config: &Config) -> (Box<dyn RelayDriver>, Box<dyn ReedDriver>) {
    (Box::new(NullGpio::new("relay")), Box::new(NullGpio::new("reed")))
}

#[cfg(feature = "hardware")]
fn start_ultrasonic(sensor: &mut UltrasonicSensor, config: &Config) {
    use doorlock_core::hw::ultrasonic::rppal_probe::RppalDistanceProbe;

    match RppalDistanceProbe::new(config.door.ultrasonic_trig_pin, config.door.ultrasonic_echo_pin) {
        Ok(probe) => sensor.start(probe),
        Err(e) => tracing::warn!("ultrasonic sensor unavailable: {e}"),
    }
}

#[cfg(not(feature = "hardware"))]
fn start_ultrasonic(_sensor: &mut UltrasonicSensor, _config: &Config) {}
