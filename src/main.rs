use facegate::{
    common::{system_config_file, Config, DevMode},
    core::{AuthResult, AuthSession, AuthStatus, SessionEvents, SidecarExtractor},
    camera::StillCamera,
    storage::{DescriptorStore, DirBackend},
};

use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face enrollment and verification")]
struct Cli {
    /// Enable development mode (saves data locally for testing)
    #[arg(long, global = true)]
    dev: bool,

    /// Path to a config file (defaults to configs/facegate.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the face in a recorded frame, replacing any previous enrollment
    Enroll {
        /// Captured frame (any format the image crate reads)
        #[arg(short, long)]
        frame: PathBuf,
        /// Recorded detections for the frame (defaults to <frame>.json)
        #[arg(short, long)]
        sidecar: Option<PathBuf>,
    },
    /// Verify the face in a recorded frame against the enrollment
    Verify {
        #[arg(short, long)]
        frame: PathBuf,
        #[arg(short, long)]
        sidecar: Option<PathBuf>,
    },
    /// Show enrollment status and the latest attempt
    Status,
    /// List recorded attempts, most recent first
    History {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the enrolled thumbnail to disk
    Thumbnail {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Remove the enrolled face, keeping the attempt history
    Unenroll,
    /// Remove the enrolled face and the attempt history
    Reset,
}

/// Prints session events for a terminal user.
struct ConsoleEvents;

impl SessionEvents for ConsoleEvents {
    fn on_status_change(&self, status: AuthStatus) {
        tracing::debug!("Status: {:?}", status);
        match status {
            AuthStatus::Loading => println!("Loading..."),
            AuthStatus::Detecting => println!("Scanning face..."),
            _ => {}
        }
    }

    fn on_result(&self, result: &AuthResult) {
        let mark = if result.success { "✅" } else { "❌" };
        match result.distance {
            Some(distance) => println!("{} {} (distance {:.3})", mark, result.message, distance),
            None => println!("{} {}", mark, result.message),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on mode
    setup_logging(cli.dev);

    // Create dev mode context
    let dev_mode = DevMode::new(cli.dev)?;
    let config = load_config(cli.config.as_deref(), &dev_mode)?;

    let store_dir = dev_mode.store_dir(&config.storage);
    let store = DescriptorStore::new(
        DirBackend::new(&store_dir)
            .with_context(|| format!("Failed to open store at {}", store_dir.display()))?,
    );

    match cli.command {
        Commands::Enroll { frame, sidecar } => {
            println!("Enrolling face from {}", frame.display());
            let result = run_capture(&config, store, &frame, sidecar, Capture::Enroll).await;
            finish(result);
        }
        Commands::Verify { frame, sidecar } => {
            println!("Verifying face from {}", frame.display());
            let result = run_capture(&config, store, &frame, sidecar, Capture::Verify).await;
            println!("Authentication: {}", if result.success { "SUCCESS" } else { "FAILED" });
            finish(result);
        }
        Commands::Status => {
            match store.load_enrollment() {
                Ok(Some(profile)) => println!(
                    "Enrolled: yes ({} dimensions{})",
                    profile.descriptor.len(),
                    if profile.thumbnail.is_some() { ", thumbnail stored" } else { "" }
                ),
                Ok(None) => println!("Enrolled: no"),
                Err(e) => {
                    tracing::warn!("{}", e);
                    println!("Enrolled: no (stored record is corrupt)");
                }
            }

            let attempts = load_attempts_or_empty(&store);
            match attempts.first() {
                Some(last) => println!(
                    "Last attempt: {} at {} (distance {:.3}, confidence {:.0}%)",
                    if last.success { "success" } else { "failure" },
                    last.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                    last.distance,
                    last.confidence
                ),
                None => println!("Last attempt: none"),
            }
        }
        Commands::History { json } => {
            let attempts = load_attempts_or_empty(&store);
            if json {
                let rows: Vec<serde_json::Value> = attempts
                    .iter()
                    .map(|a| {
                        serde_json::json!({
                            "id": a.id,
                            "timestamp": a.timestamp.to_rfc3339(),
                            "success": a.success,
                            "distance": a.distance,
                            "confidence": a.confidence,
                            "has_thumbnail": a.thumbnail.is_some(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if attempts.is_empty() {
                println!("No attempts recorded");
            } else {
                for attempt in &attempts {
                    println!(
                        "{}  {}  {}  distance {:.3}  confidence {:>3.0}%",
                        attempt.id,
                        attempt.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                        if attempt.success { "✓" } else { "✗" },
                        attempt.distance,
                        attempt.confidence
                    );
                }
            }
        }
        Commands::Thumbnail { output } => {
            let profile = store
                .load_enrollment()?
                .context("No enrolled face")?;
            let thumbnail = profile.thumbnail.context("Enrollment has no thumbnail")?;
            let path = output.unwrap_or_else(|| dev_mode.get_capture_path("enrolled"));
            std::fs::write(&path, thumbnail)?;
            println!("Saved thumbnail to {:?}", path);
        }
        Commands::Unenroll => {
            store.clear_enrollment()?;
            println!("Enrollment removed");
        }
        Commands::Reset => {
            store.clear_all()?;
            println!("Enrollment and attempt history removed");
        }
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum Capture {
    Enroll,
    Verify,
}

async fn run_capture(
    config: &Config,
    store: DescriptorStore<DirBackend>,
    frame: &Path,
    sidecar: Option<PathBuf>,
    capture: Capture,
) -> AuthResult {
    let extractor = match sidecar {
        Some(path) => SidecarExtractor::new(path),
        None => SidecarExtractor::for_frame(frame),
    };

    let session = AuthSession::new(StillCamera::new(frame), extractor, store, ConsoleEvents)
        .with_settings(config.session_settings())
        .with_timing(config.timing());

    let result = match capture {
        Capture::Enroll => session.enroll().await,
        Capture::Verify => session.verify().await,
    };
    session.shutdown().await;
    result
}

fn finish(result: AuthResult) {
    if !result.success {
        std::process::exit(1);
    }
}

fn load_attempts_or_empty(store: &DescriptorStore<DirBackend>) -> Vec<facegate::storage::Attempt> {
    store.load_attempts().unwrap_or_else(|e| {
        tracing::warn!("{}; showing no history", e);
        Vec::new()
    })
}

fn load_config(path: Option<&Path>, dev_mode: &DevMode) -> Result<Config> {
    if let Some(path) = path {
        return Ok(Config::load_from_path(path)?);
    }

    let system = system_config_file();
    if !dev_mode.is_enabled() && system.exists() {
        return Ok(Config::load_from_path(&system)?);
    }

    Ok(Config::load()?)
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
