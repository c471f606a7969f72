use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::json;

use parking_tracker_rs::{DetectorConfig, ParkingDetector, RawFix, SpeedHistory};

/// Replay recorded drives through the park detector to tune thresholds
#[derive(Parser, Debug)]
struct Args {
    /// Path to a drive log (.json or .json.gz)
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of drive logs to batch replay (*.json[.gz])
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Speed (m/s) that counts as driving
    #[arg(long, default_value = "5.0")]
    high: f64,

    /// Speed (m/s) that counts as stopped
    #[arg(long, default_value = "1.0")]
    low: f64,

    /// Samples averaged on each side of the comparison
    #[arg(long, default_value = "1")]
    window: usize,
}

#[derive(Deserialize)]
struct GpsReading {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed: Option<f64>,
}

#[derive(Deserialize)]
struct Reading {
    gps: Option<GpsReading>,
}

/// Either a plain list of fixes or a sensor log whose readings carry `gps`
#[derive(Deserialize)]
#[serde(untagged)]
enum DriveLog {
    Samples { samples: Vec<RawFix> },
    Readings { readings: Vec<Reading> },
}

impl DriveLog {
    fn into_fixes(self) -> Vec<RawFix> {
        match self {
            DriveLog::Samples { samples } => samples,
            DriveLog::Readings { readings } => readings
                .into_iter()
                .filter_map(|r| r.gps)
                .map(|g| RawFix::new(g.latitude, g.longitude, g.speed))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct Detection {
    index: usize,
    latitude: f64,
    longitude: f64,
}

fn load_log(path: &Path) -> anyhow::Result<Vec<RawFix>> {
    let file = File::open(path)?;
    let log: DriveLog = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(log.into_fixes())
}

/// Run every fix through a detector, re-arming after each park
fn detect_parks(fixes: Vec<RawFix>, config: &DetectorConfig) -> (Vec<Detection>, usize) {
    let mut detector = ParkingDetector::new(config.clone());
    let mut history = SpeedHistory::new(config.window);
    let mut detections = Vec::new();
    let mut skipped = 0;

    for (index, fix) in fixes.into_iter().enumerate() {
        let sample = match fix.normalize() {
            Ok(sample) => sample,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if let Some(event) = detector.observe(&sample, &mut history) {
            detections.push(Detection {
                index,
                latitude: event.coordinates.latitude,
                longitude: event.coordinates.longitude,
            });
            detector = ParkingDetector::new(config.clone());
            history.reset();
        }
    }

    (detections, skipped)
}

fn run_once(path: &Path, config: &DetectorConfig) -> anyhow::Result<serde_json::Value> {
    let fixes = load_log(path)?;
    let total = fixes.len();
    let (detections, skipped) = detect_parks(fixes, config);

    for d in &detections {
        println!(
            "[PARK] {} sample {} at ({:.6}, {:.6})",
            path.display(),
            d.index,
            d.latitude,
            d.longitude
        );
    }

    Ok(json!({
        "log": path.display().to_string(),
        "samples": total,
        "skipped": skipped,
        "parks": detections,
    }))
}

fn is_drive_log(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".json") || name.ends_with(".json.gz")
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = DetectorConfig {
        high_speed_threshold: args.high,
        low_speed_threshold: args.low,
        window: args.window,
    };
    config.validate()?;

    let mut results = Vec::new();
    if let Some(dir) = args.log_dir.as_ref() {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_drive_log(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        for path in paths {
            match run_once(&path, &config) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config)?);
    } else {
        anyhow::bail!("Provide --log or --log-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
