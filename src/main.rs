use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use parking_tracker_rs::{
    Coordinates, Credentials, FixFeed, LocationProvider, ParkingClient, ParkingSpot, RawFix,
    SampleOutcome, TermuxLocationProvider, TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "parking_tracker")]
#[command(about = "Crowd-sourced parking spots: nearby query, manual reports, automatic park detection", long_about = None)]
struct Args {
    /// JSON config file; anything it leaves out keeps its default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session token (falls back to $PARKING_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Where fixes come from: JSON lines on stdin, or termux-location
    #[arg(long, value_enum, default_value = "stdin", global = true)]
    source: SourceKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum SourceKind {
    Stdin,
    Termux,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch location until a park is detected, then report it
    Track {
        /// Speed (m/s) that counts as driving
        #[arg(long)]
        high: Option<f64>,

        /// Speed (m/s) that counts as stopped
        #[arg(long)]
        low: Option<f64>,

        /// Samples averaged on each side of the comparison
        #[arg(long)]
        window: Option<usize>,
    },

    /// List spots around a position (default: current fix)
    Nearby {
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Report a free spot at a position (default: current fix)
    Report {
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Confirm that a reported spot is really free
    Confirm { id: i64 },

    /// Flag a reported spot as fake
    Flag { id: i64 },
}

fn load_config(args: &Args) -> Result<TrackerConfig> {
    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };

    if let Some(url) = &args.api_url {
        config.backend.base_url = url.clone();
    }
    if let Command::Track { high, low, window } = &args.command {
        if let Some(high) = high {
            config.detector.high_speed_threshold = *high;
        }
        if let Some(low) = low {
            config.detector.low_speed_threshold = *low;
        }
        if let Some(window) = window {
            config.detector.window = *window;
        }
    }

    config.validate()?;
    Ok(config)
}

fn credentials(args: &Args) -> Credentials {
    match args
        .token
        .clone()
        .or_else(|| std::env::var("PARKING_TOKEN").ok())
    {
        Some(token) => Credentials::with_token(token),
        None => Credentials::new(),
    }
}

fn parse_line(line: &str) -> Option<RawFix> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(fix) => Some(fix),
        Err(e) => {
            log::warn!("Skipping unreadable fix {:?}: {}", line, e);
            None
        }
    }
}

/// Reads JSON fixes from stdin into `feed` until EOF, then closes it
fn spawn_stdin_feeder(feed: FixFeed) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if let Some(fix) = parse_line(&line) {
                feed.push(fix);
            }
        }
        log::info!("stdin closed, ending location stream");
        feed.close();
    });
}

/// Block until stdin yields one usable fix
fn read_first_fix(feed: &FixFeed) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read fix from stdin")?;
        if let Some(fix) = parse_line(&line) {
            feed.push(fix);
            return Ok(());
        }
    }
    anyhow::bail!("stdin ended before a fix was read")
}

fn print_spots(spots: &[ParkingSpot]) {
    if spots.is_empty() {
        println!("No spots reported nearby");
        return;
    }
    let now = Utc::now();
    for spot in spots {
        let distance = spot
            .distance_m
            .map(|d| format!("{:.0} m", d))
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  #{:<6} ({:.6}, {:.6})  {:>7}  reported {} min ago",
            spot.id,
            spot.latitude,
            spot.longitude,
            distance,
            spot.minutes_since_reported(now)
        );
    }
}

async fn track(client: &mut ParkingClient) -> Result<()> {
    println!("Tracking drive, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.stop_tracking();
                println!("Tracking stopped");
                return Ok(());
            }
            event = client.next_event() => match event {
                Some(Ok(SampleOutcome::Parked { event, report })) => {
                    println!(
                        "Parked at ({:.6}, {:.6})",
                        event.coordinates.latitude, event.coordinates.longitude
                    );
                    match report.await {
                        Ok(Ok(())) => println!("Parking location reported"),
                        Ok(Err(e)) => eprintln!("Parking report failed: {}", e),
                        Err(e) => eprintln!("Parking report task aborted: {}", e),
                    }
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Location watch failed"),
                None => {
                    println!("Location stream ended without a park");
                    return Ok(());
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let credentials = credentials(&args);

    let feed = FixFeed::new();
    let provider: Arc<dyn LocationProvider> = match args.source {
        SourceKind::Stdin => Arc::new(feed.clone()),
        SourceKind::Termux => Arc::new(TermuxLocationProvider::new()),
    };

    log::info!(
        "Backend {} ({} s timeout), source {:?}",
        config.backend.base_url,
        config.backend.timeout_secs,
        args.source
    );
    let mut client = ParkingClient::connect(config, provider, credentials)?;

    match args.command {
        Command::Track { .. } => {
            // Watch before feeding so no early fix is missed
            client.start_tracking()?;
            if args.source == SourceKind::Stdin {
                spawn_stdin_feeder(feed);
            }
            track(&mut client).await?;
        }
        Command::Nearby { lat, lon } => {
            let spots = match lat.zip(lon) {
                Some((lat, lon)) => client.refresh_nearby_at(Coordinates::new(lat, lon)).await?,
                None => {
                    if args.source == SourceKind::Stdin {
                        read_first_fix(&feed)?;
                    }
                    client.locate().await?
                }
            };
            print_spots(spots);
        }
        Command::Report { lat, lon } => {
            let here = match lat.zip(lon) {
                Some((lat, lon)) => Coordinates::new(lat, lon),
                None => {
                    if args.source == SourceKind::Stdin {
                        read_first_fix(&feed)?;
                    }
                    client.locate().await?;
                    client
                        .region()
                        .context("No position available to report")?
                }
            };
            client.report_spot_at(here).await?;
            println!("Spot reported at ({:.6}, {:.6})", here.latitude, here.longitude);
            print_spots(client.nearby_spots());
        }
        Command::Confirm { id } => {
            client.confirm_spot(id).await?;
            println!("Spot #{} confirmed", id);
        }
        Command::Flag { id } => {
            client.flag_spot(id).await?;
            println!("Spot #{} flagged as fake", id);
        }
    }

    Ok(())
}
