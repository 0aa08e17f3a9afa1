//! gesture_capture - run the capture pipeline from the command line
//!
//! Pulls frames from the configured source, isolates the gesture region
//! (motion or a fixed manual region) and prints every recognition outcome.
//! Runs until Ctrl-C, or for `--seconds`, or for a single cycle with `--once`.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use gesture_capture::recognize::HttpRecognizer;
use gesture_capture::{BoundingRegion, CaptureConfig, CaptureMode, CaptureScheduler, TickOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or JSON).
    #[arg(long, env = "GESTURE_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source uri (stub://wave, http://camera/snapshot.jpg, a directory).
    #[arg(long)]
    source: Option<String>,
    /// Recognition endpoint, or stub:// for the offline recognizer.
    #[arg(long)]
    endpoint: Option<String>,
    /// Milliseconds between capture cycles.
    #[arg(long)]
    period_ms: Option<u64>,
    /// manual or automatic.
    #[arg(long)]
    mode: Option<CaptureMode>,
    /// Fixed region as x,y,width,height fractions. Implies manual mode.
    #[arg(long)]
    region: Option<BoundingRegion>,
    /// Submit the whole frame when automatic mode finds no motion.
    #[arg(long)]
    fallback_full_frame: bool,
    /// Run one cycle and exit. In automatic mode one extra frame is pulled
    /// first to seed the motion baseline.
    #[arg(long)]
    once: bool,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,
    /// Print the service's alphabet and exit.
    #[arg(long)]
    letters: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = CaptureConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        config.source.uri = source;
    }
    if let Some(endpoint) = args.endpoint {
        config.recognition.endpoint = endpoint;
    }
    if let Some(period_ms) = args.period_ms {
        config.scheduler.period_ms = period_ms;
    }
    if let Some(mode) = args.mode {
        config.scheduler.mode = mode;
    }
    if args.region.is_some() {
        config.scheduler.mode = CaptureMode::Manual;
    }
    if args.fallback_full_frame {
        config.scheduler.fallback_to_full_frame = true;
    }
    config.validate()?;

    if args.letters {
        let recognizer = HttpRecognizer::new(&config.recognition)?;
        let letters: String = recognizer.letters()?.into_iter().collect();
        println!("{}", letters);
        return Ok(());
    }

    let scheduler = Arc::new(CaptureScheduler::from_config(&config)?);
    if let Some(region) = args.region {
        scheduler.select_region(region)?;
    }
    scheduler.set_listener(Arc::new(|outcome: &TickOutcome| println!("{}", outcome)));

    if args.once {
        if scheduler.mode()? == CaptureMode::Automatic {
            scheduler.trigger_once();
            std::thread::sleep(config.scheduler.period());
        }
        let outcome = scheduler.trigger_once();
        return match outcome {
            TickOutcome::Dispatched(result) if !result.succeeded => Err(anyhow!(
                "recognition failed: {}",
                result.failure_reason.unwrap_or_default()
            )),
            _ => Ok(()),
        };
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    if !scheduler.start(config.scheduler.period())? {
        return Err(anyhow!("capture did not start; is the frame source active?"));
    }
    match args.seconds {
        Some(seconds) => {
            let _ = rx.recv_timeout(Duration::from_secs(seconds));
        }
        None => {
            log::info!("gesture_capture running; Ctrl-C to stop");
            let _ = rx.recv();
        }
    }
    scheduler.stop()?;

    let stats = scheduler.stats();
    log::info!(
        "ticks {} (missed {}), dispatched {} (failed {}), discarded {}, skipped {}/{}/{} (in flight/no frame/no region), rejected {}",
        stats.ticks,
        stats.missed_ticks,
        stats.dispatches,
        stats.failures,
        stats.discarded,
        stats.skipped_in_flight,
        stats.skipped_no_frame,
        stats.skipped_no_region,
        stats.rejected
    );
    if let Some(result) = scheduler.last_result() {
        log::info!("last result: {}", result);
    }
    Ok(())
}
