//! ToolTest: bench runner
//!
//! Wires the test engine to the simulated chamber and executes one run.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                      │
//! │                                                              │
//! │  SimCamera        SimActuator     JsonlRunStore              │
//! │  (FrameSource)    (ActuatorDriver)(RunStore)                 │
//! │  JsonConfigFile   LogEventSink                               │
//! │  (ConfigPort)     (EventSink)                                │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │             TestService (domain core)              │      │
//! │  │  FSM · grabber · baseline · actuation · analyzer   │      │
//! │  └────────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `tooltest [--config FILE] [--store FILE] [--contaminated] [--no-rotor]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::info;

use tooltest::adapters::json_store::{JsonConfigFile, JsonlRunStore};
use tooltest::adapters::log_sink::LogEventSink;
use tooltest::adapters::sim::{ChamberSpec, SimChamber};
use tooltest::app::metrics::RunStatus;
use tooltest::app::ports::ConfigPort;
use tooltest::app::service::TestService;

struct Args {
    config: PathBuf,
    store: PathBuf,
    contaminated: bool,
    rotor: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: PathBuf::from("tooltest.json"),
        store: PathBuf::from("runs.jsonl"),
        contaminated: false,
        rotor: true,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next().context("--config needs a path")?.into(),
            "--store" => args.store = it.next().context("--store needs a path")?.into(),
            "--contaminated" => args.contaminated = true,
            "--no-rotor" => args.rotor = false,
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = parse_args()?;

    info!("ToolTest v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Configuration ──────────────────────────────────────
    let config = JsonConfigFile::new(&args.config)
        .load()
        .with_context(|| format!("loading {}", args.config.display()))?;

    // ── 2. Adapters ───────────────────────────────────────────
    let chamber = SimChamber::new(ChamberSpec {
        glow: if args.contaminated { 200.0 } else { 0.0 },
        ..ChamberSpec::default()
    });
    let service = TestService::new(
        config,
        chamber.camera(),
        chamber.actuator(args.rotor, Duration::from_millis(200)),
        JsonlRunStore::new(&args.store),
        LogEventSink::new(),
    )
    .context("building test service")?;

    // ── 3. One run ────────────────────────────────────────────
    let outcome = service.start_test().context("test run")?;
    service.acknowledge().context("acknowledging verdict")?;

    let m = &outcome.metrics;
    println!("run        {}", outcome.run_id);
    println!("verdict    {}", outcome.status);
    println!(
        "brightness max {:.3} / threshold {:.3}",
        m.max_brightness,
        m.effective_threshold.unwrap_or(f32::NAN)
    );
    if let Some(pct) = m.pct_above_threshold {
        println!("area above {:.2}%", pct);
    }
    if let Some(path) = &outcome.heatmap {
        println!("heatmap    {}", path.display());
    }
    if !outcome.persisted {
        println!("warning    result NOT saved to {}", args.store.display());
    }

    std::process::exit(match outcome.status {
        RunStatus::Passed => 0,
        RunStatus::Failed => 1,
        RunStatus::AbortedSealWarning | RunStatus::Error => 2,
    })
}
