//! alert-runner: headless runner for the treasury alert engine.
//!
//! Usage:
//!   alert-runner --seed 12345 --ticks 120 --tick-ms 250
//!   alert-runner --config alerts.json --ipc-mode

use anyhow::{anyhow, Result};
use std::env;
use std::io::{self, Write};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use treasury_alerts_core::{
    config::{EngineConfig, ThresholdConfig, ThresholdUpdate},
    feed::SimulatedFeed,
    stats::AlertStats,
    transaction::TransactionEvent,
    Alert, AlertEngine, MonitoringState, Notification, Topic,
};

/// Open alerts included in each state reply.
const STATE_ALERT_LIMIT: usize = 50;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Ingest { event: TransactionEvent },
    Acknowledge { id: String, actor: String },
    Resolve { id: String, actor: String },
    UpdateThresholds { update: ThresholdUpdate },
    Start,
    Stop,
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    monitoring:    MonitoringState,
    stats:         AlertStats,
    thresholds:    ThresholdConfig,
    active_alerts: Vec<Alert>,
    pending_escalations: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 60u64);
    let tick_ms = parse_arg(&args, "--tick-ms", 0u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str());

    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if tick_ms > 0 {
        config.tick_interval = Duration::from_millis(tick_ms);
    }

    if ipc_mode {
        let engine = AlertEngine::new(config)?;
        forward_notifications(&engine);
        return run_ipc_loop(&engine).await;
    }

    println!("Treasury alerts: alert-runner");
    println!("  seed:      {seed}");
    println!("  ticks:     {ticks}");
    println!("  tick:      {:?}", config.tick_interval);
    println!("  config:    {}", config_path.unwrap_or("(defaults)"));
    println!();

    let run_for = run_duration(config.tick_interval, ticks)?;
    let engine = AlertEngine::builder()
        .config(config)
        .source(Box::new(SimulatedFeed::new(seed)))
        .build()?;
    log_notifications(&engine);

    engine.start_monitoring();
    tokio::time::sleep(run_for).await;
    engine.stop_monitoring();

    print_summary(&engine, ticks);
    Ok(())
}

/// Timed mode: every notification goes to the log.
fn log_notifications(engine: &AlertEngine) {
    for topic in Topic::ALL {
        engine.subscribe(topic, move |n| {
            match n.alert() {
                Some(alert) => log::info!(
                    "[{topic}] {} {} {}: {}",
                    alert.severity,
                    alert.alert_type,
                    alert.id,
                    alert.message
                ),
                None => log::info!("[{topic}]"),
            }
            Ok(())
        });
    }
}

/// IPC mode: every notification is written to stdout as its own line.
fn forward_notifications(engine: &AlertEngine) {
    for topic in Topic::ALL {
        engine.subscribe(topic, |n: &Notification| {
            let line = serde_json::to_string(&serde_json::json!({ "notification": n }))?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{line}")?;
            stdout.flush()?;
            Ok(())
        });
    }
}

async fn run_ipc_loop(engine: &AlertEngine) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&line) {
            Ok(c) => c,
            Err(e) => {
                write_line(&serde_json::json!({ "error": e.to_string() }))?;
                continue;
            }
        };

        let outcome = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Ok(()),
            IpcCommand::Start => {
                engine.start_monitoring();
                Ok(())
            }
            IpcCommand::Stop => {
                engine.stop_monitoring();
                Ok(())
            }
            IpcCommand::Ingest { event } => engine.ingest(&event).map(|_| ()),
            IpcCommand::Acknowledge { id, actor } => {
                engine.acknowledge_alert(&id, &actor).map(|_| ())
            }
            IpcCommand::Resolve { id, actor } => engine.resolve_alert(&id, &actor).map(|_| ()),
            IpcCommand::UpdateThresholds { update } => {
                engine.update_thresholds(update).map(|_| ())
            }
        };

        match outcome {
            Ok(()) => write_line(&build_ui_state(engine))?,
            Err(e) => write_line(&serde_json::json!({ "error": e.to_string() }))?,
        }
    }

    engine.stop_monitoring();
    Ok(())
}

fn write_line<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

fn build_ui_state(engine: &AlertEngine) -> UiState {
    UiState {
        monitoring:    engine.monitoring_state(),
        stats:         engine.get_alert_stats(),
        thresholds:    engine.thresholds(),
        active_alerts: engine.get_latest_active(STATE_ALERT_LIMIT),
        pending_escalations: engine.pending_escalations(),
    }
}

fn print_summary(engine: &AlertEngine, ticks: u64) {
    let stats = engine.get_alert_stats();

    println!("=== RUN SUMMARY ===");
    println!("  ticks run:      {ticks}");
    println!("  alerts:         {}", stats.total);
    println!("  still open:     {}", stats.active);
    println!("  last 24h:       {}", stats.last_24_hours);

    println!();
    println!("=== BY SEVERITY ===");
    for (severity, count) in &stats.by_severity {
        println!("  {:<10} {count}", severity.as_str());
    }

    println!();
    println!("=== BY CATEGORY ===");
    for (category, count) in &stats.by_category {
        println!("  {:<20} {count}", category.as_str());
    }

    let latest = engine.get_alert_history(5);
    if !latest.is_empty() {
        println!();
        println!("=== LATEST ALERTS ===");
        for alert in &latest {
            println!(
                "  {} | {:<8} | {:<22} | {}",
                alert.timestamp.format("%H:%M:%S"),
                alert.severity.as_str(),
                alert.alert_type.as_str(),
                alert.title
            );
        }
    }
}

/// How long a timed run lasts: `ticks` intervals plus half a tick, so
/// the last scheduled poll lands before stop.
fn run_duration(tick_interval: Duration, ticks: u64) -> Result<Duration> {
    let ticks = u32::try_from(ticks).map_err(|_| anyhow!("--ticks {ticks} is too large"))?;
    tick_interval
        .checked_mul(ticks)
        .and_then(|d| d.checked_add(tick_interval / 2))
        .ok_or_else(|| anyhow!("{ticks} ticks of {tick_interval:?} overflows the run duration"))
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_duration_adds_half_a_tick() {
        let d = run_duration(Duration::from_millis(100), 10).unwrap();
        assert_eq!(d, Duration::from_millis(1050));
    }

    #[test]
    fn run_duration_rejects_tick_counts_past_u32() {
        assert!(run_duration(Duration::from_millis(1), u64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn run_duration_rejects_overflow() {
        assert!(run_duration(Duration::MAX / 2, 3).is_err());
    }
}
