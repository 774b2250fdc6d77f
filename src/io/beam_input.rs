//! Beam inputs for hosts without GPIO
//!
//! A [`SharedBeam`] is a level line the control loop polls. Feeders drive it
//! from stdin commands or a synthetic traffic pattern, holding the beam
//! broken long enough for the poll loop to see it.

use crate::domain::types::{ActiveLevel, SensorRole};
use crate::services::debounce::LevelSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SharedBeam {
    level: Arc<AtomicBool>,
    active: ActiveLevel,
}

impl SharedBeam {
    pub fn new(active: ActiveLevel) -> Self {
        Self { level: Arc::new(AtomicBool::new(active.idle_level())), active }
    }

    /// Drive the line to "object present" or back to idle
    pub fn set_present(&self, present: bool) {
        let idle = self.active.idle_level();
        self.level.store(if present { !idle } else { idle }, Ordering::Relaxed);
    }

    /// Break the beam for `hold`, then release it
    pub async fn pulse(&self, hold: Duration) {
        self.set_present(true);
        sleep(hold).await;
        self.set_present(false);
    }
}

impl LevelSource for SharedBeam {
    fn level(&mut self) -> bool {
        self.level.load(Ordering::Relaxed)
    }
}

fn parse_command(line: &str) -> Option<SensorRole> {
    match line.trim().to_ascii_lowercase().as_str() {
        "in" | "i" | "enter" => Some(SensorRole::Entry),
        "out" | "o" | "exit" => Some(SensorRole::Exit),
        _ => None,
    }
}

/// Pulse a beam for every `in` / `out` line on stdin
pub async fn run_stdin_feeder(
    entry: SharedBeam,
    exit: SharedBeam,
    hold: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("stdin_feeder_started");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match parse_command(&line) {
                        Some(SensorRole::Entry) => entry.pulse(hold).await,
                        Some(SensorRole::Exit) => exit.pulse(hold).await,
                        None => warn!(input = %line.trim(), "stdin_feeder_unknown_command"),
                    },
                    Ok(None) => {
                        info!("stdin_feeder_eof");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "stdin_feeder_read_failed");
                        return;
                    }
                }
            }
        }
    }
}

/// Deterministic synthetic traffic: each period an arrival is likely and a
/// departure somewhat less so, so the count drifts up and down
pub async fn run_synthetic_traffic(
    entry: SharedBeam,
    exit: SharedBeam,
    period: Duration,
    hold: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(period_ms = %period.as_millis(), "synthetic_traffic_started");
    let mut timer = interval(period);
    let mut seed: u32 = 0x9E37_79B9;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
            _ = timer.tick() => {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let roll = seed % 10;
                let beam = if roll < 6 { &entry } else if roll < 9 { &exit } else { continue };
                debug!(roll = %roll, "synthetic_vehicle");
                beam.pulse(hold).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beam_levels_follow_polarity() {
        let mut beam = SharedBeam::new(ActiveLevel::Low);
        assert!(beam.level());
        beam.set_present(true);
        assert!(!beam.level());

        let mut button = SharedBeam::new(ActiveLevel::High);
        assert!(!button.level());
        button.set_present(true);
        assert!(button.level());
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("in"), Some(SensorRole::Entry));
        assert_eq!(parse_command(" OUT "), Some(SensorRole::Exit));
        assert_eq!(parse_command("left"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulse_releases_beam() {
        let mut beam = SharedBeam::new(ActiveLevel::Low);
        let probe = beam.clone();
        let task = tokio::spawn(async move { probe.pulse(Duration::from_millis(50)).await });
        sleep(Duration::from_millis(10)).await;
        assert!(!beam.level());
        task.await.unwrap();
        assert!(beam.level());
    }
}
