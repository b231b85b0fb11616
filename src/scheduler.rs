use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::cancel::CancelFlag;
use crate::error::WatchError;

const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    tick: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Result<Self, WatchError> {
        if interval.is_zero() {
            return Err(WatchError::InvalidSetting(
                "check interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            interval,
            tick: DEFAULT_TICK,
        })
    }

    pub fn every_hours(hours: u64) -> Result<Self, WatchError> {
        Self::new(Duration::from_secs(hours.saturating_mul(3600)))
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn run<T, F>(&self, cancel: &CancelFlag, mut cycle: F) -> usize
    where
        F: FnMut() -> Result<T, WatchError>,
    {
        let mut cycles = 0;
        while !cancel.is_cancelled() {
            cycles += 1;
            if let Err(err) = cycle() {
                error!(error = %err, cycle = cycles, "cycle failed");
            }

            let next = Instant::now() + self.interval;
            info!(
                minutes = self.interval.as_secs() / 60,
                "waiting for next cycle"
            );
            while !cancel.is_cancelled() {
                let now = Instant::now();
                if now >= next {
                    break;
                }
                thread::sleep(self.tick.min(next - now));
            }
        }
        info!(cycles, "scheduler stopped");
        cycles
    }
}
