use crate::domain::clock::ClockRef;
use crate::error::{RelayError, Result};
use chrono::{DateTime, Days, FixedOffset, NaiveTime, Timelike};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Inclusive range of branch-local hours, e.g. `10-21`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    pub fn contains(&self, hour: u32) -> bool {
        self.start <= hour && hour <= self.end
    }
}

impl FromStr for HourWindow {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RelayError::Config(format!("hour window must look like '10-21', got '{s}'"));
        let (start, end) = s.trim().split_once('-').ok_or_else(invalid)?;
        let start: u32 = start.trim().parse().map_err(|_| invalid())?;
        let end: u32 = end.trim().parse().map_err(|_| invalid())?;
        if start > end || end > 23 {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }
}

/// When a periodic job fires, in branch-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every `interval`, starting immediately; ticks outside `hours` are skipped.
    Every {
        interval: Duration,
        hours: Option<HourWindow>,
    },
    /// Once a day at `hour`:00.
    DailyAt(u32),
}

impl Schedule {
    fn runs_at_start(&self) -> bool {
        matches!(self, Schedule::Every { .. })
    }

    pub fn is_active(&self, now: DateTime<FixedOffset>) -> bool {
        match self {
            Schedule::Every {
                hours: Some(window),
                ..
            } => window.contains(now.hour()),
            _ => true,
        }
    }

    /// How long to sleep after a tick that ended at `now`.
    pub fn next_delay(&self, now: DateTime<FixedOffset>) -> Duration {
        match self {
            Schedule::Every { interval, .. } => *interval,
            Schedule::DailyAt(hour) => {
                let at = NaiveTime::from_hms_opt(*hour, 0, 0).unwrap_or(NaiveTime::MIN);
                let today = now.date_naive().and_time(at);
                let target = if today > now.naive_local() {
                    today
                } else {
                    today
                        .checked_add_days(Days::new(1))
                        .unwrap_or(today)
                };
                (target - now.naive_local())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            }
        }
    }
}

/// Runs `tick` on `schedule` until `shutdown` is cancelled.
///
/// A running tick is never interrupted; cancellation only cuts the wait between
/// ticks. Ordinary tick errors are logged. A fatal one cancels `shutdown` for
/// every other task and is returned.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    schedule: Schedule,
    clock: ClockRef,
    shutdown: CancellationToken,
    mut tick: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    info!(job = name, ?schedule, "job scheduled");
    let mut first = true;
    loop {
        if !first || schedule.runs_at_start() {
            let now = clock.now();
            if schedule.is_active(now) {
                if let Err(e) = tick().await {
                    if e.is_fatal() {
                        error!(job = name, error = %e, "fatal error, shutting down");
                        shutdown.cancel();
                        return Err(e);
                    }
                    error!(job = name, error = %e, "tick failed");
                }
            } else {
                debug!(job = name, hour = now.hour(), "outside active hours, skipping tick");
            }
        }
        first = false;

        let delay = schedule.next_delay(clock.now());
        debug!(job = name, delay_secs = delay.as_secs(), "waiting for next tick");
        if shutdown
            .run_until_cancelled(tokio::time::sleep(delay))
            .await
            .is_none()
        {
            info!(job = name, "shutdown requested, job stopped");
            return Ok(());
        }
    }
}
