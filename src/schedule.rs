//! Periodic trigger for the pipeline.
//!
//! Each tick spawns a run through [`Pipeline::try_run_once`], so a tick that
//! fires while the previous run is still downloading is skipped rather than
//! queued or interleaved.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use crate::config::{ScheduleConfig, MAX_INTERVAL_HOURS};
use crate::pipeline::Pipeline;

/// Tick period, clamped to the range config validation enforces.
fn schedule_period(config: &ScheduleConfig) -> Duration {
    let hours = config.interval_hours.clamp(1, MAX_INTERVAL_HOURS);
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Run forever, triggering a sync every `interval_hours` (and immediately
/// when `run_on_startup` is set).
pub async fn run_schedule(pipeline: Arc<Pipeline>, config: ScheduleConfig) {
    let period = schedule_period(&config);
    let immediately = config.run_on_startup;
    let first = if immediately {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = period.as_secs(),
        run_on_startup = immediately,
        "sync schedule started"
    );

    loop {
        ticker.tick().await;
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            info!("running scheduled sync");
            pipeline.try_run_once().await;
        });
    }
}
