//! Fixed-cadence tick driver.

use std::time::Duration;

use sim_core::SimResult;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::SharedGame;

/// Tick `game` every `period` until `max_ticks` ticks have run (forever
/// when `None`). A slow tick delays the next one; missed ticks are not
/// replayed. Returns the number of ticks run.
pub async fn run_ticker(game: SharedGame, period: Duration, max_ticks: Option<u64>) -> SimResult<u64> {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ran = 0u64;
    while max_ticks.map_or(true, |max| ran < max) {
        ticker.tick().await;
        let report = match game.tick() {
            Ok(report) => report,
            Err(err) => {
                warn!(%err, ran, "tick failed; stopping driver");
                return Err(err);
            }
        };
        ran += 1;
        if report.new_month {
            info!(tick = report.tick, date = ?report.date, credited = %report.rent_credited, "month processed");
        } else {
            debug!(tick = report.tick, date = ?report.date, "tick");
        }
    }
    Ok(ran)
}
