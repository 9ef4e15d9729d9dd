//! Game clock advancement and time control.

use bevy_ecs::prelude::*;
use chrono::{Datelike, TimeDelta};
use serde::{Deserialize, Serialize};
use sim_core::{EntityId, GameClock, SimError, SimResult};
use tracing::{debug, info, warn};

use crate::schedule::TickStats;
use crate::world::World;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// External time-control requests.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "speed", rename_all = "snake_case")]
pub enum TimeControl {
    Pause,
    Start,
    /// Ignored unless the speed is finite and positive.
    SetSpeed(f64),
}

fn day_step(speed: f64) -> Option<TimeDelta> {
    if !speed.is_finite() || speed < 0.0 {
        return None;
    }
    let millis = (MILLIS_PER_DAY * speed).round();
    if millis >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}

/// Move `clock` forward by one day times its speed multiplier.
///
/// Returns whether the advancement crossed into a new calendar month. A
/// paused clock stays put and reports no new month.
pub fn advance(clock: &mut GameClock) -> bool {
    if clock.paused {
        clock.new_month = false;
        return false;
    }
    let Some(step) = day_step(clock.speed_multiplier) else {
        warn!(speed = clock.speed_multiplier, "unusable speed multiplier; clock not advanced");
        clock.new_month = false;
        return false;
    };
    let previous = clock.current;
    let Some(next) = previous.checked_add_signed(step) else {
        warn!(current = %previous, "clock reached the end of the calendar");
        clock.new_month = false;
        return false;
    };
    clock.current = next;
    clock.new_month = (previous.year(), previous.month()) != (next.year(), next.month());
    if clock.new_month {
        info!(date = %next.date(), "new month");
    } else {
        debug!(date = %next, "clock advanced");
    }
    clock.new_month
}

/// First system of the tick: advance the singleton clock.
pub fn advance_clock(mut clocks: Query<&mut GameClock>, mut stats: ResMut<TickStats>) {
    stats.new_month = match clocks.get_single_mut() {
        Ok(mut clock) => advance(&mut clock),
        Err(err) => {
            warn!(%err, "no single game clock; skipping advancement");
            false
        }
    };
}

/// Apply a time-control request and return the resulting clock.
pub fn control_time(world: &mut World, control: TimeControl) -> SimResult<GameClock> {
    let mut clock = world
        .clock_mut()
        .ok_or_else(|| SimError::NotFound(format!("game clock {}", EntityId::CLOCK)))?;
    match control {
        TimeControl::Pause => clock.paused = true,
        TimeControl::Start => clock.paused = false,
        TimeControl::SetSpeed(speed) if speed.is_finite() && speed > 0.0 => {
            clock.speed_multiplier = speed;
        }
        TimeControl::SetSpeed(speed) => {
            debug!(speed, "ignoring non-positive speed");
        }
    }
    info!(paused = clock.paused, speed = clock.speed_multiplier, ?control, "time control applied");
    Ok(GameClock::clone(&clock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn world_at(y: i32, m: u32, d: u32, speed: f64) -> World {
        let mut w = World::new();
        let start = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        w.spawn_clock(GameClock::starting(start, speed, 1)).unwrap();
        w
    }

    fn tick(w: &mut World) -> bool {
        w.run_system(advance_clock).new_month
    }

    #[test]
    fn one_day_per_tick_at_unit_speed() {
        let mut w = world_at(2023, 1, 30, 1.0);
        assert!(!tick(&mut w));
        assert_eq!(
            w.clock().unwrap().current_date(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap()
        );
        assert!(tick(&mut w));
        assert!(w.clock().unwrap().new_month);
        assert!(!tick(&mut w));
        assert!(!w.clock().unwrap().new_month);
    }

    #[test]
    fn fractional_speed_accumulates() {
        let mut w = world_at(2023, 1, 31, 0.5);
        assert!(!tick(&mut w));
        assert_eq!(w.clock().unwrap().current.format("%H:%M").to_string(), "12:00");
        assert!(tick(&mut w));
        assert_eq!(
            w.clock().unwrap().current_date(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
    }

    #[test]
    fn paused_clock_does_not_move() {
        let mut w = world_at(2023, 1, 1, 30.0);
        control_time(&mut w, TimeControl::Pause).unwrap();
        let before = w.clock().unwrap().clone();
        for _ in 0..5 {
            assert!(!tick(&mut w));
        }
        assert_eq!(w.clock().unwrap(), &before);
        control_time(&mut w, TimeControl::Start).unwrap();
        assert!(tick(&mut w));
    }

    #[test]
    fn pausing_clears_the_new_month_flag() {
        let mut w = world_at(2023, 1, 31, 1.0);
        assert!(tick(&mut w));
        assert!(w.clock().unwrap().new_month);
        control_time(&mut w, TimeControl::Pause).unwrap();
        assert!(!tick(&mut w));
        assert!(!w.clock().unwrap().new_month);
    }

    #[test]
    fn unusable_speed_clears_the_new_month_flag() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        let mut clock = GameClock::starting(start, 1.0, 1);
        assert!(advance(&mut clock));
        clock.speed_multiplier = f64::INFINITY;
        assert!(!advance(&mut clock));
        assert!(!clock.new_month);
    }

    #[test]
    fn non_positive_speed_is_ignored() {
        let mut w = world_at(2023, 1, 1, 2.0);
        for bad in [0.0, -3.0, f64::NAN] {
            let c = control_time(&mut w, TimeControl::SetSpeed(bad)).unwrap();
            assert_eq!(c.speed_multiplier, 2.0);
        }
        let c = control_time(&mut w, TimeControl::SetSpeed(7.5)).unwrap();
        assert_eq!(c.speed_multiplier, 7.5);
    }

    #[test]
    fn missing_clock_is_not_found() {
        let mut w = World::new();
        assert!(!tick(&mut w));
        assert!(matches!(
            control_time(&mut w, TimeControl::Pause),
            Err(SimError::NotFound(_))
        ));
    }

    #[test]
    fn time_control_wire_format() {
        let c: TimeControl =
            serde_json::from_str(r#"{"action":"set_speed","speed":4.0}"#).unwrap();
        assert_eq!(c, TimeControl::SetSpeed(4.0));
        let p: TimeControl = serde_json::from_str(r#"{"action":"pause"}"#).unwrap();
        assert_eq!(p, TimeControl::Pause);
    }
}
