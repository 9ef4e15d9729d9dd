use bevy_ecs::schedule::{ExecutorKind, IntoSystemConfigs, Schedule, ScheduleLabel};
use bevy_ecs::system::Resource;

use crate::clock::advance_clock;
use crate::income::{collect_income, IncomeReport};
use crate::neighborhood::update_neighborhoods;
use crate::upgrades::complete_upgrades;

/// Schedule label for one simulation tick.
#[derive(ScheduleLabel, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CityTick;

/// What the tick systems did on their latest run. Each system overwrites
/// its own field.
#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct TickStats {
    pub new_month: bool,
    pub upgrades_completed: usize,
    pub income: IncomeReport,
    pub neighborhoods_boosted: usize,
}

/// Build the tick schedule: clock, upgrade sweep, rent collection and
/// neighborhood aggregation, strictly in that order.
pub fn tick_schedule() -> Schedule {
    let mut schedule = Schedule::new(CityTick);
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems(
        (
            advance_clock,
            complete_upgrades,
            collect_income,
            update_neighborhoods,
        )
            .chain(),
    );
    schedule
}
