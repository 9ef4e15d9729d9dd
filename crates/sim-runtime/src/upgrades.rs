//! Upgrade completion sweep.

use bevy_ecs::prelude::*;
use sim_core::{AppliedUpgrade, EntityId, GameClock, Grouping, Ownership, Upgradable};
use tracing::{debug, info};

use crate::schedule::TickStats;
use crate::world::Indexes;

/// Mark purchased upgrades whose completion date is strictly before the
/// current game date as applied. A property's first completed upgrade is
/// counted once toward its neighborhood's upgraded total.
pub fn complete_upgrades(
    clocks: Query<&GameClock>,
    mut properties: Query<(&EntityId, &mut Upgradable, Option<&Grouping>), With<Ownership>>,
    mut indexes: ResMut<Indexes>,
    mut stats: ResMut<TickStats>,
) {
    stats.upgrades_completed = 0;
    let Ok(today) = clocks.get_single().map(GameClock::current_date) else {
        return;
    };
    for (&property, mut upgradable, grouping) in &mut properties {
        let is_due = |r: &AppliedUpgrade| !r.applied && r.completion_date() < today;
        if !upgradable.applied.iter().any(is_due) {
            continue;
        }
        let had_completed = upgradable.has_completed_upgrade();
        let mut finished = 0;
        for record in upgradable.applied.iter_mut().filter(|r| is_due(r)) {
            record.applied = true;
            finished += 1;
            debug!(%property, upgrade = %record.id, "upgrade completed");
        }
        stats.upgrades_completed += finished;
        if had_completed {
            continue;
        }
        if let Some(grouping) = grouping {
            if indexes.mark_upgraded(grouping.group, property) {
                info!(%property, neighborhood = %grouping.group, "property counted as upgraded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;
    use chrono::{Days, NaiveDate};
    use rust_decimal::Decimal;
    use sim_core::UpgradeDef;
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: &str, days: u32, bought: NaiveDate) -> AppliedUpgrade {
        let def = UpgradeDef {
            id: id.into(),
            name: id.into(),
            cost: Decimal::new(100, 0),
            rent_increase: Decimal::new(50, 0),
            days_to_complete: days,
            prerequisite: None,
        };
        AppliedUpgrade::purchased("Luxury", 0, &def, bought)
    }

    fn setup(today: NaiveDate) -> (World, EntityId, EntityId) {
        let mut w = World::new();
        w.spawn_clock(GameClock::starting(today, 1.0, 1)).unwrap();
        let hood = w.insert_entity(EntityId::neighborhood(1)).unwrap();
        let prop = w.insert_entity(EntityId::property(1)).unwrap();
        w.add_component(prop, Ownership::default()).unwrap();
        w.add_component(prop, Grouping { group: hood }).unwrap();
        w.add_component(prop, Upgradable::new(BTreeMap::new())).unwrap();
        (w, hood, prop)
    }

    fn sweep(w: &mut World) -> usize {
        w.run_system(complete_upgrades).upgrades_completed
    }

    #[test]
    fn completes_only_after_completion_day() {
        let bought = date(2023, 1, 1);
        let (mut w, hood, prop) = setup(bought.checked_add_days(Days::new(7)).unwrap());
        w.get_mut::<Upgradable>(prop)
            .unwrap()
            .applied
            .push(record("renovated_interior", 7, bought));
        assert_eq!(sweep(&mut w), 0);
        assert_eq!(w.upgraded_count(hood), 0);

        w.clock_mut().unwrap().current += chrono::TimeDelta::days(1);
        assert_eq!(sweep(&mut w), 1);
        assert!(w.get::<Upgradable>(prop).unwrap().applied[0].applied);
        assert_eq!(w.upgraded_count(hood), 1);
    }

    #[test]
    fn later_upgrades_do_not_double_count() {
        let bought = date(2023, 1, 1);
        let (mut w, hood, prop) = setup(date(2023, 3, 1));
        w.get_mut::<Upgradable>(prop)
            .unwrap()
            .applied
            .push(record("a", 0, bought));
        sweep(&mut w);
        w.get_mut::<Upgradable>(prop)
            .unwrap()
            .applied
            .push(record("b", 3, bought));
        assert_eq!(sweep(&mut w), 1);
        assert_eq!(w.upgraded_count(hood), 1);
        assert_eq!(sweep(&mut w), 0);
    }

    #[test]
    fn properties_without_ownership_are_skipped() {
        let (mut w, _, prop) = setup(date(2023, 3, 1));
        w.get_mut::<Upgradable>(prop)
            .unwrap()
            .applied
            .push(record("a", 0, date(2023, 1, 1)));
        w.remove_component::<Ownership>(prop).unwrap();
        assert_eq!(sweep(&mut w), 0);
    }
}
