//! Rent collection.
//!
//! Each tick the span between the clock's last processed date and its
//! current date is split into rent windows, every owned property is
//! assessed per window, and the owner is credited. The last processed date
//! then moves up to the current date.

use bevy_ecs::prelude::*;
use rust_decimal::Decimal;
use sim_core::{EntityId, Funds, GameClock, Purchasable, Rentable, Upgradable};
use sim_econ::{rent_windows, window_rent, RentBasis, RentWindow, UpgradeAccrual};
use tracing::{debug, info, warn};

use crate::schedule::TickStats;
use crate::world::{Indexes, Registry};

/// Outcome of one rent-collection pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncomeReport {
    pub windows: usize,
    pub payments: usize,
    pub credited: Decimal,
}

type RentTerms<'a> = (&'a Rentable, &'a Purchasable, Option<&'a Upgradable>);

/// Rent due for `property` over `window`, or `None` when the property has
/// no purchase date or the assessment overflows.
fn rent_due(
    property: EntityId,
    (rentable, purchasable, upgradable): RentTerms<'_>,
    window: &RentWindow,
) -> Option<Decimal> {
    let purchase_date = purchasable.purchase_date?;
    let upgrades: Vec<UpgradeAccrual> = upgradable
        .map(|u| {
            u.applied
                .iter()
                .map(|r| UpgradeAccrual {
                    rent_increase: r.rent_increase,
                    completion_date: r.completion_date(),
                })
                .collect()
        })
        .unwrap_or_default();
    let basis = RentBasis {
        base_rent: rentable.base_rent,
        rent_boost: rentable.rent_boost,
        purchase_date,
        upgrades: &upgrades,
    };
    match window_rent(window, &basis) {
        Ok(rent) => Some(rent),
        Err(err) => {
            warn!(%property, %err, "rent assessment failed; skipping");
            None
        }
    }
}

fn credit(funds: &mut Funds, owner: EntityId, amount: Decimal) -> bool {
    match funds.amount.checked_add(amount) {
        Some(total) => {
            funds.amount = total;
            true
        }
        None => {
            warn!(%owner, %amount, "funds overflow; rent dropped");
            false
        }
    }
}

/// Collect rent for every owned property. Does nothing while paused.
pub fn collect_income(
    mut clocks: Query<&mut GameClock>,
    registry: Res<Registry>,
    indexes: Res<Indexes>,
    properties: Query<RentTerms<'static>>,
    mut funds: Query<&mut Funds>,
    mut stats: ResMut<TickStats>,
) {
    stats.income = IncomeReport::default();
    let Ok(mut clock) = clocks.get_single_mut() else {
        return;
    };
    if clock.paused {
        return;
    }
    let (last, current) = (clock.last_updated_date(), clock.current_date());
    if current < last {
        debug!(%last, %current, "clock behind last processed date; no rent");
    }
    let windows = rent_windows(last, current);
    let mut report = IncomeReport {
        windows: windows.len(),
        ..IncomeReport::default()
    };
    let owned = indexes.ownerships();
    for window in &windows {
        for &(owner, property) in &owned {
            let Some(terms) = registry.entity(property).and_then(|e| properties.get(e).ok()) else {
                continue;
            };
            let Some(rent) = rent_due(property, terms, window) else {
                continue;
            };
            if rent <= Decimal::ZERO {
                continue;
            }
            let Some(mut owner_funds) = registry.entity(owner).and_then(|e| funds.get_mut(e).ok()) else {
                warn!(%owner, "owner has no funds component; rent dropped");
                continue;
            };
            if credit(&mut owner_funds, owner, rent) {
                report.payments += 1;
                report.credited = report.credited.saturating_add(rent);
                debug!(%property, %owner, %rent, start = %window.start, end = %window.end, "rent credited");
            }
        }
    }
    clock.last_updated = clock.current;
    if report.payments > 0 {
        info!(windows = report.windows, payments = report.payments, credited = %report.credited, "rent collected");
    }
    stats.income = report;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{advance_clock, control_time, TimeControl};
    use crate::world::World;
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;
    use sim_core::{AppliedUpgrade, Ownership, UpgradeDef};
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn collect(w: &mut World) -> IncomeReport {
        w.run_system(collect_income).income.clone()
    }

    fn advance(w: &mut World) -> bool {
        w.run_system(advance_clock).new_month
    }

    struct Fixture {
        world: World,
        player: EntityId,
        property: EntityId,
    }

    fn owned_property(purchased: NaiveDate, rent: i64) -> Fixture {
        let mut world = World::new();
        world
            .spawn_clock(GameClock::starting(purchased, 1.0, 1))
            .unwrap();
        let player = world.insert_entity(EntityId::player(1)).unwrap();
        world.add_component(player, Funds::default()).unwrap();
        let property = world.insert_entity(EntityId::property(61)).unwrap();
        world
            .add_component(
                property,
                Rentable {
                    base_rent: dec(rent),
                    rent_boost: Decimal::ZERO,
                },
            )
            .unwrap();
        world
            .add_component(
                property,
                Purchasable {
                    price: dec(300_000),
                    purchase_date: Some(purchased),
                },
            )
            .unwrap();
        world
            .add_component(property, Ownership { owner: Some(player) })
            .unwrap();
        world
            .add_component(property, Upgradable::new(BTreeMap::new()))
            .unwrap();
        Fixture {
            world,
            player,
            property,
        }
    }

    impl Fixture {
        fn jump_to(&mut self, d: NaiveDate) -> IncomeReport {
            self.world.clock_mut().unwrap().current = d.and_time(NaiveTime::MIN);
            collect(&mut self.world)
        }

        fn funds(&self) -> Decimal {
            self.world.get::<Funds>(self.player).unwrap().amount
        }
    }

    #[test]
    fn purchase_late_in_january() {
        let mut f = owned_property(date(2023, 1, 27), 1000);
        f.jump_to(date(2023, 2, 1));
        assert_eq!(f.funds(), dec(125));
    }

    #[test]
    fn first_of_month_purchase_and_three_month_skip() {
        let mut f = owned_property(date(2023, 1, 1), 1000);
        f.jump_to(date(2023, 2, 1));
        assert_eq!(f.funds(), dec(965));
        let report = f.jump_to(date(2023, 5, 1));
        assert_eq!(report.windows, 3);
        assert_eq!(f.funds(), dec(3965));
    }

    #[test]
    fn last_day_purchase_is_paid_from_next_month() {
        let mut f = owned_property(date(2023, 1, 31), 1000);
        assert!(advance(&mut f.world));
        let report = collect(&mut f.world);
        assert_eq!(report.payments, 1);
        assert_eq!(f.funds(), dec(1000));
    }

    #[test]
    fn leap_and_common_februaries() {
        let mut f = owned_property(date(2024, 2, 1), 1000);
        f.jump_to(date(2024, 3, 1));
        assert_eq!(f.funds(), dec(965));
        let mut f = owned_property(date(2023, 2, 15), 1000);
        f.jump_to(date(2023, 3, 1));
        assert_eq!(f.funds(), dec(460));
    }

    #[test]
    fn daily_ticks_within_a_month_pay_nothing() {
        let mut f = owned_property(date(2023, 3, 3), 1000);
        for _ in 0..20 {
            advance(&mut f.world);
            assert_eq!(collect(&mut f.world).payments, 0);
        }
        let clock = f.world.clock().unwrap();
        assert_eq!(clock.last_updated, clock.current);
    }

    #[test]
    fn paused_clock_collects_nothing() {
        let mut f = owned_property(date(2023, 1, 10), 1000);
        control_time(&mut f.world, TimeControl::Pause).unwrap();
        for _ in 0..60 {
            advance(&mut f.world);
            collect(&mut f.world);
        }
        assert_eq!(f.funds(), Decimal::ZERO);
        assert_eq!(f.world.clock().unwrap().current_date(), date(2023, 1, 10));
    }

    #[test]
    fn backwards_clock_is_a_no_op() {
        let mut f = owned_property(date(2023, 5, 10), 1000);
        f.world.clock_mut().unwrap().last_updated = date(2023, 8, 1).and_time(NaiveTime::MIN);
        let report = collect(&mut f.world);
        assert_eq!(report, IncomeReport::default());
        assert_eq!(f.funds(), Decimal::ZERO);
    }

    #[test]
    fn upgrades_add_prorated_increase() {
        let purchased = date(2023, 1, 15);
        let mut f = owned_property(purchased, 1000);
        let def = UpgradeDef {
            id: "smart_home".into(),
            name: "Smart Home".into(),
            cost: dec(20_000),
            rent_increase: dec(200),
            days_to_complete: 0,
            prerequisite: None,
        };
        f.world
            .get_mut::<Upgradable>(f.property)
            .unwrap()
            .applied
            .push(AppliedUpgrade::purchased("Tech", 0, &def, purchased));
        f.jump_to(date(2023, 2, 1));
        assert_eq!(f.funds(), dec(615));
    }

    #[test]
    fn neighborhood_boost_is_included_in_rent() {
        let mut f = owned_property(date(2023, 1, 31), 1000);
        f.world.get_mut::<Rentable>(f.property).unwrap().rent_boost = dec(100);
        f.jump_to(date(2023, 2, 1));
        assert_eq!(f.funds(), dec(1100));
    }

    #[test]
    fn unowned_and_incomplete_properties_are_skipped() {
        let mut f = owned_property(date(2023, 1, 1), 1000);
        f.world.get_mut::<Purchasable>(f.property).unwrap().purchase_date = None;
        assert_eq!(f.jump_to(date(2023, 3, 1)).payments, 0);
        f.world.transfer_ownership(f.property, None).unwrap();
        f.world.get_mut::<Purchasable>(f.property).unwrap().purchase_date = Some(date(2023, 1, 1));
        assert_eq!(f.jump_to(date(2023, 5, 1)).payments, 0);
        assert_eq!(f.funds(), Decimal::ZERO);
    }

    #[test]
    fn overflowing_credit_is_dropped_without_panicking() {
        let mut f = owned_property(date(2023, 1, 1), 1000);
        f.world.get_mut::<Funds>(f.player).unwrap().amount = Decimal::MAX;
        let report = f.jump_to(date(2023, 2, 1));
        assert_eq!(report.windows, 1);
        assert_eq!(report.payments, 0);
        assert_eq!(report.credited, Decimal::ZERO);
        assert_eq!(f.funds(), Decimal::MAX);
    }

    #[test]
    fn report_total_saturates_instead_of_panicking() {
        let mut f = owned_property(date(2022, 12, 31), 0);
        let rent = Decimal::MAX / dec(40);
        for i in 2..=50u32 {
            let owner = f.world.insert_entity(EntityId::player(i)).unwrap();
            f.world.add_component(owner, Funds::default()).unwrap();
            let prop = f.world.insert_entity(EntityId::property(100 + i)).unwrap();
            f.world
                .add_component(prop, Rentable { base_rent: rent, rent_boost: Decimal::ZERO })
                .unwrap();
            f.world
                .add_component(prop, Purchasable { price: dec(1), purchase_date: Some(date(2022, 12, 31)) })
                .unwrap();
            f.world.add_component(prop, Ownership { owner: Some(owner) }).unwrap();
        }
        let report = f.jump_to(date(2023, 1, 1));
        assert_eq!(report.payments, 49);
        assert_eq!(report.credited, Decimal::MAX);
    }

    proptest! {
        #[test]
        fn last_day_purchase_pays_full_next_month(y in 2000i32..2100, m in 1u32..=12, rent in 1i64..50_000) {
            let start = date(y, m, 1);
            let last = sim_econ::month_end(start);
            let mut f = owned_property(last, rent * 5);
            let next = sim_econ::next_month_start(last).unwrap();
            f.jump_to(next);
            prop_assert_eq!(f.funds(), dec(rent * 5));
        }
    }
}
