#![deny(warnings)]

//! Simulation runtime for City Developer.
//!
//! Owns the entity/component [`World`] (a `bevy_ecs` world underneath) and
//! runs the per-tick pipeline as a chained bevy schedule: clock
//! advancement, upgrade completion, rent collection and neighborhood
//! aggregation. Player actions and ticks are serialized through
//! [`SharedGame`], a single lock around the whole game.

pub mod actions;
pub mod catalog;
pub mod clock;
pub mod driver;
pub mod income;
pub mod neighborhood;
pub mod schedule;
pub mod snapshot;
pub mod upgrades;
pub mod world;

use std::fmt;
use std::sync::{Arc, Mutex};

use bevy_ecs::schedule::Schedule;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use sim_core::{AppliedUpgrade, EntityId, GameClock, SimError, SimResult};
use tracing::debug;

pub use actions::{Purchase, Sale};
pub use catalog::{Catalog, CatalogError};
pub use clock::TimeControl;
pub use driver::run_ticker;
pub use snapshot::WorldSnapshot;
pub use world::World;

/// What one tick did.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub date: Option<NaiveDateTime>,
    pub new_month: bool,
    pub windows_processed: usize,
    pub rent_payments: usize,
    pub rent_credited: Decimal,
    pub upgrades_completed: usize,
    pub neighborhoods_boosted: usize,
}

/// The world, its tick schedule and running totals.
pub struct Game {
    world: World,
    schedule: Schedule,
    ticks: u64,
    months_rolled: u64,
    rent_total: Decimal,
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("world", &self.world)
            .field("ticks", &self.ticks)
            .field("months_rolled", &self.months_rolled)
            .field("rent_total", &self.rent_total)
            .finish_non_exhaustive()
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new(World::new())
    }
}

impl Game {
    pub fn new(world: World) -> Self {
        Self {
            world,
            schedule: schedule::tick_schedule(),
            ticks: 0,
            months_rolled: 0,
            rent_total: Decimal::ZERO,
        }
    }

    pub fn from_catalog(catalog: &Catalog) -> Result<Self, CatalogError> {
        Ok(Self::new(catalog.build_world()?))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks that crossed into a new month.
    pub fn months_rolled(&self) -> u64 {
        self.months_rolled
    }

    /// Rent credited to all players since the game was created.
    pub fn rent_total(&self) -> Decimal {
        self.rent_total
    }

    /// Run one full tick: clock, upgrade sweep, income, neighborhoods.
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        self.schedule.run(self.world.ecs_mut());
        let stats = self.world.stats();
        self.months_rolled += u64::from(stats.new_month);
        self.rent_total = self.rent_total.saturating_add(stats.income.credited);
        let report = TickReport {
            tick: self.ticks,
            date: self.world.clock().map(|c| c.current),
            new_month: stats.new_month,
            windows_processed: stats.income.windows,
            rent_payments: stats.income.payments,
            rent_credited: stats.income.credited,
            upgrades_completed: stats.upgrades_completed,
            neighborhoods_boosted: stats.neighborhoods_boosted,
        };
        debug!(?report, "tick complete");
        report
    }

    /// Run `n` ticks and return their reports.
    pub fn run_ticks(&mut self, n: u64) -> Vec<TickReport> {
        (0..n).map(|_| self.tick()).collect()
    }

    pub fn control_time(&mut self, control: TimeControl) -> SimResult<GameClock> {
        clock::control_time(&mut self.world, control)
    }

    pub fn buy_property(&mut self, property: EntityId, player: EntityId) -> SimResult<Purchase> {
        actions::buy_property(&mut self.world, property, player)
    }

    pub fn sell_property(&mut self, property: EntityId) -> SimResult<Sale> {
        actions::sell_property(&mut self.world, property)
    }

    pub fn upgrade_property(&mut self, property: EntityId, path: &str) -> SimResult<AppliedUpgrade> {
        actions::upgrade_property(&mut self.world, property, path)
    }

    pub fn upgrade_property_to(
        &mut self,
        property: EntityId,
        path: &str,
        upgrade_id: &str,
    ) -> SimResult<AppliedUpgrade> {
        actions::upgrade_property_to(&mut self.world, property, path, upgrade_id)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot::capture(&self.world)
    }
}

/// A game behind one coarse lock, shared by the ticker and request
/// handlers. A tick or action holds the lock for its full duration.
#[derive(Clone, Debug, Default)]
pub struct SharedGame {
    inner: Arc<Mutex<Game>>,
}

impl SharedGame {
    pub fn new(game: Game) -> Self {
        Self {
            inner: Arc::new(Mutex::new(game)),
        }
    }

    /// Run `f` with exclusive access to the game.
    pub fn with<R>(&self, f: impl FnOnce(&mut Game) -> R) -> SimResult<R> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| SimError::Inconsistent("game lock poisoned".into()))?;
        Ok(f(&mut guard))
    }

    pub fn tick(&self) -> SimResult<TickReport> {
        self.with(Game::tick)
    }

    pub fn snapshot(&self) -> SimResult<WorldSnapshot> {
        self.with(|g| g.snapshot())
    }
}
