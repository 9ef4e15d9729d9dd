#![deny(warnings)]

//! Core domain records and invariants for City Developer.
//!
//! This crate defines the serializable component records attached to
//! entities in the simulation world (each one a `bevy_ecs` component), the
//! identities those entities carry, the error taxonomy shared by the engine, and validation helpers for
//! catalog data and configuration.

use bevy_ecs::component::Component;
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Kinds of entities that live in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A participant holding funds and owning properties.
    Player,
    /// A rentable, purchasable, upgradable building.
    Property,
    /// A group of properties sharing value statistics and rent boosts.
    Neighborhood,
    /// The singleton game clock.
    GameClock,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Player => "Player",
            EntityKind::Property => "Property",
            EntityKind::Neighborhood => "Neighborhood",
            EntityKind::GameClock => "GameClock",
        };
        f.write_str(name)
    }
}

/// Opaque entity identity: kind plus numeric id, displayed as `Property-61`.
/// Every spawned entity carries its own id as a component.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub kind: EntityKind,
    pub id: u32,
}

impl EntityId {
    /// Reserved identity of the singleton game clock.
    pub const CLOCK: EntityId = EntityId {
        kind: EntityKind::GameClock,
        id: 0,
    };

    pub const fn new(kind: EntityKind, id: u32) -> Self {
        Self { kind, id }
    }

    pub const fn player(id: u32) -> Self {
        Self::new(EntityKind::Player, id)
    }

    pub const fn property(id: u32) -> Self {
        Self::new(EntityKind::Property, id)
    }

    pub const fn neighborhood(id: u32) -> Self {
        Self::new(EntityKind::Neighborhood, id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.id)
    }
}

/// Compile-time tag for each component record type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Info,
    Classification,
    Funds,
    Ownership,
    Purchasable,
    Rentable,
    Upgradable,
    Grouping,
    Neighborhood,
    GameClock,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Descriptive text for players, properties and neighborhoods.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
}

impl Info {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Broad property categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Residential,
    Commercial,
}

/// Property classification. Subtypes are free-form catalog labels
/// (e.g. "Townhome", "DataCenter").
#[derive(Component, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub property_type: PropertyType,
    pub subtype: String,
}

/// Money held by a player. May be credited without bound by the engine.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funds {
    pub amount: Decimal,
}

/// Who owns a property, if anyone.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub owner: Option<EntityId>,
}

impl Ownership {
    pub fn owned(&self) -> bool {
        self.owner.is_some()
    }
}

/// Purchase terms of a property. `purchase_date` is set while owned.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchasable {
    pub price: Decimal,
    pub purchase_date: Option<NaiveDate>,
}

/// Monthly rent terms. `rent_boost` is additive and comes from
/// neighborhood effects.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rentable {
    pub base_rent: Decimal,
    pub rent_boost: Decimal,
}

/// An upgrade definition within a named path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeDef {
    /// Identifier unique within its path.
    pub id: String,
    pub name: String,
    pub cost: Decimal,
    pub rent_increase: Decimal,
    pub days_to_complete: u32,
    /// Index of the prerequisite upgrade in the same path.
    #[serde(default)]
    pub prerequisite: Option<usize>,
}

/// An upgrade purchased for a property. `applied` flips once the
/// completion sweep has seen its completion date pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedUpgrade {
    pub path: String,
    pub index: usize,
    pub id: String,
    pub name: String,
    pub cost: Decimal,
    pub rent_increase: Decimal,
    pub days_to_complete: u32,
    pub purchase_date: NaiveDate,
    pub applied: bool,
}

impl AppliedUpgrade {
    /// Record a freshly purchased upgrade from its definition.
    pub fn purchased(path: &str, index: usize, def: &UpgradeDef, purchase_date: NaiveDate) -> Self {
        Self {
            path: path.to_string(),
            index,
            id: def.id.clone(),
            name: def.name.clone(),
            cost: def.cost,
            rent_increase: def.rent_increase,
            days_to_complete: def.days_to_complete,
            purchase_date,
            applied: false,
        }
    }

    /// Day the work finishes. The upgrade earns rent from the day after.
    pub fn completion_date(&self) -> NaiveDate {
        self.purchase_date
            .checked_add_days(Days::new(u64::from(self.days_to_complete)))
            .unwrap_or(NaiveDate::MAX)
    }
}

/// Upgrade paths available to a property and the upgrades bought so far.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgradable {
    pub paths: BTreeMap<String, Vec<UpgradeDef>>,
    #[serde(default)]
    pub applied: Vec<AppliedUpgrade>,
}

impl Upgradable {
    pub fn new(paths: BTreeMap<String, Vec<UpgradeDef>>) -> Self {
        Self {
            paths,
            applied: Vec::new(),
        }
    }

    fn path(&self, path: &str) -> Result<&[UpgradeDef], SimError> {
        self.paths
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| SimError::NotFound(format!("upgrade path {path:?}")))
    }

    /// Whether the upgrade at `index` of `path` has been purchased.
    pub fn is_applied(&self, path: &str, index: usize) -> bool {
        self.applied
            .iter()
            .any(|u| u.path == path && u.index == index)
    }

    /// True once at least one purchased upgrade has completed.
    pub fn has_completed_upgrade(&self) -> bool {
        self.applied.iter().any(|u| u.applied)
    }

    /// First upgrade of `path` not yet purchased, or `None` at max level.
    pub fn next_index(&self, path: &str) -> Result<Option<usize>, SimError> {
        let defs = self.path(path)?;
        Ok((0..defs.len()).find(|&i| !self.is_applied(path, i)))
    }

    /// Position of the upgrade named `id` within `path`.
    pub fn index_of(&self, path: &str, id: &str) -> Result<usize, SimError> {
        self.path(path)?
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| SimError::NotFound(format!("upgrade {id:?} in path {path:?}")))
    }

    /// Check that the upgrade at `index` of `path` may be purchased now.
    ///
    /// Rejects upgrades already bought, upgrades whose prerequisite chain
    /// loops back on itself and upgrades whose prerequisite is not yet
    /// purchased.
    pub fn check_applicable(&self, path: &str, index: usize) -> Result<&UpgradeDef, SimError> {
        let defs = self.path(path)?;
        let def = defs
            .get(index)
            .ok_or_else(|| SimError::NotFound(format!("upgrade #{index} in path {path:?}")))?;
        if self.is_applied(path, index) {
            return Err(SimError::InvalidState(format!(
                "upgrade {:?} already applied",
                def.id
            )));
        }
        if has_prerequisite_cycle(defs, index) {
            return Err(SimError::InvalidState(format!(
                "upgrade {:?} has a circular prerequisite chain",
                def.id
            )));
        }
        if let Some(req) = def.prerequisite {
            let prereq = defs.get(req).ok_or_else(|| {
                SimError::Inconsistent(format!(
                    "upgrade {:?} references prerequisite #{req} outside path {path:?}",
                    def.id
                ))
            })?;
            if !self.is_applied(path, req) {
                return Err(SimError::InvalidState(format!(
                    "prerequisite {:?} not applied for upgrade {:?}",
                    prereq.id, def.id
                )));
            }
        }
        Ok(def)
    }
}

fn has_prerequisite_cycle(defs: &[UpgradeDef], start: usize) -> bool {
    let mut seen = BTreeSet::new();
    let mut cursor = Some(start);
    while let Some(i) = cursor {
        if !seen.insert(i) {
            return true;
        }
        cursor = defs.get(i).and_then(|u| u.prerequisite);
    }
    false
}

/// Membership of a property in a neighborhood.
#[derive(Component, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub group: EntityId,
}

/// Derived statistics and rent-boost terms of a neighborhood.
#[derive(Component, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborhoodStats {
    pub average_property_value: Decimal,
    pub upgraded_percent: Decimal,
    /// Upgraded percentage that must be exceeded to activate the boost.
    pub rent_boost_threshold_percent: Decimal,
    /// Boost applied to member rents, as a percentage of base rent.
    pub rent_boost_percent: Decimal,
    /// Set once the boost has been applied. Never cleared.
    pub boost_active: bool,
}

impl NeighborhoodStats {
    pub fn with_terms(threshold_percent: Decimal, boost_percent: Decimal) -> Self {
        Self {
            rent_boost_threshold_percent: threshold_percent,
            rent_boost_percent: boost_percent,
            ..Self::default()
        }
    }
}

/// The singleton game clock.
#[derive(Component, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameClock {
    pub current: NaiveDateTime,
    /// Moment through which rent has been processed.
    pub last_updated: NaiveDateTime,
    pub paused: bool,
    /// In-game days per tick (>= 0, may be fractional).
    pub speed_multiplier: f64,
    /// Whether the latest advancement crossed a month boundary.
    pub new_month: bool,
    /// Reserved for future use.
    pub rent_collection_day: u32,
}

impl GameClock {
    /// A running clock at midnight of `date`, nothing processed yet.
    pub fn starting(date: NaiveDate, speed_multiplier: f64, rent_collection_day: u32) -> Self {
        let start = date.and_time(chrono::NaiveTime::MIN);
        Self {
            current: start,
            last_updated: start,
            paused: false,
            speed_multiplier,
            new_month: false,
            rent_collection_day,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::starting(
            config.start_date,
            config.speed_multiplier,
            config.rent_collection_day,
        )
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current.date()
    }

    pub fn last_updated_date(&self) -> NaiveDate {
        self.last_updated.date()
    }
}

/// Simulation configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// In-game date the clock starts at.
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
    /// In-game days per tick (default: 1.0).
    #[serde(default = "default_speed")]
    pub speed_multiplier: f64,
    /// Wall-clock milliseconds between ticks for the real-time driver.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Day of month rent is nominally collected (reserved).
    #[serde(default = "default_rent_collection_day")]
    pub rent_collection_day: u32,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default()
}

fn default_speed() -> f64 {
    1.0
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_rent_collection_day() -> u32 {
    1
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
            speed_multiplier: default_speed(),
            tick_interval_ms: default_tick_interval_ms(),
            rent_collection_day: default_rent_collection_day(),
        }
    }
}

/// Engine and boundary-operation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Entity, component, property or player absent.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation not allowed in the current state (funds, ownership,
    /// upgrade level, prerequisites).
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A component kind was added twice to the same entity.
    #[error("{entity} already has a {kind} component")]
    DuplicateComponent {
        entity: EntityId,
        kind: ComponentKind,
    },
    /// A state that should be impossible was observed.
    #[error("inconsistent state: {0}")]
    Inconsistent(String),
}

pub type SimResult<T> = Result<T, SimError>;

/// Validation errors for catalog data and configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Year outside supported range [1970, 2100].
    #[error("year {0} is out of supported range [1970, 2100]")]
    YearOutOfRange(i32),
    /// Speed multiplier must be finite and >= 0.
    #[error("speed multiplier {0} must be finite and >= 0")]
    InvalidSpeed(f64),
    /// Rent collection day must be a day every month has.
    #[error("rent collection day {0} must be within [1, 28]")]
    RentCollectionDay(u32),
    /// Tick interval must be positive.
    #[error("tick interval must be > 0 ms")]
    ZeroTickInterval,
    /// Price, rent or cost must be non-negative.
    #[error("negative monetary value for {0}")]
    NegativeMoney(String),
    /// Percentages must be non-negative.
    #[error("negative percentage for {0}")]
    NegativePercent(String),
    /// Names must not be blank.
    #[error("blank name")]
    EmptyName,
    /// Upgrade ids must be unique within a path.
    #[error("duplicate upgrade id {id:?} in path {path:?}")]
    DuplicateUpgradeId { path: String, id: String },
    /// Prerequisite must name an upgrade of the same path.
    #[error("prerequisite {prerequisite:?} of {id:?} not found in path {path:?}")]
    PrerequisiteNotFound {
        path: String,
        id: String,
        prerequisite: String,
    },
}

/// Validate simulation configuration.
pub fn validate_config(config: &SimConfig) -> Result<(), ValidationError> {
    let year = config.start_date.year();
    if !(1970..=2100).contains(&year) {
        return Err(ValidationError::YearOutOfRange(year));
    }
    if !config.speed_multiplier.is_finite() || config.speed_multiplier < 0.0 {
        return Err(ValidationError::InvalidSpeed(config.speed_multiplier));
    }
    if !(1..=28).contains(&config.rent_collection_day) {
        return Err(ValidationError::RentCollectionDay(config.rent_collection_day));
    }
    if config.tick_interval_ms == 0 {
        return Err(ValidationError::ZeroTickInterval);
    }
    Ok(())
}

/// Validate a monetary amount.
pub fn validate_money(label: &str, value: Decimal) -> Result<(), ValidationError> {
    if value < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(label.to_string()));
    }
    Ok(())
}

/// Validate descriptive info.
pub fn validate_info(info: &Info) -> Result<(), ValidationError> {
    if info.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

/// Validate neighborhood boost terms.
pub fn validate_neighborhood(stats: &NeighborhoodStats) -> Result<(), ValidationError> {
    if stats.rent_boost_threshold_percent < Decimal::ZERO {
        return Err(ValidationError::NegativePercent("rent boost threshold".into()));
    }
    if stats.rent_boost_percent < Decimal::ZERO {
        return Err(ValidationError::NegativePercent("rent boost".into()));
    }
    Ok(())
}

/// Validate upgrade paths, including prerequisite references.
///
/// Cycles are allowed here; they are rejected when an upgrade is applied.
pub fn validate_upgrade_paths(paths: &BTreeMap<String, Vec<UpgradeDef>>) -> Result<(), ValidationError> {
    for (path, defs) in paths {
        let mut ids: BTreeSet<&str> = BTreeSet::new();
        for def in defs {
            if !ids.insert(def.id.as_str()) {
                return Err(ValidationError::DuplicateUpgradeId {
                    path: path.clone(),
                    id: def.id.clone(),
                });
            }
            validate_money(&format!("cost of {}", def.id), def.cost)?;
            validate_money(&format!("rent increase of {}", def.id), def.rent_increase)?;
            if let Some(req) = def.prerequisite {
                if req >= defs.len() {
                    return Err(ValidationError::PrerequisiteNotFound {
                        path: path.clone(),
                        id: def.id.clone(),
                        prerequisite: format!("#{req}"),
                    });
                }
            }
        }
    }
    Ok(())
}
