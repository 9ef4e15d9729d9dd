//! Static catalog of players, neighborhoods and properties, loaded from
//! YAML and turned into a populated world.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use sim_core::{
    validate_config, validate_info, validate_money, validate_neighborhood, validate_upgrade_paths,
    Classification, EntityId, Funds, GameClock, Grouping, Info, NeighborhoodStats, Ownership,
    PropertyType, Purchasable, Rentable, SimConfig, SimError, Upgradable, UpgradeDef,
    ValidationError,
};
use thiserror::Error;
use tracing::info;

use crate::world::World;

/// Errors raised while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    World(#[from] SimError),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub config: SimConfig,
    #[serde(default)]
    pub players: Vec<PlayerEntry>,
    #[serde(default)]
    pub neighborhoods: Vec<NeighborhoodEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlayerEntry {
    pub id: u32,
    pub name: String,
    pub funds: Decimal,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NeighborhoodEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub rent_boost_threshold_percent: Decimal,
    pub rent_boost_percent: Decimal,
    #[serde(default)]
    pub properties: Vec<PropertyEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PropertyEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub subtype: String,
    pub base_rent: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub upgrade_paths: BTreeMap<String, Vec<UpgradeEntry>>,
}

/// Upgrade as written in the catalog; the prerequisite names another
/// upgrade of the same path by id.
#[derive(Clone, Debug, Deserialize)]
pub struct UpgradeEntry {
    pub id: String,
    pub name: String,
    pub cost: Decimal,
    pub rent_increase: Decimal,
    pub days_to_complete: u32,
    #[serde(default)]
    pub prerequisite: Option<String>,
}

fn resolve_path(path: &str, entries: &[UpgradeEntry]) -> Result<Vec<UpgradeDef>, ValidationError> {
    entries
        .iter()
        .map(|e| {
            let prerequisite = match &e.prerequisite {
                None => None,
                Some(req) => Some(entries.iter().position(|o| &o.id == req).ok_or_else(|| {
                    ValidationError::PrerequisiteNotFound {
                        path: path.to_string(),
                        id: e.id.clone(),
                        prerequisite: req.clone(),
                    }
                })?),
            };
            Ok(UpgradeDef {
                id: e.id.clone(),
                name: e.name.clone(),
                cost: e.cost,
                rent_increase: e.rent_increase,
                days_to_complete: e.days_to_complete,
                prerequisite,
            })
        })
        .collect()
}

impl Catalog {
    pub fn from_yaml_str(src: &str) -> Result<Self, CatalogError> {
        Ok(serde_yaml::from_str(src)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&src)
    }

    /// Validate the catalog and build the initial world: clock, players,
    /// neighborhoods and their unowned properties.
    pub fn build_world(&self) -> Result<World, CatalogError> {
        validate_config(&self.config)?;
        let mut world = World::new();
        world.spawn_clock(GameClock::from_config(&self.config))?;

        for p in &self.players {
            let info = Info::named(&p.name);
            validate_info(&info)?;
            validate_money(&format!("funds of player {}", p.id), p.funds)?;
            let id = world.insert_entity(EntityId::player(p.id))?;
            world.add_component(id, info)?;
            world.add_component(id, Funds { amount: p.funds })?;
        }

        for n in &self.neighborhoods {
            let info = Info {
                name: n.name.clone(),
                address: String::new(),
                description: n.description.clone(),
            };
            validate_info(&info)?;
            let stats =
                NeighborhoodStats::with_terms(n.rent_boost_threshold_percent, n.rent_boost_percent);
            validate_neighborhood(&stats)?;
            let hood = world.insert_entity(EntityId::neighborhood(n.id))?;
            world.add_component(hood, info)?;
            world.add_component(hood, stats)?;
            for prop in &n.properties {
                self.add_property(&mut world, hood, prop)?;
            }
        }

        info!(
            entities = world.len(),
            players = self.players.len(),
            neighborhoods = self.neighborhoods.len(),
            start = %self.config.start_date,
            "world built from catalog"
        );
        Ok(world)
    }

    fn add_property(&self, world: &mut World, hood: EntityId, p: &PropertyEntry) -> Result<(), CatalogError> {
        let info = Info {
            name: p.name.clone(),
            address: p.address.clone(),
            description: p.description.clone(),
        };
        validate_info(&info)?;
        validate_money(&format!("rent of {}", p.name), p.base_rent)?;
        validate_money(&format!("price of {}", p.name), p.price)?;
        let paths = p
            .upgrade_paths
            .iter()
            .map(|(name, entries)| Ok((name.clone(), resolve_path(name, entries)?)))
            .collect::<Result<BTreeMap<_, _>, ValidationError>>()?;
        validate_upgrade_paths(&paths)?;

        let id = world.insert_entity(EntityId::property(p.id))?;
        world.add_component(id, info)?;
        world.add_component(
            id,
            Classification {
                property_type: p.property_type,
                subtype: p.subtype.clone(),
            },
        )?;
        world.add_component(
            id,
            Rentable {
                base_rent: p.base_rent,
                rent_boost: Decimal::ZERO,
            },
        )?;
        world.add_component(
            id,
            Purchasable {
                price: p.price,
                purchase_date: None,
            },
        )?;
        world.add_component(id, Ownership::default())?;
        world.add_component(id, Upgradable::new(paths))?;
        world.add_component(id, Grouping { group: hood })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::ComponentKind;

    const BUNDLED: &str = include_str!("../../../assets/catalog.yaml");

    const SMALL: &str = r#"
config:
  start_date: 2023-01-01
players:
  - { id: 1, name: Ada, funds: 500000 }
neighborhoods:
  - id: 1
    name: Cedar Grove
    rent_boost_threshold_percent: 50
    rent_boost_percent: 10
    properties:
      - id: 61
        name: Maplewood Lane House
        type: Residential
        subtype: House
        base_rent: 1800
        price: 300000
        upgrade_paths:
          Luxury:
            - { id: renovated_interior, name: Renovated Interior, cost: 10000, rent_increase: 100, days_to_complete: 7 }
            - { id: smart_home, name: Smart Home, cost: 20000, rent_increase: 200, days_to_complete: 14, prerequisite: renovated_interior }
"#;

    #[test]
    fn small_catalog_builds_world() {
        let mut world = Catalog::from_yaml_str(SMALL).unwrap().build_world().unwrap();
        let prop = EntityId::property(61);
        assert_eq!(world.group_members(EntityId::neighborhood(1)), vec![prop]);
        let up = world.get::<Upgradable>(prop).unwrap();
        assert_eq!(up.paths["Luxury"][1].prerequisite, Some(0));
        assert!(world.clock().is_some());
        assert_eq!(world.query(ComponentKind::Funds), vec![EntityId::player(1)]);
        assert!(!world.get::<Ownership>(prop).unwrap().owned());
    }

    #[test]
    fn unknown_prerequisite_is_rejected() {
        let src = SMALL.replace("prerequisite: renovated_interior", "prerequisite: moat");
        let err = Catalog::from_yaml_str(&src).unwrap().build_world().unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Invalid(ValidationError::PrerequisiteNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let src = SMALL.replace("{ id: 1, name: Ada, funds: 500000 }", "{ id: 1, name: Ada, funds: 1 }\n  - { id: 1, name: Bob, funds: 2 }");
        let err = Catalog::from_yaml_str(&src).unwrap().build_world().unwrap_err();
        assert!(matches!(err, CatalogError::World(SimError::InvalidState(_))));
    }

    #[test]
    fn bundled_catalog_is_valid() {
        let catalog = Catalog::from_yaml_str(BUNDLED).unwrap();
        let mut world = catalog.build_world().unwrap();
        assert!(!catalog.neighborhoods.is_empty());
        assert!(world.query(ComponentKind::Rentable).len() >= 6);
    }
}
