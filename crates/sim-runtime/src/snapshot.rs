//! Read-only, serializable projection of the world.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sim_core::{
    Classification, EntityId, Funds, GameClock, Grouping, Info, NeighborhoodStats, Ownership,
    Purchasable, Rentable, Upgradable,
};

use crate::world::{Record, World};

/// The components one entity carries; absent kinds are left out of the
/// serialized form.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EntitySnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Info>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funds: Option<Funds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Ownership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchasable: Option<Purchasable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rentable: Option<Rentable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgradable: Option<Upgradable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<Grouping>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<NeighborhoodStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<GameClock>,
}

fn cloned<C: Record>(world: &World, id: EntityId) -> Option<C> {
    world.get::<C>(id).ok().cloned()
}

impl EntitySnapshot {
    fn capture(world: &World, id: EntityId) -> Self {
        Self {
            info: cloned(world, id),
            classification: cloned(world, id),
            funds: cloned(world, id),
            ownership: cloned(world, id),
            purchasable: cloned(world, id),
            rentable: cloned(world, id),
            upgradable: cloned(world, id),
            grouping: cloned(world, id),
            neighborhood: cloned(world, id),
            clock: cloned(world, id),
        }
    }
}

/// All entities plus the owner and neighborhood indexes, keyed by
/// display ids such as `Property-61`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorldSnapshot {
    pub clock: Option<GameClock>,
    pub entities: BTreeMap<String, EntitySnapshot>,
    pub owned_properties: BTreeMap<String, Vec<String>>,
    pub neighborhood_properties: BTreeMap<String, Vec<String>>,
    pub upgraded_properties: BTreeMap<String, Vec<String>>,
}

fn keyed(index: &BTreeMap<EntityId, BTreeSet<EntityId>>) -> BTreeMap<String, Vec<String>> {
    index
        .iter()
        .map(|(key, members)| {
            (
                key.to_string(),
                members.iter().map(EntityId::to_string).collect(),
            )
        })
        .collect()
}

impl WorldSnapshot {
    pub fn capture(world: &World) -> Self {
        let indexes = world.indexes();
        Self {
            clock: world.clock().cloned(),
            entities: world
                .ids()
                .into_iter()
                .map(|id| (id.to_string(), EntitySnapshot::capture(world, id)))
                .collect(),
            owned_properties: keyed(indexes.owned()),
            neighborhood_properties: keyed(indexes.groups()),
            upgraded_properties: keyed(indexes.upgraded()),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use sim_core::{Funds, Grouping, Ownership};

    #[test]
    fn snapshot_lists_entities_and_indexes() {
        let mut w = World::new();
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        w.spawn_clock(GameClock::starting(start, 1.0, 1)).unwrap();
        let player = w.insert_entity(EntityId::player(1)).unwrap();
        w.add_component(player, Funds { amount: Decimal::new(5, 0) }).unwrap();
        let hood = w.insert_entity(EntityId::neighborhood(3)).unwrap();
        let prop = w.insert_entity(EntityId::property(61)).unwrap();
        w.add_component(prop, Grouping { group: hood }).unwrap();
        w.add_component(prop, Ownership { owner: Some(player) }).unwrap();

        let snap = WorldSnapshot::capture(&w);
        assert_eq!(snap.entities.len(), 4);
        assert_eq!(snap.owned_properties["Player-1"], vec!["Property-61"]);
        assert_eq!(snap.neighborhood_properties["Neighborhood-3"], vec!["Property-61"]);
        assert!(snap.upgraded_properties.is_empty());

        let json: serde_json::Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
        assert_eq!(json["entities"]["Player-1"]["funds"]["amount"], "5");
        assert!(json["entities"]["Player-1"].get("ownership").is_none());
        assert_eq!(json["entities"]["Property-61"]["grouping"]["group"]["id"], 3);
        assert_eq!(json["clock"]["paused"], false);
    }
}
