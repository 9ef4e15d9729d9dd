//! Entity/component store on top of a `bevy_ecs` world.
//!
//! Every entity is spawned with its [`EntityId`] as a component, and the
//! [`Registry`] resource maps ids back to bevy entities. Records that feed
//! secondary indexes (ownership and grouping) update the [`Indexes`]
//! resource in the same call that inserts or removes them, so indexed
//! records can only be changed through dedicated world operations;
//! [`World::get_mut`] is limited to [`Unindexed`] kinds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bevy_ecs::prelude::*;
use bevy_ecs::world::{Mut, World as EcsWorld};
use sim_core::{
    Classification, ComponentKind, EntityId, EntityKind, Funds, GameClock, Grouping, Info,
    NeighborhoodStats, Ownership, Purchasable, Rentable, SimError, SimResult, Upgradable,
};
use tracing::{debug, trace};

use crate::schedule::TickStats;

/// Identity map between simulation ids and bevy entities.
#[derive(Resource, Debug, Default)]
pub struct Registry {
    entities: BTreeMap<EntityId, Entity>,
    next_ids: BTreeMap<EntityKind, u32>,
}

impl Registry {
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.entities.get(&id).copied()
    }

    fn allocate(&self, kind: EntityKind) -> EntityId {
        let next = self.next_ids.get(&kind).copied().unwrap_or(1);
        let mut id = EntityId::new(kind, next);
        while self.entities.contains_key(&id) {
            id.id += 1;
        }
        id
    }

    fn bind(&mut self, id: EntityId, entity: Entity) {
        let next = self.next_ids.entry(id.kind).or_insert(1);
        *next = (*next).max(id.id.saturating_add(1));
        self.entities.insert(id, entity);
    }
}

/// Secondary indexes over the store.
#[derive(Resource, Clone, Debug, Default)]
pub struct Indexes {
    owned: BTreeMap<EntityId, BTreeSet<EntityId>>,
    groups: BTreeMap<EntityId, BTreeSet<EntityId>>,
    upgraded: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

fn link(map: &mut BTreeMap<EntityId, BTreeSet<EntityId>>, key: EntityId, member: EntityId) -> bool {
    map.entry(key).or_default().insert(member)
}

fn unlink(map: &mut BTreeMap<EntityId, BTreeSet<EntityId>>, key: EntityId, member: EntityId) {
    if let Some(members) = map.get_mut(&key) {
        members.remove(&member);
        if members.is_empty() {
            map.remove(&key);
        }
    }
}

fn members(map: &BTreeMap<EntityId, BTreeSet<EntityId>>, key: EntityId) -> Vec<EntityId> {
    map.get(&key)
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default()
}

impl Indexes {
    /// Owner to owned properties.
    pub fn owned(&self) -> &BTreeMap<EntityId, BTreeSet<EntityId>> {
        &self.owned
    }

    /// Neighborhood to member properties.
    pub fn groups(&self) -> &BTreeMap<EntityId, BTreeSet<EntityId>> {
        &self.groups
    }

    /// Neighborhood to members with at least one completed upgrade.
    pub fn upgraded(&self) -> &BTreeMap<EntityId, BTreeSet<EntityId>> {
        &self.upgraded
    }

    /// Every (owner, property) pair, grouped by owner.
    pub fn ownerships(&self) -> Vec<(EntityId, EntityId)> {
        self.owned
            .iter()
            .flat_map(|(owner, props)| props.iter().map(move |p| (*owner, *p)))
            .collect()
    }

    pub fn group_members(&self, group: EntityId) -> Vec<EntityId> {
        members(&self.groups, group)
    }

    pub fn upgraded_count(&self, group: EntityId) -> usize {
        self.upgraded.get(&group).map_or(0, BTreeSet::len)
    }

    /// Record `property` as upgraded within `group`. True the first time only.
    pub fn mark_upgraded(&mut self, group: EntityId, property: EntityId) -> bool {
        link(&mut self.upgraded, group, property)
    }
}

/// A component record the store knows how to attach, tagged with its kind.
pub trait Record: Component + Clone + fmt::Debug {
    const KIND: ComponentKind;

    /// Register this record in the secondary indexes.
    fn index(&self, _entity: EntityId, _indexes: &mut Indexes) {}

    /// Remove this record from the secondary indexes.
    fn unindex(&self, _entity: EntityId, _indexes: &mut Indexes) {}
}

/// Records that feed no secondary index and may be mutated in place.
pub trait Unindexed: Record {}

macro_rules! plain_record {
    ($ty:ty, $kind:ident) => {
        impl Record for $ty {
            const KIND: ComponentKind = ComponentKind::$kind;
        }

        impl Unindexed for $ty {}
    };
}

plain_record!(Info, Info);
plain_record!(Classification, Classification);
plain_record!(Funds, Funds);
plain_record!(Purchasable, Purchasable);
plain_record!(Rentable, Rentable);
plain_record!(Upgradable, Upgradable);
plain_record!(NeighborhoodStats, Neighborhood);
plain_record!(GameClock, GameClock);

impl Record for Ownership {
    const KIND: ComponentKind = ComponentKind::Ownership;

    fn index(&self, entity: EntityId, indexes: &mut Indexes) {
        if let Some(owner) = self.owner {
            link(&mut indexes.owned, owner, entity);
        }
    }

    fn unindex(&self, entity: EntityId, indexes: &mut Indexes) {
        if let Some(owner) = self.owner {
            unlink(&mut indexes.owned, owner, entity);
        }
    }
}

impl Record for Grouping {
    const KIND: ComponentKind = ComponentKind::Grouping;

    fn index(&self, entity: EntityId, indexes: &mut Indexes) {
        link(&mut indexes.groups, self.group, entity);
    }

    fn unindex(&self, entity: EntityId, indexes: &mut Indexes) {
        unlink(&mut indexes.groups, self.group, entity);
        unlink(&mut indexes.upgraded, self.group, entity);
    }
}

fn not_found<C: Record>(entity: EntityId) -> SimError {
    SimError::NotFound(format!("{} component on {entity}", C::KIND))
}

fn missing(entity: EntityId) -> SimError {
    SimError::NotFound(format!("entity {entity}"))
}

fn ids_with<C: Component>(ecs: &mut EcsWorld) -> Vec<EntityId> {
    let mut state = ecs.query_filtered::<&EntityId, With<C>>();
    let mut ids: Vec<EntityId> = state.iter(ecs).copied().collect();
    ids.sort_unstable();
    ids
}

/// The simulation's bevy world plus its id registry and indexes.
#[derive(Debug)]
pub struct World {
    ecs: EcsWorld,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        let mut ecs = EcsWorld::new();
        ecs.init_resource::<Registry>();
        ecs.init_resource::<Indexes>();
        ecs.init_resource::<TickStats>();
        Self { ecs }
    }

    pub(crate) fn ecs_mut(&mut self) -> &mut EcsWorld {
        &mut self.ecs
    }

    pub(crate) fn stats(&self) -> &TickStats {
        self.ecs.resource::<TickStats>()
    }

    fn registry(&self) -> &Registry {
        self.ecs.resource::<Registry>()
    }

    fn entity(&self, id: EntityId) -> SimResult<Entity> {
        self.registry().entity(id).ok_or_else(|| missing(id))
    }

    pub fn len(&self) -> usize {
        self.registry().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.registry().entity(entity).is_some()
    }

    /// Every registered id, in order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.registry().entities.keys().copied().collect()
    }

    fn spawn(&mut self, id: EntityId) {
        let entity = self.ecs.spawn(id).id();
        self.ecs.resource_mut::<Registry>().bind(id, entity);
    }

    /// Allocate a fresh identity of `kind` with no components.
    pub fn create_entity(&mut self, kind: EntityKind) -> EntityId {
        let id = self.ecs.resource::<Registry>().allocate(kind);
        self.spawn(id);
        trace!(entity = %id, "entity created");
        id
    }

    /// Register an entity under an explicit identity (catalog ids, the
    /// clock sentinel).
    pub fn insert_entity(&mut self, entity: EntityId) -> SimResult<EntityId> {
        if self.contains(entity) {
            return Err(SimError::InvalidState(format!("{entity} already exists")));
        }
        self.spawn(entity);
        trace!(%entity, "entity inserted");
        Ok(entity)
    }

    /// Despawn an entity and drop every index entry that refers to it.
    pub fn remove_entity(&mut self, id: EntityId) -> SimResult<()> {
        let entity = self.entity(id)?;
        let mut removed = self.ecs.get_entity_mut(entity).ok_or_else(|| missing(id))?;
        let ownership = removed.take::<Ownership>();
        let grouping = removed.take::<Grouping>();
        removed.despawn();
        self.ecs.resource_scope(|ecs, mut indexes: Mut<Indexes>| {
            if let Some(ownership) = ownership {
                ownership.unindex(id, &mut indexes);
            }
            if let Some(grouping) = grouping {
                grouping.unindex(id, &mut indexes);
            }
            ecs.resource_mut::<Registry>().entities.remove(&id);
        });
        debug!(entity = %id, "entity removed");
        Ok(())
    }

    /// Attach a component. Fails if the entity is unknown or already has
    /// one of this kind.
    pub fn add_component<C: Record>(&mut self, id: EntityId, component: C) -> SimResult<()> {
        let entity = self.entity(id)?;
        let present = self.ecs.get_entity(entity).ok_or_else(|| missing(id))?;
        if present.contains::<C>() {
            return Err(SimError::DuplicateComponent { entity: id, kind: C::KIND });
        }
        component.index(id, &mut self.ecs.resource_mut::<Indexes>());
        self.ecs.entity_mut(entity).insert(component);
        Ok(())
    }

    pub fn get<C: Record>(&self, id: EntityId) -> SimResult<&C> {
        self.registry()
            .entity(id)
            .and_then(|entity| self.ecs.get::<C>(entity))
            .ok_or_else(|| not_found::<C>(id))
    }

    /// Mutable access to components that no index depends on.
    pub fn get_mut<C: Unindexed>(&mut self, id: EntityId) -> SimResult<Mut<'_, C>> {
        let entity = self.entity(id)?;
        self.ecs.get_mut::<C>(entity).ok_or_else(|| not_found::<C>(id))
    }

    /// Detach and return a component, dropping its index entries.
    pub fn remove_component<C: Record>(&mut self, id: EntityId) -> SimResult<C> {
        let entity = self.entity(id)?;
        let component = self
            .ecs
            .get_entity_mut(entity)
            .and_then(|mut e| e.take::<C>())
            .ok_or_else(|| not_found::<C>(id))?;
        component.unindex(id, &mut self.ecs.resource_mut::<Indexes>());
        Ok(component)
    }

    /// Entities carrying a component of `kind`, in id order.
    pub fn query(&mut self, kind: ComponentKind) -> Vec<EntityId> {
        let ecs = &mut self.ecs;
        match kind {
            ComponentKind::Info => ids_with::<Info>(ecs),
            ComponentKind::Classification => ids_with::<Classification>(ecs),
            ComponentKind::Funds => ids_with::<Funds>(ecs),
            ComponentKind::Ownership => ids_with::<Ownership>(ecs),
            ComponentKind::Purchasable => ids_with::<Purchasable>(ecs),
            ComponentKind::Rentable => ids_with::<Rentable>(ecs),
            ComponentKind::Upgradable => ids_with::<Upgradable>(ecs),
            ComponentKind::Grouping => ids_with::<Grouping>(ecs),
            ComponentKind::Neighborhood => ids_with::<NeighborhoodStats>(ecs),
            ComponentKind::GameClock => ids_with::<GameClock>(ecs),
        }
    }

    /// Properties owned by `owner`.
    pub fn owned_by(&self, owner: EntityId) -> Vec<EntityId> {
        members(&self.indexes().owned, owner)
    }

    /// Properties belonging to neighborhood `group`.
    pub fn group_members(&self, group: EntityId) -> Vec<EntityId> {
        self.indexes().group_members(group)
    }

    /// Members of `group` with at least one completed upgrade.
    pub fn upgraded_count(&self, group: EntityId) -> usize {
        self.indexes().upgraded_count(group)
    }

    /// Change a property's owner, keeping the owner index in step.
    /// Returns the previous owner.
    pub fn transfer_ownership(
        &mut self,
        property: EntityId,
        owner: Option<EntityId>,
    ) -> SimResult<Option<EntityId>> {
        let entity = self.entity(property)?;
        self.ecs.resource_scope(|ecs, mut indexes: Mut<Indexes>| {
            let mut ownership = ecs
                .get_mut::<Ownership>(entity)
                .ok_or_else(|| not_found::<Ownership>(property))?;
            ownership.unindex(property, &mut indexes);
            let previous = std::mem::replace(&mut ownership.owner, owner);
            ownership.index(property, &mut indexes);
            Ok(previous)
        })
    }

    /// Count `property` as upgraded within its neighborhood. Returns true
    /// the first time only.
    pub fn mark_upgraded(&mut self, property: EntityId) -> bool {
        let Ok(group) = self.get::<Grouping>(property).map(|g| g.group) else {
            return false;
        };
        self.ecs
            .resource_mut::<Indexes>()
            .mark_upgraded(group, property)
    }

    pub fn indexes(&self) -> &Indexes {
        self.ecs.resource::<Indexes>()
    }

    pub fn clock(&self) -> Option<&GameClock> {
        self.get::<GameClock>(EntityId::CLOCK).ok()
    }

    pub fn clock_mut(&mut self) -> Option<Mut<'_, GameClock>> {
        self.get_mut::<GameClock>(EntityId::CLOCK).ok()
    }

    /// Install the singleton clock under its reserved identity.
    pub fn spawn_clock(&mut self, clock: GameClock) -> SimResult<EntityId> {
        let id = self.insert_entity(EntityId::CLOCK)?;
        self.add_component(id, clock)?;
        Ok(id)
    }

    /// Run a single tick system outside the schedule.
    #[cfg(test)]
    pub(crate) fn run_system<M>(&mut self, system: impl IntoSystem<(), (), M>) -> &TickStats {
        use bevy_ecs::system::RunSystemOnce;
        self.ecs.run_system_once(system);
        self.stats()
    }
}
