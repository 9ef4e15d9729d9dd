//! Player-facing actions: buying, selling and upgrading properties.
//!
//! Every action validates all of its preconditions before mutating the
//! world, so a rejected action leaves state untouched.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use sim_core::{AppliedUpgrade, EntityId, Funds, Ownership, Purchasable, SimError, SimResult, Upgradable};
use sim_econ::sale_proceeds;
use tracing::info;

use crate::world::World;

/// A completed purchase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Purchase {
    pub property: EntityId,
    pub buyer: EntityId,
    pub price: Decimal,
    pub purchase_date: NaiveDate,
}

/// A completed sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Sale {
    pub property: EntityId,
    pub seller: EntityId,
    pub proceeds: Decimal,
}

fn today(world: &World) -> SimResult<NaiveDate> {
    world
        .clock()
        .map(|c| c.current_date())
        .ok_or_else(|| SimError::NotFound(format!("game clock {}", EntityId::CLOCK)))
}

fn owner_of(world: &World, property: EntityId) -> SimResult<EntityId> {
    world
        .get::<Ownership>(property)?
        .owner
        .ok_or_else(|| SimError::InvalidState(format!("{property} is not owned")))
}

fn ensure_affordable(world: &World, player: EntityId, amount: Decimal) -> SimResult<()> {
    let funds = world.get::<Funds>(player)?.amount;
    if funds < amount {
        return Err(SimError::InvalidState(format!(
            "{player} has insufficient funds ({funds} < {amount})"
        )));
    }
    Ok(())
}

/// Buy an unowned property at its listed price.
pub fn buy_property(world: &mut World, property: EntityId, buyer: EntityId) -> SimResult<Purchase> {
    let purchase_date = today(world)?;
    let price = world.get::<Purchasable>(property)?.price;
    if let Some(owner) = world.get::<Ownership>(property)?.owner {
        return Err(SimError::InvalidState(format!(
            "{property} is already owned by {owner}"
        )));
    }
    ensure_affordable(world, buyer, price)?;

    world.get_mut::<Funds>(buyer)?.amount -= price;
    world.transfer_ownership(property, Some(buyer))?;
    world.get_mut::<Purchasable>(property)?.purchase_date = Some(purchase_date);
    info!(%property, %buyer, %price, %purchase_date, "property bought");
    Ok(Purchase {
        property,
        buyer,
        price,
        purchase_date,
    })
}

/// Sell an owned property back for a fixed share of its price.
pub fn sell_property(world: &mut World, property: EntityId) -> SimResult<Sale> {
    let seller = owner_of(world, property)?;
    let proceeds = sale_proceeds(world.get::<Purchasable>(property)?.price);
    let balance = world
        .get::<Funds>(seller)?
        .amount
        .checked_add(proceeds)
        .ok_or_else(|| SimError::InvalidState(format!("{seller} cannot hold {proceeds} more")))?;

    world.get_mut::<Funds>(seller)?.amount = balance;
    world.transfer_ownership(property, None)?;
    world.get_mut::<Purchasable>(property)?.purchase_date = None;
    info!(%property, %seller, %proceeds, "property sold");
    Ok(Sale {
        property,
        seller,
        proceeds,
    })
}

/// Buy the next unpurchased upgrade of `path`.
pub fn upgrade_property(world: &mut World, property: EntityId, path: &str) -> SimResult<AppliedUpgrade> {
    let owner = owner_of(world, property)?;
    let index = world
        .get::<Upgradable>(property)?
        .next_index(path)?
        .ok_or_else(|| {
            SimError::InvalidState(format!("{property} has reached max level on path {path:?}"))
        })?;
    purchase_upgrade(world, property, owner, path, index)
}

/// Buy a specific upgrade of `path` by its id.
pub fn upgrade_property_to(
    world: &mut World,
    property: EntityId,
    path: &str,
    upgrade_id: &str,
) -> SimResult<AppliedUpgrade> {
    let owner = owner_of(world, property)?;
    let index = world.get::<Upgradable>(property)?.index_of(path, upgrade_id)?;
    purchase_upgrade(world, property, owner, path, index)
}

fn purchase_upgrade(
    world: &mut World,
    property: EntityId,
    owner: EntityId,
    path: &str,
    index: usize,
) -> SimResult<AppliedUpgrade> {
    let purchase_date = today(world)?;
    let def = world
        .get::<Upgradable>(property)?
        .check_applicable(path, index)?
        .clone();
    ensure_affordable(world, owner, def.cost)?;

    world.get_mut::<Funds>(owner)?.amount -= def.cost;
    let record = AppliedUpgrade::purchased(path, index, &def, purchase_date);
    world
        .get_mut::<Upgradable>(property)?
        .applied
        .push(record.clone());
    info!(
        %property,
        %owner,
        path,
        upgrade = %record.id,
        cost = %record.cost,
        completes = %record.completion_date(),
        "upgrade purchased"
    );
    Ok(record)
}
