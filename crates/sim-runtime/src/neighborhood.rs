//! Neighborhood value aggregation and rent boosts.

use bevy_ecs::prelude::*;
use rust_decimal::Decimal;
use sim_core::{EntityId, NeighborhoodStats, Purchasable, Rentable};
use sim_econ::{average_value, boost_threshold_exceeded, neighborhood_rent_boost, upgraded_percent};
use tracing::{info, warn};

use crate::schedule::TickStats;
use crate::world::{Indexes, Registry};

/// Recompute every neighborhood's average value and upgraded percentage,
/// and apply the rent boost to members of neighborhoods above threshold.
///
/// Boosts are never withdrawn once applied.
pub fn update_neighborhoods(
    mut hoods: Query<(&EntityId, &mut NeighborhoodStats)>,
    prices: Query<&Purchasable>,
    mut rents: Query<&mut Rentable>,
    registry: Res<Registry>,
    indexes: Res<Indexes>,
    mut stats: ResMut<TickStats>,
) {
    stats.neighborhoods_boosted = 0;
    for (&hood, mut terms) in &mut hoods {
        let members: Vec<_> = indexes
            .group_members(hood)
            .into_iter()
            .filter_map(|m| registry.entity(m))
            .collect();
        let values: Vec<Decimal> = members
            .iter()
            .filter_map(|e| prices.get(*e).ok().map(|p| p.price))
            .collect();
        let average = match average_value(&values) {
            Ok(average) => average,
            Err(err) => {
                warn!(neighborhood = %hood, %err, "average value not updated");
                terms.average_property_value
            }
        };
        let percent = upgraded_percent(indexes.upgraded_count(hood), members.len());
        terms.average_property_value = average;
        terms.upgraded_percent = percent;
        if !boost_threshold_exceeded(percent, terms.rent_boost_threshold_percent) {
            continue;
        }
        if !terms.boost_active {
            terms.boost_active = true;
            info!(neighborhood = %hood, upgraded_percent = %percent, boost_percent = %terms.rent_boost_percent, "rent boost activated");
        }
        for member in &members {
            let Ok(mut rentable) = rents.get_mut(*member) else {
                continue;
            };
            match neighborhood_rent_boost(rentable.base_rent, terms.rent_boost_percent) {
                Ok(boost) => rentable.rent_boost = boost,
                Err(err) => warn!(neighborhood = %hood, %err, "rent boost not applied"),
            }
        }
        stats.neighborhoods_boosted += 1;
    }
}
