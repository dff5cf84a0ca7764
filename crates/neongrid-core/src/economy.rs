//! The economic engine: battery charge control driven by grid stress,
//! and the once-per-second income/upkeep settlement.

use crate::config::Config;
use crate::entity::{BatteryOp, LoadKind, Node, SourceKind};
use crate::fixed::{Fixed64, Millis, tick_seconds};
use crate::id::EntityId;
use crate::power::effective_capacity;
use crate::world::World;

/// Battery energy moves three units per rated unit per game second.
fn energy_rate_scale() -> Fixed64 {
    Fixed64::from_num(3)
}

/// Grid stress classification for the charge controller.
///
/// Stressed: any source is warm or loaded past the high watermark of
/// its effective capacity. Relaxed: every source is cold and under the
/// low watermark. In between, batteries hold their charge.
pub fn grid_stress(world: &World, cfg: &Config, game_time: Millis) -> (bool, bool) {
    let mut stressed = false;
    let mut relaxed = true;
    for (_, source) in world.sources() {
        let capacity = effective_capacity(source, cfg, game_time);
        if source.heat > Fixed64::ZERO || source.load > capacity * cfg.grid_stress_high {
            stressed = true;
            relaxed = false;
        } else if source.load > capacity * cfg.grid_stress_low {
            relaxed = false;
        }
    }
    (stressed, relaxed)
}

/// One tick of the battery charge controller.
///
/// Discharging batteries carry a negative target load (they offset
/// demand on the next grid pass); charging ones appear as extra demand.
/// An energy storage station scales both capacity and transfer rates
/// for every battery on the map.
pub fn update_batteries(world: &mut World, cfg: &Config, game_time: Millis, charge_bonus: Fixed64) {
    let (stressed, relaxed) = grid_stress(world, cfg, game_time);
    let (capacity_mult, rate_mult) = if world.has_energy_storage() {
        (
            cfg.energy_storage_capacity_multiplier,
            cfg.energy_storage_charge_rate_multiplier,
        )
    } else {
        (Fixed64::ONE, Fixed64::ONE)
    };
    let dt = tick_seconds();
    let step = energy_rate_scale() * dt;

    let ids: Vec<EntityId> = world.battery_ids().to_vec();
    for id in ids {
        let Some(battery) = world.node_mut(id).and_then(Node::as_battery_mut) else {
            continue;
        };
        if !battery.powered {
            battery.op = BatteryOp::Idle;
            battery.target_load = Fixed64::ZERO;
            continue;
        }
        let max_energy = battery.max_energy * capacity_mult;
        let charge_rate = cfg.battery_charge_rate * rate_mult;
        let discharge_rate = cfg.battery_discharge_rate * rate_mult;

        if stressed && battery.energy > Fixed64::ZERO {
            battery.op = BatteryOp::Discharging;
            battery.target_load = -discharge_rate;
            battery.energy = (battery.energy - discharge_rate * step).max(Fixed64::ZERO);
        } else if relaxed && battery.energy < max_energy {
            battery.op = BatteryOp::Charging;
            battery.target_load = charge_rate * charge_bonus;
            battery.energy = (battery.energy + charge_rate * charge_bonus * step).min(max_energy);
        } else {
            battery.op = BatteryOp::Idle;
            battery.target_load = Fixed64::ZERO;
        }
    }
}

/// Percentage of demand sites currently powered, floored. Zero when
/// there are no sites.
pub fn coverage(world: &World) -> u32 {
    let total = world.population();
    if total == 0 {
        return 0;
    }
    let powered = world.loads().filter(|(_, l)| l.powered).count();
    (powered * 100 / total) as u32
}

/// Fraction of sources that are wind or solar.
pub fn clean_ratio(world: &World) -> Fixed64 {
    let total = world.source_count();
    if total == 0 {
        return Fixed64::ZERO;
    }
    Fixed64::from_num(world.clean_source_count() as u32) / Fixed64::from_num(total as u32)
}

/// Result of one economy settlement.
#[derive(Debug)]
pub struct EconomyTick {
    pub net_income: Fixed64,
    /// Clean-energy policy subsidy paid this settlement, if any.
    pub clean_subsidy: Option<Fixed64>,
}

/// Settle income and upkeep for one economy interval.
///
/// `money` is the current balance (the early-game subsidy doubling
/// keys off it), `prev_net` is the previous settlement's net income
/// (the clean subsidy is estimated from it), and `clean_subsidy_due`
/// is whether a new game day has started since the last payout.
pub fn economy_tick(
    world: &World,
    cfg: &Config,
    money: Fixed64,
    prev_net: Fixed64,
    clean_subsidy_due: bool,
) -> EconomyTick {
    let population = world.population();
    let cov = coverage(world);

    let mut income = cfg.base_subsidy;
    if money < cfg.subsidy_threshold {
        income *= Fixed64::from_num(2);
    } else if population > cfg.subsidy_cancel_pop {
        income = Fixed64::ZERO;
    }

    let clean_subsidy = if clean_subsidy_due && clean_ratio(world) >= cfg.clean_energy_subsidy_threshold
    {
        // Half of an estimated daily income (24 game hours of one
        // settlement per second, 60 per hour).
        let daily = prev_net * Fixed64::from_num(60 * 24);
        Some(daily.abs() * Fixed64::from_num(0.5))
    } else {
        None
    };

    for (_, site) in world.loads() {
        if !site.powered {
            continue;
        }
        let mut val = match site.kind {
            LoadKind::House => cfg.income_per_house,
            LoadKind::Factory => cfg.income_per_factory,
            LoadKind::Commercial { .. } => cfg.income_per_commercial,
        };
        if cov >= 100 {
            val *= Fixed64::from_num(1.2);
        } else if cov < 50 {
            val *= Fixed64::from_num(0.5);
        }
        income += val;
    }

    let conventional_count = world
        .sources()
        .filter(|(_, s)| s.kind.is_conventional())
        .count();
    let reduction = {
        let per_station = cfg.repair_station_maintenance_reduction;
        let stations = world
            .sources()
            .filter(|(_, s)| matches!(s.kind, SourceKind::RepairStation))
            .count();
        (per_station * Fixed64::from_num(stations as u32)).min(Fixed64::from_num(0.5))
    };

    let mut upkeep = Fixed64::ZERO;
    for (index, (_, source)) in world.sources().enumerate() {
        let mut cost = if source.kind.is_nuclear() {
            cfg.nuclear_upkeep
        } else if source.upkeep > Fixed64::ZERO {
            source.upkeep
        } else {
            cfg.plant_upkeep
        };
        cost *= Fixed64::ONE - reduction;
        if conventional_count > cfg.maintenance_scale_threshold
            && index >= cfg.maintenance_scale_threshold - 1
        {
            cost *= cfg.maintenance_scale_multiplier;
        }
        upkeep += cost;
    }

    EconomyTick {
        net_income: income - upkeep,
        clean_subsidy,
    }
}
