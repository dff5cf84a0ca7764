//! Player command validation: error taxonomy, cost and refund math,
//! and placement rules. The mutations themselves live on `Session`.

use thiserror::Error;

use crate::config::Config;
use crate::entity::{Node, SourceKind};
use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::geometry::{Point, ViewExtent, segments_intersect};
use crate::id::EntityId;
use crate::world::World;

/// Why a player command was rejected. Commands either apply fully or
/// leave the session untouched.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CommandError {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        needed: Fixed64,
        available: Fixed64,
    },
    #[error("position is blocked by another entity")]
    PositionBlocked,
    #[error("wind turbines only fit near the map edge")]
    WindPlacementRestricted,
    #[error("wire length out of range")]
    WireLengthOutOfRange,
    #[error("wire would cross an existing wire")]
    WireCrossesExisting,
    #[error("endpoints are already connected")]
    AlreadyConnected,
    #[error("cannot wire an entity to itself")]
    SelfConnection,
    #[error("no such entity")]
    UnknownEntity,
    #[error("no such wire")]
    UnknownLink,
    #[error("wire is already high voltage")]
    AlreadyUpgraded,
    #[error("upgrade does not apply to this facility")]
    InvalidUpgrade,
    #[error("nothing to repair")]
    NothingToRepair,
    #[error("the session is over")]
    SessionOver,
}

/// What the player can build directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FacilityKind {
    Plant,
    Nuclear,
    Wind,
    Solar,
    Tower,
    Battery,
    RepairStation,
    DispatchCenter,
    EnergyStorage,
}

/// Base price of a facility at the current config (achievement
/// discounts mutate the config, so they are already reflected here).
pub fn facility_cost(kind: FacilityKind, cfg: &Config) -> Fixed64 {
    match kind {
        FacilityKind::Plant => cfg.cost_plant,
        FacilityKind::Nuclear => cfg.cost_nuclear,
        FacilityKind::Wind => cfg.cost_wind,
        FacilityKind::Solar => cfg.cost_solar,
        FacilityKind::Tower => cfg.cost_tower,
        FacilityKind::Battery => cfg.cost_battery,
        FacilityKind::RepairStation => cfg.cost_repair_station,
        FacilityKind::DispatchCenter => cfg.cost_dispatch_center,
        FacilityKind::EnergyStorage => cfg.cost_energy_storage,
    }
}

/// Support facilities bought before their unlock condition carry a
/// flat surcharge, floored to whole money units.
pub fn effective_facility_cost(kind: FacilityKind, cfg: &Config, world: &World) -> Fixed64 {
    let base = facility_cost(kind, cfg);
    let locked = match kind {
        FacilityKind::RepairStation => world.population() < cfg.repair_station_unlock_pop,
        FacilityKind::DispatchCenter => world.population() < cfg.dispatch_center_unlock_pop,
        FacilityKind::EnergyStorage => world.battery_count() < cfg.energy_storage_unlock_battery_count,
        _ => false,
    };
    if locked {
        (base * cfg.prebuild_surcharge).floor()
    } else {
        base
    }
}

/// Entity clearance required when placing a facility by hand. Towers
/// take less room.
pub fn placement_buffer(kind: FacilityKind) -> f64 {
    match kind {
        FacilityKind::Tower => 30.0,
        _ => 60.0,
    }
}

/// Price of a wire of the given length, floored.
pub fn wire_cost(length: f64, cfg: &Config, high_voltage: bool) -> Fixed64 {
    let mult = if high_voltage {
        cfg.cost_upgrade_mult
    } else {
        Fixed64::ONE
    };
    (f64_to_fixed64(length) * cfg.cost_wire_per_unit * mult).floor()
}

/// Refund for tearing down a wire: the refund rate applied to its
/// (floored) build price, floored again.
pub fn wire_refund(length: f64, cfg: &Config, upgraded: bool) -> Fixed64 {
    (wire_cost(length, cfg, upgraded) * cfg.refund_rate).floor()
}

/// Refund for the building itself, excluding its wires. Demand sites
/// were never paid for and refund nothing. Towers refund at the pylon
/// rate.
pub fn entity_refund(node: &Node, cfg: &Config) -> Fixed64 {
    let base = match node {
        Node::Source(s) => match s.kind {
            SourceKind::Plant => cfg.cost_plant,
            SourceKind::Nuclear(_) => cfg.cost_nuclear,
            SourceKind::Wind(_) => cfg.cost_wind,
            SourceKind::Solar(_) => cfg.cost_solar,
            SourceKind::RepairStation => cfg.cost_repair_station,
            SourceKind::DispatchCenter => cfg.cost_dispatch_center,
            SourceKind::EnergyStorage => cfg.cost_energy_storage,
            SourceKind::Tower => cfg.cost_pylon,
        },
        Node::Pylon(_) => cfg.cost_pylon,
        Node::Battery(_) => cfg.cost_battery,
        Node::Load(_) => Fixed64::ZERO,
    };
    (base * cfg.refund_rate).floor()
}

/// Wire length rule: longer than the snap threshold, no longer than
/// the configured maximum.
pub fn wire_length_valid(length: f64, cfg: &Config) -> bool {
    length > cfg.min_wire_length && length <= cfg.max_wire_length
}

/// Whether a proposed wire between `a_pos` and `b_pos` would cross an
/// existing wire. Wires already attached to either endpoint entity are
/// skipped, so a fan-out from a shared node never blocks itself.
pub fn wire_crosses_existing(
    world: &World,
    a_pos: Point,
    b_pos: Point,
    endpoints: &[EntityId],
) -> bool {
    for (_, link) in world.links_iter() {
        if endpoints.contains(&link.from) || endpoints.contains(&link.to) {
            continue;
        }
        let (Some(from), Some(to)) = (world.node(link.from), world.node(link.to)) else {
            continue;
        };
        if segments_intersect(a_pos, b_pos, from.pos(), to.pos()) {
            return true;
        }
    }
    false
}

/// Wind turbines must sit within the edge band of the current extent.
pub fn wind_placement_valid(p: Point, extent: &ViewExtent, cfg: &Config) -> bool {
    extent.edge_distance(p) < cfg.wind_edge_distance
}
