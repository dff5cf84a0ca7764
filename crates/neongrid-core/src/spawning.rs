//! Demand spawning: pacing intervals that stretch as the town grows,
//! and rejection-sampled placement inside the current world extent.

use crate::config::Config;
use crate::entity::{LoadKind, LoadSite};
use crate::fixed::Millis;
use crate::geometry::{Point, ViewExtent};
use crate::id::EntityId;
use crate::rng::SimRng;
use crate::world::World;

/// What kind of demand site to spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnKind {
    House,
    Factory,
    Commercial,
}

/// Growth phase, judged on the settlement count (demand sites plus
/// pylons plus batteries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Early,
    Mid,
    Late,
}

pub fn game_phase(cfg: &Config, settlement: usize) -> GamePhase {
    if settlement >= cfg.mid_game_pop {
        GamePhase::Late
    } else if settlement >= cfg.early_game_pop {
        GamePhase::Mid
    } else {
        GamePhase::Early
    }
}

/// House spawns slow down once factories and then commercial districts
/// unlock, to keep pacing steady as total demand rises.
pub fn house_spawn_interval(cfg: &Config, settlement: usize) -> Millis {
    if settlement >= cfg.commercial_unlock_pop {
        12_000
    } else if settlement >= cfg.factory_unlock_pop {
        10_000
    } else {
        cfg.spawn_interval
    }
}

/// Factories spawn 30% faster in the late game.
pub fn factory_spawn_interval(cfg: &Config, settlement: usize) -> Millis {
    match game_phase(cfg, settlement) {
        GamePhase::Late => (cfg.factory_spawn_interval as f64 * 0.7) as Millis,
        _ => cfg.factory_spawn_interval,
    }
}

/// Commercial districts spawn 40% faster in the late game.
pub fn commercial_spawn_interval(cfg: &Config, settlement: usize) -> Millis {
    match game_phase(cfg, settlement) {
        GamePhase::Late => (cfg.commercial_spawn_interval as f64 * 0.6) as Millis,
        _ => cfg.commercial_spawn_interval,
    }
}

/// Try to place one demand site by rejection sampling.
///
/// Up to 100 attempts; the entity clearance relaxes after 50 failed
/// tries. Positions too close to the origin or to an existing wire are
/// rejected. Returns `None` when no spot was found this round.
pub fn try_spawn(
    world: &mut World,
    cfg: &Config,
    rng: &mut SimRng,
    extent: &ViewExtent,
    kind: SpawnKind,
) -> Option<EntityId> {
    let mut clearance = cfg.min_entity_dist + 10.0;
    for attempt in 0..100 {
        if attempt == 50 {
            clearance = cfg.min_entity_dist * 0.7;
        }
        let p = Point::new(
            rng.range_f64(extent.min.x, extent.max.x),
            rng.range_f64(extent.min.y, extent.max.y),
        );
        if !world.is_position_clear(p, clearance) {
            continue;
        }
        if p.distance(Point::ORIGIN) < cfg.spawn_origin_radius {
            continue;
        }
        if !world.is_clear_of_links(p, cfg.spawn_wire_clearance) {
            continue;
        }
        let load_kind = match kind {
            SpawnKind::House => LoadKind::House,
            SpawnKind::Factory => LoadKind::Factory,
            SpawnKind::Commercial => LoadKind::Commercial {
                phase: rng.next_fixed01(),
                current_load: cfg.commercial_base_load,
            },
        };
        let site = LoadSite::new(p, load_kind, cfg.house_max_patience);
        return Some(world.insert_load(site));
    }
    None
}
