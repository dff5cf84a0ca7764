//! Thermal stress and patience. Sources heat while overloaded and melt
//! down at max heat; wires heat while carrying more than their rating
//! and burn out at max heat; unpowered demand sites lose patience and
//! abandon the grid at zero.

use std::collections::HashMap;

use crate::config::Config;
use crate::entity::{LoadKind, Node};
use crate::fixed::{Fixed64, Millis, tick_seconds};
use crate::id::{EntityId, LinkId};
use crate::power::effective_capacity;
use crate::world::World;

/// One tick of source heating.
#[derive(Debug, Default)]
pub struct HeatOutcome {
    /// Any source past the critical heat threshold.
    pub critical: bool,
    /// First source that reached max heat, if any. Ends the game.
    pub meltdown: Option<EntityId>,
}

/// One tick of patience decay.
#[derive(Debug, Default)]
pub struct PatienceOutcome {
    /// Any unpowered site under the critical patience fraction.
    pub critical: bool,
    /// Any unpowered site under the alert patience fraction.
    pub alert: bool,
    /// First site whose patience expired without a reprieve.
    pub expired: Option<(EntityId, LoadKind)>,
}

/// Heat every source carrying more than its effective capacity, cool
/// the rest. Towers and support facilities have zero capacity, so any
/// routed load overheats them too.
pub fn update_source_heat(world: &mut World, cfg: &Config, game_time: Millis) -> HeatOutcome {
    let dt = tick_seconds();
    let mut outcome = HeatOutcome::default();
    let ids: Vec<EntityId> = world.source_ids().to_vec();
    for id in ids {
        let Some(source) = world.node(id).and_then(Node::as_source) else {
            continue;
        };
        let capacity = effective_capacity(source, cfg, game_time);
        let overloaded = source.load > capacity;
        let Some(source) = world.node_mut(id).and_then(Node::as_source_mut) else {
            continue;
        };
        if overloaded {
            source.heat += cfg.source_heat_rate * dt;
        } else {
            source.heat = (source.heat - cfg.source_cool_rate * dt).max(Fixed64::ZERO);
        }
        if source.heat >= cfg.max_heat && outcome.meltdown.is_none() {
            outcome.meltdown = Some(id);
        }
        if source.heat > cfg.critical_heat {
            outcome.critical = true;
        }
    }
    outcome
}

/// Heat overloaded wires, cool the rest, and snap inactive wires back
/// to zero. Returns the wires that reached max heat; the caller removes
/// them and recomputes the grid once.
pub fn update_link_heat(world: &mut World, cfg: &Config) -> Vec<LinkId> {
    let dt = tick_seconds();
    let mut burned = Vec::new();
    let ids: Vec<LinkId> = world.link_ids().to_vec();
    for id in ids {
        let Some(link) = world.link_mut(id) else {
            continue;
        };
        if link.active && link.load > link.max_load {
            link.heat += cfg.link_heat_rate * dt;
        } else {
            link.heat = (link.heat - cfg.link_cool_rate * dt).max(Fixed64::ZERO);
        }
        if !link.active {
            link.heat = Fixed64::ZERO;
        }
        if link.heat >= cfg.max_heat {
            burned.push(id);
        }
    }
    burned
}

/// Regenerate patience for powered sites, drain it for unpowered ones.
///
/// When a site hits zero, an open grace window (granted externally,
/// keyed by game time) reprieves it once: patience resets to the
/// reprieve fraction of max and the window is consumed. Without one,
/// the site abandons the grid and the game is over.
pub fn update_patience(
    world: &mut World,
    cfg: &Config,
    grace: &mut HashMap<EntityId, Millis>,
    now: Millis,
) -> PatienceOutcome {
    let dt = tick_seconds();
    let max = cfg.house_max_patience;
    let alert_floor = max * cfg.patience_alert_fraction;
    let critical_floor = max * cfg.patience_critical_fraction;
    let mut outcome = PatienceOutcome::default();

    let ids: Vec<EntityId> = world.load_ids().to_vec();
    for id in ids {
        let Some(Node::Load(site)) = world.node_mut(id) else {
            continue;
        };
        if site.powered {
            site.patience = (site.patience + cfg.patience_regen_rate * dt).min(max);
            grace.remove(&id);
            continue;
        }
        site.patience -= cfg.patience_decay_rate * dt;
        if site.patience < alert_floor {
            outcome.alert = true;
        }
        if site.patience < critical_floor {
            outcome.critical = true;
        }
        if site.patience <= Fixed64::ZERO {
            let reprieved = grace.get(&id).is_some_and(|&until| until > now);
            if reprieved {
                site.patience = max * cfg.patience_reprieve_fraction;
                grace.remove(&id);
            } else if outcome.expired.is_none() {
                outcome.expired = Some((id, site.kind));
            }
        }
    }
    outcome
}
