//! Power flow over the grid graph.
//!
//! `update_power_grid` runs a breadth-first traversal seeded from every
//! operational source, powering reachable entities, then walks the
//! visited set in descending depth to aggregate demand downstream onto
//! wires and finally onto sources. Cycles are fine: each entity keeps
//! exactly one feed wire (first visit), and every wire that closes a
//! cycle is still marked active.

use std::collections::VecDeque;

use slotmap::{SecondaryMap, SparseSecondaryMap};

use crate::config::Config;
use crate::entity::{LoadKind, Node, PowerSource, SourceKind};
use crate::fixed::{Fixed64, Millis, hour_of_day, unit_wave};
use crate::id::{EntityId, LinkId};
use crate::rng::SimRng;
use crate::world::World;

/// Result of a grid recomputation. `newly_powered` lists entities that
/// were unpowered before this pass and are powered now, in discovery
/// order.
#[derive(Debug, Default)]
pub struct GridOutcome {
    pub newly_powered: Vec<EntityId>,
}

#[derive(Clone, Copy)]
struct Visit {
    depth: u32,
    feed: Option<LinkId>,
}

/// Output a source can actually deliver right now: nameplate capacity
/// adjusted for kind (wind speed, solar daylight, nuclear overhaul),
/// maintenance outages, and the post-maintenance efficiency bonus.
pub fn effective_capacity(source: &PowerSource, cfg: &Config, game_time: Millis) -> Fixed64 {
    let mut cap = source.capacity;
    match source.kind {
        SourceKind::Wind(w) => cap *= w.speed_multiplier,
        SourceKind::Solar(sol) => {
            let hour = hour_of_day(game_time);
            let dawn_start = cfg.solar_day_start.saturating_sub(cfg.solar_dawn_hours);
            let dusk_end = cfg.solar_day_end + cfg.solar_dusk_hours;
            let daytime = hour >= cfg.solar_day_start && hour < cfg.solar_day_end;
            let twilight = (hour >= dawn_start && hour < cfg.solar_day_start)
                || (hour >= cfg.solar_day_end && hour < dusk_end);
            if daytime {
                // full output
            } else if twilight {
                cap *= Fixed64::from_num(0.5);
            } else if sol.storage_upgrade {
                cap *= cfg.solar_storage_efficiency;
            } else {
                cap = Fixed64::ZERO;
            }
        }
        SourceKind::Nuclear(n) => {
            if n.overhaul {
                cap = Fixed64::ZERO;
            }
        }
        _ => {}
    }
    if source.under_maintenance {
        cap = Fixed64::ZERO;
    }
    cap * source.efficiency_bonus
}

/// Refresh the oscillating demand of every commercial site. Demand
/// swings between the base and peak commercial load on a fixed cycle,
/// offset per site by its spawn-time phase.
pub fn update_commercial_demand(world: &mut World, cfg: &Config, game_time: Millis) {
    let cycle = cfg.commercial_cycle_ms.max(1);
    let cycle_pos =
        Fixed64::from_num((game_time % cycle) as u32) / Fixed64::from_num(cycle as u32);
    let span = cfg.commercial_peak_load - cfg.commercial_base_load;
    let ids: Vec<EntityId> = world.load_ids().to_vec();
    for id in ids {
        if let Some(Node::Load(site)) = world.node_mut(id)
            && let LoadKind::Commercial { phase, current_load } = &mut site.kind
        {
            *current_load = cfg.commercial_base_load + unit_wave(cycle_pos + *phase) * span;
        }
    }
}

/// Recompute powering and load for the whole grid.
pub fn update_power_grid(
    world: &mut World,
    cfg: &Config,
    is_peak_hour: bool,
    rng: &mut SimRng,
) -> GridOutcome {
    // Reset pass. Remember who was powered so the caller can react to
    // transitions only.
    let node_ids: Vec<EntityId> = world.all_nodes().map(|(id, _)| id).collect();
    let mut prev_powered: SparseSecondaryMap<EntityId, ()> = SparseSecondaryMap::new();
    for &id in &node_ids {
        if let Some(node) = world.node_mut(id) {
            if !node.is_source() && node.powered() {
                prev_powered.insert(id, ());
            }
            node.set_powered(false);
            if let Some(source) = node.as_source_mut() {
                source.load = Fixed64::ZERO;
            }
        }
    }
    let link_endpoints: Vec<(LinkId, EntityId, EntityId)> = world
        .links_iter()
        .map(|(id, l)| (id, l.from, l.to))
        .collect();
    for &(lid, _, _) in &link_endpoints {
        if let Some(link) = world.link_mut(lid) {
            link.active = false;
            link.load = Fixed64::ZERO;
        }
    }

    // BFS from every operational source. Failed nuclears seed nothing.
    let mut visited: SecondaryMap<EntityId, Visit> = SecondaryMap::new();
    let mut discovery: Vec<EntityId> = Vec::new();
    let mut active_links: Vec<LinkId> = Vec::new();
    let mut queue: VecDeque<(EntityId, u32)> = VecDeque::new();

    let seeds: Vec<EntityId> = world.source_ids().to_vec();
    for id in seeds {
        let failed = matches!(
            world.node(id).and_then(Node::as_source),
            Some(PowerSource {
                kind: SourceKind::Nuclear(n),
                ..
            }) if n.needs_repair
        );
        if failed {
            continue;
        }
        visited.insert(id, Visit { depth: 0, feed: None });
        queue.push_back((id, 0));
    }

    while let Some((u, depth)) = queue.pop_front() {
        for &(lid, from, to) in &link_endpoints {
            let v = if from == u {
                to
            } else if to == u {
                from
            } else {
                continue;
            };
            if matches!(world.node(v), Some(Node::Pylon(p)) if p.damaged) {
                continue;
            }
            match visited.get(v) {
                None => {
                    visited.insert(
                        v,
                        Visit {
                            depth: depth + 1,
                            feed: Some(lid),
                        },
                    );
                    discovery.push(v);
                    active_links.push(lid);
                    queue.push_back((v, depth + 1));
                }
                Some(visit) => {
                    if visit.feed != Some(lid) {
                        active_links.push(lid);
                    }
                }
            }
        }
    }

    for lid in active_links {
        if let Some(link) = world.link_mut(lid) {
            link.active = true;
        }
    }
    let mut newly_powered = Vec::new();
    for &id in &discovery {
        if let Some(node) = world.node_mut(id) {
            node.set_powered(true);
            if !node.is_source() && !prev_powered.contains_key(id) {
                newly_powered.push(id);
            }
        }
    }

    // Load pass: deepest entities first, so each wire carries its own
    // endpoint demand plus everything accumulated downstream of it.
    let mut by_depth: Vec<(EntityId, u32, LinkId)> = discovery
        .iter()
        .filter_map(|&id| {
            let visit = visited.get(id)?;
            visit.feed.map(|feed| (id, visit.depth, feed))
        })
        .collect();
    by_depth.sort_by(|a, b| b.1.cmp(&a.1));

    let mut accumulated: SecondaryMap<EntityId, Fixed64> = SecondaryMap::new();
    for (id, _, feed_id) in by_depth {
        let mut node_load = match world.node(id) {
            Some(Node::Load(site)) => match site.kind {
                LoadKind::House => Fixed64::ONE,
                LoadKind::Factory => cfg.factory_load,
                LoadKind::Commercial { current_load, .. } => {
                    let mut base = current_load;
                    if is_peak_hour && rng.chance(cfg.commercial_peak_bump_chance) {
                        base *= cfg.peak_hour_multiplier;
                    }
                    base
                }
            },
            Some(Node::Battery(b)) => b.target_load,
            Some(Node::Source(_)) => continue,
            Some(Node::Pylon(_)) => Fixed64::ZERO,
            None => continue,
        };
        if is_peak_hour {
            node_load *= cfg.peak_hour_multiplier;
        }
        let mut total = node_load + accumulated.get(id).copied().unwrap_or(Fixed64::ZERO);

        let Some(link) = world.link(feed_id) else {
            continue;
        };
        let loss = link.loss;
        let parent = if link.from == id { link.to } else { link.from };
        if loss > Fixed64::ZERO {
            total /= Fixed64::ONE - loss;
        }
        if let Some(link) = world.link_mut(feed_id) {
            link.load += total;
        }
        match world.node_mut(parent) {
            Some(Node::Source(source)) => source.load += total,
            Some(_) => {
                let slot = accumulated.entry(parent);
                if let Some(slot) = slot {
                    *slot.or_insert(Fixed64::ZERO) += total;
                }
            }
            None => {}
        }
    }

    GridOutcome { newly_powered }
}
