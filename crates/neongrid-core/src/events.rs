//! Stochastic and scheduled events: peak hour, nuclear failure and
//! decay, wind speed shifts, low-demand windows, maintenance outages,
//! and natural disasters.
//!
//! Probabilistic rolls all happen on the 60-second check cadence;
//! per-tick work is limited to expiry sweeps, outage completion, and
//! disaster damage.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::entity::{Node, SourceKind};
use crate::fixed::{Fixed64, Millis, hour_of_day, tick_seconds};
use crate::id::EntityId;
use crate::rng::SimRng;
use crate::world::World;

/// A timed event currently affecting the whole grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    PeakHour,
    LowDemand { charge_bonus: Fixed64 },
    Storm { damage_chance: Fixed64 },
    Typhoon { damage_chance: Fixed64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub kind: EventKind,
    pub started_at: Millis,
    pub duration: Millis,
}

impl ActiveEvent {
    pub fn expired(&self, now: Millis) -> bool {
        now.saturating_sub(self.started_at) > self.duration
    }
}

pub fn is_peak_hour(active: &[ActiveEvent]) -> bool {
    active.iter().any(|e| matches!(e.kind, EventKind::PeakHour))
}

/// Battery charge bonus from an active low-demand window, or 1.
pub fn charge_bonus(active: &[ActiveEvent]) -> Fixed64 {
    active
        .iter()
        .find_map(|e| match e.kind {
            EventKind::LowDemand { charge_bonus } => Some(charge_bonus),
            _ => None,
        })
        .unwrap_or(Fixed64::ONE)
}

fn active_disaster(active: &[ActiveEvent]) -> Option<Fixed64> {
    active.iter().find_map(|e| match e.kind {
        EventKind::Storm { damage_chance } | EventKind::Typhoon { damage_chance } => {
            Some(damage_chance)
        }
        _ => None,
    })
}

/// Peak hour shares the event list but does not block other events.
fn has_blocking_event(active: &[ActiveEvent]) -> bool {
    active
        .iter()
        .any(|e| !matches!(e.kind, EventKind::PeakHour))
}

/// Drop expired events, returning them so the caller can announce ends.
pub fn sweep_expired(active: &mut Vec<ActiveEvent>, now: Millis) -> Vec<ActiveEvent> {
    let mut ended = Vec::new();
    active.retain(|e| {
        if e.expired(now) {
            ended.push(*e);
            false
        } else {
            true
        }
    });
    ended
}

/// A nuclear failure rolled this check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NuclearIncident {
    pub id: EntityId,
    /// The failure was rolled at the elevated cooling-shortfall rate.
    pub cooling_shortfall: bool,
}

/// Minute check: cooling status and failure rolls for every nuclear.
///
/// Cooling is satisfied by powered batteries wired directly to the
/// plant. A shortfall swaps the per-minute failure chance for the much
/// higher cooling failure rate. Plants in overhaul are immune.
pub fn check_nuclear(world: &mut World, cfg: &Config, rng: &mut SimRng) -> Vec<NuclearIncident> {
    let mut incidents = Vec::new();
    let ids: Vec<EntityId> = world.source_ids().to_vec();
    for id in ids {
        let Some(source) = world.node(id).and_then(Node::as_source) else {
            continue;
        };
        let SourceKind::Nuclear(state) = source.kind else {
            continue;
        };
        let cooling = world
            .links_touching(id)
            .filter_map(|(_, l)| l.other(id))
            .filter(|&other| {
                world
                    .node(other)
                    .and_then(Node::as_battery)
                    .is_some_and(|b| b.powered)
            })
            .count();
        let satisfied = cooling >= cfg.nuclear_cooling_battery_count;
        let failure_chance = if satisfied {
            cfg.nuclear_failure_chance
        } else {
            cfg.nuclear_cooling_failure_rate
        };
        let failed = !state.overhaul && !state.needs_repair && rng.chance(failure_chance);

        if let Some(source) = world.node_mut(id).and_then(Node::as_source_mut)
            && let SourceKind::Nuclear(state) = &mut source.kind
        {
            state.cooling_satisfied = satisfied;
            if failed {
                state.needs_repair = true;
                incidents.push(NuclearIncident {
                    id,
                    cooling_shortfall: !satisfied,
                });
            }
        }
    }
    incidents
}

/// Direction of a wind speed shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindShift {
    Stable,
    High,
    Low,
}

/// Minute check: each turbine has a chance of a wind shift. Nights are
/// always calm; days split evenly between strong and weak wind.
pub fn check_wind(
    world: &mut World,
    cfg: &Config,
    rng: &mut SimRng,
    game_time: Millis,
) -> Vec<(EntityId, WindShift)> {
    let night = {
        let hour = hour_of_day(game_time);
        hour >= 20 || hour < 6
    };
    let mut shifts = Vec::new();
    let ids: Vec<EntityId> = world.source_ids().to_vec();
    for id in ids {
        let Some(source) = world.node_mut(id).and_then(Node::as_source_mut) else {
            continue;
        };
        let SourceKind::Wind(state) = &mut source.kind else {
            continue;
        };
        if !rng.chance(cfg.wind_speed_event_chance) {
            continue;
        }
        let shift = if night {
            state.speed_multiplier = Fixed64::ONE;
            WindShift::Stable
        } else if rng.chance(Fixed64::from_num(0.5)) {
            state.speed_multiplier = cfg.wind_speed_high;
            WindShift::High
        } else {
            state.speed_multiplier = cfg.wind_speed_low;
            WindShift::Low
        };
        shifts.push((id, shift));
    }
    shifts
}

/// Minute check: a low-demand window can open while the town is small,
/// outside evening hours, and no other event is running.
pub fn maybe_start_low_demand(
    world: &World,
    cfg: &Config,
    rng: &mut SimRng,
    active: &[ActiveEvent],
    now: Millis,
) -> Option<ActiveEvent> {
    let hour = hour_of_day(now);
    let evening = (18..=22).contains(&hour);
    if world.population() >= cfg.low_demand_pop_limit || evening || has_blocking_event(active) {
        return None;
    }
    if !rng.chance(cfg.low_demand_event_chance) {
        return None;
    }
    Some(ActiveEvent {
        kind: EventKind::LowDemand {
            charge_bonus: cfg.low_demand_charge_bonus,
        },
        started_at: now,
        duration: cfg.low_demand_duration,
    })
}

/// Minute check: a storm or typhoon can hit a large town when no other
/// event is running.
pub fn maybe_start_disaster(
    world: &World,
    cfg: &Config,
    rng: &mut SimRng,
    active: &[ActiveEvent],
    now: Millis,
) -> Option<ActiveEvent> {
    if world.population() <= cfg.disaster_pop_threshold || has_blocking_event(active) {
        return None;
    }
    if !rng.chance(cfg.disaster_event_chance) {
        return None;
    }
    let damage_chance = cfg.disaster_link_damage_chance;
    let kind = if rng.chance(Fixed64::from_num(0.5)) {
        EventKind::Storm { damage_chance }
    } else {
        EventKind::Typhoon { damage_chance }
    };
    Some(ActiveEvent {
        kind,
        started_at: now,
        duration: cfg.disaster_duration,
    })
}

/// Minute check: sources that have run for over an hour can be pulled
/// into a short maintenance outage. Completion is handled per tick by
/// `complete_maintenance`.
pub fn roll_maintenance_outages(
    world: &mut World,
    cfg: &Config,
    rng: &mut SimRng,
    now: Millis,
) -> Vec<EntityId> {
    let mut started = Vec::new();
    let ids: Vec<EntityId> = world.source_ids().to_vec();
    for id in ids {
        let Some(source) = world.node_mut(id).and_then(Node::as_source_mut) else {
            continue;
        };
        if source.under_maintenance {
            continue;
        }
        if let SourceKind::Nuclear(state) = source.kind
            && state.overhaul
        {
            continue;
        }
        if now.saturating_sub(source.built_at) <= cfg.maintenance_min_runtime {
            continue;
        }
        if rng.chance(cfg.maintenance_event_chance) {
            source.under_maintenance = true;
            source.maintenance_until = now + cfg.maintenance_outage_duration;
            started.push(id);
        }
    }
    started
}

/// Per tick: finish maintenance outages whose timer ran out. The first
/// completed outage grants a source its efficiency bonus.
pub fn complete_maintenance(world: &mut World, cfg: &Config, now: Millis) -> Vec<EntityId> {
    let mut completed = Vec::new();
    let ids: Vec<EntityId> = world.source_ids().to_vec();
    for id in ids {
        let Some(source) = world.node_mut(id).and_then(Node::as_source_mut) else {
            continue;
        };
        if source.under_maintenance && now >= source.maintenance_until {
            source.under_maintenance = false;
            if source.efficiency_bonus == Fixed64::ONE {
                source.efficiency_bonus = cfg.maintenance_efficiency_bonus;
            }
            completed.push(id);
        }
    }
    completed
}

/// Per tick: finish nuclear overhauls whose timer ran out.
pub fn complete_overhauls(world: &mut World, now: Millis) -> Vec<EntityId> {
    let mut completed = Vec::new();
    let ids: Vec<EntityId> = world.source_ids().to_vec();
    for id in ids {
        let Some(source) = world.node_mut(id).and_then(Node::as_source_mut) else {
            continue;
        };
        if let SourceKind::Nuclear(state) = &mut source.kind
            && state.overhaul
            && now >= state.overhaul_until
        {
            state.overhaul = false;
            state.overhaul_until = 0;
            completed.push(id);
        }
    }
    completed
}

/// Per tick: while a disaster runs, each relay pylon can take damage.
/// Returns the pylons knocked out this tick.
pub fn apply_disaster_damage(
    world: &mut World,
    active: &[ActiveEvent],
    rng: &mut SimRng,
) -> Vec<EntityId> {
    let Some(damage_chance) = active_disaster(active) else {
        return Vec::new();
    };
    // Scale the per-minute-style chance down to one tick.
    let per_tick = damage_chance * Fixed64::from_num(0.6) * tick_seconds();
    let mut damaged = Vec::new();
    let ids: Vec<EntityId> = world.pylon_ids().to_vec();
    for id in ids {
        let Some(Node::Pylon(pylon)) = world.node_mut(id) else {
            continue;
        };
        if pylon.damaged {
            continue;
        }
        if rng.chance(per_tick) {
            pylon.damaged = true;
            damaged.push(id);
        }
    }
    damaged
}

/// Hourly check: every nuclear loses capacity down to a floor unless it
/// is in overhaul. Returns plants now under half their nominal rating.
pub fn decay_nuclear(world: &mut World, cfg: &Config) -> Vec<EntityId> {
    let mut degraded = Vec::new();
    let ids: Vec<EntityId> = world.source_ids().to_vec();
    for id in ids {
        let Some(source) = world.node_mut(id).and_then(Node::as_source_mut) else {
            continue;
        };
        let SourceKind::Nuclear(state) = source.kind else {
            continue;
        };
        if state.overhaul {
            continue;
        }
        source.capacity = (source.capacity - cfg.nuclear_decay_rate).max(cfg.nuclear_decay_floor);
        if source.capacity < cfg.nuclear_capacity * Fixed64::from_num(0.5) {
            degraded.push(id);
        }
    }
    degraded
}
