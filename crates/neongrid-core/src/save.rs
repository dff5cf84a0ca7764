//! Versioned JSON save files.
//!
//! Entities are stored as flat arrays in insertion order and wires by
//! index into the concatenation sources ++ pylons ++ loads ++
//! batteries. Transient grid state (wire load and heat, battery ops,
//! powered flags) is reset on load and recomputed by the first tick.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, Difficulty};
use crate::entity::{Battery, BatteryOp, Link, LoadSite, PowerSource, Pylon};
use crate::fixed::{Fixed64, Millis};
use crate::geometry::ViewExtent;
use crate::id::EntityId;
use crate::progress::{Progress, Records};
use crate::world::World;

/// Current save format version.
pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("unsupported save version {0}")]
    Version(u32),
    #[error("corrupt save: wire endpoint index {0} out of range")]
    LinkIndex(usize),
    #[error("malformed save data: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A wire between two entities, addressed by flat index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SavedLink {
    pub from: usize,
    pub to: usize,
    pub upgraded: bool,
}

/// Everything needed to resume a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveGame {
    pub version: u32,
    pub difficulty: Difficulty,
    pub money: Fixed64,
    pub net_income: Fixed64,
    pub time_scale: Fixed64,
    pub game_time: Millis,
    pub rng_state: u64,
    pub view: ViewExtent,
    pub last_house_spawn: Millis,
    pub last_factory_spawn: Millis,
    pub last_commercial_spawn: Millis,
    pub last_settlement: Millis,
    pub last_peak: Millis,
    pub progress: Progress,
    pub records: Records,
    pub sources: Vec<PowerSource>,
    pub pylons: Vec<Pylon>,
    pub loads: Vec<LoadSite>,
    pub batteries: Vec<Battery>,
    pub links: Vec<SavedLink>,
}

impl SaveGame {
    pub fn to_json(&self) -> Result<String, SaveError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, SaveError> {
        let save: SaveGame = serde_json::from_str(data)?;
        if save.version != SAVE_VERSION {
            return Err(SaveError::Version(save.version));
        }
        Ok(save)
    }
}

/// Flattens the world into save arrays, mapping wire endpoints to
/// indices in the concatenated entity order.
pub fn encode_world(
    world: &World,
) -> (
    Vec<PowerSource>,
    Vec<Pylon>,
    Vec<LoadSite>,
    Vec<Battery>,
    Vec<SavedLink>,
) {
    let mut flat: Vec<EntityId> = Vec::new();
    flat.extend_from_slice(world.source_ids());
    flat.extend_from_slice(world.pylon_ids());
    flat.extend_from_slice(world.load_ids());
    flat.extend_from_slice(world.battery_ids());

    let index_of = |id: EntityId| flat.iter().position(|&other| other == id);

    let sources = world.sources().map(|(_, s)| s.clone()).collect();
    let pylons = world
        .pylon_ids()
        .iter()
        .filter_map(|&id| world.node(id))
        .filter_map(|n| match n {
            crate::entity::Node::Pylon(p) => Some(*p),
            _ => None,
        })
        .collect();
    let loads = world.loads().map(|(_, l)| *l).collect();
    let batteries = world.batteries().map(|(_, b)| *b).collect();

    let links = world
        .links_iter()
        .filter_map(|(_, l)| {
            let from = index_of(l.from)?;
            let to = index_of(l.to)?;
            Some(SavedLink {
                from,
                to,
                upgraded: l.upgraded,
            })
        })
        .collect();

    (sources, pylons, loads, batteries, links)
}

/// Rebuilds a world from save arrays. Wire lengths come back from the
/// endpoint positions; wire load, heat, and battery operations reset.
pub fn decode_world(save: &SaveGame, cfg: &Config) -> Result<World, SaveError> {
    let mut world = World::new();
    let mut flat: Vec<EntityId> = Vec::new();

    for source in &save.sources {
        flat.push(world.insert_source(source.clone()));
    }
    for pylon in &save.pylons {
        flat.push(world.insert_pylon(*pylon));
    }
    for load in &save.loads {
        flat.push(world.insert_load(*load));
    }
    for battery in &save.batteries {
        let mut battery = *battery;
        battery.op = BatteryOp::Idle;
        battery.target_load = Fixed64::ZERO;
        battery.powered = false;
        flat.push(world.insert_battery(battery));
    }

    for link in &save.links {
        let &from = flat.get(link.from).ok_or(SaveError::LinkIndex(link.from))?;
        let &to = flat.get(link.to).ok_or(SaveError::LinkIndex(link.to))?;
        let length = match (world.node(from), world.node(to)) {
            (Some(a), Some(b)) => a.pos().distance(b.pos()),
            _ => return Err(SaveError::LinkIndex(link.from)),
        };
        let max_load = if link.upgraded {
            cfg.upgraded_wire_load
        } else {
            cfg.base_wire_load
        };
        let mut rebuilt = Link::new(from, to, length, max_load);
        rebuilt.upgraded = link.upgraded;
        world.insert_link(rebuilt);
    }

    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{LoadKind, SourceKind};
    use crate::fixed::f64_to_fixed64;
    use crate::geometry::Point;

    fn sample_world(cfg: &Config) -> World {
        let mut world = World::new();
        let plant = world.insert_source(PowerSource::new(
            Point::new(0.0, 0.0),
            SourceKind::Plant,
            cfg.plant_capacity,
            cfg.plant_upkeep,
            0,
        ));
        let pylon = world.insert_pylon(Pylon::new(Point::new(120.0, 0.0)));
        let house = world.insert_load(LoadSite::new(
            Point::new(240.0, 0.0),
            LoadKind::House,
            cfg.house_max_patience,
        ));
        let battery = world.insert_battery(Battery::new(Point::new(120.0, 100.0), cfg.battery_capacity));
        world.insert_link(Link::new(plant, pylon, 120.0, cfg.base_wire_load));
        world.insert_link(Link::new(pylon, house, 120.0, cfg.base_wire_load));
        let mut hv = Link::new(pylon, battery, 100.0, cfg.upgraded_wire_load);
        hv.upgraded = true;
        world.insert_link(hv);
        world
    }

    fn sample_save(cfg: &Config) -> SaveGame {
        let world = sample_world(cfg);
        let (sources, pylons, loads, batteries, links) = encode_world(&world);
        SaveGame {
            version: SAVE_VERSION,
            difficulty: Difficulty::Normal,
            money: f64_to_fixed64(321.0),
            net_income: f64_to_fixed64(-4.0),
            time_scale: Fixed64::ONE,
            game_time: 77_000,
            rng_state: 0x1234_5678,
            view: ViewExtent::centered(800.0, 450.0),
            last_house_spawn: 70_000,
            last_factory_spawn: 0,
            last_commercial_spawn: 0,
            last_settlement: 60_000,
            last_peak: 300_000,
            progress: Progress::default(),
            records: Records::default(),
            sources,
            pylons,
            loads,
            batteries,
            links,
        }
    }

    // ---- Test 1: encode maps wires to flat indices ----
    #[test]
    fn encode_indices_follow_insertion_order() {
        let cfg = Config::default();
        let world = sample_world(&cfg);
        let (sources, pylons, loads, batteries, links) = encode_world(&world);
        assert_eq!(sources.len(), 1);
        assert_eq!(pylons.len(), 1);
        assert_eq!(loads.len(), 1);
        assert_eq!(batteries.len(), 1);
        // plant=0, pylon=1, house=2, battery=3
        assert_eq!((links[0].from, links[0].to), (0, 1));
        assert_eq!((links[1].from, links[1].to), (1, 2));
        assert_eq!((links[2].from, links[2].to), (1, 3));
        assert!(links[2].upgraded);
    }

    // ---- Test 2: JSON round trip preserves the grid ----
    #[test]
    fn json_round_trip() {
        let cfg = Config::default();
        let save = sample_save(&cfg);
        let json = save.to_json().unwrap();
        let restored = SaveGame::from_json(&json).unwrap();
        assert_eq!(restored.money, save.money);
        assert_eq!(restored.game_time, 77_000);
        assert_eq!(restored.links.len(), 3);

        let world = decode_world(&restored, &cfg).unwrap();
        assert_eq!(world.source_count(), 1);
        assert_eq!(world.population(), 1);
        assert_eq!(world.battery_count(), 1);
        assert_eq!(world.link_ids().len(), 3);
    }

    // ---- Test 3: wire state resets on load ----
    #[test]
    fn decode_resets_transient_state() {
        let cfg = Config::default();
        let save = sample_save(&cfg);
        let world = decode_world(&save, &cfg).unwrap();
        for (_, link) in world.links_iter() {
            assert_eq!(link.load, Fixed64::ZERO);
            assert_eq!(link.heat, Fixed64::ZERO);
        }
        for (_, battery) in world.batteries() {
            assert_eq!(battery.op, BatteryOp::Idle);
        }
        // Upgraded wires come back at the high-voltage rating.
        let hv = world
            .links_iter()
            .find(|(_, l)| l.upgraded)
            .map(|(_, l)| l.max_load);
        assert_eq!(hv, Some(cfg.upgraded_wire_load));
    }

    // ---- Test 4: version gate ----
    #[test]
    fn rejects_unknown_version() {
        let cfg = Config::default();
        let mut save = sample_save(&cfg);
        save.version = 99;
        let json = save.to_json().unwrap();
        match SaveGame::from_json(&json) {
            Err(SaveError::Version(99)) => {}
            other => panic!("expected version error, got {other:?}"),
        }
    }

    // ---- Test 5: dangling wire index is a corrupt save ----
    #[test]
    fn rejects_out_of_range_link() {
        let cfg = Config::default();
        let mut save = sample_save(&cfg);
        save.links.push(SavedLink {
            from: 0,
            to: 42,
            upgraded: false,
        });
        match decode_world(&save, &cfg) {
            Err(SaveError::LinkIndex(42)) => {}
            other => panic!("expected index error, got {other:?}"),
        }
    }

    // ---- Test 6: garbage input reports a serde error ----
    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            SaveGame::from_json("not json at all"),
            Err(SaveError::Serde(_))
        ));
    }
}
