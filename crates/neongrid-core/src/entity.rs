//! Entity types for the grid: power sources (including non-generating
//! support facilities), relay pylons, demand sites, storage batteries,
//! and the wires between them.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Millis};
use crate::geometry::Point;
use crate::id::EntityId;

/// Nuclear-specific state. Failure and decay are driven by the minute
/// cadence event checks; overhaul mode suspends both at the price of
/// zero output.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NuclearState {
    pub needs_repair: bool,
    pub cooling_satisfied: bool,
    pub overhaul: bool,
    pub overhaul_until: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindState {
    /// Current output multiplier, adjusted by wind-speed events.
    pub speed_multiplier: Fixed64,
}

impl Default for WindState {
    fn default() -> Self {
        Self {
            speed_multiplier: Fixed64::ONE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SolarState {
    /// With the storage upgrade, panels keep 20% output at night.
    pub storage_upgrade: bool,
}

/// What kind of source facility this is. Support facilities (tower,
/// repair station, dispatch center, energy storage) generate nothing
/// but live in the source collection and count toward upkeep scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SourceKind {
    Plant,
    Nuclear(NuclearState),
    Wind(WindState),
    Solar(SolarState),
    Tower,
    RepairStation,
    DispatchCenter,
    EnergyStorage,
}

impl SourceKind {
    pub fn is_nuclear(&self) -> bool {
        matches!(self, SourceKind::Nuclear(_))
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, SourceKind::Wind(_) | SourceKind::Solar(_))
    }

    /// True for the facilities whose upkeep scales with fleet size
    /// (everything except nuclear, wind, and solar).
    pub fn is_conventional(&self) -> bool {
        !self.is_nuclear() && !self.is_clean()
    }
}

/// A generating (or support) facility. Seeds the power traversal and
/// accumulates the load of everything it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSource {
    pub pos: Point,
    pub kind: SourceKind,
    /// Nameplate capacity; effective output also depends on kind,
    /// time of day, events, and maintenance state.
    pub capacity: Fixed64,
    pub load: Fixed64,
    pub heat: Fixed64,
    pub upkeep: Fixed64,
    pub built_at: Millis,
    /// Routine maintenance outage (distinct from nuclear overhaul).
    pub under_maintenance: bool,
    pub maintenance_until: Millis,
    /// Output multiplier earned by completing a maintenance outage.
    pub efficiency_bonus: Fixed64,
}

impl PowerSource {
    pub fn new(pos: Point, kind: SourceKind, capacity: Fixed64, upkeep: Fixed64, built_at: Millis) -> Self {
        Self {
            pos,
            kind,
            capacity,
            load: Fixed64::ZERO,
            heat: Fixed64::ZERO,
            upkeep,
            built_at,
            under_maintenance: false,
            maintenance_until: 0,
            efficiency_bonus: Fixed64::ONE,
        }
    }
}

/// A relay pylon. Forwards power, consumes nothing. Disasters can
/// damage it, which blocks traversal through it until repaired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pylon {
    pub pos: Point,
    pub powered: bool,
    pub damaged: bool,
}

impl Pylon {
    pub fn new(pos: Point) -> Self {
        Self {
            pos,
            powered: false,
            damaged: false,
        }
    }
}

/// Demand site category. Commercial sites carry an oscillation phase so
/// their demand curves are not synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadKind {
    House,
    Factory,
    Commercial {
        phase: Fixed64,
        current_load: Fixed64,
    },
}

impl LoadKind {
    pub fn is_house(&self) -> bool {
        matches!(self, LoadKind::House)
    }
}

/// A demand site. Patience drains while unpowered; at zero the game
/// ends unless a grace window reprieves the site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSite {
    pub pos: Point,
    pub kind: LoadKind,
    pub patience: Fixed64,
    pub powered: bool,
}

impl LoadSite {
    pub fn new(pos: Point, kind: LoadKind, max_patience: Fixed64) -> Self {
        Self {
            pos,
            kind,
            patience: max_patience,
            powered: false,
        }
    }
}

/// What a battery is doing this tick, decided by the charge controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatteryOp {
    #[default]
    Idle,
    Charging,
    Discharging,
}

/// A storage battery. While charging it appears as demand on the grid;
/// while discharging its target load is negative, offsetting demand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub pos: Point,
    pub energy: Fixed64,
    pub max_energy: Fixed64,
    pub powered: bool,
    pub op: BatteryOp,
    pub target_load: Fixed64,
}

impl Battery {
    pub fn new(pos: Point, max_energy: Fixed64) -> Self {
        Self {
            pos,
            energy: Fixed64::ZERO,
            max_energy,
            powered: false,
            op: BatteryOp::Idle,
            target_load: Fixed64::ZERO,
        }
    }
}

/// One entity in the grid arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Source(PowerSource),
    Pylon(Pylon),
    Load(LoadSite),
    Battery(Battery),
}

impl Node {
    pub fn pos(&self) -> Point {
        match self {
            Node::Source(s) => s.pos,
            Node::Pylon(p) => p.pos,
            Node::Load(l) => l.pos,
            Node::Battery(b) => b.pos,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Node::Source(_))
    }

    pub fn as_source(&self) -> Option<&PowerSource> {
        match self {
            Node::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_source_mut(&mut self) -> Option<&mut PowerSource> {
        match self {
            Node::Source(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_battery(&self) -> Option<&Battery> {
        match self {
            Node::Battery(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_battery_mut(&mut self) -> Option<&mut Battery> {
        match self {
            Node::Battery(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_load(&self) -> Option<&LoadSite> {
        match self {
            Node::Load(l) => Some(l),
            _ => None,
        }
    }

    /// Whether the entity currently receives power. Sources count as
    /// powered by definition.
    pub fn powered(&self) -> bool {
        match self {
            Node::Source(_) => true,
            Node::Pylon(p) => p.powered,
            Node::Load(l) => l.powered,
            Node::Battery(b) => b.powered,
        }
    }

    pub fn set_powered(&mut self, powered: bool) {
        match self {
            Node::Source(_) => {}
            Node::Pylon(p) => p.powered = powered,
            Node::Load(l) => l.powered = powered,
            Node::Battery(b) => b.powered = powered,
        }
    }
}

/// A wire between two entities. Undirected; `from`/`to` only record
/// build order. Heat accumulates while the carried load exceeds
/// `max_load`, and the wire burns out at max heat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub from: EntityId,
    pub to: EntityId,
    pub length: f64,
    pub upgraded: bool,
    pub max_load: Fixed64,
    pub load: Fixed64,
    pub heat: Fixed64,
    pub active: bool,
    /// Transmission loss fraction. Reserved hook, zero in normal play.
    pub loss: Fixed64,
}

impl Link {
    pub fn new(from: EntityId, to: EntityId, length: f64, max_load: Fixed64) -> Self {
        Self {
            from,
            to,
            length,
            upgraded: false,
            max_load,
            load: Fixed64::ZERO,
            heat: Fixed64::ZERO,
            active: false,
            loss: Fixed64::ZERO,
        }
    }

    /// The endpoint opposite `id`, or `None` if `id` is not an endpoint.
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.from == id {
            Some(self.to)
        } else if self.to == id {
            Some(self.from)
        } else {
            None
        }
    }

    pub fn touches(&self, id: EntityId) -> bool {
        self.from == id || self.to == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64;
    use slotmap::SlotMap;

    #[test]
    fn source_starts_cold_and_unloaded() {
        let s = PowerSource::new(
            Point::ORIGIN,
            SourceKind::Plant,
            f64_to_fixed64(15.0),
            f64_to_fixed64(10.0),
            0,
        );
        assert_eq!(s.load, Fixed64::ZERO);
        assert_eq!(s.heat, Fixed64::ZERO);
        assert_eq!(s.efficiency_bonus, Fixed64::ONE);
    }

    #[test]
    fn kind_classification() {
        assert!(SourceKind::Nuclear(NuclearState::default()).is_nuclear());
        assert!(SourceKind::Wind(WindState::default()).is_clean());
        assert!(SourceKind::Solar(SolarState::default()).is_clean());
        assert!(SourceKind::Plant.is_conventional());
        assert!(SourceKind::Tower.is_conventional());
        assert!(SourceKind::RepairStation.is_conventional());
        assert!(!SourceKind::Nuclear(NuclearState::default()).is_conventional());
    }

    #[test]
    fn node_powered_semantics() {
        let mut pylon = Node::Pylon(Pylon::new(Point::ORIGIN));
        assert!(!pylon.powered());
        pylon.set_powered(true);
        assert!(pylon.powered());

        let source = Node::Source(PowerSource::new(
            Point::ORIGIN,
            SourceKind::Plant,
            Fixed64::ZERO,
            Fixed64::ZERO,
            0,
        ));
        assert!(source.powered());
    }

    #[test]
    fn link_other_endpoint() {
        let mut arena: SlotMap<EntityId, u8> = SlotMap::with_key();
        let a = arena.insert(0);
        let b = arena.insert(1);
        let c = arena.insert(2);
        let link = Link::new(a, b, 100.0, f64_to_fixed64(5.0));
        assert_eq!(link.other(a), Some(b));
        assert_eq!(link.other(b), Some(a));
        assert_eq!(link.other(c), None);
        assert!(link.touches(a));
        assert!(!link.touches(c));
    }
}
