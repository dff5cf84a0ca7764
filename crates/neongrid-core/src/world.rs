//! The grid arena: slotmap storage for entities and wires plus
//! insertion-ordered id lists.
//!
//! Iteration order matters: traversal seeding, upkeep scaling, and the
//! save format all walk entities in build order, so every collection
//! keeps a parallel `Vec` of ids alongside the slotmap.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::entity::{Battery, Link, LoadSite, Node, Pylon, PowerSource};
use crate::geometry::{Point, dist_to_segment};
use crate::id::{EntityId, LinkId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
    nodes: SlotMap<EntityId, Node>,
    links: SlotMap<LinkId, Link>,
    source_order: Vec<EntityId>,
    pylon_order: Vec<EntityId>,
    load_order: Vec<EntityId>,
    battery_order: Vec<EntityId>,
    link_order: Vec<LinkId>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- insertion -----

    pub fn insert_source(&mut self, source: PowerSource) -> EntityId {
        let id = self.nodes.insert(Node::Source(source));
        self.source_order.push(id);
        id
    }

    pub fn insert_pylon(&mut self, pylon: Pylon) -> EntityId {
        let id = self.nodes.insert(Node::Pylon(pylon));
        self.pylon_order.push(id);
        id
    }

    pub fn insert_load(&mut self, load: LoadSite) -> EntityId {
        let id = self.nodes.insert(Node::Load(load));
        self.load_order.push(id);
        id
    }

    pub fn insert_battery(&mut self, battery: Battery) -> EntityId {
        let id = self.nodes.insert(Node::Battery(battery));
        self.battery_order.push(id);
        id
    }

    pub fn insert_link(&mut self, link: Link) -> LinkId {
        let id = self.links.insert(link);
        self.link_order.push(id);
        id
    }

    // ----- access -----

    pub fn node(&self, id: EntityId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: EntityId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id)
    }

    pub fn contains_link(&self, id: LinkId) -> bool {
        self.links.contains_key(id)
    }

    // ----- ordered id lists -----

    pub fn source_ids(&self) -> &[EntityId] {
        &self.source_order
    }

    pub fn pylon_ids(&self) -> &[EntityId] {
        &self.pylon_order
    }

    pub fn load_ids(&self) -> &[EntityId] {
        &self.load_order
    }

    pub fn battery_ids(&self) -> &[EntityId] {
        &self.battery_order
    }

    pub fn link_ids(&self) -> &[LinkId] {
        &self.link_order
    }

    // ----- ordered iteration -----

    pub fn sources(&self) -> impl Iterator<Item = (EntityId, &PowerSource)> {
        self.source_order.iter().filter_map(|&id| {
            self.nodes.get(id).and_then(|n| n.as_source()).map(|s| (id, s))
        })
    }

    pub fn loads(&self) -> impl Iterator<Item = (EntityId, &LoadSite)> {
        self.load_order.iter().filter_map(|&id| {
            self.nodes.get(id).and_then(|n| n.as_load()).map(|l| (id, l))
        })
    }

    pub fn batteries(&self) -> impl Iterator<Item = (EntityId, &Battery)> {
        self.battery_order.iter().filter_map(|&id| {
            self.nodes.get(id).and_then(|n| n.as_battery()).map(|b| (id, b))
        })
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = (EntityId, &Node)> {
        self.nodes.iter()
    }

    pub fn links_iter(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.link_order
            .iter()
            .filter_map(|&id| self.links.get(id).map(|l| (id, l)))
    }

    pub fn links_touching(&self, id: EntityId) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links_iter().filter(move |(_, l)| l.touches(id))
    }

    pub fn has_link_between(&self, a: EntityId, b: EntityId) -> bool {
        self.links
            .values()
            .any(|l| (l.from == a && l.to == b) || (l.from == b && l.to == a))
    }

    // ----- removal -----

    pub fn remove_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(id)?;
        self.link_order.retain(|&l| l != id);
        Some(link)
    }

    /// Remove an entity along with every wire touching it. Returns the
    /// node and the removed wires (demolition refunds need them).
    pub fn remove_entity(&mut self, id: EntityId) -> Option<(Node, Vec<Link>)> {
        let node = self.nodes.remove(id)?;
        self.source_order.retain(|&e| e != id);
        self.pylon_order.retain(|&e| e != id);
        self.load_order.retain(|&e| e != id);
        self.battery_order.retain(|&e| e != id);

        let touching: Vec<LinkId> = self
            .link_order
            .iter()
            .copied()
            .filter(|&l| self.links.get(l).is_some_and(|link| link.touches(id)))
            .collect();
        let mut removed = Vec::with_capacity(touching.len());
        for link_id in touching {
            if let Some(link) = self.remove_link(link_id) {
                removed.push(link);
            }
        }
        Some((node, removed))
    }

    // ----- counts -----

    /// Population is the number of demand sites. Used by subsidy
    /// cancellation, unlock gates, events, and achievements.
    pub fn population(&self) -> usize {
        self.load_order.len()
    }

    /// Spawn pacing counts demand sites, pylons, and batteries.
    pub fn settlement_count(&self) -> usize {
        self.load_order.len() + self.pylon_order.len() + self.battery_order.len()
    }

    pub fn source_count(&self) -> usize {
        self.source_order.len()
    }

    pub fn battery_count(&self) -> usize {
        self.battery_order.len()
    }

    pub fn nuclear_count(&self) -> usize {
        self.sources().filter(|(_, s)| s.kind.is_nuclear()).count()
    }

    pub fn clean_source_count(&self) -> usize {
        self.sources().filter(|(_, s)| s.kind.is_clean()).count()
    }

    pub fn has_repair_station(&self) -> bool {
        self.sources()
            .any(|(_, s)| matches!(s.kind, crate::entity::SourceKind::RepairStation))
    }

    pub fn has_energy_storage(&self) -> bool {
        self.sources()
            .any(|(_, s)| matches!(s.kind, crate::entity::SourceKind::EnergyStorage))
    }

    // ----- placement queries -----

    /// No entity within `buffer` of `p`.
    pub fn is_position_clear(&self, p: Point, buffer: f64) -> bool {
        self.nodes.values().all(|n| n.pos().distance(p) >= buffer)
    }

    /// No wire passes within `clearance` of `p`.
    pub fn is_clear_of_links(&self, p: Point, clearance: f64) -> bool {
        self.links.values().all(|l| {
            let (Some(a), Some(b)) = (self.nodes.get(l.from), self.nodes.get(l.to)) else {
                return true;
            };
            dist_to_segment(p, a.pos(), b.pos()) >= clearance
        })
    }

    /// Entity under a pick at `p`, closest first.
    pub fn entity_at(&self, p: Point, radius: f64) -> Option<EntityId> {
        self.nodes
            .iter()
            .map(|(id, n)| (id, n.pos().distance(p)))
            .filter(|&(_, d)| d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Wire under a pick at `p`, closest first.
    pub fn link_at(&self, p: Point, tolerance: f64) -> Option<LinkId> {
        self.links
            .iter()
            .filter_map(|(id, l)| {
                let (a, b) = (self.nodes.get(l.from)?, self.nodes.get(l.to)?);
                Some((id, dist_to_segment(p, a.pos(), b.pos())))
            })
            .filter(|&(_, d)| d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}
