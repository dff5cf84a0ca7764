//! Achievements, tech unlocks and session records.
//!
//! Unlocks are one-shot and permanent for the session. Their effects
//! are applied by rewriting the session's own `Config` copy, so later
//! cost lookups pick the discounts up without extra plumbing.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::economy::clean_ratio;
use crate::fixed::{Fixed64, Millis};
use crate::world::World;

/// Running totals the achievement checks read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Records {
    pub max_population: usize,
    pub total_earnings: Fixed64,
    pub disaster_count: u32,
    pub runtime_ms: Millis,
}

impl Records {
    pub fn note_population(&mut self, population: usize) {
        if population > self.max_population {
            self.max_population = population;
        }
    }

    /// Only positive settlements count toward lifetime earnings.
    pub fn add_earnings(&mut self, net: Fixed64) {
        if net > Fixed64::ZERO {
            self.total_earnings += net;
        }
    }

    pub fn note_disaster(&mut self) {
        self.disaster_count += 1;
    }
}

/// Which one-shot unlocks have fired.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub pioneer: bool,
    pub clean_energy_master: bool,
    pub crisis_expert: bool,
    pub smart_grid: bool,
    pub nuclear_tech: bool,
}

/// A newly fired unlock, reported once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unlock {
    /// Population milestone. Pays a one-time cash reward.
    Pioneer,
    /// High clean-generation ratio. Discounts wind and solar builds.
    CleanEnergyMaster,
    /// Survived enough disasters. Discounts repair stations.
    CrisisExpert,
    /// Lifetime earnings milestone.
    SmartGrid,
    /// Nuclear fleet milestone. Reactors become more reliable.
    NuclearTech,
}

/// Evaluates every pending unlock against the current state, applies
/// config side effects, and returns the ones that fired this call.
pub fn check_unlocks(
    progress: &mut Progress,
    records: &Records,
    world: &World,
    cfg: &mut Config,
) -> Vec<Unlock> {
    let mut fired = Vec::new();

    if !progress.pioneer && world.population() >= cfg.achievement_pioneer_pop {
        progress.pioneer = true;
        fired.push(Unlock::Pioneer);
    }

    if !progress.clean_energy_master
        && world.source_count() > 0
        && clean_ratio(world) >= cfg.achievement_clean_energy_ratio
    {
        progress.clean_energy_master = true;
        let keep = Fixed64::ONE - cfg.achievement_clean_energy_discount;
        cfg.cost_wind = (cfg.cost_wind * keep).floor();
        cfg.cost_solar = (cfg.cost_solar * keep).floor();
        fired.push(Unlock::CleanEnergyMaster);
    }

    if !progress.crisis_expert && records.disaster_count >= cfg.achievement_crisis_disasters {
        progress.crisis_expert = true;
        let keep = Fixed64::ONE - cfg.achievement_crisis_discount;
        cfg.cost_repair_station = (cfg.cost_repair_station * keep).floor();
        fired.push(Unlock::CrisisExpert);
    }

    if !progress.smart_grid && records.total_earnings >= cfg.tech_smart_grid_earnings {
        progress.smart_grid = true;
        fired.push(Unlock::SmartGrid);
    }

    if !progress.nuclear_tech && world.nuclear_count() >= cfg.tech_nuclear_count {
        progress.nuclear_tech = true;
        cfg.nuclear_failure_chance = cfg.tech_nuclear_failure_chance;
        fired.push(Unlock::NuclearTech);
    }

    fired
}

/// Re-applies the config side effects of already-held unlocks. Used
/// when resuming from a save, where the config starts fresh.
pub fn reapply_effects(progress: &Progress, cfg: &mut Config) {
    if progress.clean_energy_master {
        let keep = Fixed64::ONE - cfg.achievement_clean_energy_discount;
        cfg.cost_wind = (cfg.cost_wind * keep).floor();
        cfg.cost_solar = (cfg.cost_solar * keep).floor();
    }
    if progress.crisis_expert {
        let keep = Fixed64::ONE - cfg.achievement_crisis_discount;
        cfg.cost_repair_station = (cfg.cost_repair_station * keep).floor();
    }
    if progress.nuclear_tech {
        cfg.nuclear_failure_chance = cfg.tech_nuclear_failure_chance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{LoadKind, LoadSite, NuclearState, PowerSource, SourceKind, WindState};
    use crate::fixed::{f64_to_fixed64, fixed64_to_f64};
    use crate::geometry::Point;

    fn house(x: f64) -> LoadSite {
        LoadSite::new(Point::new(x, 0.0), LoadKind::House, f64_to_fixed64(3500.0))
    }

    // ---- Test 1: pioneer fires once at the population threshold ----
    #[test]
    fn pioneer_fires_once() {
        let mut cfg = Config::default();
        let mut world = World::new();
        let mut progress = Progress::default();
        let records = Records::default();

        for i in 0..cfg.achievement_pioneer_pop {
            world.insert_load(house(i as f64 * 80.0));
        }
        let fired = check_unlocks(&mut progress, &records, &world, &mut cfg);
        assert_eq!(fired, vec![Unlock::Pioneer]);
        assert!(progress.pioneer);

        // Second pass reports nothing.
        let again = check_unlocks(&mut progress, &records, &world, &mut cfg);
        assert!(again.is_empty());
    }

    // ---- Test 2: clean energy master discounts wind and solar ----
    #[test]
    fn clean_master_discounts_renewables() {
        let mut cfg = Config::default();
        let mut world = World::new();
        let mut progress = Progress::default();
        let records = Records::default();

        world.insert_source(PowerSource::new(
            Point::new(0.0, 0.0),
            SourceKind::Wind(WindState::default()),
            cfg.wind_capacity_base,
            Fixed64::ZERO,
            0,
        ));
        let wind_before = fixed64_to_f64(cfg.cost_wind);
        let solar_before = fixed64_to_f64(cfg.cost_solar);

        let fired = check_unlocks(&mut progress, &records, &world, &mut cfg);
        assert_eq!(fired, vec![Unlock::CleanEnergyMaster]);
        assert_eq!(fixed64_to_f64(cfg.cost_wind), (wind_before * 0.9).floor());
        assert_eq!(fixed64_to_f64(cfg.cost_solar), (solar_before * 0.9).floor());
    }

    // ---- Test 3: no clean unlock on an empty grid ----
    #[test]
    fn clean_master_needs_a_source() {
        let mut cfg = Config::default();
        let world = World::new();
        let mut progress = Progress::default();
        let records = Records::default();

        let fired = check_unlocks(&mut progress, &records, &world, &mut cfg);
        assert!(fired.is_empty());
        assert!(!progress.clean_energy_master);
    }

    // ---- Test 4: crisis expert on the disaster count ----
    #[test]
    fn crisis_expert_discounts_repair_stations() {
        let mut cfg = Config::default();
        let world = World::new();
        let mut progress = Progress::default();
        let mut records = Records::default();
        for _ in 0..cfg.achievement_crisis_disasters {
            records.note_disaster();
        }
        let before = fixed64_to_f64(cfg.cost_repair_station);
        let fired = check_unlocks(&mut progress, &records, &world, &mut cfg);
        assert_eq!(fired, vec![Unlock::CrisisExpert]);
        assert_eq!(
            fixed64_to_f64(cfg.cost_repair_station),
            (before * 0.8).floor()
        );
    }

    // ---- Test 5: smart grid tracks lifetime earnings ----
    #[test]
    fn smart_grid_from_earnings() {
        let mut cfg = Config::default();
        let world = World::new();
        let mut progress = Progress::default();
        let mut records = Records::default();
        records.add_earnings(f64_to_fixed64(60_000.0));
        // Losses do not count.
        records.add_earnings(f64_to_fixed64(-5_000.0));
        assert!(check_unlocks(&mut progress, &records, &world, &mut cfg).is_empty());

        records.add_earnings(f64_to_fixed64(40_000.0));
        let fired = check_unlocks(&mut progress, &records, &world, &mut cfg);
        assert_eq!(fired, vec![Unlock::SmartGrid]);
    }

    // ---- Test 6: nuclear tech lowers the failure chance ----
    #[test]
    fn nuclear_tech_improves_reliability() {
        let mut cfg = Config::default();
        let mut world = World::new();
        let mut progress = Progress::default();
        let records = Records::default();

        for i in 0..cfg.tech_nuclear_count {
            world.insert_source(PowerSource::new(
                Point::new(i as f64 * 200.0, 0.0),
                SourceKind::Nuclear(NuclearState::default()),
                cfg.nuclear_capacity,
                cfg.nuclear_upkeep,
                0,
            ));
        }
        let fired = check_unlocks(&mut progress, &records, &world, &mut cfg);
        assert!(fired.contains(&Unlock::NuclearTech));
        assert_eq!(cfg.nuclear_failure_chance, cfg.tech_nuclear_failure_chance);
    }

    // ---- Test 7: record helpers keep maxima and totals ----
    #[test]
    fn records_track_maxima() {
        let mut records = Records::default();
        records.note_population(40);
        records.note_population(25);
        assert_eq!(records.max_population, 40);

        records.add_earnings(f64_to_fixed64(10.0));
        records.add_earnings(f64_to_fixed64(-3.0));
        assert_eq!(fixed64_to_f64(records.total_earnings), 10.0);
    }
}
