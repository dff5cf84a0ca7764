//! All tuning constants for the simulation, collected in one struct so
//! tests and front ends can tweak them without touching module code.
//!
//! Money, loads, and rates are `Fixed64`; intervals are game
//! milliseconds; distances are world-space f64.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Millis, f64_to_fixed64};

/// Session difficulty. Scales starting money, peak-hour frequency, and
/// nuclear failure odds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Beginner,
    #[default]
    Normal,
    Expert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Economy
    pub initial_money: Fixed64,
    pub base_subsidy: Fixed64,
    pub subsidy_threshold: Fixed64,
    pub subsidy_cancel_pop: usize,
    pub economy_tick_interval: Millis,
    pub income_per_house: Fixed64,
    pub income_per_factory: Fixed64,
    pub income_per_commercial: Fixed64,
    pub refund_rate: Fixed64,
    pub maintenance_scale_threshold: usize,
    pub maintenance_scale_multiplier: Fixed64,
    pub clean_energy_subsidy_threshold: Fixed64,

    // Build costs
    pub cost_pylon: Fixed64,
    pub cost_tower: Fixed64,
    pub cost_plant: Fixed64,
    pub cost_nuclear: Fixed64,
    pub cost_wind: Fixed64,
    pub cost_solar: Fixed64,
    pub cost_battery: Fixed64,
    pub cost_repair_station: Fixed64,
    pub cost_dispatch_center: Fixed64,
    pub cost_energy_storage: Fixed64,
    pub cost_wire_per_unit: Fixed64,
    pub cost_upgrade_mult: Fixed64,
    pub prebuild_surcharge: Fixed64,

    // Wires
    pub base_wire_load: Fixed64,
    pub upgraded_wire_load: Fixed64,
    pub min_wire_length: f64,
    pub max_wire_length: f64,
    pub link_heat_rate: Fixed64,
    pub link_cool_rate: Fixed64,

    // Sources
    pub plant_capacity: Fixed64,
    pub plant_upkeep: Fixed64,
    pub max_heat: Fixed64,
    pub critical_heat: Fixed64,
    pub source_heat_rate: Fixed64,
    pub source_cool_rate: Fixed64,

    // Nuclear
    pub nuclear_capacity: Fixed64,
    pub nuclear_upkeep: Fixed64,
    pub nuclear_failure_chance: Fixed64,
    pub nuclear_decay_rate: Fixed64,
    pub nuclear_decay_floor: Fixed64,
    pub nuclear_decay_interval: Millis,
    pub nuclear_cooling_battery_count: usize,
    pub nuclear_cooling_failure_rate: Fixed64,
    pub nuclear_maintenance_upgrade_cost: Fixed64,
    pub nuclear_maintenance_duration: Millis,
    pub nuclear_repair_cost: Fixed64,

    // Wind
    pub wind_capacity_base: Fixed64,
    pub wind_capacity_spread: Fixed64,
    pub wind_speed_event_chance: Fixed64,
    pub wind_speed_high: Fixed64,
    pub wind_speed_low: Fixed64,
    pub wind_edge_distance: f64,

    // Solar
    pub solar_capacity_base: Fixed64,
    pub solar_capacity_spread: Fixed64,
    pub solar_day_start: u64,
    pub solar_day_end: u64,
    pub solar_dawn_hours: u64,
    pub solar_dusk_hours: u64,
    pub solar_storage_upgrade_cost: Fixed64,
    pub solar_storage_efficiency: Fixed64,

    // Batteries
    pub battery_capacity: Fixed64,
    pub battery_charge_rate: Fixed64,
    pub battery_discharge_rate: Fixed64,
    pub grid_stress_high: Fixed64,
    pub grid_stress_low: Fixed64,

    // Support buildings
    pub repair_station_unlock_pop: usize,
    pub repair_station_maintenance_reduction: Fixed64,
    pub dispatch_center_unlock_pop: usize,
    pub energy_storage_unlock_battery_count: usize,
    pub energy_storage_capacity_multiplier: Fixed64,
    pub energy_storage_charge_rate_multiplier: Fixed64,

    // Loads
    pub house_max_patience: Fixed64,
    pub patience_decay_rate: Fixed64,
    pub patience_regen_rate: Fixed64,
    pub patience_alert_fraction: Fixed64,
    pub patience_critical_fraction: Fixed64,
    pub patience_reprieve_fraction: Fixed64,
    pub factory_load: Fixed64,
    pub commercial_base_load: Fixed64,
    pub commercial_peak_load: Fixed64,
    pub commercial_peak_bump_chance: Fixed64,
    pub commercial_cycle_ms: Millis,

    // Spawning
    pub spawn_interval: Millis,
    pub factory_spawn_interval: Millis,
    pub commercial_spawn_interval: Millis,
    pub factory_unlock_pop: usize,
    pub commercial_unlock_pop: usize,
    pub early_game_pop: usize,
    pub mid_game_pop: usize,
    pub min_entity_dist: f64,
    pub spawn_origin_radius: f64,
    pub spawn_wire_clearance: f64,

    // Events
    pub event_check_interval: Millis,
    pub peak_hour_interval: Millis,
    pub peak_hour_duration: Millis,
    pub peak_hour_multiplier: Fixed64,
    pub low_demand_event_chance: Fixed64,
    pub low_demand_duration: Millis,
    pub low_demand_charge_bonus: Fixed64,
    pub low_demand_pop_limit: usize,
    pub maintenance_event_chance: Fixed64,
    pub maintenance_outage_duration: Millis,
    pub maintenance_efficiency_bonus: Fixed64,
    pub maintenance_min_runtime: Millis,
    pub disaster_event_chance: Fixed64,
    pub disaster_pop_threshold: usize,
    pub disaster_duration: Millis,
    pub disaster_link_damage_chance: Fixed64,

    // Progression
    pub achievement_pioneer_pop: usize,
    pub achievement_pioneer_reward: Fixed64,
    pub achievement_clean_energy_ratio: Fixed64,
    pub achievement_clean_energy_discount: Fixed64,
    pub achievement_crisis_disasters: u32,
    pub achievement_crisis_discount: Fixed64,
    pub tech_smart_grid_earnings: Fixed64,
    pub tech_nuclear_count: usize,
    pub tech_nuclear_failure_chance: Fixed64,

    // View / world extent
    pub view_half_width: f64,
    pub view_half_height: f64,
    pub view_expansion_rate: f64,
    pub view_max_ratio: f64,

    // Difficulty scaling
    pub beginner_money_mult: Fixed64,
    pub beginner_peak_freq_mult: f64,
    pub beginner_failure_mult: Fixed64,
    pub expert_money_mult: Fixed64,
    pub expert_peak_freq_mult: f64,
    pub expert_failure_mult: Fixed64,
}

impl Default for Config {
    fn default() -> Self {
        let fx = f64_to_fixed64;
        Self {
            initial_money: fx(200.0),
            base_subsidy: fx(25.0),
            subsidy_threshold: fx(500.0),
            subsidy_cancel_pop: 200,
            economy_tick_interval: 1000,
            income_per_house: fx(1.0),
            income_per_factory: fx(8.0),
            income_per_commercial: fx(5.0),
            refund_rate: fx(0.1),
            maintenance_scale_threshold: 5,
            maintenance_scale_multiplier: fx(1.5),
            clean_energy_subsidy_threshold: fx(0.5),

            cost_pylon: fx(10.0),
            cost_tower: fx(100.0),
            cost_plant: fx(1500.0),
            cost_nuclear: fx(6000.0),
            cost_wind: fx(2000.0),
            cost_solar: fx(2500.0),
            cost_battery: fx(800.0),
            cost_repair_station: fx(2000.0),
            cost_dispatch_center: fx(3500.0),
            cost_energy_storage: fx(4000.0),
            cost_wire_per_unit: fx(0.1),
            cost_upgrade_mult: fx(6.0),
            prebuild_surcharge: fx(1.3),

            base_wire_load: fx(5.0),
            upgraded_wire_load: fx(15.0),
            min_wire_length: 10.0,
            max_wire_length: 300.0,
            link_heat_rate: fx(3.0),
            link_cool_rate: fx(12.0),

            plant_capacity: fx(15.0),
            plant_upkeep: fx(10.0),
            max_heat: fx(100.0),
            critical_heat: fx(80.0),
            source_heat_rate: fx(6.0),
            source_cool_rate: fx(30.0),

            nuclear_capacity: fx(60.0),
            nuclear_upkeep: fx(50.0),
            nuclear_failure_chance: fx(0.05),
            nuclear_decay_rate: fx(5.0),
            nuclear_decay_floor: fx(10.0),
            nuclear_decay_interval: 3_600_000,
            nuclear_cooling_battery_count: 2,
            nuclear_cooling_failure_rate: fx(0.15),
            nuclear_maintenance_upgrade_cost: fx(3000.0),
            nuclear_maintenance_duration: 3_600_000,
            nuclear_repair_cost: fx(1000.0),

            wind_capacity_base: fx(10.0),
            wind_capacity_spread: fx(5.0),
            wind_speed_event_chance: fx(0.10),
            wind_speed_high: fx(1.8),
            wind_speed_low: fx(0.5),
            wind_edge_distance: 200.0,

            solar_capacity_base: fx(8.0),
            solar_capacity_spread: fx(4.0),
            solar_day_start: 6,
            solar_day_end: 18,
            solar_dawn_hours: 1,
            solar_dusk_hours: 1,
            solar_storage_upgrade_cost: fx(1500.0),
            solar_storage_efficiency: fx(0.20),

            battery_capacity: fx(500.0),
            battery_charge_rate: fx(4.0),
            battery_discharge_rate: fx(6.0),
            grid_stress_high: fx(0.95),
            grid_stress_low: fx(0.8),

            repair_station_unlock_pop: 150,
            repair_station_maintenance_reduction: fx(0.20),
            dispatch_center_unlock_pop: 250,
            energy_storage_unlock_battery_count: 8,
            energy_storage_capacity_multiplier: fx(5.0),
            energy_storage_charge_rate_multiplier: fx(1.5),

            house_max_patience: fx(3500.0),
            patience_decay_rate: fx(60.0),
            patience_regen_rate: fx(900.0),
            patience_alert_fraction: fx(0.4),
            patience_critical_fraction: fx(0.3),
            patience_reprieve_fraction: fx(0.3),
            factory_load: fx(5.0),
            commercial_base_load: fx(2.0),
            commercial_peak_load: fx(3.0),
            commercial_peak_bump_chance: fx(0.3),
            commercial_cycle_ms: 6_283,

            spawn_interval: 8_000,
            factory_spawn_interval: 90_000,
            commercial_spawn_interval: 45_000,
            factory_unlock_pop: 30,
            commercial_unlock_pop: 60,
            early_game_pop: 100,
            mid_game_pop: 300,
            min_entity_dist: 60.0,
            spawn_origin_radius: 150.0,
            spawn_wire_clearance: 20.0,

            event_check_interval: 60_000,
            peak_hour_interval: 300_000,
            peak_hour_duration: 30_000,
            peak_hour_multiplier: fx(1.5),
            low_demand_event_chance: fx(0.30),
            low_demand_duration: 300_000,
            low_demand_charge_bonus: fx(1.2),
            low_demand_pop_limit: 200,
            maintenance_event_chance: fx(0.05),
            maintenance_outage_duration: 30_000,
            maintenance_efficiency_bonus: fx(1.1),
            maintenance_min_runtime: 3_600_000,
            disaster_event_chance: fx(0.01),
            disaster_pop_threshold: 300,
            disaster_duration: 600_000,
            disaster_link_damage_chance: fx(0.3),

            achievement_pioneer_pop: 100,
            achievement_pioneer_reward: fx(1000.0),
            achievement_clean_energy_ratio: fx(0.70),
            achievement_clean_energy_discount: fx(0.10),
            achievement_crisis_disasters: 5,
            achievement_crisis_discount: fx(0.20),
            tech_smart_grid_earnings: fx(100_000.0),
            tech_nuclear_count: 5,
            tech_nuclear_failure_chance: fx(0.02),

            view_half_width: 800.0,
            view_half_height: 450.0,
            view_expansion_rate: 0.003,
            view_max_ratio: 12.0,

            beginner_money_mult: fx(1.5),
            beginner_peak_freq_mult: 0.5,
            beginner_failure_mult: fx(0.5),
            expert_money_mult: fx(0.7),
            expert_peak_freq_mult: 1.5,
            expert_failure_mult: fx(1.5),
        }
    }
}

impl Config {
    /// Default config with difficulty scaling applied to starting money,
    /// peak-hour frequency, and nuclear failure odds.
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        let mut cfg = Self::default();
        match difficulty {
            Difficulty::Normal => {}
            Difficulty::Beginner => {
                cfg.initial_money *= cfg.beginner_money_mult;
                cfg.peak_hour_interval =
                    ((cfg.peak_hour_interval as f64) / cfg.beginner_peak_freq_mult) as Millis;
                cfg.nuclear_failure_chance *= cfg.beginner_failure_mult;
            }
            Difficulty::Expert => {
                cfg.initial_money *= cfg.expert_money_mult;
                cfg.peak_hour_interval =
                    ((cfg.peak_hour_interval as f64) / cfg.expert_peak_freq_mult) as Millis;
                cfg.nuclear_failure_chance *= cfg.expert_failure_mult;
            }
        }
        cfg
    }
}
