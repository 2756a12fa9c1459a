//! The exporter's fixed instrument set and the code that writes each poll's
//! [`Metrics`] into it.

use crate::counters::{CounterUpdate, CumulativeCounterState};
use crate::error::Result;
use crate::model::{FixedInfo, Metrics};
use crate::registry::{Counter, Gauge, MetricsRegistry};
use tracing::debug;

const INTERFACE: &[&str] = &["interface"];
const METER: &[&str] = &["meter"];
const METER_POWER_TYPE: &[&str] = &["meter", "powerType"];
const METER_DIRECTION: &[&str] = &["meter", "direction"];

#[derive(Debug)]
pub struct GatewayExporter {
    powerwall_charge_percent: Gauge,
    operating_in_backup_only_mode: Gauge,
    operating_in_self_consumption_mode: Gauge,
    backup_reserve_percent: Gauge,
    uptime_seconds: Gauge,
    major_version: Gauge,
    minor_version: Gauge,
    release_version: Gauge,
    flattened_version: Gauge,
    network_active: Gauge,
    network_enabled: Gauge,
    network_primary: Gauge,
    network_signal_strength: Gauge,
    sitemaster_running: Gauge,
    site_master_connected_to_tesla: Gauge,
    site_master_supplying_power: Gauge,
    instant_power: Gauge,
    cumulative_power: Counter,
    instant_average_voltage: Gauge,
    instant_total_current_amps: Gauge,
    grid_connected: Gauge,
    grid_active: Gauge,
    powerwalls_updating: Gauge,
    grid_reconnection_time_seconds: Gauge,
    counter_state: CumulativeCounterState,
}

impl GatewayExporter {
    /// Registers every instrument and records the fixed site attributes.
    pub fn new(registry: &mut MetricsRegistry, fixed: &FixedInfo) -> Result<Self> {
        let nominal_energy = registry.gauge(
            "nominal_system_energy_kWh",
            "Nominal energy capacity of the system in kWh",
        )?;
        let nominal_power = registry.gauge(
            "nominal_system_power_kW",
            "Nominal power capacity of the system in kW",
        )?;
        let num_powerwalls = registry.gauge("num_powerwalls", "Number of Powerwall units")?;
        let solar_rating = registry.gauge(
            "total_solar_rating_W",
            "Combined power rating of all solar inverters in W",
        )?;
        registry.set(nominal_energy, &[], fixed.nominal_system_energy_kwh)?;
        registry.set(nominal_power, &[], fixed.nominal_system_power_kw)?;
        registry.set(num_powerwalls, &[], fixed.num_powerwalls as f64)?;
        registry.set(solar_rating, &[], fixed.total_solar_power_rating_watts as f64)?;

        Ok(Self {
            powerwall_charge_percent: registry.gauge(
                "powerwall_charge_percent",
                "Powerwall state of charge in percent",
            )?,
            operating_in_backup_only_mode: registry.gauge(
                "operating_in_backup_only_mode",
                "1 if the gateway is in backup-only mode",
            )?,
            operating_in_self_consumption_mode: registry.gauge(
                "operating_in_self_consumption_mode",
                "1 if the gateway is in self-consumption mode",
            )?,
            backup_reserve_percent: registry.gauge(
                "backup_reserve_percent",
                "Charge held back for outages in percent",
            )?,
            uptime_seconds: registry.gauge("uptime_seconds", "Gateway uptime in seconds")?,
            major_version: registry.gauge("major_version", "Gateway firmware major version")?,
            minor_version: registry.gauge("minor_version", "Gateway firmware minor version")?,
            release_version: registry
                .gauge("release_version", "Gateway firmware release version")?,
            flattened_version: registry.gauge(
                "flattened_version",
                "Gateway firmware version as a single number, MMmmrr",
            )?,
            network_active: registry.gauge_vec(
                "network_active",
                "1 if the network interface is active",
                INTERFACE,
            )?,
            network_enabled: registry.gauge_vec(
                "network_enabled",
                "1 if the network interface is enabled",
                INTERFACE,
            )?,
            network_primary: registry.gauge_vec(
                "network_primary",
                "1 if the network interface is the primary uplink",
                INTERFACE,
            )?,
            network_signal_strength: registry.gauge_vec(
                "network_signal_strength",
                "Signal strength reported for the network interface",
                INTERFACE,
            )?,
            sitemaster_running: registry
                .gauge("sitemaster_running", "1 if the site master is running")?,
            site_master_connected_to_tesla: registry.gauge(
                "site_master_connected_to_tesla",
                "1 if the site master is connected to Tesla",
            )?,
            site_master_supplying_power: registry.gauge(
                "site_master_supplying_power",
                "1 if the site master is supplying power",
            )?,
            instant_power: registry.gauge_vec(
                "instant_power",
                "Instantaneous power through the meter",
                METER_POWER_TYPE,
            )?,
            cumulative_power: registry.counter_vec(
                "cumulative_power",
                "Energy through the meter since the exporter started, in kWh",
                METER_DIRECTION,
            )?,
            instant_average_voltage: registry.gauge_vec(
                "instant_average_voltage",
                "Average voltage at the meter",
                METER,
            )?,
            instant_total_current_amps: registry.gauge_vec(
                "instant_total_current_amps",
                "Total current through the meter in A",
                METER,
            )?,
            grid_connected: registry.gauge("grid_connected", "1 if the site is on grid")?,
            grid_active: registry.gauge("grid_active", "1 if grid services are active")?,
            powerwalls_updating: registry.gauge(
                "powerwalls_updating",
                "1 while the Powerwall firmware is updating",
            )?,
            grid_reconnection_time_seconds: registry.gauge(
                "grid_reconnection_time_seconds",
                "Longest wait before a Powerwall reconnects to the grid",
            )?,
            counter_state: CumulativeCounterState::new(),
        })
    }

    pub fn counter_state(&self) -> &CumulativeCounterState {
        &self.counter_state
    }

    /// Writes one poll's metrics into the registry.
    pub fn update(&mut self, registry: &mut MetricsRegistry, metrics: &Metrics) -> Result<()> {
        registry.set(self.powerwall_charge_percent, &[], metrics.powerwall_charge_percent)?;
        registry.set_bool(self.operating_in_backup_only_mode, &[], metrics.backup_only())?;
        registry.set_bool(
            self.operating_in_self_consumption_mode,
            &[],
            metrics.self_consumption(),
        )?;
        registry.set(self.backup_reserve_percent, &[], metrics.backup_reserve_percent)?;
        registry.set(self.uptime_seconds, &[], metrics.uptime.as_secs_f64())?;

        registry.set(self.major_version, &[], metrics.version.major as f64)?;
        registry.set(self.minor_version, &[], metrics.version.minor as f64)?;
        registry.set(self.release_version, &[], metrics.version.release as f64)?;
        registry.set(self.flattened_version, &[], metrics.flattened_version as f64)?;

        for (interface, details) in &metrics.network_interfaces {
            let label = interface.to_string();
            let labels = &[label.as_str()];
            registry.set_bool(self.network_active, labels, details.active)?;
            registry.set_bool(self.network_enabled, labels, details.enabled)?;
            registry.set_bool(self.network_primary, labels, details.primary)?;
            registry.set(self.network_signal_strength, labels, details.signal_strength as f64)?;
        }

        registry.set_bool(self.sitemaster_running, &[], metrics.site_master_running)?;
        registry.set_bool(
            self.site_master_connected_to_tesla,
            &[],
            metrics.site_master_connected_to_tesla,
        )?;
        registry.set_bool(
            self.site_master_supplying_power,
            &[],
            metrics.site_master_supplying_power,
        )?;

        for (meter, reading) in metrics.meters.iter() {
            let meter = meter.to_string();
            let m = meter.as_str();
            registry.set(self.instant_power, &[m, "truePower"], reading.instant_power)?;
            registry.set(
                self.instant_power,
                &[m, "reactivePower"],
                reading.instant_reactive_power,
            )?;
            registry.set(
                self.instant_power,
                &[m, "apparentPower"],
                reading.instant_apparent_power,
            )?;
            registry.set(self.instant_average_voltage, &[m], reading.instant_average_voltage)?;
            registry.set(self.instant_total_current_amps, &[m], reading.instant_total_current)?;
        }

        for (meter, direction, update) in self.counter_state.advance_all(&metrics.meters) {
            let meter = meter.to_string();
            match update {
                CounterUpdate::Increment(delta) => {
                    let labels = [meter.as_str(), direction.label()];
                    registry.add(self.cumulative_power, &labels, delta)?
                }
                CounterUpdate::Noise(delta) => {
                    debug!(%meter, %direction, delta, "cumulative energy jitter ignored")
                }
                CounterUpdate::Reset(_) => {}
            }
        }

        registry.set_bool(self.grid_connected, &[], metrics.grid_connected)?;
        registry.set_bool(self.grid_active, &[], metrics.grid_active)?;
        registry.set_bool(self.powerwalls_updating, &[], metrics.powerwalls_updating)?;
        registry.set(
            self.grid_reconnection_time_seconds,
            &[],
            metrics.grid_reconnection_seconds as f64,
        )?;
        Ok(())
    }
}
