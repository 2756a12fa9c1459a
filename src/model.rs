//! Gateway readings reshaped into the exporter's metrics model.

use crate::enums::{NetworkInterface, OperatingMode, SystemStatus};
use crate::error::{ExporterError, Result};
use crate::gateway_api::{
    Aggregates, GatewayConfig, GridStatus, MeterAggregate, Network, Operation, Powerwalls,
    SiteInfo, SiteMaster, Soe, Solar, Status,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Attributes assumed not to change while the exporter runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedInfo {
    pub site_name: String,
    pub nominal_system_energy_kwh: f64,
    pub nominal_system_power_kw: f64,
    pub num_powerwalls: usize,
    pub powerwall_serial_numbers: Vec<String>,
    pub vin: String,
    pub total_solar_power_rating_watts: i64,
}

impl FixedInfo {
    pub fn from_responses(
        site_info: &SiteInfo,
        powerwalls: &Powerwalls,
        config: &GatewayConfig,
        solars: &[Solar],
    ) -> Self {
        Self {
            site_name: site_info.site_name.clone(),
            nominal_system_energy_kwh: site_info.nominal_system_energy_kwh,
            nominal_system_power_kw: site_info.nominal_system_power_kw,
            num_powerwalls: powerwalls.powerwalls.len(),
            powerwall_serial_numbers: powerwalls
                .powerwalls
                .iter()
                .map(|pw| pw.package_serial_number.clone())
                .collect(),
            vin: config.vin.clone(),
            total_solar_power_rating_watts: solars.iter().map(|s| s.power_rating_watts).sum(),
        }
    }
}

/// Every response gathered during one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSnapshot {
    pub networks: Vec<Network>,
    pub operation: Operation,
    pub status: Status,
    pub powerwalls: Powerwalls,
    pub site_master: SiteMaster,
    pub aggregates: Aggregates,
    pub soe: Soe,
    pub grid_status: GridStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Meter {
    Site,
    Load,
    Solar,
    Battery,
}

impl Meter {
    pub const ALL: [Meter; 4] = [Meter::Site, Meter::Load, Meter::Solar, Meter::Battery];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Meter::Site => "site",
            Meter::Load => "load",
            Meter::Solar => "solar",
            Meter::Battery => "battery",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterReading {
    pub instant_power: f64,
    pub instant_reactive_power: f64,
    pub instant_apparent_power: f64,
    pub instant_average_voltage: f64,
    pub instant_total_current: f64,
    /// Lifetime energy drawn into the meter, in kWh.
    pub cumulative_imported: f64,
    /// Lifetime energy pushed out through the meter, in kWh.
    pub cumulative_exported: f64,
}

impl From<&MeterAggregate> for MeterReading {
    fn from(agg: &MeterAggregate) -> Self {
        Self {
            instant_power: agg.instant_power,
            instant_reactive_power: agg.instant_reactive_power,
            instant_apparent_power: agg.instant_apparent_power,
            instant_average_voltage: agg.instant_average_voltage,
            instant_total_current: agg.instant_total_current,
            cumulative_imported: agg.energy_imported,
            cumulative_exported: agg.energy_exported,
        }
    }
}

/// One reading per [`Meter`], indexed by meter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterTable([MeterReading; 4]);

impl MeterTable {
    pub fn iter(&self) -> impl Iterator<Item = (Meter, &MeterReading)> {
        Meter::ALL.into_iter().zip(self.0.iter())
    }
}

impl From<&Aggregates> for MeterTable {
    fn from(agg: &Aggregates) -> Self {
        let mut table = MeterTable::default();
        table[Meter::Site] = (&agg.site).into();
        table[Meter::Load] = (&agg.load).into();
        table[Meter::Solar] = (&agg.solar).into();
        table[Meter::Battery] = (&agg.battery).into();
        table
    }
}

impl Index<Meter> for MeterTable {
    type Output = MeterReading;

    fn index(&self, meter: Meter) -> &MeterReading {
        &self.0[meter.index()]
    }
}

impl IndexMut<Meter> for MeterTable {
    fn index_mut(&mut self, meter: Meter) -> &mut MeterReading {
        &mut self.0[meter.index()]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SoftwareVersion {
    pub major: i64,
    pub minor: i64,
    pub release: i64,
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)").expect("version pattern"))
}

impl SoftwareVersion {
    /// Parses the leading `MAJOR.MINOR.PATCH` of a gateway version string.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || ExporterError::MalformedVersion {
            raw: raw.to_string(),
        };
        let caps = version_regex().captures(raw).ok_or_else(malformed)?;
        let part = |i: usize| caps[i].parse::<i64>().map_err(|_| malformed());
        Ok(Self {
            major: part(1)?,
            minor: part(2)?,
            release: part(3)?,
        })
    }

    /// Each component zero-padded to two digits and concatenated:
    /// `20.49.3` becomes `204903`.
    pub fn flattened(&self) -> Result<i64> {
        format!("{:02}{:02}{:02}", self.major, self.minor, self.release)
            .parse()
            .map_err(|_| ExporterError::MalformedVersion {
                raw: self.to_string(),
            })
    }
}

impl fmt::Display for SoftwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.release)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInterfaceDetails {
    pub enabled: bool,
    pub active: bool,
    pub primary: bool,
    pub signal_strength: i64,
}

/// Flat view of one poll, ready to be written into instruments.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub fixed: Arc<FixedInfo>,
    pub mode: OperatingMode,
    pub backup_reserve_percent: f64,
    pub uptime: Duration,
    pub version: SoftwareVersion,
    pub flattened_version: i64,
    pub network_interfaces: BTreeMap<NetworkInterface, NetworkInterfaceDetails>,
    pub site_master_running: bool,
    pub site_master_connected_to_tesla: bool,
    pub site_master_supplying_power: bool,
    pub meters: MeterTable,
    pub powerwall_charge_percent: f64,
    pub grid_connected: bool,
    pub grid_active: bool,
    pub powerwalls_updating: bool,
    /// Longest reconnection countdown across the units, in whole seconds.
    pub grid_reconnection_seconds: i64,
}

impl Metrics {
    pub fn backup_only(&self) -> bool {
        self.mode == OperatingMode::Backup
    }

    pub fn self_consumption(&self) -> bool {
        self.mode == OperatingMode::SelfConsumption
    }
}

/// Projects a snapshot onto the metrics model.
pub fn project(snapshot: &DeviceSnapshot, fixed: &Arc<FixedInfo>) -> Result<Metrics> {
    let version = SoftwareVersion::parse(&snapshot.status.version)?;
    let flattened_version = version.flattened()?;

    // A later entry for the same transport wins.
    let network_interfaces = snapshot
        .networks
        .iter()
        .map(|nw| {
            (
                nw.interface,
                NetworkInterfaceDetails {
                    enabled: nw.enabled,
                    active: nw.active,
                    primary: nw.primary,
                    signal_strength: nw.signal_strength(),
                },
            )
        })
        .collect();

    let grid_reconnection_seconds = snapshot
        .powerwalls
        .powerwalls
        .iter()
        .map(|pw| pw.grid_reconnection_time_seconds.seconds())
        .max()
        .unwrap_or_default();

    Ok(Metrics {
        fixed: Arc::clone(fixed),
        mode: snapshot.operation.real_mode,
        backup_reserve_percent: snapshot.operation.backup_reserve_percent,
        uptime: snapshot.status.up_time.duration(),
        version,
        flattened_version,
        network_interfaces,
        site_master_running: snapshot.site_master.running,
        site_master_connected_to_tesla: snapshot.site_master.connected_to_tesla,
        site_master_supplying_power: snapshot.site_master.power_supply_mode,
        meters: (&snapshot.aggregates).into(),
        powerwall_charge_percent: snapshot.soe.percentage,
        grid_connected: snapshot.grid_status.status == SystemStatus::GridConnected,
        grid_active: snapshot.grid_status.active,
        powerwalls_updating: snapshot.powerwalls.updating,
        grid_reconnection_seconds,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::gateway_api::{decode, fixtures, Endpoint};

    pub fn snapshot() -> DeviceSnapshot {
        DeviceSnapshot {
            networks: decode(Endpoint::Networks, fixtures::NETWORKS.as_bytes()).unwrap(),
            operation: decode(Endpoint::Operation, fixtures::OPERATION.as_bytes()).unwrap(),
            status: decode(Endpoint::Status, fixtures::STATUS.as_bytes()).unwrap(),
            powerwalls: decode(Endpoint::Powerwalls, fixtures::POWERWALLS.as_bytes()).unwrap(),
            site_master: decode(Endpoint::SiteMaster, fixtures::SITEMASTER.as_bytes()).unwrap(),
            aggregates: decode(Endpoint::Aggregates, fixtures::AGGREGATES.as_bytes()).unwrap(),
            soe: decode(Endpoint::Soe, fixtures::SOE.as_bytes()).unwrap(),
            grid_status: decode(Endpoint::GridStatus, fixtures::GRID_STATUS.as_bytes()).unwrap(),
        }
    }

    pub fn fixed_info() -> Arc<FixedInfo> {
        let site_info: SiteInfo = decode(Endpoint::SiteInfo, fixtures::SITE_INFO.as_bytes()).unwrap();
        let powerwalls: Powerwalls =
            decode(Endpoint::Powerwalls, fixtures::POWERWALLS.as_bytes()).unwrap();
        let config: GatewayConfig = decode(Endpoint::Config, fixtures::CONFIG.as_bytes()).unwrap();
        let solars: Vec<Solar> = decode(Endpoint::Solars, fixtures::SOLARS.as_bytes()).unwrap();
        Arc::new(FixedInfo::from_responses(
            &site_info,
            &powerwalls,
            &config,
            &solars,
        ))
    }
}
