//! Typed records for the Tesla Energy Gateway's private `/api` endpoints.
//!
//! Unknown fields are ignored and missing or `null` plain fields take their
//! zero value, but every enumerated field must be present and carry a known
//! token.

use crate::codecs::{FloatSeconds, TimeZone, Timestamp, Uptime};
use crate::enums::{GridState, NetworkInterface, OperatingMode, SystemStatus};
use crate::error::{ExporterError, Result};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Networks,
    SiteInfo,
    Operation,
    Config,
    Powerwalls,
    Status,
    SiteMaster,
    Aggregates,
    Soe,
    GridStatus,
    Solars,
    Installer,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Login => "/login/Basic",
            Endpoint::Networks => "/networks",
            Endpoint::SiteInfo => "/site_info",
            Endpoint::Operation => "/operation",
            Endpoint::Config => "/config",
            Endpoint::Powerwalls => "/powerwalls",
            Endpoint::Status => "/status",
            Endpoint::SiteMaster => "/sitemaster",
            Endpoint::Aggregates => "/meters/aggregates",
            Endpoint::Soe => "/system_status/soe",
            Endpoint::GridStatus => "/system_status/grid_status",
            Endpoint::Solars => "/solars",
            Endpoint::Installer => "/installer",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Decodes the body returned by `endpoint` into its record type.
pub fn decode<T: DeserializeOwned>(endpoint: Endpoint, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ExporterError::Decode {
        endpoint,
        message: e.to_string(),
        body: String::from_utf8_lossy(body).into_owned(),
    })
}

/// Reads a JSON `null` as the field's zero value instead of failing.
mod null_as_default {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub force_sm_off: bool,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub firstname: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub lastname: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub roles: Vec<String>,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub token: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub provider: String,
    #[serde(rename = "loginTime", deserialize_with = "null_as_default::deserialize")]
    pub login_time: Timestamp,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ip {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub ip: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub netmask: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub network_name: String,
    #[serde(default)]
    pub networks: Option<Vec<Ip>>,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub gateway: String,
    pub interface: NetworkInterface,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub state_reason: String,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub signal_strength: i64,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub hw_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub network_name: String,
    pub interface: NetworkInterface,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub dhcp: bool,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub enabled: bool,
    #[serde(default)]
    pub extra_ips: Option<Vec<Ip>>,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub active: bool,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub primary: bool,
    #[serde(rename = "iface_network_info")]
    pub info: Option<NetworkInfo>,
}

impl Network {
    pub fn signal_strength(&self) -> i64 {
        self.info.as_ref().map_or(0, |info| info.signal_strength)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridCode {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub grid_code: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub grid_voltage_setting: i64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub grid_freq_setting: i64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub grid_phase_setting: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub country: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub distributor: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub utility: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub retailer: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub region: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteInfo {
    #[serde(rename = "max_system_energy_kWh", deserialize_with = "null_as_default::deserialize")]
    pub max_system_energy_kwh: f64,
    #[serde(rename = "max_system_power_kW", deserialize_with = "null_as_default::deserialize")]
    pub max_system_power_kw: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub site_name: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub timezone: TimeZone,
    #[serde(rename = "max_site_meter_power_kW", deserialize_with = "null_as_default::deserialize")]
    pub max_site_meter_power_kw: f64,
    #[serde(rename = "min_site_meter_power_kW", deserialize_with = "null_as_default::deserialize")]
    pub min_site_meter_power_kw: f64,
    #[serde(
        rename = "nominal_system_energy_kWh",
        deserialize_with = "null_as_default::deserialize"
    )]
    pub nominal_system_energy_kwh: f64,
    #[serde(rename = "nominal_system_power_kW", deserialize_with = "null_as_default::deserialize")]
    pub nominal_system_power_kw: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub grid_code: GridCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub real_mode: OperatingMode,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub backup_reserve_percent: f64,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub freq_shift_load_shed_soe: f64,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub freq_shift_load_shed_delta_f: f64,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub vin: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticCheck {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub start_time: Timestamp,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub end_time: Timestamp,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub message: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostic {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub category: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub disruptive: bool,
    pub checks: Option<Vec<DiagnosticCheck>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Powerwall {
    #[serde(
        default,
        rename = "PackagePartNumber",
        deserialize_with = "null_as_default::deserialize"
    )]
    pub package_part_number: String,
    #[serde(
        default,
        rename = "PackageSerialNumber",
        deserialize_with = "null_as_default::deserialize"
    )]
    pub package_serial_number: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default::deserialize")]
    pub kind: String,
    pub grid_state: GridState,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub grid_reconnection_time_seconds: FloatSeconds,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub under_phase_detection: bool,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub updating: bool,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub commissioning_diagnostic: Diagnostic,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub update_diagnostic: Diagnostic,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Powerwalls {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub enumerating: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub updating: bool,
    #[serde(rename = "checking_if_offgrid", deserialize_with = "null_as_default::deserialize")]
    pub checking_if_off_grid: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub running_phase_detection: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub phase_detection_last_error: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub bubble_shedding: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub on_grid_check_error: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub grid_qualifying: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub grid_code_validating: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub phase_detection_not_available: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub powerwalls: Vec<Powerwall>,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub start_time: Timestamp,
    #[serde(rename = "up_time_seconds", deserialize_with = "null_as_default::deserialize")]
    pub up_time: Uptime,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub is_new: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub git_hash: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub commission_count: i64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub device_type: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub sync_type: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMaster {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub running: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub connected_to_tesla: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub power_supply_mode: bool,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterAggregate {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub last_communication_time: Timestamp,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub instant_power: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub instant_reactive_power: f64,
    // sic: the gateway spells it "apparant"
    #[serde(rename = "instant_apparant_power", deserialize_with = "null_as_default::deserialize")]
    pub instant_apparent_power: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub frequency: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub energy_exported: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub energy_imported: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub instant_average_voltage: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub instant_total_current: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub i_a_current: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub i_b_current: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub i_c_current: f64,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub last_phase_voltage_communication_time: Timestamp,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub last_phase_power_communication_time: Timestamp,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub timeout: i64,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aggregates {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub site: MeterAggregate,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub battery: MeterAggregate,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub load: MeterAggregate,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub solar: MeterAggregate,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Soe {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStatus {
    #[serde(rename = "grid_status")]
    pub status: SystemStatus,
    #[serde(
        default,
        rename = "grid_services_active",
        deserialize_with = "null_as_default::deserialize"
    )]
    pub active: bool,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Solar {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub brand: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub model: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub power_rating_watts: i64,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Installer {
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub company: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub customer_id: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub location: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub mounting: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub wiring: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub backup_configuration: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub solar_installation: String,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub has_stack_kit: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub has_powerline_to_ethernet: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub run_sitemaster: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub verified_config: bool,
    #[serde(deserialize_with = "null_as_default::deserialize")]
    pub installation_types: Vec<String>,
}
