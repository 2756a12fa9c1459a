//! Closed sets of string tokens reported by the gateway.
//!
//! Tokens are matched case-sensitively against a fixed table. A token outside
//! the table is a hard decode failure; there is no catch-all variant.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {type_name} {raw_value:?}")]
pub struct UnknownEnumValue {
    pub type_name: &'static str,
    pub raw_value: String,
}

macro_rules! device_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => $token:literal, $display:literal;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn from_token(raw: &str) -> Result<Self, UnknownEnumValue> {
                match raw {
                    $($token => Ok($name::$variant),)+
                    _ => Err(UnknownEnumValue {
                        type_name: stringify!($name),
                        raw_value: raw.to_string(),
                    }),
                }
            }

            /// The string the gateway uses for this value.
            pub fn token(&self) -> &'static str {
                match self {
                    $($name::$variant => $token,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $($name::$variant => $display,)+
                })
            }
        }

        impl FromStr for $name {
            type Err = UnknownEnumValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_token(s)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::from_token(&raw).map_err(de::Error::custom)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.token())
            }
        }
    };
}

device_enum! {
    /// Transport behind one of the gateway's network interfaces.
    NetworkInterface {
        Ethernet => "EthType", "ethernet";
        Cellular => "GsmType", "cellular";
        Wifi => "WifiType", "wifi";
    }
}

device_enum! {
    OperatingMode {
        Backup => "backup", "Backup";
        SelfConsumption => "self_consumption", "Self Consumption";
        Autonomous => "autonomous", "Autonomous";
        Scheduler => "scheduler", "Scheduler";
        SiteControl => "site_control", "SiteControl";
    }
}

device_enum! {
    SystemStatus {
        GridConnected => "SystemGridConnected", "GridConnected";
        IslandedReady => "SystemIslandedReady", "IslandedReady";
        IslandedActive => "SystemIslandedActive", "IslandedActive";
        TransitionToGrid => "SystemTransitionToGrid", "TransitionToGrid";
    }
}

device_enum! {
    /// Per-unit grid compliance as reported under `/powerwalls`.
    GridState {
        Compliant => "Grid_Compliant", "Compliant";
        Qualifying => "Grid_Qualifying", "Qualifying";
        Uncompliant => "Grid_Uncompliant", "Uncompliant";
    }
}
