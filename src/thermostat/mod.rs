//! Zone temperature control
//!
//! An in-memory map of zone to temperature, exposed to the assistant as
//! callable functions and to other clients over HTTP.

pub mod api;
mod functions;

pub use functions::register_functions;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Error;

/// A controllable zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    LivingRoom,
    Bedroom,
    Kitchen,
    Bathroom,
    Office,
}

impl Zone {
    /// Every zone, in declaration order
    pub const ALL: [Self; 5] = [
        Self::LivingRoom,
        Self::Bedroom,
        Self::Kitchen,
        Self::Bathroom,
        Self::Office,
    ];

    /// Identifier used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LivingRoom => "living_room",
            Self::Bedroom => "bedroom",
            Self::Kitchen => "kitchen",
            Self::Bathroom => "bathroom",
            Self::Office => "office",
        }
    }

    /// Name as spoken
    #[must_use]
    pub const fn spoken(self) -> &'static str {
        match self {
            Self::LivingRoom => "living room",
            other => other.as_str(),
        }
    }

    /// Temperature the zone starts at, in °C
    #[must_use]
    pub const fn initial_temperature(self) -> i32 {
        match self {
            Self::LivingRoom => 22,
            Self::Bedroom => 20,
            Self::Kitchen => 24,
            Self::Bathroom => 23,
            Self::Office => 21,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|z| z.as_str() == normalized)
            .ok_or_else(|| Error::Config(format!("unknown zone: {s}")))
    }
}

/// Shared zone temperature store
#[derive(Debug)]
pub struct Thermostat {
    temperatures: RwLock<BTreeMap<Zone, i32>>,
}

impl Default for Thermostat {
    fn default() -> Self {
        Self::new()
    }
}

impl Thermostat {
    /// Store with every zone at its initial temperature
    #[must_use]
    pub fn new() -> Self {
        Self {
            temperatures: RwLock::new(
                Zone::ALL
                    .into_iter()
                    .map(|z| (z, z.initial_temperature()))
                    .collect(),
            ),
        }
    }

    /// Current temperature of a zone
    pub async fn get(&self, zone: Zone) -> Option<i32> {
        tracing::info!(%zone, "fetching temperature");
        self.temperatures.read().await.get(&zone).copied()
    }

    /// Set a zone's temperature, returning the previous value
    pub async fn set(&self, zone: Zone, temperature: i32) -> Option<i32> {
        tracing::info!(%zone, temperature, "setting temperature");
        self.temperatures.write().await.insert(zone, temperature)
    }

    /// Copy of every zone's temperature
    pub async fn all(&self) -> BTreeMap<Zone, i32> {
        self.temperatures.read().await.clone()
    }
}

/// Format a temperature the way it is reported, e.g. `22C`
#[must_use]
pub fn format_temperature(temperature: i32) -> String {
    format!("{temperature}C")
}
