//! User-facing audio settings.
//!
//! The core only consumes these values; storing them is the surrounding
//! application's job. The JSON helpers exist so every front end agrees on one
//! on-disk shape.

use std::collections::HashMap;
use std::fmt;

use serde::de::{Deserializer, Error as _};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::filter::{snap_band_gain, Band};
use crate::gain::SAFE_START_VOLUME;
use crate::Result;

/// Volumes above this percentage warrant a hearing-safety warning.
pub const HIGH_VOLUME_THRESHOLD: u32 = 90;
pub const MAX_VOLUME: u32 = 100;

/// Gain in dB for each band, indexed in cascade order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandGains([f32; Band::COUNT]);

impl BandGains {
    /// Every band at 0 dB.
    pub const fn flat() -> Self {
        Self([0.0; Band::COUNT])
    }

    pub fn get(&self, band: Band) -> f32 {
        self.0[band.index()]
    }

    pub fn set(&mut self, band: Band, gain_db: f32) {
        self.0[band.index()] = gain_db;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, f32)> + '_ {
        Band::ALL.into_iter().map(|band| (band, self.get(band)))
    }
}

impl Default for BandGains {
    /// Mild presence boost on alternating bands.
    fn default() -> Self {
        Self([0.0, 6.0, 0.0, 6.0, 0.0, 6.0])
    }
}

impl Serialize for BandGains {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Band::COUNT))?;
        for (band, gain) in self.iter() {
            map.serialize_entry(&band.hz().to_string(), &gain)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BandGains {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = HashMap::<String, f32>::deserialize(deserializer)?;
        let mut gains = BandGains::flat();
        for (key, gain) in raw {
            let hz: u32 = key
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("band key `{key}` is not a frequency")))?;
            if let Some(band) = Band::from_hz(hz) {
                gains.set(band, gain);
            }
        }
        Ok(gains)
    }
}

/// Volume and equaliser settings as the user last chose them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Output volume in percent.
    pub volume: u32,
    #[serde(rename = "eqSettings", alias = "bandGains")]
    pub band_gains: BandGains,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            volume: SAFE_START_VOLUME as u32,
            band_gains: BandGains::default(),
        }
    }
}

impl AudioSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Copy with the volume capped at 100 % and every band gain clamped into
    /// range and snapped to the 0.5 dB step. Non-finite gains reset to 0 dB.
    pub fn sanitized(&self) -> Self {
        let mut band_gains = self.band_gains;
        for band in Band::ALL {
            band_gains.set(band, snap_band_gain(band_gains.get(band)).unwrap_or(0.0));
        }
        Self {
            volume: self.volume.min(MAX_VOLUME),
            band_gains,
        }
    }

    pub fn is_high_volume(&self) -> bool {
        self.volume > HIGH_VOLUME_THRESHOLD
    }
}

impl fmt::Display for AudioSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "volume {}%", self.volume)?;
        for (band, gain) in self.band_gains.iter() {
            write!(f, ", {band} {gain:+.1} dB")?;
        }
        Ok(())
    }
}
