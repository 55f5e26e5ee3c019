//! Fixed six-band peaking equaliser.
//!
//! The control side ([`FilterBank`]) holds one [`BandFilter`] handle per band
//! and is owned by the pipeline controller. The processing side
//! ([`FilterCascade`]) is built from the same handles and lives inside the
//! signal graph on the audio thread.

mod biquad;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::param::SharedParam;

pub use biquad::{Biquad, Coefficients};

/// Bandwidth shared by every band.
pub const BAND_Q: f32 = 1.0;
pub const MIN_BAND_GAIN_DB: f32 = -12.0;
pub const MAX_BAND_GAIN_DB: f32 = 12.0;
/// Granularity of user-facing band gain controls.
pub const BAND_GAIN_STEP_DB: f32 = 0.5;

/// One of the six supported centre frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Band {
    Hz250,
    Hz500,
    Hz1k,
    Hz2k,
    Hz4k,
    Hz8k,
}

impl Band {
    /// Every band in ascending frequency, which is also the wiring order.
    pub const ALL: [Band; 6] = [
        Band::Hz250,
        Band::Hz500,
        Band::Hz1k,
        Band::Hz2k,
        Band::Hz4k,
        Band::Hz8k,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub const fn hz(self) -> u32 {
        match self {
            Band::Hz250 => 250,
            Band::Hz500 => 500,
            Band::Hz1k => 1_000,
            Band::Hz2k => 2_000,
            Band::Hz4k => 4_000,
            Band::Hz8k => 8_000,
        }
    }

    /// Position of the band inside the cascade.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.hz() == hz)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hz() {
            hz if hz >= 1_000 => write!(f, "{}kHz", hz / 1_000),
            hz => write!(f, "{hz}Hz"),
        }
    }
}

/// Clamps a requested band gain into the legal range.
///
/// Returns `None` for NaN or infinite input so callers can drop the update.
pub fn clamp_band_gain(gain_db: f32) -> Option<f32> {
    gain_db
        .is_finite()
        .then(|| gain_db.clamp(MIN_BAND_GAIN_DB, MAX_BAND_GAIN_DB))
}

/// Clamps like [`clamp_band_gain`], then rounds to the nearest
/// [`BAND_GAIN_STEP_DB`].
pub fn snap_band_gain(gain_db: f32) -> Option<f32> {
    clamp_band_gain(gain_db).map(|gain| (gain / BAND_GAIN_STEP_DB).round() * BAND_GAIN_STEP_DB)
}

/// Control handle for a single peaking filter.
#[derive(Debug, Clone)]
pub struct BandFilter {
    band: Band,
    gain_db: SharedParam,
}

impl BandFilter {
    fn new(band: Band) -> Self {
        Self {
            band,
            gain_db: SharedParam::new(0.0),
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }

    pub fn frequency(&self) -> f32 {
        self.band.hz() as f32
    }

    pub fn q(&self) -> f32 {
        BAND_Q
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db.get()
    }

    /// Writes the gain as-is; range checks happen at the controller boundary.
    pub fn set_gain_db(&self, gain_db: f32) {
        self.gain_db.set(gain_db);
    }
}

/// The ordered set of band filters owned by a running pipeline.
#[derive(Debug)]
pub struct FilterBank {
    filters: [BandFilter; Band::COUNT],
}

impl FilterBank {
    /// Creates one flat (0 dB) filter per band, in ascending frequency.
    pub fn new() -> Self {
        Self {
            filters: Band::ALL.map(BandFilter::new),
        }
    }

    pub fn filter(&self, band: Band) -> &BandFilter {
        &self.filters[band.index()]
    }

    pub fn gain_db(&self, band: Band) -> f32 {
        self.filter(band).gain_db()
    }

    pub fn set_gain_db(&self, band: Band, gain_db: f32) {
        self.filter(band).set_gain_db(gain_db);
    }

    pub fn iter(&self) -> impl Iterator<Item = &BandFilter> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Builds the audio-thread half of the bank at `sample_rate`.
    pub fn cascade(&self, sample_rate: u32) -> FilterCascade {
        FilterCascade::new(self, sample_rate)
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new()
    }
}

/// One stage of the processing cascade. Coefficients are recomputed only
/// when the shared gain differs from the one last applied.
#[derive(Debug, Clone)]
struct Stage {
    band: Band,
    gain_db: SharedParam,
    applied_gain_db: f32,
    filter: Biquad,
}

impl Stage {
    fn refresh(&mut self, sample_rate: f32) {
        let requested = self.gain_db.get();
        if requested.to_bits() == self.applied_gain_db.to_bits() {
            return;
        }
        self.applied_gain_db = requested;
        self.filter.set_coefficients(Coefficients::peaking(
            sample_rate,
            self.band.hz() as f32,
            BAND_Q,
            requested,
        ));
    }
}

/// Serial chain of peaking filters processed on the audio thread.
#[derive(Debug, Clone)]
pub struct FilterCascade {
    sample_rate: f32,
    stages: Vec<Stage>,
}

impl FilterCascade {
    fn new(bank: &FilterBank, sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let stages = bank
            .iter()
            .map(|filter| {
                let gain = filter.gain_db();
                Stage {
                    band: filter.band(),
                    gain_db: filter.gain_db.clone(),
                    applied_gain_db: gain,
                    filter: Biquad::new(Coefficients::peaking(
                        sample_rate,
                        filter.frequency(),
                        BAND_Q,
                        gain,
                    )),
                }
            })
            .collect();

        Self {
            sample_rate,
            stages,
        }
    }

    /// Bands in the order samples traverse them.
    pub fn bands(&self) -> impl Iterator<Item = Band> + '_ {
        self.stages.iter().map(|stage| stage.band)
    }

    /// Gains currently baked into the stage coefficients.
    pub fn applied_gains(&self) -> impl Iterator<Item = (Band, f32)> + '_ {
        self.stages
            .iter()
            .map(|stage| (stage.band, stage.applied_gain_db))
    }

    /// Picks up pending parameter writes, then filters `block` in place
    /// through every stage in order.
    pub fn process(&mut self, block: &mut [f32]) {
        let sample_rate = self.sample_rate;
        for stage in &mut self.stages {
            stage.refresh(sample_rate);
            stage.filter.process(block);
        }
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.filter.reset();
        }
    }
}
