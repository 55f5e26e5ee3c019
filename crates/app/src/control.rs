//! Line-oriented control surface for the pipeline.

use std::io::Write;

use hearing_assist_core::filter::snap_band_gain;
use hearing_assist_core::settings::MAX_VOLUME;
use hearing_assist_core::{
    AudioHost, AudioSettings, Band, HearingError, PipelineController, Result,
};

use crate::settings_store::SettingsStore;

pub const HELP: &str = "\
commands:
  start              acquire the microphone and start processing
  stop               stop processing and release the microphone
  volume <percent>   set output volume (0-100)
  band <hz> <db>     set a band gain (250, 500, 1000, 2000, 4000, 8000; -12..12 dB)
  status             show pipeline state and current settings
  save               confirm current settings are written to disk
  help               show this message
  quit               stop and exit";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Volume(f32),
    Band { hz: u32, gain_db: f32 },
    Status,
    Save,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            "volume" | "vol" => Command::Volume(parse_number(words.next(), "volume")?),
            "band" | "eq" => {
                let hz = parse_number(words.next(), "band frequency")?;
                let gain_db = parse_number(words.next(), "band gain")?;
                Command::Band { hz, gain_db }
            }
            "status" => Command::Status,
            "save" => Command::Save,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(HearingError::msg(format!("unknown command `{other}`"))),
        };

        if let Some(extra) = words.next() {
            return Err(HearingError::msg(format!("unexpected argument `{extra}`")));
        }
        Ok(Some(command))
    }
}

fn parse_number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> Result<T> {
    let word = word.ok_or_else(|| HearingError::msg(format!("missing {what}")))?;
    word.parse()
        .map_err(|_| HearingError::msg(format!("invalid {what} `{word}`")))
}

/// Whether the read loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Ties the controller to the user's settings and their store.
pub struct Session<H: AudioHost> {
    controller: PipelineController<H>,
    settings: AudioSettings,
    store: SettingsStore,
}

impl<H: AudioHost> Session<H> {
    pub fn new(
        controller: PipelineController<H>,
        settings: AudioSettings,
        store: SettingsStore,
    ) -> Self {
        Self {
            controller,
            settings,
            store,
        }
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    pub fn controller(&self) -> &PipelineController<H> {
        &self.controller
    }

    /// Starts the pipeline and applies the current settings to it. A
    /// microphone failure is reported and leaves the session idle.
    pub fn start(&mut self, out: &mut impl Write) -> Result<()> {
        match self.controller.start() {
            Ok(()) => {
                self.controller.apply_settings(&self.settings);
                writeln!(
                    out,
                    "listening on {} at {} Hz",
                    self.controller.capture_device().unwrap_or("unknown device"),
                    self.controller.sample_rate().unwrap_or_default()
                )?;
            }
            Err(err) => {
                tracing::error!(%err, "failed to start pipeline");
                writeln!(
                    out,
                    "Could not access the microphone ({err}). Check that permission is granted, then type `start` to retry."
                )?;
            }
        }
        Ok(())
    }

    pub fn execute(&mut self, command: Command, out: &mut impl Write) -> Result<Flow> {
        match command {
            Command::Start => {
                if self.controller.is_running() {
                    writeln!(out, "already running")?;
                } else {
                    self.start(out)?;
                }
            }
            Command::Stop => {
                self.controller.stop();
                writeln!(out, "stopped")?;
            }
            Command::Volume(percent) => self.set_volume(percent, out)?,
            Command::Band { hz, gain_db } => self.set_band(hz, gain_db, out)?,
            Command::Status => {
                writeln!(out, "pipeline {}", self.controller.state())?;
                if let Some(device) = self.controller.capture_device() {
                    writeln!(out, "capture {device}")?;
                }
                writeln!(out, "{}", self.settings)?;
            }
            Command::Save => {
                self.store.save(&self.settings)?;
                writeln!(out, "saved to {}", self.store.path().display())?;
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => {
                self.controller.stop();
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    fn set_volume(&mut self, percent: f32, out: &mut impl Write) -> Result<()> {
        if !percent.is_finite() {
            writeln!(out, "volume must be a number between 0 and {MAX_VOLUME}")?;
            return Ok(());
        }
        self.settings.volume = percent.round().clamp(0.0, MAX_VOLUME as f32) as u32;
        self.controller.set_volume(self.settings.volume as f32);
        self.persist();
        writeln!(out, "volume {}%", self.settings.volume)?;

        if self.settings.is_high_volume() {
            tracing::warn!(volume = self.settings.volume, "high volume selected");
            writeln!(
                out,
                "warning: volume above 90% can damage your hearing. Lower it if sound is uncomfortable."
            )?;
        }
        Ok(())
    }

    fn set_band(&mut self, hz: u32, gain_db: f32, out: &mut impl Write) -> Result<()> {
        let (Some(band), Some(gain_db)) = (Band::from_hz(hz), snap_band_gain(gain_db)) else {
            writeln!(out, "no band at {hz} Hz or gain is not a number")?;
            return Ok(());
        };
        self.settings.band_gains.set(band, gain_db);
        self.controller.set_band_gain(hz, gain_db);
        self.persist();
        writeln!(out, "{band} {gain_db:+.1} dB")?;
        Ok(())
    }

    /// Writes the settings after every change. A failed write is logged and
    /// never interrupts the live pipeline.
    fn persist(&self) {
        if let Err(err) = self.store.save(&self.settings) {
            tracing::warn!(%err, path = %self.store.path().display(), "failed to save settings");
        }
    }
}
