use crate::param::SharedParam;

/// Hard ceiling for the output multiplier. 100 % volume maps onto it.
pub const MAX_MULTIPLIER: f32 = 2.0;

/// Volume applied on every start before the caller's settings arrive.
pub const SAFE_START_VOLUME: f32 = 30.0;

/// Maps a volume percentage onto the gain multiplier.
///
/// The curve is linear, `percent / 100 * 2`, and clamped into
/// `[0, MAX_MULTIPLIER]` so no input can exceed the safety ceiling. NaN maps
/// to silence.
pub fn volume_to_multiplier(percent: f32) -> f32 {
    if percent.is_nan() {
        return 0.0;
    }
    (percent / 100.0 * MAX_MULTIPLIER).clamp(0.0, MAX_MULTIPLIER)
}

/// Control handle for the output gain applied after the filter bank.
///
/// The stage itself does not clamp; callers are expected to hand it values
/// produced by [`volume_to_multiplier`].
#[derive(Debug, Clone)]
pub struct GainStage {
    multiplier: SharedParam,
}

impl GainStage {
    pub fn new(multiplier: f32) -> Self {
        Self {
            multiplier: SharedParam::new(multiplier),
        }
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier.get()
    }

    pub fn set_multiplier(&self, multiplier: f32) {
        self.multiplier.set(multiplier);
    }

    /// Audio-thread half of the stage.
    pub fn processor(&self) -> GainProcessor {
        GainProcessor {
            multiplier: self.multiplier.clone(),
        }
    }
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new(volume_to_multiplier(SAFE_START_VOLUME))
    }
}

#[derive(Debug, Clone)]
pub struct GainProcessor {
    multiplier: SharedParam,
}

impl GainProcessor {
    /// Scales `block` by the multiplier loaded once for the whole block.
    pub fn process(&mut self, block: &mut [f32]) {
        let multiplier = self.multiplier.get();
        for sample in block.iter_mut() {
            *sample *= multiplier;
        }
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier.get()
    }
}
