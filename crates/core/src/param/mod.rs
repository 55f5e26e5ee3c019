use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A single `f32` parameter shared between the control path and the audio
/// callback.
///
/// The value is stored as raw bits in an [`AtomicU32`], so writes from the UI
/// thread never block the processing path. The processing side loads each
/// parameter once per callback block, which makes a write audible as a step
/// change at the start of the next block.
#[derive(Clone)]
pub struct SharedParam {
    bits: Arc<AtomicU32>,
}

impl SharedParam {
    pub fn new(value: f32) -> Self {
        Self {
            bits: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    /// Schedules `value` for the next processing block.
    pub fn set(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Number of live handles (control and processing side) to this value.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.bits)
    }
}

impl fmt::Debug for SharedParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedParam").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_writes() {
        let control = SharedParam::new(0.6);
        let processing = control.clone();

        control.set(1.25);
        assert_eq!(processing.get(), 1.25);
        assert_eq!(control.handle_count(), 2);
    }

    #[test]
    fn writes_are_visible_across_threads() {
        let param = SharedParam::new(0.0);
        let reader = param.clone();

        std::thread::spawn(move || param.set(-6.5))
            .join()
            .unwrap();

        assert_eq!(reader.get(), -6.5);
        assert_eq!(reader.handle_count(), 1);
    }
}
