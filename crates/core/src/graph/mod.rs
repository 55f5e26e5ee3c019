use std::fmt;

use serde::Serialize;

use crate::filter::{Band, FilterBank, FilterCascade};
use crate::gain::{GainProcessor, GainStage};

/// A node of the live topology, in signal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GraphNode {
    Capture,
    Filter(Band),
    Gain,
    Output,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Capture => f.write_str("capture"),
            GraphNode::Filter(band) => write!(f, "peaking {band}"),
            GraphNode::Gain => f.write_str("gain"),
            GraphNode::Output => f.write_str("output"),
        }
    }
}

/// Processing half of a running pipeline: the filter cascade followed by the
/// gain stage. The host audio subsystem owns it and calls [`process`] from
/// its real-time callback; the controller only keeps the parameter handles.
///
/// [`process`]: SignalGraph::process
#[derive(Debug, Clone)]
pub struct SignalGraph {
    sample_rate: u32,
    filters: FilterCascade,
    gain: GainProcessor,
}

impl SignalGraph {
    pub fn new(sample_rate: u32, bank: &FilterBank, gain: &GainStage) -> Self {
        Self {
            sample_rate,
            filters: bank.cascade(sample_rate),
            gain: gain.processor(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Runs one block of mono samples through filters then gain, in place.
    /// Parameter writes made since the previous block take effect here.
    pub fn process(&mut self, block: &mut [f32]) {
        if block.is_empty() {
            return;
        }
        self.filters.process(block);
        self.gain.process(block);
    }

    pub fn topology(&self) -> Vec<GraphNode> {
        std::iter::once(GraphNode::Capture)
            .chain(self.filters.bands().map(GraphNode::Filter))
            .chain([GraphNode::Gain, GraphNode::Output])
            .collect()
    }
}
