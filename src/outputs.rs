use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::adjust::AdjustmentState;
use crate::color::{Whitepoint, fill_gamma_table, whitepoint};
use crate::shm::{BufferError, RampBuffer};

/// Identifier handed out by the display protocol (the registry global name).
pub type OutputId = u32;

/// Where finished gamma tables go.
pub trait RampSink {
    /// Hands a rewound, fully written table to the display for `id`.
    fn apply_ramp(&mut self, id: OutputId, buffer: &RampBuffer);
}

pub enum OutputState {
    /// Announced, gamma size not known yet.
    Unbound,
    /// Table allocated and applied at least once.
    Ready {
        buffer: RampBuffer,
        applied: AdjustmentState,
    },
    /// Gamma control was refused; kept around but never touched again.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unbound,
    Ready,
    Failed,
}

impl OutputState {
    pub fn phase(&self) -> Phase {
        match self {
            OutputState::Unbound => Phase::Unbound,
            OutputState::Ready { .. } => Phase::Ready,
            OutputState::Failed => Phase::Failed,
        }
    }
}

#[derive(Default)]
pub struct OutputRegistry {
    outputs: BTreeMap<OutputId, OutputState>,
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[cfg(test)]
    pub fn get(&self, id: OutputId) -> Option<&OutputState> {
        self.outputs.get(&id)
    }

    #[cfg(test)]
    pub fn phase(&self, id: OutputId) -> Option<Phase> {
        self.get(id).map(OutputState::phase)
    }

    pub fn add(&mut self, id: OutputId) {
        info!(output = id, "adding output");
        self.outputs.insert(id, OutputState::Unbound);
    }

    /// Forgets the output, releasing its table. Returns whether it was known.
    pub fn remove(&mut self, id: OutputId) -> bool {
        let removed = self.outputs.remove(&id).is_some();
        if removed {
            info!(output = id, "removing output");
        }
        removed
    }

    /// Marks the output failed and releases its table.
    pub fn fail(&mut self, id: OutputId) {
        match self.outputs.get_mut(&id) {
            Some(output) => {
                warn!(output = id, "gamma control failed");
                *output = OutputState::Failed;
            }
            None => debug!(output = id, "gamma control failed for unknown output"),
        }
    }

    /// Allocates a table of `ramp_size` samples per channel, fills it from
    /// `state` and applies it.
    ///
    /// Only an allocation failure is returned; everything else is handled
    /// per output.
    pub fn set_ramp_size<S: RampSink>(
        &mut self,
        id: OutputId,
        ramp_size: u32,
        state: &AdjustmentState,
        sink: &mut S,
    ) -> Result<(), BufferError> {
        let Some(output) = self.outputs.get_mut(&id) else {
            debug!(output = id, "gamma size for unknown output");
            return Ok(());
        };
        if output.phase() == Phase::Failed {
            debug!(output = id, "ignoring gamma size for failed output");
            return Ok(());
        }

        // drop the previous table before mapping a new one
        *output = OutputState::Unbound;

        if ramp_size == 0 {
            warn!(output = id, "compositor reported an empty gamma ramp");
            *output = OutputState::Failed;
            return Ok(());
        }

        debug!(output = id, ramp_size, "allocating gamma table");
        let buffer = RampBuffer::allocate(ramp_size as usize)?;
        let wp = whitepoint(state.temperature);
        *output = render(id, buffer, wp, state, sink);
        Ok(())
    }

    /// Rebuilds and applies every ready output whose table does not match
    /// `state`. Returns the number of outputs updated.
    pub fn refresh<S: RampSink>(&mut self, state: &AdjustmentState, sink: &mut S) -> usize {
        let wp = whitepoint(state.temperature);
        let mut updated = 0;
        for (&id, output) in self.outputs.iter_mut() {
            let stale = matches!(&*output, OutputState::Ready { applied, .. } if applied != state);
            if !stale {
                continue;
            }
            let OutputState::Ready { buffer, .. } = std::mem::replace(output, OutputState::Unbound)
            else {
                continue;
            };
            *output = render(id, buffer, wp, state, sink);
            updated += 1;
        }
        updated
    }
}

fn render<S: RampSink>(
    id: OutputId,
    mut buffer: RampBuffer,
    wp: Whitepoint,
    state: &AdjustmentState,
    sink: &mut S,
) -> OutputState {
    let ramp_size = buffer.ramp_size();
    fill_gamma_table(
        buffer.samples_mut(),
        ramp_size,
        wp,
        state.gamma,
        state.contrast,
    );
    if let Err(err) = buffer.rewind() {
        warn!(output = id, "{err}");
        return OutputState::Failed;
    }
    debug!(output = id, ramp_size, "applying gamma table");
    sink.apply_ramp(id, &buffer);
    OutputState::Ready {
        buffer,
        applied: *state,
    }
}
