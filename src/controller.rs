use tracing::{debug, info};

use crate::adjust::AdjustmentState;
use crate::control::{self, Command};
use crate::outputs::{OutputId, OutputRegistry, RampSink};
use crate::shm::BufferError;

/// Output lifecycle notifications coming from the display protocol.
pub trait OutputEvents {
    fn on_output_added(&mut self, id: OutputId);
    fn on_output_removed(&mut self, id: OutputId);
    /// Fails only when no gamma table could be allocated.
    fn on_gamma_size(&mut self, id: OutputId, ramp_size: u32) -> Result<(), BufferError>;
    fn on_failed(&mut self, id: OutputId);
}

/// Owns the adjustment state and pushes it to every output through `S`.
pub struct Controller<S> {
    state: AdjustmentState,
    outputs: OutputRegistry,
    sink: S,
}

impl<S: RampSink> Controller<S> {
    pub fn new(state: AdjustmentState, sink: S) -> Self {
        Self {
            state,
            outputs: OutputRegistry::new(),
            sink,
        }
    }

    pub fn state(&self) -> &AdjustmentState {
        &self.state
    }

    pub fn outputs(&self) -> &OutputRegistry {
        &self.outputs
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn apply_command(&mut self, command: Command) -> bool {
        let changed = self.state.apply(command);
        if changed {
            debug!(?command, "adjustment changed");
        }
        changed
    }

    /// Applies every command token in `input` in order. Returns whether the
    /// final state differs from the one before.
    pub fn apply_input(&mut self, input: &[u8]) -> bool {
        let before = self.state;
        for token in control::tokens(input) {
            self.apply_command(control::parse(token));
        }
        self.state != before
    }

    /// Pushes the current state to every ready output that is behind.
    pub fn refresh(&mut self) -> usize {
        let updated = self.outputs.refresh(&self.state, &mut self.sink);
        if updated > 0 {
            info!(
                temperature = self.state.temperature,
                gamma = self.state.gamma,
                contrast = self.state.contrast,
                outputs = updated,
                "applied adjustment"
            );
        }
        updated
    }
}

impl<S: RampSink> OutputEvents for Controller<S> {
    fn on_output_added(&mut self, id: OutputId) {
        self.outputs.add(id);
    }

    fn on_output_removed(&mut self, id: OutputId) {
        self.outputs.remove(id);
    }

    fn on_gamma_size(&mut self, id: OutputId, ramp_size: u32) -> Result<(), BufferError> {
        self.outputs
            .set_ramp_size(id, ramp_size, &self.state, &mut self.sink)
    }

    fn on_failed(&mut self, id: OutputId) {
        self.outputs.fail(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Whitepoint, build_ramp};
    use crate::outputs::Phase;
    use crate::outputs::tests::RecordingSink;

    fn controller_with_outputs(ids: &[OutputId], ramp_size: u32) -> Controller<RecordingSink> {
        let mut controller = Controller::new(AdjustmentState::default(), RecordingSink::default());
        for &id in ids {
            controller.on_output_added(id);
            controller.on_gamma_size(id, ramp_size).unwrap();
        }
        controller.sink_mut().applied.clear();
        controller
    }

    #[test]
    fn absolute_temperature_triggers_one_linear_rebuild() {
        let mut controller = controller_with_outputs(&[1, 2], 256);

        assert!(controller.apply_input(b"6500\n"));
        assert_eq!(controller.refresh(), 2);

        let linear = build_ramp(256, Whitepoint::UNITY, 1.0, 0);
        assert_eq!(controller.sink_mut().ids(), [1, 2]);
        for (_, table) in &controller.sink_mut().applied {
            assert_eq!(table, &linear);
        }

        // nothing left to do on the next tick
        assert_eq!(controller.refresh(), 0);
        assert_eq!(controller.sink_mut().applied.len(), 2);
    }

    #[test]
    fn commands_in_one_drain_are_coalesced() {
        let mut controller = controller_with_outputs(&[4], 64);

        assert!(controller.apply_input(b"3000\n+\n+\ng1.5\0c+\0"));
        assert_eq!(controller.refresh(), 1);
        assert_eq!(controller.sink_mut().applied.len(), 1);

        let state = controller.state();
        assert_eq!(state.temperature, 3370);
        assert_eq!(state.gamma, 1.5);
        assert_eq!(state.contrast, 5);
    }

    #[test]
    fn net_zero_input_reports_unchanged() {
        let mut controller = controller_with_outputs(&[4], 64);
        assert!(!controller.apply_input(b"3000\n5600\n"));
        assert!(!controller.apply_input(b""));
        assert!(!controller.apply_input(b"bogus\n"));
        assert_eq!(controller.refresh(), 0);
    }

    #[test]
    fn new_output_adopts_current_state() {
        let mut controller = controller_with_outputs(&[], 0);
        controller.apply_input(b"g2\n");

        controller.on_output_added(9);
        controller.on_gamma_size(9, 32).unwrap();

        let expected = build_ramp(32, crate::color::whitepoint(5600), 2.0, 0);
        assert_eq!(controller.sink_mut().applied, [(9, expected)]);
        assert_eq!(controller.refresh(), 0);
    }

    #[test]
    fn failed_output_receives_nothing() {
        let mut controller = controller_with_outputs(&[7, 8], 256);
        controller.on_failed(7);
        assert_eq!(controller.outputs().phase(7), Some(Phase::Failed));

        controller.apply_input(b"t4000");
        controller.refresh();
        assert_eq!(controller.sink_mut().ids(), [8]);

        controller.on_output_removed(7);
        assert_eq!(controller.outputs().phase(7), None);
    }
}
