use crate::control::{Command, Step};

pub const DEFAULT_TEMP: i32 = 5600;
pub const MINIMUM_TEMP: i32 = 1200;
pub const MAXIMUM_TEMP: i32 = 20000;

pub const DEFAULT_GAMMA: f64 = 1.0;
pub const MINIMUM_GAMMA: f64 = 0.33;
pub const MAXIMUM_GAMMA: f64 = 4.0;

pub const DEFAULT_CONTRAST: i32 = 0;
pub const MINIMUM_CONTRAST: i32 = -80;
pub const MAXIMUM_CONTRAST: i32 = 80;

/// Temperature and gamma are multiplied (or divided) by this on each step.
pub const STEP_MULTIPLIER: f64 = 1.06;
/// Contrast moves by this much on each step.
pub const CONTRAST_STEP: i32 = 5;

/// The global temperature/gamma/contrast triple applied to every output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdjustmentState {
    pub temperature: i32,
    pub gamma: f64,
    pub contrast: i32,
}

impl Default for AdjustmentState {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMP,
            gamma: DEFAULT_GAMMA,
            contrast: DEFAULT_CONTRAST,
        }
    }
}

impl AdjustmentState {
    pub fn new(temperature: i64, gamma: f64, contrast: i64) -> Self {
        let mut state = Self {
            temperature: clamp_i64(temperature, MINIMUM_TEMP, MAXIMUM_TEMP),
            gamma: DEFAULT_GAMMA,
            contrast: clamp_i64(contrast, MINIMUM_CONTRAST, MAXIMUM_CONTRAST),
        };
        if gamma.is_finite() {
            state.gamma = gamma;
        }
        state.clamp();
        state
    }

    /// Forces every field back into its allowed range.
    pub fn clamp(&mut self) {
        self.temperature = self.temperature.clamp(MINIMUM_TEMP, MAXIMUM_TEMP);
        self.gamma = self.gamma.clamp(MINIMUM_GAMMA, MAXIMUM_GAMMA);
        self.contrast = self.contrast.clamp(MINIMUM_CONTRAST, MAXIMUM_CONTRAST);
    }

    /// Applies one command and clamps. Returns whether anything changed.
    pub fn apply(&mut self, command: Command) -> bool {
        let before = *self;
        match command {
            Command::Noop => return false,
            Command::AbsoluteTemperature(k) => {
                self.temperature = clamp_i64(k, MINIMUM_TEMP, MAXIMUM_TEMP);
            }
            Command::StepTemperature(step) => {
                let t = f64::from(self.temperature);
                let t = match step {
                    Step::Up => t * STEP_MULTIPLIER,
                    Step::Down => t / STEP_MULTIPLIER,
                };
                self.temperature = t as i32;
            }
            Command::AbsoluteGamma(g) => {
                if g.is_finite() {
                    self.gamma = g;
                }
            }
            Command::StepGamma(step) => {
                self.gamma = match step {
                    Step::Up => self.gamma * STEP_MULTIPLIER,
                    Step::Down => self.gamma / STEP_MULTIPLIER,
                };
            }
            Command::AbsoluteContrast(c) => {
                self.contrast = clamp_i64(c, MINIMUM_CONTRAST, MAXIMUM_CONTRAST);
            }
            Command::StepContrast(step) => {
                self.contrast = match step {
                    Step::Up => self.contrast.saturating_add(CONTRAST_STEP),
                    Step::Down => self.contrast.saturating_sub(CONTRAST_STEP),
                };
            }
        }
        self.clamp();
        *self != before
    }
}

fn clamp_i64(value: i64, min: i32, max: i32) -> i32 {
    // in range after the clamp, so the cast is lossless
    value.clamp(i64::from(min), i64::from(max)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults() {
        let state = AdjustmentState::default();
        assert_eq!(state.temperature, 5600);
        assert_eq!(state.gamma, 1.0);
        assert_eq!(state.contrast, 0);
    }

    #[test]
    fn oversized_temperature_clamps_to_maximum() {
        let mut state = AdjustmentState::default();
        assert!(state.apply(Command::AbsoluteTemperature(99999)));
        assert_eq!(state.temperature, MAXIMUM_TEMP);
    }

    #[test]
    fn small_gamma_clamps_to_minimum() {
        let mut state = AdjustmentState::default();
        assert!(state.apply(Command::AbsoluteGamma(0.01)));
        assert_eq!(state.gamma, MINIMUM_GAMMA);
    }

    #[test]
    fn non_finite_gamma_is_ignored() {
        let mut state = AdjustmentState::default();
        assert!(!state.apply(Command::AbsoluteGamma(f64::NAN)));
        assert_eq!(state.gamma, DEFAULT_GAMMA);
    }

    #[test]
    fn temperature_steps_truncate() {
        let mut state = AdjustmentState::new(5000, 1.0, 0);
        assert!(state.apply(Command::StepTemperature(Step::Up)));
        assert_eq!(state.temperature, 5300);

        let mut state = AdjustmentState::new(5000, 1.0, 0);
        assert!(state.apply(Command::StepTemperature(Step::Down)));
        assert_eq!(state.temperature, 4716);
    }

    #[test]
    fn step_at_bound_reports_unchanged() {
        let mut state = AdjustmentState::new(i64::from(MINIMUM_TEMP), 1.0, 0);
        assert!(!state.apply(Command::StepTemperature(Step::Down)));
        assert_eq!(state.temperature, MINIMUM_TEMP);

        let mut state = AdjustmentState::new(6500, 1.0, i64::from(MAXIMUM_CONTRAST));
        assert!(!state.apply(Command::StepContrast(Step::Up)));
    }

    #[test]
    fn gamma_steps_are_relative() {
        let mut state = AdjustmentState::new(6500, 2.0, 0);
        state.apply(Command::StepGamma(Step::Up));
        assert_relative_eq!(state.gamma, 2.12);
        state.apply(Command::StepGamma(Step::Down));
        assert_relative_eq!(state.gamma, 2.0);
    }

    #[test]
    fn contrast_steps_by_fixed_delta() {
        let mut state = AdjustmentState::new(6500, 1.0, 10);
        state.apply(Command::StepContrast(Step::Up));
        assert_eq!(state.contrast, 10 + CONTRAST_STEP);
        state.apply(Command::StepContrast(Step::Down));
        state.apply(Command::StepContrast(Step::Down));
        assert_eq!(state.contrast, 10 - CONTRAST_STEP);
    }

    #[test]
    fn same_value_is_not_a_change() {
        let mut state = AdjustmentState::default();
        assert!(!state.apply(Command::AbsoluteTemperature(i64::from(DEFAULT_TEMP))));
        assert!(!state.apply(Command::Noop));
    }

    #[test]
    fn constructor_clamps_everything() {
        let state = AdjustmentState::new(-5, 100.0, -1000);
        assert_eq!(state.temperature, MINIMUM_TEMP);
        assert_eq!(state.gamma, MAXIMUM_GAMMA);
        assert_eq!(state.contrast, MINIMUM_CONTRAST);
    }
}
