//! User zoom multiplier applied on top of the fit scale

/// Zoom factor with fixed multiplicative steps
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Zoom {
    factor: f32,
    default: f32,
    step: f32,
}

impl Default for Zoom {
    fn default() -> Self {
        Self::with_config(Self::DEFAULT_FACTOR, Self::STEP)
    }
}

impl Zoom {
    pub const DEFAULT_FACTOR: f32 = 1.5;
    /// Multiplier per zoom step
    pub const STEP: f32 = 1.2;
    pub const MIN_FACTOR: f32 = 0.25;
    pub const MAX_FACTOR: f32 = 8.0;

    /// Zoom starting at `default`; invalid values fall back to the constants
    #[must_use]
    pub fn with_config(default: f32, step: f32) -> Self {
        let default = if default.is_finite() && default > 0.0 {
            default.clamp(Self::MIN_FACTOR, Self::MAX_FACTOR)
        } else {
            Self::DEFAULT_FACTOR
        };
        let step = if step.is_finite() && step > 1.0 {
            step
        } else {
            Self::STEP
        };
        Self {
            factor: default,
            default,
            step,
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn step_in(&mut self) {
        self.factor = self.clamp_factor(self.factor * self.step);
    }

    pub fn step_out(&mut self) {
        self.factor = self.clamp_factor(self.factor / self.step);
    }

    pub fn reset(&mut self) {
        self.factor = self.default;
    }

    pub fn set(&mut self, factor: f32) {
        self.factor = self.clamp_factor(factor);
    }

    /// Clamp factor to valid range, resetting NaN/Inf to the default
    fn clamp_factor(&self, factor: f32) -> f32 {
        if !factor.is_finite() {
            self.default
        } else {
            factor.clamp(Self::MIN_FACTOR, Self::MAX_FACTOR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_default() {
        assert_eq!(Zoom::default().factor(), 1.5);
    }

    #[test]
    fn in_then_out_round_trips() {
        let mut zoom = Zoom::default();
        zoom.step_in();
        assert!((zoom.factor() - 1.8).abs() < 1e-5);
        zoom.step_out();
        assert!((zoom.factor() - 1.5).abs() < 1e-5);
    }

    #[test]
    fn factor_is_clamped() {
        let mut zoom = Zoom::default();
        for _ in 0..50 {
            zoom.step_in();
        }
        assert_eq!(zoom.factor(), Zoom::MAX_FACTOR);
        for _ in 0..100 {
            zoom.step_out();
        }
        assert_eq!(zoom.factor(), Zoom::MIN_FACTOR);
    }

    #[test]
    fn non_finite_resets_to_default() {
        let mut zoom = Zoom::with_config(2.0, 1.1);
        zoom.set(f32::NAN);
        assert_eq!(zoom.factor(), 2.0);
        zoom.set(f32::INFINITY);
        assert_eq!(zoom.factor(), 2.0);
    }

    #[test]
    fn bad_config_falls_back() {
        let zoom = Zoom::with_config(-1.0, 0.5);
        assert_eq!(zoom, Zoom::default());
    }
}
