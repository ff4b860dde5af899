//! Parameter automation for synthesized voices
//!
//! An [`Automation`] is a start value followed by timed breakpoints. Each
//! breakpoint says how the value travels from the previous breakpoint to it:
//! - `Step`: hold the previous value, jump at the breakpoint time
//! - `Linear`: v(t) = v0 + (v1 - v0) × p
//! - `Exponential`: v(t) = v0 × (v1 / v0)^p
//!
//! where p is the normalized position (0.0 to 1.0) between the two
//! breakpoints. Exponential ramps need both ends non-zero with the same sign;
//! otherwise the previous value is held until the breakpoint.
//!
//! Times are seconds relative to the start of the cue.

/// How the value reaches a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ramp {
    Step,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Breakpoint {
    time: f32,
    value: f32,
    ramp: Ramp,
}

/// Piecewise value over time
#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    initial: f32,
    points: Vec<Breakpoint>,
}

impl Automation {
    /// Value that never changes
    pub fn constant(value: f32) -> Self {
        Self {
            initial: value,
            points: Vec::new(),
        }
    }

    /// Jump to `value` at `time`
    pub fn step(self, time: f32, value: f32) -> Self {
        self.push(time, value, Ramp::Step)
    }

    /// Ramp linearly to `value`, arriving at `time`
    pub fn linear(self, time: f32, value: f32) -> Self {
        self.push(time, value, Ramp::Linear)
    }

    /// Ramp exponentially to `value`, arriving at `time`
    pub fn exponential(self, time: f32, value: f32) -> Self {
        self.push(time, value, Ramp::Exponential)
    }

    fn push(mut self, time: f32, value: f32, ramp: Ramp) -> Self {
        // Breakpoints stay sorted; equal times keep insertion order
        let at = self.points.partition_point(|p| p.time <= time);
        self.points.insert(at, Breakpoint { time, value, ramp });
        self
    }

    /// Time of the last breakpoint (0.0 for a constant)
    pub fn end_time(&self) -> f32 {
        self.points.last().map(|p| p.time).unwrap_or(0.0)
    }

    /// Value at `time` seconds
    pub fn value_at(&self, time: f32) -> f32 {
        let mut prev_time = 0.0f32;
        let mut prev_value = self.initial;

        for point in &self.points {
            if time < point.time {
                let span = point.time - prev_time;
                if span <= 0.0 {
                    return prev_value;
                }
                let position = ((time - prev_time) / span).clamp(0.0, 1.0);

                return match point.ramp {
                    Ramp::Step => prev_value,
                    Ramp::Linear => prev_value + (point.value - prev_value) * position,
                    Ramp::Exponential => {
                        if prev_value == 0.0
                            || point.value == 0.0
                            || prev_value.signum() != point.value.signum()
                        {
                            prev_value
                        } else {
                            prev_value * (point.value / prev_value).powf(position)
                        }
                    }
                };
            }
            prev_time = point.time;
            prev_value = point.value;
        }

        prev_value
    }
}
