//! Simulated Mars time and the pulse generator.
//!
//! Simulated time is measured in millisols (1/1000 of a Martian day) and is
//! decoupled from the wall clock: the driver either feeds real elapsed time
//! through [`MasterClock::advance`] or asks for fixed-size pulses.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const MILLISOLS_PER_SOL: f64 = 1000.0;
/// Length of one millisol in Earth seconds.
pub const SECONDS_PER_MILLISOL: f64 = 88.775_244;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClockError {
    #[error("time ratio must be positive and finite, got {0}")]
    InvalidTimeRatio(f64),
    #[error("max pulse size must be positive and finite, got {0}")]
    InvalidMaxPulse(f64),
}

/// Absolute simulated time since the colony was founded.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct MarsTime {
    total_millisols: f64,
}

impl MarsTime {
    pub const fn from_millisols(total_millisols: f64) -> Self {
        Self { total_millisols }
    }

    pub fn total_millisols(self) -> f64 {
        self.total_millisols
    }

    /// Sols are counted from 1.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sol(self) -> u64 {
        (self.total_millisols / MILLISOLS_PER_SOL).floor() as u64 + 1
    }

    pub fn millisol(self) -> f64 {
        self.total_millisols % MILLISOLS_PER_SOL
    }

    #[must_use]
    pub fn plus(self, millisols: f64) -> Self {
        Self::from_millisols(self.total_millisols + millisols)
    }

    pub fn millisols_since(self, earlier: MarsTime) -> f64 {
        self.total_millisols - earlier.total_millisols
    }
}

impl fmt::Display for MarsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:07.3}", self.sol(), self.millisol())
    }
}

/// One discrete advance of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub id: u64,
    /// Millisols covered by this pulse. Always > 0.
    pub elapsed: f64,
    /// Time after the pulse is applied.
    pub time: MarsTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterClock {
    time: MarsTime,
    next_pulse_id: u64,
    time_ratio: f64,
    max_pulse_millisols: f64,
}

impl MasterClock {
    pub fn new(
        start: MarsTime,
        time_ratio: f64,
        max_pulse_millisols: f64,
    ) -> Result<Self, ClockError> {
        validate_ratio(time_ratio)?;
        if !max_pulse_millisols.is_finite() || max_pulse_millisols <= 0.0 {
            return Err(ClockError::InvalidMaxPulse(max_pulse_millisols));
        }
        Ok(Self {
            time: start,
            next_pulse_id: 0,
            time_ratio,
            max_pulse_millisols,
        })
    }

    pub fn time(&self) -> MarsTime {
        self.time
    }

    pub fn time_ratio(&self) -> f64 {
        self.time_ratio
    }

    pub fn set_time_ratio(&mut self, time_ratio: f64) -> Result<(), ClockError> {
        validate_ratio(time_ratio)?;
        self.time_ratio = time_ratio;
        Ok(())
    }

    /// Converts real elapsed time into a pulse using the time ratio.
    pub fn advance(&mut self, real_elapsed: Duration) -> Option<Pulse> {
        let millisols = real_elapsed.as_secs_f64() * self.time_ratio / SECONDS_PER_MILLISOL;
        self.pulse_fixed(millisols)
    }

    /// Produces a pulse of `millisols`, clamped to the maximum pulse size.
    ///
    /// Non-positive or non-finite deltas produce no pulse.
    pub fn pulse_fixed(&mut self, millisols: f64) -> Option<Pulse> {
        if !millisols.is_finite() || millisols <= 0.0 {
            return None;
        }
        let next = self.time.plus(millisols.min(self.max_pulse_millisols));
        // Deltas below f64 resolution at this magnitude would stall time.
        let elapsed = next.millisols_since(self.time);
        if elapsed <= 0.0 {
            return None;
        }
        self.time = next;
        let id = self.next_pulse_id;
        self.next_pulse_id += 1;
        Some(Pulse {
            id,
            elapsed,
            time: next,
        })
    }
}

fn validate_ratio(time_ratio: f64) -> Result<(), ClockError> {
    if time_ratio.is_finite() && time_ratio > 0.0 {
        Ok(())
    } else {
        Err(ClockError::InvalidTimeRatio(time_ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> MasterClock {
        MasterClock::new(MarsTime::default(), 1000.0, 50.0).unwrap()
    }

    #[test]
    fn fixed_pulses_are_strictly_increasing() {
        let mut clock = clock();
        let first = clock.pulse_fixed(10.0).unwrap();
        let second = clock.pulse_fixed(10.0).unwrap();
        assert_eq!(first.id, 0);
        assert_eq!(second.id, 1);
        assert!(second.time > first.time);
        assert!((second.time.total_millisols() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_negative_and_nan_deltas_are_skipped() {
        let mut clock = clock();
        assert!(clock.pulse_fixed(0.0).is_none());
        assert!(clock.pulse_fixed(-3.0).is_none());
        assert!(clock.pulse_fixed(f64::NAN).is_none());
        assert!(clock.pulse_fixed(f64::INFINITY).is_none());
        assert!(clock.advance(Duration::ZERO).is_none());
        // A skipped pulse does not consume a sequence number.
        assert_eq!(clock.pulse_fixed(1.0).unwrap().id, 0);
    }

    #[test]
    fn oversized_pulses_are_clamped() {
        let mut clock = clock();
        let pulse = clock.pulse_fixed(400.0).unwrap();
        assert!((pulse.elapsed - 50.0).abs() < 1e-9);
    }

    #[test]
    fn advance_scales_real_time_by_ratio() {
        let mut clock = MasterClock::new(MarsTime::default(), SECONDS_PER_MILLISOL, 50.0).unwrap();
        let pulse = clock.advance(Duration::from_secs(2)).unwrap();
        assert!((pulse.elapsed - 2.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_ratio_is_rejected() {
        assert_eq!(
            MasterClock::new(MarsTime::default(), 0.0, 50.0).unwrap_err(),
            ClockError::InvalidTimeRatio(0.0)
        );
        let mut clock = clock();
        assert!(clock.set_time_ratio(-1.0).is_err());
        assert!((clock.time_ratio() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn mars_time_formats_sol_and_millisol() {
        let time = MarsTime::from_millisols(2012.5);
        assert_eq!(time.sol(), 3);
        assert!((time.millisol() - 12.5).abs() < 1e-9);
        assert_eq!(time.to_string(), "3-012.500");
    }
}
