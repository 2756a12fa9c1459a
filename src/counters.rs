//! Turns the gateway's lifetime energy readings into increments for
//! monotonically non-decreasing export counters.

use crate::model::{Meter, MeterTable};
use std::fmt;
use tracing::warn;

/// Decreases smaller than this are treated as rounding noise, in kWh.
pub const NOISE_TOLERANCE_KWH: f64 = 0.00001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Energy drawn in through the meter.
    Imported,
    /// Energy pushed out through the meter.
    Exported,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Imported, Direction::Exported];

    /// Value of the `direction` label.
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Imported => "to",
            Direction::Exported => "from",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Imported => "imported",
            Direction::Exported => "exported",
        })
    }
}

/// A cumulative reading that went backwards by more than the noise tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterAnomaly {
    pub meter: Meter,
    pub direction: Direction,
    pub delta: f64,
}

impl fmt::Display for CounterAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Meter {} cumulative energy {} decreased: {:.4}",
            self.meter, self.direction, self.delta
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CounterUpdate {
    /// Add this much to the export counter.
    Increment(f64),
    /// Went backwards within tolerance; nothing to publish.
    Noise(f64),
    /// Went backwards beyond tolerance; nothing to publish.
    Reset(CounterAnomaly),
}

impl CounterUpdate {
    pub fn increment(&self) -> Option<f64> {
        match self {
            CounterUpdate::Increment(delta) => Some(*delta),
            _ => None,
        }
    }
}

/// Last seen cumulative value for every (meter, direction) pair.
///
/// Starts at zero, so the first reading is published in full.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CumulativeCounterState {
    last: [[f64; 2]; 4],
}

impl CumulativeCounterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self, meter: Meter, direction: Direction) -> f64 {
        self.last[meter.index()][direction.index()]
    }

    /// Records `current` as the latest reading and reports what to publish.
    ///
    /// The stored value always moves to `current`, even when the reading went
    /// backwards, so later deltas are measured from the newest reading.
    pub fn advance(&mut self, meter: Meter, direction: Direction, current: f64) -> CounterUpdate {
        let slot = &mut self.last[meter.index()][direction.index()];
        let delta = current - *slot;
        *slot = current;

        if delta >= 0.0 {
            return CounterUpdate::Increment(delta);
        }
        if delta < -NOISE_TOLERANCE_KWH {
            let anomaly = CounterAnomaly {
                meter,
                direction,
                delta,
            };
            warn!("{}", anomaly);
            CounterUpdate::Reset(anomaly)
        } else {
            CounterUpdate::Noise(delta)
        }
    }

    /// Advances every pair from one poll's meter readings.
    pub fn advance_all(&mut self, meters: &MeterTable) -> Vec<(Meter, Direction, CounterUpdate)> {
        let mut updates = Vec::with_capacity(Meter::ALL.len() * Direction::ALL.len());
        for (meter, reading) in meters.iter() {
            for direction in Direction::ALL {
                let current = match direction {
                    Direction::Imported => reading.cumulative_imported,
                    Direction::Exported => reading.cumulative_exported,
                };
                updates.push((meter, direction, self.advance(meter, direction, current)));
            }
        }
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MeterReading;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_first_reading_is_published_in_full() {
        let mut state = CumulativeCounterState::new();
        let update = state.advance(Meter::Site, Direction::Imported, 5742.1234);
        assert_eq!(update, CounterUpdate::Increment(5742.1234));
        assert_eq!(state.last(Meter::Site, Direction::Imported), 5742.1234);
        assert_eq!(state.last(Meter::Site, Direction::Exported), 0.0);
    }

    #[test]
    fn test_positive_delta_increments() {
        let mut state = CumulativeCounterState::new();
        state.advance(Meter::Solar, Direction::Exported, 100.0);

        let update = state.advance(Meter::Solar, Direction::Exported, 100.0 + 0.2);
        let delta = update.increment().expect("increment");
        assert!(close(delta, 0.2));
        assert!(close(state.last(Meter::Solar, Direction::Exported), 100.2));
    }

    #[test]
    fn test_zero_delta_is_an_increment_of_nothing() {
        let mut state = CumulativeCounterState::new();
        state.advance(Meter::Load, Direction::Imported, 42.0);
        assert_eq!(
            state.advance(Meter::Load, Direction::Imported, 42.0),
            CounterUpdate::Increment(0.0)
        );
    }

    #[test]
    fn test_reset_beyond_tolerance() {
        let mut state = CumulativeCounterState::new();
        state.advance(Meter::Battery, Direction::Exported, 100.2);

        let update = state.advance(Meter::Battery, Direction::Exported, 100.1);
        match update {
            CounterUpdate::Reset(anomaly) => {
                assert_eq!(anomaly.meter, Meter::Battery);
                assert_eq!(anomaly.direction, Direction::Exported);
                assert!(close(anomaly.delta, -0.1));
                assert!(anomaly
                    .to_string()
                    .starts_with("Meter battery cumulative energy exported decreased: -0.1"));
            }
            other => panic!("expected reset, got {other:?}"),
        }
        assert_eq!(update.increment(), None);
        assert_eq!(state.last(Meter::Battery, Direction::Exported), 100.1);
    }

    #[test]
    fn test_noise_within_tolerance() {
        let mut state = CumulativeCounterState::new();
        state.advance(Meter::Site, Direction::Exported, 100.2);

        let update = state.advance(Meter::Site, Direction::Exported, 100.1999995);
        assert!(matches!(update, CounterUpdate::Noise(d) if d < 0.0 && d > -NOISE_TOLERANCE_KWH));
        assert_eq!(update.increment(), None);
        assert_eq!(state.last(Meter::Site, Direction::Exported), 100.1999995);
    }

    #[test]
    fn test_deltas_resume_from_latest_reading_after_reset() {
        let mut state = CumulativeCounterState::new();
        state.advance(Meter::Load, Direction::Imported, 500.0);
        state.advance(Meter::Load, Direction::Imported, 3.0);

        let update = state.advance(Meter::Load, Direction::Imported, 4.5);
        assert_eq!(update, CounterUpdate::Increment(1.5));
    }

    #[test]
    fn test_pairs_are_independent() {
        let mut state = CumulativeCounterState::new();
        state.advance(Meter::Site, Direction::Imported, 10.0);
        state.advance(Meter::Site, Direction::Exported, 20.0);
        state.advance(Meter::Solar, Direction::Imported, 30.0);

        assert_eq!(state.last(Meter::Site, Direction::Imported), 10.0);
        assert_eq!(state.last(Meter::Site, Direction::Exported), 20.0);
        assert_eq!(state.last(Meter::Solar, Direction::Imported), 30.0);
        assert_eq!(state.last(Meter::Solar, Direction::Exported), 0.0);
        assert_eq!(state.last(Meter::Battery, Direction::Imported), 0.0);
    }

    #[test]
    fn test_advance_all_covers_every_pair() {
        let mut meters = MeterTable::default();
        meters[Meter::Site] = MeterReading {
            cumulative_imported: 7.0,
            cumulative_exported: 3.0,
            ..Default::default()
        };
        meters[Meter::Battery] = MeterReading {
            cumulative_imported: 1.0,
            cumulative_exported: 2.0,
            ..Default::default()
        };

        let mut state = CumulativeCounterState::new();
        let updates = state.advance_all(&meters);
        assert_eq!(updates.len(), 8);
        assert!(updates.contains(&(Meter::Site, Direction::Imported, CounterUpdate::Increment(7.0))));
        assert!(updates.contains(&(
            Meter::Battery,
            Direction::Exported,
            CounterUpdate::Increment(2.0)
        )));
        assert_eq!(state.last(Meter::Site, Direction::Exported), 3.0);
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::Imported.label(), "to");
        assert_eq!(Direction::Exported.label(), "from");
    }
}
