//! Wait materialization.
//!
//! Waits come in two shapes and the two are not interchangeable:
//!
//! - split-layout runs log `wait_start, wait_end` intervals; these become a
//!   dense [`OccupancyTable`] over the run's tick domain, drawn as a filled area.
//! - unified-layout runs log `wait_start, wait_length`; these become sparse
//!   [`StepEvent`]s (1 on entry, 0 on exit) that are merged into the metric
//!   stream and drawn as a cumulative step series.

use serde::Serialize;

use crate::{WaitInterval, WaitPoint};

/// Closed integer tick range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickDomain {
    pub start: i64,
    pub end: i64,
}

impl TickDomain {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Smallest tick domain covering `[min, max]`.
    pub fn covering(min: f64, max: f64) -> Self {
        Self::new(min.floor() as i64, max.ceil() as i64)
    }

    pub fn contains(&self, tick: i64) -> bool {
        (self.start..=self.end).contains(&tick)
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ticks an interval marks occupied: `[floor(start), ceil(end) + 1)`.
///
/// The `+ 1` keeps the tick after the wait's last partial tick occupied, so
/// a wait ending at 10.5 covers ticks 10 and 11. Existing charts were drawn
/// with this widening, so it stays even though it reads like an off-by-one.
pub fn occupied_ticks(interval: &WaitInterval) -> std::ops::Range<i64> {
    let first = interval.start.floor() as i64;
    let past_last = interval.end.ceil() as i64 + 1;
    first..past_last
}

/// Dense per-tick 0/1 wait indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupancyTable {
    domain: TickDomain,
    cells: Vec<u8>,
    clipped_ticks: usize,
}

impl OccupancyTable {
    /// Marks every tick covered by any interval; overlaps OR together.
    ///
    /// Ticks outside `domain` are dropped and counted in [`Self::clipped_ticks`].
    pub fn from_intervals(domain: TickDomain, intervals: &[WaitInterval]) -> Self {
        let mut cells = vec![0u8; domain.len()];
        let mut clipped_ticks = 0usize;
        for interval in intervals {
            for tick in occupied_ticks(interval) {
                if domain.contains(tick) {
                    cells[(tick - domain.start) as usize] = 1;
                } else {
                    clipped_ticks += 1;
                }
            }
        }
        if clipped_ticks > 0 {
            tracing::debug!(
                clipped_ticks,
                start = domain.start,
                end = domain.end,
                "wait ticks fall outside the run domain"
            );
        }
        Self {
            domain,
            cells,
            clipped_ticks,
        }
    }

    pub fn domain(&self) -> TickDomain {
        self.domain
    }

    pub fn clipped_ticks(&self) -> usize {
        self.clipped_ticks
    }

    pub fn get(&self, tick: i64) -> Option<u8> {
        if !self.domain.contains(tick) {
            return None;
        }
        self.cells.get((tick - self.domain.start) as usize).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u8)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(|(idx, v)| (self.domain.start + idx as i64, *v))
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|v| **v == 1).count()
    }
}

/// Entry (1) or exit (0) of a wait at an integer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepEvent {
    pub tick: i64,
    pub value: u8,
}

/// Emits `1` at `floor(start)` and `0` at `ceil(start + duration)` for each wait.
///
/// Events are sorted by tick; an entry and exit on the same tick keep emission order.
/// Events are not merged: two waits entering within one tick give two `(tick, 1)`
/// events, and the reshaper keeps only the last, so such waits count once in the
/// cumulative wait series.
pub fn step_events(points: &[WaitPoint]) -> Vec<StepEvent> {
    let mut out = Vec::with_capacity(points.len().saturating_mul(2));
    for p in points {
        out.push(StepEvent {
            tick: p.start.floor() as i64,
            value: 1,
        });
        out.push(StepEvent {
            tick: (p.start + p.duration).ceil() as i64,
            value: 0,
        });
    }
    out.sort_by_key(|e| e.tick);
    out
}

/// A run's materialized waits, in whichever shape its layout logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum WaitSeries {
    Occupancy(OccupancyTable),
    Steps { events: Vec<StepEvent> },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: f64, end: f64) -> WaitInterval {
        WaitInterval { start, end }
    }

    #[test]
    fn half_tick_wait_covers_two_ticks() {
        let table = OccupancyTable::from_intervals(TickDomain::new(0, 20), &[interval(10.0, 10.5)]);
        for (tick, value) in table.iter() {
            let expected = u8::from(tick == 10 || tick == 11);
            assert_eq!(value, expected, "tick {tick}");
        }
        assert_eq!(table.occupied(), 2);
    }

    #[test]
    fn table_is_dense_and_binary() {
        let domain = TickDomain::new(3, 17);
        let table = OccupancyTable::from_intervals(domain, &[interval(4.2, 6.0), interval(15.1, 15.9)]);
        let ticks: Vec<i64> = table.iter().map(|(t, _)| t).collect();
        assert_eq!(ticks, (3..=17).collect::<Vec<_>>());
        assert!(table.iter().all(|(_, v)| v <= 1));
    }

    #[test]
    fn overlapping_waits_do_not_stack() {
        let table = OccupancyTable::from_intervals(
            TickDomain::new(0, 10),
            &[interval(2.0, 5.0), interval(4.5, 6.0), interval(4.0, 4.1)],
        );
        assert_eq!(table.get(4), Some(1));
        assert_eq!(table.get(5), Some(1));
        assert!(table.iter().all(|(_, v)| v <= 1));
    }

    #[test]
    fn ticks_outside_domain_are_clipped() {
        let table = OccupancyTable::from_intervals(TickDomain::new(0, 5), &[interval(4.0, 5.2)]);
        // ticks 4..=6 are occupied; 6 lies past the domain end
        assert_eq!(table.get(5), Some(1));
        assert_eq!(table.get(6), None);
        assert_eq!(table.clipped_ticks(), 1);
        assert_eq!(table.domain().len(), 6);
    }

    #[test]
    fn empty_waits_leave_every_tick_zero() {
        let table = OccupancyTable::from_intervals(TickDomain::new(0, 15), &[]);
        assert_eq!(table.iter().count(), 16);
        assert_eq!(table.occupied(), 0);
    }

    #[test]
    fn step_events_mark_entry_and_exit() {
        let events = step_events(&[
            WaitPoint {
                start: 7.4,
                duration: 0.3,
            },
            WaitPoint {
                start: 2.0,
                duration: 1.5,
            },
        ]);
        assert_eq!(
            events,
            vec![
                StepEvent { tick: 2, value: 1 },
                StepEvent { tick: 4, value: 0 },
                StepEvent { tick: 7, value: 1 },
                StepEvent { tick: 8, value: 0 },
            ]
        );
    }

    #[test]
    fn waits_sharing_a_tick_emit_separate_events() {
        let events = step_events(&[
            WaitPoint {
                start: 102.1,
                duration: 0.3,
            },
            WaitPoint {
                start: 102.6,
                duration: 0.2,
            },
        ]);
        assert_eq!(
            events,
            vec![
                StepEvent { tick: 102, value: 1 },
                StepEvent { tick: 102, value: 1 },
                StepEvent { tick: 103, value: 0 },
                StepEvent { tick: 103, value: 0 },
            ]
        );
    }

    #[test]
    fn domain_covering_rounds_outward() {
        let d = TickDomain::covering(0.4, 19.2);
        assert_eq!((d.start, d.end), (0, 20));
        assert!(TickDomain::new(5, 4).is_empty());
    }
}
