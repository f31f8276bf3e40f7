// Performance-driven rescheduling of the cycles that follow a completion.
//
// A completion with a weak score pulls every later pending cycle closer to
// the completion day; a strong score leaves the rest of the plan alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cycle::{CYCLE_COUNT, Cycles, Performance, ReviewCycle};
use crate::dates;
use crate::error::{Result, ReviewError};
use crate::review::Suggestion;

/// How a completion score affects the cycles after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Below 50: halve the remaining gaps.
    Weak,
    /// 50..75: shrink the remaining gaps to three quarters.
    Fair,
    /// 75 and above: keep the plan and stop propagating.
    Strong,
}

impl Tier {
    pub fn of(performance: Performance) -> Tier {
        match performance.value() {
            0..50 => Tier::Weak,
            50..75 => Tier::Fair,
            _ => Tier::Strong,
        }
    }

    /// Compression factor as an exact fraction.
    fn factor(self) -> Option<(i64, i64)> {
        match self {
            Tier::Weak => Some((1, 2)),
            Tier::Fair => Some((3, 4)),
            Tier::Strong => None,
        }
    }

    /// `ceil(interval * factor)`, or `None` when this tier keeps the interval.
    pub fn compress(self, interval: i64) -> Option<i64> {
        self.factor()
            .map(|(num, den)| (interval * num + den - 1).div_euclid(den))
    }
}

/// Which dates a candidate's gap to its predecessor is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalBaseline {
    /// The schedule as it stood before this pass started.
    #[default]
    PrePass,
    /// The predecessor's date in the schedule being built, which may
    /// already have been moved earlier in the same pass.
    Rolling,
}

/// What the learner reports when finishing a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub cycle: i64,
    pub performance: Performance,
    pub completed_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub suggestion: Option<Suggestion>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Rescheduler {
    pub baseline: IntervalBaseline,
}

/// Fold state: whether later candidates may still move, and the cycles
/// with every index before the current one already final.
struct Pass {
    keep_rescheduling: bool,
    out: [ReviewCycle; CYCLE_COUNT],
}

impl Rescheduler {
    pub fn new(baseline: IntervalBaseline) -> Self {
        Rescheduler { baseline }
    }

    /// Marks `completion.cycle` as done and recomputes the planned dates of
    /// the pending cycles after it. Returns a new set of cycles; `cycles`
    /// is never modified, so an error leaves nothing half-applied.
    pub fn reschedule(&self, cycles: &Cycles, completion: &Completion) -> Result<Cycles> {
        let target = cycles.get(completion.cycle)?;
        if target.is_completed {
            return Err(ReviewError::AlreadyCompleted(target.cycle));
        }
        let completed_number = target.cycle;
        let tier = Tier::of(completion.performance);
        let original = cycles.as_array();

        let pass = (0..CYCLE_COUNT).fold(
            Pass {
                keep_rescheduling: true,
                out: original.clone(),
            },
            |mut pass, i| {
                let cycle = &original[i];
                if cycle.cycle == completed_number {
                    pass.out[i] = complete(cycle, completion);
                } else if cycle.cycle > completed_number {
                    let next = self.step(&mut pass, original, i, tier, completion.completed_at);
                    pass.out[i] = next;
                }
                pass
            },
        );
        Ok(Cycles::from_array(pass.out))
    }

    /// Handles one candidate at index `i` (always > 0, since cycle 1 can
    /// never follow a completion).
    fn step(
        &self,
        pass: &mut Pass,
        original: &[ReviewCycle; CYCLE_COUNT],
        i: usize,
        tier: Tier,
        completed_at: DateTime<Utc>,
    ) -> ReviewCycle {
        let cycle = &original[i];
        if cycle.is_completed || !pass.keep_rescheduling {
            return cycle.clone();
        }

        let previous = match self.baseline {
            IntervalBaseline::PrePass => original[i - 1].planned_date,
            IntervalBaseline::Rolling => pass.out[i - 1].planned_date,
        };
        let interval = dates::days_between(previous, cycle.planned_date);

        let Some(new_interval) = tier.compress(interval) else {
            pass.keep_rescheduling = false;
            debug!(cycle = cycle.cycle, "strong performance, keeping remaining dates");
            return cycle.clone();
        };

        let mut planned = dates::add_days(completed_at, new_interval);
        // never ahead of the cycle before it
        let floor = pass.out[i - 1].planned_date;
        if planned < floor {
            planned = floor;
        }
        debug!(
            cycle = cycle.cycle,
            interval,
            new_interval,
            planned = %planned,
            "rescheduled"
        );

        ReviewCycle {
            planned_date: planned,
            ..cycle.clone()
        }
    }
}

fn complete(cycle: &ReviewCycle, completion: &Completion) -> ReviewCycle {
    ReviewCycle {
        is_completed: true,
        performance: Some(completion.performance),
        notes: completion.notes.clone().or_else(|| cycle.notes.clone()),
        suggestion: completion.suggestion.or(cycle.suggestion),
        ..cycle.clone()
    }
}
