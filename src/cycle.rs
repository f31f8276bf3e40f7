use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dates;
use crate::error::{Result, ReviewError};
use crate::review::Suggestion;

pub const CYCLE_COUNT: usize = 4;

/// Days after creation at which R1..R4 fall due.
pub const CYCLE_OFFSETS_DAYS: [i64; CYCLE_COUNT] = [3, 10, 30, 90];

/// A retention score in 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Performance(u8);

impl Performance {
    pub fn new(score: i64) -> Result<Self> {
        match u8::try_from(score) {
            Ok(s) if s <= 100 => Ok(Performance(s)),
            _ => Err(ReviewError::InvalidPerformance(score)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Performance {
    type Error = ReviewError;

    fn try_from(score: i64) -> Result<Self> {
        Performance::new(score)
    }
}

impl From<Performance> for u8 {
    fn from(p: Performance) -> u8 {
        p.0
    }
}

impl std::fmt::Display for Performance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCycle {
    pub cycle: u8,
    pub planned_date: DateTime<Utc>,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<Performance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ReviewCycle {
    pub fn pending(cycle: u8, planned_date: DateTime<Utc>) -> Self {
        ReviewCycle {
            cycle,
            planned_date,
            is_completed: false,
            performance: None,
            suggestion: None,
            notes: None,
        }
    }

    pub fn label(&self) -> String {
        format!("R{}", self.cycle)
    }
}

/// The four cycles of a review, always numbered 1..4 in order.
///
/// The only ways to obtain one are [`generate_initial_cycles`] and
/// deserialization, which checks the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ReviewCycle>", into = "Vec<ReviewCycle>")]
pub struct Cycles([ReviewCycle; CYCLE_COUNT]);

impl Cycles {
    /// Looks up a cycle by its number (1-based).
    pub fn get(&self, number: i64) -> Result<&ReviewCycle> {
        let i = Self::index_of(number)?;
        Ok(&self.0[i])
    }

    pub(crate) fn get_mut(&mut self, number: i64) -> Result<&mut ReviewCycle> {
        let i = Self::index_of(number)?;
        Ok(&mut self.0[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReviewCycle> {
        self.0.iter()
    }

    pub fn as_array(&self) -> &[ReviewCycle; CYCLE_COUNT] {
        &self.0
    }

    /// First cycle still waiting to be done, in cycle order.
    pub fn next_pending(&self) -> Option<&ReviewCycle> {
        self.0.iter().find(|c| !c.is_completed)
    }

    pub(crate) fn from_array(cycles: [ReviewCycle; CYCLE_COUNT]) -> Self {
        Cycles(cycles)
    }

    fn index_of(number: i64) -> Result<usize> {
        if (1..=CYCLE_COUNT as i64).contains(&number) {
            Ok(number as usize - 1)
        } else {
            Err(ReviewError::CycleNotFound(number))
        }
    }
}

impl<'a> IntoIterator for &'a Cycles {
    type Item = &'a ReviewCycle;
    type IntoIter = std::slice::Iter<'a, ReviewCycle>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl TryFrom<Vec<ReviewCycle>> for Cycles {
    type Error = String;

    fn try_from(cycles: Vec<ReviewCycle>) -> std::result::Result<Self, String> {
        let array: [ReviewCycle; CYCLE_COUNT] = cycles
            .try_into()
            .map_err(|v: Vec<ReviewCycle>| format!("expected 4 cycles, got {}", v.len()))?;
        for (i, c) in array.iter().enumerate() {
            if c.cycle as usize != i + 1 {
                return Err(format!("cycle at position {} is numbered {}", i + 1, c.cycle));
            }
            if c.is_completed != c.performance.is_some() {
                return Err(format!(
                    "cycle R{} must have a performance exactly when completed",
                    c.cycle
                ));
            }
        }
        Ok(Cycles(array))
    }
}

impl From<Cycles> for Vec<ReviewCycle> {
    fn from(cycles: Cycles) -> Self {
        cycles.0.into()
    }
}

/// Builds the R1..R4 schedule for a review created at `creation`.
/// Planned dates keep the creation time of day.
pub fn generate_initial_cycles(creation: DateTime<Utc>) -> Cycles {
    Cycles(std::array::from_fn(|i| {
        ReviewCycle::pending(i as u8 + 1, dates::add_days(creation, CYCLE_OFFSETS_DAYS[i]))
    }))
}
