//! Row-aligned partitioning of a row-major matrix across a group.

use crate::error::{GroupError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Per-member `(count, offset)` table over a matrix's flat element sequence.
///
/// Counts and offsets are in elements, not rows. A plan is validated when it
/// is built or deserialized and is immutable afterwards, so every plan in
/// circulation satisfies:
///
/// - the counts sum to `rows * cols`,
/// - `offsets[0] == 0` and each offset is the previous offset plus the
///   previous count,
/// - every count is a whole number of rows.
///
/// Rows that do not divide evenly go to the lowest ranks first, one extra row
/// each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlanParts", into = "PlanParts")]
pub struct DistributionPlan {
    rows: usize,
    cols: usize,
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

/// Unvalidated wire form of a plan.
#[derive(Serialize, Deserialize)]
struct PlanParts {
    rows: usize,
    cols: usize,
    counts: Vec<usize>,
    offsets: Vec<usize>,
}

impl DistributionPlan {
    /// Split `rows` rows of width `cols` over `group_size` members.
    ///
    /// `rows` may be zero, and may be smaller than `group_size`; trailing
    /// members then get empty assignments.
    pub fn new(rows: usize, cols: usize, group_size: usize) -> Result<Self> {
        if group_size == 0 {
            return Err(GroupError::ConfigError("group size must be positive".into()));
        }
        if cols == 0 {
            return Err(GroupError::ConfigError("column count must be positive".into()));
        }
        rows.checked_mul(cols).ok_or_else(|| {
            GroupError::ConfigError(format!("{}x{} matrix overflows the address space", rows, cols))
        })?;

        let base = rows / group_size;
        let remainder = rows % group_size;

        let counts: Vec<usize> = (0..group_size)
            .map(|rank| {
                let rows_here = if rank < remainder { base + 1 } else { base };
                rows_here * cols
            })
            .collect();

        // Second pass: offsets only once every count is known.
        let offsets = counts
            .iter()
            .scan(0usize, |acc, &count| {
                let offset = *acc;
                *acc += count;
                Some(offset)
            })
            .collect();

        Ok(Self {
            rows,
            cols,
            counts,
            offsets,
        })
    }

    /// Rebuild a plan from raw tables, checking every invariant.
    pub fn from_parts(
        rows: usize,
        cols: usize,
        counts: Vec<usize>,
        offsets: Vec<usize>,
    ) -> Result<Self> {
        if counts.is_empty() {
            return Err(GroupError::PlanError("plan has no members".into()));
        }
        if counts.len() != offsets.len() {
            return Err(GroupError::PlanError(format!(
                "{} counts but {} offsets",
                counts.len(),
                offsets.len()
            )));
        }
        if cols == 0 {
            return Err(GroupError::PlanError("column count must be positive".into()));
        }
        let total = rows
            .checked_mul(cols)
            .ok_or_else(|| GroupError::PlanError("element total overflows".into()))?;

        let mut expected_offset = 0usize;
        for (rank, (&count, &offset)) in counts.iter().zip(&offsets).enumerate() {
            if count % cols != 0 {
                return Err(GroupError::PlanError(format!(
                    "rank {} count {} is not a whole number of {}-wide rows",
                    rank, count, cols
                )));
            }
            if offset != expected_offset {
                return Err(GroupError::PlanError(format!(
                    "rank {} offset {} should be {}",
                    rank, offset, expected_offset
                )));
            }
            expected_offset = expected_offset
                .checked_add(count)
                .ok_or_else(|| GroupError::PlanError("element total overflows".into()))?;
        }
        if expected_offset != total {
            return Err(GroupError::PlanError(format!(
                "counts cover {} elements, matrix has {}",
                expected_offset, total
            )));
        }

        Ok(Self {
            rows,
            cols,
            counts,
            offsets,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn group_size(&self) -> usize {
        self.counts.len()
    }

    pub fn total_elements(&self) -> usize {
        self.rows * self.cols
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Number of elements assigned to `rank`.
    ///
    /// # Panics
    ///
    /// If `rank` is outside the group.
    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    pub fn offset(&self, rank: usize) -> usize {
        self.offsets[rank]
    }

    /// Element range `[offset, offset + count)` owned by `rank`.
    pub fn range(&self, rank: usize) -> Range<usize> {
        let start = self.offsets[rank];
        start..start + self.counts[rank]
    }

    /// Number of whole rows owned by `rank`.
    pub fn row_count(&self, rank: usize) -> usize {
        self.counts[rank] / self.cols
    }

    /// Matrix row indices owned by `rank`.
    pub fn row_range(&self, rank: usize) -> Range<usize> {
        let first = self.offsets[rank] / self.cols;
        first..first + self.row_count(rank)
    }

    /// `(rank, element range)` for every member, in rank order.
    pub fn ranges(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        (0..self.group_size()).map(move |rank| (rank, self.range(rank)))
    }
}

impl TryFrom<PlanParts> for DistributionPlan {
    type Error = GroupError;

    fn try_from(parts: PlanParts) -> Result<Self> {
        Self::from_parts(parts.rows, parts.cols, parts.counts, parts.offsets)
    }
}

impl From<DistributionPlan> for PlanParts {
    fn from(plan: DistributionPlan) -> Self {
        PlanParts {
            rows: plan.rows,
            cols: plan.cols,
            counts: plan.counts,
            offsets: plan.offsets,
        }
    }
}
