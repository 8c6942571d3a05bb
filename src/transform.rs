//! Per-row transforms applied to a member's local slice.

use crate::Element;
use rayon::prelude::*;

/// A pure, in-place operation on one matrix row.
///
/// Implementations must only touch the row they are given; rows of a slice
/// may be handed out to several threads at once.
pub trait RowTransform: Sync {
    fn apply(&self, row: &mut [Element]);
}

impl<F> RowTransform for F
where
    F: Fn(&mut [Element]) + Sync,
{
    fn apply(&self, row: &mut [Element]) {
        self(row)
    }
}

/// Reverses the order of the elements in each row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseRow;

impl RowTransform for ReverseRow {
    fn apply(&self, row: &mut [Element]) {
        reverse_row(row);
    }
}

/// Swap element `k` with element `len - 1 - k` up to the midpoint.
pub fn reverse_row<T>(row: &mut [T]) {
    if row.len() <= 1 {
        return;
    }
    let (mut start, mut end) = (0, row.len() - 1);
    while start < end {
        row.swap(start, end);
        start += 1;
        end -= 1;
    }
}

/// Apply `transform` to every `cols`-wide row of `slice`.
///
/// `slice.len()` must be a multiple of `cols`; a trailing partial row is left
/// untouched. With `parallel` set, rows are spread over the rayon pool.
pub fn apply_rows<T: RowTransform + ?Sized>(
    slice: &mut [Element],
    cols: usize,
    transform: &T,
    parallel: bool,
) {
    if cols == 0 || slice.is_empty() {
        return;
    }
    debug_assert_eq!(slice.len() % cols, 0, "slice is not row aligned");
    if parallel {
        slice
            .par_chunks_exact_mut(cols)
            .for_each(|row| transform.apply(row));
    } else {
        slice
            .chunks_exact_mut(cols)
            .for_each(|row| transform.apply(row));
    }
}
