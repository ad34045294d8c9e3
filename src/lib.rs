//! An incremental, adaptive, stable mergesort (timsort family).
//!
//! The classic algorithm is reshaped around one requirement: a sort must be
//! interruptible. [`TimSort`] exposes the sort as a sequence of bounded
//! [`step`](TimSort::step) calls, each performing exactly one unit of work
//! (detect and push one run, or resolve one pending merge). Between steps the
//! slice is always a valid permutation of its input, laid out as a series of
//! disjoint sorted runs followed by a not-yet-visited tail, so a caller on a
//! latency-sensitive thread can interleave sorting with other work, abandon
//! it, or persist the run layout and resume later.
//!
//! Each step reports the smallest element range it touched, which callers
//! like re-sortable list views use to limit invalidation. Merges can
//! additionally be size-capped via
//! [`set_max_merge_size`](TimSort::set_max_merge_size) so that no single step
//! degenerates into an unbounded merge of two huge runs.
//!
//! For plain non-incremental use, [`sort`] and [`sort_by`] drive a context to
//! completion in one call.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::mem;
use std::ops::Range;

mod merge;
mod run;
pub mod patterns;

use merge::{gallop_left, gallop_right, merge_hi, merge_lo, MIN_GALLOP};
use run::{binary_sort, compute_min_run, find_run};

/// Upper bound on the number of unmerged runs. The stack invariant forces
/// pending run lengths to grow at least as fast as the Fibonacci numbers, so
/// with MIN_MERGE = 32 this depth cannot be reached for any slice whose
/// length fits in 64 bits. Overflow would be an algorithm bug, not an input
/// condition, and is asserted accordingly.
const MAX_PENDING: usize = 86;

/// A pending run: `len` elements starting at `base`, sorted ascending.
#[derive(Copy, Clone, Debug)]
struct Run {
    base: usize,
    len: usize,
}

/// Smallest index range containing every element a step moved, if any did.
type Changed = Option<Range<usize>>;

/// Result of a single [`TimSort::step`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// A unit of work was performed. `changed` is the smallest index range
    /// containing every element that moved; `None` if the step moved
    /// nothing (for example pushing an already-ascending run).
    Progress { changed: Option<Range<usize>> },
    /// The whole slice forms a single sorted run; there is nothing left to
    /// do and further calls keep returning `Done`.
    Done,
}

/// Rejected configuration calls. The sort state is left untouched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The setting can only be changed before the first step.
    AlreadyStarted,
    /// The supplied value does not describe a valid configuration.
    InvalidValue,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AlreadyStarted => f.write_str("sort has already started"),
            ConfigError::InvalidValue => f.write_str("invalid configuration value"),
        }
    }
}

impl Error for ConfigError {}

/// An in-progress incremental sort of a borrowed slice.
///
/// Holds the comparator, the pending-run stack, the reusable merge scratch
/// buffer and the tuning knobs. Dropping the context releases the scratch
/// buffer and ends the borrow; the slice keeps whatever permutation the
/// performed steps produced.
pub struct TimSort<'a, T, F> {
    v: &'a mut [T],
    compare: F,
    /// First index of the tail that run detection has not consumed yet.
    offset: usize,
    min_run: usize,
    min_gallop: usize,
    max_merge_size: usize,
    /// Capacity-only buffer; `len` stays 0, elements are staged with raw
    /// bitwise copies during merges.
    scratch: Vec<T>,
    runs: [Run; MAX_PENDING],
    pending_runs: usize,
    started: bool,
    violation: bool,
}

impl<'a, T, F> TimSort<'a, T, F>
where
    F: FnMut(&T, &T) -> Ordering,
{
    /// Creates a sort context over `v`. No comparisons happen until the
    /// first [`step`](TimSort::step).
    pub fn new(v: &'a mut [T], compare: F) -> Self {
        let len = v.len();
        let mut sort = TimSort {
            v,
            compare,
            offset: 0,
            min_run: compute_min_run(len),
            min_gallop: MIN_GALLOP,
            max_merge_size: usize::MAX,
            scratch: Vec::new(),
            runs: [Run { base: 0, len: 0 }; MAX_PENDING],
            pending_runs: 0,
            started: false,
            violation: false,
        };

        if mem::size_of::<T>() == 0 && len > 0 {
            // Zero-sized values are indistinguishable; any order is sorted
            // order, so the slice is one big run from the start.
            sort.push_run(len);
        }

        sort
    }

    /// Caps the number of elements a single merge step may move. `0` removes
    /// the cap. An over-large merge is split: a cap-sized chunk of the
    /// shorter run is merged and both pending runs are re-described so a
    /// later step continues where this one stopped.
    ///
    /// Smaller caps mean shorter steps but more of them, and the bulk merge
    /// optimizations lose leverage, so the total sort gets slower; around
    /// 1024 is a reasonable starting point for millisecond-scale steps with
    /// a cheap comparator.
    pub fn set_max_merge_size(&mut self, max_merge_size: usize) {
        self.max_merge_size = if max_merge_size == 0 {
            usize::MAX
        } else {
            max_merge_size
        };
    }

    /// Overrides the computed minimum run length. Only valid before the
    /// first step; mostly useful for tests and callers that know their run
    /// structure better than the heuristic does.
    pub fn set_min_run(&mut self, min_run: usize) -> Result<(), ConfigError> {
        if self.started {
            return Err(ConfigError::AlreadyStarted);
        }
        if min_run == 0 {
            return Err(ConfigError::InvalidValue);
        }
        self.min_run = min_run;
        Ok(())
    }

    /// Seeds the pending-run stack with a known partition of sorted runs at
    /// the front of the slice, skipping their detection. Only valid on a
    /// fresh context; `lens` must be non-zero lengths summing to at most the
    /// slice length.
    ///
    /// Together with [`runs`](TimSort::runs) this allows tearing a sort down
    /// and resuming it later from the preserved layout.
    pub fn set_runs(&mut self, lens: &[usize]) -> Result<(), ConfigError> {
        if self.started || self.pending_runs != 0 {
            return Err(ConfigError::AlreadyStarted);
        }
        if lens.len() > MAX_PENDING {
            return Err(ConfigError::InvalidValue);
        }
        let mut total = 0usize;
        for &len in lens {
            if len == 0 {
                return Err(ConfigError::InvalidValue);
            }
            total = total
                .checked_add(len)
                .filter(|&t| t <= self.v.len())
                .ok_or(ConfigError::InvalidValue)?;
        }

        for &len in lens {
            self.push_run(len);
        }
        Ok(())
    }

    /// Lengths of the currently pending runs, bottom of the stack first.
    /// The runs cover the slice contiguously from index 0; whatever follows
    /// them is the undetected tail.
    pub fn runs(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.runs[..self.pending_runs].iter().map(|run| run.len)
    }

    /// Number of elements run detection has not consumed yet.
    pub fn remaining(&self) -> usize {
        self.v.len() - self.offset
    }

    /// True if some merge observed the comparator contradicting itself (a
    /// run exhausted that, by previous comparisons, had to outlast the
    /// other). The slice is still a valid permutation, but the final order
    /// is unspecified. The flag is sticky.
    pub fn comparator_violated(&self) -> bool {
        self.violation
    }

    /// Rough progress estimate on the scale of the slice length: reaches
    /// exactly `len` only when sorting is complete. Computed from the
    /// lengths of the topmost pending runs, weighting runs closer to being
    /// merged more heavily. Only good for progress displays; it has no say
    /// in correctness or termination.
    pub fn progress(&self) -> usize {
        const DEPTH: usize = 4;

        if self.pending_runs == 0 {
            return 0;
        }

        let mut last = self.runs[0].len;
        let mut progress = 0;
        let mut i = 1;
        while i < DEPTH + 1 && i < self.pending_runs {
            progress += (DEPTH + 1 - i) * last.max(self.runs[i].len);
            last = last.min(self.runs[i].len);
            i += 1;
        }
        if i < DEPTH + 1 {
            progress += (DEPTH + 1 - i) * last;
        }

        progress / DEPTH
    }

    /// Performs one unit of sorting work: resolve one pending run-stack
    /// invariant violation, else detect and push the next run from the
    /// tail, else fold two of the final runs together. Returns
    /// [`Step::Done`] exactly when a single run spans the whole slice.
    pub fn step(&mut self) -> Step {
        self.started = true;

        if let Some(changed) = self.merge_collapse() {
            return Step::Progress { changed };
        }
        if let Some(changed) = self.append_run() {
            return Step::Progress { changed };
        }
        if let Some(changed) = self.force_collapse() {
            return Step::Progress { changed };
        }
        Step::Done
    }

    /// Steps until there is nothing left to do.
    pub fn sort_to_completion(&mut self) {
        while let Step::Progress { .. } = self.step() {}
    }

    fn push_run(&mut self, len: usize) {
        assert!(self.pending_runs < MAX_PENDING);
        debug_assert!(len <= self.v.len() - self.offset);

        self.runs[self.pending_runs] = Run {
            base: self.offset,
            len,
        };
        self.pending_runs += 1;
        self.offset += len;
    }

    /// Detects the next natural run, extends it to min_run if it came up
    /// short, and pushes it. `None` when the tail is exhausted.
    fn append_run(&mut self) -> Option<Changed> {
        if self.offset == self.v.len() {
            return None;
        }

        let (found, reversed) = find_run(&mut self.v[self.offset..], &mut self.compare);
        let mut run_len = found;
        let mut changed: Changed = reversed.then(|| self.offset..self.offset + run_len);

        if run_len < self.min_run {
            let force = (self.v.len() - self.offset).min(self.min_run);
            let moved = binary_sort(
                &mut self.v[self.offset..self.offset + force],
                run_len,
                &mut self.compare,
            );
            if let Some(range) = moved {
                changed = Some(union(
                    changed,
                    self.offset + range.start..self.offset + range.end,
                ));
            }
            run_len = force;
        }

        self.push_run(run_len);
        Some(changed)
    }

    /// Restores the stack invariant (for the topmost runs X, Y, Z:
    /// `X.len > Y.len + Z.len` and `Y.len > Z.len`) by performing at most
    /// one merge. `None` when the invariant already holds.
    ///
    /// The violation test looks one entry deeper than the classic algorithm
    /// and the merged pair is picked by comparing the two candidate
    /// neighbors, following the corrected collapse rule (envisage-project
    /// sorting.pdf; JDK-8072909 suggestion 2). The exact comparison order
    /// matters for comparison-count parity, not correctness.
    fn merge_collapse(&mut self) -> Option<Changed> {
        if self.pending_runs <= 1 {
            return None;
        }

        let runs = &self.runs;
        let mut n = self.pending_runs - 2;
        if (n > 0 && runs[n - 1].len <= runs[n].len + runs[n + 1].len)
            || (n > 1 && runs[n - 2].len <= runs[n].len + runs[n - 1].len)
        {
            if runs[n - 1].len < runs[n + 1].len {
                n -= 1;
            }
        } else if runs[n].len > runs[n + 1].len {
            return None; // invariant is established
        }

        Some(self.merge_at(n))
    }

    /// One merge of the endgame: with no tail left, fold runs together
    /// (smaller neighbor first) until a single run remains.
    fn force_collapse(&mut self) -> Option<Changed> {
        if self.pending_runs <= 1 {
            return None;
        }

        let mut n = self.pending_runs - 2;
        if n > 0 && self.runs[n - 1].len < self.runs[n + 1].len {
            n -= 1;
        }
        Some(self.merge_at(n))
    }

    /// Merges the adjacent runs at stack slots `i` and `i + 1`, honoring
    /// `max_merge_size`. `i` must be one of the two topmost slots.
    fn merge_at(&mut self, i: usize) -> Changed {
        debug_assert!(self.pending_runs >= 2);
        debug_assert!(i == self.pending_runs - 2 || i == self.pending_runs - 3);

        let mut base1 = self.runs[i].base;
        let mut len1 = self.runs[i].len;
        let base2 = self.runs[i + 1].base;
        let mut len2 = self.runs[i + 1].len;
        debug_assert!(len1 > 0 && len2 > 0);
        debug_assert!(base1 + len1 == base2);

        let max_merge = self.max_merge_size;
        let v = self.v.as_mut_ptr();

        let changed;
        // SAFETY: all offsets stay within the two adjacent runs, which are
        // in bounds of `v` by the stack's construction; the scratch pointer
        // is freshly sized for the staged side and does not alias the
        // slice; T is not zero-sized (a zero-sized slice never produces two
        // runs to merge).
        unsafe {
            let compare = &mut self.compare;

            // Skip the prefix of run 1 that already precedes all of run 2,
            // and the suffix of run 2 that already follows all of run 1;
            // neither needs to move.
            let k = gallop_right(v.add(base2), v.add(base1), len1, 0, compare);
            base1 += k;
            len1 -= k;
            if len1 == 0 {
                changed = None;
            } else {
                len2 = gallop_left(
                    v.add(base1 + len1 - 1),
                    v.add(base2),
                    len2,
                    len2 - 1,
                    compare,
                );
                if len2 == 0 {
                    changed = None;
                } else if len1 <= len2 {
                    if len1 > max_merge {
                        // Partial merge: only the last `max_merge` elements
                        // of run 1 take part; they migrate into run 2's
                        // descriptor, to be finished by later steps.
                        let part1 = self.runs[i].base + self.runs[i].len - max_merge;
                        let scratch = grow_scratch(&mut self.scratch, max_merge);
                        let ok = merge_lo(
                            v.add(part1),
                            max_merge,
                            v.add(base2),
                            len2,
                            scratch,
                            &mut self.min_gallop,
                            &mut self.compare,
                        );
                        self.violation |= !ok;

                        self.runs[i].len -= max_merge;
                        self.runs[i + 1].base -= max_merge;
                        self.runs[i + 1].len += max_merge;
                        debug_assert!(
                            self.runs[i].base + self.runs[i].len == self.runs[i + 1].base
                        );
                        return Some(part1..base2 + len2);
                    }

                    let scratch = grow_scratch(&mut self.scratch, len1);
                    let ok = merge_lo(
                        v.add(base1),
                        len1,
                        v.add(base2),
                        len2,
                        scratch,
                        &mut self.min_gallop,
                        &mut self.compare,
                    );
                    self.violation |= !ok;
                    changed = Some(base1..base2 + len2);
                } else {
                    if len2 > max_merge {
                        // Mirrored partial merge: the first `max_merge`
                        // elements of run 2 migrate into run 1's descriptor.
                        let scratch = grow_scratch(&mut self.scratch, max_merge);
                        let ok = merge_hi(
                            v.add(base1),
                            len1,
                            v.add(base2),
                            max_merge,
                            scratch,
                            &mut self.min_gallop,
                            &mut self.compare,
                        );
                        self.violation |= !ok;

                        self.runs[i].len += max_merge;
                        self.runs[i + 1].base += max_merge;
                        self.runs[i + 1].len -= max_merge;
                        debug_assert!(
                            self.runs[i].base + self.runs[i].len == self.runs[i + 1].base
                        );
                        return Some(base1..base1 + len1 + max_merge);
                    }

                    let scratch = grow_scratch(&mut self.scratch, len2);
                    let ok = merge_hi(
                        v.add(base1),
                        len1,
                        v.add(base2),
                        len2,
                        scratch,
                        &mut self.min_gallop,
                        &mut self.compare,
                    );
                    self.violation |= !ok;
                    changed = Some(base1..base2 + len2);
                }
            }
        }

        // The runs are now one; if the merge happened one below the top,
        // slide the uninvolved top run down.
        self.runs[i].len += self.runs[i + 1].len;
        if i + 3 == self.pending_runs {
            self.runs[i + 1] = self.runs[i + 2];
        }
        self.pending_runs -= 1;

        changed
    }
}

/// Replaces the scratch allocation if it cannot hold `min_capacity`
/// elements. Grows to the next power of two; the previous contents are dead
/// between merges, so nothing is copied over.
fn grow_scratch<T>(scratch: &mut Vec<T>, min_capacity: usize) -> *mut T {
    if scratch.capacity() < min_capacity {
        let cap = min_capacity
            .checked_next_power_of_two()
            .unwrap_or(min_capacity);
        *scratch = Vec::with_capacity(cap);
    }
    scratch.as_mut_ptr()
}

fn union(changed: Changed, range: Range<usize>) -> Range<usize> {
    match changed {
        Some(prev) => prev.start.min(range.start)..prev.end.max(range.end),
        None => range,
    }
}

/// Sorts `v` stably in one call.
pub fn sort<T: Ord>(v: &mut [T]) {
    sort_by(v, T::cmp);
}

/// Sorts `v` stably with a caller-supplied comparator in one call.
pub fn sort_by<T, F>(v: &mut [T], compare: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    let mut sort = TimSort::new(v, compare);
    sort.sort_to_completion();
}
