//! Merging of two adjacent ascending runs with galloping, the expensive half
//! of the engine. The public entry points are `merge_lo` and `merge_hi`; which
//! one applies is decided by the caller based on which run is shorter, so the
//! scratch buffer never needs to hold more than `min(len1, len2)` elements.

use std::cmp::Ordering;
use std::ptr;

/// Once a merge enters galloping mode it stays there until both runs win
/// fewer than this many consecutive elements.
pub(crate) const MIN_GALLOP: usize = 7;

/// Protects the slice from a panicking comparator. While a merge is running,
/// `[start, end)` are the elements that currently live in the scratch buffer
/// and `dst` is the position in the slice where they belong. Dropping the
/// hole copies them back, so unwinding leaves the slice a permutation of its
/// original content with no element duplicated or lost.
struct MergeHole<T> {
    start: *mut T,
    end: *mut T,
    dst: *mut T,
}

impl<T> Drop for MergeHole<T> {
    fn drop(&mut self) {
        // SAFETY: `T` is not zero-sized (checked at sort entry) and the
        // remaining scratch elements fit the hole by construction.
        unsafe {
            let len = self.end.offset_from(self.start) as usize;
            ptr::copy_nonoverlapping(self.start, self.dst, len);
        }
    }
}

/// Locates the insertion point for `key` in the sorted range
/// `[base, base + len)`; if the range contains elements equal to `key`, the
/// index of the leftmost of them is returned. The search starts probing at
/// `hint` with exponentially growing offsets before binary-searching the
/// located span, so a key near the hint is found in O(log distance).
///
/// Returns `k` such that everything in `[0, k)` is `< key` and everything in
/// `[k, len)` is `>= key`.
///
/// # Safety
///
/// `base` must be valid for `len` reads, `len > 0`, `hint < len`, and `key`
/// must be valid for reads for the duration of the call.
pub(crate) unsafe fn gallop_left<T, F>(
    key: *const T,
    base: *const T,
    len: usize,
    hint: usize,
    compare: &mut F,
) -> usize
where
    F: FnMut(&T, &T) -> Ordering,
{
    debug_assert!(len > 0 && hint < len);

    let hintp = base.add(hint);
    let mut last_ofs = 0;
    let mut ofs = 1;

    if compare(&*key, &*hintp).is_gt() {
        // Gallop right until a[hint + last_ofs] < key <= a[hint + ofs].
        let max_ofs = len - hint;
        while ofs < max_ofs && compare(&*key, &*hintp.add(ofs)).is_gt() {
            last_ofs = ofs;
            // Cannot overflow, slice lengths never exceed isize::MAX.
            ofs = (ofs << 1) + 1;
        }
        if ofs > max_ofs {
            ofs = max_ofs;
        }

        // Make both offsets relative to base; last_ofs gains 1 so it stays
        // non-negative through the binary phase below.
        last_ofs += hint + 1;
        ofs += hint;
    } else {
        // key <= a[hint]: gallop left until a[hint - ofs] < key <= a[hint - last_ofs].
        let max_ofs = hint + 1;
        while ofs < max_ofs && compare(&*key, &*hintp.sub(ofs)).is_le() {
            last_ofs = ofs;
            ofs = (ofs << 1) + 1;
        }
        if ofs > max_ofs {
            ofs = max_ofs;
        }

        let tmp = last_ofs;
        last_ofs = hint + 1 - ofs;
        ofs = hint - tmp;
    }
    debug_assert!(last_ofs <= ofs && ofs <= len);

    // Binary search with invariant a[last_ofs - 1] < key <= a[ofs].
    while last_ofs < ofs {
        let m = (last_ofs & ofs) + ((last_ofs ^ ofs) >> 1);
        if compare(&*key, &*base.add(m)).is_gt() {
            last_ofs = m + 1;
        } else {
            ofs = m;
        }
    }
    ofs
}

/// Like `gallop_left`, but if the range contains elements equal to `key`,
/// returns the index just past the rightmost of them: everything in `[0, k)`
/// is `<= key` and everything in `[k, len)` is `> key`.
///
/// # Safety
///
/// Same contract as `gallop_left`.
pub(crate) unsafe fn gallop_right<T, F>(
    key: *const T,
    base: *const T,
    len: usize,
    hint: usize,
    compare: &mut F,
) -> usize
where
    F: FnMut(&T, &T) -> Ordering,
{
    debug_assert!(len > 0 && hint < len);

    let hintp = base.add(hint);
    let mut last_ofs = 0;
    let mut ofs = 1;

    if compare(&*key, &*hintp).is_lt() {
        // Gallop left until a[hint - ofs] <= key < a[hint - last_ofs].
        let max_ofs = hint + 1;
        while ofs < max_ofs && compare(&*key, &*hintp.sub(ofs)).is_lt() {
            last_ofs = ofs;
            ofs = (ofs << 1) + 1;
        }
        if ofs > max_ofs {
            ofs = max_ofs;
        }

        let tmp = last_ofs;
        last_ofs = hint + 1 - ofs;
        ofs = hint - tmp;
    } else {
        // a[hint] <= key: gallop right until a[hint + last_ofs] <= key < a[hint + ofs].
        let max_ofs = len - hint;
        while ofs < max_ofs && compare(&*key, &*hintp.add(ofs)).is_ge() {
            last_ofs = ofs;
            ofs = (ofs << 1) + 1;
        }
        if ofs > max_ofs {
            ofs = max_ofs;
        }

        last_ofs += hint + 1;
        ofs += hint;
    }
    debug_assert!(last_ofs <= ofs && ofs <= len);

    // Binary search with invariant a[last_ofs - 1] <= key < a[ofs].
    while last_ofs < ofs {
        let m = (last_ofs & ofs) + ((last_ofs ^ ofs) >> 1);
        if compare(&*key, &*base.add(m)).is_lt() {
            ofs = m;
        } else {
            last_ofs = m + 1;
        }
    }
    ofs
}

/// Stably merges the adjacent ascending runs `[base1, base1 + len1)` and
/// `[base2, base2 + len2)`, walking left to right. Must only be called when
/// `len1 <= len2`; the first run is staged in `scratch`.
///
/// The caller has already galloped both run boundaries, so the first element
/// of run 2 is known to sort before the first element of run 1, and the last
/// element of run 1 after everything in run 2.
///
/// Returns `false` if run 1 was exhausted before run 2, which is impossible
/// under a total order (see above) and signals a comparator contract
/// violation. The slice holds a valid permutation either way.
///
/// # Safety
///
/// Runs must be adjacent (`base1 + len1 == base2`) and non-empty, `scratch`
/// must be valid for `len1` writes and not alias the slice, and `T` must not
/// be zero-sized.
pub(crate) unsafe fn merge_lo<T, F>(
    base1: *mut T,
    mut len1: usize,
    base2: *mut T,
    mut len2: usize,
    scratch: *mut T,
    min_gallop: &mut usize,
    compare: &mut F,
) -> bool
where
    F: FnMut(&T, &T) -> Ordering,
{
    debug_assert!(len1 > 0 && len2 > 0);
    debug_assert!(base1.add(len1) == base2);

    ptr::copy_nonoverlapping(base1, scratch, len1);
    let mut hole = MergeHole {
        start: scratch,
        end: scratch.add(len1),
        dst: base1,
    };
    let mut cursor2 = base2;

    // The first element of run 2 belongs before all of run 1; move it and
    // deal with the degenerate cases before entering the main loop, which
    // needs len1 > 1 and len2 > 0.
    ptr::copy_nonoverlapping(cursor2, hole.dst, 1);
    hole.dst = hole.dst.add(1);
    cursor2 = cursor2.add(1);
    len2 -= 1;

    if len2 == 0 {
        // Dropping the hole copies the rest of run 1 back into place.
        return true;
    }
    if len1 == 1 {
        ptr::copy(cursor2, hole.dst, len2);
        // The single element left in scratch goes after everything else.
        hole.dst = hole.dst.add(len2);
        return true;
    }

    let mut gallop = *min_gallop;

    'outer: loop {
        let mut count1 = 0; // consecutive wins of run 1
        let mut count2 = 0; // consecutive wins of run 2

        // One element at a time until a run starts winning consistently.
        loop {
            debug_assert!(len1 > 1 && len2 > 0);
            if compare(&*cursor2, &*hole.start).is_lt() {
                ptr::copy_nonoverlapping(cursor2, hole.dst, 1);
                hole.dst = hole.dst.add(1);
                cursor2 = cursor2.add(1);
                count2 += 1;
                count1 = 0;
                len2 -= 1;
                if len2 == 0 {
                    break 'outer;
                }
                if count2 >= gallop {
                    break;
                }
            } else {
                ptr::copy_nonoverlapping(hole.start, hole.dst, 1);
                hole.dst = hole.dst.add(1);
                hole.start = hole.start.add(1);
                count1 += 1;
                count2 = 0;
                len1 -= 1;
                if len1 == 1 {
                    break 'outer;
                }
                if count1 >= gallop {
                    break;
                }
            }
        }

        // One run is winning consistently enough that galloping to the next
        // crossover and bulk-copying the span may be a big win. Stay here
        // until neither run sustains its streak.
        loop {
            debug_assert!(len1 > 1 && len2 > 0);

            count1 = gallop_right(cursor2 as *const T, hole.start as *const T, len1, 0, compare);
            if count1 != 0 {
                ptr::copy_nonoverlapping(hole.start, hole.dst, count1);
                hole.dst = hole.dst.add(count1);
                hole.start = hole.start.add(count1);
                len1 -= count1;
                if len1 <= 1 {
                    break 'outer;
                }
            }
            ptr::copy_nonoverlapping(cursor2, hole.dst, 1);
            hole.dst = hole.dst.add(1);
            cursor2 = cursor2.add(1);
            len2 -= 1;
            if len2 == 0 {
                break 'outer;
            }

            count2 = gallop_left(hole.start as *const T, cursor2 as *const T, len2, 0, compare);
            if count2 != 0 {
                // Source and destination may overlap.
                ptr::copy(cursor2, hole.dst, count2);
                hole.dst = hole.dst.add(count2);
                cursor2 = cursor2.add(count2);
                len2 -= count2;
                if len2 == 0 {
                    break 'outer;
                }
            }
            ptr::copy_nonoverlapping(hole.start, hole.dst, 1);
            hole.dst = hole.dst.add(1);
            hole.start = hole.start.add(1);
            len1 -= 1;
            if len1 == 1 {
                break 'outer;
            }

            gallop = gallop.saturating_sub(1);
            if count1 < MIN_GALLOP && count2 < MIN_GALLOP {
                break;
            }
        }
        gallop += 2; // penalize leaving galloping mode
    }

    *min_gallop = gallop.max(1);

    if len1 == 1 {
        debug_assert!(len2 > 0);
        ptr::copy(cursor2, hole.dst, len2);
        hole.dst = hole.dst.add(len2);
        true
    } else if len1 == 0 {
        // Run 1 ran out first even though its last element must sort after
        // all of run 2. Everything has been copied back already, the slice
        // just isn't fully sorted.
        false
    } else {
        debug_assert!(len2 == 0 && len1 > 1);
        true
    }
}

/// Mirror image of `merge_lo` for the case `len1 >= len2`: the second run is
/// staged in `scratch` and the merge walks right to left.
///
/// Returns `false` if run 2 was exhausted before run 1, the mirrored
/// comparator contract violation.
///
/// # Safety
///
/// Same contract as `merge_lo`, except `scratch` must be valid for `len2`
/// writes.
pub(crate) unsafe fn merge_hi<T, F>(
    base1: *mut T,
    mut len1: usize,
    base2: *mut T,
    mut len2: usize,
    scratch: *mut T,
    min_gallop: &mut usize,
    compare: &mut F,
) -> bool
where
    F: FnMut(&T, &T) -> Ordering,
{
    debug_assert!(len1 > 0 && len2 > 0);
    debug_assert!(base1.add(len1) == base2);

    ptr::copy_nonoverlapping(base2, scratch, len2);

    // `hole.dst` doubles as the exclusive top of the unconsumed part of
    // run 1 and `hole.end` as the exclusive top of the scratch copy of
    // run 2; `out` is the exclusive top of the unwritten gap. The merge
    // maintains out == hole.dst + (hole.end - hole.start), which is exactly
    // what makes the drop restoration land the scratch remainder in the gap.
    let mut hole = MergeHole {
        start: scratch,
        end: scratch.add(len2),
        dst: base2,
    };
    let mut out = base2.add(len2);

    // The last element of run 1 belongs after all of run 2.
    hole.dst = hole.dst.sub(1);
    out = out.sub(1);
    ptr::copy_nonoverlapping(hole.dst, out, 1);
    len1 -= 1;

    if len1 == 0 {
        return true;
    }
    if len2 == 1 {
        hole.dst = hole.dst.sub(len1);
        out = out.sub(len1);
        ptr::copy(hole.dst, out, len1);
        return true;
    }

    let mut gallop = *min_gallop;

    'outer: loop {
        let mut count1 = 0;
        let mut count2 = 0;

        loop {
            debug_assert!(len1 > 0 && len2 > 1);
            if compare(&*hole.end.sub(1), &*hole.dst.sub(1)).is_lt() {
                hole.dst = hole.dst.sub(1);
                out = out.sub(1);
                ptr::copy_nonoverlapping(hole.dst, out, 1);
                count1 += 1;
                count2 = 0;
                len1 -= 1;
                if len1 == 0 {
                    break 'outer;
                }
            } else {
                hole.end = hole.end.sub(1);
                out = out.sub(1);
                ptr::copy_nonoverlapping(hole.end, out, 1);
                count2 += 1;
                count1 = 0;
                len2 -= 1;
                if len2 == 1 {
                    break 'outer;
                }
            }
            if count1 >= gallop || count2 >= gallop {
                break;
            }
        }

        loop {
            debug_assert!(len1 > 0 && len2 > 1);

            count1 = len1
                - gallop_right(
                    hole.end.sub(1) as *const T,
                    base1 as *const T,
                    len1,
                    len1 - 1,
                    compare,
                );
            if count1 != 0 {
                hole.dst = hole.dst.sub(count1);
                out = out.sub(count1);
                ptr::copy(hole.dst, out, count1);
                len1 -= count1;
                if len1 == 0 {
                    break 'outer;
                }
            }
            hole.end = hole.end.sub(1);
            out = out.sub(1);
            ptr::copy_nonoverlapping(hole.end, out, 1);
            len2 -= 1;
            if len2 == 1 {
                break 'outer;
            }

            count2 = len2
                - gallop_left(
                    hole.dst.sub(1) as *const T,
                    scratch as *const T,
                    len2,
                    len2 - 1,
                    compare,
                );
            if count2 != 0 {
                hole.end = hole.end.sub(count2);
                out = out.sub(count2);
                ptr::copy_nonoverlapping(hole.end, out, count2);
                len2 -= count2;
                if len2 <= 1 {
                    break 'outer;
                }
            }
            hole.dst = hole.dst.sub(1);
            out = out.sub(1);
            ptr::copy_nonoverlapping(hole.dst, out, 1);
            len1 -= 1;
            if len1 == 0 {
                break 'outer;
            }

            gallop = gallop.saturating_sub(1);
            if count1 < MIN_GALLOP && count2 < MIN_GALLOP {
                break;
            }
        }
        gallop += 2;
    }

    *min_gallop = gallop.max(1);

    if len2 == 1 {
        debug_assert!(len1 > 0);
        hole.dst = hole.dst.sub(len1);
        out = out.sub(len1);
        ptr::copy(hole.dst, out, len1);
        true
    } else if len2 == 0 {
        // Mirrored contract violation, see merge_lo.
        false
    } else {
        debug_assert!(len1 == 0 && len2 > 0);
        true
    }
}
