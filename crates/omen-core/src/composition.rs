//! Bounded compositions in lexicographic order.
//!
//! A composition of `total` into `n` parts, each in `0..=cap`. The iteration
//! is explicit: the successor of a vector is derived from the vector itself,
//! so any vector is a valid resume point.

use crate::ruleset::Level;

/// Lexicographically smallest composition: the suffix takes as much as it
/// can, the prefix as little. `None` if `total > n * cap`.
pub fn first_composition(n: usize, total: Level, cap: Level) -> Option<Vec<Level>> {
    if n == 0 {
        return (total == 0).then(Vec::new);
    }
    if total as u64 > cap as u64 * n as u64 {
        return None;
    }
    let mut v = vec![0; n];
    fill_minimal(&mut v, total, cap);
    Some(v)
}

/// Skip every composition that shares `v[..=at]` and move to the next one.
///
/// Returns the index of the first position that changed, or `None` when no
/// later composition exists.
pub fn advance_composition(v: &mut [Level], cap: Level, at: usize) -> Option<usize> {
    let at = at.min(v.len().checked_sub(1)?);
    let mut suffix: Level = v[at + 1..].iter().sum();
    let mut i = at;
    loop {
        if v[i] < cap && suffix >= 1 {
            v[i] += 1;
            fill_minimal(&mut v[i + 1..], suffix - 1, cap);
            return Some(i);
        }
        suffix += v[i];
        i = i.checked_sub(1)?;
    }
}

/// Whether `v` is a composition of `total` with every part at most `cap`.
pub fn is_composition(v: &[Level], total: Level, cap: Level) -> bool {
    v.iter().all(|&x| x <= cap) && v.iter().map(|&x| x as u64).sum::<u64>() == total as u64
}

fn fill_minimal(v: &mut [Level], mut rest: Level, cap: Level) {
    let n = v.len();
    for (j, slot) in v.iter_mut().enumerate() {
        let room = cap.saturating_mul((n - j - 1) as Level);
        *slot = rest.saturating_sub(room);
        rest -= *slot;
    }
    debug_assert_eq!(rest, 0);
}
