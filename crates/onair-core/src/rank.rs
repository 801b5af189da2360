//! Floating-point rank helpers.
//!
//! Segments and parts are ordered by an `f64` rank that is not required to
//! be contiguous. Inserting between two neighbours picks a value strictly
//! between them; when repeated insertion exhausts the float gap the ranks
//! are renumbered with [`rebalance_ranks`].

/// Rank strictly between `before` and `after`.
///
/// Missing neighbours extend the sequence by one in that direction.
pub fn rank_between(before: Option<f64>, after: Option<f64>) -> f64 {
    match (before, after) {
        (Some(a), Some(b)) => a + (b - a) / 2.0,
        (Some(a), None) => a.floor() + 1.0,
        (None, Some(b)) => b.ceil() - 1.0,
        (None, None) => 0.0,
    }
}

/// Whether any two adjacent ranks in `sorted` are closer than `epsilon`.
pub fn needs_rebalance(sorted: &[f64], epsilon: f64) -> bool {
    sorted.windows(2).any(|w| (w[1] - w[0]).abs() < epsilon)
}

/// Renumber to consecutive integers, preserving order.
pub fn rebalance_ranks(count: usize) -> Vec<f64> {
    (0..count).map(|i| i as f64).collect()
}
