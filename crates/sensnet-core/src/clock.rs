//! Logical clocks
//!
//! Two timestamp types travel with every measurement:
//!
//! - [`ScalarTimestamp`]: a single counter, totally ordered by value.
//! - [`VectorTimestamp`]: one counter per node in the network.
//!
//! Causality lives in [`merge_vectors`] / [`merge_and_stamp`], the
//! element-wise maximum rule. The [`Ord`] impl on [`VectorTimestamp`] is a
//! lexicographic order ([`compare_vectors`]) and is only meant for
//! presenting a window in a stable order; use [`VectorTimestamp::happened_before`]
//! for causal questions.

use std::cmp::Ordering;
use std::fmt;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::ClockError;

/// A single monotonically advancing counter
#[derive(
    Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ScalarTimestamp(u64);

impl ScalarTimestamp {
    /// The initial timestamp of every node
    pub const ZERO: Self = Self(0);

    /// Create a timestamp with the given value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw counter value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The timestamp of the next local event
    pub fn tick(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Lamport receive rule: `max(self, other) + 1`
    pub fn witness(self, other: Self) -> Self {
        Self(self.0.max(other.0).saturating_add(1))
    }
}

impl From<u64> for ScalarTimestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Per-node counters capturing causal history across the network
///
/// The length is fixed for a network: every node's vector has one slot per
/// node. Merging vectors of different length is rejected with
/// [`ClockError::CardinalityMismatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorTimestamp(Vec<u64>);

impl VectorTimestamp {
    /// All-zero vector for a network of `len` nodes
    pub fn zero(len: usize) -> Self {
        Self(vec![0; len])
    }

    /// Wrap raw counters
    pub fn from_counters(counters: Vec<u64>) -> Self {
        Self(counters)
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the zero-length vector
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component for the node at `index`
    pub fn get(&self, index: usize) -> Option<u64> {
        self.0.get(index).copied()
    }

    /// Borrow the raw counters
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    /// Consume into the raw counters
    pub fn into_counters(self) -> Vec<u64> {
        self.0
    }

    /// Element-wise maximum of `self` and `other`
    pub fn merge(&self, other: &Self) -> Result<Self, ClockError> {
        merge_vectors(self, other)
    }

    /// Merge with `other`, then force the component at `own_index` to `own_value`
    pub fn merge_and_stamp(
        &self,
        other: &Self,
        own_index: usize,
        own_value: u64,
    ) -> Result<Self, ClockError> {
        merge_and_stamp(self, other, own_index, own_value)
    }

    /// Lexicographic comparison that rejects vectors of different length
    pub fn checked_cmp(&self, other: &Self) -> Result<Ordering, ClockError> {
        ensure_same_cardinality(self, other)?;
        Ok(compare_vectors(self, other))
    }

    /// True if every component of `self` is `<=` the matching component of
    /// `other` and the vectors differ.
    pub fn happened_before(&self, other: &Self) -> Result<bool, ClockError> {
        ensure_same_cardinality(self, other)?;
        let dominated = self.0.iter().zip(&other.0).all(|(a, b)| a <= b);
        Ok(dominated && self != other)
    }

    /// True if neither vector happened before the other and they differ.
    pub fn is_concurrent_with(&self, other: &Self) -> Result<bool, ClockError> {
        Ok(self != other && !self.happened_before(other)? && !other.happened_before(self)?)
    }
}

impl From<Vec<u64>> for VectorTimestamp {
    fn from(counters: Vec<u64>) -> Self {
        Self(counters)
    }
}

impl fmt::Display for VectorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "]")
    }
}

impl Ord for VectorTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_vectors(self, other)
    }
}

impl PartialOrd for VectorTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn ensure_same_cardinality(a: &VectorTimestamp, b: &VectorTimestamp) -> Result<(), ClockError> {
    if a.len() != b.len() {
        return Err(ClockError::CardinalityMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Causal-dominance merge: `c[i] = max(a[i], b[i])`
pub fn merge_vectors(a: &VectorTimestamp, b: &VectorTimestamp) -> Result<VectorTimestamp, ClockError> {
    ensure_same_cardinality(a, b)?;
    Ok(VectorTimestamp(
        a.0.iter().zip(&b.0).map(|(x, y)| (*x).max(*y)).collect(),
    ))
}

/// Merge `a` and `b`, then overwrite `c[own_index] = own_value`
///
/// Used both when a node stamps its own event and when it folds in a remote
/// vector, so a node's own component is always driven by its local event
/// counter rather than by a stale remote copy of it.
pub fn merge_and_stamp(
    a: &VectorTimestamp,
    b: &VectorTimestamp,
    own_index: usize,
    own_value: u64,
) -> Result<VectorTimestamp, ClockError> {
    let mut merged = merge_vectors(a, b)?;
    let len = merged.len();
    let slot = merged
        .0
        .get_mut(own_index)
        .ok_or(ClockError::IndexOutOfRange {
            index: own_index,
            len,
        })?;
    *slot = own_value;
    Ok(merged)
}

/// Lexicographic order over two vector timestamps
///
/// See [`compare_sequences`]. Accepts vectors of different length; use
/// [`VectorTimestamp::checked_cmp`] where a length mismatch must fail.
pub fn compare_vectors(a: &VectorTimestamp, b: &VectorTimestamp) -> Ordering {
    compare_sequences(&a.0, &b.0)
}

/// Compare two sequences element by element
///
/// The first differing element decides. If one sequence is a prefix of the
/// other, the shorter one sorts first.
pub fn compare_sequences<T: Ord>(a: &[T], b: &[T]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            non_eq => return non_eq,
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(counters: &[u64]) -> VectorTimestamp {
        VectorTimestamp::from_counters(counters.to_vec())
    }

    #[test]
    fn test_scalar_ordering_and_tick() {
        let a = ScalarTimestamp::new(3);
        let b = ScalarTimestamp::new(7);
        assert!(a < b);
        assert_eq!(a.tick(), ScalarTimestamp::new(4));
        assert_eq!(a.witness(b), ScalarTimestamp::new(8));
        assert_eq!(b.witness(a), ScalarTimestamp::new(8));
        assert_eq!(format!("{}", b), "7");
    }

    #[test]
    fn test_merge_takes_max() {
        let merged = merge_vectors(&v(&[1, 5, 0]), &v(&[3, 2, 0])).unwrap();
        assert_eq!(merged, v(&[3, 5, 0]));
    }

    #[test]
    fn test_merge_rejects_cardinality_mismatch() {
        let err = merge_vectors(&v(&[1, 2]), &v(&[1, 2, 3])).unwrap_err();
        assert_eq!(
            err,
            ClockError::CardinalityMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert!(merge_vectors(&v(&[]), &v(&[0])).is_err());
    }

    #[test]
    fn test_merge_and_stamp_overrides_own_component() {
        let stamped = merge_and_stamp(&v(&[4, 0, 0]), &v(&[9, 2, 1]), 0, 5).unwrap();
        assert_eq!(stamped, v(&[5, 2, 1]));

        // Own value may be lower than both inputs
        let stamped = merge_and_stamp(&v(&[4, 0]), &v(&[9, 2]), 0, 1).unwrap();
        assert_eq!(stamped.get(0), Some(1));
    }

    #[test]
    fn test_merge_and_stamp_index_out_of_range() {
        let err = merge_and_stamp(&v(&[0, 0]), &v(&[0, 0]), 2, 1).unwrap_err();
        assert_eq!(err, ClockError::IndexOutOfRange { index: 2, len: 2 });
    }

    #[test]
    fn test_lexicographic_compare() {
        assert_eq!(compare_vectors(&v(&[1, 2, 3]), &v(&[1, 2, 3])), Ordering::Equal);
        assert_eq!(compare_vectors(&v(&[1, 3, 0]), &v(&[1, 2, 9])), Ordering::Greater);
        assert_eq!(compare_vectors(&v(&[0, 9, 9]), &v(&[1, 0, 0])), Ordering::Less);
        // Strict prefix sorts first
        assert_eq!(compare_vectors(&v(&[1, 2]), &v(&[1, 2, 0])), Ordering::Less);
        assert_eq!(compare_vectors(&v(&[]), &v(&[0])), Ordering::Less);
    }

    #[test]
    fn test_checked_cmp_rejects_mismatch() {
        assert!(v(&[1]).checked_cmp(&v(&[1, 0])).is_err());
        assert_eq!(v(&[1, 0]).checked_cmp(&v(&[0, 5])), Ok(Ordering::Greater));
    }

    #[test]
    fn test_causal_relations() {
        let a = v(&[1, 0, 0]);
        let b = v(&[1, 1, 0]);
        let c = v(&[0, 0, 1]);

        assert!(a.happened_before(&b).unwrap());
        assert!(!b.happened_before(&a).unwrap());
        assert!(!a.happened_before(&a).unwrap());
        assert!(a.is_concurrent_with(&c).unwrap());
        assert!(!a.is_concurrent_with(&b).unwrap());
        assert!(a.happened_before(&v(&[1])).is_err());
    }

    #[test]
    fn test_vector_display_and_serde_shape() {
        let ts = v(&[3, 0, 12]);
        assert_eq!(format!("{}", ts), "[3, 0, 12]");

        let bytes = postcard::to_allocvec(&ts).unwrap();
        let raw: Vec<u64> = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(raw, vec![3, 0, 12]);
    }
}
