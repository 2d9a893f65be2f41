//! Clock and window state shared by a node's loops
//!
//! One lock guards the event counter, both clocks and the window. Recording
//! a measurement and draining the window are each a single critical section,
//! so an aggregation round can never observe a half-applied store.

use parking_lot::Mutex;
use tracing::trace;

use sensnet_core::{ClockError, Measurement, ScalarTimestamp, VectorTimestamp};

use crate::window::Window;

/// Clock values after a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub scalar: ScalarTimestamp,
    pub vector: VectorTimestamp,
}

#[derive(Debug)]
struct Inner {
    event_count: u64,
    scalar: ScalarTimestamp,
    vector: VectorTimestamp,
    window: Window,
}

impl Inner {
    fn record_and_store(
        &mut self,
        own_index: usize,
        measurement: Measurement,
        scalar: ScalarTimestamp,
        vector: VectorTimestamp,
    ) -> Result<Stamp, ClockError> {
        let next_count = self.event_count + 1;
        // Fails on a cardinality mismatch before anything is mutated.
        let merged = self.vector.merge_and_stamp(&vector, own_index, next_count)?;

        self.event_count = next_count;
        self.vector = merged;
        self.scalar = self.scalar.witness(scalar);
        self.window.record(measurement, scalar, vector);

        Ok(Stamp {
            scalar: self.scalar,
            vector: self.vector.clone(),
        })
    }
}

/// Mutable state of one node
#[derive(Debug)]
pub struct NodeState {
    index: usize,
    inner: Mutex<Inner>,
}

impl NodeState {
    /// Fresh state for the node at `index` in a network of `total_nodes`
    pub fn new(index: usize, total_nodes: usize) -> Self {
        Self {
            index,
            inner: Mutex::new(Inner {
                event_count: 0,
                scalar: ScalarTimestamp::ZERO,
                vector: VectorTimestamp::zero(total_nodes),
                window: Window::new(),
            }),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Advance the clocks for one event and store the measurement
    ///
    /// The measurement is filed in the window under the timestamps it came
    /// with. The node's scalar clock moves to `max(own, scalar) + 1`; its
    /// vector clock becomes the element-wise maximum of both vectors with
    /// its own slot set to the new event count. Returns the advanced clocks.
    pub fn record_and_store(
        &self,
        measurement: Measurement,
        scalar: ScalarTimestamp,
        vector: VectorTimestamp,
    ) -> Result<Stamp, ClockError> {
        let stamp = self
            .inner
            .lock()
            .record_and_store(self.index, measurement, scalar, vector)?;
        trace!(scalar = %stamp.scalar, vector = %stamp.vector, "Stored measurement");
        Ok(stamp)
    }

    /// Store a locally produced measurement under the node's current clocks
    ///
    /// Reading the clocks and storing happen under one lock acquisition.
    pub fn record_local(&self, measurement: Measurement) -> Result<Stamp, ClockError> {
        let mut inner = self.inner.lock();
        let scalar = inner.scalar;
        let vector = inner.vector.clone();
        inner.record_and_store(self.index, measurement, scalar, vector)
    }

    /// Atomically take every stored measurement, leaving the window empty
    pub fn drain_window(&self) -> Window {
        self.inner.lock().window.take()
    }

    pub fn event_count(&self) -> u64 {
        self.inner.lock().event_count
    }

    pub fn current_scalar(&self) -> ScalarTimestamp {
        self.inner.lock().scalar
    }

    pub fn current_vector(&self) -> VectorTimestamp {
        self.inner.lock().vector.clone()
    }

    pub fn window_len(&self) -> usize {
        self.inner.lock().window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Measurement {
        Measurement::new(21, 1013, 40).with_co(Some(5))
    }

    fn vt(counters: &[u64]) -> VectorTimestamp {
        VectorTimestamp::from_counters(counters.to_vec())
    }

    #[test]
    fn test_local_record_advances_clocks() {
        let state = NodeState::new(1, 3);

        let first = state.record_local(reading()).unwrap();
        assert_eq!(first.scalar, ScalarTimestamp::new(1));
        assert_eq!(first.vector, vt(&[0, 1, 0]));

        let second = state.record_local(reading()).unwrap();
        assert_eq!(second.scalar, ScalarTimestamp::new(2));
        assert_eq!(second.vector, vt(&[0, 2, 0]));

        assert_eq!(state.event_count(), 2);
        assert_eq!(state.window_len(), 2);
    }

    #[test]
    fn test_remote_record_merges_and_stamps() {
        let state = NodeState::new(0, 3);
        state.record_local(reading()).unwrap();

        // The remote claims a stale value for our slot; our counter wins.
        let stamp = state
            .record_and_store(reading(), ScalarTimestamp::new(7), vt(&[0, 4, 2]))
            .unwrap();
        assert_eq!(stamp.scalar, ScalarTimestamp::new(8));
        assert_eq!(stamp.vector, vt(&[2, 4, 2]));
    }

    #[test]
    fn test_window_keyed_by_incoming_timestamps() {
        let state = NodeState::new(0, 2);
        state
            .record_and_store(reading(), ScalarTimestamp::new(9), vt(&[0, 3]))
            .unwrap();

        let window = state.drain_window();
        assert_eq!(window.descending_by_scalar()[0].0, ScalarTimestamp::new(9));
        assert_eq!(window.descending_by_vector()[0].0, vt(&[0, 3]));
        assert_eq!(state.window_len(), 0);
    }

    #[test]
    fn test_cardinality_mismatch_leaves_state_untouched() {
        let state = NodeState::new(0, 3);
        let err = state
            .record_and_store(reading(), ScalarTimestamp::new(1), vt(&[1, 1]))
            .unwrap_err();

        assert_eq!(
            err,
            ClockError::CardinalityMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(state.event_count(), 0);
        assert_eq!(state.current_scalar(), ScalarTimestamp::ZERO);
        assert_eq!(state.window_len(), 0);
    }
}
