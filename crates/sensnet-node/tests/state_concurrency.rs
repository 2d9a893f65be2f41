//! Concurrent access to the clock and window state

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use sensnet_core::{Measurement, ScalarTimestamp, VectorTimestamp};
use sensnet_node::NodeState;

const WRITERS: usize = 4;
const PER_WRITER: i32 = 500;

#[test]
fn test_every_measurement_drained_exactly_once() {
    let state = Arc::new(NodeState::new(0, 3));
    let done = Arc::new(AtomicBool::new(false));

    let drainer = {
        let state = state.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut drained = Vec::new();
            while !done.load(Ordering::SeqCst) {
                let window = state.drain_window();
                // The three views of one drain always agree.
                assert_eq!(window.descending_by_scalar().len(), window.len());
                assert_eq!(window.descending_by_vector().len(), window.len());
                drained.extend(window.measurements().iter().copied());
                thread::yield_now();
            }
            drained
        })
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    let id = w as i32 * PER_WRITER + i;
                    let measurement = Measurement::new(id, 0, 0);
                    if w % 2 == 0 {
                        state.record_local(measurement).unwrap();
                    } else {
                        state
                            .record_and_store(
                                measurement,
                                ScalarTimestamp::new(i as u64),
                                VectorTimestamp::from_counters(vec![0, i as u64, 0]),
                            )
                            .unwrap();
                    }
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);

    let mut drained = drainer.join().unwrap();
    drained.extend(state.drain_window().measurements().iter().copied());

    let mut seen: BTreeMap<i32, usize> = BTreeMap::new();
    for m in &drained {
        *seen.entry(m.temperature()).or_default() += 1;
    }
    let total = WRITERS * PER_WRITER as usize;
    assert_eq!(seen.len(), total);
    assert!(seen.values().all(|&count| count == 1));
    assert_eq!(state.event_count(), total as u64);
}

#[test]
fn test_own_component_tracks_event_count() {
    let state = Arc::new(NodeState::new(1, 2));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let state = state.clone();
            thread::spawn(move || {
                let mut last_own = 0;
                for i in 0..200u64 {
                    let stamp = if w % 2 == 0 {
                        state.record_local(Measurement::new(0, 0, 0)).unwrap()
                    } else {
                        // Remote claims a large value for our slot; it must not stick.
                        state
                            .record_and_store(
                                Measurement::new(0, 0, 0),
                                ScalarTimestamp::new(i),
                                VectorTimestamp::from_counters(vec![i, 1_000_000]),
                            )
                            .unwrap()
                    };
                    let own = stamp.vector.get(1).unwrap();
                    assert!(own > last_own, "own component went from {} to {}", last_own, own);
                    assert!(own <= WRITERS as u64 * 200);
                    last_own = own;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(state.current_vector().get(1), Some(state.event_count()));
    assert_eq!(state.event_count(), WRITERS as u64 * 200);
}
